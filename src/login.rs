//! Authorization-code login orchestration: redirect, callback, logout.
//!
//! The `state` nonce parked on the session is validated before the code is
//! redeemed, so a forged callback never reaches the token endpoint.

// crates.io
use rand::{Rng, distr::Alphanumeric};
// self
use crate::{
	_prelude::*,
	auth::ScopeSet,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::{self, TokenService},
	session::{PendingLogin, SessionId, SessionStore},
};

/// Byte length of generated `state` nonces.
const STATE_LEN: usize = 32;
/// Pending logins older than this are treated as invalid.
const LOGIN_TTL: Duration = Duration::minutes(10);

/// A login redirect prepared by [`LoginFlow::start`].
#[derive(Clone, Debug)]
pub struct StartedLogin {
	/// Session the pending login was parked on (new or reused).
	pub session_id: SessionId,
	/// Provider authorization URL to send the browser to.
	pub authorize_url: Url,
}

/// Orchestrates the interactive authorization-code flow.
pub struct LoginFlow {
	store: Arc<dyn SessionStore>,
	service: Arc<dyn TokenService>,
	authority: Url,
	client_id: String,
	redirect_uri: Url,
	scope: ScopeSet,
}
impl LoginFlow {
	/// Creates a flow over the given store and token service.
	pub fn new(
		store: Arc<dyn SessionStore>,
		service: Arc<dyn TokenService>,
		authority: Url,
		client_id: impl Into<String>,
		redirect_uri: Url,
		scope: ScopeSet,
	) -> Self {
		Self { store, service, authority, client_id: client_id.into(), redirect_uri, scope }
	}

	/// Starts a login: parks a fresh `state` nonce on the session (creating
	/// one if the caller has none) and returns the authorization redirect.
	pub async fn start(&self, session_id: Option<&SessionId>) -> Result<StartedLogin> {
		let session_id = match session_id {
			Some(id) if self.store.fetch(id).await?.is_some() => id.clone(),
			_ => self.store.create().await?,
		};
		let state = random_state();
		let pending = PendingLogin { state: state.clone(), started_at: OffsetDateTime::now_utc() };

		self.store.set_pending_login(&session_id, pending).await?;

		let authorize_url = provider::authorize_url(
			&self.authority,
			&self.client_id,
			&self.redirect_uri,
			&self.scope,
			&state,
		)
		.map_err(Error::from)?;

		Ok(StartedLogin { session_id, authorize_url })
	}

	/// Completes a login from the provider callback.
	///
	/// The pending nonce is consumed first; a missing, expired, or mismatched
	/// `state` fails with [`Error::StateMismatch`] before any provider call.
	pub async fn complete(&self, session_id: &SessionId, state: &str, code: &str) -> Result<()> {
		const KIND: FlowKind = FlowKind::AuthorizationCode;

		let span = FlowSpan::new(KIND, "complete_login");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let pending = self
					.store
					.take_pending_login(session_id)
					.await?
					.ok_or(Error::StateMismatch)?;

				if pending.state != state
					|| OffsetDateTime::now_utc() - pending.started_at > LOGIN_TTL
				{
					return Err(Error::StateMismatch);
				}

				let tokens =
					self.service.exchange_code(code, &self.redirect_uri, &self.scope).await?;

				self.store.put_tokens(session_id, tokens).await?;

				Ok(())
			})
			.await;

		match &result {
			Ok(()) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Destroys the session. Logging out twice is not an error.
	pub async fn logout(&self, session_id: &SessionId) -> Result<()> {
		self.store.destroy(session_id).await?;

		Ok(())
	}
}
impl Debug for LoginFlow {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LoginFlow")
			.field("client_id", &self.client_id)
			.field("redirect_uri", &self.redirect_uri)
			.field("scope", &self.scope)
			.finish_non_exhaustive()
	}
}

fn random_state() -> String {
	rand::rng().sample_iter(Alphanumeric).take(STATE_LEN).map(char::from).collect()
}
