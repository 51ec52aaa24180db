//! Credential selection and token acquisition for downstream calls.
//!
//! Every downstream handler goes through [`TokenBroker::acquire_downstream_token`]
//! (or [`TokenBroker::delegated_token`] when app-only fallback is not
//! acceptable). The broker prefers the session cache, refreshes stale session
//! tokens under a per-session singleflight guard, falls back to on-behalf-of
//! exchange of the inbound bearer token, and finally to an app-only client
//! credentials token.

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
	claims::Claims,
	obs::{self, FlowKind, FlowOutcome, FlowSpan, RefreshMetrics},
	provider::TokenService,
	session::{SessionId, SessionStore},
};

/// Where an acquired token came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenSource {
	/// Cached (possibly refreshed) session tokens from a completed login.
	Session,
	/// On-behalf-of exchange of the inbound bearer token.
	OnBehalfOf,
	/// App-only client credentials token; carries no user identity.
	Application,
}
impl TokenSource {
	/// Returns a stable label suitable for log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			TokenSource::Session => "session",
			TokenSource::OnBehalfOf => "on_behalf_of",
			TokenSource::Application => "application",
		}
	}

	/// Returns `true` when the token represents a specific user.
	pub const fn is_delegated(self) -> bool {
		!matches!(self, TokenSource::Application)
	}
}
impl Display for TokenSource {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// A downstream-ready token together with its provenance.
#[derive(Clone, Debug)]
pub struct AcquiredToken {
	/// The bearer secret to forward downstream.
	pub secret: TokenSecret,
	/// Which credential tier produced it.
	pub source: TokenSource,
}

/// Selects and acquires downstream credentials for inbound requests.
pub struct TokenBroker {
	store: Arc<dyn SessionStore>,
	service: Arc<dyn TokenService>,
	client_id: String,
	downstream_scope: ScopeSet,
	refresh_guards: Mutex<HashMap<SessionId, Arc<AsyncMutex<()>>>>,
	refresh_metrics: RefreshMetrics,
}
impl TokenBroker {
	/// Creates a broker over the given store and token service.
	pub fn new(
		store: Arc<dyn SessionStore>,
		service: Arc<dyn TokenService>,
		client_id: impl Into<String>,
		downstream_scope: ScopeSet,
	) -> Self {
		Self {
			store,
			service,
			client_id: client_id.into(),
			downstream_scope,
			refresh_guards: Mutex::new(HashMap::new()),
			refresh_metrics: RefreshMetrics::default(),
		}
	}

	/// Process-local refresh contention counters.
	pub fn refresh_metrics(&self) -> &RefreshMetrics {
		&self.refresh_metrics
	}

	/// Acquires a downstream token, preferring delegated credentials and
	/// falling back to an app-only token when no user credential exists.
	///
	/// A failed on-behalf-of exchange and an audience-mismatched inbound
	/// token both warn-log and fall through to the app-only tier.
	pub async fn acquire_downstream_token(
		&self,
		session_id: Option<&SessionId>,
		claims: Option<&Claims>,
		bearer: Option<&str>,
	) -> Result<AcquiredToken> {
		if let Some(id) = session_id
			&& let Some(secret) = self.session_access_token(id).await?
		{
			return Ok(AcquiredToken { secret, source: TokenSource::Session });
		}
		if let Some(assertion) = bearer {
			if claims.is_some_and(|claims| claims.is_for_client(&self.client_id)) {
				match self.on_behalf_of_token(assertion).await {
					Ok(token) => return Ok(token),
					Err(err) => tracing::warn!(
						error = %err,
						"on-behalf-of exchange failed, falling back to app-only token",
					),
				}
			} else {
				tracing::warn!(
					"inbound token audience does not match this client, skipping on-behalf-of",
				);
			}
		}

		self.application_token().await
	}

	/// Acquires a delegated token only; never falls back to app-only.
	///
	/// Fails with [`Error::AudienceMismatch`] when the inbound bearer token
	/// was issued for another application (no exchange is attempted), and
	/// [`Error::NoUserCredential`] when nothing user-bound is available.
	pub async fn delegated_token(
		&self,
		session_id: Option<&SessionId>,
		claims: Option<&Claims>,
		bearer: Option<&str>,
	) -> Result<AcquiredToken> {
		if let Some(id) = session_id
			&& let Some(secret) = self.session_access_token(id).await?
		{
			return Ok(AcquiredToken { secret, source: TokenSource::Session });
		}

		match bearer {
			Some(assertion)
				if claims.is_some_and(|claims| claims.is_for_client(&self.client_id)) =>
				self.on_behalf_of_token(assertion).await,
			Some(_) => Err(Error::AudienceMismatch),
			None => Err(Error::NoUserCredential),
		}
	}

	/// Returns a fresh access token from the session cache, refreshing it if
	/// necessary. `None` means the session holds no usable delegated tokens.
	pub async fn session_access_token(&self, id: &SessionId) -> Result<Option<TokenSecret>> {
		let Some(session) = self.store.fetch(id).await? else {
			return Ok(None);
		};
		let Some(tokens) = session.tokens else {
			return Ok(None);
		};

		if tokens.is_fresh() {
			return Ok(Some(tokens.access_token));
		}
		if tokens.refresh_token.is_none() {
			tracing::debug!(session = ?id, "stale session tokens without refresh token");

			return Ok(None);
		}

		self.refresh_session_tokens(id).await
	}

	/// Refreshes under the per-session guard. Concurrent callers for the same
	/// session serialize here; losers re-read the store and reuse the
	/// winner's tokens instead of issuing a second refresh.
	async fn refresh_session_tokens(&self, id: &SessionId) -> Result<Option<TokenSecret>> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "refresh_session_tokens");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let guard = self.refresh_guard(id);
				let _singleflight = guard.lock().await;
				let Some(session) = self.store.fetch(id).await? else {
					return Ok(None);
				};
				let Some(current) = session.tokens else {
					return Ok(None);
				};

				if current.is_fresh() {
					self.refresh_metrics.record_reuse();

					return Ok(Some(current.access_token));
				}

				let Some(refresh_token) = current.refresh_token.clone() else {
					return Ok(None);
				};

				self.refresh_metrics.record_attempt();

				let mut refreshed = match self
					.service
					.refresh(refresh_token.expose(), &current.scope)
					.await
				{
					Ok(refreshed) => refreshed,
					// Refresh is best-effort: rejected, transient, and transport
					// failures all leave the caller to the next credential tier.
					Err(err) => {
						tracing::warn!(error = %err, "session token refresh failed");

						return Ok(None);
					},
				};

				// Providers may omit the rotated refresh token and id token.
				if refreshed.refresh_token.is_none() {
					refreshed.refresh_token = Some(refresh_token);
				}
				if refreshed.account.is_none() {
					refreshed.account = current.account;
				}

				let secret = refreshed.access_token.clone();

				self.store.put_tokens(id, refreshed).await?;

				Ok(Some(secret))
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	async fn on_behalf_of_token(&self, assertion: &str) -> Result<AcquiredToken> {
		const KIND: FlowKind = FlowKind::OnBehalfOf;

		let span = FlowSpan::new(KIND, "on_behalf_of_token");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let tokens = self.service.on_behalf_of(assertion, &self.downstream_scope).await?;

				Ok(AcquiredToken { secret: tokens.access_token, source: TokenSource::OnBehalfOf })
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	async fn application_token(&self) -> Result<AcquiredToken> {
		const KIND: FlowKind = FlowKind::ClientCredentials;

		let span = FlowSpan::new(KIND, "application_token");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let tokens = self.service.client_credentials(&self.downstream_scope).await?;

				Ok(AcquiredToken { secret: tokens.access_token, source: TokenSource::Application })
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	fn refresh_guard(&self, id: &SessionId) -> Arc<AsyncMutex<()>> {
		let mut guards = self.refresh_guards.lock();

		guards.entry(id.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}
}
impl Debug for TokenBroker {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenBroker")
			.field("client_id", &self.client_id)
			.field("downstream_scope", &self.downstream_scope)
			.finish_non_exhaustive()
	}
}
