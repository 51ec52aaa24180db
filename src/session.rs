//! Storage contracts and built-in store implementations for browser sessions.

pub mod memory;

pub use memory::MemorySessionStore;

// crates.io
use rand::{Rng, distr::Alphanumeric};
// self
use crate::{_prelude::*, auth::SessionTokens};

/// Byte length of generated session identifiers.
const SESSION_ID_LEN: usize = 32;

/// Future type returned by [`SessionStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Opaque identifier carried by the session cookie.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);
impl SessionId {
	/// Generates a fresh random identifier.
	pub fn random() -> Self {
		Self(rand::rng().sample_iter(Alphanumeric).take(SESSION_ID_LEN).map(char::from).collect())
	}

	/// Wraps an identifier received from a cookie.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the identifier string for cookie serialization.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Debug for SessionId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		// Enough to correlate log lines without making the cookie forgeable from logs.
		f.debug_tuple("SessionId").field(&&self.0[..self.0.len().min(8)]).finish()
	}
}
impl Display for SessionId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// State parked between redirecting the browser to the provider and the
/// authorization callback coming back.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingLogin {
	/// CSRF nonce sent as the `state` query parameter.
	pub state: String,
	/// Instant the login was started, for expiring stale attempts.
	pub started_at: OffsetDateTime,
}

/// Everything the broker persists for one browser session.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionData {
	/// Delegated tokens cached for the session, once a login completed.
	pub tokens: Option<SessionTokens>,
	/// In-flight login attempt, if any.
	pub pending_login: Option<PendingLogin>,
}

/// Storage backend contract implemented by session stores.
pub trait SessionStore
where
	Self: Send + Sync,
{
	/// Creates an empty session and returns its identifier.
	fn create(&self) -> StoreFuture<'_, SessionId>;

	/// Fetches the session data, if the identifier is known.
	fn fetch<'a>(&'a self, id: &'a SessionId) -> StoreFuture<'a, Option<SessionData>>;

	/// Replaces the cached tokens for an existing session.
	fn put_tokens<'a>(
		&'a self,
		id: &'a SessionId,
		tokens: SessionTokens,
	) -> StoreFuture<'a, ()>;

	/// Parks a pending login on the session, replacing any previous attempt.
	fn set_pending_login<'a>(
		&'a self,
		id: &'a SessionId,
		pending: PendingLogin,
	) -> StoreFuture<'a, ()>;

	/// Removes and returns the pending login, if one was parked.
	fn take_pending_login<'a>(&'a self, id: &'a SessionId)
	-> StoreFuture<'a, Option<PendingLogin>>;

	/// Destroys the session and everything cached under it.
	fn destroy<'a>(&'a self, id: &'a SessionId) -> StoreFuture<'a, ()>;
}

/// Error type produced by [`SessionStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// The session identifier is not known to the store.
	#[error("Unknown session: {id}.")]
	UnknownSession {
		/// The offending identifier.
		id: String,
	},
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
