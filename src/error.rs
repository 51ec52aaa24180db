//! Broker-level error types shared across the token service, broker, gateway, and stores.

// self
use crate::_prelude::*;

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical broker error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Session-storage failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::session::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// Provider rejected the grant (e.g., bad code, refresh token, or assertion).
	#[error("Provider rejected the grant: {reason}.")]
	InvalidGrant {
		/// Provider- or broker-supplied reason string.
		reason: String,
	},
	/// Client authentication failed or credentials are malformed.
	#[error("Client authentication failed: {reason}.")]
	InvalidClient {
		/// Provider- or broker-supplied reason string.
		reason: String,
	},
	/// Requested scopes exceed what was granted.
	#[error("Token lacks the required scopes: {reason}.")]
	InsufficientScope {
		/// Provider- or broker-supplied reason string.
		reason: String,
	},

	/// Authorization callback `state` did not match the pending login nonce.
	#[error("Authorization state mismatch.")]
	StateMismatch,
	/// A delegated credential was required but neither a session token nor an
	/// inbound bearer token was available.
	#[error("No user credential is available for a delegated call.")]
	NoUserCredential,
	/// The inbound bearer token was not issued for this broker, so delegated
	/// exchange must not be attempted with it.
	#[error("Inbound token audience does not match this broker.")]
	AudienceMismatch,
	/// No user identifier could be derived from the available claims.
	#[error("Could not determine a user identifier from token claims.")]
	MissingUserId,
	/// Caller-supplied request data was unusable (missing url/path, bad method).
	#[error("Invalid request: {reason}.")]
	InvalidRequest {
		/// What was wrong with the request.
		reason: String,
	},
	/// The downstream API answered with a non-success status.
	#[error("Downstream call failed{}.", status.map(|code| format!(" with status {code}")).unwrap_or_default())]
	Downstream {
		/// Downstream HTTP status, when one was received.
		status: Option<u16>,
		/// Downstream error payload (JSON when parseable, raw text otherwise).
		details: serde_json::Value,
	},
}

/// Configuration and validation failures raised by the broker.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// A required environment variable is missing.
	#[error("Environment variable `{name}` is required.")]
	MissingVar {
		/// Variable name.
		name: &'static str,
	},
	/// An environment variable holds an unparseable URL.
	#[error("Environment variable `{name}` is not a valid URL.")]
	InvalidUrl {
		/// Variable name.
		name: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// The listening port could not be parsed.
	#[error("Environment variable `{name}` is not a valid port number.")]
	InvalidPort {
		/// Variable name.
		name: &'static str,
	},
	/// The session secret is too short to derive a signing key from.
	#[error("Session secret must be at least {min} bytes.")]
	SessionSecretTooShort {
		/// Minimum accepted byte length.
		min: usize,
	},
	/// Configured scopes cannot be normalized.
	#[error("Configured scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Session token builder validation failed.
	#[error("Unable to build session tokens.")]
	TokenBuild(#[from] crate::auth::SessionTokensBuilderError),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Token endpoint returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Provider- or broker-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Token endpoint responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling an upstream endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling an upstream endpoint.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
impl From<reqwest::Error> for TransportError {
	fn from(e: reqwest::Error) -> Self {
		Self::network(e)
	}
}
