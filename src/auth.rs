//! Credential primitives: redacted secrets, normalized scopes, and session token bundles.

pub mod scope;
pub use scope::{ScopeSet, ScopeValidationError};

pub mod secret;
pub use secret::TokenSecret;

pub mod tokens;
pub use tokens::{FRESHNESS_SKEW, SessionTokens, SessionTokensBuilder, SessionTokensBuilderError};
