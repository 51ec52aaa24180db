//! Session token bundles, freshness helpers, and builders.

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
};

/// Skew subtracted from the expiry instant when judging freshness, so a token
/// about to expire mid-flight is refreshed instead of forwarded.
pub const FRESHNESS_SKEW: Duration = Duration::seconds(5);

/// Errors produced by [`SessionTokensBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum SessionTokensBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
}

/// Immutable bundle of tokens held for one browser session.
#[derive(Clone, Serialize, Deserialize)]
pub struct SessionTokens {
	/// Normalized scopes these tokens were granted for.
	pub scope: ScopeSet,
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Refresh token secret, if the provider issued one.
	pub refresh_token: Option<TokenSecret>,
	/// Account identifier the provider associated with these tokens.
	pub account: Option<String>,
	/// Issued-at instant recorded from the provider response.
	pub issued_at: OffsetDateTime,
	/// Expiry instant derived from issued_at plus expires_in or absolute expiry.
	pub expires_at: OffsetDateTime,
}
impl SessionTokens {
	/// Returns a builder for constructing token bundles.
	pub fn builder(scope: ScopeSet) -> SessionTokensBuilder {
		SessionTokensBuilder::new(scope)
	}

	/// Returns `true` if the access token is still usable at the provided
	/// instant, applying [`FRESHNESS_SKEW`].
	pub fn is_fresh_at(&self, instant: OffsetDateTime) -> bool {
		self.expires_at > instant + FRESHNESS_SKEW
	}

	/// Convenience helper that checks freshness against the current UTC instant.
	pub fn is_fresh(&self) -> bool {
		self.is_fresh_at(OffsetDateTime::now_utc())
	}
}
impl Debug for SessionTokens {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionTokens")
			.field("scope", &self.scope)
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("account", &self.account)
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Builder for [`SessionTokens`].
#[derive(Clone, Debug)]
pub struct SessionTokensBuilder {
	scope: ScopeSet,
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	account: Option<String>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl SessionTokensBuilder {
	fn new(scope: ScopeSet) -> Self {
		Self {
			scope,
			access_token: None,
			refresh_token: None,
			account: None,
			issued_at: None,
			expires_at: None,
			expires_in: None,
		}
	}

	/// Sets the issued-at instant.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Convenience helper that stamps `issued_at` with the current clock.
	pub fn issued_now(self) -> Self {
		self.issued_at(OffsetDateTime::now_utc())
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides an already-wrapped refresh token, if any.
	pub fn maybe_refresh_token(mut self, token: Option<TokenSecret>) -> Self {
		self.refresh_token = token;

		self
	}

	/// Provides the account identifier.
	pub fn account(mut self, account: impl Into<String>) -> Self {
		self.account = Some(account.into());

		self
	}

	/// Provides an optional account identifier.
	pub fn maybe_account(mut self, account: Option<String>) -> Self {
		self.account = account;

		self
	}

	/// Consumes the builder and produces a [`SessionTokens`].
	pub fn build(self) -> Result<SessionTokens, SessionTokensBuilderError> {
		let access_token =
			self.access_token.ok_or(SessionTokensBuilderError::MissingAccessToken)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) => issued_at + delta,
			(None, None) => return Err(SessionTokensBuilderError::MissingExpiry),
		};

		Ok(SessionTokens {
			scope: self.scope,
			access_token,
			refresh_token: self.refresh_token,
			account: self.account,
			issued_at,
			expires_at,
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn scope() -> ScopeSet {
		ScopeSet::new(["User.Read"]).expect("Scope fixture should be valid.")
	}

	#[test]
	fn builder_handles_relative_expiry() {
		let tokens = SessionTokens::builder(scope())
			.access_token("secret")
			.issued_at(macros::datetime!(2025-01-01 00:00 UTC))
			.expires_in(Duration::minutes(30))
			.build()
			.expect("Builder should support relative expiry calculations.");

		assert_eq!(tokens.expires_at, macros::datetime!(2025-01-01 00:30 UTC));
	}

	#[test]
	fn builder_requires_expiry() {
		let err = SessionTokens::builder(scope())
			.access_token("secret")
			.build()
			.expect_err("Builder must reject a bundle with no expiry.");

		assert_eq!(err, SessionTokensBuilderError::MissingExpiry);
	}

	#[test]
	fn builder_requires_access_token() {
		let err = SessionTokens::builder(scope())
			.expires_in(Duration::hours(1))
			.build()
			.expect_err("Builder must reject a bundle with no access token.");

		assert_eq!(err, SessionTokensBuilderError::MissingAccessToken);
	}

	#[test]
	fn freshness_applies_skew() {
		let issued = macros::datetime!(2025-01-01 00:00 UTC);
		let tokens = SessionTokens::builder(scope())
			.access_token("secret")
			.issued_at(issued)
			.expires_in(Duration::hours(1))
			.build()
			.expect("Builder should succeed for freshness checks.");

		assert!(tokens.is_fresh_at(issued));
		assert!(tokens.is_fresh_at(issued + Duration::minutes(59) + Duration::seconds(54)));
		assert!(!tokens.is_fresh_at(issued + Duration::minutes(59) + Duration::seconds(55)));
		assert!(!tokens.is_fresh_at(issued + Duration::hours(1)));
	}

	#[test]
	fn debug_redacts_secrets() {
		let tokens = SessionTokens::builder(scope())
			.access_token("raw-access-value")
			.refresh_token("raw-refresh-value")
			.account("user@example.com")
			.issued_now()
			.expires_in(Duration::hours(1))
			.build()
			.expect("Builder should succeed for debug formatting.");
		let formatted = format!("{tokens:?}");

		assert!(!formatted.contains("raw-access-value"), "{formatted}");
		assert!(!formatted.contains("raw-refresh-value"), "{formatted}");
		assert!(formatted.contains("<redacted>"));
	}
}
