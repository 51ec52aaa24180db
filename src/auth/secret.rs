//! Secure token secret wrapper that redacts sensitive material.

// self
use crate::_prelude::*;

/// Placeholder printed wherever a secret would otherwise leak into output.
const REDACTED: &str = "<redacted>";

/// Redacted secret wrapper for bearer tokens, client secrets, and the
/// cookie-signing secret; keeps the raw material out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Byte length of the secret, for policy checks (e.g. minimum signing-key
	/// length) that must not expose the value itself.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns `true` when no secret material is present.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&REDACTED).finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(REDACTED)
	}
}
