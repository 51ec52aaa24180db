//! Structural bearer-claims extraction and audience matching.
//!
//! Tokens are decoded without signature verification: the payload segment is
//! base64-decoded and parsed as JSON, nothing more. The claims are therefore
//! advisory and must never be treated as authentication on their own; see the
//! crate docs for the verification requirement a hardened deployment adds.
//! The audience matcher additionally accepts any audience that merely
//! *contains* the client id as a substring, which is wider than exact
//! matching; tightening it to equality or the `api://` form is the
//! recommended follow-up.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::{Map, Value};
// self
use crate::_prelude::*;

/// Claims pulled from an inbound bearer token's payload segment.
///
/// Decoding is best-effort: any malformed header, token, or payload yields
/// `None` at the extraction functions rather than an error, because an
/// unreadable token and an absent token are handled identically downstream.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
	values: Map<String, Value>,
}
impl Claims {
	/// Wraps an already-parsed claims object.
	pub fn new(values: Map<String, Value>) -> Self {
		Self { values }
	}

	/// Returns a claim as a string slice, if present and a JSON string.
	pub fn str_claim(&self, name: &str) -> Option<&str> {
		self.values.get(name).and_then(Value::as_str)
	}

	/// Returns every audience the token was issued for.
	///
	/// The `aud` claim may be a single string or an array of strings; both
	/// forms normalize to a list here.
	pub fn audiences(&self) -> Vec<&str> {
		match self.values.get("aud") {
			Some(Value::String(aud)) => vec![aud.as_str()],
			Some(Value::Array(auds)) => auds.iter().filter_map(Value::as_str).collect(),
			_ => Vec::new(),
		}
	}

	/// Returns the authorized-party claim, preferring `azp` over the legacy
	/// `appid` spelling.
	pub fn authorized_party(&self) -> Option<&str> {
		self.str_claim("azp").or_else(|| self.str_claim("appid"))
	}

	/// Derives a stable user identifier from the claims.
	///
	/// Prefers the provider's object id, then the subject, then the
	/// human-readable identifiers.
	pub fn user_id(&self) -> Option<&str> {
		["oid", "sub", "upn", "preferred_username"].iter().find_map(|name| self.str_claim(name))
	}

	/// Checks whether the token was issued for the given client application.
	///
	/// Accepts an exact audience match, the `api://{client_id}` application
	/// id URI form, an audience or authorized party containing the client id
	/// as a substring, or an authorized-party match. An empty client id never
	/// matches; the substring rule would otherwise accept every token.
	pub fn is_for_client(&self, client_id: &str) -> bool {
		if client_id.is_empty() {
			return false;
		}

		let uri_form = format!("api://{client_id}");

		if self.audiences().iter().any(|aud| {
			*aud == client_id || *aud == uri_form.as_str() || aud.contains(client_id)
		}) {
			return true;
		}

		self.authorized_party().is_some_and(|party| party.contains(client_id))
	}

	/// Returns the raw claims map.
	pub fn as_map(&self) -> &Map<String, Value> {
		&self.values
	}
}

/// Extracts claims from an `Authorization` header value.
///
/// Returns `None` unless the value carries a `Bearer` scheme (matched
/// case-insensitively) followed by a structurally decodable token.
pub fn from_authorization_header(header: &str) -> Option<Claims> {
	let (scheme, token) = header.split_once(' ')?;

	if !scheme.eq_ignore_ascii_case("bearer") {
		return None;
	}

	from_compact_token(token.trim())
}

/// Extracts claims from a compact JWT without verifying its signature.
///
/// The token must have at least a header and a payload segment; the payload
/// must decode from URL-safe base64 (padding optional) into a JSON object.
pub fn from_compact_token(token: &str) -> Option<Claims> {
	let mut segments = token.split('.');
	let _header = segments.next()?;
	let payload = segments.next()?;
	let bytes = decode_segment(payload)?;

	match serde_json::from_slice(&bytes) {
		Ok(Value::Object(values)) => Some(Claims::new(values)),
		_ => None,
	}
}

fn decode_segment(segment: &str) -> Option<Vec<u8>> {
	URL_SAFE_NO_PAD.decode(segment.trim_end_matches('=')).ok()
}
