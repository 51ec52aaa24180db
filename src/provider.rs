//! Identity-provider token endpoint client and authorization URL assembly.
//!
//! All four grants the broker uses (authorization code, refresh, client
//! credentials, on-behalf-of) go through a single form-POST path so the
//! response mapping and error classification stay uniform. Endpoints are the
//! provider's v2.0 authorize/token paths under the configured authority,
//! which keeps sovereign-cloud authorities expressible through configuration.

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, SessionTokens, TokenSecret},
	claims,
	error::{ConfigError, TransientError},
};

/// Grant type identifier for the on-behalf-of exchange.
pub const OBO_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
/// Lifetime assumed when the provider omits `expires_in`.
const DEFAULT_EXPIRES_IN: Duration = Duration::seconds(3_600);

/// Future type returned by [`TokenService`] operations.
pub type ServiceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Token-endpoint contract implemented by provider clients.
///
/// Every operation yields a complete [`SessionTokens`] bundle with the expiry
/// already resolved to an absolute instant.
pub trait TokenService
where
	Self: Send + Sync,
{
	/// Redeems an authorization code from the login callback.
	fn exchange_code<'a>(
		&'a self,
		code: &'a str,
		redirect_uri: &'a Url,
		scope: &'a ScopeSet,
	) -> ServiceFuture<'a, SessionTokens>;

	/// Redeems a refresh token for a new bundle.
	fn refresh<'a>(
		&'a self,
		refresh_token: &'a str,
		scope: &'a ScopeSet,
	) -> ServiceFuture<'a, SessionTokens>;

	/// Acquires an app-only token via the client credentials grant.
	fn client_credentials<'a>(&'a self, scope: &'a ScopeSet) -> ServiceFuture<'a, SessionTokens>;

	/// Exchanges an inbound user assertion for a downstream token.
	fn on_behalf_of<'a>(
		&'a self,
		assertion: &'a str,
		scope: &'a ScopeSet,
	) -> ServiceFuture<'a, SessionTokens>;
}

/// Builds the v2.0 token endpoint under the given authority.
pub fn token_endpoint(authority: &Url) -> Result<Url, ConfigError> {
	endpoint(authority, "oauth2/v2.0/token")
}

/// Builds the v2.0 authorization endpoint under the given authority.
pub fn authorize_endpoint(authority: &Url) -> Result<Url, ConfigError> {
	endpoint(authority, "oauth2/v2.0/authorize")
}

/// Assembles the full authorization redirect URL for the login flow.
pub fn authorize_url(
	authority: &Url,
	client_id: &str,
	redirect_uri: &Url,
	scope: &ScopeSet,
	state: &str,
) -> Result<Url, ConfigError> {
	let mut url = authorize_endpoint(authority)?;

	url.query_pairs_mut()
		.append_pair("client_id", client_id)
		.append_pair("response_type", "code")
		.append_pair("response_mode", "query")
		.append_pair("redirect_uri", redirect_uri.as_str())
		.append_pair("scope", &scope.normalized())
		.append_pair("state", state);

	Ok(url)
}

fn endpoint(authority: &Url, suffix: &str) -> Result<Url, ConfigError> {
	let base = authority.as_str().trim_end_matches('/');

	Url::parse(&format!("{base}/{suffix}"))
		.map_err(|source| ConfigError::InvalidUrl { name: "BFF_AUTHORITY", source })
}

/// Reqwest-backed [`TokenService`] talking to the provider's token endpoint.
#[derive(Clone, Debug)]
pub struct HttpTokenService {
	http: ReqwestClient,
	token_endpoint: Url,
	client_id: String,
	client_secret: TokenSecret,
}
impl HttpTokenService {
	/// Creates a service for the given authority and client credentials.
	pub fn new(
		http: ReqwestClient,
		authority: &Url,
		client_id: impl Into<String>,
		client_secret: TokenSecret,
	) -> Result<Self, ConfigError> {
		Ok(Self {
			http,
			token_endpoint: token_endpoint(authority)?,
			client_id: client_id.into(),
			client_secret,
		})
	}

	async fn post_grant(
		&self,
		scope: &ScopeSet,
		form: Vec<(&'static str, String)>,
	) -> Result<SessionTokens> {
		let mut form = form;

		form.push(("client_id", self.client_id.clone()));
		form.push(("client_secret", self.client_secret.expose().to_owned()));

		let response = self
			.http
			.post(self.token_endpoint.clone())
			.form(&form)
			.send()
			.await
			.map_err(crate::error::TransportError::from)?;
		let status = response.status().as_u16();
		let body = response.text().await.map_err(crate::error::TransportError::from)?;

		if !(200..300).contains(&status) {
			return Err(classify_failure(status, &body));
		}

		parse_success(status, &body, scope.clone())
	}
}
impl TokenService for HttpTokenService {
	fn exchange_code<'a>(
		&'a self,
		code: &'a str,
		redirect_uri: &'a Url,
		scope: &'a ScopeSet,
	) -> ServiceFuture<'a, SessionTokens> {
		Box::pin(async move {
			self.post_grant(scope, vec![
				("grant_type", "authorization_code".into()),
				("code", code.into()),
				("redirect_uri", redirect_uri.to_string()),
				("scope", scope.normalized()),
			])
			.await
		})
	}

	fn refresh<'a>(
		&'a self,
		refresh_token: &'a str,
		scope: &'a ScopeSet,
	) -> ServiceFuture<'a, SessionTokens> {
		Box::pin(async move {
			self.post_grant(scope, vec![
				("grant_type", "refresh_token".into()),
				("refresh_token", refresh_token.into()),
				("scope", scope.normalized()),
			])
			.await
		})
	}

	fn client_credentials<'a>(&'a self, scope: &'a ScopeSet) -> ServiceFuture<'a, SessionTokens> {
		Box::pin(async move {
			self.post_grant(scope, vec![
				("grant_type", "client_credentials".into()),
				("scope", scope.normalized()),
			])
			.await
		})
	}

	fn on_behalf_of<'a>(
		&'a self,
		assertion: &'a str,
		scope: &'a ScopeSet,
	) -> ServiceFuture<'a, SessionTokens> {
		Box::pin(async move {
			self.post_grant(scope, vec![
				("grant_type", OBO_GRANT_TYPE.into()),
				("assertion", assertion.into()),
				("requested_token_use", "on_behalf_of".into()),
				("scope", scope.normalized()),
			])
			.await
		})
	}
}

#[derive(Debug, Deserialize)]
struct WireTokenResponse {
	access_token: String,
	refresh_token: Option<String>,
	expires_in: Option<i64>,
	expires_on: Option<i64>,
	id_token: Option<String>,
}

fn parse_success(status: u16, body: &str, scope: ScopeSet) -> Result<SessionTokens> {
	let mut deserializer = serde_json::Deserializer::from_str(body);
	let wire: WireTokenResponse = serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| TransientError::TokenResponseParse { source, status: Some(status) })?;
	let issued_at = OffsetDateTime::now_utc();
	let account = wire.id_token.as_deref().and_then(account_from_id_token);
	let mut builder = SessionTokens::builder(scope)
		.access_token(wire.access_token)
		.maybe_refresh_token(wire.refresh_token.map(TokenSecret::new))
		.maybe_account(account)
		.issued_at(issued_at);

	builder = match absolute_expiry(wire.expires_on) {
		Some(instant) => builder.expires_at(instant),
		None => builder
			.expires_in(wire.expires_in.map(Duration::seconds).unwrap_or(DEFAULT_EXPIRES_IN)),
	};

	Ok(builder.build().map_err(ConfigError::from)?)
}

fn absolute_expiry(expires_on: Option<i64>) -> Option<OffsetDateTime> {
	OffsetDateTime::from_unix_timestamp(expires_on?).ok()
}

fn account_from_id_token(id_token: &str) -> Option<String> {
	let claims = claims::from_compact_token(id_token)?;

	["preferred_username", "upn", "email", "oid", "sub"]
		.iter()
		.find_map(|name| claims.str_claim(name))
		.map(str::to_owned)
}

fn classify_failure(status: u16, body: &str) -> Error {
	let (oauth_error, description) = match serde_json::from_str::<Value>(body) {
		Ok(json) => (
			json.get("error").and_then(Value::as_str).map(str::to_owned),
			json.get("error_description").and_then(Value::as_str).map(str::to_owned),
		),
		Err(_) => (None, None),
	};
	let reason = description
		.clone()
		.or_else(|| oauth_error.clone())
		.unwrap_or_else(|| preview(body).into_owned());

	if let Some(error) = classify_oauth_error(oauth_error.as_deref(), description.as_deref()) {
		return build_classified(error, reason, status);
	}
	if let Some(error) = classify_body(Some(body)) {
		return build_classified(error, reason, status);
	}

	build_classified(classify_status(status), reason, status)
}

/// Canonical provider error categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FailureKind {
	InvalidGrant,
	InvalidClient,
	InsufficientScope,
	Transient,
}

fn build_classified(kind: FailureKind, reason: String, status: u16) -> Error {
	match kind {
		FailureKind::InvalidGrant => Error::InvalidGrant { reason },
		FailureKind::InvalidClient => Error::InvalidClient { reason },
		FailureKind::InsufficientScope => Error::InsufficientScope { reason },
		FailureKind::Transient =>
			TransientError::TokenEndpoint { message: reason, status: Some(status) }.into(),
	}
}

fn classify_oauth_error(
	oauth_error: Option<&str>,
	error_description: Option<&str>,
) -> Option<FailureKind> {
	oauth_error
		.and_then(match_exact_value)
		.or_else(|| error_description.and_then(match_exact_value))
		.or_else(|| classify_body(error_description))
}

fn match_exact_value(value: &str) -> Option<FailureKind> {
	if value.eq_ignore_ascii_case("invalid_grant") || value.eq_ignore_ascii_case("access_denied") {
		Some(FailureKind::InvalidGrant)
	} else if value.eq_ignore_ascii_case("invalid_client")
		|| value.eq_ignore_ascii_case("unauthorized_client")
	{
		Some(FailureKind::InvalidClient)
	} else if value.eq_ignore_ascii_case("invalid_scope")
		|| value.eq_ignore_ascii_case("insufficient_scope")
	{
		Some(FailureKind::InsufficientScope)
	} else if value.eq_ignore_ascii_case("temporarily_unavailable")
		|| value.eq_ignore_ascii_case("server_error")
	{
		Some(FailureKind::Transient)
	} else {
		None
	}
}

fn classify_body(body: Option<&str>) -> Option<FailureKind> {
	let body = body?;
	let lowered = body.to_ascii_lowercase();

	match lowered.as_str() {
		text if text.contains("invalid_grant") => Some(FailureKind::InvalidGrant),
		text if text.contains("invalid_client") => Some(FailureKind::InvalidClient),
		text if text.contains("insufficient_scope") || text.contains("invalid_scope") =>
			Some(FailureKind::InsufficientScope),
		text if text.contains("temporarily_unavailable") || text.contains("retry") =>
			Some(FailureKind::Transient),
		_ => None,
	}
}

fn classify_status(status: u16) -> FailureKind {
	match status {
		400 | 404 | 410 => FailureKind::InvalidGrant,
		401 => FailureKind::InvalidClient,
		403 => FailureKind::InsufficientScope,
		_ => FailureKind::Transient,
	}
}

const PREVIEW_LIMIT: usize = 256;

fn preview(body: &str) -> std::borrow::Cow<'_, str> {
	if body.chars().count() <= PREVIEW_LIMIT {
		return body.into();
	}

	let mut buf: String = body.chars().take(PREVIEW_LIMIT).collect();

	buf.push('…');

	buf.into()
}

#[cfg(test)]
mod tests {
	// crates.io
	use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
	// self
	use super::*;

	fn scope() -> ScopeSet {
		ScopeSet::new(["User.Read"]).expect("Scope fixture should be valid.")
	}

	#[test]
	fn authorize_url_carries_expected_parameters() {
		let authority = Url::parse("https://login.example.com/common").expect(
			"Authority fixture should parse.",
		);
		let redirect = Url::parse("http://localhost:3000/auth/callback").expect(
			"Redirect fixture should parse.",
		);
		let url = authorize_url(&authority, "client-1", &redirect, &scope(), "nonce-1")
			.expect("Authorize URL should assemble.");

		assert!(url.as_str().starts_with("https://login.example.com/common/oauth2/v2.0/authorize?"));

		let pairs: HashMap<_, _> = url.query_pairs().into_owned().collect();

		assert_eq!(pairs.get("client_id").map(String::as_str), Some("client-1"));
		assert_eq!(pairs.get("response_type").map(String::as_str), Some("code"));
		assert_eq!(pairs.get("state").map(String::as_str), Some("nonce-1"));
		assert_eq!(pairs.get("scope").map(String::as_str), Some("User.Read"));
		assert_eq!(
			pairs.get("redirect_uri").map(String::as_str),
			Some("http://localhost:3000/auth/callback"),
		);
	}

	#[test]
	fn endpoints_tolerate_trailing_slash() {
		let with_slash =
			Url::parse("https://login.example.com/tenant/").expect("Fixture should parse.");
		let endpoint = token_endpoint(&with_slash).expect("Token endpoint should assemble.");

		assert_eq!(endpoint.as_str(), "https://login.example.com/tenant/oauth2/v2.0/token");
	}

	#[test]
	fn success_parsing_defaults_missing_expiry() {
		let tokens = parse_success(200, r#"{"access_token":"at-1"}"#, scope())
			.expect("Minimal response should parse.");

		assert_eq!(tokens.access_token.expose(), "at-1");
		assert!(tokens.refresh_token.is_none());

		let lifetime = tokens.expires_at - tokens.issued_at;

		assert_eq!(lifetime, DEFAULT_EXPIRES_IN);
	}

	#[test]
	fn success_parsing_prefers_absolute_expiry() {
		let body = r#"{"access_token":"at-1","expires_in":60,"expires_on":4102444800}"#;
		let tokens = parse_success(200, body, scope()).expect("Response should parse.");

		assert_eq!(tokens.expires_at.unix_timestamp(), 4_102_444_800);
	}

	#[test]
	fn success_parsing_derives_account_from_id_token() {
		let payload = URL_SAFE_NO_PAD.encode(br#"{"preferred_username":"user@example.com"}"#);
		let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
		let body = format!(
			r#"{{"access_token":"at-1","expires_in":60,"id_token":"{header}.{payload}.sig"}}"#
		);
		let tokens = parse_success(200, &body, scope()).expect("Response should parse.");

		assert_eq!(tokens.account.as_deref(), Some("user@example.com"));
	}

	#[test]
	fn malformed_success_body_is_transient() {
		let err = parse_success(200, "not json", scope())
			.expect_err("Malformed body must be rejected.");

		assert!(matches!(err, Error::Transient(TransientError::TokenResponseParse { .. })));
	}

	#[test]
	fn failures_classify_by_oauth_error_field() {
		let invalid_grant =
			classify_failure(400, r#"{"error":"invalid_grant","error_description":"expired"}"#);
		let invalid_client = classify_failure(401, r#"{"error":"invalid_client"}"#);
		let scope_issue = classify_failure(403, r#"{"error":"insufficient_scope"}"#);

		assert!(matches!(invalid_grant, Error::InvalidGrant { reason } if reason == "expired"));
		assert!(matches!(invalid_client, Error::InvalidClient { .. }));
		assert!(matches!(scope_issue, Error::InsufficientScope { .. }));
	}

	#[test]
	fn failures_fall_back_to_status_classification() {
		assert!(matches!(classify_failure(400, "no hints"), Error::InvalidGrant { .. }));
		assert!(matches!(classify_failure(401, "no hints"), Error::InvalidClient { .. }));
		assert!(matches!(classify_failure(503, "no hints"), Error::Transient(_)));
	}
}
