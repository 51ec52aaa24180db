//! Process configuration loaded from the environment.

// std
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
// crates.io
use rand::RngCore;
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
	error::ConfigError,
};

const DEFAULT_TENANT: &str = "common";
const DEFAULT_GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";
const DEFAULT_DELEGATED_SCOPES: &str = "openid,profile,offline_access,User.Read";
const DEFAULT_GRAPH_BASE: &str = "https://graph.microsoft.com";
const DEFAULT_FRONTEND: &str = "http://localhost:4000";
const DEFAULT_PORT: u16 = 3000;
/// Minimum byte length accepted for the cookie-signing secret.
const SESSION_SECRET_MIN_LEN: usize = 32;

/// Immutable broker configuration, loaded once at startup.
#[derive(Clone, Debug)]
pub struct BrokerConfig {
	/// OAuth client id registered for this broker.
	pub client_id: String,
	/// OAuth client secret.
	pub client_secret: TokenSecret,
	/// Provider authority the v2.0 endpoints hang off.
	pub authority: Url,
	/// Scopes requested for app-only and on-behalf-of downstream tokens.
	pub graph_scope: ScopeSet,
	/// Scopes requested during the interactive login.
	pub delegated_scopes: ScopeSet,
	/// Downstream graph API base URL (no version segment).
	pub graph_base: Url,
	/// Redirect URI registered for the authorization-code flow.
	pub redirect_uri: Url,
	/// Where the browser is sent after login/logout completes.
	pub frontend_redirect_uri: Url,
	/// Cookie-signing secret.
	pub session_secret: TokenSecret,
	/// Listening port.
	pub port: u16,
}
impl BrokerConfig {
	/// Loads configuration from process environment variables.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Loads configuration through an arbitrary lookup function.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let client_id = lookup("BFF_CLIENT_ID").unwrap_or_default();
		let client_secret = TokenSecret::new(lookup("BFF_CLIENT_SECRET").unwrap_or_default());

		// The original runs without provider credentials for local demos; app-only
		// and delegated flows will fail at the token endpoint instead of at boot.
		if client_id.is_empty() || client_secret.is_empty() {
			tracing::warn!(
				"BFF_CLIENT_ID / BFF_CLIENT_SECRET are not set, provider flows will be rejected",
			);
		}

		let tenant = lookup("BFF_TENANT_ID").unwrap_or_else(|| DEFAULT_TENANT.into());
		let authority = parse_url(
			"BFF_AUTHORITY",
			lookup("BFF_AUTHORITY")
				.unwrap_or_else(|| format!("https://login.microsoftonline.com/{tenant}")),
		)?;
		let graph_scope = ScopeSet::from_comma_separated(
			&lookup("BFF_GRAPH_SCOPE").unwrap_or_else(|| DEFAULT_GRAPH_SCOPE.into()),
		)?;
		let delegated_scopes = ScopeSet::from_comma_separated(
			&lookup("BFF_DELEGATED_SCOPES").unwrap_or_else(|| DEFAULT_DELEGATED_SCOPES.into()),
		)?;
		let graph_base = parse_url(
			"BFF_GRAPH_BASE",
			lookup("BFF_GRAPH_BASE").unwrap_or_else(|| DEFAULT_GRAPH_BASE.into()),
		)?;
		let port = match lookup("BFF_PORT") {
			Some(raw) =>
				raw.parse().map_err(|_| ConfigError::InvalidPort { name: "BFF_PORT" })?,
			None => DEFAULT_PORT,
		};
		let redirect_uri = parse_url(
			"BFF_REDIRECT_URI",
			lookup("BFF_REDIRECT_URI")
				.unwrap_or_else(|| format!("http://localhost:{port}/auth/callback")),
		)?;
		let frontend_redirect_uri = parse_url(
			"FRONTEND_REDIRECT_URI",
			lookup("FRONTEND_REDIRECT_URI").unwrap_or_else(|| DEFAULT_FRONTEND.into()),
		)?;
		let session_secret = match lookup("BFF_SESSION_SECRET").map(TokenSecret::new) {
			Some(secret) if secret.len() < SESSION_SECRET_MIN_LEN =>
				return Err(ConfigError::SessionSecretTooShort { min: SESSION_SECRET_MIN_LEN }),
			Some(secret) => secret,
			None => {
				tracing::warn!(
					"BFF_SESSION_SECRET is not set, using an ephemeral secret; \
					 sessions will not survive a restart",
				);

				TokenSecret::new(random_secret())
			},
		};

		Ok(Self {
			client_id,
			client_secret,
			authority,
			graph_scope,
			delegated_scopes,
			graph_base,
			redirect_uri,
			frontend_redirect_uri,
			session_secret,
			port,
		})
	}

	/// Socket address the server binds to.
	pub fn socket_addr(&self) -> SocketAddr {
		SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.port)
	}
}

fn parse_url(name: &'static str, raw: String) -> Result<Url, ConfigError> {
	Url::parse(&raw).map_err(|source| ConfigError::InvalidUrl { name, source })
}

fn random_secret() -> String {
	let mut bytes = [0_u8; 64];

	rand::rng().fill_bytes(&mut bytes);

	bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}
