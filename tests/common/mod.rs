//! Shared fixtures for the integration suites.

#![allow(dead_code)]

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::Value;
use time::{Duration, OffsetDateTime};
// self
use bff_broker::{
	auth::{ScopeSet, SessionTokens},
	config::BrokerConfig,
};

pub const CLIENT_ID: &str = "bff-client";
pub const CLIENT_SECRET: &str = "bff-secret";
pub const SESSION_SECRET: &str = "0123456789abcdef0123456789abcdef0123456789abcdef";
pub const FRONTEND: &str = "http://localhost:4000";

/// Fabricates an unsigned compact JWT carrying the given payload.
pub fn compact_token(payload: &Value) -> String {
	let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
	let body = URL_SAFE_NO_PAD
		.encode(serde_json::to_vec(payload).expect("Token payload fixture should serialize."));

	format!("{header}.{body}.test-signature")
}

/// Builds a config pointing the provider and downstream at mock servers.
pub fn test_config(authority: &str, graph_base: &str) -> BrokerConfig {
	let pairs = [
		("BFF_CLIENT_ID", CLIENT_ID.to_owned()),
		("BFF_CLIENT_SECRET", CLIENT_SECRET.to_owned()),
		("BFF_AUTHORITY", authority.trim_end_matches('/').to_owned()),
		("BFF_GRAPH_BASE", graph_base.trim_end_matches('/').to_owned()),
		("BFF_SESSION_SECRET", SESSION_SECRET.to_owned()),
		("FRONTEND_REDIRECT_URI", FRONTEND.to_owned()),
		("BFF_REDIRECT_URI", "http://localhost:3000/auth/callback".to_owned()),
	];

	BrokerConfig::from_lookup(|name| {
		pairs.iter().find(|(key, _)| *key == name).map(|(_, value)| value.clone())
	})
	.expect("Test configuration should load.")
}

/// The scope the broker requests for downstream tokens in these suites.
pub fn graph_scope() -> ScopeSet {
	ScopeSet::new(["https://graph.microsoft.com/.default"])
		.expect("Graph scope fixture should be valid.")
}

/// Session tokens that stay fresh for the whole test.
pub fn fresh_tokens(access: &str) -> SessionTokens {
	SessionTokens::builder(graph_scope())
		.access_token(access)
		.refresh_token("seed-refresh")
		.account("seed-user@example.com")
		.issued_now()
		.expires_in(Duration::hours(1))
		.build()
		.expect("Fresh token fixture should build.")
}

/// Session tokens that already fail the freshness check.
pub fn stale_tokens(access: &str, refresh: Option<&str>) -> SessionTokens {
	let issued = OffsetDateTime::now_utc() - Duration::hours(1);
	let mut builder = SessionTokens::builder(graph_scope())
		.access_token(access)
		.account("seed-user@example.com")
		.issued_at(issued)
		.expires_at(issued + Duration::minutes(30));

	if let Some(refresh) = refresh {
		builder = builder.refresh_token(refresh);
	}

	builder.build().expect("Stale token fixture should build.")
}
