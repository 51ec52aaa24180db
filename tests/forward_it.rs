//! Downstream proxy endpoints over the full router.

mod common;

// crates.io
use axum::{
	Router,
	body::Body,
	http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use httpmock::prelude::*;
use serde_json::{Value, json};
use tower::ServiceExt;
// self
use bff_broker::server::{self, AppState};

const TOKEN_PATH: &str = "/oauth2/v2.0/token";

fn router_over(provider: &MockServer, graph: &MockServer) -> Router {
	let config = common::test_config(&provider.base_url(), &graph.base_url());
	let state = AppState::new(config).expect("App state should wire up.");

	server::router(state)
}

async fn send(router: &Router, request: Request<Body>) -> axum::response::Response {
	router.clone().oneshot(request).await.expect("Router should answer.")
}

async fn json_body(response: axum::response::Response) -> Value {
	let bytes = response
		.into_body()
		.collect()
		.await
		.expect("Body should collect.")
		.to_bytes();

	serde_json::from_slice(&bytes).expect("Body should be JSON.")
}

fn json_post(uri: &str, body: &str) -> Request<Body> {
	Request::builder()
		.method("POST")
		.uri(uri)
		.header(header::CONTENT_TYPE, "application/json")
		.body(Body::from(body.to_owned()))
		.expect("Request should build.")
}

#[tokio::test]
async fn obo_forward_requires_a_user_credential() {
	let provider = MockServer::start_async().await;
	let graph = MockServer::start_async().await;
	let router = router_over(&provider, &graph);
	let response = send(&router, json_post("/api/obo/forward", r#"{"path":"/v1.0/me"}"#)).await;

	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn undecodable_bearer_counts_as_no_credential() {
	let provider = MockServer::start_async().await;
	let graph = MockServer::start_async().await;
	let token_mock = provider
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200).json_body(json!({ "access_token": "never-used" }));
		})
		.await;
	let router = router_over(&provider, &graph);
	let mut request = json_post("/api/obo/forward", r#"{"path":"/v1.0/me"}"#);

	request
		.headers_mut()
		.insert(header::AUTHORIZATION, "Bearer not-a-jwt".parse().expect("Header should parse."));

	let response = send(&router, request).await;

	// Same answer as sending no token at all.
	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

	token_mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn obo_forward_rejects_foreign_audiences_without_an_exchange() {
	let provider = MockServer::start_async().await;
	let graph = MockServer::start_async().await;
	let token_mock = provider
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200).json_body(json!({ "access_token": "never-used" }));
		})
		.await;
	let router = router_over(&provider, &graph);
	let bearer = common::compact_token(&json!({ "aud": "another-app" }));
	let mut request = json_post("/api/obo/forward", r#"{"path":"/v1.0/me"}"#);

	request
		.headers_mut()
		.insert(header::AUTHORIZATION, format!("Bearer {bearer}").parse().expect(
			"Header should parse.",
		));

	let response = send(&router, request).await;

	assert_eq!(response.status(), StatusCode::BAD_REQUEST);

	token_mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn obo_forward_exchanges_the_inbound_token_once() {
	let provider = MockServer::start_async().await;
	let graph = MockServer::start_async().await;
	let obo_mock = provider
		.mock_async(|when, then| {
			when.method(POST)
				.path(TOKEN_PATH)
				.form_urlencoded_tuple("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer")
				.form_urlencoded_tuple("requested_token_use", "on_behalf_of");
			then.status(200).json_body(json!({
				"access_token": "obo-access",
				"expires_in": 3600,
			}));
		})
		.await;
	let me_mock = graph
		.mock_async(|when, then| {
			when.method(GET).path("/v1.0/me").header("authorization", "Bearer obo-access");
			then.status(200).json_body(json!({ "id": "obj-1" }));
		})
		.await;
	let router = router_over(&provider, &graph);
	let bearer = common::compact_token(&json!({ "aud": common::CLIENT_ID, "oid": "obj-1" }));
	let mut request = json_post("/api/obo/forward", r#"{"path":"/v1.0/me"}"#);

	request
		.headers_mut()
		.insert(header::AUTHORIZATION, format!("Bearer {bearer}").parse().expect(
			"Header should parse.",
		));

	let response = send(&router, request).await;

	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(json_body(response).await, json!({ "id": "obj-1" }));

	obo_mock.assert_calls_async(1).await;
	me_mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn obo_forward_without_a_path_is_a_bad_request() {
	let provider = MockServer::start_async().await;
	let graph = MockServer::start_async().await;
	let router = router_over(&provider, &graph);
	let response = send(&router, json_post("/api/obo/forward", r#"{"method":"GET"}"#)).await;

	assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn user_lookup_runs_app_only_without_a_user_context() {
	let provider = MockServer::start_async().await;
	let graph = MockServer::start_async().await;
	let app_mock = provider
		.mock_async(|when, then| {
			when.method(POST)
				.path(TOKEN_PATH)
				.form_urlencoded_tuple("grant_type", "client_credentials");
			then.status(200).json_body(json!({
				"access_token": "app-access",
				"expires_in": 3600,
			}));
		})
		.await;
	let user_mock = graph
		.mock_async(|when, then| {
			when.method(GET)
				.path("/v1.0/users/u-1")
				.header("authorization", "Bearer app-access");
			then.status(200).json_body(json!({ "displayName": "Ada Lovelace" }));
		})
		.await;
	let router = router_over(&provider, &graph);
	let response = send(
		&router,
		Request::builder()
			.uri("/api/users/u-1")
			.body(Body::empty())
			.expect("Request should build."),
	)
	.await;

	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(json_body(response).await, json!({ "displayName": "Ada Lovelace" }));

	app_mock.assert_calls_async(1).await;
	user_mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn missing_photo_maps_to_a_local_not_found() {
	let provider = MockServer::start_async().await;
	let graph = MockServer::start_async().await;
	let _app_mock = provider
		.mock_async(|when, then| {
			when.method(POST)
				.path(TOKEN_PATH)
				.form_urlencoded_tuple("grant_type", "client_credentials");
			then.status(200).json_body(json!({
				"access_token": "app-access",
				"expires_in": 3600,
			}));
		})
		.await;
	let photo_mock = graph
		.mock_async(|when, then| {
			when.method(GET).path("/v1.0/users/u-1/photo/$value");
			then.status(404).body("");
		})
		.await;
	let router = router_over(&provider, &graph);
	let response = send(
		&router,
		Request::builder()
			.uri("/api/users/u-1/photo")
			.body(Body::empty())
			.expect("Request should build."),
	)
	.await;

	assert_eq!(response.status(), StatusCode::NOT_FOUND);
	assert_eq!(json_body(response).await, json!({ "error": "Photo not found" }));

	photo_mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn present_photo_renders_as_a_data_url() {
	let provider = MockServer::start_async().await;
	let graph = MockServer::start_async().await;
	let _app_mock = provider
		.mock_async(|when, then| {
			when.method(POST)
				.path(TOKEN_PATH)
				.form_urlencoded_tuple("grant_type", "client_credentials");
			then.status(200).json_body(json!({
				"access_token": "app-access",
				"expires_in": 3600,
			}));
		})
		.await;
	let _photo_mock = graph
		.mock_async(|when, then| {
			when.method(GET).path("/v1.0/users/u-1/photo/$value");
			then.status(200).header("content-type", "image/png").body("PNGDATA");
		})
		.await;
	let router = router_over(&provider, &graph);
	let response = send(
		&router,
		Request::builder()
			.uri("/api/users/u-1/photo")
			.body(Body::empty())
			.expect("Request should build."),
	)
	.await;

	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(
		json_body(response).await,
		json!({ "photoDataUrl": "data:image/png;base64,UE5HREFUQQ==" }),
	);
}

#[tokio::test]
async fn me_combines_profile_claims_and_photo() {
	let provider = MockServer::start_async().await;
	let graph = MockServer::start_async().await;
	let _obo_mock = provider
		.mock_async(|when, then| {
			when.method(POST)
				.path(TOKEN_PATH)
				.form_urlencoded_tuple("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer");
			then.status(200).json_body(json!({
				"access_token": "obo-access",
				"expires_in": 3600,
			}));
		})
		.await;
	let _user_mock = graph
		.mock_async(|when, then| {
			when.method(GET)
				.path("/v1.0/users/obj-1")
				.header("authorization", "Bearer obo-access");
			then.status(200).json_body(json!({ "displayName": "Ada Lovelace" }));
		})
		.await;
	let _photo_mock = graph
		.mock_async(|when, then| {
			when.method(GET).path("/v1.0/users/obj-1/photo/$value");
			then.status(404).body("");
		})
		.await;
	let router = router_over(&provider, &graph);
	let bearer = common::compact_token(&json!({ "aud": common::CLIENT_ID, "oid": "obj-1" }));
	let response = send(
		&router,
		Request::builder()
			.uri("/api/me")
			.header(header::AUTHORIZATION, format!("Bearer {bearer}"))
			.body(Body::empty())
			.expect("Request should build."),
	)
	.await;

	assert_eq!(response.status(), StatusCode::OK);

	let body = json_body(response).await;

	assert_eq!(body["profile"], json!({ "displayName": "Ada Lovelace" }));
	assert_eq!(body["claims"]["oid"], json!("obj-1"));
	assert!(body["photoDataUrl"].is_null());
}

#[tokio::test]
async fn me_without_any_credential_is_unauthorized() {
	let provider = MockServer::start_async().await;
	let graph = MockServer::start_async().await;
	let router = router_over(&provider, &graph);
	let response = send(
		&router,
		Request::builder().uri("/api/me").body(Body::empty()).expect("Request should build."),
	)
	.await;

	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn forward_requires_an_absolute_url() {
	let provider = MockServer::start_async().await;
	let graph = MockServer::start_async().await;
	let router = router_over(&provider, &graph);
	let missing = send(&router, json_post("/api/forward", r#"{"method":"GET"}"#)).await;
	let relative = send(&router, json_post("/api/forward", r#"{"url":"/v1.0/me"}"#)).await;

	assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
	assert_eq!(relative.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn forward_always_runs_app_only_even_with_a_user_present() {
	let provider = MockServer::start_async().await;
	let graph = MockServer::start_async().await;
	let app_mock = provider
		.mock_async(|when, then| {
			when.method(POST)
				.path(TOKEN_PATH)
				.form_urlencoded_tuple("grant_type", "client_credentials");
			then.status(200).json_body(json!({
				"access_token": "app-access",
				"expires_in": 3600,
			}));
		})
		.await;
	let obo_mock = provider
		.mock_async(|when, then| {
			when.method(POST)
				.path(TOKEN_PATH)
				.form_urlencoded_tuple("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer");
			then.status(200).json_body(json!({ "access_token": "never-used" }));
		})
		.await;
	let target_mock = graph
		.mock_async(|when, then| {
			when.method(POST)
				.path("/external/things")
				.header("authorization", "Bearer app-access")
				.header("x-correlation", "corr-1");
			then.status(200).json_body(json!({ "created": true }));
		})
		.await;
	let router = router_over(&provider, &graph);
	let bearer = common::compact_token(&json!({ "aud": common::CLIENT_ID }));
	let body = json!({
		"method": "post",
		"url": format!("{}/external/things", graph.base_url()),
		"data": { "name": "thing" },
		"headers": { "x-correlation": "corr-1" },
	});
	let mut request = json_post("/api/forward", &body.to_string());

	request
		.headers_mut()
		.insert(header::AUTHORIZATION, format!("Bearer {bearer}").parse().expect(
			"Header should parse.",
		));

	let response = send(&router, request).await;

	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(json_body(response).await, json!({ "created": true }));

	app_mock.assert_calls_async(1).await;
	obo_mock.assert_calls_async(0).await;
	target_mock.assert_calls_async(1).await;
}
