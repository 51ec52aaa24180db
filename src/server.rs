//! HTTP surface: router, shared state, session cookie plumbing, handlers.

// crates.io
use axum::{
	Json, Router,
	extract::{FromRef, Path, Query, State},
	http::{HeaderMap, StatusCode, header},
	response::{IntoResponse, Redirect, Response},
	routing::{get, post},
};
use axum_extra::extract::{
	SignedCookieJar,
	cookie::{Cookie, Key, SameSite},
};
use reqwest::Method;
use serde_json::{Value, json};
use tower_http::{
	cors::{AllowOrigin, CorsLayer},
	trace::TraceLayer,
};
// self
use crate::{
	_prelude::*,
	broker::TokenBroker,
	claims::{self, Claims},
	config::BrokerConfig,
	error::ConfigError,
	gateway::GraphGateway,
	login::LoginFlow,
	provider::{HttpTokenService, TokenService},
	session::{MemorySessionStore, SessionId, SessionStore},
};

/// Name of the signed session cookie.
pub const SESSION_COOKIE: &str = "bff_session";

/// Shared state threaded through every handler.
#[derive(Clone)]
pub struct AppState {
	/// Credential selection and acquisition.
	pub broker: Arc<TokenBroker>,
	/// Interactive login orchestration.
	pub login: Arc<LoginFlow>,
	/// Downstream forwarding client.
	pub gateway: Arc<GraphGateway>,
	/// Session storage, shared with the broker and login flow.
	pub store: Arc<dyn SessionStore>,
	/// Immutable configuration.
	pub config: Arc<BrokerConfig>,
	cookie_key: Key,
}
impl AppState {
	/// Wires up the full state from configuration: one reqwest client shared
	/// by the token service and the gateway, an in-memory session store, and
	/// a cookie key derived from the session secret.
	pub fn new(config: BrokerConfig) -> Result<Self> {
		let http = ReqwestClient::builder().build().map_err(ConfigError::http_client_build)?;
		let service: Arc<dyn TokenService> = Arc::new(HttpTokenService::new(
			http.clone(),
			&config.authority,
			&config.client_id,
			config.client_secret.clone(),
		)?);

		Ok(Self::from_parts(config, service, http))
	}

	/// Wires up state around an externally supplied token service.
	pub fn from_parts(
		config: BrokerConfig,
		service: Arc<dyn TokenService>,
		http: ReqwestClient,
	) -> Self {
		let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::default());
		let broker = Arc::new(TokenBroker::new(
			store.clone(),
			service.clone(),
			&config.client_id,
			config.graph_scope.clone(),
		));
		let login = Arc::new(LoginFlow::new(
			store.clone(),
			service,
			config.authority.clone(),
			&config.client_id,
			config.redirect_uri.clone(),
			config.delegated_scopes.clone(),
		));
		let gateway = Arc::new(GraphGateway::new(http, config.graph_base.clone()));
		let cookie_key = Key::derive_from(config.session_secret.expose().as_bytes());

		Self { broker, login, gateway, store, config: Arc::new(config), cookie_key }
	}
}
impl FromRef<AppState> for Key {
	fn from_ref(state: &AppState) -> Self {
		state.cookie_key.clone()
	}
}

/// Builds the broker's router with CORS and request tracing attached.
pub fn router(state: AppState) -> Router {
	let frontend_origin = state.config.frontend_redirect_uri.origin().ascii_serialization();
	let cors = CorsLayer::new()
		.allow_origin(AllowOrigin::predicate(move |origin, _| {
			origin.as_bytes() == frontend_origin.as_bytes()
		}))
		.allow_credentials(true)
		.allow_methods([Method::GET, Method::POST])
		.allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

	Router::new()
		.route("/", get(root))
		.route("/api/claims", get(api_claims))
		.route("/auth/login", get(auth_login))
		.route("/auth/callback", get(auth_callback))
		.route("/auth/logout", post(auth_logout))
		.route("/api/me", get(api_me))
		.route("/api/users/{id}", get(api_user))
		.route("/api/users/{id}/photo", get(api_user_photo))
		.route("/api/obo/forward", post(api_obo_forward))
		.route("/api/forward", post(api_forward))
		.layer(cors)
		.layer(TraceLayer::new_for_http())
		.with_state(state)
}

async fn root() -> &'static str {
	"BFF running"
}

async fn api_claims(headers: HeaderMap) -> Response {
	match inbound_token(&headers) {
		Some((_, inbound)) => Json(Value::Object(inbound.as_map().clone())).into_response(),
		None => no_bearer_response(),
	}
}

async fn auth_login(State(state): State<AppState>, jar: SignedCookieJar) -> Response {
	let existing = session_id_from(&jar);

	match state.login.start(existing.as_ref()).await {
		Ok(started) => {
			let jar = jar.add(session_cookie(&started.session_id));

			(jar, Redirect::to(started.authorize_url.as_str())).into_response()
		},
		Err(err) => error_response("/auth/login", err),
	}
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
	code: Option<String>,
	state: Option<String>,
}

async fn auth_callback(
	State(state): State<AppState>,
	jar: SignedCookieJar,
	Query(params): Query<CallbackParams>,
) -> Response {
	let Some(session_id) = session_id_from(&jar) else {
		return error_response("/auth/callback", Error::StateMismatch);
	};
	let Some(code) = params.code else {
		return error_response(
			"/auth/callback",
			Error::InvalidRequest { reason: "code is required".into() },
		);
	};
	let Some(callback_state) = params.state else {
		return error_response("/auth/callback", Error::StateMismatch);
	};

	match state.login.complete(&session_id, &callback_state, &code).await {
		Ok(()) => Redirect::to(state.config.frontend_redirect_uri.as_str()).into_response(),
		Err(err) => error_response("/auth/callback", err),
	}
}

async fn auth_logout(State(state): State<AppState>, jar: SignedCookieJar) -> Response {
	if let Some(session_id) = session_id_from(&jar)
		&& let Err(err) = state.login.logout(&session_id).await
	{
		tracing::warn!(error = %err, "session destruction failed during logout");
	}

	let jar = jar.remove(clear_session_cookie());
	let body = json!({ "ok": true, "redirect": state.config.frontend_redirect_uri.as_str() });

	(jar, Json(body)).into_response()
}

async fn api_me(
	State(state): State<AppState>,
	jar: SignedCookieJar,
	headers: HeaderMap,
) -> Response {
	let (bearer, inbound) = split_inbound(&headers);
	let session_id = session_id_from(&jar);
	let session_account = match session_account(&state, session_id.as_ref()).await {
		Ok(account) => account,
		Err(err) => return error_response("/api/me", err),
	};

	// A user context is either decodable inbound claims or a logged-in session.
	if inbound.is_none() && session_account.is_none() {
		return no_bearer_response();
	}

	let user_id = match inbound.as_ref().and_then(Claims::user_id) {
		Some(id) => id.to_owned(),
		None => match session_account.flatten() {
			Some(account) => account,
			None => return error_response("/api/me", Error::MissingUserId),
		},
	};
	let token = match state
		.broker
		.acquire_downstream_token(session_id.as_ref(), inbound.as_ref(), bearer.as_deref())
		.await
	{
		Ok(token) => token,
		Err(err) => return error_response("/api/me", err),
	};
	let profile = match state.gateway.fetch_user(&user_id, &token.secret).await {
		Ok(profile) => profile,
		Err(err) => return error_response("/api/me", err),
	};
	// Many accounts have no photo; absence and failure both render as null.
	let photo_data_url = state.gateway.fetch_photo(&user_id, &token.secret).await.ok().flatten();
	let claims_value = inbound
		.map(|inbound| Value::Object(inbound.as_map().clone()))
		.unwrap_or(Value::Null);

	Json(json!({
		"profile": profile,
		"claims": claims_value,
		"photoDataUrl": photo_data_url,
	}))
	.into_response()
}

async fn api_user(
	State(state): State<AppState>,
	jar: SignedCookieJar,
	headers: HeaderMap,
	Path(id): Path<String>,
) -> Response {
	if id.trim().is_empty() {
		return error_response(
			"/api/users",
			Error::InvalidRequest { reason: "id is required".into() },
		);
	}

	let (bearer, inbound) = split_inbound(&headers);
	let session_id = session_id_from(&jar);
	let token = match state
		.broker
		.acquire_downstream_token(session_id.as_ref(), inbound.as_ref(), bearer.as_deref())
		.await
	{
		Ok(token) => token,
		Err(err) => return error_response("/api/users", err),
	};

	match state.gateway.fetch_user(&id, &token.secret).await {
		Ok(profile) => Json(profile).into_response(),
		Err(err) => error_response("/api/users", err),
	}
}

async fn api_user_photo(
	State(state): State<AppState>,
	jar: SignedCookieJar,
	headers: HeaderMap,
	Path(id): Path<String>,
) -> Response {
	if id.trim().is_empty() {
		return error_response(
			"/api/users/photo",
			Error::InvalidRequest { reason: "id is required".into() },
		);
	}

	let (bearer, inbound) = split_inbound(&headers);
	let session_id = session_id_from(&jar);
	let token = match state
		.broker
		.acquire_downstream_token(session_id.as_ref(), inbound.as_ref(), bearer.as_deref())
		.await
	{
		Ok(token) => token,
		Err(err) => return error_response("/api/users/photo", err),
	};

	match state.gateway.fetch_photo(&id, &token.secret).await {
		Ok(Some(photo_data_url)) => Json(json!({ "photoDataUrl": photo_data_url })).into_response(),
		Ok(None) => photo_not_found(),
		Err(err) => {
			tracing::warn!(error = %err, "photo fetch failed, reporting not found");

			photo_not_found()
		},
	}
}

#[derive(Debug, Deserialize)]
struct OboForwardRequest {
	#[serde(default = "default_method")]
	method: String,
	path: Option<String>,
	#[serde(default)]
	data: Option<Value>,
	#[serde(default)]
	headers: HashMap<String, String>,
}

async fn api_obo_forward(
	State(state): State<AppState>,
	jar: SignedCookieJar,
	headers: HeaderMap,
	Json(request): Json<OboForwardRequest>,
) -> Response {
	let Some(path) = request.path else {
		return error_response(
			"/api/obo/forward",
			Error::InvalidRequest { reason: "path is required".into() },
		);
	};
	let method = match parse_method(&request.method) {
		Ok(method) => method,
		Err(err) => return error_response("/api/obo/forward", err),
	};
	let (bearer, inbound) = split_inbound(&headers);
	let session_id = session_id_from(&jar);
	let token = match state
		.broker
		.delegated_token(session_id.as_ref(), inbound.as_ref(), bearer.as_deref())
		.await
	{
		Ok(token) => token,
		Err(err) => return error_response("/api/obo/forward", err),
	};

	match state
		.gateway
		.forward_path(method, &path, &token.secret, request.data, &request.headers)
		.await
	{
		Ok(body) => Json(body).into_response(),
		Err(err) => error_response("/api/obo/forward", err),
	}
}

#[derive(Debug, Deserialize)]
struct ForwardRequest {
	#[serde(default = "default_method")]
	method: String,
	url: Option<String>,
	#[serde(default)]
	data: Option<Value>,
	#[serde(default)]
	headers: HashMap<String, String>,
}

async fn api_forward(
	State(state): State<AppState>,
	Json(request): Json<ForwardRequest>,
) -> Response {
	let Some(url) = request.url else {
		return error_response(
			"/api/forward",
			Error::InvalidRequest { reason: "url is required".into() },
		);
	};
	let url = match Url::parse(&url) {
		Ok(url) => url,
		Err(_) =>
			return error_response(
				"/api/forward",
				Error::InvalidRequest { reason: "url is not valid".into() },
			),
	};
	let method = match parse_method(&request.method) {
		Ok(method) => method,
		Err(err) => return error_response("/api/forward", err),
	};
	// This endpoint always runs app-only, regardless of any user context.
	let token = match state.broker.acquire_downstream_token(None, None, None).await {
		Ok(token) => token,
		Err(err) => return error_response("/api/forward", err),
	};

	match state.gateway.forward_url(method, url, &token.secret, request.data, &request.headers).await
	{
		Ok(body) => Json(body).into_response(),
		Err(err) => error_response("/api/forward", err),
	}
}

fn default_method() -> String {
	"GET".into()
}

fn parse_method(raw: &str) -> Result<Method> {
	Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
		.map_err(|_| Error::InvalidRequest { reason: format!("unsupported method `{raw}`") })
}

/// Splits the `Authorization` header into the raw bearer token (the OBO
/// assertion) and its structurally decoded claims.
fn split_inbound(headers: &HeaderMap) -> (Option<String>, Option<Claims>) {
	match inbound_token(headers) {
		Some((token, inbound)) => (Some(token), Some(inbound)),
		None => (None, None),
	}
}

/// A token whose payload does not decode is treated exactly like an absent
/// one; the raw value never reaches the broker without claims to gate it.
fn inbound_token(headers: &HeaderMap) -> Option<(String, Claims)> {
	let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
	let (scheme, token) = value.split_once(' ')?;

	if !scheme.eq_ignore_ascii_case("bearer") {
		return None;
	}

	let token = token.trim().to_owned();
	let inbound = claims::from_compact_token(&token)?;

	Some((token, inbound))
}

/// `Some(account)` when the session holds tokens, `None` when there is no
/// usable session. The inner option is the stored account identifier.
async fn session_account(
	state: &AppState,
	session_id: Option<&SessionId>,
) -> Result<Option<Option<String>>> {
	let Some(id) = session_id else {
		return Ok(None);
	};
	let Some(session) = state.store.fetch(id).await? else {
		return Ok(None);
	};

	Ok(session.tokens.map(|tokens| tokens.account))
}

fn session_id_from(jar: &SignedCookieJar) -> Option<SessionId> {
	jar.get(SESSION_COOKIE).map(|cookie| SessionId::new(cookie.value()))
}

fn session_cookie(id: &SessionId) -> Cookie<'static> {
	Cookie::build((SESSION_COOKIE, id.as_str().to_owned()))
		.http_only(true)
		.same_site(SameSite::Lax)
		.path("/")
		.build()
}

fn clear_session_cookie() -> Cookie<'static> {
	Cookie::build((SESSION_COOKIE, "")).path("/").max_age(Duration::ZERO).build()
}

fn no_bearer_response() -> Response {
	(StatusCode::UNAUTHORIZED, Json(json!({ "error": "No bearer token provided" })))
		.into_response()
}

fn photo_not_found() -> Response {
	(StatusCode::NOT_FOUND, Json(json!({ "error": "Photo not found" }))).into_response()
}

fn error_response(endpoint: &'static str, err: Error) -> Response {
	let status = match &err {
		Error::NoUserCredential => StatusCode::UNAUTHORIZED,
		Error::StateMismatch
		| Error::AudienceMismatch
		| Error::MissingUserId
		| Error::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
		_ => StatusCode::INTERNAL_SERVER_ERROR,
	};
	let body = match &err {
		Error::Downstream { status: downstream_status, details } => json!({
			"error": err.to_string(),
			"details": details,
			"downstreamStatus": downstream_status,
		}),
		_ => json!({ "error": err.to_string() }),
	};

	if status.is_server_error() {
		tracing::error!(endpoint, error = %err, "request failed");
	} else {
		tracing::warn!(endpoint, error = %err, "request rejected");
	}

	(status, Json(body)).into_response()
}
