//! Forwarding gateway to the downstream graph API.
//!
//! Carries an acquired bearer token downstream and relays the response. The
//! profile photo helpers re-encode the image bytes as a data URL so the SPA
//! can drop them straight into an `img` tag.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::Method;
use serde_json::Value;
// self
use crate::{_prelude::*, auth::TokenSecret, error::TransportError};

/// Media type assumed when the downstream omits `Content-Type` on a photo.
const DEFAULT_PHOTO_MIME: &str = "image/jpeg";

/// Reqwest-backed client for the downstream graph API.
#[derive(Clone, Debug)]
pub struct GraphGateway {
	http: ReqwestClient,
	base_url: Url,
}
impl GraphGateway {
	/// Creates a gateway rooted at the downstream base URL (no version
	/// segment; callers address `v1.0/...` paths explicitly).
	pub fn new(http: ReqwestClient, base_url: Url) -> Self {
		Self { http, base_url }
	}

	/// Fetches a user's profile object by identifier.
	pub async fn fetch_user(&self, id: &str, token: &TokenSecret) -> Result<Value> {
		let url = self.endpoint(&format!("v1.0/users/{id}"))?;

		self.dispatch(Method::GET, url, token, None, &HashMap::new()).await
	}

	/// Fetches a user's photo as a `data:` URL.
	///
	/// A downstream 404 means the user has no photo and maps to `Ok(None)`;
	/// any other non-success status is a downstream error.
	pub async fn fetch_photo(&self, id: &str, token: &TokenSecret) -> Result<Option<String>> {
		let url = self.endpoint(&format!("v1.0/users/{id}/photo/$value"))?;
		let response = self
			.http
			.get(url)
			.bearer_auth(token.expose())
			.send()
			.await
			.map_err(TransportError::from)?;
		let status = response.status();

		if status.as_u16() == 404 {
			return Ok(None);
		}
		if !status.is_success() {
			let body = response.text().await.map_err(TransportError::from)?;

			return Err(downstream_error(status.as_u16(), &body));
		}

		let mime = response
			.headers()
			.get(reqwest::header::CONTENT_TYPE)
			.and_then(|value| value.to_str().ok())
			.unwrap_or(DEFAULT_PHOTO_MIME)
			.to_owned();
		let bytes = response.bytes().await.map_err(TransportError::from)?;

		Ok(Some(format!("data:{mime};base64,{}", STANDARD.encode(&bytes))))
	}

	/// Forwards a request to a path under the downstream base URL.
	pub async fn forward_path(
		&self,
		method: Method,
		path: &str,
		token: &TokenSecret,
		body: Option<Value>,
		headers: &HashMap<String, String>,
	) -> Result<Value> {
		let url = self.endpoint(path)?;

		self.dispatch(method, url, token, body, headers).await
	}

	/// Forwards a request to an absolute URL, bypassing the base.
	pub async fn forward_url(
		&self,
		method: Method,
		url: Url,
		token: &TokenSecret,
		body: Option<Value>,
		headers: &HashMap<String, String>,
	) -> Result<Value> {
		self.dispatch(method, url, token, body, headers).await
	}

	/// Success bodies parse as JSON when present (empty bodies relay as
	/// `null`); non-success responses map to [`Error::Downstream`] with the
	/// downstream status and payload attached.
	async fn dispatch(
		&self,
		method: Method,
		url: Url,
		token: &TokenSecret,
		body: Option<Value>,
		headers: &HashMap<String, String>,
	) -> Result<Value> {
		let mut request = self.http.request(method, url).bearer_auth(token.expose());

		for (name, value) in headers {
			request = request.header(name, value);
		}
		if let Some(body) = body {
			request = request.json(&body);
		}

		let response = request.send().await.map_err(TransportError::from)?;
		let status = response.status();
		let text = response.text().await.map_err(TransportError::from)?;

		if !status.is_success() {
			return Err(downstream_error(status.as_u16(), &text));
		}
		if text.is_empty() {
			return Ok(Value::Null);
		}

		serde_json::from_str(&text).map_err(|_| downstream_error(status.as_u16(), &text))
	}

	/// Resolves a caller-supplied relative path against the base URL.
	///
	/// Segments are pushed individually so characters unsafe in a path end up
	/// percent-encoded; an attached query string is preserved verbatim.
	fn endpoint(&self, path: &str) -> Result<Url> {
		let trimmed = path.trim_start_matches('/');

		if trimmed.is_empty() {
			return Err(Error::InvalidRequest { reason: "forward path is empty".into() });
		}

		let (path_part, query) = match trimmed.split_once('?') {
			Some((path_part, query)) => (path_part, Some(query)),
			None => (trimmed, None),
		};
		let mut url = self.base_url.clone();

		{
			let mut segments = url.path_segments_mut().map_err(|()| Error::InvalidRequest {
				reason: "downstream base URL cannot hold a path".into(),
			})?;

			segments.pop_if_empty();

			for segment in path_part.split('/').filter(|s| !s.is_empty()) {
				segments.push(segment);
			}
		}

		url.set_query(query);

		Ok(url)
	}
}

fn downstream_error(status: u16, body: &str) -> Error {
	let details = match serde_json::from_str::<Value>(body) {
		Ok(json) => json,
		Err(_) if body.is_empty() => Value::Null,
		Err(_) => Value::String(body.to_owned()),
	};

	Error::Downstream { status: Some(status), details }
}
