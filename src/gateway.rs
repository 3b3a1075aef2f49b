//! API Gateway helper: the single collaborator for all network I/O.
//!
//! Resolves paths against the configured base URL, attaches the bearer token, bounds every
//! request with a timeout and maps transport/HTTP outcomes into `ApiError`. Authorization
//! failures on authenticated calls clear the session here, once, for every call site.
//!
//! Requests are plain futures: dropping one (view teardown, `select!` losing branch) aborts
//! the underlying HTTP exchange.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, instrument, warn};

use crate::error::ApiError;
use crate::protocol::extract_error_message;
use crate::session::SessionStore;
use crate::util::trunc_for_log;

const CLIENT_UA: &str = concat!("challenge-hub-client/", env!("CARGO_PKG_VERSION"));

pub type AuthLostHook = Arc<dyn Fn(u16) + Send + Sync>;

#[derive(Clone)]
pub struct Gateway {
  client: reqwest::Client,
  base_url: String,
  timeout: Duration,
  session: Arc<SessionStore>,
  on_auth_lost: Option<AuthLostHook>,
}

impl Gateway {
  pub fn new(base_url: &str, timeout: Duration, session: Arc<SessionStore>) -> Result<Self, ApiError> {
    let client = reqwest::Client::builder()
      .connect_timeout(timeout)
      .build()
      .map_err(|e| ApiError::Transport(e.to_string()))?;
    Ok(Self {
      client,
      base_url: base_url.trim_end_matches('/').to_string(),
      timeout,
      session,
      on_auth_lost: None,
    })
  }

  /// Called after the session was invalidated by a 401/403.
  pub fn with_auth_lost_hook(mut self, hook: AuthLostHook) -> Self {
    self.on_auth_lost = Some(hook);
    self
  }

  pub fn session(&self) -> &Arc<SessionStore> {
    &self.session
  }

  pub fn base_url(&self) -> &str {
    &self.base_url
  }

  /// Absolute URLs pass through; relative paths are joined onto the base URL.
  pub fn url(&self, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
      return path.to_string();
    }
    format!("{}/{}", self.base_url, path.trim_start_matches('/'))
  }

  /// JSON request with JSON response.
  pub async fn json<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, ApiError>
  where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
  {
    self.json_with_timeout(method, path, body, self.timeout).await
  }

  #[instrument(level = "debug", skip_all, fields(%method, %path))]
  pub async fn json_with_timeout<B, T>(
    &self,
    method: Method,
    path: &str,
    body: Option<&B>,
    timeout: Duration,
  ) -> Result<T, ApiError>
  where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
  {
    let mut req = self.client.request(method, self.url(path));
    if let Some(b) = body {
      req = req.json(b);
    }
    let res = self.execute(req, timeout).await?;
    decode_json(res).await
  }

  /// Request whose success carries no meaningful body (deletes, role updates).
  #[instrument(level = "debug", skip_all, fields(%method, %path))]
  pub async fn send<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<(), ApiError>
  where
    B: Serialize + ?Sized,
  {
    let mut req = self.client.request(method, self.url(path));
    if let Some(b) = body {
      req = req.json(b);
    }
    let res = self.execute(req, self.timeout).await?;
    let status = res.status();
    let text = res.text().await?;
    reject_success_false(status, &text)
  }

  /// Multipart upload; the file part is named `file`.
  #[instrument(level = "debug", skip_all, fields(%path, %file_name, size = bytes.len()))]
  pub async fn upload<T: DeserializeOwned>(&self, path: &str, file_name: &str, bytes: Vec<u8>) -> Result<T, ApiError> {
    let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string());
    let form = reqwest::multipart::Form::new().part("file", part);
    let req = self.client.post(self.url(path)).multipart(form);
    let res = self.execute(req, self.timeout).await?;
    decode_json(res).await
  }

  /// Attach common headers and the bearer token, send, and classify the HTTP status.
  async fn execute(&self, req: RequestBuilder, timeout: Duration) -> Result<Response, ApiError> {
    let token = self.session.token().await;
    let mut req = req
      .timeout(timeout)
      .header(USER_AGENT, CLIENT_UA)
      .header(ACCEPT, "application/json");
    if let Some(t) = &token {
      req = req.header(AUTHORIZATION, format!("Bearer {t}"));
    }

    let res = req.send().await.map_err(|e| {
      let err = ApiError::from(e);
      warn!(target: "api", error = %err, "Request did not complete");
      err
    })?;

    let status = res.status();
    debug!(target: "api", status = status.as_u16(), url = %res.url(), "Response received");
    if status.is_success() {
      return Ok(res);
    }

    let body = res.text().await.unwrap_or_default();
    let message = extract_error_message(&body);
    match status {
      StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN if token.is_some() => {
        warn!(target: "api", status = status.as_u16(), "Authorization rejected; ending session");
        if self.session.clear().await {
          if let Some(hook) = &self.on_auth_lost {
            hook(status.as_u16());
          }
        }
        Err(ApiError::Unauthorized { status: status.as_u16() })
      }
      StatusCode::NOT_FOUND => Err(ApiError::NotFound),
      _ => {
        error!(target: "api", status = status.as_u16(), body = %trunc_for_log(&body, 200), "Server reported failure");
        Err(ApiError::Server { status: status.as_u16(), message })
      }
    }
  }
}

/// Some endpoints answer 2xx with `{ success: false, message }`.
fn reject_success_false(status: StatusCode, text: &str) -> Result<(), ApiError> {
  if let Ok(v) = serde_json::from_str::<serde_json::Value>(text) {
    if v.get("success").and_then(|s| s.as_bool()) == Some(false) {
      return Err(ApiError::Server { status: status.as_u16(), message: extract_error_message(text) });
    }
  }
  Ok(())
}

async fn decode_json<T: DeserializeOwned>(res: Response) -> Result<T, ApiError> {
  let status = res.status();
  let text = res.text().await?;
  reject_success_false(status, &text)?;
  serde_json::from_str::<T>(&text).map_err(|e| {
    error!(target: "api", error = %e, body = %trunc_for_log(&text, 200), "Failed to decode response");
    ApiError::Decode(e.to_string())
  })
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU16, Ordering};

  use axum::http::{HeaderMap, StatusCode as AxStatus};
  use axum::routing::{delete, get, post};
  use axum::{Json, Router};
  use serde_json::{json, Value};

  use crate::session::tests::{student, temp_dir};

  /// Serve `app` on an ephemeral port and return its base URL.
  pub(crate) async fn spawn_stub(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
      let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}/api")
  }

  pub(crate) fn gateway(base: &str) -> Gateway {
    let store = Arc::new(SessionStore::new(temp_dir(), vec![]));
    Gateway::new(base, Duration::from_secs(2), store).expect("gateway")
  }

  fn stub_router() -> Router {
    Router::new()
      .route(
        "/api/echo-auth",
        get(|headers: HeaderMap| async move {
          let auth = headers.get("authorization").and_then(|v| v.to_str().ok()).unwrap_or("").to_string();
          Json(json!({ "auth": auth }))
        }),
      )
      .route("/api/forbidden", get(|| async { (AxStatus::FORBIDDEN, Json(json!({ "message": "nope" }))) }))
      .route("/api/missing", get(|| async { (AxStatus::NOT_FOUND, Json(json!({ "message": "gone" }))) }))
      .route("/api/broken", post(|| async { (AxStatus::BAD_REQUEST, Json(json!({ "message": "Title is required" }))) }))
      .route("/api/soft-fail", get(|| async { Json(json!({ "success": false, "message": "Quota exceeded" })) }))
      .route("/api/gone", delete(|| async { AxStatus::NO_CONTENT }))
      .route(
        "/api/slow",
        get(|| async {
          tokio::time::sleep(Duration::from_secs(5)).await;
          Json(json!({}))
        }),
      )
  }

  #[test]
  fn url_joins_relative_paths() {
    let store = Arc::new(SessionStore::new(temp_dir(), vec![]));
    let gw = Gateway::new("http://h/api/", Duration::from_secs(1), store).expect("gateway");
    assert_eq!(gw.url("/problems"), "http://h/api/problems");
    assert_eq!(gw.url("quiz/submit"), "http://h/api/quiz/submit");
    assert_eq!(gw.url("https://cdn/x"), "https://cdn/x");
  }

  #[tokio::test]
  async fn bearer_token_is_attached_when_session_exists() {
    let gw = gateway(&spawn_stub(stub_router()).await);
    let v: Value = gw.json::<(), _>(Method::GET, "/echo-auth", None).await.expect("echo");
    assert_eq!(v["auth"], "");

    gw.session().establish("tok-1".into(), student()).await;
    let v: Value = gw.json::<(), _>(Method::GET, "/echo-auth", None).await.expect("echo");
    assert_eq!(v["auth"], "Bearer tok-1");
  }

  #[tokio::test]
  async fn forbidden_with_token_clears_session_and_fires_hook_once() {
    let fired = Arc::new(AtomicU16::new(0));
    let seen = fired.clone();
    let gw = gateway(&spawn_stub(stub_router()).await)
      .with_auth_lost_hook(Arc::new(move |status| seen.store(status, Ordering::SeqCst)));
    gw.session().establish("tok".into(), student()).await;

    let err = gw.json::<(), Value>(Method::GET, "/forbidden", None).await.unwrap_err();
    assert_eq!(err, ApiError::Unauthorized { status: 403 });
    assert_eq!(fired.load(Ordering::SeqCst), 403);
    assert!(gw.session().current().await.is_none());

    // Without a token a 403 is an ordinary server failure.
    let err = gw.json::<(), Value>(Method::GET, "/forbidden", None).await.unwrap_err();
    assert_eq!(err, ApiError::Server { status: 403, message: Some("nope".into()) });
  }

  #[tokio::test]
  async fn statuses_map_into_taxonomy() {
    let gw = gateway(&spawn_stub(stub_router()).await);
    let err = gw.json::<(), Value>(Method::GET, "/missing", None).await.unwrap_err();
    assert_eq!(err, ApiError::NotFound);

    let err = gw.json::<Value, Value>(Method::POST, "/broken", Some(&json!({}))).await.unwrap_err();
    assert_eq!(err.user_message(), "Title is required");

    let err = gw.json::<(), Value>(Method::GET, "/soft-fail", None).await.unwrap_err();
    assert_eq!(err.user_message(), "Quota exceeded");

    gw.send::<()>(Method::DELETE, "/gone", None).await.expect("delete");
  }

  #[tokio::test]
  async fn slow_requests_time_out() {
    let gw = gateway(&spawn_stub(stub_router()).await);
    let err = gw
      .json_with_timeout::<(), Value>(Method::GET, "/slow", None, Duration::from_millis(200))
      .await
      .unwrap_err();
    assert_eq!(err, ApiError::Timeout);
  }

  #[tokio::test]
  async fn truncated_body_on_send_is_an_error() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
      let (mut sock, _) = listener.accept().await.expect("accept");
      let mut buf = [0u8; 2048];
      let _ = sock.read(&mut buf).await;
      let _ = sock.write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 64\r\n\r\n{\"success\":").await;
    });
    let gw = gateway(&format!("http://{addr}/api"));
    let err = gw.send::<()>(Method::DELETE, "/problems/p1", None).await.unwrap_err();
    assert!(matches!(err, ApiError::Transport(_) | ApiError::Decode(_)), "{err:?}");
  }

  #[tokio::test]
  async fn unreachable_backend_is_a_transport_error() {
    let gw = gateway("http://127.0.0.1:9/api");
    let err = gw.json::<(), Value>(Method::GET, "/problems", None).await.unwrap_err();
    assert!(matches!(err, ApiError::Transport(_) | ApiError::Timeout), "{err:?}");
  }
}
