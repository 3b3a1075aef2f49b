//! Session Store: the bearer token and the cached user profile.
//!
//! Persisted as two durable keys inside the session directory: `token` (raw string) and
//! `user` (JSON). Only authentication success, logout and the gateway's authorization
//! interceptor write here; everything else reads.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::domain::User;

const TOKEN_KEY: &str = "token";
const USER_KEY: &str = "user";

#[derive(Clone, Debug, PartialEq)]
pub struct Session {
  pub token: String,
  pub user: User,
}

pub struct SessionStore {
  dir: PathBuf,
  placeholders: Vec<String>,
  current: RwLock<Option<Session>>,
}

impl SessionStore {
  pub fn new(dir: impl Into<PathBuf>, placeholders: Vec<String>) -> Self {
    Self { dir: dir.into(), placeholders, current: RwLock::new(None) }
  }

  pub async fn current(&self) -> Option<Session> {
    self.current.read().await.clone()
  }

  pub async fn token(&self) -> Option<String> {
    self.current.read().await.as_ref().map(|s| s.token.clone())
  }

  pub async fn user(&self) -> Option<User> {
    self.current.read().await.as_ref().map(|s| s.user.clone())
  }

  /// Load a previously persisted session. Incomplete, unreadable or expired state is wiped.
  #[instrument(level = "info", skip(self), fields(dir = %self.dir.display()))]
  pub async fn restore(&self) -> Option<Session> {
    let token = read_key(&self.dir, TOKEN_KEY).await;
    let user = read_key(&self.dir, USER_KEY).await;

    let (token, user_json) = match (token, user) {
      (Some(t), Some(u)) if !t.trim().is_empty() => (t.trim().to_string(), u),
      (None, None) => return None,
      _ => {
        warn!(target: "session", "Incomplete persisted session; clearing");
        self.clear().await;
        return None;
      }
    };

    let user = match serde_json::from_str::<User>(&user_json) {
      Ok(u) => normalize_user(u, &self.placeholders),
      Err(e) => {
        warn!(target: "session", error = %e, "Persisted user is not valid JSON; clearing");
        self.clear().await;
        return None;
      }
    };

    if token_expired(&token, Utc::now().timestamp()) {
      info!(target: "session", user_id = %user.id, "Persisted token has expired; clearing");
      self.clear().await;
      return None;
    }

    let session = Session { token, user };
    *self.current.write().await = Some(session.clone());
    info!(target: "session", user_id = %session.user.id, role = %session.user.role, "Session restored");
    Some(session)
  }

  /// Normalize and persist the outcome of a successful authentication.
  #[instrument(level = "info", skip(self, token, user), fields(user_id = %user.id))]
  pub async fn establish(&self, token: String, user: User) -> Session {
    let session = Session { token, user: normalize_user(user, &self.placeholders) };
    if let Err(e) = self.persist(&session).await {
      // The in-memory session still works; only restart survival is lost.
      warn!(target: "session", error = %e, "Failed to persist session");
    }
    *self.current.write().await = Some(session.clone());
    session
  }

  /// Drop the session from memory and durable storage. Returns whether one was active.
  #[instrument(level = "info", skip(self))]
  pub async fn clear(&self) -> bool {
    let had = self.current.write().await.take().is_some();
    for key in [TOKEN_KEY, USER_KEY] {
      let path = self.dir.join(key);
      if let Err(e) = tokio::fs::remove_file(&path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
          warn!(target: "session", path = %path.display(), error = %e, "Failed to remove session key");
        }
      }
    }
    debug!(target: "session", had, "Session cleared");
    had
  }

  async fn persist(&self, session: &Session) -> std::io::Result<()> {
    tokio::fs::create_dir_all(&self.dir).await?;
    let user_json = serde_json::to_string(&session.user)?;
    tokio::fs::write(self.dir.join(TOKEN_KEY), &session.token).await?;
    tokio::fs::write(self.dir.join(USER_KEY), user_json).await?;
    Ok(())
  }
}

async fn read_key(dir: &Path, key: &str) -> Option<String> {
  tokio::fs::read_to_string(dir.join(key)).await.ok()
}

/// Placeholder images the backend hands out are treated as "no image".
pub fn normalize_user(mut user: User, placeholders: &[String]) -> User {
  let is_placeholder = |img: &str| {
    let img = img.trim();
    img.is_empty()
      || placeholders
        .iter()
        .any(|p| img == p || img.ends_with(&format!("/{}", p.trim_start_matches('/'))))
  };
  if user.profile_image.as_deref().is_some_and(is_placeholder) {
    user.profile_image = None;
  }
  user
}

/// True when the token is a JWT whose `exp` claim is at or before `now` (unix seconds).
/// Opaque tokens are never considered expired locally.
pub fn token_expired(token: &str, now: i64) -> bool {
  #[derive(Deserialize)]
  struct Claims { exp: Option<i64> }

  let mut parts = token.split('.');
  let (Some(_header), Some(payload), Some(_sig)) = (parts.next(), parts.next(), parts.next()) else {
    return false;
  };
  let Ok(bytes) = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')) else {
    return false;
  };
  match serde_json::from_slice::<Claims>(&bytes) {
    Ok(Claims { exp: Some(exp) }) => exp <= now,
    _ => false,
  }
}
