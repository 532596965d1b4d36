//! In-memory sessions with per-session CSRF tokens.
//!
//! A session is created by `GET /` and identified by the
//! [`SESSION_COOKIE`] cookie. The id is generated server side; an unknown id
//! presented by a client is never adopted. Idle sessions expire after the
//! configured TTL and are swept whenever a new session is created.

use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use subtle::ConstantTimeEq;
use tracing::debug;

pub const SESSION_COOKIE: &str = "bilancio_session";

#[derive(Debug, Clone)]
pub struct Session {
    /// 32 hex characters.
    pub id: String,
    pub csrf_token: String,
    /// Name of the last PDF generated in this session.
    pub output_file: Option<String>,
    last_seen: Instant,
}

impl Session {
    fn new() -> Self {
        Self {
            id: hex::encode(rand::random::<[u8; 16]>()),
            csrf_token: new_csrf_token(),
            output_file: None,
            last_seen: Instant::now(),
        }
    }
}

/// 32 random bytes, URL-safe base64.
pub fn new_csrf_token() -> String {
    URL_SAFE_NO_PAD.encode(rand::random::<[u8; 32]>())
}

/// Shared session table. Cloning shares the table.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<String, Session>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    // Session data stays consistent even if a holder panicked: every
    // mutation is a single field assignment.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the live session for `id`, or start a new one.
    pub fn get_or_create(&self, id: Option<&str>) -> Session {
        let mut sessions = self.lock();
        let now = Instant::now();

        if let Some(session) = id.and_then(|id| sessions.get_mut(id)) {
            if now.duration_since(session.last_seen) <= self.ttl {
                session.last_seen = now;
                return session.clone();
            }
        }

        let ttl = self.ttl;
        let before = sessions.len();
        sessions.retain(|_, s| now.duration_since(s.last_seen) <= ttl);
        if sessions.len() < before {
            debug!("Swept {} expired session(s)", before - sessions.len());
        }

        let session = Session::new();
        sessions.insert(session.id.clone(), session.clone());
        session
    }

    /// The live session for `id`, refreshing its idle timer.
    pub fn get(&self, id: &str) -> Option<Session> {
        let mut sessions = self.lock();
        let session = sessions.get_mut(id)?;
        if session.last_seen.elapsed() > self.ttl {
            sessions.remove(id);
            return None;
        }
        session.last_seen = Instant::now();
        Some(session.clone())
    }

    /// Constant-time comparison of `token` with the session's CSRF token.
    pub fn verify_csrf(&self, id: &str, token: &str) -> bool {
        match self.get(id) {
            Some(session) => session.csrf_token.as_bytes().ct_eq(token.as_bytes()).into(),
            None => false,
        }
    }

    /// Replace the session's CSRF token, returning the new one.
    pub fn rotate_csrf(&self, id: &str) -> Option<String> {
        let mut sessions = self.lock();
        let session = sessions.get_mut(id)?;
        session.csrf_token = new_csrf_token();
        Some(session.csrf_token.clone())
    }

    pub fn set_output(&self, id: &str, output_file: impl Into<String>) {
        if let Some(session) = self.lock().get_mut(id) {
            session.output_file = Some(output_file.into());
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Session id from the request's `Cookie` headers.
pub fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

/// `Set-Cookie` header for `session`.
pub fn set_cookie_header(session: &Session, ttl: Duration) -> (axum::http::HeaderName, HeaderValue) {
    let cookie = format!(
        "{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        session.id,
        ttl.as_secs()
    );
    // The id is hex, so the value is always a valid header.
    let value = HeaderValue::from_str(&cookie).unwrap_or_else(|_| HeaderValue::from_static(""));
    (SET_COOKIE, value)
}
