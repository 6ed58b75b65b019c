//! Cookie parsing and session management.
//!
//! # Data Flow
//! ```text
//! cookies middleware
//!     → verify signed cookies with the key derived from `session.secret`
//!     → publish SignedCookieJar as a request extension
//! session middleware
//!     → read session id cookie → SessionStore::load
//!     → publish Session as a request extension
//!     → run the rest of the chain
//!     → SessionStore::save (every response) → set the session cookie
//! ```
//!
//! The store is an external, already concurrency-safe collaborator; this
//! module takes no locks around it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, Key, SignedCookieJar};
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha512};

use crate::config::SessionConfig;

/// Session payload.
pub type SessionData = Map<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session store failure: {0}")]
    Store(String),

    #[error("session value could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Backing store for session payloads.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    async fn load(&self, id: &str) -> Result<Option<SessionData>, SessionError>;
    async fn save(&self, id: &str, data: SessionData) -> Result<(), SessionError>;
    async fn destroy(&self, id: &str) -> Result<(), SessionError>;
}

/// In-process session store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: DashMap<String, SessionData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn load(&self, id: &str) -> Result<Option<SessionData>, SessionError> {
        Ok(self.inner.get(id).map(|r| r.value().clone()))
    }

    async fn save(&self, id: &str, data: SessionData) -> Result<(), SessionError> {
        self.inner.insert(id.to_string(), data);
        Ok(())
    }

    async fn destroy(&self, id: &str) -> Result<(), SessionError> {
        self.inner.remove(id);
        Ok(())
    }
}

/// Handle to the current request's session.
///
/// Clones share the same payload.
#[derive(Debug, Clone)]
pub struct Session {
    id: Arc<str>,
    data: Arc<Mutex<SessionData>>,
}

impl Session {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self::with_data(id, SessionData::new())
    }

    pub fn with_data(id: impl Into<Arc<str>>, data: SessionData) -> Self {
        Self {
            id: id.into(),
            data: Arc::new(Mutex::new(data)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data()
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub fn insert<T: Serialize>(&self, key: &str, value: &T) -> Result<(), SessionError> {
        let value = serde_json::to_value(value)?;
        self.data().insert(key.to_string(), value);
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.data().remove(key)
    }

    fn snapshot(&self) -> SessionData {
        self.data().clone()
    }

    // A panicking writer leaves the map intact; keep serving it.
    fn data(&self) -> MutexGuard<'_, SessionData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Derive the cookie signing key from the configured secret.
pub fn signing_key(secret: &str) -> Key {
    let digest = Sha512::digest(secret.as_bytes());
    Key::from(digest.as_slice())
}

/// Cookie parsing middleware: publishes the verified signed jar.
pub async fn cookies(State(key): State<Key>, mut req: Request<Body>, next: Next) -> Response {
    let jar = SignedCookieJar::from_headers(req.headers(), key);
    req.extensions_mut().insert(jar);
    next.run(req).await
}

/// State of the session middleware.
#[derive(Clone)]
pub struct SessionState {
    store: Arc<dyn SessionStore>,
    key: Key,
    config: SessionConfig,
}

impl SessionState {
    pub fn new(store: Arc<dyn SessionStore>, config: SessionConfig) -> Self {
        Self {
            store,
            key: signing_key(&config.secret),
            config,
        }
    }
}

/// Session middleware.
///
/// Every request carries a session; new ones are saved even when untouched
/// and every session is written back after the response.
pub async fn sessions(
    State(state): State<Arc<SessionState>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let jar = req
        .extensions()
        .get::<SignedCookieJar>()
        .cloned()
        .unwrap_or_else(|| SignedCookieJar::from_headers(req.headers(), state.key.clone()));

    let existing = match jar.get(&state.config.key) {
        Some(cookie) => {
            let id = cookie.value().to_string();
            match state.store.load(&id).await {
                Ok(Some(data)) => Some(Session::with_data(id, data)),
                Ok(None) => None,
                Err(e) => {
                    tracing::warn!(error = %e, "Session load failed, starting a new session");
                    None
                }
            }
        }
        None => None,
    };
    let session = existing.unwrap_or_else(|| Session::new(uuid::Uuid::new_v4().to_string()));

    req.extensions_mut().insert(session.clone());
    let response = next.run(req).await;

    if let Err(e) = state.store.save(session.id(), session.snapshot()).await {
        tracing::warn!(error = %e, session = %session.id(), "Session save failed");
    }

    let cookie = Cookie::build((state.config.key.clone(), session.id().to_string()))
        .path("/")
        .http_only(state.config.cookie.http_only)
        .secure(state.config.cookie.secure)
        .build();

    (jar.add(cookie), response).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_values_round_trip_through_clones() {
        let session = Session::new("abc");
        let clone = session.clone();
        clone.insert("count", &3).unwrap();

        assert_eq!(session.get::<i32>("count"), Some(3));
        assert_eq!(session.get::<String>("count"), None);
        assert_eq!(session.remove("count"), Some(Value::from(3)));
        assert_eq!(session.get::<i32>("count"), None);
    }

    #[test]
    fn test_poisoned_session_keeps_working() {
        let session = Session::new("abc");
        session.insert("user", &"jane").unwrap();

        let holder = session.clone();
        let _ = std::thread::spawn(move || {
            let _guard = holder.data.lock().unwrap();
            panic!("writer died");
        })
        .join();

        assert!(session.data.is_poisoned());
        assert_eq!(session.get::<String>("user").as_deref(), Some("jane"));
        session.insert("count", &1).unwrap();
        assert_eq!(session.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStore::new();
        let mut data = SessionData::new();
        data.insert("k".into(), Value::from("v"));

        store.save("s1", data.clone()).await.unwrap();
        assert_eq!(store.load("s1").await.unwrap(), Some(data));

        store.destroy("s1").await.unwrap();
        assert!(store.load("s1").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_signing_key_is_deterministic() {
        assert_eq!(signing_key("secret").master(), signing_key("secret").master());
        assert_ne!(signing_key("secret").master(), signing_key("other").master());
    }
}
