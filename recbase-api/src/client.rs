//! Recbase API client
//!
//! # Creating a client
//!
//! - [`RecbaseClient::new`] - create a client for a base url with admin credentials
//! - [`RecbaseClient::with_config`] - create a client with custom configuration
//!
//! All requests other than [`login`](RecbaseClient::login) require a bearer
//! token, cached inside the client after a successful login.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::{Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::json;
use snafu::prelude::*;
use tracing::{debug, error};

use crate::{
    RECBASE_LOCAL_URL, Result,
    config::{DEFAULT_PAGE_SIZE, LOGIN_TIMEOUT_SECS, RECBASE_URL_ENV, REQUEST_TIMEOUT_SECS},
    error::{HttpSnafu, RecbaseError},
};

/// Configuration for the Recbase client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base url for all store API requests.
    /// If not provided, determined by the environment variable `RECBASE_URL`,
    /// falling back to `http://localhost:8090`.
    pub base_url: String,

    /// Admin account email used for `login()`.
    pub admin_email: String,

    /// Admin account password used for `login()`.
    pub admin_password: String,

    /// Records fetched per page when listing collections.
    pub page_size: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            base_url: std::env::var(RECBASE_URL_ENV).unwrap_or(RECBASE_LOCAL_URL.to_string()),
            admin_email: String::new(),
            admin_password: String::new(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct AuthResponse {
    token: String,
}

/// Async client for the admin HTTP API of a PocketBase-compatible record store.
pub struct RecbaseClient {
    pub(crate) http: reqwest::Client,
    pub(crate) config: ClientConfig,
    token: Arc<Mutex<Option<String>>>,
}

impl std::fmt::Debug for RecbaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecbaseClient")
            .field("base_url", &self.config.base_url)
            .field("admin_email", &self.config.admin_email)
            .finish_non_exhaustive()
    }
}

impl RecbaseClient {
    /// Creates a client for `base_url` with admin credentials.
    pub fn new(base_url: &str, admin_email: &str, admin_password: &str) -> Result<Self> {
        Self::with_config(ClientConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            admin_email: admin_email.to_string(),
            admin_password: admin_password.to_string(),
            ..ClientConfig::default()
        })
    }

    /// Creates a client with the provided configuration.
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        debug!(url=?config.base_url, "new client");
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context(HttpSnafu {
                method: "client-init",
                url: "",
            })?;
        Ok(Self {
            http,
            config,
            token: Arc::new(Mutex::new(None)),
        })
    }

    /// Returns the configuration.
    pub fn get_config(&self) -> &ClientConfig {
        &self.config
    }

    /// True if a bearer token has been acquired.
    pub fn is_authenticated(&self) -> bool {
        self.token.lock().is_some()
    }

    /// Authenticates with the store's admin endpoint and caches the bearer token.
    ///
    /// A failure here is fatal to callers: no other endpoint works without a token.
    pub async fn login(&self) -> Result<()> {
        let url = format!("{}/api/admins/auth-with-password", self.config.base_url);
        let response = self
            .http
            .post(&url)
            .timeout(Duration::from_secs(LOGIN_TIMEOUT_SECS))
            .json(&json!({
                "identity": self.config.admin_email,
                "password": self.config.admin_password,
            }))
            .send()
            .await
            .map_err(|e| RecbaseError::Auth {
                message: format!("login request failed: {e}"),
            })?;
        if !response.status().is_success() {
            let code = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(RecbaseError::Auth {
                message: format!("login rejected ({code}): {message}"),
            });
        }
        let auth: AuthResponse = response.json().await.map_err(|e| RecbaseError::Auth {
            message: format!("login response: {e}"),
        })?;
        *self.token.lock() = Some(auth.token);
        debug!(email = %self.config.admin_email, "admin login ok");
        Ok(())
    }

    pub(crate) fn bearer(&self) -> Result<String> {
        self.token
            .lock()
            .clone()
            .ok_or_else(|| RecbaseError::Auth {
                message: "not authenticated - call login() first".to_string(),
            })
    }

    /// Issues an authenticated request and returns the raw response,
    /// mapping non-success statuses into `RecbaseError`.
    pub(crate) async fn send_raw(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<serde_json::Value>,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response> {
        let token = self.bearer()?;
        let url = format!("{}{}", self.config.base_url, path);
        let mut builder = self
            .http
            .request(method.clone(), &url)
            .bearer_auth(token)
            .query(query);
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let response = builder.send().await.context(HttpSnafu {
            method: method.to_string(),
            url: &url,
        })?;
        let code = response.status();
        if code == StatusCode::NOT_FOUND {
            return Err(RecbaseError::NotFound {
                what: "object".to_string(),
                key: path.to_string(),
            });
        }
        if !code.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!(code = code.as_u16(), %url, message, "http");
            return Err(RecbaseError::Api {
                code: code.as_u16(),
                method: method.to_string(),
                url,
                message,
            });
        }
        Ok(response)
    }

    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<serde_json::Value>,
        timeout: Option<Duration>,
    ) -> Result<T> {
        let response = self.send_raw(method, path, query, body, timeout).await?;
        let data = response.bytes().await.context(HttpSnafu {
            method: "read-body",
            url: path,
        })?;
        deserialize_json(&data)
    }

    pub(crate) async fn get_bytes(&self, path: &str, timeout: Duration) -> Result<Bytes> {
        let response = self
            .send_raw(Method::GET, path, &[], None, Some(timeout))
            .await?;
        response.bytes().await.context(HttpSnafu {
            method: "GET",
            url: path,
        })
    }

    pub(crate) fn to_body<B: Serialize>(body: &B) -> Result<serde_json::Value> {
        serde_json::to_value(body).map_err(|source| RecbaseError::Serialization { source })
    }
}

// deserialize, reporting errors with 'serde_path_to_error', which provides
// a detailed json path to the failure
pub(crate) fn deserialize_json<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    let mut deserializer = serde_json::Deserializer::from_slice(body);
    match serde_path_to_error::deserialize(&mut deserializer) {
        Ok(value) => Ok(value),
        Err(err) => {
            error!("Deserialization failed at {}: {}", err.path(), err);
            Err(RecbaseError::Deserialization {
                source: err.into_inner(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert!(config.admin_email.is_empty());
    }

    #[test]
    fn client_starts_unauthenticated() {
        let client = RecbaseClient::new("http://localhost:8090", "admin@example.com", "pw")
            .expect("client");
        assert!(!client.is_authenticated());
        assert!(client.bearer().is_err());
    }

    #[test]
    fn new_trims_trailing_slash() {
        let client = RecbaseClient::new("http://localhost:8090/", "a@b.c", "pw").expect("client");
        assert_eq!(client.get_config().base_url, "http://localhost:8090");
    }

    #[test]
    fn deserialize_reports_path() {
        #[derive(Debug, serde::Deserialize)]
        struct Outer {
            #[allow(dead_code)]
            items: Vec<u32>,
        }
        let err = deserialize_json::<Outer>(br#"{"items": [1, "two"]}"#).unwrap_err();
        assert!(matches!(err, RecbaseError::Deserialization { .. }));
    }
}
