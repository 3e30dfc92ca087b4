//! Authorized request pipeline for the school portal REST API.
//!
//! Every backend call goes through [`ApiClient::execute`], which attaches the
//! stored bearer token and recovers from an expired token by refreshing it
//! once. Concurrent requests that hit a 401 at the same time share a single
//! refresh call.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::{header, Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::auth::{CredentialKey, CredentialStore};
use crate::config::Config;

use super::models::{RefreshRequest, TokenPair};
use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Path of the token refresh endpoint, relative to the base URL
const REFRESH_PATH: &str = "/auth/refresh";

type RefreshFuture = Shared<BoxFuture<'static, Option<String>>>;

/// A request description that can be dispatched more than once.
///
/// Kept separate from `reqwest::RequestBuilder` so the pipeline can re-issue
/// the exact same request after a token refresh.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
    refresh_on_unauthorized: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            refresh_on_unauthorized: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Return a 401 as final instead of refreshing and retrying.
    ///
    /// For requests that carry the token outside the `Authorization` header,
    /// where a retry would resend the rejected value.
    pub fn without_refresh(mut self) -> Self {
        self.refresh_on_unauthorized = false;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }
}

/// API client for the school portal backend.
/// Clone is cheap - reqwest::Client and the store are reference counted, and
/// clones share the same in-flight refresh.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    store: Arc<dyn CredentialStore>,
    refresh_in_flight: Arc<Mutex<Option<RefreshFuture>>>,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(
        base_url: &str,
        timeout: Duration,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self, ApiError> {
        let mut default_headers = header::HeaderMap::new();
        default_headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        default_headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(default_headers)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            store,
            refresh_in_flight: Arc::new(Mutex::new(None)),
        })
    }

    pub fn from_config(config: &Config, store: Arc<dyn CredentialStore>) -> Result<Self, ApiError> {
        Self::new(&config.api_base_url, config.request_timeout(), store)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Send a request with bearer auth, refreshing an expired token at most once.
    ///
    /// A request sent without a token is never retried: refresh is narrowed to
    /// requests that actually presented a bearer token, so a 401 from e.g. a
    /// wrong OTP leaves the stored tokens alone. When the refresh fails the
    /// stored token pair is cleared and the original 401 is returned. A
    /// retried request that is still unauthorized is returned as-is.
    pub async fn execute(&self, request: &ApiRequest) -> Result<Response, ApiError> {
        let token = self.store.get_non_empty(CredentialKey::AuthToken)?;
        let response = self.dispatch(request, token.as_deref()).await?;

        let rejected = match token {
            Some(token)
                if response.status() == StatusCode::UNAUTHORIZED && request.refresh_on_unauthorized =>
            {
                token
            }
            _ => return Self::check_response(response).await,
        };

        let original = Self::check_response(response)
            .await
            .err()
            .unwrap_or_else(|| ApiError::Unauthorized(String::new()));
        warn!(path = %request.path, "Request unauthorized, attempting token refresh");

        let Some(new_token) = self.renew_token(&rejected).await? else {
            return Err(original);
        };

        let retried = self.dispatch(request, Some(&new_token)).await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            warn!(path = %request.path, "Request still unauthorized after refresh");
        }
        Self::check_response(retried).await
    }

    /// Obtain a replacement for a token the server rejected.
    ///
    /// Returns the stored token if another request already rotated it,
    /// otherwise joins or starts a refresh. `None` means the refresh failed
    /// and the token pair has been cleared.
    pub async fn renew_token(&self, rejected: &str) -> Result<Option<String>, ApiError> {
        // Another request may already have rotated the token while this one was in flight
        match self.store.get_non_empty(CredentialKey::AuthToken)? {
            Some(current) if current != rejected => Ok(Some(current)),
            _ => Ok(self.refresh_access_token().await),
        }
    }

    /// Execute and decode a JSON response body
    pub async fn execute_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, ApiError> {
        let response = self.execute(request).await?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse response from {}: {}", request.path, e))
        })
    }

    async fn dispatch(&self, request: &ApiRequest, token: Option<&str>) -> Result<Response, ApiError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self.client.request(request.method.clone(), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        debug!(method = %request.method, path = %request.path, authorized = token.is_some(), "Sending request");
        Ok(builder.send().await?)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Join the in-flight refresh, or start one if none is running.
    async fn refresh_access_token(&self) -> Option<String> {
        let refresh = {
            let mut in_flight = self
                .refresh_in_flight
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            match in_flight.as_ref() {
                Some(existing) => {
                    debug!("Joining in-flight token refresh");
                    existing.clone()
                }
                None => {
                    let refresh = Self::run_refresh(
                        self.client.clone(),
                        self.base_url.clone(),
                        Arc::clone(&self.store),
                    )
                    .boxed()
                    .shared();
                    *in_flight = Some(refresh.clone());
                    refresh
                }
            }
        };

        let result = refresh.clone().await;

        let mut in_flight = self
            .refresh_in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if in_flight.as_ref().is_some_and(|f| f.ptr_eq(&refresh)) {
            *in_flight = None;
        }
        result
    }

    async fn run_refresh(
        client: Client,
        base_url: String,
        store: Arc<dyn CredentialStore>,
    ) -> Option<String> {
        match Self::request_new_tokens(&client, &base_url, store.as_ref()).await {
            Ok(token) => {
                info!("Access token refreshed");
                Some(token)
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, clearing stored tokens");
                for key in CredentialKey::ALL.iter().filter(|k| k.is_token()) {
                    if let Err(e) = store.remove(*key) {
                        error!(key = %key, error = %e, "Failed to clear token after refresh failure");
                    }
                }
                None
            }
        }
    }

    async fn request_new_tokens(
        client: &Client,
        base_url: &str,
        store: &dyn CredentialStore,
    ) -> Result<String, ApiError> {
        let refresh_token = store
            .get_non_empty(CredentialKey::RefreshToken)?
            .ok_or(ApiError::NoRefreshToken)?;

        let response = client
            .post(format!("{}{}", base_url, REFRESH_PATH))
            .json(&RefreshRequest {
                refresh_token: &refresh_token,
            })
            .send()
            .await?;
        let response = Self::check_response(response).await?;

        let text = response.text().await?;
        let pair: TokenPair = serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse refresh response: {}", e)))?;
        if pair.token.is_empty() {
            return Err(ApiError::InvalidResponse("Refresh returned an empty token".to_string()));
        }

        store.set(CredentialKey::AuthToken, &pair.token)?;
        // Servers that do not rotate refresh tokens omit the field
        if let Some(ref rotated) = pair.refresh_token {
            store.set(CredentialKey::RefreshToken, rotated)?;
        }
        Ok(pair.token)
    }
}
