//! Endpoint wrappers for authentication and profile lookups.

use serde_json::Value;

use super::client::{ApiClient, ApiRequest};
use super::models::{RoleUpdateRequest, SendOtpResponse, UserProfile, ValidatedSession};
use super::ApiError;

#[derive(Clone)]
pub struct AuthApi {
    client: ApiClient,
}

impl AuthApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Ask the backend to text an OTP to `mobile_number`
    pub async fn send_otp(
        &self,
        mobile_number: &str,
        device_id: &str,
        bypass_otp: bool,
    ) -> Result<SendOtpResponse, ApiError> {
        let request = ApiRequest::post("/auth/send-otp")
            .query("mobile_number", mobile_number)
            .query("device_id", device_id)
            .query("bypass_otp", bypass_otp);
        self.client.execute_json(&request).await
    }

    /// Verify an OTP.
    ///
    /// Returns the raw body: the caller validates its shape before trusting
    /// any field in it.
    pub async fn verify_otp(
        &self,
        mobile_number: &str,
        otp: &str,
        device_id: &str,
        request_id: Option<&str>,
    ) -> Result<Value, ApiError> {
        let mut request = ApiRequest::post("/auth/verify-otp")
            .query("mobile_number", mobile_number)
            .query("otp", otp)
            .query("device_id", device_id);
        if let Some(request_id) = request_id {
            request = request.query("request_id", request_id);
        }
        self.client.execute_json(&request).await
    }

    /// Record the user's role on the server.
    ///
    /// The session controller keeps the role client-side and does not call
    /// this; it exists for front ends that manage server-side roles directly.
    pub async fn update_role(&self, role: &str) -> Result<Value, ApiError> {
        let body = serde_json::to_value(RoleUpdateRequest { role })
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
        let request = ApiRequest::put("/auth/role").json(body);
        self.client.execute_json(&request).await
    }

    /// Check a token with the backend and return the normalized session.
    ///
    /// The token travels in the query, so a 401 here is final; the caller
    /// decides whether to renew and ask again.
    pub async fn validate_token(&self, token: &str) -> Result<ValidatedSession, ApiError> {
        let request = ApiRequest::post("/auth/validate-token")
            .query("token", token)
            .without_refresh();
        let body: Value = self.client.execute_json(&request).await?;
        Ok(ValidatedSession::from_value(&body))
    }

    /// Fetch the profile with the user's student and school associations
    pub async fn fetch_profile(&self, user_id: i64) -> Result<UserProfile, ApiError> {
        let request = ApiRequest::get("/user/profile").query("user_id", user_id);
        self.client.execute_json(&request).await
    }
}
