//! Wire types for the authentication and profile endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct SendOtpResponse {
    #[serde(rename = "requestId", alias = "request_id")]
    pub request_id: Option<String>,
}

/// User snapshot returned alongside a token.
///
/// Only `id` is guaranteed; everything else depends on how far the account
/// has been set up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub mobile_no: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl User {
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            (Some(first), None) => first.clone(),
            (None, Some(last)) => last.clone(),
            (None, None) => self.mobile_no.clone().unwrap_or_else(|| format!("User {}", self.id)),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct RefreshRequest<'a> {
    #[serde(rename = "refreshToken")]
    pub refresh_token: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenPair {
    #[serde(alias = "access_token")]
    pub token: String,
    #[serde(rename = "refreshToken", alias = "refresh_token", default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RoleUpdateRequest<'a> {
    pub role: &'a str,
}

/// Normalized result of `/auth/validate-token`.
///
/// The backend has shipped both camelCase and snake_case token fields, and
/// some deployments wrap the payload in `data`; both shapes are accepted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedSession {
    pub token: Option<String>,
    pub refresh_token: Option<String>,
    pub user: Option<Value>,
}

impl ValidatedSession {
    pub fn from_value(value: &Value) -> Self {
        let body = value.get("data").filter(|d| d.is_object()).unwrap_or(value);
        let string_field = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| body.get(*name).and_then(Value::as_str))
                .map(str::to_string)
        };
        Self {
            token: string_field(&["token", "access_token"]),
            refresh_token: string_field(&["refreshToken", "refresh_token"]),
            user: body.get("user").filter(|u| u.is_object()).cloned(),
        }
    }
}

/// Account linkage returned by `/user/profile`.
///
/// Ids are kept as raw JSON values since only their presence matters to the
/// client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub student_ids: Option<Vec<Value>>,
    #[serde(default)]
    pub school_ids: Option<Vec<Value>>,
}

impl UserProfile {
    pub fn has_students(&self) -> bool {
        self.student_ids.as_ref().is_some_and(|ids| !ids.is_empty())
    }

    pub fn has_schools(&self) -> bool {
        self.school_ids.as_ref().is_some_and(|ids| !ids.is_empty())
    }
}
