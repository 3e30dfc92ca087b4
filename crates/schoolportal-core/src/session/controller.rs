//! The session controller.
//!
//! Owns the in-memory session, is the only writer of the credential store
//! (apart from the token pair rotated by the request pipeline), and publishes
//! state changes to subscribers.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::api::{ApiClient, ApiError, AuthApi, User};
use crate::auth::{ensure_device_id, CredentialKey, CredentialStore, StorageError};
use crate::config::Config;

use super::navigation::NavigationTarget;
use super::state::{Alert, SessionPhase, SessionState, UserRole};

// ============================================================================
// User-facing messages
// ============================================================================

/// Shown when send-otp fails without a usable server message
const SEND_OTP_FALLBACK: &str = "Failed to send OTP";

/// Shown when verify-otp fails without a usable server message
const VERIFY_OTP_FALLBACK: &str = "Failed to verify OTP";

/// Shown when verify-otp succeeds at the HTTP level but carries no token
const INVALID_RESPONSE: &str = "Invalid response";

/// Shown when verify is attempted before an OTP was requested
const NO_PENDING_LOGIN: &str = "Please request an OTP first";

const NO_DATA_TITLE: &str = "No Data Found";
const NO_DATA_MESSAGE: &str =
    "No students or schools are linked to this account. Please contact your school.";

const PROFILE_ERROR_TITLE: &str = "Error";
const PROFILE_ERROR_FALLBACK: &str = "Unable to load your profile. Please log in again.";

/// Keys removed on logout. `userRole` and `deviceId` survive on purpose.
const LOGOUT_KEYS: [CredentialKey; 4] = [
    CredentialKey::AuthToken,
    CredentialKey::RefreshToken,
    CredentialKey::UserData,
    CredentialKey::PhoneNumber,
];

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Credential storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// The OTP was sent; `request_id` correlates it with the verify call
    OtpSent { request_id: Option<String> },
    /// The request failed; the reason is in `SessionState::auth_error`
    Failed,
}

impl LoginOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, LoginOutcome::OtpSent { .. })
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            LoginOutcome::OtpSent { request_id } => request_id.as_deref(),
            LoginOutcome::Failed => None,
        }
    }
}

/// Clears `is_loading` when dropped, whichever way the operation exits.
struct LoadingGuard<'a> {
    state: &'a watch::Sender<SessionState>,
}

impl<'a> LoadingGuard<'a> {
    fn begin(state: &'a watch::Sender<SessionState>) -> Self {
        state.send_modify(|s| s.is_loading = true);
        Self { state }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.state.send_modify(|s| s.is_loading = false);
    }
}

/// Single source of truth for who is logged in.
///
/// Share it behind an `Arc`; observe it through [`SessionController::subscribe`].
pub struct SessionController {
    api: AuthApi,
    store: Arc<dyn CredentialStore>,
    bypass_otp: bool,
    state: watch::Sender<SessionState>,
    pending_request_id: Mutex<Option<String>>,
}

impl SessionController {
    /// Create a controller persisting through the same store as `api`'s pipeline
    pub fn new(api: AuthApi, bypass_otp: bool) -> Self {
        let store = Arc::clone(api.client().store());
        let (state, _) = watch::channel(SessionState::default());
        Self {
            api,
            store,
            bypass_otp,
            state,
            pending_request_id: Mutex::new(None),
        }
    }

    pub fn from_config(config: &Config, store: Arc<dyn CredentialStore>) -> Result<Self, ApiError> {
        let client = ApiClient::from_config(config, store)?;
        Ok(Self::new(AuthApi::new(client), config.bypass_otp))
    }

    /// API wrappers sharing this session's authorized pipeline
    pub fn api(&self) -> &AuthApi {
        &self.api
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Snapshot of the current state
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    // =========================================================================
    // Startup
    // =========================================================================

    /// Populate the session from persisted credentials.
    ///
    /// Any storage failure leaves the session unauthenticated.
    pub fn load_state(&self) -> SessionPhase {
        self.update(|s| s.phase = SessionPhase::Loading);

        match self.read_persisted() {
            Ok(persisted) => {
                let phase = if persisted.has_token {
                    SessionPhase::Authenticated
                } else {
                    SessionPhase::Unauthenticated
                };
                debug!(?phase, role = ?persisted.role, "Session loaded from storage");
                self.update(|s| {
                    s.phase = phase;
                    s.phone_number = persisted.phone_number;
                    s.device_id = Some(persisted.device_id);
                    s.user_role = persisted.role;
                    s.has_completed_onboarding = persisted.onboarded;
                });
                phase
            }
            Err(e) => {
                error!(error = %e, "Failed to load session, starting signed out");
                self.update(|s| s.phase = SessionPhase::Unauthenticated);
                SessionPhase::Unauthenticated
            }
        }
    }

    fn read_persisted(&self) -> Result<PersistedSession, StorageError> {
        let has_token = self.store.get_non_empty(CredentialKey::AuthToken)?.is_some();
        let onboarded = self
            .store
            .get(CredentialKey::HasCompletedOnboarding)?
            .is_some_and(|v| v == "true");
        let phone_number = self.store.get_non_empty(CredentialKey::PhoneNumber)?;
        let role = match self.store.get_non_empty(CredentialKey::UserRole)? {
            Some(raw) => {
                let role = UserRole::parse(&raw);
                if role.is_none() {
                    warn!(role = %raw, "Ignoring unrecognised stored role");
                }
                role
            }
            None => None,
        };
        let device_id = ensure_device_id(self.store.as_ref())?;

        Ok(PersistedSession {
            has_token,
            onboarded,
            phone_number,
            role,
            device_id,
        })
    }

    // =========================================================================
    // OTP login
    // =========================================================================

    /// Request an OTP for `phone_number`.
    ///
    /// Transport and server failures are reported through `auth_error` and
    /// `LoginOutcome::Failed`; only storage failures are returned as errors.
    pub async fn login(&self, phone_number: &str) -> Result<LoginOutcome, SessionError> {
        let _loading = LoadingGuard::begin(&self.state);
        self.update(|s| s.auth_error = None);

        let phone_number = phone_number.trim().to_string();
        let device_id = ensure_device_id(self.store.as_ref())?;
        self.set_pending_request_id(None);
        self.update(|s| {
            s.device_id = Some(device_id.clone());
            s.phone_number = Some(phone_number.clone());
        });

        info!(phone = %mask_phone(&phone_number), "Requesting OTP");
        match self.api.send_otp(&phone_number, &device_id, self.bypass_otp).await {
            Ok(response) => {
                self.set_pending_request_id(response.request_id.clone());
                Ok(LoginOutcome::OtpSent {
                    request_id: response.request_id,
                })
            }
            Err(e) => {
                warn!(error = %e, "OTP request failed");
                self.set_error(e.user_message(SEND_OTP_FALLBACK));
                Ok(LoginOutcome::Failed)
            }
        }
    }

    /// Verify the OTP for the phone number given to the last `login`.
    ///
    /// Nothing is persisted unless the response carries a string token.
    pub async fn verify_otp(&self, otp: &str) -> Result<bool, SessionError> {
        let _loading = LoadingGuard::begin(&self.state);
        self.update(|s| s.auth_error = None);

        let (phone_number, device_id) = {
            let state = self.state.borrow();
            (state.phone_number.clone(), state.device_id.clone())
        };
        let Some(phone_number) = phone_number else {
            self.set_error(NO_PENDING_LOGIN.to_string());
            return Ok(false);
        };
        let device_id = match device_id {
            Some(id) => id,
            None => ensure_device_id(self.store.as_ref())?,
        };
        let request_id = self.take_pending_request_id();

        let body = match self
            .api
            .verify_otp(&phone_number, otp.trim(), &device_id, request_id.as_deref())
            .await
        {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "OTP verification failed");
                self.set_error(e.user_message(VERIFY_OTP_FALLBACK));
                return Ok(false);
            }
        };

        let Some(token) = body
            .get("token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
        else {
            warn!("Verify response did not contain a token");
            self.set_error(INVALID_RESPONSE.to_string());
            return Ok(false);
        };

        // The token goes last: once it is stored the session counts as signed in
        if let Some(refresh) = body
            .get("refreshToken")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
        {
            self.store.set(CredentialKey::RefreshToken, refresh)?;
        }
        self.store.set(CredentialKey::PhoneNumber, &phone_number)?;
        self.store.set(CredentialKey::AuthToken, token)?;
        self.update(|s| {
            s.phase = SessionPhase::Authenticated;
            s.phone_number = Some(phone_number);
        });
        info!("OTP verified, session authenticated");

        if let Some(user) = body.get("user").filter(|u| u.is_object()) {
            self.store.set(CredentialKey::UserData, &user.to_string())?;
            if let Some(raw) = user.get("role").and_then(Value::as_str) {
                match UserRole::parse(raw) {
                    Some(role) => {
                        self.store.set(CredentialKey::UserRole, role.as_str())?;
                        self.update(|s| s.user_role = Some(role));
                    }
                    None => warn!(role = %raw, "Ignoring unrecognised role in verify response"),
                }
            }
        }

        Ok(true)
    }

    // =========================================================================
    // Role, onboarding, logout
    // =========================================================================

    /// Persist the chosen role (or forget it with `None`).
    ///
    /// Local only: the backend's role endpoint is not called.
    pub fn set_user_role(&self, role: Option<UserRole>) -> Result<(), SessionError> {
        let _loading = LoadingGuard::begin(&self.state);
        match role {
            Some(role) => self.store.set(CredentialKey::UserRole, role.as_str())?,
            None => self.store.remove(CredentialKey::UserRole)?,
        }
        self.update(|s| s.user_role = role);
        debug!(?role, "User role updated");
        Ok(())
    }

    pub fn complete_onboarding(&self) -> Result<(), SessionError> {
        self.store.set(CredentialKey::HasCompletedOnboarding, "true")?;
        self.update(|s| s.has_completed_onboarding = true);
        Ok(())
    }

    /// Sign out, keeping the role so a returning user skips role selection.
    ///
    /// Every key is attempted even if an earlier removal fails; the session
    /// is marked signed out as soon as the token is gone, and the first
    /// storage error is returned.
    pub fn logout(&self) -> Result<(), SessionError> {
        let _loading = LoadingGuard::begin(&self.state);
        let result = self.clear_session_credentials();
        info!("Logged out");
        result
    }

    fn clear_session_credentials(&self) -> Result<(), SessionError> {
        let mut first_error = None;
        for key in LOGOUT_KEYS {
            if let Err(e) = self.store.remove(key) {
                error!(key = %key, error = %e, "Failed to clear credential");
                first_error.get_or_insert(e);
            }
        }
        self.take_pending_request_id();

        let token_cleared = matches!(self.store.get_non_empty(CredentialKey::AuthToken), Ok(None));
        if token_cleared {
            self.update(|s| {
                s.phase = SessionPhase::Unauthenticated;
                s.phone_number = None;
                s.auth_error = None;
                s.alert = None;
            });
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    // =========================================================================
    // Token lifecycle
    // =========================================================================

    /// Reconcile the session with the stored token.
    ///
    /// The request pipeline clears the token pair when a refresh fails; call
    /// this after an unauthorized API error to route the user back to login.
    /// Returns whether the session is still authenticated.
    pub fn sync_auth_state(&self) -> bool {
        let has_token = match self.store.get_non_empty(CredentialKey::AuthToken) {
            Ok(token) => token.is_some(),
            Err(e) => {
                error!(error = %e, "Failed to read auth token, treating session as signed out");
                false
            }
        };
        if !has_token && self.state.borrow().is_authenticated() {
            info!("Auth token no longer present, session signed out");
            self.update(|s| s.phase = SessionPhase::Unauthenticated);
        }
        has_token && self.state.borrow().is_authenticated()
    }

    /// Confirm the stored token with the backend and adopt what it returns.
    ///
    /// An expired token is renewed through the refresh token and checked
    /// again. A token that is still rejected signs the session out. Network
    /// failures leave the session untouched.
    pub async fn revalidate(&self) -> Result<bool, SessionError> {
        let Some(token) = self.store.get_non_empty(CredentialKey::AuthToken)? else {
            return Ok(self.sync_auth_state());
        };
        let _loading = LoadingGuard::begin(&self.state);

        let result = match self.api.validate_token(&token).await {
            Err(e) if e.is_unauthorized() => {
                debug!("Stored token rejected, renewing before a second check");
                match self.api.client().renew_token(&token).await {
                    Ok(Some(renewed)) => self.api.validate_token(&renewed).await,
                    Ok(None) => Err(e),
                    Err(renew_error) => Err(renew_error),
                }
            }
            other => other,
        };

        match result {
            Ok(validated) => {
                if let Some(new_token) = validated.token.filter(|t| !t.is_empty()) {
                    self.store.set(CredentialKey::AuthToken, &new_token)?;
                }
                if let Some(refresh) = validated.refresh_token.filter(|t| !t.is_empty()) {
                    self.store.set(CredentialKey::RefreshToken, &refresh)?;
                }
                if let Some(user) = validated.user {
                    self.store.set(CredentialKey::UserData, &user.to_string())?;
                }
                self.update(|s| s.phase = SessionPhase::Authenticated);
                debug!("Session token validated");
                Ok(true)
            }
            Err(e) if e.is_unauthorized() => {
                info!("Stored token rejected by server, signing out");
                self.clear_session_credentials()?;
                Ok(false)
            }
            Err(e) => {
                warn!(error = %e, "Could not validate session, keeping current state");
                Ok(self.state.borrow().is_authenticated())
            }
        }
    }

    /// The user snapshot saved at verification time
    pub fn stored_user(&self) -> Option<User> {
        let raw = match self.store.get_non_empty(CredentialKey::UserData) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, "Failed to read stored user data");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(error = %e, "Stored user data is corrupt, ignoring");
                None
            }
        }
    }

    // =========================================================================
    // Account linkage
    // =========================================================================

    /// Decide where to send the user from their student/school associations.
    ///
    /// `NavigationTarget::Stay` comes with an alert on the session state; the
    /// front end should show it and return to login.
    pub async fn profile_navigation_target(&self, user_id: i64) -> NavigationTarget {
        let _loading = LoadingGuard::begin(&self.state);

        match self.api.fetch_profile(user_id).await {
            Ok(profile) => {
                let target = NavigationTarget::from_profile(&profile);
                debug!(user_id, ?target, "Resolved navigation target");
                if !target.should_navigate() {
                    warn!(user_id, "Account has no linked students or schools");
                    self.raise_alert(Alert::new(NO_DATA_TITLE, NO_DATA_MESSAGE));
                }
                target
            }
            Err(e) => {
                error!(user_id, error = %e, "Failed to fetch profile");
                if e.is_unauthorized() {
                    self.sync_auth_state();
                }
                self.raise_alert(Alert::new(
                    PROFILE_ERROR_TITLE,
                    e.user_message(PROFILE_ERROR_FALLBACK),
                ));
                NavigationTarget::Stay
            }
        }
    }

    pub fn dismiss_alert(&self) {
        self.update(|s| s.alert = None);
    }

    pub fn clear_error(&self) {
        self.update(|s| s.auth_error = None);
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn update<F: FnOnce(&mut SessionState)>(&self, f: F) {
        self.state.send_modify(f);
    }

    fn set_error(&self, message: String) {
        self.update(|s| s.auth_error = Some(message));
    }

    fn raise_alert(&self, alert: Alert) {
        self.update(|s| s.alert = Some(alert));
    }

    fn set_pending_request_id(&self, request_id: Option<String>) {
        *self
            .pending_request_id
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = request_id;
    }

    fn take_pending_request_id(&self) -> Option<String> {
        self.pending_request_id
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

struct PersistedSession {
    has_token: bool,
    onboarded: bool,
    phone_number: Option<String>,
    role: Option<UserRole>,
    device_id: String,
}

/// Phone number for logs: only the last four digits survive
fn mask_phone(phone: &str) -> String {
    let chars: Vec<char> = phone.chars().collect();
    let visible = chars.len().min(4);
    let hidden = chars.len() - visible;
    let mut masked = "*".repeat(hidden);
    masked.extend(&chars[hidden..]);
    masked
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::auth::MemoryCredentialStore;

    /// Nothing listens here; these tests never reach the network
    const UNUSED_BASE_URL: &str = "http://127.0.0.1:9";

    fn controller_with(store: Arc<MemoryCredentialStore>) -> SessionController {
        let client = ApiClient::new(UNUSED_BASE_URL, Duration::from_secs(1), store).unwrap();
        SessionController::new(AuthApi::new(client), false)
    }

    // -------------------------------------------------------------------------
    // load_state
    // -------------------------------------------------------------------------

    #[test]
    fn test_load_state_fresh_install() {
        let store = Arc::new(MemoryCredentialStore::new());
        let controller = controller_with(Arc::clone(&store));

        assert_eq!(controller.state().phase, SessionPhase::Unloaded);
        assert_eq!(controller.load_state(), SessionPhase::Unauthenticated);

        let state = controller.state();
        assert!(!state.is_authenticated());
        assert!(!state.has_completed_onboarding);
        let device_id = state.device_id.expect("device id generated");
        assert!(device_id.starts_with("dev_"));
        assert_eq!(store.get(CredentialKey::DeviceId).unwrap(), Some(device_id));
    }

    #[test]
    fn test_load_state_returning_user() {
        let store = Arc::new(MemoryCredentialStore::with_entries([
            (CredentialKey::AuthToken, "tok"),
            (CredentialKey::PhoneNumber, "9876543210"),
            (CredentialKey::UserRole, "teacher"),
            (CredentialKey::DeviceId, "dev_abc"),
            (CredentialKey::HasCompletedOnboarding, "true"),
        ]));
        let controller = controller_with(store);

        assert_eq!(controller.load_state(), SessionPhase::Authenticated);
        let state = controller.state();
        assert!(state.is_authenticated());
        assert_eq!(state.phone_number.as_deref(), Some("9876543210"));
        assert_eq!(state.user_role, Some(UserRole::Teacher));
        assert_eq!(state.device_id.as_deref(), Some("dev_abc"));
        assert!(state.has_completed_onboarding);
        assert!(!state.is_loading);
    }

    #[test]
    fn test_load_state_fails_closed() {
        let store = Arc::new(MemoryCredentialStore::with_entries([(CredentialKey::AuthToken, "tok")]));
        store.set_fail_reads(true);
        let controller = controller_with(store);

        assert_eq!(controller.load_state(), SessionPhase::Unauthenticated);
        assert!(!controller.state().is_authenticated());
    }

    #[test]
    fn test_load_state_ignores_unknown_role() {
        let store = Arc::new(MemoryCredentialStore::with_entries([(CredentialKey::UserRole, "admin")]));
        let controller = controller_with(store);
        controller.load_state();
        assert_eq!(controller.state().user_role, None);
    }

    // -------------------------------------------------------------------------
    // Role and logout
    // -------------------------------------------------------------------------

    #[test]
    fn test_set_user_role_persists_and_clears() {
        let store = Arc::new(MemoryCredentialStore::new());
        let controller = controller_with(Arc::clone(&store));

        controller.set_user_role(Some(UserRole::Parent)).unwrap();
        assert_eq!(store.get(CredentialKey::UserRole).unwrap().as_deref(), Some("parent"));
        assert_eq!(controller.state().user_role, Some(UserRole::Parent));

        controller.set_user_role(None).unwrap();
        assert_eq!(store.get(CredentialKey::UserRole).unwrap(), None);
        assert_eq!(controller.state().user_role, None);
    }

    #[test]
    fn test_set_user_role_storage_failure_resets_loading() {
        let store = Arc::new(MemoryCredentialStore::new());
        let controller = controller_with(Arc::clone(&store));
        store.set_fail_writes(true);

        let result = controller.set_user_role(Some(UserRole::Teacher));
        assert!(matches!(result, Err(SessionError::Storage(_))));
        let state = controller.state();
        assert!(!state.is_loading);
        assert_eq!(state.user_role, None);
    }

    #[test]
    fn test_logout_keeps_role_and_device() {
        let store = Arc::new(MemoryCredentialStore::with_entries([
            (CredentialKey::AuthToken, "tok"),
            (CredentialKey::RefreshToken, "ref"),
            (CredentialKey::PhoneNumber, "9876543210"),
            (CredentialKey::UserData, r#"{"id":1}"#),
            (CredentialKey::UserRole, "teacher"),
            (CredentialKey::DeviceId, "dev_abc"),
        ]));
        let controller = controller_with(Arc::clone(&store));
        controller.load_state();

        controller.logout().unwrap();
        let after_first: Vec<_> = CredentialKey::ALL
            .iter()
            .map(|k| store.get(*k).unwrap())
            .collect();
        let state_after_first = controller.state();

        controller.logout().unwrap();
        let after_second: Vec<_> = CredentialKey::ALL
            .iter()
            .map(|k| store.get(*k).unwrap())
            .collect();

        assert_eq!(after_first, after_second);
        assert_eq!(state_after_first, controller.state());
        for key in LOGOUT_KEYS {
            assert_eq!(store.get(key).unwrap(), None, "{} should be cleared", key);
        }
        assert_eq!(store.get(CredentialKey::UserRole).unwrap().as_deref(), Some("teacher"));
        assert_eq!(store.get(CredentialKey::DeviceId).unwrap().as_deref(), Some("dev_abc"));

        let state = controller.state();
        assert!(!state.is_authenticated());
        assert_eq!(state.phone_number, None);
        assert_eq!(state.user_role, Some(UserRole::Teacher));
    }

    #[test]
    fn test_logout_storage_failure_propagates() {
        let store = Arc::new(MemoryCredentialStore::with_entries([(CredentialKey::AuthToken, "tok")]));
        let controller = controller_with(Arc::clone(&store));
        controller.load_state();
        store.set_fail_writes(true);

        assert!(controller.logout().is_err());
        let state = controller.state();
        assert!(!state.is_loading);
        // Token is still stored, so the session must still read as signed in
        assert!(state.is_authenticated());
    }

    // -------------------------------------------------------------------------
    // Onboarding, stored user, token sync
    // -------------------------------------------------------------------------

    #[test]
    fn test_complete_onboarding() {
        let store = Arc::new(MemoryCredentialStore::new());
        let controller = controller_with(Arc::clone(&store));
        controller.complete_onboarding().unwrap();
        assert_eq!(
            store.get(CredentialKey::HasCompletedOnboarding).unwrap().as_deref(),
            Some("true")
        );
        assert!(controller.state().has_completed_onboarding);
    }

    #[test]
    fn test_stored_user_decodes_snapshot() {
        let store = Arc::new(MemoryCredentialStore::with_entries([(
            CredentialKey::UserData,
            r#"{"id":1,"firstName":"Asha","role":"parent"}"#,
        )]));
        let controller = controller_with(store);
        let user = controller.stored_user().expect("user");
        assert_eq!(user.id, 1);
        assert_eq!(user.first_name.as_deref(), Some("Asha"));
    }

    #[test]
    fn test_stored_user_corrupt_is_none() {
        let store = Arc::new(MemoryCredentialStore::with_entries([(CredentialKey::UserData, "{oops")]));
        let controller = controller_with(store);
        assert_eq!(controller.stored_user(), None);
    }

    #[test]
    fn test_sync_auth_state_detects_cleared_token() {
        let store = Arc::new(MemoryCredentialStore::with_entries([(CredentialKey::AuthToken, "tok")]));
        let controller = controller_with(Arc::clone(&store));
        controller.load_state();
        assert!(controller.sync_auth_state());

        store.remove(CredentialKey::AuthToken).unwrap();
        assert!(!controller.sync_auth_state());
        assert!(!controller.state().is_authenticated());
    }

    #[tokio::test]
    async fn test_revalidate_without_token_is_false() {
        let store = Arc::new(MemoryCredentialStore::new());
        let controller = controller_with(store);
        controller.load_state();
        assert!(!controller.revalidate().await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_without_login_sets_error() {
        let store = Arc::new(MemoryCredentialStore::new());
        let controller = controller_with(Arc::clone(&store));
        controller.load_state();

        assert!(!controller.verify_otp("123456").await.unwrap());
        assert_eq!(controller.state().auth_error.as_deref(), Some(NO_PENDING_LOGIN));
        assert_eq!(store.get(CredentialKey::AuthToken).unwrap(), None);

        controller.clear_error();
        assert_eq!(controller.state().auth_error, None);
    }

    #[tokio::test]
    async fn test_subscribers_see_committed_state() {
        let store = Arc::new(MemoryCredentialStore::new());
        let controller = controller_with(store);
        let mut rx = controller.subscribe();

        controller.set_user_role(Some(UserRole::Teacher)).unwrap();
        assert!(rx.has_changed().unwrap());
        let seen = rx.borrow_and_update().clone();
        assert_eq!(seen.user_role, Some(UserRole::Teacher));
        assert!(!seen.is_loading);
    }

    #[test]
    fn test_mask_phone() {
        assert_eq!(mask_phone("9876543210"), "******3210");
        assert_eq!(mask_phone("123"), "123");
        assert_eq!(mask_phone(""), "");
    }
}
