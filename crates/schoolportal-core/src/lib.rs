//! Core library for the school portal client.
//!
//! This crate owns everything between the front end and the backend:
//! - `auth`: durable credential storage and device identity
//! - `api`: the authorized request pipeline and endpoint wrappers
//! - `session`: the session controller state machine and its published state
//! - `config`: application configuration
//!
//! Front ends construct a [`SessionController`] once and share it behind an
//! `Arc`; screens subscribe to [`SessionState`] updates instead of reading any
//! global state.

pub mod api;
pub mod auth;
pub mod config;
pub mod session;

pub use api::{ApiClient, ApiError, AuthApi};
pub use auth::{CredentialKey, CredentialStore, StorageError};
pub use config::{Config, CredentialBackend};
pub use session::{
    Alert, LoginOutcome, NavigationTarget, SessionController, SessionError, SessionPhase,
    SessionState, UserRole,
};
