//! REST API client module for the school portal backend.
//!
//! This module provides the `ApiClient`, the authorized request pipeline every
//! backend call goes through, and `AuthApi`, thin wrappers over the
//! authentication and profile endpoints.
//!
//! The backend uses bearer token authentication. Expired tokens are renewed
//! through `/auth/refresh` transparently, at most once per request.

pub mod client;
pub mod endpoints;
pub mod error;
pub mod models;

pub use client::{ApiClient, ApiRequest};
pub use endpoints::AuthApi;
pub use error::ApiError;
pub use models::{SendOtpResponse, TokenPair, User, UserProfile, ValidatedSession};
