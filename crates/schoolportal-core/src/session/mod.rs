//! Session lifecycle: the controller state machine and the state it publishes.
//!
//! `SessionController` is the single owner of session state. It moves through
//! `Unloaded -> Loading -> {Unauthenticated, Authenticated}` and publishes every
//! committed change on a `tokio::sync::watch` channel, so readers never observe
//! a half-applied operation.

pub mod controller;
pub mod navigation;
pub mod state;

pub use controller::{LoginOutcome, SessionController, SessionError};
pub use navigation::NavigationTarget;
pub use state::{Alert, SessionPhase, SessionState, UserRole};
