//! Live sessions: one time-boxed availability window per user.
//!
//! [`SessionManager`] owns the lifecycle. The true coordinate of a session is
//! written once and never leaves the store; everything downstream works with
//! the fuzzed one.

pub mod errors;
pub mod manager;
pub mod models;

pub use errors::{SessionError, SessionResult};
pub use manager::SessionManager;
pub use models::{
    ClosedSession, DeviceFingerprint, DeviceInfo, EndReason, Session, SessionId, SessionStatus,
    SessionView, StartSessionRequest,
};
