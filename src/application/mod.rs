//! Application layer - Use cases and orchestration
//!
//! Wires the domain services to concrete devices and parsers.

pub mod dto;
mod recovery_session;

pub use recovery_session::{RecoveryError, RecoveryStage, RecoverySession};
