//! Infrastructure layer
//!
//! Concrete implementations of the domain repositories: device access and
//! the per-format metadata parsers. All platform-specific code lives here.

pub mod block_device;
pub mod file_systems;
