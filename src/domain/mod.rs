//! Domain layer - Core business logic
//!
//! Entities, repository traits and domain services. Nothing here touches a
//! concrete device or platform API.

pub mod entities;
pub mod repositories;
pub mod services;
