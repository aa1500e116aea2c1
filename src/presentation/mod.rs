//! Presentation layer - User-facing interfaces

pub mod cli;
