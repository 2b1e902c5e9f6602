//! Tugbasic - project-wide identifier normalization for legacy VB6 code.
//!
//! This crate provides the CLI binary and its library facade.
//!
//! ## Modules
//!
//! - `cli` - command implementations producing JSON responses

pub mod cli;

// Re-export core types for convenience
pub use tugbasic_core::error::{OutputErrorCode, TugError};
pub use tugbasic_core::output::{ErrorInfo, ErrorResponse, Location, Warning, SCHEMA_VERSION};
pub use tugbasic_vb;
