//! Core infrastructure for tugbasic.
//!
//! This crate provides language-agnostic infrastructure:
//! - Patch IR for line-addressed text edits
//! - Text utilities (legacy code page, line endings, char offsets)
//! - Error types and error codes
//! - JSON output types for CLI responses
//! - Backup sessions and atomic writes
//! - Configuration precedence
//! - Progress reporting seam

pub mod backup;
pub mod config;
pub mod error;
pub mod output;
pub mod patch;
pub mod progress;
pub mod text;
