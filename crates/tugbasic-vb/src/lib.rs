//! Visual Basic 6 support for tugbasic.
//!
//! This crate turns a VB6 project (a `.vbp` manifest or a directory of
//! `.bas`/`.cls`/`.frm` files) into a symbol model and a rename plan:
//! - Lexing, line continuation and declaration recognition
//! - Per-module symbol model with declaration positions
//! - Cross-module reference resolution (two-pass, typed receivers)
//! - Normalized naming with collision handling
//! - Rename planning, application and exports

pub mod apply;
pub mod continuation;
pub mod env;
pub mod export;
pub mod files;
pub mod filter;
pub mod index;
pub mod lexer;
pub mod manifest;
pub mod model;
pub mod naming;
pub mod ops;
pub mod parser;
pub mod plan;
pub mod recognizer;
pub mod resolve;

pub use model::{ModuleId, ModuleKind, Project, SymbolRef};
pub use ops::{analyze, load_project, plan_renames, run_pipeline, PipelineOptions};
