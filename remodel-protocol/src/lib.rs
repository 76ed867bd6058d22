//! Remodel Protocol - Completion Text Protocol
//!
//! The completion service answers in free text. This crate owns the
//! contract for that text:
//!
//! ```text
//! Prompt templates (prompt)
//!     ↓  completion service
//! Raw response
//!     ↓  framing checks (grammar)
//! Response body
//!     ↓  section parser (parser)
//! RefinementArtifact
//! ```

pub mod grammar;
pub mod parser;
pub mod prompt;

pub use grammar::{
    classify_rewrite_response, classify_schema_response, render_response, RewriteResponse,
    SchemaResponse, DEFAULT_TERMINATOR, IMPOSSIBLE,
};
pub use parser::{parse, parse_with_terminator};
pub use prompt::SchemaRequest;
