//! Remodel Sandbox - Statement Execution
//!
//! Untrusted proposals are run against a live SQL engine inside an isolated
//! namespace before anything is accepted.
//!
//! ```text
//! NamespaceRegistry ──acquire──► SandboxSession ──rewrite──► ExecutionEngine
//!                                   │                         ├─ TrinoEngine
//!                                   ├─ prepare (replica)      └─ RecordingEngine
//!                                   ├─ reset_proposal_namespace
//!                                   └─ validate / first_failure
//! ```

pub mod config;
pub mod engine;
pub mod lease;
pub mod recording;
pub mod session;
pub mod trino;
pub mod validate;

pub use config::SandboxConfig;
pub use engine::{strip_trailing_semicolon, ExecutionEngine, StatementOutcome};
pub use lease::{NamespaceLease, NamespaceRegistry};
pub use recording::RecordingEngine;
pub use session::SandboxSession;
pub use trino::TrinoEngine;
pub use validate::{check, first_failure, validate};
