//! Trino REST client
//!
//! Statements go through the coordinator's `/v1/statement` protocol: POST
//! the SQL, then follow `nextUri` until the query finishes. An `error`
//! object on any page means the statement failed.

pub mod client;
pub mod types;

pub use client::TrinoEngine;
