//! Namespace leases
//!
//! Two refinement runs must never touch the same sandbox schema: the
//! proposal schema is dropped and recreated on every schema iteration and
//! the replica schema is rebuilt on preparation. A [`NamespaceRegistry`]
//! hands out exclusive leases on qualified schema names; a lease is
//! released when dropped.

use remodel_core::{NamespaceContext, SandboxError};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Process-wide set of leased namespaces.
#[derive(Debug, Clone, Default)]
pub struct NamespaceRegistry {
    leased: Arc<Mutex<HashSet<String>>>,
}

impl NamespaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lease the replica and proposal namespaces of `ctx`.
    ///
    /// Fails with `NamespaceBusy` if either is already leased, or if the two
    /// name the same schema.
    pub fn acquire(&self, ctx: &NamespaceContext) -> Result<NamespaceLease, SandboxError> {
        let replica = normalize_key(&ctx.replica_schema());
        let proposal = normalize_key(&ctx.proposal_schema());

        if replica == proposal {
            return Err(SandboxError::NamespaceBusy {
                namespace: ctx.proposal_schema(),
            });
        }

        let mut leased = self.leased.lock().map_err(|_| SandboxError::Engine {
            reason: "namespace registry lock poisoned".to_string(),
        })?;

        for (key, display) in [
            (&replica, ctx.replica_schema()),
            (&proposal, ctx.proposal_schema()),
        ] {
            if leased.contains(key) {
                return Err(SandboxError::NamespaceBusy { namespace: display });
            }
        }

        leased.insert(replica.clone());
        leased.insert(proposal.clone());

        Ok(NamespaceLease {
            registry: Arc::clone(&self.leased),
            keys: vec![replica, proposal],
        })
    }

    /// Whether `qualified_schema` is currently leased.
    pub fn is_leased(&self, qualified_schema: &str) -> bool {
        self.leased
            .lock()
            .map(|leased| leased.contains(&normalize_key(qualified_schema)))
            .unwrap_or(false)
    }

    pub fn active_leases(&self) -> usize {
        self.leased.lock().map(|leased| leased.len()).unwrap_or(0)
    }
}

/// Exclusive hold on a task's namespaces. Released on drop.
#[derive(Debug)]
pub struct NamespaceLease {
    registry: Arc<Mutex<HashSet<String>>>,
    keys: Vec<String>,
}

impl Drop for NamespaceLease {
    fn drop(&mut self) {
        if let Ok(mut leased) = self.registry.lock() {
            for key in &self.keys {
                leased.remove(key);
            }
        }
    }
}

/// Unquoted identifiers are case-insensitive in Trino; quoted ones keep case.
fn normalize_key(qualified: &str) -> String {
    if qualified.contains('"') {
        qualified.to_string()
    } else {
        qualified.to_ascii_lowercase()
    }
}
