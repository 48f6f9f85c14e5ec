//! Refresh policy
//!
//! Decides, per logical operation, whether the cache chain is trusted
//! as-is or a remote round trip must come first, and which fields get
//! repopulated. Forced refreshes are always caller-initiated and always
//! field-scoped; there is no background polling and no unscoped full
//! repopulation.

use std::collections::HashSet;

/// What the caller is doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Ordinary read: trust the cache chain.
    Browse,
    /// User explicitly asked for fresh data for these fields.
    ExplicitRefresh { fields: HashSet<String> },
    /// A side-effecting operation (e.g. a file transfer changing
    /// storage-location membership) invalidated these fields.
    FieldsInvalidated { fields: HashSet<String> },
}

/// Advisory freshness signal attached to a read.
///
/// Staleness is a policy outcome, never an error: `MayBeStale` alone
/// does not force a round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StalenessHint {
    Acceptable,
    MayBeStale,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RefreshPolicy;

impl RefreshPolicy {
    /// A remote round trip happens exactly when the caller asked for
    /// one; the hint never upgrades a browse and never downgrades an
    /// explicit request.
    pub fn should_force_remote(&self, operation: &Operation, _hint: StalenessHint) -> bool {
        matches!(
            operation,
            Operation::ExplicitRefresh { .. } | Operation::FieldsInvalidated { .. }
        )
    }

    /// The field subset a forced refresh repopulates; `None` for
    /// operations served from the cache chain.
    pub fn fields_to_repopulate(&self, operation: &Operation) -> Option<HashSet<String>> {
        match operation {
            Operation::Browse => None,
            Operation::ExplicitRefresh { fields } | Operation::FieldsInvalidated { fields } => {
                Some(fields.clone())
            }
        }
    }
}
