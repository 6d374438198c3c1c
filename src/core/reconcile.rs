//! Arbitration between a stored price and a new observation for the same date

use super::price::{Observation, PriceRecord, SourcePriority};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Close is zero, negative or not a finite number.
    NonPositiveClose,
    /// A less authoritative source never overwrites a more authoritative one.
    LowerPriority,
    /// Same rank and same close as what is stored.
    Unchanged,
    /// A new date older than every date the retention window keeps.
    OutsideRetention,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Replace,
    Reject(RejectReason),
}

#[derive(Debug, Clone)]
pub struct Reconciler {
    priority: SourcePriority,
}

impl Reconciler {
    pub fn new(priority: SourcePriority) -> Self {
        Self { priority }
    }

    pub fn priority(&self) -> &SourcePriority {
        &self.priority
    }

    pub fn decide(&self, existing: Option<&PriceRecord>, candidate: &Observation) -> Decision {
        if !candidate.close.is_finite() || candidate.close <= 0.0 {
            return Decision::Reject(RejectReason::NonPositiveClose);
        }

        let Some(existing) = existing else {
            return Decision::Replace;
        };

        let existing_rank = self.priority.rank(existing.source);
        let candidate_rank = self.priority.rank(candidate.source);

        if candidate_rank < existing_rank {
            return Decision::Reject(RejectReason::LowerPriority);
        }
        if candidate_rank == existing_rank && candidate.close == existing.close {
            return Decision::Reject(RejectReason::Unchanged);
        }
        Decision::Replace
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(SourcePriority::default())
    }
}
