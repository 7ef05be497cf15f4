use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{RequestId, WorkerId};
use super::specialization::Specialization;
use super::specification::{CompareOp, QueryExpr, QueryValue, Specification};

/// Policy dials for worker assignment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssignmentPolicy {
    /// Most requests a worker may carry at once.
    pub concurrency_cap: usize,
    /// Whether a General worker may cover a trade with no exact match.
    pub general_fallback: bool,
}

pub(crate) const DEFAULT_CONCURRENCY_CAP: usize = 3;

impl Default for AssignmentPolicy {
    fn default() -> Self {
        Self {
            concurrency_cap: DEFAULT_CONCURRENCY_CAP,
            general_fallback: true,
        }
    }
}

/// Named reasons an assignment attempt is refused. Surfaced to the caller
/// instead of a bare boolean so rejection messages stay actionable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum AssignmentRejection {
    #[error("worker trade {} does not match required {}", actual.label(), required.label())]
    SpecializationMismatch {
        required: Specialization,
        actual: Specialization,
    },
    #[error("worker is not available for new assignments")]
    Unavailable,
    #[error("worker already carries the maximum of {cap} active assignments")]
    AtCapacity { cap: usize },
}

/// Audit entry recorded whenever a worker's trade changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecializationChange {
    pub from: Specialization,
    pub to: Specialization,
    pub changed_by: String,
    pub changed_at: DateTime<Utc>,
}

/// A maintenance worker with one trade, an availability flag, and the
/// requests currently on their plate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    pub email: String,
    specialization: Specialization,
    /// Manual duty toggle; distinct from being full, which is derived.
    on_duty: bool,
    available: bool,
    assigned_requests: Vec<RequestId>,
    specialization_changes: Vec<SpecializationChange>,
    pub version: u64,
}

impl Worker {
    pub fn register(id: WorkerId, email: impl Into<String>, specialization: Specialization) -> Self {
        Self {
            id,
            email: email.into(),
            specialization,
            on_duty: true,
            available: true,
            assigned_requests: Vec::new(),
            specialization_changes: Vec::new(),
            version: 0,
        }
    }

    pub fn specialization(&self) -> Specialization {
        self.specialization
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn is_on_duty(&self) -> bool {
        self.on_duty
    }

    /// Take the worker on or off duty and recompute availability.
    pub fn set_on_duty(&mut self, on_duty: bool, policy: &AssignmentPolicy) {
        self.on_duty = on_duty;
        self.recompute_availability(policy);
    }

    pub fn assigned_requests(&self) -> &[RequestId] {
        &self.assigned_requests
    }

    pub fn active_assignments(&self) -> usize {
        self.assigned_requests.len()
    }

    pub fn specialization_changes(&self) -> &[SpecializationChange] {
        &self.specialization_changes
    }

    /// Check whether this worker may take a request requiring `required`.
    ///
    /// An exact trade match is demanded here; widening to General workers is
    /// the caller's fallback policy, applied through the specification
    /// engine, never a hidden default inside this check.
    pub fn eligibility(
        &self,
        required: Specialization,
        policy: &AssignmentPolicy,
    ) -> Result<(), AssignmentRejection> {
        if self.specialization != required {
            return Err(AssignmentRejection::SpecializationMismatch {
                required,
                actual: self.specialization,
            });
        }
        if !self.on_duty {
            return Err(AssignmentRejection::Unavailable);
        }
        if self.assigned_requests.len() >= policy.concurrency_cap {
            return Err(AssignmentRejection::AtCapacity {
                cap: policy.concurrency_cap,
            });
        }
        Ok(())
    }

    /// Record a new assignment and recompute availability. Capacity is
    /// re-checked so a stale caller can never push a worker past the cap.
    pub fn assign(
        &mut self,
        request: RequestId,
        policy: &AssignmentPolicy,
    ) -> Result<(), AssignmentRejection> {
        if !self.on_duty {
            return Err(AssignmentRejection::Unavailable);
        }
        if self.assigned_requests.len() >= policy.concurrency_cap {
            return Err(AssignmentRejection::AtCapacity {
                cap: policy.concurrency_cap,
            });
        }
        if !self.assigned_requests.contains(&request) {
            self.assigned_requests.push(request);
        }
        self.recompute_availability(policy);
        Ok(())
    }

    /// Drop an assignment and recompute availability. Releasing a request
    /// the worker does not hold is a no-op.
    pub fn release(&mut self, request: &RequestId, policy: &AssignmentPolicy) {
        self.assigned_requests.retain(|held| held != request);
        self.recompute_availability(policy);
    }

    fn recompute_availability(&mut self, policy: &AssignmentPolicy) {
        self.available = self.on_duty && self.assigned_requests.len() < policy.concurrency_cap;
    }

    /// Audited trade change. The service layer verifies no active assignment
    /// conflicts with the new trade before calling this.
    pub fn change_specialization(
        &mut self,
        to: Specialization,
        changed_by: impl Into<String>,
        changed_at: DateTime<Utc>,
    ) {
        if to == self.specialization {
            return;
        }
        self.specialization_changes.push(SpecializationChange {
            from: self.specialization,
            to,
            changed_by: changed_by.into(),
            changed_at,
        });
        self.specialization = to;
    }
}

/// Field names a store adapter must support to translate worker queries.
pub const WORKER_QUERY_FIELDS: &[&str] = &["specialization", "available", "active_assignments"];

/// Workers holding exactly the given trade.
pub fn workers_with_specialization(specialization: Specialization) -> Specification<Worker> {
    Specification::new(
        QueryExpr::compare(
            "specialization",
            CompareOp::Eq,
            QueryValue::Text(specialization.label().to_string()),
        ),
        move |worker: &Worker| worker.specialization == specialization,
    )
}

/// Workers currently open to new assignments.
pub fn available_workers() -> Specification<Worker> {
    Specification::new(
        QueryExpr::compare("available", CompareOp::Eq, QueryValue::Boolean(true)),
        |worker: &Worker| worker.available,
    )
}

/// Workers below the configured concurrency cap.
pub fn workers_below_cap(cap: usize) -> Specification<Worker> {
    Specification::new(
        QueryExpr::compare(
            "active_assignments",
            CompareOp::Lt,
            QueryValue::Integer(cap as i64),
        ),
        move |worker: &Worker| worker.assigned_requests.len() < cap,
    )
}

/// Composite used by the assignment flow: exact trade, available, below cap.
pub fn eligible_workers(
    specialization: Specialization,
    policy: &AssignmentPolicy,
) -> Specification<Worker> {
    workers_with_specialization(specialization)
        .and(available_workers())
        .and(workers_below_cap(policy.concurrency_cap))
}
