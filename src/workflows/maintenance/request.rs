use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    AuthorizationError, Principal, PropertyId, RequestId, Role, TenantId, Urgency, WorkerId,
};
use super::specialization::Specialization;
use super::specification::{CompareOp, QueryExpr, QueryValue, Specification};
use super::worker::AssignmentRejection;

/// Lifecycle states of a maintenance request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Submitted,
    InReview,
    Assigned,
    InProgress,
    Completed,
    Declined,
    Escalated,
}

impl RequestStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::InReview => "in_review",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Declined => "declined",
            Self::Escalated => "escalated",
        }
    }

    /// Legal successors in the status graph. InReview is never skipped and
    /// terminal states have no exits.
    pub const fn successors(self) -> &'static [RequestStatus] {
        match self {
            Self::Submitted => &[Self::InReview, Self::Declined],
            Self::InReview => &[Self::Assigned, Self::Declined, Self::Escalated],
            Self::Assigned => &[Self::InProgress, Self::Declined, Self::Escalated],
            Self::InProgress => &[Self::Completed, Self::Escalated],
            Self::Escalated => &[Self::InReview],
            Self::Completed | Self::Declined => &[],
        }
    }

    pub fn can_transition_to(self, target: RequestStatus) -> bool {
        self.successors().contains(&target)
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "submitted" => Some(Self::Submitted),
            "in_review" => Some(Self::InReview),
            "assigned" => Some(Self::Assigned),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "declined" => Some(Self::Declined),
            "escalated" => Some(Self::Escalated),
            _ => None,
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Declined)
    }

    /// Statuses in which the request must hold a worker reference.
    pub const fn requires_worker(self) -> bool {
        matches!(self, Self::Assigned | Self::InProgress | Self::Completed)
    }
}

/// A domain rule was about to be broken. Distinct from authorization
/// failures so callers can tell "invalid" from "forbidden".
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum InvariantViolation {
    #[error("request {request}: illegal transition {} -> {}", from.label(), to.label())]
    IllegalTransition {
        request: RequestId,
        from: RequestStatus,
        to: RequestStatus,
    },
    #[error("request {request} is {} and can no longer change", status.label())]
    TerminalRequest {
        request: RequestId,
        status: RequestStatus,
    },
    #[error("request {request} cannot become assigned without a worker reference")]
    AssignmentWithoutWorker { request: RequestId },
    #[error("worker {worker} cannot take request {request}: {reason}")]
    IneligibleWorker {
        worker: WorkerId,
        request: RequestId,
        reason: AssignmentRejection,
    },
    #[error("no eligible worker for request {request} requiring {}", required.label())]
    NoEligibleWorker {
        request: RequestId,
        required: Specialization,
    },
    #[error("tenant {tenant} does not belong to property {property}")]
    ForeignTenant {
        tenant: TenantId,
        property: PropertyId,
    },
    #[error("property {property} is not active and cannot accept requests")]
    InactiveProperty { property: PropertyId },
    #[error(
        "worker {worker} still holds request {request} requiring {}",
        required.label()
    )]
    SpecializationInUse {
        worker: WorkerId,
        request: RequestId,
        required: Specialization,
    },
}

/// Rejections the request aggregate itself can raise.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RequestError {
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
    #[error(transparent)]
    Unauthorized(#[from] AuthorizationError),
}

/// One applied transition, kept for audit and timestamp queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: Option<RequestStatus>,
    pub to: RequestStatus,
    pub at: DateTime<Utc>,
    pub actor: String,
}

/// A tenant-filed maintenance request. Born only through
/// `Property::file_request`; mutated only through the status-policy-gated
/// operations below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantRequest {
    pub id: RequestId,
    pub property_id: PropertyId,
    pub tenant_id: TenantId,
    pub description: String,
    required_specialization: Specialization,
    status: RequestStatus,
    assigned_worker: Option<WorkerId>,
    pub urgency: Urgency,
    history: Vec<TransitionRecord>,
    pub version: u64,
}

impl TenantRequest {
    /// Crate-internal constructor; the property aggregate is the only
    /// legitimate birthplace of a request.
    pub(crate) fn submitted(
        id: RequestId,
        property_id: PropertyId,
        tenant_id: TenantId,
        description: String,
        required_specialization: Specialization,
        urgency: Urgency,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            property_id,
            tenant_id: tenant_id.clone(),
            description,
            required_specialization,
            status: RequestStatus::Submitted,
            assigned_worker: None,
            urgency,
            history: vec![TransitionRecord {
                from: None,
                to: RequestStatus::Submitted,
                at: now,
                actor: tenant_id.0,
            }],
            version: 0,
        }
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    pub fn required_specialization(&self) -> Specialization {
        self.required_specialization
    }

    pub fn assigned_worker(&self) -> Option<&WorkerId> {
        self.assigned_worker.as_ref()
    }

    pub fn history(&self) -> &[TransitionRecord] {
        &self.history
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.history
            .first()
            .map(|record| record.at)
            .unwrap_or_else(Utc::now)
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.history
            .last()
            .map(|record| record.at)
            .unwrap_or_else(Utc::now)
    }

    /// Whether an acting principal may read this request.
    pub fn can_view(&self, actor: &Principal) -> bool {
        match actor.role {
            Role::Manager | Role::System => true,
            Role::Tenant => self.tenant_id.0 == actor.user_id,
            Role::Worker => self
                .assigned_worker
                .as_ref()
                .is_some_and(|worker| worker.0 == actor.user_id),
        }
    }

    /// Open past the urgency window for its age.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal()
            && now - self.submitted_at() > Duration::hours(self.urgency.overdue_after_hours())
    }

    /// The worker-linkage invariant: a worker reference exists exactly when
    /// the status calls for one.
    pub fn worker_link_consistent(&self) -> bool {
        self.assigned_worker.is_some() == self.status.requires_worker()
    }

    /// Apply a status-policy-gated transition.
    ///
    /// Graph legality is checked before authorization so the two failure
    /// kinds never blur. Returns the worker whose load this transition
    /// frees: a decline or escalation unlinks the worker, while completion
    /// keeps the reference for audit but still releases capacity. The
    /// caller must release that worker within the same unit of work.
    pub fn transition(
        &mut self,
        to: RequestStatus,
        actor: &Principal,
        now: DateTime<Utc>,
    ) -> Result<Option<WorkerId>, RequestError> {
        self.check_open()?;
        if to == RequestStatus::Assigned {
            return Err(InvariantViolation::AssignmentWithoutWorker {
                request: self.id.clone(),
            }
            .into());
        }
        self.check_legal(to)?;
        self.check_authorized(actor, to)?;

        self.record(to, actor, now);

        let released = if !to.requires_worker() {
            self.assigned_worker.take()
        } else if to == RequestStatus::Completed {
            self.assigned_worker.clone()
        } else {
            None
        };
        Ok(released)
    }

    /// Link a worker and move to Assigned. Eligibility of the worker is the
    /// caller's concern; this method owns the graph and authorization gates.
    pub fn assign_to(
        &mut self,
        worker: WorkerId,
        actor: &Principal,
        now: DateTime<Utc>,
    ) -> Result<(), RequestError> {
        self.check_open()?;
        self.check_legal(RequestStatus::Assigned)?;
        self.check_authorized(actor, RequestStatus::Assigned)?;

        self.assigned_worker = Some(worker);
        self.record(RequestStatus::Assigned, actor, now);
        Ok(())
    }

    fn check_open(&self) -> Result<(), InvariantViolation> {
        if self.status.is_terminal() {
            return Err(InvariantViolation::TerminalRequest {
                request: self.id.clone(),
                status: self.status,
            });
        }
        Ok(())
    }

    fn check_legal(&self, to: RequestStatus) -> Result<(), InvariantViolation> {
        if !self.status.can_transition_to(to) {
            return Err(InvariantViolation::IllegalTransition {
                request: self.id.clone(),
                from: self.status,
                to,
            });
        }
        Ok(())
    }

    fn check_authorized(
        &self,
        actor: &Principal,
        to: RequestStatus,
    ) -> Result<(), AuthorizationError> {
        let allowed = match to {
            // Review decisions, declines, escalations, and assignment are
            // manager/system calls.
            RequestStatus::InReview
            | RequestStatus::Declined
            | RequestStatus::Escalated
            | RequestStatus::Assigned => actor.is_staff(),
            // Work progress belongs to the assigned worker or a manager.
            RequestStatus::InProgress | RequestStatus::Completed => {
                actor.is_staff()
                    || (actor.role == Role::Worker
                        && self
                            .assigned_worker
                            .as_ref()
                            .is_some_and(|worker| worker.0 == actor.user_id))
            }
            RequestStatus::Submitted => actor.is_staff(),
        };

        if allowed {
            Ok(())
        } else {
            Err(AuthorizationError::new(
                actor,
                format!("move request {} to {}", self.id, to.label()),
            ))
        }
    }

    fn record(&mut self, to: RequestStatus, actor: &Principal, now: DateTime<Utc>) {
        self.history.push(TransitionRecord {
            from: Some(self.status),
            to,
            at: now,
            actor: actor.user_id.clone(),
        });
        self.status = to;
    }

    pub fn status_view(&self) -> RequestStatusView {
        RequestStatusView {
            request_id: self.id.clone(),
            property_id: self.property_id.clone(),
            status: self.status.label(),
            required_specialization: self.required_specialization.label(),
            urgency: self.urgency.label(),
            assigned_worker: self.assigned_worker.clone(),
            submitted_at: self.submitted_at(),
            updated_at: self.updated_at(),
        }
    }
}

/// Sanitized projection of a request for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct RequestStatusView {
    pub request_id: RequestId,
    pub property_id: PropertyId,
    pub status: &'static str,
    pub required_specialization: &'static str,
    pub urgency: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_worker: Option<WorkerId>,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Field names a store adapter must support to translate request queries.
pub const REQUEST_QUERY_FIELDS: &[&str] = &[
    "status",
    "property_id",
    "required_specialization",
    "urgency",
    "submitted_at",
];

pub fn requests_by_status(status: RequestStatus) -> Specification<TenantRequest> {
    Specification::new(
        QueryExpr::compare(
            "status",
            CompareOp::Eq,
            QueryValue::Text(status.label().to_string()),
        ),
        move |request: &TenantRequest| request.status == status,
    )
}

pub fn requests_for_property(property: PropertyId) -> Specification<TenantRequest> {
    let expr = QueryExpr::compare(
        "property_id",
        CompareOp::Eq,
        QueryValue::Text(property.0.clone()),
    );
    Specification::new(expr, move |request: &TenantRequest| {
        request.property_id == property
    })
}

pub fn requests_requiring(specialization: Specialization) -> Specification<TenantRequest> {
    Specification::new(
        QueryExpr::compare(
            "required_specialization",
            CompareOp::Eq,
            QueryValue::Text(specialization.label().to_string()),
        ),
        move |request: &TenantRequest| request.required_specialization == specialization,
    )
}

pub fn requests_with_urgency(urgency: Urgency) -> Specification<TenantRequest> {
    Specification::new(
        QueryExpr::compare(
            "urgency",
            CompareOp::Eq,
            QueryValue::Text(urgency.label().to_string()),
        ),
        move |request: &TenantRequest| request.urgency == urgency,
    )
}

pub fn requests_submitted_before(cutoff: DateTime<Utc>) -> Specification<TenantRequest> {
    Specification::new(
        QueryExpr::compare(
            "submitted_at",
            CompareOp::Le,
            QueryValue::Text(cutoff.to_rfc3339()),
        ),
        move |request: &TenantRequest| request.submitted_at() <= cutoff,
    )
}

/// Requests not yet terminally closed.
pub fn open_requests() -> Specification<TenantRequest> {
    requests_by_status(RequestStatus::Completed)
        .or(requests_by_status(RequestStatus::Declined))
        .not()
}

/// Overdue by urgency and age: for each urgency level, open requests older
/// than that level's window. Built from the composition primitives so it
/// stays evaluable both in memory and against a store.
pub fn overdue_requests(now: DateTime<Utc>) -> Specification<TenantRequest> {
    let [low, routine, urgent, emergency] = Urgency::ordered().map(|urgency| {
        let cutoff = now - Duration::hours(urgency.overdue_after_hours());
        requests_with_urgency(urgency).and(requests_submitted_before(cutoff))
    });

    open_requests().and(low.or(routine).or(urgent).or(emergency))
}
