use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info};

use super::domain::{
    AuthorizationError, Principal, PropertyId, RequestId, Role, ValidationError, WorkerId,
};
use super::property::{FileRequestError, RequestIntake};
use super::repository::{
    DirectoryError, DomainEvent, NotificationError, NotificationPublisher, PrincipalDirectory,
    PropertyRepository, RepositoryError, RequestRepository, WorkerRepository,
};
use super::request::{
    overdue_requests, InvariantViolation, RequestError, RequestStatus, RequestStatusView,
    TenantRequest,
};
use super::specialization::Specialization;
use super::specification::OrderDirection;
use super::worker::{eligible_workers, AssignmentPolicy, AssignmentRejection, Worker};

/// Error raised by the maintenance service. Arms mirror the rejection
/// taxonomy so callers can tell validation, invariant, authorization, and
/// store failures apart.
#[derive(Debug, thiserror::Error)]
pub enum MaintenanceServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
    #[error(transparent)]
    Unauthorized(#[from] AuthorizationError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Notification(#[from] NotificationError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

impl From<RequestError> for MaintenanceServiceError {
    fn from(value: RequestError) -> Self {
        match value {
            RequestError::Invariant(violation) => Self::Invariant(violation),
            RequestError::Unauthorized(denied) => Self::Unauthorized(denied),
        }
    }
}

impl From<FileRequestError> for MaintenanceServiceError {
    fn from(value: FileRequestError) -> Self {
        match value {
            FileRequestError::Validation(invalid) => Self::Validation(invalid),
            FileRequestError::Invariant(violation) => Self::Invariant(violation),
        }
    }
}

static REQUEST_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_request_id() -> RequestId {
    let id = REQUEST_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    RequestId(format!("req-{id:06}"))
}

/// Service composing the aggregates, repositories, principal directory, and
/// notification sink. Every public operation is one synchronous unit of
/// work: resolve the actor, mutate aggregates in memory, persist, emit.
pub struct MaintenanceService<P, W, Q, D, N> {
    properties: Arc<P>,
    workers: Arc<W>,
    requests: Arc<Q>,
    directory: Arc<D>,
    notifications: Arc<N>,
    policy: AssignmentPolicy,
}

impl<P, W, Q, D, N> MaintenanceService<P, W, Q, D, N>
where
    P: PropertyRepository + 'static,
    W: WorkerRepository + 'static,
    Q: RequestRepository + 'static,
    D: PrincipalDirectory + 'static,
    N: NotificationPublisher + 'static,
{
    pub fn new(
        properties: Arc<P>,
        workers: Arc<W>,
        requests: Arc<Q>,
        directory: Arc<D>,
        notifications: Arc<N>,
        policy: AssignmentPolicy,
    ) -> Self {
        Self {
            properties,
            workers,
            requests,
            directory,
            notifications,
            policy,
        }
    }

    pub fn policy(&self) -> &AssignmentPolicy {
        &self.policy
    }

    fn resolve_actor(
        &self,
        user_id: &str,
        property: Option<&PropertyId>,
        action: &str,
    ) -> Result<Principal, MaintenanceServiceError> {
        match self.directory.lookup(user_id, property)? {
            Some(role) => Ok(Principal::new(user_id, role)),
            None => Err(AuthorizationError::unknown_user(user_id, action).into()),
        }
    }

    fn must_get_request(&self, id: &RequestId) -> Result<TenantRequest, MaintenanceServiceError> {
        Ok(self.requests.get(id)?.ok_or(RepositoryError::NotFound)?)
    }

    fn must_get_worker(&self, id: &WorkerId) -> Result<Worker, MaintenanceServiceError> {
        Ok(self.workers.get(id)?.ok_or(RepositoryError::NotFound)?)
    }

    /// File a new request under a property. Tenants may only file for
    /// themselves; managers and the system may file on a tenant's behalf.
    pub fn submit_request(
        &self,
        user_id: &str,
        property_id: &PropertyId,
        intake: RequestIntake,
        now: DateTime<Utc>,
    ) -> Result<TenantRequest, MaintenanceServiceError> {
        let mut property = self
            .properties
            .get(property_id)?
            .ok_or(RepositoryError::NotFound)?;

        let actor = self.resolve_actor(user_id, Some(property_id), "file a request")?;
        match actor.role {
            Role::Tenant if actor.user_id == intake.tenant_id.0 => {}
            Role::Manager | Role::System => {}
            _ => {
                return Err(AuthorizationError::new(
                    &actor,
                    format!("file a request for tenant {}", intake.tenant_id),
                )
                .into())
            }
        }

        let request_id = next_request_id();
        let request = property.file_request(request_id, intake, now)?;

        self.properties.update(&property)?;
        if let Err(err) = self.requests.add(request.clone()) {
            // The property registry already holds the new id; retract it so
            // no orphan reference survives the failed pair of writes.
            match self.properties.get(property_id) {
                Ok(Some(mut stored)) => {
                    stored.retract_request(&request.id);
                    if let Err(revert) = self.properties.update(&stored) {
                        error!(property = %property_id, request = %request.id, %revert,
                            "failed to retract request id after store failure");
                    }
                }
                Ok(None) => error!(property = %property_id, "property vanished during compensation"),
                Err(fetch) => error!(property = %property_id, %fetch,
                    "could not re-read property for compensation"),
            }
            return Err(err.into());
        }

        info!(request = %request.id, property = %property_id,
            specialization = request.required_specialization().label(),
            "maintenance request filed");

        self.notifications.publish(DomainEvent::RequestCreated {
            request_id: request.id.clone(),
            property_id: request.property_id.clone(),
            tenant_id: request.tenant_id.clone(),
            required_specialization: request.required_specialization(),
            urgency: request.urgency,
            at: now,
        })?;

        Ok(request)
    }

    /// Fetch a request for a principal allowed to see it.
    pub fn view_request(
        &self,
        user_id: &str,
        request_id: &RequestId,
    ) -> Result<RequestStatusView, MaintenanceServiceError> {
        let request = self.must_get_request(request_id)?;
        let actor = self.resolve_actor(
            user_id,
            Some(&request.property_id),
            "view a maintenance request",
        )?;
        if !request.can_view(&actor) {
            return Err(
                AuthorizationError::new(&actor, format!("view request {}", request.id)).into(),
            );
        }
        Ok(request.status_view())
    }

    /// Apply a status transition. When the transition frees a worker's
    /// capacity (decline, escalation, or completion of an assigned request)
    /// the worker release is part of the same unit of work, with a
    /// compensating step if the request write fails after the worker write
    /// landed.
    pub fn transition_request(
        &self,
        user_id: &str,
        request_id: &RequestId,
        to: RequestStatus,
        now: DateTime<Utc>,
    ) -> Result<RequestStatusView, MaintenanceServiceError> {
        let mut request = self.must_get_request(request_id)?;
        let actor = self.resolve_actor(
            user_id,
            Some(&request.property_id),
            &format!("move request {} to {}", request_id, to.label()),
        )?;

        let from = request.status();
        let released = request.transition(to, &actor, now)?;

        match released {
            Some(worker_id) => {
                let mut worker = self.must_get_worker(&worker_id)?;
                worker.release(&request.id, &self.policy);
                self.workers.update(&worker)?;

                if let Err(err) = self.requests.update(&request) {
                    self.restore_worker_assignment(&worker_id, &request.id);
                    return Err(err.into());
                }
            }
            None => self.requests.update(&request)?,
        }

        info!(request = %request.id, from = from.label(), to = to.label(),
            actor = %actor.user_id, "request status changed");

        self.notifications.publish(DomainEvent::RequestStatusChanged {
            request_id: request.id.clone(),
            property_id: request.property_id.clone(),
            from,
            to,
            actor: actor.user_id,
            at: now,
        })?;

        Ok(request.status_view())
    }

    pub fn start_review(
        &self,
        user_id: &str,
        request_id: &RequestId,
        now: DateTime<Utc>,
    ) -> Result<RequestStatusView, MaintenanceServiceError> {
        self.transition_request(user_id, request_id, RequestStatus::InReview, now)
    }

    /// Return an escalated request to the review queue.
    pub fn resume_review(
        &self,
        user_id: &str,
        request_id: &RequestId,
        now: DateTime<Utc>,
    ) -> Result<RequestStatusView, MaintenanceServiceError> {
        self.transition_request(user_id, request_id, RequestStatus::InReview, now)
    }

    pub fn decline(
        &self,
        user_id: &str,
        request_id: &RequestId,
        now: DateTime<Utc>,
    ) -> Result<RequestStatusView, MaintenanceServiceError> {
        self.transition_request(user_id, request_id, RequestStatus::Declined, now)
    }

    pub fn escalate(
        &self,
        user_id: &str,
        request_id: &RequestId,
        now: DateTime<Utc>,
    ) -> Result<RequestStatusView, MaintenanceServiceError> {
        self.transition_request(user_id, request_id, RequestStatus::Escalated, now)
    }

    pub fn start_work(
        &self,
        user_id: &str,
        request_id: &RequestId,
        now: DateTime<Utc>,
    ) -> Result<RequestStatusView, MaintenanceServiceError> {
        self.transition_request(user_id, request_id, RequestStatus::InProgress, now)
    }

    pub fn complete(
        &self,
        user_id: &str,
        request_id: &RequestId,
        now: DateTime<Utc>,
    ) -> Result<RequestStatusView, MaintenanceServiceError> {
        self.transition_request(user_id, request_id, RequestStatus::Completed, now)
    }

    /// Assign a specific worker to a request.
    ///
    /// An exact trade match is required unless the policy allows the General
    /// fallback and the specification engine confirms no exact-trade worker
    /// is currently eligible.
    pub fn assign_worker(
        &self,
        user_id: &str,
        request_id: &RequestId,
        worker_id: &WorkerId,
        now: DateTime<Utc>,
    ) -> Result<RequestStatusView, MaintenanceServiceError> {
        let request = self.must_get_request(request_id)?;
        let actor = self.resolve_actor(
            user_id,
            Some(&request.property_id),
            &format!("assign request {}", request_id),
        )?;
        let worker = self.must_get_worker(worker_id)?;

        let required = request.required_specialization();
        if let Err(reason) = worker.eligibility(required, &self.policy) {
            let fallback_applies = matches!(
                reason,
                AssignmentRejection::SpecializationMismatch { .. }
            ) && self.policy.general_fallback
                && worker.specialization() == Specialization::General
                && required != Specialization::General;

            if !fallback_applies {
                return Err(InvariantViolation::IneligibleWorker {
                    worker: worker.id.clone(),
                    request: request.id.clone(),
                    reason,
                }
                .into());
            }

            let exact_pool = self.workers.count(&eligible_workers(required, &self.policy))?;
            if exact_pool > 0 {
                return Err(InvariantViolation::IneligibleWorker {
                    worker: worker.id.clone(),
                    request: request.id.clone(),
                    reason,
                }
                .into());
            }
        }

        self.finish_assignment(&actor, request, worker, now)
    }

    /// Let the specification engine pick the least-loaded eligible worker,
    /// widening to the General pool only under the fallback policy.
    pub fn assign_best_worker(
        &self,
        user_id: &str,
        request_id: &RequestId,
        now: DateTime<Utc>,
    ) -> Result<RequestStatusView, MaintenanceServiceError> {
        let request = self.must_get_request(request_id)?;
        let actor = self.resolve_actor(
            user_id,
            Some(&request.property_id),
            &format!("assign request {}", request_id),
        )?;

        let required = request.required_specialization();
        let exact = eligible_workers(required, &self.policy)
            .order_by("active_assignments", OrderDirection::Ascending);
        let mut candidates = self.workers.find(&exact)?;

        if candidates.is_empty()
            && self.policy.general_fallback
            && required != Specialization::General
        {
            let fallback = eligible_workers(Specialization::General, &self.policy)
                .order_by("active_assignments", OrderDirection::Ascending);
            candidates = self.workers.find(&fallback)?;
        }

        let Some(worker) = candidates.into_iter().next() else {
            return Err(InvariantViolation::NoEligibleWorker {
                request: request.id.clone(),
                required,
            }
            .into());
        };

        self.finish_assignment(&actor, request, worker, now)
    }

    fn finish_assignment(
        &self,
        actor: &Principal,
        mut request: TenantRequest,
        mut worker: Worker,
        now: DateTime<Utc>,
    ) -> Result<RequestStatusView, MaintenanceServiceError> {
        request.assign_to(worker.id.clone(), actor, now)?;
        if let Err(reason) = worker.assign(request.id.clone(), &self.policy) {
            return Err(InvariantViolation::IneligibleWorker {
                worker: worker.id.clone(),
                request: request.id.clone(),
                reason,
            }
            .into());
        }

        // Worker first, request second; if the request write fails the
        // worker mutation is reverted so the pair never lands half-applied.
        self.workers.update(&worker)?;
        if let Err(err) = self.requests.update(&request) {
            self.remove_worker_assignment(&worker.id, &request.id);
            return Err(err.into());
        }

        info!(request = %request.id, worker = %worker.id,
            specialization = worker.specialization().label(), "worker assigned");

        self.notifications.publish(DomainEvent::WorkerAssigned {
            request_id: request.id.clone(),
            property_id: request.property_id.clone(),
            worker_id: worker.id.clone(),
            specialization: worker.specialization(),
            at: now,
        })?;

        Ok(request.status_view())
    }

    /// Audited trade change; refused while any active assignment still
    /// requires the old trade.
    pub fn change_worker_specialization(
        &self,
        user_id: &str,
        worker_id: &WorkerId,
        new_trade: &str,
        now: DateTime<Utc>,
    ) -> Result<Worker, MaintenanceServiceError> {
        let actor = self.resolve_actor(user_id, None, "change a worker's specialization")?;
        if !actor.is_staff() {
            return Err(AuthorizationError::new(
                &actor,
                format!("change specialization of worker {worker_id}"),
            )
            .into());
        }

        let new = Specialization::parse(new_trade).ok_or_else(|| {
            ValidationError::UnknownSpecialization {
                value: new_trade.to_string(),
            }
        })?;

        let mut worker = self.must_get_worker(worker_id)?;
        for held in worker.assigned_requests() {
            let request = self.must_get_request(held)?;
            if request.required_specialization() != new {
                return Err(InvariantViolation::SpecializationInUse {
                    worker: worker.id.clone(),
                    request: request.id.clone(),
                    required: request.required_specialization(),
                }
                .into());
            }
        }

        worker.change_specialization(new, actor.user_id, now);
        self.workers.update(&worker)?;
        Ok(worker)
    }

    /// Requests open past their urgency window, for staff reporting.
    pub fn list_overdue(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<RequestStatusView>, MaintenanceServiceError> {
        let actor = self.resolve_actor(user_id, None, "list overdue requests")?;
        if !actor.is_staff() {
            return Err(AuthorizationError::new(&actor, "list overdue requests").into());
        }

        let overdue = self.requests.find(&overdue_requests(now))?;
        Ok(overdue
            .iter()
            .map(TenantRequest::status_view)
            .collect())
    }

    fn restore_worker_assignment(&self, worker_id: &WorkerId, request_id: &RequestId) {
        match self.workers.get(worker_id) {
            Ok(Some(mut stored)) => {
                if let Err(reason) = stored.assign(request_id.clone(), &self.policy) {
                    error!(worker = %worker_id, request = %request_id, %reason,
                        "could not restore assignment during compensation");
                    return;
                }
                if let Err(err) = self.workers.update(&stored) {
                    error!(worker = %worker_id, request = %request_id, %err,
                        "failed to write worker during compensation");
                }
            }
            Ok(None) => error!(worker = %worker_id, "worker vanished during compensation"),
            Err(err) => error!(worker = %worker_id, %err,
                "could not re-read worker for compensation"),
        }
    }

    fn remove_worker_assignment(&self, worker_id: &WorkerId, request_id: &RequestId) {
        match self.workers.get(worker_id) {
            Ok(Some(mut stored)) => {
                stored.release(request_id, &self.policy);
                if let Err(err) = self.workers.update(&stored) {
                    error!(worker = %worker_id, request = %request_id, %err,
                        "failed to write worker during compensation");
                }
            }
            Ok(None) => error!(worker = %worker_id, "worker vanished during compensation"),
            Err(err) => error!(worker = %worker_id, %err,
                "could not re-read worker for compensation"),
        }
    }
}
