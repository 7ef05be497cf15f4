use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{PropertyId, RequestId, Role, TenantId, Urgency, WorkerId};
use super::property::Property;
use super::request::{RequestStatus, TenantRequest};
use super::specialization::Specialization;
use super::specification::{Specification, SpecificationError};
use super::worker::Worker;

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("stale version: expected {expected}, found {found}")]
    StaleVersion { expected: u64, found: u64 },
    #[error(transparent)]
    Query(#[from] SpecificationError),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Storage contract for property aggregates. The core never sees a concrete
/// store; `update` enforces the optimistic version carried by the aggregate.
pub trait PropertyRepository: Send + Sync {
    fn get(&self, id: &PropertyId) -> Result<Option<Property>, RepositoryError>;
    fn add(&self, property: Property) -> Result<Property, RepositoryError>;
    fn update(&self, property: &Property) -> Result<(), RepositoryError>;
    fn find(&self, spec: &Specification<Property>) -> Result<Vec<Property>, RepositoryError>;
    fn count(&self, spec: &Specification<Property>) -> Result<usize, RepositoryError>;
}

/// Storage contract for worker aggregates.
pub trait WorkerRepository: Send + Sync {
    fn get(&self, id: &WorkerId) -> Result<Option<Worker>, RepositoryError>;
    fn add(&self, worker: Worker) -> Result<Worker, RepositoryError>;
    fn update(&self, worker: &Worker) -> Result<(), RepositoryError>;
    fn find(&self, spec: &Specification<Worker>) -> Result<Vec<Worker>, RepositoryError>;
    fn count(&self, spec: &Specification<Worker>) -> Result<usize, RepositoryError>;
}

/// Storage contract for maintenance requests.
pub trait RequestRepository: Send + Sync {
    fn get(&self, id: &RequestId) -> Result<Option<TenantRequest>, RepositoryError>;
    fn add(&self, request: TenantRequest) -> Result<TenantRequest, RepositoryError>;
    fn update(&self, request: &TenantRequest) -> Result<(), RepositoryError>;
    fn find(
        &self,
        spec: &Specification<TenantRequest>,
    ) -> Result<Vec<TenantRequest>, RepositoryError>;
    fn count(&self, spec: &Specification<TenantRequest>) -> Result<usize, RepositoryError>;
}

/// Domain events emitted by the service after its persistence writes land.
/// Delivery (email/SMS/push) is entirely external; the core's obligation
/// ends at producing the event with complete data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    RequestCreated {
        request_id: RequestId,
        property_id: PropertyId,
        tenant_id: TenantId,
        required_specialization: Specialization,
        urgency: Urgency,
        at: DateTime<Utc>,
    },
    RequestStatusChanged {
        request_id: RequestId,
        property_id: PropertyId,
        from: RequestStatus,
        to: RequestStatus,
        actor: String,
        at: DateTime<Utc>,
    },
    WorkerAssigned {
        request_id: RequestId,
        property_id: PropertyId,
        worker_id: WorkerId,
        specialization: Specialization,
        at: DateTime<Utc>,
    },
}

/// Trait describing outbound notification hooks (e-mail, SMS adapters).
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, event: DomainEvent) -> Result<(), NotificationError>;
}

/// Notification dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Externally supplied principal-role lookup. Given a user identifier and
/// optionally the property in scope, yields the user's relationship; the
/// core implements no identity management of its own.
pub trait PrincipalDirectory: Send + Sync {
    fn lookup(
        &self,
        user_id: &str,
        property: Option<&PropertyId>,
    ) -> Result<Option<Role>, DirectoryError>;
}

/// Principal directory lookup failure.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("principal directory unavailable: {0}")]
    Unavailable(String),
}
