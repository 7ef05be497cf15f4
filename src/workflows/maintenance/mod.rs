//! Maintenance request intake, lifecycle, and worker dispatch.
//!
//! A request is filed by a tenant under its property, classified into a
//! required trade, matched to an eligible worker through composable query
//! specifications, and walked along a gated status graph until it closes.

pub mod domain;
pub mod memory;
pub mod property;
pub mod repository;
pub mod request;
pub mod router;
pub mod service;
pub mod specialization;
pub mod specification;
pub mod worker;

#[cfg(test)]
mod tests;

pub use domain::{
    AuthorizationError, Principal, PropertyId, RequestId, Role, TenantId, Urgency,
    ValidationError, WorkerId,
};
pub use memory::{MemoryNotifications, MemoryProperties, MemoryRequests, MemoryWorkers, StaticDirectory};
pub use property::{FileRequestError, Property, RequestIntake, Tenant};
pub use repository::{
    DirectoryError, DomainEvent, NotificationError, NotificationPublisher, PrincipalDirectory,
    PropertyRepository, RepositoryError, RequestRepository, WorkerRepository,
};
pub use request::{
    InvariantViolation, RequestError, RequestStatus, RequestStatusView, TenantRequest,
    TransitionRecord,
};
pub use router::maintenance_router;
pub use service::{MaintenanceService, MaintenanceServiceError};
pub use specialization::{determine_specialization, Specialization};
pub use specification::{
    CompareOp, OrderBy, OrderDirection, QueryExpr, QueryValue, Specification, SpecificationError,
};
pub use worker::{AssignmentPolicy, AssignmentRejection, SpecializationChange, Worker};
