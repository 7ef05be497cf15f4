use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::maintenance::domain::{PropertyId, RequestId, Role, TenantId, WorkerId};
use crate::workflows::maintenance::memory::{
    MemoryNotifications, MemoryProperties, MemoryRequests, MemoryWorkers, StaticDirectory,
};
use crate::workflows::maintenance::property::{Property, RequestIntake};
use crate::workflows::maintenance::repository::{
    PropertyRepository, RepositoryError, RequestRepository, WorkerRepository,
};
use crate::workflows::maintenance::request::TenantRequest;
use crate::workflows::maintenance::router::maintenance_router;
use crate::workflows::maintenance::service::MaintenanceService;
use crate::workflows::maintenance::specialization::Specialization;
use crate::workflows::maintenance::specification::Specification;
use crate::workflows::maintenance::worker::{AssignmentPolicy, Worker};

pub(super) const MANAGER: &str = "mgr-dana";
pub(super) const TENANT_ANA: &str = "t-ana";
pub(super) const TENANT_BEN: &str = "t-ben";
pub(super) const PLUMBER: &str = "w-plumb";
pub(super) const ELECTRICIAN: &str = "w-volt";
pub(super) const HANDYMAN: &str = "w-handy";

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn property_id() -> PropertyId {
    PropertyId("prop-100".to_string())
}

pub(super) fn sample_property() -> Property {
    let mut property = sample_property_without_tenants();
    property.register_tenant(TenantId(TENANT_ANA.to_string()), "ana@example.com");
    property.register_tenant(TenantId(TENANT_BEN.to_string()), "ben@example.com");
    property
}

pub(super) fn sample_property_without_tenants() -> Property {
    Property::new(property_id(), "MAPLE", "14 Maple Court", "Des Moines")
}

pub(super) fn tap_intake() -> RequestIntake {
    RequestIntake {
        tenant_id: TenantId(TENANT_ANA.to_string()),
        description: "The kitchen tap is leaking under the sink".to_string(),
        category_hint: None,
        urgency: Some("urgent".to_string()),
    }
}

pub(super) fn door_intake() -> RequestIntake {
    RequestIntake {
        tenant_id: TenantId(TENANT_BEN.to_string()),
        description: "Bedroom door is hanging off its hinges".to_string(),
        category_hint: None,
        urgency: None,
    }
}

pub(super) type TestService<Q> = MaintenanceService<
    MemoryProperties,
    MemoryWorkers,
    Q,
    StaticDirectory,
    MemoryNotifications,
>;

pub(super) struct Fixture<Q: RequestRepository + 'static> {
    pub(super) service: TestService<Q>,
    pub(super) properties: Arc<MemoryProperties>,
    pub(super) workers: Arc<MemoryWorkers>,
    pub(super) requests: Arc<Q>,
    pub(super) notifications: Arc<MemoryNotifications>,
}

pub(super) fn fixture() -> Fixture<MemoryRequests> {
    fixture_with(AssignmentPolicy::default())
}

pub(super) fn fixture_with(policy: AssignmentPolicy) -> Fixture<MemoryRequests> {
    fixture_with_requests(Arc::new(MemoryRequests::default()), policy)
}

pub(super) fn fixture_with_requests<Q: RequestRepository + 'static>(
    requests: Arc<Q>,
    policy: AssignmentPolicy,
) -> Fixture<Q> {
    let properties = Arc::new(MemoryProperties::default());
    let workers = Arc::new(MemoryWorkers::default());
    let directory = Arc::new(StaticDirectory::default());
    let notifications = Arc::new(MemoryNotifications::default());

    properties
        .add(sample_property())
        .expect("property seeds cleanly");

    workers
        .add(Worker::register(
            WorkerId(PLUMBER.to_string()),
            "plumber@example.com",
            Specialization::Plumbing,
        ))
        .expect("plumber seeds cleanly");
    workers
        .add(Worker::register(
            WorkerId(ELECTRICIAN.to_string()),
            "electrician@example.com",
            Specialization::Electrical,
        ))
        .expect("electrician seeds cleanly");
    workers
        .add(Worker::register(
            WorkerId(HANDYMAN.to_string()),
            "handy@example.com",
            Specialization::General,
        ))
        .expect("handyman seeds cleanly");

    directory.grant_property_role(TENANT_ANA, property_id(), Role::Tenant);
    directory.grant_property_role(TENANT_BEN, property_id(), Role::Tenant);
    directory.grant_property_role(MANAGER, property_id(), Role::Manager);
    directory.grant_global_role(MANAGER, Role::Manager);
    directory.grant_global_role(PLUMBER, Role::Worker);
    directory.grant_global_role(ELECTRICIAN, Role::Worker);
    directory.grant_global_role(HANDYMAN, Role::Worker);
    directory.grant_global_role("system", Role::System);

    let service = MaintenanceService::new(
        properties.clone(),
        workers.clone(),
        requests.clone(),
        directory,
        notifications.clone(),
        policy,
    );

    Fixture {
        service,
        properties,
        workers,
        requests,
        notifications,
    }
}

/// Request repository whose writes can be made to fail on demand, for
/// exercising the compensation path of aggregate-spanning writes.
pub(super) struct FlakyRequests {
    inner: MemoryRequests,
    fail_adds: AtomicBool,
    fail_updates: AtomicBool,
}

impl Default for FlakyRequests {
    fn default() -> Self {
        Self {
            inner: MemoryRequests::default(),
            fail_adds: AtomicBool::new(false),
            fail_updates: AtomicBool::new(false),
        }
    }
}

impl FlakyRequests {
    pub(super) fn fail_adds(&self, fail: bool) {
        self.fail_adds.store(fail, Ordering::SeqCst);
    }

    pub(super) fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }
}

impl RequestRepository for FlakyRequests {
    fn get(&self, id: &RequestId) -> Result<Option<TenantRequest>, RepositoryError> {
        self.inner.get(id)
    }

    fn add(&self, request: TenantRequest) -> Result<TenantRequest, RepositoryError> {
        if self.fail_adds.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("request store offline".to_string()));
        }
        self.inner.add(request)
    }

    fn update(&self, request: &TenantRequest) -> Result<(), RepositoryError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("request store offline".to_string()));
        }
        self.inner.update(request)
    }

    fn find(
        &self,
        spec: &Specification<TenantRequest>,
    ) -> Result<Vec<TenantRequest>, RepositoryError> {
        self.inner.find(spec)
    }

    fn count(&self, spec: &Specification<TenantRequest>) -> Result<usize, RepositoryError> {
        self.inner.count(spec)
    }
}

pub(super) fn test_router(fixture: Fixture<MemoryRequests>) -> axum::Router {
    maintenance_router(Arc::new(fixture.service))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn assert_status(response: &Response, expected: StatusCode) {
    assert_eq!(response.status(), expected);
}
