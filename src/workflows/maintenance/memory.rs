//! Reference in-memory adapters for the repository and collaborator
//! contracts. They back the demo wiring and the test suites, and they are
//! the executable definition of how a store adapter must behave: queries
//! are validated against the supported field set before evaluation, and
//! updates enforce the optimistic version token.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

use super::domain::{PropertyId, RequestId, Role, WorkerId};
use super::property::Property;
use super::repository::{
    DirectoryError, DomainEvent, NotificationError, NotificationPublisher, PrincipalDirectory,
    PropertyRepository, RepositoryError, RequestRepository, WorkerRepository,
};
use super::request::{TenantRequest, REQUEST_QUERY_FIELDS};
use super::specification::{OrderBy, OrderDirection, QueryValue, Specification};
use super::worker::{Worker, WORKER_QUERY_FIELDS};

/// Aggregate shape the generic in-memory shelf can store.
pub trait StoredAggregate: Clone {
    type Key: Clone + Eq + Hash;

    /// Fields this aggregate's store adapter supports in query expressions.
    const QUERY_FIELDS: &'static [&'static str];

    fn key(&self) -> Self::Key;
    fn version(&self) -> u64;
    fn set_version(&mut self, version: u64);

    /// Comparable value backing an ordering hint, if the field supports one.
    fn order_value(&self, _field: &str) -> Option<QueryValue> {
        None
    }
}

impl StoredAggregate for Property {
    type Key = PropertyId;
    const QUERY_FIELDS: &'static [&'static str] = &["code", "city", "active"];

    fn key(&self) -> PropertyId {
        self.id.clone()
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

impl StoredAggregate for Worker {
    type Key = WorkerId;
    const QUERY_FIELDS: &'static [&'static str] = WORKER_QUERY_FIELDS;

    fn key(&self) -> WorkerId {
        self.id.clone()
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    fn order_value(&self, field: &str) -> Option<QueryValue> {
        match field {
            "active_assignments" => Some(QueryValue::Integer(self.active_assignments() as i64)),
            "specialization" => Some(QueryValue::Text(self.specialization().label().to_string())),
            "available" => Some(QueryValue::Boolean(self.is_available())),
            _ => None,
        }
    }
}

impl StoredAggregate for TenantRequest {
    type Key = RequestId;
    const QUERY_FIELDS: &'static [&'static str] = REQUEST_QUERY_FIELDS;

    fn key(&self) -> RequestId {
        self.id.clone()
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    fn order_value(&self, field: &str) -> Option<QueryValue> {
        match field {
            "submitted_at" => Some(QueryValue::Text(self.submitted_at().to_rfc3339())),
            "status" => Some(QueryValue::Text(self.status().label().to_string())),
            "urgency" => Some(QueryValue::Text(self.urgency.label().to_string())),
            _ => None,
        }
    }
}

/// Shared in-memory shelf behind every reference repository.
pub struct MemoryShelf<T: StoredAggregate> {
    records: Arc<Mutex<HashMap<T::Key, T>>>,
}

impl<T: StoredAggregate> Default for MemoryShelf<T> {
    fn default() -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T: StoredAggregate> Clone for MemoryShelf<T> {
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
        }
    }
}

impl<T: StoredAggregate + 'static> MemoryShelf<T> {
    fn lock(&self) -> Result<MutexGuard<'_, HashMap<T::Key, T>>, RepositoryError> {
        self.records
            .lock()
            .map_err(|_| RepositoryError::Unavailable("memory store mutex poisoned".to_string()))
    }

    fn get(&self, key: &T::Key) -> Result<Option<T>, RepositoryError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn add(&self, aggregate: T) -> Result<T, RepositoryError> {
        let mut records = self.lock()?;
        if records.contains_key(&aggregate.key()) {
            return Err(RepositoryError::Conflict);
        }
        records.insert(aggregate.key(), aggregate.clone());
        Ok(aggregate)
    }

    fn update(&self, aggregate: &T) -> Result<(), RepositoryError> {
        let mut records = self.lock()?;
        let stored = records
            .get(&aggregate.key())
            .ok_or(RepositoryError::NotFound)?;
        if stored.version() != aggregate.version() {
            return Err(RepositoryError::StaleVersion {
                expected: stored.version(),
                found: aggregate.version(),
            });
        }
        let mut next = aggregate.clone();
        next.set_version(aggregate.version() + 1);
        records.insert(next.key(), next);
        Ok(())
    }

    fn find(&self, spec: &Specification<T>) -> Result<Vec<T>, RepositoryError> {
        spec.expr().ensure_supported(T::QUERY_FIELDS)?;
        let records = self.lock()?;
        let mut matches: Vec<T> = records
            .values()
            .filter(|candidate| spec.is_satisfied_by(candidate))
            .cloned()
            .collect();
        drop(records);

        if !spec.ordering().is_empty() {
            sort_by_hints(&mut matches, spec.ordering());
        }
        Ok(matches)
    }

    fn count(&self, spec: &Specification<T>) -> Result<usize, RepositoryError> {
        spec.expr().ensure_supported(T::QUERY_FIELDS)?;
        let records = self.lock()?;
        Ok(records
            .values()
            .filter(|candidate| spec.is_satisfied_by(candidate))
            .count())
    }
}

/// Stable multi-key sort: later hints break ties left by earlier ones.
fn sort_by_hints<T: StoredAggregate>(items: &mut [T], orders: &[OrderBy]) {
    items.sort_by(|a, b| {
        for order in orders {
            let ordering = match (a.order_value(order.field), b.order_value(order.field)) {
                (Some(left), Some(right)) => compare_values(&left, &right),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            let ordering = match order.direction {
                OrderDirection::Ascending => ordering,
                OrderDirection::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn compare_values(left: &QueryValue, right: &QueryValue) -> Ordering {
    match (left, right) {
        (QueryValue::Text(a), QueryValue::Text(b)) => a.cmp(b),
        (QueryValue::Integer(a), QueryValue::Integer(b)) => a.cmp(b),
        (QueryValue::Boolean(a), QueryValue::Boolean(b)) => a.cmp(b),
        _ => Ordering::Equal,
    }
}

#[derive(Default, Clone)]
pub struct MemoryProperties {
    shelf: MemoryShelf<Property>,
}

impl PropertyRepository for MemoryProperties {
    fn get(&self, id: &PropertyId) -> Result<Option<Property>, RepositoryError> {
        self.shelf.get(id)
    }

    fn add(&self, property: Property) -> Result<Property, RepositoryError> {
        self.shelf.add(property)
    }

    fn update(&self, property: &Property) -> Result<(), RepositoryError> {
        self.shelf.update(property)
    }

    fn find(&self, spec: &Specification<Property>) -> Result<Vec<Property>, RepositoryError> {
        self.shelf.find(spec)
    }

    fn count(&self, spec: &Specification<Property>) -> Result<usize, RepositoryError> {
        self.shelf.count(spec)
    }
}

#[derive(Default, Clone)]
pub struct MemoryWorkers {
    shelf: MemoryShelf<Worker>,
}

impl WorkerRepository for MemoryWorkers {
    fn get(&self, id: &WorkerId) -> Result<Option<Worker>, RepositoryError> {
        self.shelf.get(id)
    }

    fn add(&self, worker: Worker) -> Result<Worker, RepositoryError> {
        self.shelf.add(worker)
    }

    fn update(&self, worker: &Worker) -> Result<(), RepositoryError> {
        self.shelf.update(worker)
    }

    fn find(&self, spec: &Specification<Worker>) -> Result<Vec<Worker>, RepositoryError> {
        self.shelf.find(spec)
    }

    fn count(&self, spec: &Specification<Worker>) -> Result<usize, RepositoryError> {
        self.shelf.count(spec)
    }
}

#[derive(Default, Clone)]
pub struct MemoryRequests {
    shelf: MemoryShelf<TenantRequest>,
}

impl RequestRepository for MemoryRequests {
    fn get(&self, id: &RequestId) -> Result<Option<TenantRequest>, RepositoryError> {
        self.shelf.get(id)
    }

    fn add(&self, request: TenantRequest) -> Result<TenantRequest, RepositoryError> {
        self.shelf.add(request)
    }

    fn update(&self, request: &TenantRequest) -> Result<(), RepositoryError> {
        self.shelf.update(request)
    }

    fn find(
        &self,
        spec: &Specification<TenantRequest>,
    ) -> Result<Vec<TenantRequest>, RepositoryError> {
        self.shelf.find(spec)
    }

    fn count(&self, spec: &Specification<TenantRequest>) -> Result<usize, RepositoryError> {
        self.shelf.count(spec)
    }
}

/// In-memory notification sink; tests assert against the captured events.
#[derive(Default, Clone)]
pub struct MemoryNotifications {
    events: Arc<Mutex<Vec<DomainEvent>>>,
}

impl MemoryNotifications {
    pub fn events(&self) -> Vec<DomainEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl NotificationPublisher for MemoryNotifications {
    fn publish(&self, event: DomainEvent) -> Result<(), NotificationError> {
        self.events
            .lock()
            .map_err(|_| NotificationError::Transport("event mutex poisoned".to_string()))?
            .push(event);
        Ok(())
    }
}

/// Static role table standing in for the external identity system.
#[derive(Default, Clone)]
pub struct StaticDirectory {
    property_roles: Arc<Mutex<HashMap<(String, PropertyId), Role>>>,
    global_roles: Arc<Mutex<HashMap<String, Role>>>,
}

impl StaticDirectory {
    pub fn grant_property_role(&self, user_id: impl Into<String>, property: PropertyId, role: Role) {
        if let Ok(mut roles) = self.property_roles.lock() {
            roles.insert((user_id.into(), property), role);
        }
    }

    pub fn grant_global_role(&self, user_id: impl Into<String>, role: Role) {
        if let Ok(mut roles) = self.global_roles.lock() {
            roles.insert(user_id.into(), role);
        }
    }
}

impl PrincipalDirectory for StaticDirectory {
    fn lookup(
        &self,
        user_id: &str,
        property: Option<&PropertyId>,
    ) -> Result<Option<Role>, DirectoryError> {
        if let Some(property) = property {
            let roles = self
                .property_roles
                .lock()
                .map_err(|_| DirectoryError::Unavailable("role mutex poisoned".to_string()))?;
            if let Some(role) = roles.get(&(user_id.to_string(), property.clone())) {
                return Ok(Some(*role));
            }
        }

        let globals = self
            .global_roles
            .lock()
            .map_err(|_| DirectoryError::Unavailable("role mutex poisoned".to_string()))?;
        Ok(globals.get(user_id).copied())
    }
}
