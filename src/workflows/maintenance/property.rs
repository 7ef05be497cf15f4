use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{PropertyId, RequestId, TenantId, Urgency, ValidationError};
use super::request::{InvariantViolation, TenantRequest};
use super::specialization::{determine_specialization, Specialization};

/// A tenant living at a property. Tenants may only file requests against
/// their own property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub email: String,
    pub property_id: PropertyId,
}

/// Raw intake payload for a new maintenance request, as it arrives from the
/// outside world. Hint and urgency come in as open strings and are parsed
/// here, never trusted downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestIntake {
    pub tenant_id: TenantId,
    pub description: String,
    #[serde(default)]
    pub category_hint: Option<String>,
    #[serde(default)]
    pub urgency: Option<String>,
}

/// Rejections raised while filing a request under a property.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FileRequestError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}

/// A property under management: the consistency boundary for request
/// creation. Requests are never born outside `file_request`, so no request
/// can exist without exactly one owning property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: PropertyId,
    pub code: String,
    pub address: String,
    pub city: String,
    active: bool,
    tenants: Vec<Tenant>,
    request_ids: Vec<RequestId>,
    pub version: u64,
}

impl Property {
    pub fn new(
        id: PropertyId,
        code: impl Into<String>,
        address: impl Into<String>,
        city: impl Into<String>,
    ) -> Self {
        Self {
            id,
            code: code.into(),
            address: address.into(),
            city: city.into(),
            active: true,
            tenants: Vec::new(),
            request_ids: Vec::new(),
            version: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    pub fn tenants(&self) -> &[Tenant] {
        &self.tenants
    }

    pub fn request_ids(&self) -> &[RequestId] {
        &self.request_ids
    }

    pub fn register_tenant(&mut self, id: TenantId, email: impl Into<String>) {
        self.tenants.push(Tenant {
            id,
            email: email.into(),
            property_id: self.id.clone(),
        });
    }

    pub fn has_tenant(&self, tenant: &TenantId) -> bool {
        self.tenants.iter().any(|known| &known.id == tenant)
    }

    /// File a new request under this property.
    ///
    /// Validates the property is active and the tenant belongs here, parses
    /// the open-string intake fields, derives the required specialization
    /// once, and registers the new request id. The returned request must be
    /// persisted together with this property in the same unit of work.
    pub fn file_request(
        &mut self,
        request_id: RequestId,
        intake: RequestIntake,
        now: DateTime<Utc>,
    ) -> Result<TenantRequest, FileRequestError> {
        if !self.active {
            return Err(InvariantViolation::InactiveProperty {
                property: self.id.clone(),
            }
            .into());
        }
        if !self.has_tenant(&intake.tenant_id) {
            return Err(InvariantViolation::ForeignTenant {
                tenant: intake.tenant_id,
                property: self.id.clone(),
            }
            .into());
        }

        let description = intake.description.trim().to_string();
        if description.is_empty() {
            return Err(ValidationError::EmptyDescription.into());
        }

        let hint = match intake.category_hint.as_deref() {
            Some(raw) => Some(Specialization::parse(raw).ok_or_else(|| {
                ValidationError::UnknownSpecialization {
                    value: raw.to_string(),
                }
            })?),
            None => None,
        };

        let urgency = match intake.urgency.as_deref() {
            Some(raw) => {
                Urgency::parse(raw).ok_or_else(|| ValidationError::UnknownUrgency {
                    value: raw.to_string(),
                })?
            }
            None => Urgency::Routine,
        };

        let required = determine_specialization(&description, hint);
        let request = TenantRequest::submitted(
            request_id.clone(),
            self.id.clone(),
            intake.tenant_id,
            description,
            required,
            urgency,
            now,
        );

        self.request_ids.push(request_id);
        Ok(request)
    }

    /// Crate-internal rollback used when the paired request write fails
    /// after the property registry already recorded the new id.
    pub(crate) fn retract_request(&mut self, request_id: &RequestId) {
        self.request_ids.retain(|held| held != request_id);
    }
}
