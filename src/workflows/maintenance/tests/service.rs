use std::sync::Arc;

use chrono::Duration;

use crate::workflows::maintenance::domain::{TenantId, ValidationError, WorkerId};
use crate::workflows::maintenance::property::RequestIntake;
use crate::workflows::maintenance::repository::{
    DomainEvent, PropertyRepository, RepositoryError, RequestRepository, WorkerRepository,
};
use crate::workflows::maintenance::request::{InvariantViolation, RequestStatus};
use crate::workflows::maintenance::service::MaintenanceServiceError;
use crate::workflows::maintenance::specialization::Specialization;
use crate::workflows::maintenance::worker::{AssignmentPolicy, AssignmentRejection};

use super::common::{
    door_intake, fixture, fixture_with, fixture_with_requests, now, property_id, tap_intake,
    FlakyRequests, ELECTRICIAN, HANDYMAN, MANAGER, PLUMBER, TENANT_ANA, TENANT_BEN,
};

#[test]
fn tenant_files_a_request_for_themselves() {
    let fx = fixture();
    let request = fx
        .service
        .submit_request(TENANT_ANA, &property_id(), tap_intake(), now())
        .expect("tenant files for self");

    assert_eq!(request.status(), RequestStatus::Submitted);
    assert_eq!(request.required_specialization(), Specialization::Plumbing);

    let stored = fx
        .properties
        .get(&property_id())
        .expect("read property")
        .expect("property exists");
    assert!(stored.request_ids().contains(&request.id));

    let events = fx.notifications.events();
    assert_eq!(events.len(), 1);
    match &events[0] {
        DomainEvent::RequestCreated {
            request_id,
            tenant_id,
            required_specialization,
            ..
        } => {
            assert_eq!(request_id, &request.id);
            assert_eq!(tenant_id, &TenantId(TENANT_ANA.to_string()));
            assert_eq!(*required_specialization, Specialization::Plumbing);
        }
        other => panic!("expected creation event, got {other:?}"),
    }
}

#[test]
fn tenant_cannot_file_for_a_neighbor() {
    let fx = fixture();
    let intake = RequestIntake {
        tenant_id: TenantId(TENANT_BEN.to_string()),
        ..tap_intake()
    };

    match fx
        .service
        .submit_request(TENANT_ANA, &property_id(), intake, now())
    {
        Err(MaintenanceServiceError::Unauthorized(_)) => {}
        other => panic!("expected authorization failure, got {other:?}"),
    }
    assert!(fx.notifications.events().is_empty());
}

#[test]
fn manager_files_on_a_tenants_behalf() {
    let fx = fixture();
    let request = fx
        .service
        .submit_request(MANAGER, &property_id(), tap_intake(), now())
        .expect("manager files on behalf");
    assert_eq!(request.tenant_id, TenantId(TENANT_ANA.to_string()));
}

#[test]
fn unknown_users_are_turned_away() {
    let fx = fixture();
    match fx
        .service
        .submit_request("ghost", &property_id(), tap_intake(), now())
    {
        Err(MaintenanceServiceError::Unauthorized(denied)) => {
            assert_eq!(denied.role, "unknown")
        }
        other => panic!("expected authorization failure, got {other:?}"),
    }
}

#[test]
fn failed_request_write_retracts_the_property_registration() {
    let requests = Arc::new(FlakyRequests::default());
    let fx = fixture_with_requests(requests.clone(), AssignmentPolicy::default());

    requests.fail_adds(true);
    match fx
        .service
        .submit_request(TENANT_ANA, &property_id(), tap_intake(), now())
    {
        Err(MaintenanceServiceError::Repository(RepositoryError::Unavailable(_))) => {}
        other => panic!("expected store failure, got {other:?}"),
    }

    let stored = fx
        .properties
        .get(&property_id())
        .expect("read property")
        .expect("property exists");
    assert!(stored.request_ids().is_empty());
    assert!(fx.notifications.events().is_empty());
}

#[test]
fn viewing_respects_the_relationship() {
    let fx = fixture();
    let request = fx
        .service
        .submit_request(TENANT_ANA, &property_id(), tap_intake(), now())
        .expect("tenant files for self");

    fx.service
        .view_request(TENANT_ANA, &request.id)
        .expect("owner may view");
    fx.service
        .view_request(MANAGER, &request.id)
        .expect("manager may view");

    match fx.service.view_request(TENANT_BEN, &request.id) {
        Err(MaintenanceServiceError::Unauthorized(_)) => {}
        other => panic!("expected authorization failure, got {other:?}"),
    }
}

#[test]
fn missing_request_reads_as_not_found() {
    let fx = fixture();
    match fx.service.view_request(
        MANAGER,
        &crate::workflows::maintenance::domain::RequestId("req-nope".to_string()),
    ) {
        Err(MaintenanceServiceError::Repository(RepositoryError::NotFound)) => {}
        other => panic!("expected not found, got {other:?}"),
    }
}

#[test]
fn full_lifecycle_from_intake_to_completion() {
    let fx = fixture();
    let request = fx
        .service
        .submit_request(TENANT_ANA, &property_id(), tap_intake(), now())
        .expect("tenant files for self");

    let view = fx
        .service
        .start_review(MANAGER, &request.id, now())
        .expect("manager starts review");
    assert_eq!(view.status, "in_review");

    let view = fx
        .service
        .assign_worker(MANAGER, &request.id, &WorkerId(PLUMBER.to_string()), now())
        .expect("plumber is eligible");
    assert_eq!(view.status, "assigned");
    assert_eq!(view.assigned_worker, Some(WorkerId(PLUMBER.to_string())));

    let plumber = fx
        .workers
        .get(&WorkerId(PLUMBER.to_string()))
        .expect("read worker")
        .expect("worker exists");
    assert_eq!(plumber.active_assignments(), 1);

    let view = fx
        .service
        .start_work(PLUMBER, &request.id, now())
        .expect("assigned worker starts work");
    assert_eq!(view.status, "in_progress");

    let view = fx
        .service
        .complete(PLUMBER, &request.id, now())
        .expect("assigned worker completes");
    assert_eq!(view.status, "completed");
    // Completion keeps the worker reference for audit.
    assert_eq!(view.assigned_worker, Some(WorkerId(PLUMBER.to_string())));

    // But the worker's capacity is free again.
    let plumber = fx
        .workers
        .get(&WorkerId(PLUMBER.to_string()))
        .expect("read worker")
        .expect("worker exists");
    assert_eq!(plumber.active_assignments(), 0);
    assert!(plumber.is_available());

    let kinds: Vec<&str> = fx
        .notifications
        .events()
        .iter()
        .map(|event| match event {
            DomainEvent::RequestCreated { .. } => "created",
            DomainEvent::RequestStatusChanged { .. } => "status",
            DomainEvent::WorkerAssigned { .. } => "assigned",
        })
        .collect();
    assert_eq!(kinds, vec!["created", "status", "assigned", "status", "status"]);
}

#[test]
fn premature_assignment_is_an_illegal_transition() {
    let fx = fixture();
    let request = fx
        .service
        .submit_request(TENANT_ANA, &property_id(), tap_intake(), now())
        .expect("tenant files for self");

    match fx
        .service
        .assign_worker(MANAGER, &request.id, &WorkerId(PLUMBER.to_string()), now())
    {
        Err(MaintenanceServiceError::Invariant(InvariantViolation::IllegalTransition {
            from,
            to,
            ..
        })) => {
            assert_eq!(from, RequestStatus::Submitted);
            assert_eq!(to, RequestStatus::Assigned);
        }
        other => panic!("expected illegal transition, got {other:?}"),
    }
}

#[test]
fn trade_mismatch_rejects_and_mutates_nothing() {
    let fx = fixture();
    let request = fx
        .service
        .submit_request(TENANT_ANA, &property_id(), tap_intake(), now())
        .expect("tenant files for self");
    fx.service
        .start_review(MANAGER, &request.id, now())
        .expect("manager starts review");

    match fx
        .service
        .assign_worker(MANAGER, &request.id, &WorkerId(ELECTRICIAN.to_string()), now())
    {
        Err(MaintenanceServiceError::Invariant(InvariantViolation::IneligibleWorker {
            reason: AssignmentRejection::SpecializationMismatch { required, actual },
            ..
        })) => {
            assert_eq!(required, Specialization::Plumbing);
            assert_eq!(actual, Specialization::Electrical);
        }
        other => panic!("expected mismatch, got {other:?}"),
    }

    let electrician = fx
        .workers
        .get(&WorkerId(ELECTRICIAN.to_string()))
        .expect("read worker")
        .expect("worker exists");
    assert_eq!(electrician.active_assignments(), 0);

    let stored = fx
        .requests
        .get(&request.id)
        .expect("read request")
        .expect("request exists");
    assert_eq!(stored.status(), RequestStatus::InReview);
    assert!(stored.assigned_worker().is_none());
}

#[test]
fn capacity_cap_blocks_further_assignments() {
    let fx = fixture_with(AssignmentPolicy {
        concurrency_cap: 1,
        general_fallback: true,
    });

    let first = fx
        .service
        .submit_request(TENANT_ANA, &property_id(), tap_intake(), now())
        .expect("first intake");
    let second_intake = RequestIntake {
        description: "Slow drain in the bathroom sink".to_string(),
        ..tap_intake()
    };
    let second = fx
        .service
        .submit_request(TENANT_ANA, &property_id(), second_intake, now())
        .expect("second intake");

    fx.service
        .start_review(MANAGER, &first.id, now())
        .expect("review first");
    fx.service
        .start_review(MANAGER, &second.id, now())
        .expect("review second");

    fx.service
        .assign_worker(MANAGER, &first.id, &WorkerId(PLUMBER.to_string()), now())
        .expect("plumber takes the first");

    match fx
        .service
        .assign_worker(MANAGER, &second.id, &WorkerId(PLUMBER.to_string()), now())
    {
        Err(MaintenanceServiceError::Invariant(InvariantViolation::IneligibleWorker {
            reason: AssignmentRejection::AtCapacity { cap },
            ..
        })) => assert_eq!(cap, 1),
        other => panic!("expected capacity rejection, got {other:?}"),
    }

    // With the only plumber full, auto-assignment widens to the General pool.
    let view = fx
        .service
        .assign_best_worker(MANAGER, &second.id, now())
        .expect("fallback covers the second");
    assert_eq!(view.assigned_worker, Some(WorkerId(HANDYMAN.to_string())));
}

#[test]
fn general_worker_cannot_cover_while_an_exact_match_exists() {
    let fx = fixture();
    let request = fx
        .service
        .submit_request(TENANT_ANA, &property_id(), tap_intake(), now())
        .expect("tenant files for self");
    fx.service
        .start_review(MANAGER, &request.id, now())
        .expect("manager starts review");

    match fx
        .service
        .assign_worker(MANAGER, &request.id, &WorkerId(HANDYMAN.to_string()), now())
    {
        Err(MaintenanceServiceError::Invariant(InvariantViolation::IneligibleWorker {
            reason: AssignmentRejection::SpecializationMismatch { .. },
            ..
        })) => {}
        other => panic!("expected mismatch while plumber is free, got {other:?}"),
    }
}

#[test]
fn general_worker_covers_a_trade_with_no_exact_match() {
    let fx = fixture();
    // No carpenter is registered, so the handyman may take carpentry work.
    let request = fx
        .service
        .submit_request(TENANT_BEN, &property_id(), door_intake(), now())
        .expect("tenant files for self");
    assert_eq!(request.required_specialization(), Specialization::Carpentry);

    fx.service
        .start_review(MANAGER, &request.id, now())
        .expect("manager starts review");

    let view = fx
        .service
        .assign_worker(MANAGER, &request.id, &WorkerId(HANDYMAN.to_string()), now())
        .expect("general fallback applies");
    assert_eq!(view.assigned_worker, Some(WorkerId(HANDYMAN.to_string())));
}

#[test]
fn disabled_fallback_leaves_uncovered_trades_unassignable() {
    let fx = fixture_with(AssignmentPolicy {
        concurrency_cap: 3,
        general_fallback: false,
    });
    let request = fx
        .service
        .submit_request(TENANT_BEN, &property_id(), door_intake(), now())
        .expect("tenant files for self");
    fx.service
        .start_review(MANAGER, &request.id, now())
        .expect("manager starts review");

    match fx.service.assign_best_worker(MANAGER, &request.id, now()) {
        Err(MaintenanceServiceError::Invariant(InvariantViolation::NoEligibleWorker {
            required,
            ..
        })) => assert_eq!(required, Specialization::Carpentry),
        other => panic!("expected no eligible worker, got {other:?}"),
    }

    match fx
        .service
        .assign_worker(MANAGER, &request.id, &WorkerId(HANDYMAN.to_string()), now())
    {
        Err(MaintenanceServiceError::Invariant(InvariantViolation::IneligibleWorker {
            reason: AssignmentRejection::SpecializationMismatch { .. },
            ..
        })) => {}
        other => panic!("expected mismatch with fallback off, got {other:?}"),
    }
}

#[test]
fn auto_assignment_picks_the_least_loaded_worker() {
    let fx = fixture();

    let first = fx
        .service
        .submit_request(TENANT_ANA, &property_id(), tap_intake(), now())
        .expect("first intake");
    fx.service
        .start_review(MANAGER, &first.id, now())
        .expect("review first");
    let view = fx
        .service
        .assign_best_worker(MANAGER, &first.id, now())
        .expect("plumber is the only exact match");
    assert_eq!(view.assigned_worker, Some(WorkerId(PLUMBER.to_string())));
}

#[test]
fn tenants_cannot_assign_workers() {
    let fx = fixture();
    let request = fx
        .service
        .submit_request(TENANT_ANA, &property_id(), tap_intake(), now())
        .expect("tenant files for self");
    fx.service
        .start_review(MANAGER, &request.id, now())
        .expect("manager starts review");

    match fx
        .service
        .assign_worker(TENANT_ANA, &request.id, &WorkerId(PLUMBER.to_string()), now())
    {
        Err(MaintenanceServiceError::Unauthorized(_)) => {}
        other => panic!("expected authorization failure, got {other:?}"),
    }
}

#[test]
fn declining_an_assigned_request_releases_the_worker() {
    let fx = fixture();
    let request = fx
        .service
        .submit_request(TENANT_ANA, &property_id(), tap_intake(), now())
        .expect("tenant files for self");
    fx.service
        .start_review(MANAGER, &request.id, now())
        .expect("manager starts review");
    fx.service
        .assign_worker(MANAGER, &request.id, &WorkerId(PLUMBER.to_string()), now())
        .expect("plumber is eligible");

    let view = fx
        .service
        .decline(MANAGER, &request.id, now())
        .expect("manager declines");
    assert_eq!(view.status, "declined");
    assert_eq!(view.assigned_worker, None);

    let plumber = fx
        .workers
        .get(&WorkerId(PLUMBER.to_string()))
        .expect("read worker")
        .expect("worker exists");
    assert_eq!(plumber.active_assignments(), 0);
    assert!(plumber.is_available());
}

#[test]
fn assignment_compensates_the_worker_when_the_request_write_fails() {
    let requests = Arc::new(FlakyRequests::default());
    let fx = fixture_with_requests(requests.clone(), AssignmentPolicy::default());

    let request = fx
        .service
        .submit_request(TENANT_ANA, &property_id(), tap_intake(), now())
        .expect("tenant files for self");
    fx.service
        .start_review(MANAGER, &request.id, now())
        .expect("manager starts review");

    requests.fail_updates(true);
    match fx
        .service
        .assign_worker(MANAGER, &request.id, &WorkerId(PLUMBER.to_string()), now())
    {
        Err(MaintenanceServiceError::Repository(RepositoryError::Unavailable(_))) => {}
        other => panic!("expected store failure, got {other:?}"),
    }

    // Worker mutation was rolled back and the stored request is untouched.
    let plumber = fx
        .workers
        .get(&WorkerId(PLUMBER.to_string()))
        .expect("read worker")
        .expect("worker exists");
    assert_eq!(plumber.active_assignments(), 0);

    let stored = fx
        .requests
        .get(&request.id)
        .expect("read request")
        .expect("request exists");
    assert_eq!(stored.status(), RequestStatus::InReview);
    assert!(stored.assigned_worker().is_none());

    // Once the store recovers the same assignment goes through.
    requests.fail_updates(false);
    fx.service
        .assign_worker(MANAGER, &request.id, &WorkerId(PLUMBER.to_string()), now())
        .expect("assignment lands after recovery");
}

#[test]
fn release_is_compensated_when_the_decline_write_fails() {
    let requests = Arc::new(FlakyRequests::default());
    let fx = fixture_with_requests(requests.clone(), AssignmentPolicy::default());

    let request = fx
        .service
        .submit_request(TENANT_ANA, &property_id(), tap_intake(), now())
        .expect("tenant files for self");
    fx.service
        .start_review(MANAGER, &request.id, now())
        .expect("manager starts review");
    fx.service
        .assign_worker(MANAGER, &request.id, &WorkerId(PLUMBER.to_string()), now())
        .expect("plumber is eligible");

    requests.fail_updates(true);
    match fx.service.decline(MANAGER, &request.id, now()) {
        Err(MaintenanceServiceError::Repository(RepositoryError::Unavailable(_))) => {}
        other => panic!("expected store failure, got {other:?}"),
    }

    // The worker still holds the request because the decline never landed.
    let plumber = fx
        .workers
        .get(&WorkerId(PLUMBER.to_string()))
        .expect("read worker")
        .expect("worker exists");
    assert_eq!(plumber.active_assignments(), 1);
    assert!(plumber.assigned_requests().contains(&request.id));
}

#[test]
fn trade_change_is_audited_and_gated() {
    let fx = fixture();

    let updated = fx
        .service
        .change_worker_specialization(MANAGER, &WorkerId(ELECTRICIAN.to_string()), "hvac", now())
        .expect("manager changes trade");
    assert_eq!(updated.specialization(), Specialization::Hvac);
    assert_eq!(updated.specialization_changes().len(), 1);
    assert_eq!(updated.specialization_changes()[0].changed_by, MANAGER);

    match fx
        .service
        .change_worker_specialization(TENANT_ANA, &WorkerId(PLUMBER.to_string()), "hvac", now())
    {
        Err(MaintenanceServiceError::Unauthorized(_)) => {}
        other => panic!("expected authorization failure, got {other:?}"),
    }

    match fx
        .service
        .change_worker_specialization(MANAGER, &WorkerId(PLUMBER.to_string()), "masonry", now())
    {
        Err(MaintenanceServiceError::Validation(ValidationError::UnknownSpecialization {
            value,
        })) => assert_eq!(value, "masonry"),
        other => panic!("expected validation failure, got {other:?}"),
    }
}

#[test]
fn trade_change_is_refused_while_assignments_need_the_old_trade() {
    let fx = fixture();
    let request = fx
        .service
        .submit_request(TENANT_ANA, &property_id(), tap_intake(), now())
        .expect("tenant files for self");
    fx.service
        .start_review(MANAGER, &request.id, now())
        .expect("manager starts review");
    fx.service
        .assign_worker(MANAGER, &request.id, &WorkerId(PLUMBER.to_string()), now())
        .expect("plumber is eligible");

    match fx
        .service
        .change_worker_specialization(MANAGER, &WorkerId(PLUMBER.to_string()), "electrical", now())
    {
        Err(MaintenanceServiceError::Invariant(InvariantViolation::SpecializationInUse {
            required,
            ..
        })) => assert_eq!(required, Specialization::Plumbing),
        other => panic!("expected in-use rejection, got {other:?}"),
    }
}

#[test]
fn overdue_report_is_staff_only_and_window_aware() {
    let fx = fixture();

    let emergency_intake = RequestIntake {
        urgency: Some("emergency".to_string()),
        ..tap_intake()
    };
    let aged = fx
        .service
        .submit_request(
            TENANT_ANA,
            &property_id(),
            emergency_intake,
            now() - Duration::hours(6),
        )
        .expect("aged intake");
    fx.service
        .submit_request(TENANT_BEN, &property_id(), door_intake(), now())
        .expect("fresh intake");

    let overdue = fx
        .service
        .list_overdue(MANAGER, now())
        .expect("manager pulls the report");
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0].request_id, aged.id);

    match fx.service.list_overdue(TENANT_ANA, now()) {
        Err(MaintenanceServiceError::Unauthorized(_)) => {}
        other => panic!("expected authorization failure, got {other:?}"),
    }
}
