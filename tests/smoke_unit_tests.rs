//! Smoke-screen unit tests spanning the directory, catalog, authorization,
//! and notification paths in isolation from the full lifecycle scenarios.
//!
//! Sled uses file-based locking to prevent concurrent access, so each test
//! opens its own database under a tempdir for simplified cleanup.

use std::sync::Arc;

use tempfile::TempDir;

use stationery_approval::error::{RequestError, ValidationError};
use stationery_approval::money::Money;
use stationery_approval::request::{RequestDraft, RequestStatus};
use stationery_approval::service::RequestService;
use stationery_approval::utils::new_uuid_to_bech32;

fn open_service(name: &str) -> anyhow::Result<(TempDir, RequestService)> {
    let temp_dir = tempfile::tempdir()?;
    let db = Arc::new(sled::open(temp_dir.path().join(name))?);
    let service = RequestService::open(db)?;
    Ok((temp_dir, service))
}

mod id_tests {
    use super::*;

    #[test]
    fn generates_valid_bech32_with_hrp() {
        let encoded = new_uuid_to_bech32("req_").unwrap();
        assert!(encoded.starts_with("req_1"));
        assert!(encoded.len() > 10);
    }

    #[test]
    fn handles_empty_hrp() {
        assert!(new_uuid_to_bech32("").is_err());
    }

    #[test]
    fn generates_unique_ids() {
        let id1 = new_uuid_to_bech32("item_").unwrap();
        let id2 = new_uuid_to_bech32("item_").unwrap();
        assert_ne!(id1, id2);
    }
}

mod directory_tests {
    use super::*;

    #[test]
    fn employee_requires_existing_role() -> anyhow::Result<()> {
        let (_tmp, service) = open_service("unknown_role.db")?;
        let err = service
            .create_employee("Morgan", "morgan@office.test", "role_missing")
            .unwrap_err();
        assert!(matches!(
            err,
            RequestError::Validation(ValidationError::UnknownRole { .. })
        ));
        Ok(())
    }

    #[test]
    fn superior_must_be_a_distinct_employee() -> anyhow::Result<()> {
        let (_tmp, service) = open_service("self_superior.db")?;
        let role = service.create_role("Employee", false)?;
        let emp = service.create_employee("Casey", "casey@office.test", &role.role_id)?;

        let err = service
            .assign_superior(&emp.employee_id, &emp.employee_id)
            .unwrap_err();
        assert!(matches!(
            err,
            RequestError::Validation(ValidationError::SelfSuperior { .. })
        ));
        Ok(())
    }

    #[test]
    fn reporting_cycles_are_rejected() -> anyhow::Result<()> {
        let (_tmp, service) = open_service("cycle.db")?;
        let role = service.create_role("Employee", false)?;
        let a = service.create_employee("A", "a@office.test", &role.role_id)?;
        let b = service.create_employee("B", "b@office.test", &role.role_id)?;
        let c = service.create_employee("C", "c@office.test", &role.role_id)?;

        service.assign_superior(&b.employee_id, &a.employee_id)?;
        service.assign_superior(&c.employee_id, &b.employee_id)?;

        // a -> c would close a <- b <- c
        let err = service
            .assign_superior(&a.employee_id, &c.employee_id)
            .unwrap_err();
        assert!(matches!(
            err,
            RequestError::Validation(ValidationError::HierarchyCycle { .. })
        ));
        Ok(())
    }

    #[test]
    fn role_hierarchy_cycles_are_rejected() -> anyhow::Result<()> {
        let (_tmp, service) = open_service("role_cycle.db")?;
        let staff = service.create_role("Staff", false)?;
        let lead = service.create_role("Lead", true)?;

        service.set_role_reports_to(&staff.role_id, &lead.role_id)?;
        let err = service
            .set_role_reports_to(&lead.role_id, &staff.role_id)
            .unwrap_err();
        assert!(matches!(
            err,
            RequestError::Validation(ValidationError::HierarchyCycle { .. })
        ));
        Ok(())
    }

    #[test]
    fn approval_route_is_capability_based() -> anyhow::Result<()> {
        let (_tmp, service) = open_service("route.db")?;
        let manager_role = service.create_role("Manager", true)?;
        let employee_role = service.create_role("Employee", false)?;

        let manager = service.create_employee("Morgan", "m@office.test", &manager_role.role_id)?;
        let retired = service.create_employee("Quinn", "q@office.test", &manager_role.role_id)?;
        service.create_employee("Casey", "c@office.test", &employee_role.role_id)?;
        service.deactivate_employee(&retired.employee_id)?;

        let route = service.resolve_approval_route()?;
        assert_eq!(route.len(), 1);
        assert_eq!(route[0].employee_id, manager.employee_id);
        Ok(())
    }

    #[test]
    fn delete_employee_is_guarded_by_history() -> anyhow::Result<()> {
        let (_tmp, service) = open_service("delete_employee.db")?;
        let manager_role = service.create_role("Manager", true)?;
        let employee_role = service.create_role("Employee", false)?;
        let manager = service.create_employee("Morgan", "m@office.test", &manager_role.role_id)?;
        let clerk = service.create_employee("Casey", "c@office.test", &employee_role.role_id)?;
        let pens = service.create_item("Pens", Money::new(1_00, 2), 10, None)?;

        service.create_request(
            RequestDraft::new(&clerk.employee_id, &manager.employee_id).add_line(&pens.item_id, 1),
        )?;

        let err = service.delete_employee(&clerk.employee_id).unwrap_err();
        assert!(matches!(
            err,
            RequestError::Validation(ValidationError::EmployeeHasRecords { .. })
        ));
        Ok(())
    }

    #[test]
    fn delete_employee_clears_subordinate_pointers() -> anyhow::Result<()> {
        let (_tmp, service) = open_service("delete_superior.db")?;
        let role = service.create_role("Employee", false)?;
        let boss = service.create_employee("Boss", "boss@office.test", &role.role_id)?;
        let sub = service.create_employee("Sub", "sub@office.test", &role.role_id)?;
        service.assign_superior(&sub.employee_id, &boss.employee_id)?;

        service.delete_employee(&boss.employee_id)?;

        let sub = service.get_employee(&sub.employee_id)?;
        assert_eq!(sub.superior_id, None);
        assert!(matches!(
            service.get_employee(&boss.employee_id),
            Err(RequestError::NotFound { .. })
        ));
        Ok(())
    }

    #[test]
    fn password_change_notifies_the_employee() -> anyhow::Result<()> {
        let (_tmp, service) = open_service("password.db")?;
        let role = service.create_role("Employee", false)?;
        let emp = service.create_employee("Casey", "c@office.test", &role.role_id)?;

        service.change_password_hash(&emp.employee_id, "opaque-hash-value")?;

        assert_eq!(
            service.get_employee(&emp.employee_id)?.password_hash.as_deref(),
            Some("opaque-hash-value")
        );
        let notes = service.notifications_for(&emp.employee_id)?;
        assert_eq!(notes.len(), 1);
        assert!(notes[0].message.contains("password"));
        Ok(())
    }
}

mod catalog_tests {
    use super::*;

    #[test]
    fn listing_filters_by_category() -> anyhow::Result<()> {
        let (_tmp, service) = open_service("category_filter.db")?;
        let writing = service.create_category("Writing", None)?;
        let furniture = service.create_category("Furniture", Some("Desks and chairs"))?;

        service.create_item("Pens", Money::new(1_00, 2), 10, Some(&writing.category_id))?;
        service.create_item("Desk", Money::new(80_00, 2), 2, Some(&furniture.category_id))?;
        service.create_item("Mystery box", Money::new(5_00, 2), 1, None)?;

        let all = service.list_available_items(None)?;
        assert_eq!(all.len(), 3);

        let writing_only = service.list_available_items(Some(&writing.category_id))?;
        assert_eq!(writing_only.len(), 1);
        assert_eq!(writing_only[0].item.item_name, "Pens");
        assert_eq!(writing_only[0].available_stock, 10);
        Ok(())
    }

    #[test]
    fn unknown_category_is_rejected() -> anyhow::Result<()> {
        let (_tmp, service) = open_service("unknown_category.db")?;
        let err = service
            .create_item("Pens", Money::new(1_00, 2), 10, Some("cat_missing"))
            .unwrap_err();
        assert!(matches!(
            err,
            RequestError::Validation(ValidationError::UnknownCategory { .. })
        ));
        Ok(())
    }

    #[test]
    fn physical_stock_never_goes_negative() -> anyhow::Result<()> {
        let (_tmp, service) = open_service("adjust.db")?;
        let pens = service.create_item("Pens", Money::new(1_00, 2), 5, None)?;

        service.adjust_stock(&pens.item_id, -3)?;
        assert_eq!(service.get_item(&pens.item_id)?.current_stock, 2);

        let err = service.adjust_stock(&pens.item_id, -3).unwrap_err();
        assert!(matches!(err, RequestError::InsufficientStock { .. }));
        assert_eq!(service.get_item(&pens.item_id)?.current_stock, 2);
        Ok(())
    }

    #[test]
    fn availability_is_clamped_after_downward_correction() -> anyhow::Result<()> {
        let (_tmp, service) = open_service("clamp.db")?;
        let manager_role = service.create_role("Manager", true)?;
        let employee_role = service.create_role("Employee", false)?;
        let manager = service.create_employee("M", "m@office.test", &manager_role.role_id)?;
        let clerk = service.create_employee("C", "c@office.test", &employee_role.role_id)?;
        let pens = service.create_item("Pens", Money::new(1_00, 2), 10, None)?;

        service.create_request(
            RequestDraft::new(&clerk.employee_id, &manager.employee_id).add_line(&pens.item_id, 8),
        )?;
        // raw availability is now 10 - 8 - 5 = -3; callers see zero
        service.adjust_stock(&pens.item_id, -5)?;
        assert_eq!(service.available_stock(&pens.item_id)?, 0);
        Ok(())
    }
}

mod authorization_tests {
    use super::*;

    fn seeded(name: &str) -> anyhow::Result<(TempDir, RequestService, String, String, String)> {
        let (tmp, service) = open_service(name)?;
        let manager_role = service.create_role("Manager", true)?;
        let employee_role = service.create_role("Employee", false)?;
        let manager = service.create_employee("M", "m@office.test", &manager_role.role_id)?;
        let clerk = service.create_employee("C", "c@office.test", &employee_role.role_id)?;
        let other = service.create_employee("O", "o@office.test", &employee_role.role_id)?;
        Ok((
            tmp,
            service,
            manager.employee_id,
            clerk.employee_id,
            other.employee_id,
        ))
    }

    #[test]
    fn non_approver_cannot_approve_or_reject() -> anyhow::Result<()> {
        let (_tmp, service, manager, clerk, other) = seeded("non_approver.db")?;
        let pens = service.create_item("Pens", Money::new(1_00, 2), 10, None)?;
        let request =
            service.create_request(RequestDraft::new(&clerk, &manager).add_line(&pens.item_id, 1))?;

        assert!(matches!(
            service.approve(&request.request_id, &other).unwrap_err(),
            RequestError::Forbidden { .. }
        ));
        assert!(matches!(
            service.reject(&request.request_id, &other).unwrap_err(),
            RequestError::Forbidden { .. }
        ));
        // the request is untouched
        assert_eq!(
            service.get_request(&request.request_id, &manager)?.status,
            RequestStatus::Pending
        );
        Ok(())
    }

    #[test]
    fn chosen_superior_must_hold_approval_capability() -> anyhow::Result<()> {
        let (_tmp, service, _manager, clerk, other) = seeded("bad_superior.db")?;
        let pens = service.create_item("Pens", Money::new(1_00, 2), 10, None)?;

        let err = service
            .create_request(RequestDraft::new(&clerk, &other).add_line(&pens.item_id, 1))
            .unwrap_err();
        assert!(matches!(
            err,
            RequestError::Validation(ValidationError::SuperiorCannotApprove { .. })
        ));
        Ok(())
    }

    #[test]
    fn requests_are_private_to_requester_and_approvers() -> anyhow::Result<()> {
        let (_tmp, service, manager, clerk, other) = seeded("private.db")?;
        let pens = service.create_item("Pens", Money::new(1_00, 2), 10, None)?;
        let request =
            service.create_request(RequestDraft::new(&clerk, &manager).add_line(&pens.item_id, 1))?;

        assert!(service.get_request(&request.request_id, &clerk).is_ok());
        assert!(service.get_request(&request.request_id, &manager).is_ok());
        assert!(matches!(
            service.get_request(&request.request_id, &other).unwrap_err(),
            RequestError::Forbidden { .. }
        ));

        assert_eq!(service.list_requests_for(&other)?.len(), 0);
        assert_eq!(service.list_requests_for(&manager)?.len(), 1);
        Ok(())
    }

    #[test]
    fn inactive_employees_cannot_submit() -> anyhow::Result<()> {
        let (_tmp, service, manager, clerk, _other) = seeded("inactive.db")?;
        let pens = service.create_item("Pens", Money::new(1_00, 2), 10, None)?;
        service.deactivate_employee(&clerk)?;

        let err = service
            .create_request(RequestDraft::new(&clerk, &manager).add_line(&pens.item_id, 1))
            .unwrap_err();
        assert!(matches!(
            err,
            RequestError::Validation(ValidationError::InactiveEmployee { .. })
        ));
        Ok(())
    }
}

mod notification_tests {
    use super::*;

    #[test]
    fn only_the_recipient_marks_read() -> anyhow::Result<()> {
        let (_tmp, service) = open_service("mark_read.db")?;
        let manager_role = service.create_role("Manager", true)?;
        let employee_role = service.create_role("Employee", false)?;
        let manager = service.create_employee("M", "m@office.test", &manager_role.role_id)?;
        let clerk = service.create_employee("C", "c@office.test", &employee_role.role_id)?;
        let pens = service.create_item("Pens", Money::new(1_00, 2), 10, None)?;

        service.create_request(
            RequestDraft::new(&clerk.employee_id, &manager.employee_id).add_line(&pens.item_id, 1),
        )?;

        let notes = service.notifications_for(&clerk.employee_id)?;
        assert_eq!(notes.len(), 1);
        let note_id = notes[0].notification_id.clone();

        assert!(matches!(
            service
                .mark_notification_read(&note_id, &manager.employee_id)
                .unwrap_err(),
            RequestError::Forbidden { .. }
        ));

        let read = service.mark_notification_read(&note_id, &clerk.employee_id)?;
        assert!(read.is_read);

        // unread first: the read one sinks below a fresh arrival
        service.create_request(
            RequestDraft::new(&clerk.employee_id, &manager.employee_id).add_line(&pens.item_id, 1),
        )?;
        let notes = service.notifications_for(&clerk.employee_id)?;
        assert_eq!(notes.len(), 2);
        assert!(!notes[0].is_read);
        assert!(notes[1].is_read);
        Ok(())
    }
}
