//! End-to-end walkthrough of the request lifecycle: seed a small office,
//! submit a stationery request, inspect eligibility, approve it, and print
//! the spend report.
//!
//! Run with `cargo run --example workflow`.

use std::sync::Arc;

use stationery_approval::config::ServiceConfig;
use stationery_approval::money::Money;
use stationery_approval::request::RequestDraft;
use stationery_approval::service::RequestService;

fn main() -> anyhow::Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let db = Arc::new(sled::open(temp_dir.path().join("workflow.db"))?);
    let service = RequestService::open_with(db, ServiceConfig::default())?;

    // directory: one approving manager, one clerk with a 500.00 monthly cap
    let manager_role = service.create_role("Office Manager", true)?;
    let clerk_role = service.create_role("Clerk", false)?;
    service.set_role_threshold(&clerk_role.role_id, Money::new(500_00, 2))?;

    let manager = service.create_employee("Morgan", "morgan@office.test", &manager_role.role_id)?;
    let clerk = service.create_employee("Casey", "casey@office.test", &clerk_role.role_id)?;
    service.assign_superior(&clerk.employee_id, &manager.employee_id)?;

    // catalog
    let writing = service.create_category("Writing", Some("Pens, pencils, markers"))?;
    let pens = service.create_item("Ballpoint pens (box)", Money::new(4_50, 2), 40, Some(&writing.category_id))?;
    let chairs = service.create_item("Desk chair", Money::new(120_00, 2), 3, None)?;

    println!("== available items ==");
    for entry in service.list_available_items(None)? {
        println!(
            "{:<24} {:>8}  stock {}",
            entry.item.item_name,
            entry.item.unit_cost.to_string(),
            entry.available_stock
        );
    }

    // the clerk submits a request routed to their manager
    let request = service.create_request(
        RequestDraft::new(&clerk.employee_id, &manager.employee_id)
            .add_line(&pens.item_id, 6)
            .add_line(&chairs.item_id, 1)
            .set_reason("new starter desk setup"),
    )?;
    println!("\nsubmitted {} for {}", request.request_id, request.total_cost);

    let eligibility = service.get_eligibility(&clerk.employee_id)?;
    println!(
        "pending spend {} of cap {:?}, remaining {:?}",
        eligibility.pending_spend, eligibility.max_amount, eligibility.remaining
    );

    // the manager approves; stock is decremented in the same transaction
    let approved = service.approve(&request.request_id, &manager.employee_id)?;
    println!("\napproved, status now {:?}", approved.status);
    println!(
        "pens stock after approval: {}",
        service.get_item(&pens.item_id)?.current_stock
    );

    println!("\n== notifications for {} ==", clerk.name);
    for note in service.notifications_for(&clerk.employee_id)? {
        println!("[{}] {}", if note.is_read { "read" } else { "new " }, note.message);
    }

    println!("\n== spend by item ==");
    for row in service.item_spend_report()? {
        println!(
            "{:<24} qty {:>3}  spent {:>9}  {:>6}% (cum {:>6}%)",
            row.item_name,
            row.total_requested,
            row.total_spent.to_string(),
            row.percent_of_total,
            row.cumulative_percent
        );
    }

    Ok(())
}
