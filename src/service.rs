//! Service layer API for the request approval workflow
//!
//! Every operation takes the acting employee's id explicitly; nothing here
//! knows about sessions. Mutating lifecycle operations run inside multi-tree
//! sled transactions: guards are re-evaluated against freshly read state, so
//! a transition that loses a race surfaces as a `Conflict` instead of
//! silently double-applying.

use crate::catalog::{Category, ItemAvailability, StationeryItem, clamp_available};
use crate::config::{BudgetPolicy, ServiceConfig};
use crate::directory::{Employee, Role, RoleThreshold, would_create_cycle};
use crate::eligibility::Eligibility;
use crate::error::{RequestError, ServiceResult, ValidationError, from_cbor, to_cbor};
use crate::money::Money;
use crate::notify::{Notification, fan_out};
use crate::report::{ItemCostSummary, ReportRow, summarize};
use crate::request::{
    RequestDraft, RequestItem, RequestStatus, StationeryRequest, total_of, validate_lines,
};
use crate::timestamp::{TimeStamp, month_window};
use crate::utils::{self, hrp};
use chrono::{DateTime, Utc};
use sled::transaction::{ConflictableTransactionError, TransactionError, abort};
use sled::{Transactional, Tree};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

type TxResult<T> = Result<T, ConflictableTransactionError<RequestError>>;

fn decode_tx<T: for<'b> minicbor::Decode<'b, ()>>(bytes: &[u8]) -> TxResult<T> {
    minicbor::decode(bytes)
        .map_err(|e| ConflictableTransactionError::Abort(RequestError::Codec(e.to_string())))
}

fn encode_tx<T: minicbor::Encode<()>>(value: &T) -> TxResult<Vec<u8>> {
    minicbor::to_vec(value)
        .map_err(|e| ConflictableTransactionError::Abort(RequestError::Codec(e.to_string())))
}

fn map_tx<T>(result: Result<T, TransactionError<RequestError>>) -> ServiceResult<T> {
    result.map_err(|e| match e {
        TransactionError::Abort(err) => err,
        TransactionError::Storage(err) => RequestError::Storage(err),
    })
}

pub struct RequestService {
    employees: Tree,
    roles: Tree,
    categories: Tree,
    items: Tree,
    requests: Tree,
    notifications: Tree,
    config: ServiceConfig,
    // serializes the availability-check-then-insert section of create/edit:
    // reservations are derived by scanning the requests tree, which a sled
    // transaction cannot do, so two racing submissions could otherwise both
    // see the last unit as free
    submission: Mutex<()>,
}

impl RequestService {
    pub fn open(db: Arc<sled::Db>) -> ServiceResult<Self> {
        Self::open_with(db, ServiceConfig::default())
    }

    pub fn open_with(db: Arc<sled::Db>, config: ServiceConfig) -> ServiceResult<Self> {
        Ok(Self {
            employees: db.open_tree("employees")?,
            roles: db.open_tree("roles")?,
            categories: db.open_tree("categories")?,
            items: db.open_tree("items")?,
            requests: db.open_tree("requests")?,
            notifications: db.open_tree("notifications")?,
            config,
            submission: Mutex::new(()),
        })
    }

    fn submission_guard(&self) -> MutexGuard<'_, ()> {
        // a poisoned lock only means another submission panicked mid-flight;
        // there is no guarded data to have been left inconsistent
        self.submission
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ---- generic tree access ----

    fn get_decoded<T: for<'b> minicbor::Decode<'b, ()>>(
        tree: &Tree,
        key: &str,
    ) -> ServiceResult<Option<T>> {
        match tree.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(from_cbor(bytes.as_ref())?)),
            None => Ok(None),
        }
    }

    fn require<T: for<'b> minicbor::Decode<'b, ()>>(
        tree: &Tree,
        key: &str,
        kind: &'static str,
    ) -> ServiceResult<T> {
        Self::get_decoded(tree, key)?.ok_or_else(|| RequestError::NotFound {
            kind,
            id: key.to_string(),
        })
    }

    fn put<T: minicbor::Encode<()>>(tree: &Tree, key: &str, value: &T) -> ServiceResult<()> {
        tree.insert(key.as_bytes(), to_cbor(value)?)?;
        Ok(())
    }

    fn scan<T: for<'b> minicbor::Decode<'b, ()>>(tree: &Tree) -> ServiceResult<Vec<T>> {
        tree.iter()
            .map(|entry| -> ServiceResult<T> {
                let (_key, value) = entry?;
                from_cbor(value.as_ref())
            })
            .collect()
    }

    fn new_id(prefix: &str) -> ServiceResult<String> {
        utils::new_uuid_to_bech32(prefix).map_err(RequestError::internal)
    }

    // ---- role registry ----

    pub fn create_role(&self, role_name: &str, can_approve: bool) -> ServiceResult<Role> {
        let role = Role::new(Self::new_id(hrp::ROLE)?, role_name, can_approve);
        Self::put(&self.roles, &role.role_id, &role)?;
        Ok(role)
    }

    pub fn get_role(&self, role_id: &str) -> ServiceResult<Role> {
        Self::require(&self.roles, role_id, "role")
    }

    /// Upserts the role's monthly spending cap.
    pub fn set_role_threshold(&self, role_id: &str, max_amount: Money) -> ServiceResult<Role> {
        let mut role = self.get_role(role_id)?;
        role.threshold = Some(RoleThreshold { max_amount });
        Self::put(&self.roles, role_id, &role)?;
        Ok(role)
    }

    /// Points a role at the role it reports to. Rejected if the pointer would
    /// close a cycle in the role hierarchy.
    pub fn set_role_reports_to(&self, role_id: &str, parent_role_id: &str) -> ServiceResult<Role> {
        let mut role = self.get_role(role_id)?;
        let parent: Role = Self::require(&self.roles, parent_role_id, "role")?;

        let parents: HashMap<String, Option<String>> = Self::scan::<Role>(&self.roles)?
            .into_iter()
            .map(|r| (r.role_id, r.reports_to_role_id))
            .collect();
        if would_create_cycle(role_id, &parent.role_id, &parents) {
            return Err(ValidationError::HierarchyCycle {
                id: parent.role_id,
            }
            .into());
        }

        role.reports_to_role_id = Some(parent.role_id);
        Self::put(&self.roles, role_id, &role)?;
        Ok(role)
    }

    /// The cap for the role, if one is configured. Absence means no limit;
    /// policy around that is the caller's call, so it only warrants a warning.
    pub fn get_monthly_threshold(&self, role_id: &str) -> ServiceResult<Option<Money>> {
        let role = self.get_role(role_id)?;
        if role.threshold.is_none() {
            warn!(role_id, "no monthly threshold configured for role");
        }
        Ok(role.threshold.map(|t| t.max_amount))
    }

    // ---- employee directory ----

    pub fn create_employee(&self, name: &str, email: &str, role_id: &str) -> ServiceResult<Employee> {
        let role: Option<Role> = Self::get_decoded(&self.roles, role_id)?;
        if role.is_none() {
            return Err(ValidationError::UnknownRole {
                role_id: role_id.to_string(),
            }
            .into());
        }
        let employee = Employee::new(Self::new_id(hrp::EMPLOYEE)?, name, email, role_id);
        Self::put(&self.employees, &employee.employee_id, &employee)?;
        Ok(employee)
    }

    pub fn get_employee(&self, employee_id: &str) -> ServiceResult<Employee> {
        Self::require(&self.employees, employee_id, "employee")
    }

    /// Assigns a superior. The superior must be a different, existing
    /// employee, and the assignment must not close a reporting cycle.
    pub fn assign_superior(&self, employee_id: &str, superior_id: &str) -> ServiceResult<Employee> {
        if employee_id == superior_id {
            return Err(ValidationError::SelfSuperior {
                employee_id: employee_id.to_string(),
            }
            .into());
        }
        let mut employee = self.get_employee(employee_id)?;
        let superior: Employee = Self::require(&self.employees, superior_id, "employee")?;

        let parents: HashMap<String, Option<String>> = Self::scan::<Employee>(&self.employees)?
            .into_iter()
            .map(|e| (e.employee_id, e.superior_id))
            .collect();
        if would_create_cycle(employee_id, &superior.employee_id, &parents) {
            return Err(ValidationError::HierarchyCycle {
                id: superior.employee_id,
            }
            .into());
        }

        employee.superior_id = Some(superior.employee_id);
        employee.modified_at = Some(TimeStamp::new());
        Self::put(&self.employees, employee_id, &employee)?;
        Ok(employee)
    }

    pub fn set_employee_role(&self, employee_id: &str, role_id: &str) -> ServiceResult<Employee> {
        let mut employee = self.get_employee(employee_id)?;
        if Self::get_decoded::<Role>(&self.roles, role_id)?.is_none() {
            return Err(ValidationError::UnknownRole {
                role_id: role_id.to_string(),
            }
            .into());
        }
        employee.role_id = role_id.to_string();
        employee.modified_at = Some(TimeStamp::new());
        Self::put(&self.employees, employee_id, &employee)?;
        Ok(employee)
    }

    /// Soft deactivation; history stays untouched.
    pub fn deactivate_employee(&self, employee_id: &str) -> ServiceResult<Employee> {
        let mut employee = self.get_employee(employee_id)?;
        employee.is_active = false;
        employee.modified_at = Some(TimeStamp::new());
        Self::put(&self.employees, employee_id, &employee)?;
        Ok(employee)
    }

    /// Stores a new opaque password hash and notifies the employee.
    pub fn change_password_hash(&self, employee_id: &str, new_hash: &str) -> ServiceResult<()> {
        let mut employee = self.get_employee(employee_id)?;
        employee.password_hash = Some(new_hash.to_string());
        employee.modified_at = Some(TimeStamp::new());

        let notes = fan_out(
            employee_id,
            None,
            None,
            "Your password was changed.",
            TimeStamp::new(),
        )
        .map_err(RequestError::internal)?;

        let result = (&self.employees, &self.notifications).transaction(|(employees, notifications)| {
            employees.insert(employee_id.as_bytes(), encode_tx(&employee)?)?;
            for note in &notes {
                notifications.insert(note.notification_id.as_bytes(), encode_tx(note)?)?;
            }
            Ok(())
        });
        map_tx(result)
    }

    /// Hard delete. Refused while any request or notification still
    /// references the employee; subordinates get their superior pointer
    /// cleared rather than being cascade-deleted.
    pub fn delete_employee(&self, employee_id: &str) -> ServiceResult<()> {
        self.get_employee(employee_id)?;

        let has_requests = Self::scan::<StationeryRequest>(&self.requests)?
            .iter()
            .any(|r| r.employee_id == employee_id || r.superior_id == employee_id);
        let has_notifications = Self::scan::<Notification>(&self.notifications)?
            .iter()
            .any(|n| n.employee_id == employee_id);
        if has_requests || has_notifications {
            return Err(ValidationError::EmployeeHasRecords {
                employee_id: employee_id.to_string(),
            }
            .into());
        }

        let mut subordinates: Vec<Employee> = Self::scan::<Employee>(&self.employees)?
            .into_iter()
            .filter(|e| e.superior_id.as_deref() == Some(employee_id))
            .collect();
        for subordinate in &mut subordinates {
            subordinate.superior_id = None;
            subordinate.modified_at = Some(TimeStamp::new());
        }

        let result = self.employees.transaction(|employees| {
            for subordinate in &subordinates {
                employees.insert(subordinate.employee_id.as_bytes(), encode_tx(subordinate)?)?;
            }
            employees.remove(employee_id.as_bytes())?;
            Ok(())
        });
        map_tx(result)
    }

    /// Candidate approvers a requester may route to: active employees whose
    /// role carries the approval capability.
    pub fn resolve_approval_route(&self) -> ServiceResult<Vec<Employee>> {
        let roles: HashMap<String, Role> = Self::scan::<Role>(&self.roles)?
            .into_iter()
            .map(|r| (r.role_id.clone(), r))
            .collect();

        let mut approvers: Vec<Employee> = Self::scan::<Employee>(&self.employees)?
            .into_iter()
            .filter(|e| e.is_active && roles.get(&e.role_id).is_some_and(|r| r.can_approve))
            .collect();
        approvers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(approvers)
    }

    fn can_approve(&self, employee: &Employee) -> ServiceResult<bool> {
        let role: Option<Role> = Self::get_decoded(&self.roles, &employee.role_id)?;
        Ok(role.is_some_and(|r| r.can_approve))
    }

    fn require_approver(&self, actor_id: &str, action: &'static str) -> ServiceResult<Employee> {
        let actor = self.get_employee(actor_id)?;
        if !self.can_approve(&actor)? {
            return Err(RequestError::Forbidden {
                actor_id: actor_id.to_string(),
                action,
            });
        }
        Ok(actor)
    }

    // ---- catalog ----

    pub fn create_category(&self, category_name: &str, description: Option<&str>) -> ServiceResult<Category> {
        let category = Category {
            category_id: Self::new_id(hrp::CATEGORY)?,
            category_name: category_name.to_string(),
            description: description.map(str::to_string),
        };
        Self::put(&self.categories, &category.category_id, &category)?;
        Ok(category)
    }

    pub fn create_item(
        &self,
        item_name: &str,
        unit_cost: Money,
        current_stock: u32,
        category_id: Option<&str>,
    ) -> ServiceResult<StationeryItem> {
        if let Some(category_id) = category_id
            && Self::get_decoded::<Category>(&self.categories, category_id)?.is_none()
        {
            return Err(ValidationError::UnknownCategory {
                category_id: category_id.to_string(),
            }
            .into());
        }
        let mut item = StationeryItem::new(
            Self::new_id(hrp::ITEM)?,
            item_name,
            unit_cost,
            current_stock,
        );
        item.category_id = category_id.map(str::to_string);
        Self::put(&self.items, &item.item_id, &item)?;
        Ok(item)
    }

    pub fn get_item(&self, item_id: &str) -> ServiceResult<StationeryItem> {
        Self::require(&self.items, item_id, "item")
    }

    /// Changes the catalog price. Existing request lines keep their snapshot.
    pub fn set_item_cost(&self, item_id: &str, unit_cost: Money) -> ServiceResult<StationeryItem> {
        let mut item = self.get_item(item_id)?;
        item.unit_cost = unit_cost;
        item.modified_at = Some(TimeStamp::new());
        Self::put(&self.items, item_id, &item)?;
        Ok(item)
    }

    /// Administrative stock correction. Physical stock may never go negative;
    /// availability seen by requesters may transiently, which is fine.
    pub fn adjust_stock(&self, item_id: &str, delta: i64) -> ServiceResult<StationeryItem> {
        let result = self.items.transaction(|items| {
            let bytes = items.get(item_id.as_bytes())?.ok_or_else(|| {
                ConflictableTransactionError::Abort(RequestError::NotFound {
                    kind: "item",
                    id: item_id.to_string(),
                })
            })?;
            let mut item: StationeryItem = decode_tx(bytes.as_ref())?;

            let adjusted = i64::from(item.current_stock) + delta;
            if adjusted < 0 {
                return abort(RequestError::InsufficientStock {
                    item_id: item_id.to_string(),
                    requested: delta.unsigned_abs().min(u32::MAX as u64) as u32,
                    available: i64::from(item.current_stock),
                });
            }
            item.current_stock = adjusted as u32;
            item.modified_at = Some(TimeStamp::new());
            items.insert(item_id.as_bytes(), encode_tx(&item)?)?;
            Ok(item)
        });
        map_tx(result)
    }

    /// Quantity reserved per item by outstanding (pending or approved)
    /// requests. Computed on read from the requests tree, never persisted.
    fn reserved_quantities(&self, exclude_request: Option<&str>) -> ServiceResult<HashMap<String, u64>> {
        let mut reserved: HashMap<String, u64> = HashMap::new();
        for request in Self::scan::<StationeryRequest>(&self.requests)? {
            if !request.status.reserves_stock() {
                continue;
            }
            if exclude_request == Some(request.request_id.as_str()) {
                continue;
            }
            for line in &request.items {
                *reserved.entry(line.item_id.clone()).or_default() += u64::from(line.quantity);
            }
        }
        Ok(reserved)
    }

    /// Unclamped availability for every catalog item.
    fn availability_map(&self, exclude_request: Option<&str>) -> ServiceResult<HashMap<String, i64>> {
        let reserved = self.reserved_quantities(exclude_request)?;
        Ok(Self::scan::<StationeryItem>(&self.items)?
            .into_iter()
            .map(|item| {
                let taken = reserved.get(&item.item_id).copied().unwrap_or(0);
                (item.item_id, i64::from(item.current_stock) - taken as i64)
            })
            .collect())
    }

    /// Available stock for one item, clamped to zero for presentation.
    pub fn available_stock(&self, item_id: &str) -> ServiceResult<u64> {
        let item = self.get_item(item_id)?;
        let reserved = self
            .reserved_quantities(None)?
            .get(item_id)
            .copied()
            .unwrap_or(0);
        Ok(clamp_available(i64::from(item.current_stock) - reserved as i64))
    }

    pub fn list_available_items(&self, category_id: Option<&str>) -> ServiceResult<Vec<ItemAvailability>> {
        let reserved = self.reserved_quantities(None)?;
        let mut listing: Vec<ItemAvailability> = Self::scan::<StationeryItem>(&self.items)?
            .into_iter()
            .filter(|item| category_id.is_none() || item.category_id.as_deref() == category_id)
            .map(|item| {
                let taken = reserved.get(&item.item_id).copied().unwrap_or(0);
                let available_stock = clamp_available(i64::from(item.current_stock) - taken as i64);
                ItemAvailability {
                    item,
                    available_stock,
                }
            })
            .collect();
        listing.sort_by(|a, b| a.item.item_name.cmp(&b.item.item_name));
        Ok(listing)
    }

    // ---- request lifecycle ----

    /// Submit a new request for approval.
    ///
    /// Validation order (short-circuiting, nothing persisted on failure):
    /// line set non-empty, all quantities positive, all quantities within
    /// available stock. The budget check is advisory unless the service was
    /// configured with an enforced policy.
    pub fn create_request(&self, draft: RequestDraft) -> ServiceResult<StationeryRequest> {
        let requester = self.get_employee(&draft.employee_id)?;
        if !requester.is_active {
            return Err(ValidationError::InactiveEmployee {
                employee_id: requester.employee_id,
            }
            .into());
        }
        let superior = Self::get_decoded::<Employee>(&self.employees, &draft.superior_id)?
            .ok_or_else(|| ValidationError::UnknownEmployee {
                employee_id: draft.superior_id.clone(),
            })?;
        if !self.can_approve(&superior)? {
            return Err(ValidationError::SuperiorCannotApprove {
                employee_id: superior.employee_id,
            }
            .into());
        }

        let _guard = self.submission_guard();

        let availability = self.availability_map(None)?;
        validate_lines(&draft.lines, &availability)?;

        // snapshot unit costs at submission time
        let mut lines = Vec::with_capacity(draft.lines.len());
        for input in &draft.lines {
            let item = self.get_item(&input.item_id)?;
            lines.push(RequestItem {
                item_id: item.item_id,
                quantity: input.quantity,
                unit_cost: item.unit_cost,
            });
        }
        let total_cost = total_of(&lines);

        self.advise_budget(&requester, total_cost, None)?;

        let request = StationeryRequest {
            request_id: Self::new_id(hrp::REQUEST)?,
            employee_id: draft.employee_id.clone(),
            superior_id: draft.superior_id.clone(),
            request_date: TimeStamp::new(),
            from_date: draft.from_date,
            to_date: draft.to_date,
            status: RequestStatus::Pending,
            total_cost,
            reason: draft.reason,
            last_status_changed_at: None,
            items: lines,
        };

        let notes = fan_out(
            &request.employee_id,
            Some(&request.superior_id),
            Some(&request.request_id),
            &format!("Request {} submitted for approval.", request.request_id),
            request.request_date.clone(),
        )
        .map_err(RequestError::internal)?;

        let result = (&self.requests, &self.notifications).transaction(|(requests, notifications)| {
            requests.insert(request.request_id.as_bytes(), encode_tx(&request)?)?;
            for note in &notes {
                notifications.insert(note.notification_id.as_bytes(), encode_tx(note)?)?;
            }
            Ok(())
        });
        map_tx(result)?;

        info!(
            request_id = %request.request_id,
            employee_id = %request.employee_id,
            total = %request.total_cost,
            "request submitted"
        );
        Ok(request)
    }

    /// Budget gate for create and edit. `exclude_request` keeps a pending
    /// request's own total out of the pending bucket while it is re-priced.
    fn advise_budget(
        &self,
        requester: &Employee,
        total_cost: Money,
        exclude_request: Option<&str>,
    ) -> ServiceResult<()> {
        let threshold = self.get_monthly_threshold(&requester.role_id)?;
        let (approved, pending) =
            self.monthly_spend_excluding(&requester.employee_id, Utc::now(), exclude_request)?;
        let eligibility = Eligibility::evaluate(threshold, approved, pending);

        if let Some(remaining) = eligibility.remaining
            && total_cost > remaining
        {
            match self.config.budget_policy {
                BudgetPolicy::Advisory => warn!(
                    employee_id = %requester.employee_id,
                    total = %total_cost,
                    remaining = %remaining,
                    "request exceeds remaining monthly budget; submitting anyway"
                ),
                BudgetPolicy::Enforced => {
                    return Err(ValidationError::BudgetExceeded { remaining }.into());
                }
            }
        }
        Ok(())
    }

    /// Replace a pending request's routing, dates, reason, and full line set.
    /// Unit costs are re-snapshotted from the live catalog; stock checks run
    /// against availability that excludes this request's own reservation.
    pub fn edit_request(
        &self,
        request_id: &str,
        actor_id: &str,
        draft: RequestDraft,
    ) -> ServiceResult<StationeryRequest> {
        let existing: StationeryRequest = Self::require(&self.requests, request_id, "request")?;
        let actor = self.get_employee(actor_id)?;
        if actor_id != existing.employee_id && !self.can_approve(&actor)? {
            return Err(RequestError::Forbidden {
                actor_id: actor_id.to_string(),
                action: "edit this request",
            });
        }
        if existing.status.is_terminal() {
            return Err(RequestError::InvalidState {
                request_id: request_id.to_string(),
                status: existing.status,
            });
        }

        let superior = Self::get_decoded::<Employee>(&self.employees, &draft.superior_id)?
            .ok_or_else(|| ValidationError::UnknownEmployee {
                employee_id: draft.superior_id.clone(),
            })?;
        if !self.can_approve(&superior)? {
            return Err(ValidationError::SuperiorCannotApprove {
                employee_id: superior.employee_id,
            }
            .into());
        }

        let _guard = self.submission_guard();

        // this request's own pending reservation must not count against it
        let availability = self.availability_map(Some(request_id))?;
        validate_lines(&draft.lines, &availability)?;

        let mut lines = Vec::with_capacity(draft.lines.len());
        for input in &draft.lines {
            let item = self.get_item(&input.item_id)?;
            lines.push(RequestItem {
                item_id: item.item_id,
                quantity: input.quantity,
                unit_cost: item.unit_cost,
            });
        }
        let total_cost = total_of(&lines);

        // the new total runs the same budget gate as a fresh submission,
        // minus this request's own outstanding pending total
        let requester = self.get_employee(&existing.employee_id)?;
        self.advise_budget(&requester, total_cost, Some(request_id))?;

        let result = self.requests.transaction(|requests| {
            let bytes = requests.get(request_id.as_bytes())?.ok_or_else(|| {
                ConflictableTransactionError::Abort(RequestError::NotFound {
                    kind: "request",
                    id: request_id.to_string(),
                })
            })?;
            let mut request: StationeryRequest = decode_tx(bytes.as_ref())?;
            if request.status != RequestStatus::Pending {
                return abort(RequestError::Conflict {
                    request_id: request_id.to_string(),
                    status: request.status,
                });
            }

            // full line replacement, never a partial merge
            request.superior_id = draft.superior_id.clone();
            request.from_date = draft.from_date.clone();
            request.to_date = draft.to_date.clone();
            request.reason = draft.reason.clone();
            request.items = lines.clone();
            request.total_cost = total_cost;

            requests.insert(request_id.as_bytes(), encode_tx(&request)?)?;
            Ok(request)
        });
        let request = map_tx(result)?;

        info!(request_id, actor_id, total = %request.total_cost, "request edited");
        Ok(request)
    }

    /// Approve a pending request: flip the status and decrement physical
    /// stock for every line in one transaction. If any line would underflow,
    /// the whole transition aborts with `InsufficientStock`.
    pub fn approve(&self, request_id: &str, actor_id: &str) -> ServiceResult<StationeryRequest> {
        self.require_approver(actor_id, "approve requests")?;
        self.pre_check_pending(request_id)?;

        let now = TimeStamp::new();
        let result = (&self.requests, &self.items, &self.notifications).transaction(
            |(requests, items, notifications)| {
                let bytes = requests.get(request_id.as_bytes())?.ok_or_else(|| {
                    ConflictableTransactionError::Abort(RequestError::NotFound {
                        kind: "request",
                        id: request_id.to_string(),
                    })
                })?;
                let mut request: StationeryRequest = decode_tx(bytes.as_ref())?;
                if request.status != RequestStatus::Pending {
                    // the pre-check saw Pending, so someone raced us here
                    return abort(RequestError::Conflict {
                        request_id: request_id.to_string(),
                        status: request.status,
                    });
                }

                // checked against live stock, not the snapshot at creation time
                for line in &request.items {
                    let item_bytes = items.get(line.item_id.as_bytes())?.ok_or_else(|| {
                        ConflictableTransactionError::Abort(RequestError::NotFound {
                            kind: "item",
                            id: line.item_id.clone(),
                        })
                    })?;
                    let mut item: StationeryItem = decode_tx(item_bytes.as_ref())?;
                    let Some(rest) = item.current_stock.checked_sub(line.quantity) else {
                        return abort(RequestError::InsufficientStock {
                            item_id: line.item_id.clone(),
                            requested: line.quantity,
                            available: i64::from(item.current_stock),
                        });
                    };
                    item.current_stock = rest;
                    item.modified_at = Some(now.clone());
                    items.insert(line.item_id.as_bytes(), encode_tx(&item)?)?;
                }

                request.status = RequestStatus::Approved;
                request.last_status_changed_at = Some(now.clone());
                requests.insert(request_id.as_bytes(), encode_tx(&request)?)?;

                let notes = fan_out(
                    &request.employee_id,
                    Some(&request.superior_id),
                    Some(request_id),
                    &format!("Request {request_id} was approved."),
                    now.clone(),
                )
                .map_err(|e| ConflictableTransactionError::Abort(RequestError::internal(e)))?;
                for note in &notes {
                    notifications.insert(note.notification_id.as_bytes(), encode_tx(note)?)?;
                }

                Ok(request)
            },
        );
        let request = map_tx(result)?;

        info!(request_id, actor_id, "request approved");
        Ok(request)
    }

    /// Reject a pending request. No stock effect.
    pub fn reject(&self, request_id: &str, actor_id: &str) -> ServiceResult<StationeryRequest> {
        self.require_approver(actor_id, "reject requests")?;
        let request = self.terminal_transition(request_id, RequestStatus::Rejected, "was rejected")?;
        info!(request_id, actor_id, "request rejected");
        Ok(request)
    }

    /// Withdraw a pending request; only the requester may do this.
    pub fn withdraw(&self, request_id: &str, actor_id: &str) -> ServiceResult<StationeryRequest> {
        let existing: StationeryRequest = Self::require(&self.requests, request_id, "request")?;
        if existing.employee_id != actor_id {
            return Err(RequestError::Forbidden {
                actor_id: actor_id.to_string(),
                action: "withdraw this request",
            });
        }
        let request =
            self.terminal_transition(request_id, RequestStatus::Withdrawn, "was withdrawn")?;
        info!(request_id, actor_id, "request withdrawn");
        Ok(request)
    }

    fn pre_check_pending(&self, request_id: &str) -> ServiceResult<()> {
        let existing: StationeryRequest = Self::require(&self.requests, request_id, "request")?;
        if existing.status.is_terminal() {
            return Err(RequestError::InvalidState {
                request_id: request_id.to_string(),
                status: existing.status,
            });
        }
        Ok(())
    }

    /// Shared Pending -> terminal transition for the stock-neutral exits.
    fn terminal_transition(
        &self,
        request_id: &str,
        target: RequestStatus,
        message_verb: &str,
    ) -> ServiceResult<StationeryRequest> {
        self.pre_check_pending(request_id)?;

        let now = TimeStamp::new();
        let result = (&self.requests, &self.notifications).transaction(|(requests, notifications)| {
            let bytes = requests.get(request_id.as_bytes())?.ok_or_else(|| {
                ConflictableTransactionError::Abort(RequestError::NotFound {
                    kind: "request",
                    id: request_id.to_string(),
                })
            })?;
            let mut request: StationeryRequest = decode_tx(bytes.as_ref())?;
            if request.status != RequestStatus::Pending {
                return abort(RequestError::Conflict {
                    request_id: request_id.to_string(),
                    status: request.status,
                });
            }

            request.status = target;
            request.last_status_changed_at = Some(now.clone());
            requests.insert(request_id.as_bytes(), encode_tx(&request)?)?;

            let notes = fan_out(
                &request.employee_id,
                Some(&request.superior_id),
                Some(request_id),
                &format!("Request {request_id} {message_verb}."),
                now.clone(),
            )
            .map_err(|e| ConflictableTransactionError::Abort(RequestError::internal(e)))?;
            for note in &notes {
                notifications.insert(note.notification_id.as_bytes(), encode_tx(note)?)?;
            }

            Ok(request)
        });
        map_tx(result)
    }

    /// Remove a pending request and its lines. Processed requests are
    /// history and can never be deleted.
    pub fn delete_request(&self, request_id: &str, actor_id: &str) -> ServiceResult<()> {
        let existing: StationeryRequest = Self::require(&self.requests, request_id, "request")?;
        let actor = self.get_employee(actor_id)?;
        if actor_id != existing.employee_id && !self.can_approve(&actor)? {
            return Err(RequestError::Forbidden {
                actor_id: actor_id.to_string(),
                action: "delete this request",
            });
        }
        if existing.status.is_terminal() {
            return Err(RequestError::InvalidState {
                request_id: request_id.to_string(),
                status: existing.status,
            });
        }

        let result = self.requests.transaction(|requests| {
            let bytes = requests.get(request_id.as_bytes())?.ok_or_else(|| {
                ConflictableTransactionError::Abort(RequestError::NotFound {
                    kind: "request",
                    id: request_id.to_string(),
                })
            })?;
            let request: StationeryRequest = decode_tx(bytes.as_ref())?;
            if request.status != RequestStatus::Pending {
                return abort(RequestError::Conflict {
                    request_id: request_id.to_string(),
                    status: request.status,
                });
            }
            requests.remove(request_id.as_bytes())?;
            Ok(())
        });
        map_tx(result)?;

        info!(request_id, actor_id, "request deleted");
        Ok(())
    }

    /// Fetch one request. Requesters see their own; approval-capable roles
    /// see everything.
    pub fn get_request(&self, request_id: &str, actor_id: &str) -> ServiceResult<StationeryRequest> {
        let request: StationeryRequest = Self::require(&self.requests, request_id, "request")?;
        let actor = self.get_employee(actor_id)?;
        if actor_id != request.employee_id && !self.can_approve(&actor)? {
            return Err(RequestError::Forbidden {
                actor_id: actor_id.to_string(),
                action: "view this request",
            });
        }
        Ok(request)
    }

    /// Requests visible to the actor, newest first.
    pub fn list_requests_for(&self, actor_id: &str) -> ServiceResult<Vec<StationeryRequest>> {
        let actor = self.get_employee(actor_id)?;
        let sees_all = self.can_approve(&actor)?;

        let mut requests: Vec<StationeryRequest> = Self::scan::<StationeryRequest>(&self.requests)?
            .into_iter()
            .filter(|r| sees_all || r.employee_id == actor_id)
            .collect();
        requests.sort_by(|a, b| b.request_date.cmp(&a.request_date));
        Ok(requests)
    }

    // ---- eligibility ----

    /// Approved and pending spend for requests dated inside the calendar
    /// month containing `at`. Rejected and withdrawn requests count for
    /// neither bucket.
    pub fn monthly_spend(&self, employee_id: &str, at: DateTime<Utc>) -> ServiceResult<(Money, Money)> {
        self.monthly_spend_excluding(employee_id, at, None)
    }

    fn monthly_spend_excluding(
        &self,
        employee_id: &str,
        at: DateTime<Utc>,
        exclude_request: Option<&str>,
    ) -> ServiceResult<(Money, Money)> {
        let (start, end) = month_window(at);
        let mut approved = Money::ZERO;
        let mut pending = Money::ZERO;

        for request in Self::scan::<StationeryRequest>(&self.requests)? {
            if request.employee_id != employee_id {
                continue;
            }
            if exclude_request == Some(request.request_id.as_str()) {
                continue;
            }
            let date = request.request_date.to_datetime_utc();
            if date < start || date >= end {
                continue;
            }
            match request.status {
                RequestStatus::Approved => approved += request.total_cost,
                RequestStatus::Pending => pending += request.total_cost,
                RequestStatus::Rejected | RequestStatus::Withdrawn => {}
            }
        }
        Ok((approved, pending))
    }

    /// Where the employee stands against their role's monthly cap right now.
    pub fn get_eligibility(&self, employee_id: &str) -> ServiceResult<Eligibility> {
        let employee = self.get_employee(employee_id)?;
        let threshold = self.get_monthly_threshold(&employee.role_id)?;
        let (approved, pending) = self.monthly_spend(employee_id, Utc::now())?;
        Ok(Eligibility::evaluate(threshold, approved, pending))
    }

    // ---- notifications ----

    /// Notifications for one employee, unread first, newest first.
    pub fn notifications_for(&self, employee_id: &str) -> ServiceResult<Vec<Notification>> {
        let mut notes: Vec<Notification> = Self::scan::<Notification>(&self.notifications)?
            .into_iter()
            .filter(|n| n.employee_id == employee_id)
            .collect();
        notes.sort_by(|a, b| {
            a.is_read
                .cmp(&b.is_read)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(notes)
    }

    /// Only the recipient may mark their notification read.
    pub fn mark_notification_read(
        &self,
        notification_id: &str,
        actor_id: &str,
    ) -> ServiceResult<Notification> {
        let mut note: Notification =
            Self::require(&self.notifications, notification_id, "notification")?;
        if note.employee_id != actor_id {
            return Err(RequestError::Forbidden {
                actor_id: actor_id.to_string(),
                action: "read this notification",
            });
        }
        note.is_read = true;
        Self::put(&self.notifications, notification_id, &note)?;
        Ok(note)
    }

    // ---- reporting ----

    /// Spend-by-item summary over all historical requests, sorted by total
    /// spend descending.
    ///
    /// `unit_cost` in each row is the current catalog price, shown for
    /// context; `total_spent` sums the per-line snapshots, so after a price
    /// change the two need not multiply out.
    pub fn item_spend_report(&self) -> ServiceResult<Vec<ItemCostSummary>> {
        let items: HashMap<String, StationeryItem> = Self::scan::<StationeryItem>(&self.items)?
            .into_iter()
            .map(|i| (i.item_id.clone(), i))
            .collect();

        let mut rows = Vec::new();
        for request in Self::scan::<StationeryRequest>(&self.requests)? {
            for line in &request.items {
                let (item_name, unit_cost) = match items.get(&line.item_id) {
                    Some(item) => (item.item_name.clone(), item.unit_cost),
                    // item gone from the catalog; the snapshot still reports
                    None => (line.item_id.clone(), line.unit_cost),
                };
                rows.push(ReportRow {
                    item_id: line.item_id.clone(),
                    item_name,
                    unit_cost,
                    employee_id: request.employee_id.clone(),
                    quantity: line.quantity,
                    line_total: line.line_total(),
                });
            }
        }
        Ok(summarize(&rows))
    }
}
