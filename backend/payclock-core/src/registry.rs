// src/registry.rs

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};

use crate::clock::{Clock, TimeOfDay};
use crate::error::{ConflictKind, ServiceError};
use crate::models::*;
use crate::store::{RecordStore, StoreError};

/// SHA-256 of the password, hex encoded.
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HireRequest {
    pub position_id: RecordId,
    pub schedule_id: RecordId,
    pub hired_date: Option<NaiveDate>,
    pub contract_end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewLeaveType {
    pub name: String,
    pub payed: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDeduction {
    pub title: String,
    pub amount: Decimal,
}

fn required(field: &'static str, value: &str) -> Result<(), ServiceError> {
    if value.trim().is_empty() {
        return Err(ServiceError::validation(
            field,
            format!("The {} is required.", field),
        ));
    }
    Ok(())
}

/// Accounts and the reference data (positions, schedules, leave types, deductions)
/// the other services snapshot from.
pub struct Registry {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
}

impl Registry {
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    // --- Accounts ---

    pub async fn register(&self, account: NewAccount) -> Result<Employee, ServiceError> {
        required("name", &account.name)?;
        required("email", &account.email)?;
        required("username", &account.username)?;
        required("password", &account.password)?;

        let now = self.clock.now();
        let employee = Employee {
            id: new_record_id(),
            name: account.name.trim().to_string(),
            email: account.email.trim().to_string(),
            username: account.username.trim().to_string(),
            password_hash: hash_password(&account.password),
            limit: DEFAULT_LEAVE_LIMIT,
            position: None,
            schedule: None,
            role: EmployeeRole::User,
            status: EmployeeStatus::Active,
            hired_date: None,
            contract_end_date: None,
            created: now,
            updated: now,
        };

        match self.store.insert_employee(employee).await {
            Ok(created) => {
                info!("Registered account: Emp={}, Username={}", created.id, created.username);
                Ok(created)
            }
            Err(StoreError::Duplicate { key, .. }) => {
                warn!("Registration rejected, username taken: {}", key);
                Err(ServiceError::conflict(
                    ConflictKind::Duplicate,
                    "The username is already taken.",
                ))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn accounts(&self) -> Result<Vec<Employee>, ServiceError> {
        Ok(self.store.employees().await?)
    }

    pub async fn employee(&self, id: &str) -> Result<Employee, ServiceError> {
        self.store
            .employee(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Employee", id))
    }

    /// Username lookup, then an exact digest comparison.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Employee, ServiceError> {
        let employee = self
            .store
            .employee_by_username(username.trim())
            .await?
            .ok_or_else(ServiceError::unknown_username)?;
        if employee.password_hash != hash_password(password) {
            return Err(ServiceError::wrong_password());
        }
        Ok(employee)
    }

    pub async fn hire(&self, employee_id: &str, req: HireRequest) -> Result<Employee, ServiceError> {
        let mut employee = self.employee(employee_id).await?;
        let position = self
            .store
            .position(&req.position_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Position", &req.position_id))?;
        let schedule = self
            .store
            .schedule(&req.schedule_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Schedule", &req.schedule_id))?;

        let now = self.clock.now();
        if let (Some(hired), Some(end)) = (req.hired_date, req.contract_end_date) {
            if end < hired {
                return Err(ServiceError::validation(
                    "contract_end_date",
                    "The contract end date is before the hired date.",
                ));
            }
        }

        employee.position = Some(position.position);
        employee.schedule = Some(schedule.schedule);
        if employee.role == EmployeeRole::User {
            employee.role = EmployeeRole::Employee;
        }
        employee.hired_date = Some(req.hired_date.unwrap_or_else(|| now.date()));
        employee.contract_end_date = req.contract_end_date;
        employee.updated = now;

        let hired = self.store.update_employee(employee).await?;
        info!(
            "Hired: Emp={}, Position={}, Schedule={} - {}",
            hired.id,
            hired.position.as_ref().map(|p| p.title.as_str()).unwrap_or_default(),
            schedule.schedule.timein,
            schedule.schedule.timeout
        );
        Ok(hired)
    }

    /// Number of accounts currently holding the `Employee` role.
    pub async fn headcount(&self) -> Result<u32, ServiceError> {
        let count = self
            .store
            .employees()
            .await?
            .iter()
            .filter(|e| e.role == EmployeeRole::Employee)
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    // --- Positions ---

    pub async fn create_position(&self, position: Position) -> Result<PositionEntry, ServiceError> {
        required("title", &position.title)?;
        if position.rate <= Decimal::ZERO {
            return Err(ServiceError::validation("rate", "The rate must be positive."));
        }
        let entry = PositionEntry {
            id: new_record_id(),
            position,
        };
        Ok(self.store.insert_position(entry).await?)
    }

    pub async fn positions(&self) -> Result<Vec<PositionEntry>, ServiceError> {
        Ok(self.store.positions().await?)
    }

    pub async fn delete_position(&self, id: &str) -> Result<(), ServiceError> {
        self.store.delete_position(id).await.map_err(not_found_or_persistence)
    }

    // --- Schedules ---

    pub async fn create_schedule(
        &self,
        timein: TimeOfDay,
        timeout: TimeOfDay,
    ) -> Result<ScheduleEntry, ServiceError> {
        if timeout <= timein {
            return Err(ServiceError::validation(
                "timeout",
                "The time-out must be after the time-in.",
            ));
        }
        let entry = ScheduleEntry {
            id: new_record_id(),
            schedule: Schedule { timein, timeout },
        };
        Ok(self.store.insert_schedule(entry).await?)
    }

    pub async fn schedules(&self) -> Result<Vec<ScheduleEntry>, ServiceError> {
        Ok(self.store.schedules().await?)
    }

    pub async fn delete_schedule(&self, id: &str) -> Result<(), ServiceError> {
        self.store.delete_schedule(id).await.map_err(not_found_or_persistence)
    }

    // --- Leave types ---

    pub async fn create_leave_type(&self, new: NewLeaveType) -> Result<LeaveType, ServiceError> {
        required("name", &new.name)?;
        let leave_type = LeaveType {
            id: new_record_id(),
            name: new.name.trim().to_string(),
            payed: new.payed,
        };
        match self.store.insert_leave_type(leave_type).await {
            Ok(created) => Ok(created),
            Err(StoreError::Duplicate { key, .. }) => Err(ServiceError::conflict(
                ConflictKind::Duplicate,
                format!("The leave type '{}' already exists.", key),
            )),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn leave_types(&self) -> Result<Vec<LeaveType>, ServiceError> {
        Ok(self.store.leave_types().await?)
    }

    pub async fn delete_leave_type(&self, id: &str) -> Result<(), ServiceError> {
        self.store.delete_leave_type(id).await.map_err(not_found_or_persistence)
    }

    // --- Deductions ---

    pub async fn create_deduction(&self, new: NewDeduction) -> Result<Deduction, ServiceError> {
        required("title", &new.title)?;
        if new.amount < Decimal::ZERO {
            return Err(ServiceError::validation(
                "amount",
                "The amount cannot be negative.",
            ));
        }
        let deduction = Deduction {
            id: new_record_id(),
            title: new.title.trim().to_string(),
            amount: new.amount,
        };
        Ok(self.store.insert_deduction(deduction).await?)
    }

    pub async fn deductions(&self) -> Result<Vec<Deduction>, ServiceError> {
        Ok(self.store.deductions().await?)
    }

    pub async fn delete_deduction(&self, id: &str) -> Result<(), ServiceError> {
        self.store.delete_deduction(id).await.map_err(not_found_or_persistence)
    }
}

fn not_found_or_persistence(e: StoreError) -> ServiceError {
    match e {
        StoreError::NotFound { collection, id } => ServiceError::not_found(collection, &id),
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::store::InMemoryStore;
    use rust_decimal_macros::dec;

    fn setup() -> Registry {
        let clock = TestClock::new("2024-03-01 08:00:00");
        Registry::new(Arc::new(InMemoryStore::new()), Arc::new(clock))
    }

    fn account(username: &str) -> NewAccount {
        NewAccount {
            name: "Ana Cruz".into(),
            email: "ana@example.com".into(),
            username: username.into(),
            password: "s3cret".into(),
        }
    }

    #[test]
    fn password_digest_is_sha256_hex() {
        assert_eq!(
            hash_password("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn register_creates_user_with_default_limit() {
        let registry = setup();
        let ana = registry.register(account("ana")).await.unwrap();
        assert_eq!(ana.role, EmployeeRole::User);
        assert_eq!(ana.limit, 15);
        assert_eq!(ana.password_hash, hash_password("s3cret"));

        let err = registry.register(account("ana")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict { kind: ConflictKind::Duplicate, .. }));
    }

    #[tokio::test]
    async fn authenticate_distinguishes_username_and_password() {
        let registry = setup();
        registry.register(account("ana")).await.unwrap();

        assert!(registry.authenticate("ana", "s3cret").await.is_ok());
        let err = registry.authenticate("bob", "s3cret").await.unwrap_err();
        assert!(matches!(err, ServiceError::Auth { field: crate::error::AuthField::Username, .. }));
        let err = registry.authenticate("ana", "wrong").await.unwrap_err();
        assert!(matches!(err, ServiceError::Auth { field: crate::error::AuthField::Password, .. }));
    }

    #[tokio::test]
    async fn hire_assigns_position_schedule_and_role() {
        let registry = setup();
        let ana = registry.register(account("ana")).await.unwrap();
        let cook = registry
            .create_position(Position { title: "Cook".into(), rate: dec!(80) })
            .await
            .unwrap();
        let day = registry
            .create_schedule("09:00 AM".parse().unwrap(), "06:00 PM".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(registry.headcount().await.unwrap(), 0);

        let hired = registry
            .hire(
                &ana.id,
                HireRequest {
                    position_id: cook.id.clone(),
                    schedule_id: day.id.clone(),
                    hired_date: None,
                    contract_end_date: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(hired.role, EmployeeRole::Employee);
        assert_eq!(hired.position.unwrap().rate, dec!(80));
        assert_eq!(hired.hired_date, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(registry.headcount().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn reference_data_validation() {
        let registry = setup();
        assert!(registry
            .create_position(Position { title: "Cook".into(), rate: dec!(0) })
            .await
            .is_err());
        assert!(registry
            .create_schedule("06:00 PM".parse().unwrap(), "09:00 AM".parse().unwrap())
            .await
            .is_err());
        registry
            .create_leave_type(NewLeaveType { name: "Sick Leave".into(), payed: true })
            .await
            .unwrap();
        assert!(registry
            .create_leave_type(NewLeaveType { name: "Sick Leave".into(), payed: false })
            .await
            .is_err());
        let err = registry.delete_deduction("missing").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
