// src/routes.rs

use axum::{
    extract::{Path, State},
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::attendance::{AttendanceService, ClockRequest};
use crate::clock::{Clock, TimeOfDay};
use crate::config::AppConfig;
use crate::error::{AppError, REQUEST_SUCCESS};
use crate::leave::{
    ApproveRequest, CancelRequest, LeaveDecision, LeaveService, LeaveSubmission, RejectRequest,
};
use crate::models::*;
use crate::notifier::Notifier;
use crate::payroll::{PayrollClose, PayrollService};
use crate::registry::{HireRequest, NewAccount, NewDeduction, NewLeaveType, Registry};
use crate::store::RecordStore;

#[derive(Clone)]
pub struct AppState {
    pub clock: Arc<dyn Clock>,
    pub registry: Arc<Registry>,
    pub attendance: Arc<AttendanceService>,
    pub payroll: Arc<PayrollService>,
    pub leave: Arc<LeaveService>,
}

impl AppState {
    /// Wires the services over a shared store, clock and notifier.
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let delivery = config.delivery_policy();
        let registry = Arc::new(Registry::new(store.clone(), clock.clone()));
        let payroll = Arc::new(PayrollService::new(
            store.clone(),
            clock.clone(),
            notifier.clone(),
            delivery,
            config.payroll_rules(),
        ));
        let attendance = Arc::new(AttendanceService::new(
            store.clone(),
            clock.clone(),
            registry.clone(),
            payroll.clone(),
            config.clock_classifier(),
        ));
        let leave = Arc::new(LeaveService::new(
            store,
            clock.clone(),
            notifier,
            delivery,
            config.leave_rules(),
        ));
        Self {
            clock,
            registry,
            attendance,
            payroll,
            leave,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/attendance", get(list_attendance))
        .route("/attendance/timein", post(time_in))
        .route("/attendance/timeout", post(time_out))
        .route("/payrolls", get(list_payrolls))
        .route("/payrolls/{id}", patch(close_payroll))
        .route("/payrolls/{id}/preview", get(preview_payroll))
        .route("/leaves", get(list_leaves).post(submit_leave))
        .route("/leaves/employee/{id}", get(list_employee_leaves))
        .route("/leaves/{id}/approve", post(approve_leave))
        .route("/leaves/{id}/reject", post(reject_leave))
        .route("/leaves/{id}/cancel", post(cancel_leave))
        .route("/leave-types", get(list_leave_types).post(create_leave_type))
        .route("/leave-types/{id}", delete(delete_leave_type))
        .route("/deductions", get(list_deductions).post(create_deduction))
        .route("/deductions/{id}", delete(delete_deduction))
        .route("/positions", get(list_positions).post(create_position))
        .route("/positions/{id}", delete(delete_position))
        .route("/schedules", get(list_schedules).post(create_schedule))
        .route("/schedules/{id}", delete(delete_schedule))
        .route("/users", get(list_users).post(register_user))
        .route("/users/{id}/hire", post(hire_user));

    Router::new()
        .route("/status", get(handle_status))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// --- Status ---

#[derive(Debug, Serialize)]
struct StatusReport {
    employees: u32,
    open_payrolls: usize,
    waiting_leaves: usize,
    server_time: String,
}

async fn handle_status(State(state): State<AppState>) -> Result<Json<StatusReport>, AppError> {
    info!("Handling /status request...");
    let employees = state.registry.headcount().await?;
    let open_payrolls = state
        .payroll
        .cycles()
        .await?
        .iter()
        .filter(|c| c.is_open())
        .count();
    let waiting_leaves = state
        .leave
        .leaves()
        .await?
        .iter()
        .filter(|l| l.status == LeaveStatus::Waiting)
        .count();
    Ok(Json(StatusReport {
        employees,
        open_payrolls,
        waiting_leaves,
        server_time: state.clock.now().format("%Y-%m-%d %H:%M:%S").to_string(),
    }))
}

// --- Attendance ---

async fn time_in(
    State(state): State<AppState>,
    Json(req): Json<ClockRequest>,
) -> Result<&'static str, AppError> {
    state.attendance.time_in(&req).await?;
    Ok(REQUEST_SUCCESS)
}

async fn time_out(
    State(state): State<AppState>,
    Json(req): Json<ClockRequest>,
) -> Result<&'static str, AppError> {
    state.attendance.time_out(&req).await?;
    Ok(REQUEST_SUCCESS)
}

async fn list_attendance(
    State(state): State<AppState>,
) -> Result<Json<Vec<AttendanceRecord>>, AppError> {
    Ok(Json(state.attendance.records().await?))
}

// --- Payroll ---

async fn list_payrolls(State(state): State<AppState>) -> Result<Json<Vec<PayrollCycle>>, AppError> {
    Ok(Json(state.payroll.cycles().await?))
}

async fn preview_payroll(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PayrollCycle>, AppError> {
    Ok(Json(state.payroll.preview(&id).await?))
}

async fn close_payroll(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PayrollClose>, AppError> {
    Ok(Json(state.payroll.close(&id).await?))
}

// --- Leave ---

async fn list_leaves(State(state): State<AppState>) -> Result<Json<Vec<LeaveRequest>>, AppError> {
    Ok(Json(state.leave.leaves().await?))
}

async fn list_employee_leaves(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<LeaveRequest>>, AppError> {
    Ok(Json(state.leave.leaves_for(&id).await?))
}

async fn submit_leave(
    State(state): State<AppState>,
    Json(req): Json<LeaveSubmission>,
) -> Result<Json<LeaveRequest>, AppError> {
    Ok(Json(state.leave.submit(req).await?))
}

async fn approve_leave(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ApproveRequest>,
) -> Result<Json<LeaveDecision>, AppError> {
    Ok(Json(state.leave.approve(&id, req).await?))
}

async fn reject_leave(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RejectRequest>,
) -> Result<Json<LeaveDecision>, AppError> {
    Ok(Json(state.leave.reject(&id, req).await?))
}

async fn cancel_leave(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<LeaveRequest>, AppError> {
    Ok(Json(state.leave.cancel(&id, req).await?))
}

// --- Reference data ---

async fn list_leave_types(State(state): State<AppState>) -> Result<Json<Vec<LeaveType>>, AppError> {
    Ok(Json(state.registry.leave_types().await?))
}

async fn create_leave_type(
    State(state): State<AppState>,
    Json(req): Json<NewLeaveType>,
) -> Result<Json<LeaveType>, AppError> {
    Ok(Json(state.registry.create_leave_type(req).await?))
}

async fn delete_leave_type(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<&'static str, AppError> {
    state.registry.delete_leave_type(&id).await?;
    Ok(REQUEST_SUCCESS)
}

async fn list_deductions(State(state): State<AppState>) -> Result<Json<Vec<Deduction>>, AppError> {
    Ok(Json(state.registry.deductions().await?))
}

async fn create_deduction(
    State(state): State<AppState>,
    Json(req): Json<NewDeduction>,
) -> Result<Json<Deduction>, AppError> {
    Ok(Json(state.registry.create_deduction(req).await?))
}

async fn delete_deduction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<&'static str, AppError> {
    state.registry.delete_deduction(&id).await?;
    Ok(REQUEST_SUCCESS)
}

async fn list_positions(
    State(state): State<AppState>,
) -> Result<Json<Vec<PositionEntry>>, AppError> {
    Ok(Json(state.registry.positions().await?))
}

async fn create_position(
    State(state): State<AppState>,
    Json(req): Json<Position>,
) -> Result<Json<PositionEntry>, AppError> {
    Ok(Json(state.registry.create_position(req).await?))
}

async fn delete_position(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<&'static str, AppError> {
    state.registry.delete_position(&id).await?;
    Ok(REQUEST_SUCCESS)
}

#[derive(Debug, Deserialize)]
struct NewSchedule {
    timein: TimeOfDay,
    timeout: TimeOfDay,
}

async fn list_schedules(
    State(state): State<AppState>,
) -> Result<Json<Vec<ScheduleEntry>>, AppError> {
    Ok(Json(state.registry.schedules().await?))
}

async fn create_schedule(
    State(state): State<AppState>,
    Json(req): Json<NewSchedule>,
) -> Result<Json<ScheduleEntry>, AppError> {
    Ok(Json(
        state
            .registry
            .create_schedule(req.timein, req.timeout)
            .await?,
    ))
}

async fn delete_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<&'static str, AppError> {
    state.registry.delete_schedule(&id).await?;
    Ok(REQUEST_SUCCESS)
}

// --- Users ---

async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<Employee>>, AppError> {
    Ok(Json(state.registry.accounts().await?))
}

async fn register_user(
    State(state): State<AppState>,
    Json(req): Json<NewAccount>,
) -> Result<Json<Employee>, AppError> {
    Ok(Json(state.registry.register(req).await?))
}

async fn hire_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<HireRequest>,
) -> Result<Json<Employee>, AppError> {
    Ok(Json(state.registry.hire(&id, req).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::notifier::MockNotifier;
    use crate::store::InMemoryStore;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn test_app() -> (Router, TestClock) {
        let clock = TestClock::new("2024-03-04 08:58:00");
        let state = AppState::new(
            &AppConfig::default(),
            Arc::new(InMemoryStore::new()),
            Arc::new(clock.clone()),
            Arc::new(MockNotifier::new()),
        );
        (router(state), clock)
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, String) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(v) => Body::from(v.to_string()),
                None => Body::empty(),
            })
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    async fn hired_employee(app: &Router) -> String {
        let (_, position) = call(
            app,
            Method::POST,
            "/api/positions",
            Some(json!({"title": "Cook", "rate": "100"})),
        )
        .await;
        let position: Value = serde_json::from_str(&position).unwrap();
        let (_, schedule) = call(
            app,
            Method::POST,
            "/api/schedules",
            Some(json!({"timein": "09:00 AM", "timeout": "06:00 PM"})),
        )
        .await;
        let schedule: Value = serde_json::from_str(&schedule).unwrap();
        let (status, user) = call(
            app,
            Method::POST,
            "/api/users",
            Some(json!({"name": "Ana", "email": "ana@example.com", "username": "ana", "password": "pw"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let user: Value = serde_json::from_str(&user).unwrap();
        let id = user["id"].as_str().unwrap().to_string();
        let (status, _) = call(
            app,
            Method::POST,
            &format!("/api/users/{}/hire", id),
            Some(json!({"position_id": position["id"], "schedule_id": schedule["id"]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        id
    }

    #[tokio::test]
    async fn status_reports_counts() {
        let (app, _clock) = test_app();
        let (status, body) = call(&app, Method::GET, "/status", None).await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["employees"], 0);
        assert_eq!(json["server_time"], "2024-03-04 08:58:00");
    }

    #[tokio::test]
    async fn clock_in_twice_returns_401_timein() {
        let (app, _clock) = test_app();
        hired_employee(&app).await;
        let creds = json!({"username": "ana", "password": "pw"});

        let (status, body) =
            call(&app, Method::POST, "/api/attendance/timein", Some(creds.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, REQUEST_SUCCESS);

        let (status, body) = call(&app, Method::POST, "/api/attendance/timein", Some(creds)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json, json!({"type": "timein", "message": "You are already time in."}));
    }

    #[tokio::test]
    async fn bad_credentials_name_the_field() {
        let (app, _clock) = test_app();
        hired_employee(&app).await;

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/attendance/timeout",
            Some(json!({"username": "nobody", "password": "pw"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("\"type\":\"username\""));

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/attendance/timeout",
            Some(json!({"username": "ana", "password": "nope"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("\"type\":\"password\""));
    }

    #[tokio::test]
    async fn clock_out_then_pay_over_http() {
        let (app, clock) = test_app();
        hired_employee(&app).await;
        let creds = json!({"username": "ana", "password": "pw"});

        call(&app, Method::POST, "/api/attendance/timein", Some(creds.clone())).await;
        clock.set_time("2024-03-04 18:02:00");
        let (status, _) = call(&app, Method::POST, "/api/attendance/timeout", Some(creds)).await;
        assert_eq!(status, StatusCode::OK);

        let (_, cycles) = call(&app, Method::GET, "/api/payrolls", None).await;
        let cycles: Value = serde_json::from_str(&cycles).unwrap();
        let cycle_id = cycles[0]["id"].as_str().unwrap().to_string();

        let uri = format!("/api/payrolls/{}", cycle_id);
        let (status, body) = call(&app, Method::PATCH, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        let paid: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(paid["status"], "paid");
        assert_eq!(paid["notification"]["result"], "delivered");

        let (status, body) = call(&app, Method::PATCH, &uri, None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body.contains("\"type\":\"payroll\""));
    }

    #[tokio::test]
    async fn unknown_payroll_is_404() {
        let (app, _clock) = test_app();
        let (status, _) = call(&app, Method::GET, "/api/payrolls/missing/preview", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
