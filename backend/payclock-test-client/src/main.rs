// src/main.rs

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::error::Error;

#[derive(Debug, Deserialize)]
struct StatusReport {
    employees: u32,
    open_payrolls: usize,
    waiting_leaves: usize,
    server_time: String,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let base_url =
        std::env::var("PAYCLOCK_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
    let client = Client::new();
    let suffix = std::process::id();
    let username = format!("smoke{}", suffix);

    // Test 1: Status
    println!("\n🔍 Testing status endpoint...");
    let status = client
        .get(format!("{}/status", base_url))
        .send()
        .await?
        .json::<StatusReport>()
        .await?;
    println!("Status response: {:?}", status);

    // Test 2: Reference data and a hired account
    println!("\n🔍 Creating position, schedule and account...");
    let position = client
        .post(format!("{}/api/positions", base_url))
        .json(&json!({"title": format!("Smoke Tester {}", suffix), "rate": "100"}))
        .send()
        .await?
        .json::<Created>()
        .await?;
    let schedule = client
        .post(format!("{}/api/schedules", base_url))
        .json(&json!({"timein": "12:00 AM", "timeout": "11:59 PM"}))
        .send()
        .await?
        .json::<Created>()
        .await?;
    let user = client
        .post(format!("{}/api/users", base_url))
        .json(&json!({
            "name": "Smoke Test",
            "email": format!("{}@example.com", username),
            "username": username,
            "password": "smoke-pass",
        }))
        .send()
        .await?
        .json::<Created>()
        .await?;
    let hire = client
        .post(format!("{}/api/users/{}/hire", base_url, user.id))
        .json(&json!({"position_id": position.id, "schedule_id": schedule.id}))
        .send()
        .await?;
    println!("Hire status: {}", hire.status());

    // Test 3: Wrong password is reported per field
    println!("\n🔍 Testing clock-in with a wrong password...");
    let rejected = client
        .post(format!("{}/api/attendance/timein", base_url))
        .json(&json!({"username": username, "password": "nope"}))
        .send()
        .await?;
    assert_eq!(rejected.status(), StatusCode::UNAUTHORIZED);
    let body = rejected.json::<ErrorBody>().await?;
    println!("Rejected as expected: type={}, message={}", body.kind, body.message);

    // Test 4: Clock in, clock in again, clock out
    let creds = json!({"username": username, "password": "smoke-pass"});
    println!("\n🔍 Testing clock-in...");
    let first = client
        .post(format!("{}/api/attendance/timein", base_url))
        .json(&creds)
        .send()
        .await?;
    println!("Clock-in: {} {}", first.status(), first.text().await?);

    let second = client
        .post(format!("{}/api/attendance/timein", base_url))
        .json(&creds)
        .send()
        .await?;
    println!("Second clock-in: {} {}", second.status(), second.text().await?);

    println!("\n🔍 Testing clock-out...");
    let out = client
        .post(format!("{}/api/attendance/timeout", base_url))
        .json(&creds)
        .send()
        .await?;
    println!("Clock-out: {} {}", out.status(), out.text().await?);

    // Test 5: Payroll listing
    println!("\n🔍 Listing payroll cycles...");
    let cycles = client
        .get(format!("{}/api/payrolls", base_url))
        .send()
        .await?
        .json::<serde_json::Value>()
        .await?;
    println!(
        "Payroll cycles: {}",
        cycles.as_array().map(|c| c.len()).unwrap_or_default()
    );

    let status = client
        .get(format!("{}/status", base_url))
        .send()
        .await?
        .json::<StatusReport>()
        .await?;
    println!(
        "Status after run: employees={}, open_payrolls={}, waiting_leaves={}, server_time={}",
        status.employees, status.open_payrolls, status.waiting_leaves, status.server_time
    );

    println!("\n✅ Testing complete!");

    Ok(())
}
