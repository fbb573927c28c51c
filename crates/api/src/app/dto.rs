use chrono::NaiveDate;
use serde::Deserialize;

use millbook_infra::projections::{
    ArrivalRegisterEntry, DriverRosterEntry, GodownRegisterEntry, MandiDirectoryEntry,
    StockRegister, UserRecord, VehicleRegistryEntry,
};
use millbook_stock::DayEntry;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub mill_id: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterMandiRequest {
    pub name: String,
    pub distance_km: f64,
}

#[derive(Debug, Deserialize)]
pub struct ChangeDistanceRequest {
    pub distance_km: f64,
}

#[derive(Debug, Deserialize)]
pub struct RegisterDriverRequest {
    pub name: String,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePhoneRequest {
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterVehicleRequest {
    pub registration: String,
    pub owner_name: Option<String>,
    pub puc_expiry: Option<NaiveDate>,
    pub permit_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateVehicleRequest {
    pub owner_name: Option<String>,
    pub puc_expiry: Option<NaiveDate>,
    pub permit_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterGodownRequest {
    pub name: String,
    pub capacity_quintals: i64,
}

#[derive(Debug, Deserialize)]
pub struct ChangeCapacityRequest {
    pub capacity_quintals: i64,
}

#[derive(Debug, Deserialize)]
pub struct RecordArrivalRequest {
    pub date: NaiveDate,
    pub season: String,
    pub ac_note: Option<String>,
    pub mandi_id: String,
    /// Override for the mandi's registered distance (pre-filled on the form).
    pub distance_km: Option<f64>,
    pub vehicle_id: String,
    pub driver_id: String,
    pub bag_count: u32,
    pub weight_kg: i64,
}

#[derive(Debug, Deserialize)]
pub struct AmendArrivalRequest {
    pub ac_note: Option<String>,
    pub mandi_id: String,
    pub distance_km: Option<f64>,
    pub vehicle_id: String,
    pub driver_id: String,
    pub bag_count: u32,
    pub weight_kg: i64,
}

#[derive(Debug, Deserialize)]
pub struct SeasonQuery {
    pub season: String,
}

#[derive(Debug, Deserialize)]
pub struct SeedOpeningRequest {
    pub season: String,
    pub date: NaiveDate,
    pub quantity_kg: i64,
}

#[derive(Debug, Deserialize)]
pub struct RecordIssueRequest {
    pub season: String,
    pub date: NaiveDate,
    pub quantity_kg: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub display_name: String,
    pub password: String,
    pub initial_roles: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct SetPasswordRequest {
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignRoleRequest {
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct SuspendUserRequest {
    pub reason: Option<String>,
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn mandi_to_json(e: MandiDirectoryEntry) -> serde_json::Value {
    serde_json::json!({
        "id": e.mandi_id.0.to_string(),
        "name": e.name,
        "distance_km": e.distance.km(),
    })
}

pub fn driver_to_json(e: DriverRosterEntry) -> serde_json::Value {
    serde_json::json!({
        "id": e.driver_id.0.to_string(),
        "name": e.name,
        "phone": e.phone,
    })
}

pub fn vehicle_to_json(e: VehicleRegistryEntry, today: NaiveDate) -> serde_json::Value {
    let puc_valid = e.puc_valid_on(today);
    serde_json::json!({
        "id": e.vehicle_id.0.to_string(),
        "registration": e.registration,
        "owner_name": e.owner_name,
        "puc_expiry": e.puc_expiry.map(|d| d.to_string()),
        "puc_valid": puc_valid,
        "permit_number": e.permit_number,
    })
}

pub fn godown_to_json(e: GodownRegisterEntry) -> serde_json::Value {
    serde_json::json!({
        "id": e.godown_id.0.to_string(),
        "name": e.name,
        "capacity_kg": e.capacity.kg(),
        "capacity_quintals": e.capacity.as_quintals(),
    })
}

pub fn arrival_to_json(e: ArrivalRegisterEntry) -> serde_json::Value {
    serde_json::json!({
        "id": e.arrival_id.0.to_string(),
        "date": e.date.to_string(),
        "season": e.season.label(),
        "ac_note": e.ac_note,
        "mandi_id": e.mandi_id.0.to_string(),
        "mandi_name": e.mandi_name,
        "distance_km": e.distance.km(),
        "vehicle_id": e.vehicle_id.0.to_string(),
        "vehicle_registration": e.vehicle_registration,
        "driver_id": e.driver_id.0.to_string(),
        "driver_name": e.driver_name,
        "bag_count": e.bag_count,
        "weight_kg": e.weight.kg(),
        "weight_quintals": e.weight.as_quintals(),
        "expected_weight_kg": e.expected_weight.kg(),
        "variance_kg": e.variance.kg(),
        "within_tolerance": e.within_tolerance,
    })
}

pub fn day_entry_to_json(e: &DayEntry) -> serde_json::Value {
    serde_json::json!({
        "date": e.date.to_string(),
        "opening_kg": e.opening.kg(),
        "received_kg": e.received.kg(),
        "total_kg": e.total.kg(),
        "issued_kg": e.issued.kg(),
        "closing_kg": e.closing.kg(),
        "cumulative_received_kg": e.cumulative_received.kg(),
        "cumulative_issued_kg": e.cumulative_issued.kg(),
        "closing_quintals": e.closing.as_quintals(),
    })
}

pub fn register_to_json(r: &StockRegister) -> serde_json::Value {
    let summary = r.summary().map(|s| {
        serde_json::json!({
            "total_received_kg": s.total_received.kg(),
            "total_issued_kg": s.total_issued.kg(),
            "opening_stock_kg": s.opening_stock.kg(),
            "current_closing_kg": s.current_closing.kg(),
            "current_closing_quintals": s.current_closing.as_quintals(),
        })
    });

    serde_json::json!({
        "season": r.season().label(),
        "rows": r.entries().iter().map(day_entry_to_json).collect::<Vec<_>>(),
        "summary": summary,
    })
}

pub fn user_to_json(u: UserRecord) -> serde_json::Value {
    serde_json::json!({
        "id": u.user_id.to_string(),
        "username": u.username,
        "display_name": u.display_name,
        "roles": u.roles,
        "status": match u.status {
            millbook_auth::UserStatus::Active => "active",
            millbook_auth::UserStatus::Suspended => "suspended",
        },
        "created_at": u.created_at.to_rfc3339(),
        "updated_at": u.updated_at.to_rfc3339(),
    })
}
