use serde_json::Value;

use crate::db::DbState;
use crate::deposits;
use crate::scope::Identity;
use crate::PosError;

/// Accept either `{ "depositId": ... }` or a bare deposit-id string.
fn normalize_deposit_payload(arg0: Option<Value>) -> Value {
    match arg0 {
        Some(Value::String(deposit_id)) => serde_json::json!({ "depositId": deposit_id }),
        Some(v) => v,
        None => serde_json::json!({}),
    }
}

pub fn deposits_create(
    db: &DbState,
    identity: &Identity,
    arg0: Option<Value>,
) -> Result<Value, PosError> {
    let payload = arg0.unwrap_or_else(|| serde_json::json!({}));
    deposits::create_deposit(db, identity, &payload)
}

pub fn deposits_confirm(
    db: &DbState,
    identity: &Identity,
    arg0: Option<Value>,
) -> Result<Value, PosError> {
    let payload = normalize_deposit_payload(arg0);
    deposits::confirm_deposit(db, identity, &payload)
}

pub fn deposits_reconcile(
    db: &DbState,
    identity: &Identity,
    arg0: Option<Value>,
) -> Result<Value, PosError> {
    let payload = normalize_deposit_payload(arg0);
    deposits::reconcile_deposit(db, identity, &payload)
}

pub fn deposits_update(
    db: &DbState,
    identity: &Identity,
    arg0: Option<Value>,
) -> Result<Value, PosError> {
    let payload = normalize_deposit_payload(arg0);
    deposits::update_deposit(db, identity, &payload)
}

pub fn deposits_delete(
    db: &DbState,
    identity: &Identity,
    arg0: Option<Value>,
) -> Result<Value, PosError> {
    let payload = normalize_deposit_payload(arg0);
    deposits::delete_deposit(db, identity, &payload)
}

pub fn deposits_list(
    db: &DbState,
    identity: &Identity,
    arg0: Option<Value>,
) -> Result<Value, PosError> {
    let payload = arg0.unwrap_or_else(|| serde_json::json!({}));
    deposits::list_deposits(db, identity, &payload)
}

/// Undeposited-cash context for the deposit form: collected cash vs what
/// the active deposits already cover.
pub fn deposits_get_context(
    db: &DbState,
    identity: &Identity,
    arg0: Option<Value>,
) -> Result<Value, PosError> {
    let payload = match arg0 {
        Some(Value::String(station_id)) => serde_json::json!({ "stationId": station_id }),
        Some(v) => v,
        None => serde_json::json!({}),
    };
    deposits::deposit_context(db, identity, &payload)
}
