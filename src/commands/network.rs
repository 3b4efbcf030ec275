use serde_json::Value;

use crate::db::DbState;
use crate::network;
use crate::scope::Identity;
use crate::PosError;

pub fn network_register_omc(
    db: &DbState,
    identity: &Identity,
    arg0: Option<Value>,
) -> Result<Value, PosError> {
    let payload = arg0.unwrap_or_else(|| serde_json::json!({}));
    network::register_party(db, identity, "omc", &payload)
}

pub fn network_register_dealer(
    db: &DbState,
    identity: &Identity,
    arg0: Option<Value>,
) -> Result<Value, PosError> {
    let payload = arg0.unwrap_or_else(|| serde_json::json!({}));
    network::register_party(db, identity, "dealer", &payload)
}

pub fn network_register_station(
    db: &DbState,
    identity: &Identity,
    arg0: Option<Value>,
) -> Result<Value, PosError> {
    let payload = arg0.unwrap_or_else(|| serde_json::json!({}));
    network::register_party(db, identity, "station", &payload)
}

pub fn network_register_product(
    db: &DbState,
    identity: &Identity,
    arg0: Option<Value>,
) -> Result<Value, PosError> {
    let payload = arg0.unwrap_or_else(|| serde_json::json!({}));
    network::register_product(db, identity, &payload)
}

pub fn network_register_pump(
    db: &DbState,
    identity: &Identity,
    arg0: Option<Value>,
) -> Result<Value, PosError> {
    let payload = arg0.unwrap_or_else(|| serde_json::json!({}));
    network::register_pump(db, identity, &payload)
}

pub fn network_set_station_price(
    db: &DbState,
    identity: &Identity,
    arg0: Option<Value>,
) -> Result<Value, PosError> {
    let payload = arg0.unwrap_or_else(|| serde_json::json!({}));
    network::set_station_price(db, identity, &payload)
}

/// Accept either a filter object or a bare station-id string.
pub fn network_list_pumps(
    db: &DbState,
    identity: &Identity,
    arg0: Option<Value>,
) -> Result<Value, PosError> {
    let payload = match arg0 {
        Some(Value::String(station_id)) => serde_json::json!({ "stationId": station_id }),
        Some(v) => v,
        None => serde_json::json!({}),
    };
    network::list_pumps(db, identity, &payload)
}

pub fn network_list_products(db: &DbState) -> Result<Value, PosError> {
    network::list_products(db)
}
