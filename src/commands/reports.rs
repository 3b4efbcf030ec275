use serde::Deserialize;
use serde_json::Value;

use crate::db::DbState;
use crate::fingerprint;
use crate::scope::Identity;
use crate::summary;
use crate::PosError;

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct VerifySnapshotPayload {
    #[serde(alias = "snapshot_id", alias = "id")]
    snapshot_id: String,
    #[serde(alias = "fingerprint")]
    hash: String,
}

/// Accept either a full filter object or a bare station-id string.
fn normalize_report_payload(arg0: Option<Value>) -> Value {
    match arg0 {
        Some(Value::String(station_id)) => serde_json::json!({ "stationId": station_id }),
        Some(v) => v,
        None => serde_json::json!({}),
    }
}

/// Period summary: totals, average ticket, growth, top performers.
pub fn reports_get_summary(
    db: &DbState,
    identity: &Identity,
    arg0: Option<Value>,
) -> Result<Value, PosError> {
    let payload = normalize_report_payload(arg0);
    summary::summarize(db, identity, &payload)
}

pub fn reports_get_sales_trend(
    db: &DbState,
    identity: &Identity,
    arg0: Option<Value>,
) -> Result<Value, PosError> {
    let payload = normalize_report_payload(arg0);
    summary::sales_trend(db, identity, &payload)
}

pub fn reports_get_payment_breakdown(
    db: &DbState,
    identity: &Identity,
    arg0: Option<Value>,
) -> Result<Value, PosError> {
    let payload = normalize_report_payload(arg0);
    summary::payment_breakdown(db, identity, &payload)
}

/// Freeze (or fetch, when it already exists) the daily report snapshot for
/// a station and fingerprint it for external sharing.
pub fn reports_generate_snapshot(
    db: &DbState,
    identity: &Identity,
    arg0: Option<Value>,
) -> Result<Value, PosError> {
    let payload = normalize_report_payload(arg0);
    fingerprint::generate_snapshot(db, identity, &payload)
}

/// Check an externally supplied fingerprint against the stored snapshot.
pub fn reports_verify_snapshot(
    db: &DbState,
    identity: &Identity,
    arg0: Option<Value>,
) -> Result<Value, PosError> {
    let payload = arg0.unwrap_or_else(|| serde_json::json!({}));
    let parsed: VerifySnapshotPayload = serde_json::from_value(payload.clone())
        .map_err(|e| PosError::validation(format!("Invalid verify payload: {e}")))?;
    if parsed.snapshot_id.trim().is_empty() || parsed.hash.trim().is_empty() {
        return Err(PosError::validation("Missing snapshotId or hash"));
    }
    fingerprint::verify_snapshot(db, identity, &payload)
}

#[cfg(test)]
mod dto_tests {
    use super::*;

    #[test]
    fn normalize_report_payload_supports_station_string() {
        let payload = normalize_report_payload(Some(serde_json::json!("st-4")));
        assert_eq!(
            payload.get("stationId").and_then(|v| v.as_str()),
            Some("st-4")
        );
    }

    #[test]
    fn verify_payload_supports_aliases() {
        let parsed: VerifySnapshotPayload = serde_json::from_value(serde_json::json!({
            "snapshot_id": "snap-1",
            "fingerprint": "0A1B2C3D",
        }))
        .expect("aliases should parse");
        assert_eq!(parsed.snapshot_id, "snap-1");
        assert_eq!(parsed.hash, "0A1B2C3D");
    }
}
