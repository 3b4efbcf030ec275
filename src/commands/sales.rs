use serde::Deserialize;
use serde_json::Value;

use crate::db::DbState;
use crate::sales;
use crate::scope::Identity;
use crate::PosError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaleIdPayload {
    #[serde(alias = "sale_id", alias = "id")]
    sale_id: String,
}

/// Accept either `{ "saleId": ... }` or a bare sale-id string.
fn normalize_sale_payload(arg0: Option<Value>) -> Value {
    match arg0 {
        Some(Value::String(sale_id)) => serde_json::json!({ "saleId": sale_id }),
        Some(v) => v,
        None => serde_json::json!({}),
    }
}

fn parse_sale_id(arg0: Option<Value>) -> Result<String, PosError> {
    let payload = normalize_sale_payload(arg0);
    let parsed: SaleIdPayload = serde_json::from_value(payload)
        .map_err(|e| PosError::validation(format!("Invalid sale payload: {e}")))?;
    let sale_id = parsed.sale_id.trim().to_string();
    if sale_id.is_empty() {
        return Err(PosError::validation("Missing saleId"));
    }
    Ok(sale_id)
}

/// Recompute the sale preview for the current form inputs. Pure; called on
/// every meter/product/price change.
pub fn sales_compute_preview(
    db: &DbState,
    identity: &Identity,
    arg0: Option<Value>,
) -> Result<Value, PosError> {
    let payload = arg0.unwrap_or_else(|| serde_json::json!({}));
    sales::compute_preview(db, identity, &payload)
}

pub fn sales_create(
    db: &DbState,
    identity: &Identity,
    arg0: Option<Value>,
) -> Result<Value, PosError> {
    let payload = arg0.unwrap_or_else(|| serde_json::json!({}));
    sales::create_sale(db, identity, &payload)
}

pub fn sales_update(
    db: &DbState,
    identity: &Identity,
    arg0: Option<Value>,
) -> Result<Value, PosError> {
    let payload = normalize_sale_payload(arg0);
    sales::update_sale(db, identity, &payload)
}

pub fn sales_void(
    db: &DbState,
    identity: &Identity,
    arg0: Option<Value>,
) -> Result<Value, PosError> {
    let payload = normalize_sale_payload(arg0);
    sales::void_sale(db, identity, &payload)
}

pub fn sales_list(
    db: &DbState,
    identity: &Identity,
    arg0: Option<Value>,
) -> Result<Value, PosError> {
    let payload = arg0.unwrap_or_else(|| serde_json::json!({}));
    sales::list_sales(db, identity, &payload)
}

pub fn sales_get(
    db: &DbState,
    identity: &Identity,
    arg0: Option<Value>,
) -> Result<Value, PosError> {
    let sale_id = parse_sale_id(arg0)?;
    sales::get_sale(db, identity, &sale_id)
}

#[cfg(test)]
mod dto_tests {
    use super::*;

    #[test]
    fn parse_sale_id_supports_string_and_object() {
        let from_string = parse_sale_id(Some(serde_json::json!("sale-1")))
            .expect("string sale payload should parse");
        let from_object = parse_sale_id(Some(serde_json::json!({ "saleId": "sale-2" })))
            .expect("object sale payload should parse");
        let from_alias = parse_sale_id(Some(serde_json::json!({ "sale_id": "sale-3" })))
            .expect("snake_case alias should parse");
        assert_eq!(from_string, "sale-1");
        assert_eq!(from_object, "sale-2");
        assert_eq!(from_alias, "sale-3");
    }

    #[test]
    fn parse_sale_id_rejects_empty() {
        assert!(parse_sale_id(Some(serde_json::json!("  "))).is_err());
        assert!(parse_sale_id(None).is_err());
    }
}
