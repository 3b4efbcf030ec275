//! Meter-transaction calculator.
//!
//! Pure functions turning two pump meter readings and a resolved unit price
//! into a validated sale computation. No store access here — price
//! resolution and the atomic pump-meter advance live in [`crate::sales`].
//!
//! **Rules:**
//! - `closing_meter >= opening_meter` — volume can never be negative
//! - `litres_sold = closing - opening` (derived, never supplied)
//! - `total_amount = litres_sold * unit_price`
//! - `variance = cash_received - total_amount` (positive = overage)
//! - cash defaults to the computed total when the attendant does not
//!   override it, making variance zero on that path

use serde::Serialize;

use crate::PosError;

/// Result of a successful meter computation. Currency fields are rounded to
/// 2 decimal places; volume is kept at full precision.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleComputation {
    pub litres_sold: f64,
    pub total_amount: f64,
    pub cash_received: f64,
    pub variance: f64,
}

/// Round a currency amount to 2 decimal places.
pub fn round2(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Compute volume, total, and variance from meter readings and a price.
///
/// `cash_received = None` means the attendant did not override cash; it
/// defaults to the computed total. Re-run this whenever opening, closing,
/// or the selected product (hence price) changes.
pub fn compute_sale(
    opening_meter: f64,
    closing_meter: f64,
    unit_price: f64,
    cash_received: Option<f64>,
) -> Result<SaleComputation, PosError> {
    if opening_meter < 0.0 || closing_meter < 0.0 {
        return Err(PosError::validation(
            "Meter readings cannot be negative",
        ));
    }
    if !opening_meter.is_finite() || !closing_meter.is_finite() || !unit_price.is_finite() {
        return Err(PosError::validation("Meter readings and price must be numbers"));
    }
    if closing_meter < opening_meter {
        return Err(PosError::validation(
            "Closing meter cannot be less than opening meter",
        ));
    }
    if unit_price <= 0.0 {
        return Err(PosError::validation("Unit price must be greater than zero"));
    }
    if let Some(cash) = cash_received {
        if cash < 0.0 {
            return Err(PosError::validation("Cash received cannot be negative"));
        }
    }

    let litres_sold = closing_meter - opening_meter;
    let total_amount = round2(litres_sold * unit_price);
    let cash = round2(cash_received.unwrap_or(total_amount));
    let variance = round2(cash - total_amount);

    Ok(SaleComputation {
        litres_sold,
        total_amount,
        cash_received: cash,
        variance,
    })
}

// ===========================================================================
// Tests
// ===========================================================================
