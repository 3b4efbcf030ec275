//! Sales aggregation for dashboards and period reports.
//!
//! A pure fold over a consistent snapshot of scoped sale rows: totals,
//! average ticket, day-over-day growth, and top performers. Cancelled and
//! voided sales are excluded from every total but counted separately for
//! audit visibility. All rankings are deterministic — ties go to the first
//! key encountered in transaction order — so re-running a summary over the
//! same sale set always yields identical results.

use chrono::{Duration, NaiveDate};
use rusqlite::params_from_iter;
use serde_json::Value;
use tracing::warn;

use crate::db::DbState;
use crate::meter::round2;
use crate::scope::{self, Identity};
use crate::{value_i64, value_str, PosError};

// ---------------------------------------------------------------------------
// Row snapshot
// ---------------------------------------------------------------------------

struct SaleRow {
    station_id: String,
    pump_id: String,
    pump_number: i64,
    product_id: String,
    litres_sold: f64,
    total_amount: f64,
    payment_method: String,
    status: String,
    is_void: bool,
    day: String,
}

impl SaleRow {
    fn counts(&self) -> bool {
        self.status != "cancelled" && !self.is_void
    }
}

/// Fetch every scoped sale row for the given day range in one statement,
/// oldest first, so the fold sees a consistent snapshot in transaction
/// order.
fn fetch_rows(
    conn: &rusqlite::Connection,
    identity: &Identity,
    station_filter: Option<&str>,
    from_day: &str,
    to_day: &str,
) -> Result<Vec<SaleRow>, PosError> {
    let scope_filter = scope::scope_filter(identity)?;
    let (clause, scope_params) = scope_filter.sql("station_id");

    let mut conditions = vec![
        clause,
        "substr(transaction_time, 1, 10) >= ?".to_string(),
        "substr(transaction_time, 1, 10) <= ?".to_string(),
    ];
    let mut bind: Vec<String> = scope_params;
    bind.push(from_day.to_string());
    bind.push(to_day.to_string());

    if let Some(station_id) = station_filter {
        scope::authorize_station(conn, identity, station_id)?;
        conditions.push("station_id = ?".to_string());
        bind.push(station_id.to_string());
    }

    let sql = format!(
        "SELECT station_id, pump_id, pump_number, product_id, litres_sold,
                total_amount, payment_method, status, is_void,
                substr(transaction_time, 1, 10)
         FROM sales WHERE {} ORDER BY transaction_time ASC, id ASC",
        conditions.join(" AND ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(bind.iter()), |row| {
        Ok(SaleRow {
            station_id: row.get(0)?,
            pump_id: row.get(1)?,
            pump_number: row.get(2)?,
            product_id: row.get(3)?,
            litres_sold: row.get(4)?,
            total_amount: row.get(5)?,
            payment_method: row.get(6)?,
            status: row.get(7)?,
            is_void: row.get::<_, i64>(8)? != 0,
            day: row.get(9)?,
        })
    })?;

    let mut out = Vec::new();
    for row in rows {
        match row {
            Ok(r) => out.push(r),
            Err(e) => warn!("skipping malformed sale row: {e}"),
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Stable rankings
// ---------------------------------------------------------------------------

/// Revenue accumulator preserving first-encountered key order.
struct Ranking {
    order: Vec<(String, f64)>,
    index: std::collections::HashMap<String, usize>,
}

impl Ranking {
    fn new() -> Self {
        Ranking {
            order: Vec::new(),
            index: std::collections::HashMap::new(),
        }
    }

    fn add(&mut self, key: &str, amount: f64) {
        match self.index.get(key) {
            Some(&i) => self.order[i].1 += amount,
            None => {
                self.index.insert(key.to_string(), self.order.len());
                self.order.push((key.to_string(), amount));
            }
        }
    }

    /// Maximum by revenue; ties keep the earliest key (strictly-greater
    /// comparison over insertion order).
    fn top(&self) -> Option<(String, f64)> {
        let mut best: Option<(&str, f64)> = None;
        for (key, amount) in &self.order {
            match best {
                Some((_, b)) if *amount <= b => {}
                _ => best = Some((key.as_str(), *amount)),
            }
        }
        best.map(|(k, v)| (k.to_string(), round2(v)))
    }
}

fn top_json(ranking: &Ranking, key_name: &str) -> Value {
    match ranking.top() {
        Some((key, revenue)) => serde_json::json!({ key_name: key, "revenue": revenue }),
        None => Value::Null,
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

fn previous_day(day: &str) -> Result<String, PosError> {
    let date = NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|_| PosError::validation(format!("Invalid date: {day}")))?;
    Ok((date - Duration::days(1)).format("%Y-%m-%d").to_string())
}

fn resolve_day(payload: &Value, keys: &[&str]) -> Option<String> {
    value_str(payload, keys)
}

/// Summarize scoped sales for a day window.
///
/// `date` (default: today, local) is the reference day for the
/// day-over-day growth figure; `fromDate`/`toDate` (default: the reference
/// day) bound the totals and rankings.
pub fn summarize(db: &DbState, identity: &Identity, payload: &Value) -> Result<Value, PosError> {
    let conn = db.conn.lock()?;

    let date = resolve_day(payload, &["date"])
        .unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d").to_string());
    let from_day = resolve_day(payload, &["fromDate", "from_date"]).unwrap_or_else(|| date.clone());
    let to_day = resolve_day(payload, &["toDate", "to_date"]).unwrap_or_else(|| date.clone());
    let yesterday = previous_day(&date)?;
    let station_filter = value_str(payload, &["stationId", "station_id"]);

    // One fetch spanning the window and the growth reference days keeps the
    // whole computation on a single snapshot.
    let fetch_from = if yesterday < from_day { &yesterday } else { &from_day };
    let fetch_to = if date > to_day { &date } else { &to_day };
    let rows = fetch_rows(&conn, identity, station_filter.as_deref(), fetch_from, fetch_to)?;

    let mut total_sales = 0.0_f64;
    let mut total_volume = 0.0_f64;
    let mut total_transactions = 0_i64;
    let mut cancelled_count = 0_i64;
    let mut voided_count = 0_i64;
    let mut today_sales = 0.0_f64;
    let mut yesterday_sales = 0.0_f64;

    let mut by_product = Ranking::new();
    let mut by_station = Ranking::new();
    let mut by_pump = Ranking::new();
    let mut pump_numbers: std::collections::HashMap<String, i64> = std::collections::HashMap::new();

    for row in &rows {
        if !row.counts() {
            if row.day >= from_day && row.day <= to_day {
                if row.is_void {
                    voided_count += 1;
                }
                if row.status == "cancelled" {
                    cancelled_count += 1;
                }
            }
            continue;
        }

        if row.day == date {
            today_sales += row.total_amount;
        } else if row.day == yesterday {
            yesterday_sales += row.total_amount;
        }

        if row.day < from_day || row.day > to_day {
            continue;
        }

        total_sales += row.total_amount;
        total_volume += row.litres_sold;
        total_transactions += 1;

        by_product.add(&row.product_id, row.total_amount);
        by_station.add(&row.station_id, row.total_amount);
        by_pump.add(&row.pump_id, row.total_amount);
        pump_numbers.entry(row.pump_id.clone()).or_insert(row.pump_number);
    }

    let average_ticket = if total_transactions > 0 {
        round2(total_sales / total_transactions as f64)
    } else {
        0.0
    };

    let growth_percentage = if yesterday_sales > 0.0 {
        round2((today_sales - yesterday_sales) / yesterday_sales * 100.0)
    } else if today_sales > 0.0 {
        100.0
    } else {
        0.0
    };

    Ok(serde_json::json!({
        "success": true,
        "date": date,
        "window": { "from": from_day, "to": to_day },
        "totalSales": round2(total_sales),
        "totalVolume": total_volume,
        "totalTransactions": total_transactions,
        "averageTicket": average_ticket,
        "todaySales": round2(today_sales),
        "yesterdaySales": round2(yesterday_sales),
        "growthPercentage": growth_percentage,
        "topProduct": top_json(&by_product, "productId"),
        "topStation": top_json(&by_station, "stationId"),
        "topPump": (match by_pump.top() {
            Some((pump_id, revenue)) => serde_json::json!({
                "pumpId": pump_id,
                "pumpNumber": pump_numbers.get(&pump_id),
                "revenue": revenue,
            }),
            None => Value::Null,
        }),
        "audit": {
            "cancelledCount": cancelled_count,
            "voidedCount": voided_count,
        },
    }))
}

// ---------------------------------------------------------------------------
// Trend + payment breakdown
// ---------------------------------------------------------------------------

/// Per-day sales totals for the last `days` days ending at `endDate`.
pub fn sales_trend(db: &DbState, identity: &Identity, payload: &Value) -> Result<Value, PosError> {
    let conn = db.conn.lock()?;

    let end = resolve_day(payload, &["endDate", "end_date", "date"])
        .unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d").to_string());
    let days = value_i64(payload, &["days"]).unwrap_or(7).clamp(1, 60);
    let station_filter = value_str(payload, &["stationId", "station_id"]);

    let end_date = NaiveDate::parse_from_str(&end, "%Y-%m-%d")
        .map_err(|_| PosError::validation(format!("Invalid date: {end}")))?;
    let start = (end_date - Duration::days(days - 1))
        .format("%Y-%m-%d")
        .to_string();

    let rows = fetch_rows(&conn, identity, station_filter.as_deref(), &start, &end)?;

    let mut points: Vec<Value> = Vec::new();
    for i in 0..days {
        let day = (end_date - Duration::days(days - 1 - i))
            .format("%Y-%m-%d")
            .to_string();
        let mut sales = 0.0_f64;
        let mut volume = 0.0_f64;
        let mut count = 0_i64;
        for row in rows.iter().filter(|r| r.counts() && r.day == day) {
            sales += row.total_amount;
            volume += row.litres_sold;
            count += 1;
        }
        points.push(serde_json::json!({
            "date": day,
            "sales": round2(sales),
            "volume": volume,
            "transactions": count,
        }));
    }

    Ok(serde_json::json!({ "success": true, "data": points }))
}

/// Revenue and transaction counts per payment method over a day window.
pub fn payment_breakdown(
    db: &DbState,
    identity: &Identity,
    payload: &Value,
) -> Result<Value, PosError> {
    let conn = db.conn.lock()?;

    let date = resolve_day(payload, &["date"])
        .unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d").to_string());
    let from_day = resolve_day(payload, &["fromDate", "from_date"]).unwrap_or_else(|| date.clone());
    let to_day = resolve_day(payload, &["toDate", "to_date"]).unwrap_or_else(|| date.clone());
    let station_filter = value_str(payload, &["stationId", "station_id"]);

    let rows = fetch_rows(&conn, identity, station_filter.as_deref(), &from_day, &to_day)?;

    let mut breakdown = serde_json::Map::new();
    for method in ["cash", "mobile_money", "card", "credit"] {
        let mut total = 0.0_f64;
        let mut count = 0_i64;
        for row in rows.iter().filter(|r| r.counts() && r.payment_method == method) {
            total += row.total_amount;
            count += 1;
        }
        breakdown.insert(
            method.to_string(),
            serde_json::json!({ "count": count, "total": round2(total) }),
        );
    }

    Ok(serde_json::json!({
        "success": true,
        "window": { "from": from_day, "to": to_day },
        "data": Value::Object(breakdown),
    }))
}

// ===========================================================================
// Tests
// ===========================================================================
