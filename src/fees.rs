//! Invoice balances. `paidAmount` and `status` are derived from the payment rows and
//! rewritten whenever a payment or the invoice itself changes.

use crate::crud::{self, WriteMode};
use crate::error::ApiError;
use crate::resources::{INVOICES, PAYMENTS};
use crate::scope::BranchScope;
use chrono::{Local, NaiveDate};
use rusqlite::types::Value;
use rusqlite::Connection;
use serde_json::{json, Map, Value as JsonValue};
use tracing::info;

/// Half a cent; amounts are compared after rounding to two decimals.
const EPSILON: f64 = 0.005;

fn cents(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub fn invoice_status(
    amount: f64,
    paid: f64,
    due: Option<NaiveDate>,
    today: NaiveDate,
) -> &'static str {
    if paid + EPSILON >= amount {
        "paid"
    } else if paid > EPSILON {
        "partial"
    } else if due.is_some_and(|d| d < today) {
        "overdue"
    } else {
        "pending"
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn due_date(invoice: &JsonValue) -> Option<NaiveDate> {
    invoice["dueDate"]
        .as_str()
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

fn paid_total(conn: &Connection, invoice_id: &str) -> Result<f64, ApiError> {
    let total: f64 = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0.0) FROM payments WHERE invoice_id = ?",
        [invoice_id],
        |r| r.get(0),
    )?;
    Ok(cents(total))
}

/// Re-derive `paidAmount` and `status` from the payment rows.
pub fn recompute_invoice(
    conn: &Connection,
    scope: &BranchScope,
    id: &str,
) -> Result<JsonValue, ApiError> {
    let invoice = crud::get(conn, &INVOICES, scope, id)?;
    let amount = invoice["amount"].as_f64().unwrap_or(0.0);
    let paid = paid_total(conn, id)?;
    let status = invoice_status(amount, paid, due_date(&invoice), today());
    let changed = invoice["paidAmount"].as_f64() != Some(paid) || invoice["status"] != status;
    if !changed {
        return Ok(invoice);
    }
    crud::apply_update(
        conn,
        &INVOICES,
        scope,
        id,
        &[
            ("paid_amount", Value::Real(paid)),
            ("status", Value::Text(status.to_string())),
        ],
    )?;
    crud::get(conn, &INVOICES, scope, id)
}

fn non_negative_amount(amount: f64) -> Result<(), ApiError> {
    if amount < 0.0 {
        return Err(ApiError::field("amount", "must not be negative"));
    }
    Ok(())
}

pub fn create_invoice(
    conn: &Connection,
    scope: &BranchScope,
    data: &Map<String, JsonValue>,
) -> Result<JsonValue, ApiError> {
    let mut values = crud::validate(conn, &INVOICES, scope, data, WriteMode::Create)?;
    let amount = values
        .iter()
        .find_map(|(c, v)| match (*c, v) {
            ("amount", Value::Real(a)) => Some(*a),
            _ => None,
        })
        .unwrap_or(0.0);
    non_negative_amount(amount)?;
    let due = values.iter().find_map(|(c, v)| match (*c, v) {
        ("due_date", Value::Text(d)) => NaiveDate::parse_from_str(d, "%Y-%m-%d").ok(),
        _ => None,
    });
    values.push(("paid_amount", Value::Real(0.0)));
    values.push((
        "status",
        Value::Text(invoice_status(amount, 0.0, due, today()).to_string()),
    ));
    let id = crud::insert(conn, &INVOICES, scope, &values)?;
    crud::get(conn, &INVOICES, scope, &id)
}

pub fn update_invoice(
    conn: &Connection,
    scope: &BranchScope,
    id: &str,
    data: &Map<String, JsonValue>,
    mode: WriteMode,
) -> Result<JsonValue, ApiError> {
    let tx = conn.unchecked_transaction()?;
    let updated = crud::update(&tx, &INVOICES, scope, id, data, mode)?;
    // Dropping the transaction on error rolls the update back.
    non_negative_amount(updated["amount"].as_f64().unwrap_or(0.0))?;
    let out = recompute_invoice(&tx, scope, id)?;
    tx.commit()?;
    Ok(out)
}

fn positive_amount(values: &[(&'static str, Value)]) -> Result<Option<f64>, ApiError> {
    match values.iter().find(|(c, _)| *c == "amount") {
        Some((_, Value::Real(a))) if *a > EPSILON => Ok(Some(cents(*a))),
        Some(_) => Err(ApiError::field("amount", "must be greater than 0")),
        None => Ok(None),
    }
}

fn ensure_within_balance(
    conn: &Connection,
    scope: &BranchScope,
    invoice_id: &str,
    amount: f64,
    replacing: f64,
) -> Result<(), ApiError> {
    let invoice = crud::get(conn, &INVOICES, scope, invoice_id)?;
    let total = invoice["amount"].as_f64().unwrap_or(0.0);
    let outstanding = cents(total - paid_total(conn, invoice_id)? + replacing);
    if amount > outstanding + EPSILON {
        return Err(ApiError::bad_request_with(
            "overpayment",
            format!("payment of {amount:.2} exceeds the outstanding balance of {outstanding:.2}"),
            json!({ "invoiceId": invoice_id, "outstanding": outstanding, "amount": amount }),
        ));
    }
    Ok(())
}

pub fn create_payment(
    conn: &Connection,
    scope: &BranchScope,
    data: &Map<String, JsonValue>,
) -> Result<JsonValue, ApiError> {
    let values = crud::validate(conn, &PAYMENTS, scope, data, WriteMode::Create)?;
    let amount = positive_amount(&values)?.unwrap_or(0.0);
    let invoice_id = values
        .iter()
        .find_map(|(c, v)| match (*c, v) {
            ("invoice_id", Value::Text(id)) => Some(id.clone()),
            _ => None,
        })
        .ok_or_else(|| ApiError::field("invoiceId", "is required"))?;

    let tx = conn.unchecked_transaction()?;
    ensure_within_balance(&tx, scope, &invoice_id, amount, 0.0)?;
    let id = crud::insert(&tx, &PAYMENTS, scope, &values)?;
    let invoice = recompute_invoice(&tx, scope, &invoice_id)?;
    let payment = crud::get(&tx, &PAYMENTS, scope, &id)?;
    tx.commit()?;

    info!(
        payment_id = %id,
        invoice_id = %invoice_id,
        status = invoice["status"].as_str().unwrap_or_default(),
        "payment recorded"
    );
    Ok(json!({ "payment": payment, "invoice": invoice }))
}

pub fn update_payment(
    conn: &Connection,
    scope: &BranchScope,
    id: &str,
    data: &Map<String, JsonValue>,
    mode: WriteMode,
) -> Result<JsonValue, ApiError> {
    let existing = crud::get(conn, &PAYMENTS, scope, id)?;
    let values = crud::validate(conn, &PAYMENTS, scope, data, mode)?;
    let old_invoice = existing["invoiceId"].as_str().unwrap_or_default().to_string();
    let old_amount = existing["amount"].as_f64().unwrap_or(0.0);
    let new_invoice = values
        .iter()
        .find_map(|(c, v)| match (*c, v) {
            ("invoice_id", Value::Text(id)) => Some(id.clone()),
            _ => None,
        })
        .unwrap_or_else(|| old_invoice.clone());
    let new_amount = positive_amount(&values)?.unwrap_or(old_amount);

    let tx = conn.unchecked_transaction()?;
    let replacing = if new_invoice == old_invoice { old_amount } else { 0.0 };
    ensure_within_balance(&tx, scope, &new_invoice, new_amount, replacing)?;
    if !values.is_empty() {
        crud::apply_update(&tx, &PAYMENTS, scope, id, &values)?;
    }
    if new_invoice != old_invoice {
        recompute_invoice(&tx, scope, &old_invoice)?;
    }
    let invoice = recompute_invoice(&tx, scope, &new_invoice)?;
    let payment = crud::get(&tx, &PAYMENTS, scope, id)?;
    tx.commit()?;
    Ok(json!({ "payment": payment, "invoice": invoice }))
}

pub fn delete_payment(
    conn: &Connection,
    scope: &BranchScope,
    id: &str,
) -> Result<JsonValue, ApiError> {
    let existing = crud::get(conn, &PAYMENTS, scope, id)?;
    let invoice_id = existing["invoiceId"].as_str().unwrap_or_default().to_string();

    let tx = conn.unchecked_transaction()?;
    crud::delete_cascade(&tx, &PAYMENTS, id)?;
    let invoice = recompute_invoice(&tx, scope, &invoice_id)?;
    tx.commit()?;
    Ok(json!({ "id": id, "invoice": invoice }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::resources::STUDENTS;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("date")
    }

    fn obj(v: JsonValue) -> Map<String, JsonValue> {
        v.as_object().cloned().expect("object")
    }

    #[test]
    fn status_follows_paid_amount_then_due_date() {
        let today = d("2026-01-15");
        assert_eq!(invoice_status(100.0, 100.0, None, today), "paid");
        assert_eq!(invoice_status(100.0, 99.999, None, today), "paid");
        assert_eq!(invoice_status(100.0, 40.0, Some(d("2025-01-01")), today), "partial");
        assert_eq!(invoice_status(100.0, 0.0, Some(d("2026-01-14")), today), "overdue");
        assert_eq!(invoice_status(100.0, 0.0, Some(d("2026-01-15")), today), "pending");
        assert_eq!(invoice_status(100.0, 0.0, None, today), "pending");
        assert_eq!(invoice_status(0.0, 0.0, None, today), "paid");
    }

    fn invoice(conn: &Connection, scope: &BranchScope) -> String {
        let student = crud::create(
            conn,
            &STUDENTS,
            scope,
            &obj(json!({ "firstName": "A", "lastName": "B" })),
        )
        .expect("student");
        let inv = create_invoice(
            conn,
            scope,
            &obj(json!({ "studentId": student["id"], "invoiceNo": "INV-1", "amount": 100 })),
        )
        .expect("invoice");
        assert_eq!(inv["status"], "pending");
        assert_eq!(inv["paidAmount"], 0.0);
        inv["id"].as_str().expect("id").to_string()
    }

    #[test]
    fn payments_move_invoice_to_partial_then_paid() {
        let conn = db::open_in_memory().expect("db");
        let scope = BranchScope::branch("a");
        let inv = invoice(&conn, &scope);

        let first = create_payment(&conn, &scope, &obj(json!({ "invoiceId": inv, "amount": 40 })))
            .expect("first");
        assert_eq!(first["invoice"]["status"], "partial");
        assert_eq!(first["invoice"]["paidAmount"], 40.0);

        let err = create_payment(&conn, &scope, &obj(json!({ "invoiceId": inv, "amount": 61 })))
            .expect_err("over");
        assert_eq!(err.code(), "overpayment");
        assert_eq!(err.status(), 400);

        let second = create_payment(&conn, &scope, &obj(json!({ "invoiceId": inv, "amount": 60 })))
            .expect("second");
        assert_eq!(second["invoice"]["status"], "paid");

        let pid = second["payment"]["id"].as_str().expect("id");
        let after = delete_payment(&conn, &scope, pid).expect("delete");
        assert_eq!(after["invoice"]["status"], "partial");
        assert_eq!(after["invoice"]["paidAmount"], 40.0);
    }

    #[test]
    fn payment_edit_counts_its_own_previous_amount() {
        let conn = db::open_in_memory().expect("db");
        let scope = BranchScope::branch("a");
        let inv = invoice(&conn, &scope);
        let p = create_payment(&conn, &scope, &obj(json!({ "invoiceId": inv, "amount": 90 })))
            .expect("pay");
        let pid = p["payment"]["id"].as_str().expect("id");
        let raise = obj(json!({ "amount": 100 }));
        let edited =
            update_payment(&conn, &scope, pid, &raise, WriteMode::Merge).expect("raise to full");
        assert_eq!(edited["invoice"]["status"], "paid");
        assert!(
            update_payment(&conn, &scope, pid, &obj(json!({ "amount": 0 })), WriteMode::Merge)
                .is_err()
        );
    }

    #[test]
    fn lowering_the_invoice_amount_recomputes_status() {
        let conn = db::open_in_memory().expect("db");
        let scope = BranchScope::branch("a");
        let inv = invoice(&conn, &scope);
        create_payment(&conn, &scope, &obj(json!({ "invoiceId": inv, "amount": 50 })))
            .expect("pay");
        let lower = obj(json!({ "amount": 50 }));
        let updated =
            update_invoice(&conn, &scope, &inv, &lower, WriteMode::Merge).expect("update");
        assert_eq!(updated["status"], "paid");
    }

    #[test]
    fn invoice_amount_cannot_be_patched_negative() {
        let conn = db::open_in_memory().expect("db");
        let scope = BranchScope::branch("a");
        let inv = invoice(&conn, &scope);
        let err = update_invoice(
            &conn,
            &scope,
            &inv,
            &obj(json!({ "amount": -50 })),
            WriteMode::Merge,
        )
        .expect_err("negative amount");
        assert_eq!(err.status(), 422);
        assert_eq!(err.details().expect("details")["amount"][0], "must not be negative");

        let stored = crud::get(&conn, &INVOICES, &scope, &inv).expect("invoice");
        assert_eq!(stored["amount"], 100.0);
        assert_eq!(stored["status"], "pending");
    }
}
