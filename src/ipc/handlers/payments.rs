use crate::db::{self, Student};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::ledger;
use crate::pdf;
use rusqlite::Connection;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

// Lock contention on the payment transaction is retried a fixed number of
// times before the error is surfaced.
const LOCK_RETRIES: usize = 3;
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(200);

struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl HandlerErr {
    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

fn db_err(e: rusqlite::Error) -> HandlerErr {
    HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
        details: None,
    }
}

fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: format!("missing {}", key),
            details: None,
        })
}

fn get_amount(params: &serde_json::Value, key: &str) -> Result<f64, HandlerErr> {
    let value = params
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: format!("missing {}", key),
            details: None,
        })?;
    if !value.is_finite() || value < 0.0 {
        return Err(HandlerErr {
            code: "bad_params",
            message: format!("{} must be a non-negative amount", key),
            details: None,
        });
    }
    Ok(value)
}

fn lookup_student(conn: &Connection, student_id: &str) -> Result<Student, HandlerErr> {
    db::get_student(conn, student_id)
        .map_err(db_err)?
        .ok_or_else(|| HandlerErr {
            code: "not_found",
            message: "student not found".to_string(),
            details: None,
        })
}

pub fn short_uid() -> String {
    Uuid::new_v4().to_string()[..8].to_string()
}

fn is_locked(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::DatabaseBusy
                || f.code == rusqlite::ErrorCode::DatabaseLocked
    )
}

/// Insert the payment row and apply the ledger rule to the student's
/// balances in one transaction. Returns the outcome used for the receipt.
fn apply_payment_tx(
    conn: &Connection,
    student_id: &str,
    total_due: f64,
    amount: f64,
    payment_id: &str,
    payment_date: &str,
) -> rusqlite::Result<ledger::PaymentOutcome> {
    let tx = conn.unchecked_transaction()?;

    tx.execute(
        "INSERT INTO payments(payment_id, student_id, amount, payment_date)
         VALUES(?, ?, ?, ?)",
        (payment_id, student_id, amount, payment_date),
    )?;

    let (prev_outstanding, prev_extra): (f64, f64) = tx.query_row(
        "SELECT COALESCE(outstanding_balance, 0.0), COALESCE(extra_balance, 0.0)
         FROM students WHERE student_id = ?",
        [student_id],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;

    let outcome = ledger::apply_payment(total_due, prev_outstanding, prev_extra, amount);

    tx.execute(
        "UPDATE students SET outstanding_balance = ?, extra_balance = ?
         WHERE student_id = ?",
        (outcome.new_outstanding, outcome.new_extra, student_id),
    )?;

    tx.commit()?;
    Ok(outcome)
}

fn record(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let school_fee = get_amount(params, "schoolFee")?;
    let bus_fee = get_amount(params, "busFee")?;
    let amount = get_amount(params, "amount")?;

    if school_fee == 0.0 && bus_fee == 0.0 {
        return Err(HandlerErr {
            code: "bad_params",
            message: "enter at least one fee (school fee or bus fee)".to_string(),
            details: None,
        });
    }
    if amount <= 0.0 {
        return Err(HandlerErr {
            code: "bad_params",
            message: "payment amount must be greater than zero".to_string(),
            details: None,
        });
    }

    let student = lookup_student(conn, &student_id)?;
    let total_due = school_fee + bus_fee;
    let payment_id = format!("PAY{}", short_uid());
    let payment_date = chrono::Local::now().format("%Y-%m-%d").to_string();

    let mut attempt = 0;
    let outcome = loop {
        match apply_payment_tx(conn, &student_id, total_due, amount, &payment_id, &payment_date)
        {
            Ok(outcome) => break outcome,
            Err(e) if is_locked(&e) && attempt + 1 < LOCK_RETRIES => {
                attempt += 1;
                std::thread::sleep(LOCK_RETRY_DELAY);
            }
            Err(e) => {
                return Err(HandlerErr {
                    code: "db_update_failed",
                    message: e.to_string(),
                    details: Some(json!({ "table": "payments" })),
                });
            }
        }
    };

    let pdf_data = pdf::generate_receipt(
        &student,
        school_fee,
        bus_fee,
        amount,
        &payment_id,
        &payment_date,
        &outcome,
    )
    .map_err(|e| HandlerErr {
        code: "pdf_render_failed",
        message: format!("{e:?}"),
        details: None,
    })?;

    let receipt_id = format!("REC{}", short_uid());
    let generated_date = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    conn.execute(
        "INSERT INTO receipts(receipt_id, student_id, payment_id, pdf_data, generated_date)
         VALUES(?, ?, ?, ?, ?)",
        (&receipt_id, &student_id, &payment_id, &pdf_data, &generated_date),
    )
    .map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "receipts" })),
    })?;

    let payment_type = outcome.kind(amount).as_str();
    Ok(json!({
        "paymentId": payment_id,
        "paymentDate": payment_date,
        "receiptId": receipt_id,
        "paymentType": payment_type,
        "effectiveDue": outcome.effective_due,
        "transactionOutstanding": outcome.transaction_outstanding,
        "transactionExtra": outcome.transaction_extra,
        "totalOutstanding": outcome.new_outstanding,
        "totalExtra": outcome.new_extra
    }))
}

fn list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = params.get("studentId").and_then(|v| v.as_str());
    let mut sql = String::from(
        "SELECT payment_id, student_id, amount, payment_date FROM payments",
    );
    if student_id.is_some() {
        sql.push_str(" WHERE student_id = ?");
    }
    sql.push_str(" ORDER BY id DESC");

    let mut stmt = conn.prepare(&sql).map_err(db_err)?;
    let map_row = |r: &rusqlite::Row<'_>| {
        Ok(json!({
            "paymentId": r.get::<_, String>(0)?,
            "studentId": r.get::<_, Option<String>>(1)?,
            "amount": r.get::<_, f64>(2)?,
            "paymentDate": r.get::<_, Option<String>>(3)?
        }))
    };
    let rows: Vec<serde_json::Value> = match student_id {
        Some(sid) => stmt
            .query_map([sid], map_row)
            .and_then(|it| it.collect())
            .map_err(db_err)?,
        None => stmt
            .query_map([], map_row)
            .and_then(|it| it.collect())
            .map_err(db_err)?,
    };
    Ok(json!({ "payments": rows, "count": rows.len() }))
}

fn search_receipts(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = params.get("studentId").and_then(|v| v.as_str());
    let mut sql = String::from(
        "SELECT receipt_id, student_id, payment_id, generated_date, LENGTH(pdf_data)
         FROM receipts",
    );
    if student_id.is_some() {
        sql.push_str(" WHERE student_id = ?");
    }
    sql.push_str(" ORDER BY generated_date DESC");

    let mut stmt = conn.prepare(&sql).map_err(db_err)?;
    let map_row = |r: &rusqlite::Row<'_>| {
        Ok(json!({
            "receiptId": r.get::<_, String>(0)?,
            "studentId": r.get::<_, Option<String>>(1)?,
            "paymentId": r.get::<_, Option<String>>(2)?,
            "generatedDate": r.get::<_, Option<String>>(3)?,
            "pdfBytes": r.get::<_, Option<i64>>(4)?
        }))
    };
    let rows: Vec<serde_json::Value> = match student_id {
        Some(sid) => stmt
            .query_map([sid], map_row)
            .and_then(|it| it.collect())
            .map_err(db_err)?,
        None => stmt
            .query_map([], map_row)
            .and_then(|it| it.collect())
            .map_err(db_err)?,
    };
    Ok(json!({ "receipts": rows, "count": rows.len() }))
}

/// Write a stored document blob out to `<workspace>/documents/<id>.pdf` and
/// return the path; PDF bytes never travel over the IPC channel.
fn export_document(
    conn: &Connection,
    workspace: &Path,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let kind = get_required_str(params, "kind")?;
    let id = get_required_str(params, "id")?;
    let (table, id_column) = match kind.as_str() {
        "invoice" => ("invoices", "invoice_id"),
        "receipt" => ("receipts", "receipt_id"),
        "reportCard" => ("report_cards", "report_id"),
        other => {
            return Err(HandlerErr {
                code: "bad_params",
                message: "kind must be one of: invoice, receipt, reportCard".to_string(),
                details: Some(json!({ "kind": other })),
            });
        }
    };

    let sql = format!("SELECT pdf_data FROM {} WHERE {} = ?", table, id_column);
    let pdf_data: Vec<u8> = conn
        .query_row(&sql, [&id], |r| r.get(0))
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => HandlerErr {
                code: "not_found",
                message: format!("{} not found", kind),
                details: None,
            },
            other => db_err(other),
        })?;

    let out_dir = workspace.join("documents");
    std::fs::create_dir_all(&out_dir).map_err(|e| HandlerErr {
        code: "io_failed",
        message: e.to_string(),
        details: None,
    })?;
    let out_path = out_dir.join(format!("{}.pdf", id));
    std::fs::write(&out_path, &pdf_data).map_err(|e| HandlerErr {
        code: "io_failed",
        message: e.to_string(),
        details: None,
    })?;

    Ok(json!({
        "path": out_path.to_string_lossy(),
        "bytes": pdf_data.len()
    }))
}

fn with_conn(
    state: &AppState,
    req: &Request,
    f: impl FnOnce(&Connection) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_export_document(state: &AppState, req: &Request) -> serde_json::Value {
    let (Some(conn), Some(workspace)) = (state.db.as_ref(), state.workspace.as_ref()) else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match export_document(conn, workspace, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "payments.record" => Some(with_conn(state, req, |c| record(c, &req.params))),
        "payments.list" => Some(with_conn(state, req, |c| list(c, &req.params))),
        "receipts.search" => Some(with_conn(state, req, |c| search_receipts(c, &req.params))),
        "documents.export" => Some(handle_export_document(state, req)),
        _ => None,
    }
}
