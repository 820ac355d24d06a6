use crate::db::{self, Student};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::ledger;
use crate::pdf;
use rusqlite::Connection;
use serde_json::json;

use super::payments::short_uid;

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

fn generate(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let school_fee = get_amount(params, "schoolFee")?;
    let bus_fee = get_amount(params, "busFee")?;

    let student = lookup_student(conn, &student_id)?;

    // An invoice needs something to bill: a current fee or a carried balance.
    if school_fee == 0.0
        && bus_fee == 0.0
        && student.outstanding_balance == 0.0
        && student.extra_balance == 0.0
    {
        return Err(HandlerErr {
            code: "bad_params",
            message: "enter at least one fee, or the student must have a balance".to_string(),
            details: None,
        });
    }

    let invoice_id = format!("INV{}", short_uid());
    let invoice_date = chrono::Local::now().format("%Y-%m-%d").to_string();
    let pdf_data = pdf::generate_invoice(&student, school_fee, bus_fee, &invoice_id, &invoice_date)
        .map_err(|e| HandlerErr {
            code: "pdf_render_failed",
            message: format!("{e:?}"),
            details: None,
        })?;

    let generated_date = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    conn.execute(
        "INSERT INTO invoices(invoice_id, student_id, school_fee, bus_fee, pdf_data, generated_date)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&invoice_id, &student_id, school_fee, bus_fee, &pdf_data, &generated_date),
    )
    .map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "invoices" })),
    })?;

    let adjusted_total = ledger::invoice_total(
        school_fee,
        bus_fee,
        student.outstanding_balance,
        student.extra_balance,
    );
    Ok(json!({
        "invoiceId": invoice_id,
        "invoiceDate": invoice_date,
        "adjustedTotal": adjusted_total,
        "generatedDate": generated_date
    }))
}

fn search(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = params.get("studentId").and_then(|v| v.as_str());
    let mut sql = String::from(
        "SELECT invoice_id, student_id, school_fee, bus_fee, generated_date, LENGTH(pdf_data)
         FROM invoices",
    );
    if student_id.is_some() {
        sql.push_str(" WHERE student_id = ?");
    }
    sql.push_str(" ORDER BY generated_date DESC");

    let mut stmt = conn.prepare(&sql).map_err(db_err)?;
    let map_row = |r: &rusqlite::Row<'_>| {
        Ok(json!({
            "invoiceId": r.get::<_, String>(0)?,
            "studentId": r.get::<_, Option<String>>(1)?,
            "schoolFee": r.get::<_, Option<f64>>(2)?,
            "busFee": r.get::<_, Option<f64>>(3)?,
            "generatedDate": r.get::<_, Option<String>>(4)?,
            "pdfBytes": r.get::<_, Option<i64>>(5)?
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
    Ok(json!({ "invoices": rows, "count": rows.len() }))
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

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "invoices.generate" => Some(with_conn(state, req, |c| generate(c, &req.params))),
        "invoices.search" => Some(with_conn(state, req, |c| search(c, &req.params))),
        _ => None,
    }
}
