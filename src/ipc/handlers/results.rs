use crate::db::{self, Student};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::ledger;
use crate::pdf::{self, SubjectResult};
use rusqlite::Connection;
use serde_json::json;

use super::payments::short_uid;

const DEFAULT_ACADEMIC_YEAR: &str = "2024-2025";
const DEFAULT_ATTENDANCE_PERCENTAGE: f64 = 95.0;

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

fn lookup_student(conn: &Connection, student_id: &str) -> Result<Student, HandlerErr> {
    db::get_student(conn, student_id)
        .map_err(db_err)?
        .ok_or_else(|| HandlerErr {
            code: "not_found",
            message: "student not found".to_string(),
            details: None,
        })
}

fn parse_result_rows(params: &serde_json::Value) -> Result<Vec<SubjectResult>, HandlerErr> {
    let Some(raw_rows) = params.get("results").and_then(|v| v.as_array()) else {
        return Err(HandlerErr {
            code: "bad_params",
            message: "missing results".to_string(),
            details: None,
        });
    };
    if raw_rows.is_empty() {
        return Err(HandlerErr {
            code: "bad_params",
            message: "results must not be empty".to_string(),
            details: None,
        });
    }

    let mut rows = Vec::with_capacity(raw_rows.len());
    for raw in raw_rows {
        let subject = raw
            .get("subject")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| HandlerErr {
                code: "bad_params",
                message: "each result needs a subject".to_string(),
                details: None,
            })?;
        let marks = raw
            .get("marks")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| HandlerErr {
                code: "bad_params",
                message: format!("marks for {} must be numeric", subject),
                details: None,
            })?;
        if !(0.0..=ledger::MAX_MARKS_PER_SUBJECT).contains(&marks) {
            return Err(HandlerErr {
                code: "bad_params",
                message: format!("marks for {} must be between 0 and 100", subject),
                details: Some(json!({ "subject": subject, "marks": marks })),
            });
        }
        rows.push(SubjectResult { subject, marks });
    }
    Ok(rows)
}

fn load_results(conn: &Connection, student_id: &str) -> Result<Vec<SubjectResult>, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT subject, marks FROM results WHERE student_id = ? ORDER BY rowid")
        .map_err(db_err)?;
    stmt.query_map([student_id], |r| {
        Ok(SubjectResult {
            subject: r.get(0)?,
            marks: r.get(1)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(db_err)
}

/// Re-entered subjects replace the previous rows so a report card reflects
/// the latest marks rather than every entry ever made.
fn record(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    lookup_student(conn, &student_id)?;
    let rows = parse_result_rows(params)?;

    let tx = conn.unchecked_transaction().map_err(|e| HandlerErr {
        code: "db_tx_failed",
        message: e.to_string(),
        details: None,
    })?;
    for row in &rows {
        tx.execute(
            "DELETE FROM results WHERE student_id = ? AND subject = ?",
            (&student_id, &row.subject),
        )
        .map_err(|e| HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "results" })),
        })?;
        tx.execute(
            "INSERT INTO results(student_id, subject, marks) VALUES(?, ?, ?)",
            (&student_id, &row.subject, row.marks),
        )
        .map_err(|e| HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "results" })),
        })?;
    }
    tx.commit().map_err(|e| HandlerErr {
        code: "db_commit_failed",
        message: e.to_string(),
        details: None,
    })?;

    Ok(json!({ "count": rows.len() }))
}

fn list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let rows = load_results(conn, &student_id)?;
    let rows_json: Vec<serde_json::Value> = rows
        .iter()
        .map(|r| json!({ "subject": r.subject, "marks": r.marks }))
        .collect();
    Ok(json!({ "results": rows_json, "count": rows_json.len() }))
}

fn generate_report_card(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let academic_year = params
        .get("academicYear")
        .and_then(|v| v.as_str())
        .unwrap_or(DEFAULT_ACADEMIC_YEAR)
        .to_string();
    let attendance_percentage = params
        .get("attendancePercentage")
        .and_then(|v| v.as_f64())
        .unwrap_or(DEFAULT_ATTENDANCE_PERCENTAGE);
    if !(0.0..=100.0).contains(&attendance_percentage) {
        return Err(HandlerErr {
            code: "bad_params",
            message: "attendancePercentage must be between 0 and 100".to_string(),
            details: None,
        });
    }

    let student = lookup_student(conn, &student_id)?;
    let results = load_results(conn, &student_id)?;
    if results.is_empty() {
        return Err(HandlerErr {
            code: "not_found",
            message: "no results recorded for student".to_string(),
            details: None,
        });
    }

    let generated_date = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let pdf_data = pdf::generate_result_card(
        &student,
        &results,
        &academic_year,
        attendance_percentage,
        &generated_date,
    )
    .map_err(|e| HandlerErr {
        code: "pdf_render_failed",
        message: format!("{e:?}"),
        details: None,
    })?;

    let report_id = format!("REP{}", short_uid());
    conn.execute(
        "INSERT INTO report_cards(report_id, student_id, academic_year, pdf_data, generated_date)
         VALUES(?, ?, ?, ?, ?)",
        (&report_id, &student_id, &academic_year, &pdf_data, &generated_date),
    )
    .map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "report_cards" })),
    })?;

    let marks: Vec<f64> = results.iter().map(|r| r.marks).collect();
    let summary = ledger::summarize_results(&marks);
    Ok(json!({
        "reportId": report_id,
        "academicYear": academic_year,
        "generatedDate": generated_date,
        "summary": summary
    }))
}

fn search_report_cards(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = params.get("studentId").and_then(|v| v.as_str());
    let academic_year = params.get("academicYear").and_then(|v| v.as_str());

    let mut sql = String::from(
        "SELECT report_id, student_id, academic_year, generated_date, LENGTH(pdf_data)
         FROM report_cards WHERE 1=1",
    );
    let mut args: Vec<String> = Vec::new();
    if let Some(sid) = student_id {
        sql.push_str(" AND student_id = ?");
        args.push(sid.to_string());
    }
    if let Some(year) = academic_year {
        sql.push_str(" AND academic_year = ?");
        args.push(year.to_string());
    }
    sql.push_str(" ORDER BY generated_date DESC");

    let mut stmt = conn.prepare(&sql).map_err(db_err)?;
    let rows: Vec<serde_json::Value> = stmt
        .query_map(rusqlite::params_from_iter(args.iter()), |r| {
            Ok(json!({
                "reportId": r.get::<_, String>(0)?,
                "studentId": r.get::<_, Option<String>>(1)?,
                "academicYear": r.get::<_, Option<String>>(2)?,
                "generatedDate": r.get::<_, Option<String>>(3)?,
                "pdfBytes": r.get::<_, Option<i64>>(4)?
            }))
        })
        .and_then(|it| it.collect())
        .map_err(db_err)?;
    Ok(json!({ "reportCards": rows, "count": rows.len() }))
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
        "results.record" => Some(with_conn(state, req, |c| record(c, &req.params))),
        "results.list" => Some(with_conn(state, req, |c| list(c, &req.params))),
        "reportCards.generate" => {
            Some(with_conn(state, req, |c| generate_report_card(c, &req.params)))
        }
        "reportCards.search" => {
            Some(with_conn(state, req, |c| search_report_cards(c, &req.params)))
        }
        _ => None,
    }
}
