use crate::db::{self, Student};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::{params_from_iter, Connection};
use serde_json::json;

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

fn get_required_name(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    let value = get_required_str(params, key)?;
    if value.trim().is_empty() {
        return Err(HandlerErr {
            code: "bad_params",
            message: format!("{} must not be empty", key),
            details: None,
        });
    }
    Ok(value.trim().to_string())
}

fn get_opt_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

fn student_json(s: &Student) -> serde_json::Value {
    json!({
        "studentId": s.student_id,
        "firstName": s.first_name,
        "middleName": s.middle_name,
        "lastName": s.last_name,
        "fullName": s.full_name(),
        "motherName": s.mother_name,
        "fatherName": s.father_name,
        "address": s.address,
        "email": s.email,
        "mobileNumber": s.mobile_number,
        "dob": s.dob,
        "className": s.class_name,
        "whatsappNo": s.whatsapp_no,
        "gender": s.gender,
        "doa": s.doa,
        "rollNumber": s.roll_number,
        "outstandingBalance": s.outstanding_balance,
        "extraBalance": s.extra_balance
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

fn list_students(conn: &Connection) -> Result<Vec<Student>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT student_id, first_name, middle_name, last_name, mother_name,
                    father_name, address, email, mobile_number, dob, class_name,
                    whatsapp_no, gender, doa, roll_number,
                    outstanding_balance, extra_balance
             FROM students
             ORDER BY student_id",
        )
        .map_err(db_err)?;
    stmt.query_map([], db::student_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)
}

fn admit(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let first_name = get_required_name(params, "firstName")?;
    let last_name = get_required_name(params, "lastName")?;
    let mother_name = get_required_name(params, "motherName")?;
    let father_name = get_required_name(params, "fatherName")?;

    let student_id = db::next_student_id(conn).map_err(db_err)?;
    conn.execute(
        "INSERT INTO students(
            student_id, first_name, middle_name, last_name, mother_name,
            father_name, address, email, mobile_number, dob, class_name,
            whatsapp_no, gender, doa, roll_number,
            outstanding_balance, extra_balance)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0.0, 0.0)",
        rusqlite::params![
            student_id,
            first_name,
            get_opt_str(params, "middleName").unwrap_or_default(),
            last_name,
            mother_name,
            father_name,
            get_opt_str(params, "address"),
            get_opt_str(params, "email"),
            get_opt_str(params, "mobileNumber"),
            get_opt_str(params, "dob"),
            get_opt_str(params, "className"),
            get_opt_str(params, "whatsappNo"),
            get_opt_str(params, "gender"),
            get_opt_str(params, "doa"),
            get_opt_str(params, "rollNumber"),
        ],
    )
    .map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "students" })),
    })?;

    Ok(json!({ "studentId": student_id }))
}

fn get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let student = lookup_student(conn, &student_id)?;
    Ok(json!({ "student": student_json(&student) }))
}

fn list(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let students = list_students(conn)?;
    let rows: Vec<serde_json::Value> = students.iter().map(student_json).collect();
    Ok(json!({ "students": rows, "count": rows.len() }))
}

// Contact and classroom fields only. Balances move exclusively through the
// payment ledger, names through admission records.
const UPDATABLE_FIELDS: &[(&str, &str)] = &[
    ("address", "address"),
    ("email", "email"),
    ("mobileNumber", "mobile_number"),
    ("className", "class_name"),
    ("whatsappNo", "whatsapp_no"),
    ("rollNumber", "roll_number"),
];

fn update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    lookup_student(conn, &student_id)?;

    let mut assignments: Vec<String> = Vec::new();
    let mut values: Vec<String> = Vec::new();
    for (key, column) in UPDATABLE_FIELDS {
        if let Some(value) = get_opt_str(params, key) {
            assignments.push(format!("{} = ?", column));
            values.push(value);
        }
    }
    if assignments.is_empty() {
        return Err(HandlerErr {
            code: "bad_params",
            message: "no updatable fields given".to_string(),
            details: None,
        });
    }
    values.push(student_id.clone());
    let sql = format!(
        "UPDATE students SET {} WHERE student_id = ?",
        assignments.join(", ")
    );
    conn.execute(&sql, params_from_iter(values.iter()))
        .map_err(|e| HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "students" })),
        })?;

    let student = lookup_student(conn, &student_id)?;
    Ok(json!({ "student": student_json(&student) }))
}

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn export_csv(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let students = list_students(conn)?;
    let mut out = String::from(
        "student_id,first_name,middle_name,last_name,mother_name,father_name,\
         address,email,mobile_number,dob,class_name,whatsapp_no,gender,doa,\
         roll_number,outstanding_balance,extra_balance\n",
    );
    for s in &students {
        let fields = [
            s.student_id.clone(),
            s.first_name.clone(),
            s.middle_name.clone().unwrap_or_default(),
            s.last_name.clone(),
            s.mother_name.clone(),
            s.father_name.clone(),
            s.address.clone().unwrap_or_default(),
            s.email.clone().unwrap_or_default(),
            s.mobile_number.clone().unwrap_or_default(),
            s.dob.clone().unwrap_or_default(),
            s.class_name.clone().unwrap_or_default(),
            s.whatsapp_no.clone().unwrap_or_default(),
            s.gender.clone().unwrap_or_default(),
            s.doa.clone().unwrap_or_default(),
            s.roll_number.clone().unwrap_or_default(),
            format!("{:.2}", s.outstanding_balance),
            format!("{:.2}", s.extra_balance),
        ];
        let line: Vec<String> = fields.iter().map(|f| csv_quote(f)).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    Ok(json!({ "csv": out, "count": students.len() }))
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
        "students.admit" => Some(with_conn(state, req, |c| admit(c, &req.params))),
        "students.get" => Some(with_conn(state, req, |c| get(c, &req.params))),
        "students.list" => Some(with_conn(state, req, list)),
        "students.update" => Some(with_conn(state, req, |c| update(c, &req.params))),
        "students.exportCsv" => Some(with_conn(state, req, export_csv)),
        _ => None,
    }
}
