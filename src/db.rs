use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;

pub const DB_FILE: &str = "school.sqlite3";

const DEFAULT_ADMIN_USER: &str = "admin";
const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(Duration::from_secs(10))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            student_id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            middle_name TEXT DEFAULT '',
            last_name TEXT NOT NULL,
            mother_name TEXT NOT NULL,
            father_name TEXT NOT NULL,
            address TEXT,
            email TEXT,
            mobile_number TEXT,
            dob TEXT,
            class_name TEXT,
            whatsapp_no TEXT,
            gender TEXT,
            doa TEXT,
            roll_number TEXT,
            outstanding_balance REAL DEFAULT 0.0,
            extra_balance REAL DEFAULT 0.0
        )",
        [],
    )?;

    // Databases from before the ledger rework carried per-student fee
    // columns. Fees now live on invoices; rebuild the table without them.
    // The column backfills run first: the rebuild's SELECT names
    // roll_number and the balance columns, which the oldest databases lack.
    ensure_students_roll_number(&conn)?;
    ensure_students_balance_columns(&conn)?;
    drop_legacy_fee_columns(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS payments(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            payment_id TEXT NOT NULL,
            student_id TEXT,
            amount REAL NOT NULL,
            payment_date TEXT,
            FOREIGN KEY(student_id) REFERENCES students(student_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payments_student ON payments(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS results(
            student_id TEXT,
            subject TEXT NOT NULL,
            marks REAL NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(student_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_results_student ON results(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            username TEXT PRIMARY KEY NOT NULL,
            password TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS invoices(
            invoice_id TEXT PRIMARY KEY,
            student_id TEXT,
            school_fee REAL,
            bus_fee REAL,
            pdf_data BLOB,
            generated_date TEXT,
            FOREIGN KEY(student_id) REFERENCES students(student_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_invoices_student ON invoices(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS receipts(
            receipt_id TEXT PRIMARY KEY,
            student_id TEXT,
            payment_id TEXT,
            pdf_data BLOB,
            generated_date TEXT,
            FOREIGN KEY(student_id) REFERENCES students(student_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_receipts_student ON receipts(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS report_cards(
            report_id TEXT PRIMARY KEY,
            student_id TEXT,
            academic_year TEXT,
            pdf_data BLOB,
            generated_date TEXT,
            FOREIGN KEY(student_id) REFERENCES students(student_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_report_cards_student ON report_cards(student_id)",
        [],
    )?;

    seed_default_admin(&conn).context("seed default admin user")?;

    Ok(conn)
}

fn drop_legacy_fee_columns(conn: &Connection) -> anyhow::Result<()> {
    let has_legacy = table_has_column(conn, "students", "tuition_fee")?
        || table_has_column(conn, "students", "bus_fee")?
        || table_has_column(conn, "students", "total_amount")?;
    if !has_legacy {
        return Ok(());
    }

    conn.execute_batch(
        "BEGIN;
         CREATE TABLE students_rebuild(
            student_id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            middle_name TEXT DEFAULT '',
            last_name TEXT NOT NULL,
            mother_name TEXT NOT NULL,
            father_name TEXT NOT NULL,
            address TEXT,
            email TEXT,
            mobile_number TEXT,
            dob TEXT,
            class_name TEXT,
            whatsapp_no TEXT,
            gender TEXT,
            doa TEXT,
            roll_number TEXT,
            outstanding_balance REAL DEFAULT 0.0,
            extra_balance REAL DEFAULT 0.0
         );
         INSERT INTO students_rebuild(
            student_id, first_name, middle_name, last_name, mother_name,
            father_name, address, email, mobile_number, dob, class_name,
            whatsapp_no, gender, doa, roll_number, outstanding_balance,
            extra_balance)
         SELECT
            student_id, first_name, middle_name, last_name, mother_name,
            father_name, address, email, mobile_number, dob, class_name,
            whatsapp_no, gender, doa, roll_number,
            COALESCE(outstanding_balance, 0.0), 0.0
         FROM students;
         DROP TABLE students;
         ALTER TABLE students_rebuild RENAME TO students;
         COMMIT;",
    )?;
    Ok(())
}

fn ensure_students_roll_number(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "roll_number")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE students ADD COLUMN roll_number TEXT", [])?;
    Ok(())
}

fn ensure_students_balance_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "students", "outstanding_balance")? {
        conn.execute(
            "ALTER TABLE students ADD COLUMN outstanding_balance REAL DEFAULT 0.0",
            [],
        )?;
    }
    if !table_has_column(conn, "students", "extra_balance")? {
        conn.execute(
            "ALTER TABLE students ADD COLUMN extra_balance REAL DEFAULT 0.0",
            [],
        )?;
    }
    Ok(())
}

fn seed_default_admin(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO users(username, password) VALUES(?, ?)",
        (DEFAULT_ADMIN_USER, sha256_hex(DEFAULT_ADMIN_PASSWORD)),
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn sha256_hex(raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Allocate the next sequential student id (EPS1001, EPS1002, ...).
///
/// Text ordering on student_id matches numeric ordering while ids stay four
/// digits wide; a numeric CAST is needed if enrolment ever passes EPS9999.
pub fn next_student_id(conn: &Connection) -> rusqlite::Result<String> {
    let last: Option<String> = conn
        .query_row(
            "SELECT student_id FROM students
             WHERE student_id LIKE 'EPS%'
             ORDER BY student_id DESC LIMIT 1",
            [],
            |r| r.get(0),
        )
        .optional()?;
    let next_number = last
        .as_deref()
        .and_then(|id| id.strip_prefix("EPS"))
        .and_then(|n| n.parse::<u32>().ok())
        .map(|n| n + 1)
        .unwrap_or(1001);
    Ok(format!("EPS{:04}", next_number))
}

#[derive(Debug, Clone)]
pub struct Student {
    pub student_id: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub mother_name: String,
    pub father_name: String,
    pub address: Option<String>,
    pub email: Option<String>,
    pub mobile_number: Option<String>,
    pub dob: Option<String>,
    pub class_name: Option<String>,
    pub whatsapp_no: Option<String>,
    pub gender: Option<String>,
    pub doa: Option<String>,
    pub roll_number: Option<String>,
    pub outstanding_balance: f64,
    pub extra_balance: f64,
}

impl Student {
    pub fn full_name(&self) -> String {
        match self.middle_name.as_deref() {
            Some(mid) if !mid.trim().is_empty() => {
                format!("{} {} {}", self.first_name, mid, self.last_name)
            }
            _ => format!("{} {}", self.first_name, self.last_name),
        }
    }
}

pub fn get_student(conn: &Connection, student_id: &str) -> rusqlite::Result<Option<Student>> {
    conn.query_row(
        "SELECT student_id, first_name, middle_name, last_name, mother_name,
                father_name, address, email, mobile_number, dob, class_name,
                whatsapp_no, gender, doa, roll_number,
                outstanding_balance, extra_balance
         FROM students WHERE student_id = ?",
        [student_id],
        student_from_row,
    )
    .optional()
}

pub fn student_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        student_id: row.get(0)?,
        first_name: row.get(1)?,
        middle_name: row.get(2)?,
        last_name: row.get(3)?,
        mother_name: row.get(4)?,
        father_name: row.get(5)?,
        address: row.get(6)?,
        email: row.get(7)?,
        mobile_number: row.get(8)?,
        dob: row.get(9)?,
        class_name: row.get(10)?,
        whatsapp_no: row.get(11)?,
        gender: row.get(12)?,
        doa: row.get(13)?,
        roll_number: row.get(14)?,
        outstanding_balance: row.get::<_, Option<f64>>(15)?.unwrap_or(0.0),
        extra_balance: row.get::<_, Option<f64>>(16)?.unwrap_or(0.0),
    })
}
