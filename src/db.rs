use rusqlite::Connection;
use std::path::Path;

pub fn open_db(db_path: &Path) -> anyhow::Result<Connection> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

#[cfg(test)]
pub fn open_in_memory() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Every business table carries `id`, `branch_id`, `created_at` and `updated_at`
/// around the columns listed in `resources.rs`. Foreign keys have no ON DELETE
/// action; dependent rows are removed explicitly by the CRUD layer.
fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS academic_years(
            id TEXT PRIMARY KEY,
            branch_id TEXT,
            name TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            is_current INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS staff(
            id TEXT PRIMARY KEY,
            branch_id TEXT,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            email TEXT,
            phone TEXT,
            role TEXT,
            department TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            branch_id TEXT,
            name TEXT NOT NULL,
            grade_level INTEGER,
            description TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS sections(
            id TEXT PRIMARY KEY,
            branch_id TEXT,
            class_id TEXT NOT NULL,
            name TEXT NOT NULL,
            capacity INTEGER,
            homeroom_teacher_id TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(homeroom_teacher_id) REFERENCES staff(id)
        );",
    )?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            branch_id TEXT,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            admission_no TEXT,
            date_of_birth TEXT,
            gender TEXT,
            email TEXT,
            phone TEXT,
            class_id TEXT,
            section_id TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(branch_id, admission_no),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(section_id) REFERENCES sections(id)
        );
        CREATE TABLE IF NOT EXISTS guardians(
            id TEXT PRIMARY KEY,
            branch_id TEXT,
            student_id TEXT NOT NULL,
            name TEXT NOT NULL,
            relation TEXT,
            phone TEXT,
            email TEXT,
            is_primary INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id)
        );
        CREATE TABLE IF NOT EXISTS enrollments(
            id TEXT PRIMARY KEY,
            branch_id TEXT,
            student_id TEXT NOT NULL,
            section_id TEXT NOT NULL,
            academic_year_id TEXT NOT NULL,
            enrolled_on TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(section_id) REFERENCES sections(id),
            FOREIGN KEY(academic_year_id) REFERENCES academic_years(id)
        );",
    )?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            branch_id TEXT,
            code TEXT NOT NULL,
            name TEXT NOT NULL,
            credits INTEGER,
            is_elective INTEGER NOT NULL DEFAULT 0,
            description TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(branch_id, code)
        );
        CREATE TABLE IF NOT EXISTS rooms(
            id TEXT PRIMARY KEY,
            branch_id TEXT,
            name TEXT NOT NULL,
            building TEXT,
            capacity INTEGER,
            room_type TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS timetable_periods(
            id TEXT PRIMARY KEY,
            branch_id TEXT,
            section_id TEXT NOT NULL,
            day_of_week INTEGER NOT NULL,
            period_number INTEGER NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            subject_id TEXT,
            teacher_id TEXT,
            room_id TEXT,
            academic_year_id TEXT NOT NULL,
            is_break INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(section_id) REFERENCES sections(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            FOREIGN KEY(teacher_id) REFERENCES staff(id),
            FOREIGN KEY(room_id) REFERENCES rooms(id),
            FOREIGN KEY(academic_year_id) REFERENCES academic_years(id)
        );
        CREATE INDEX IF NOT EXISTS idx_periods_slot
            ON timetable_periods(day_of_week, period_number, academic_year_id);
        CREATE INDEX IF NOT EXISTS idx_periods_section ON timetable_periods(section_id);
        CREATE INDEX IF NOT EXISTS idx_periods_teacher ON timetable_periods(teacher_id);
        CREATE TABLE IF NOT EXISTS substitutions(
            id TEXT PRIMARY KEY,
            branch_id TEXT,
            period_id TEXT NOT NULL,
            date TEXT NOT NULL,
            substitute_teacher_id TEXT NOT NULL,
            substitute_room_id TEXT,
            reason TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            approved_by TEXT,
            approved_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(period_id) REFERENCES timetable_periods(id),
            FOREIGN KEY(substitute_teacher_id) REFERENCES staff(id),
            FOREIGN KEY(substitute_room_id) REFERENCES rooms(id)
        );",
    )?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS fee_structures(
            id TEXT PRIMARY KEY,
            branch_id TEXT,
            name TEXT NOT NULL,
            class_id TEXT,
            amount REAL NOT NULL,
            frequency TEXT,
            due_day INTEGER,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        );
        CREATE TABLE IF NOT EXISTS invoices(
            id TEXT PRIMARY KEY,
            branch_id TEXT,
            student_id TEXT NOT NULL,
            invoice_no TEXT,
            fee_structure_id TEXT,
            amount REAL NOT NULL,
            paid_amount REAL NOT NULL DEFAULT 0,
            due_date TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(branch_id, invoice_no),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(fee_structure_id) REFERENCES fee_structures(id)
        );
        CREATE TABLE IF NOT EXISTS payments(
            id TEXT PRIMARY KEY,
            branch_id TEXT,
            invoice_id TEXT NOT NULL,
            amount REAL NOT NULL,
            method TEXT,
            paid_at TEXT,
            reference TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(invoice_id) REFERENCES invoices(id)
        );
        CREATE INDEX IF NOT EXISTS idx_payments_invoice ON payments(invoice_id);",
    )?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS comm_templates(
            id TEXT PRIMARY KEY,
            branch_id TEXT,
            name TEXT NOT NULL,
            channel TEXT NOT NULL,
            subject TEXT,
            body TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS comm_campaigns(
            id TEXT PRIMARY KEY,
            branch_id TEXT,
            name TEXT NOT NULL,
            template_id TEXT,
            audience TEXT,
            status TEXT NOT NULL DEFAULT 'draft',
            scheduled_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(template_id) REFERENCES comm_templates(id)
        );
        CREATE TABLE IF NOT EXISTS comm_tickets(
            id TEXT PRIMARY KEY,
            branch_id TEXT,
            subject TEXT NOT NULL,
            description TEXT,
            status TEXT NOT NULL DEFAULT 'open',
            priority TEXT NOT NULL DEFAULT 'normal',
            raised_by TEXT,
            assigned_to TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(assigned_to) REFERENCES staff(id)
        );",
    )?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS attendance_records(
            id TEXT PRIMARY KEY,
            branch_id TEXT,
            student_id TEXT NOT NULL,
            section_id TEXT,
            date TEXT NOT NULL,
            status TEXT NOT NULL,
            remarks TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(student_id, date),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(section_id) REFERENCES sections(id)
        );
        CREATE TABLE IF NOT EXISTS exams(
            id TEXT PRIMARY KEY,
            branch_id TEXT,
            name TEXT NOT NULL,
            class_id TEXT,
            academic_year_id TEXT,
            exam_type TEXT,
            start_date TEXT,
            end_date TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(academic_year_id) REFERENCES academic_years(id)
        );
        CREATE TABLE IF NOT EXISTS exam_results(
            id TEXT PRIMARY KEY,
            branch_id TEXT,
            exam_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            marks_obtained REAL,
            max_marks REAL,
            grade TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(exam_id, student_id, subject_id),
            FOREIGN KEY(exam_id) REFERENCES exams(id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        );
        CREATE TABLE IF NOT EXISTS applications(
            id TEXT PRIMARY KEY,
            branch_id TEXT,
            applicant_name TEXT NOT NULL,
            date_of_birth TEXT,
            applying_for_class_id TEXT,
            guardian_name TEXT,
            guardian_phone TEXT,
            email TEXT,
            status TEXT NOT NULL DEFAULT 'submitted',
            notes TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(applying_for_class_id) REFERENCES classes(id)
        );",
    )?;

    ensure_branch_columns(conn)?;
    ensure_period_break_flag(conn)?;

    for table in crate::resources::RESOURCES.iter().map(|r| r.table) {
        conn.execute(
            &format!("CREATE INDEX IF NOT EXISTS idx_{table}_branch ON {table}(branch_id)"),
            [],
        )?;
    }

    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Single-school databases predate tenancy; their rows stay unscoped (NULL branch).
fn ensure_branch_columns(conn: &Connection) -> anyhow::Result<()> {
    for table in crate::resources::RESOURCES.iter().map(|r| r.table) {
        if !table_has_column(conn, table, "branch_id")? {
            conn.execute(&format!("ALTER TABLE {table} ADD COLUMN branch_id TEXT"), [])?;
        }
    }
    Ok(())
}

fn ensure_period_break_flag(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "timetable_periods", "is_break")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE timetable_periods ADD COLUMN is_break INTEGER NOT NULL DEFAULT 0",
        [],
    )?;
    Ok(())
}
