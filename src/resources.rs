//! Static descriptors for every branch-scoped resource.
//!
//! The CRUD base builds all of its SQL from these tables, so a column name only
//! ever reaches a query string if it is listed here.

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Kind {
    Text,
    Integer,
    /// Integer inside an inclusive range.
    IntRange(i64, i64),
    Real,
    Bool,
    /// `YYYY-MM-DD`
    Date,
    /// `HH:MM`
    Time,
    Enum(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    /// camelCase name used on the wire.
    pub field: &'static str,
    /// snake_case name used in SQL.
    pub column: &'static str,
    pub kind: Kind,
    pub required: bool,
    /// Name of the resource this column points at, resolved inside the same branch.
    pub references: Option<&'static str>,
    /// Server-maintained columns are readable and filterable but never written by clients.
    pub writable: bool,
    /// `NOT NULL DEFAULT …` in the schema: an explicit null on create falls back to the
    /// default and is rejected on update.
    pub defaulted: bool,
}

impl Column {
    const fn new(field: &'static str, column: &'static str, kind: Kind) -> Self {
        Column {
            field,
            column,
            kind,
            required: false,
            references: None,
            writable: true,
            defaulted: false,
        }
    }

    const fn required(self) -> Self {
        Column {
            required: true,
            ..self
        }
    }

    const fn refs(self, resource: &'static str) -> Self {
        Column {
            references: Some(resource),
            ..self
        }
    }

    const fn read_only(self) -> Self {
        Column {
            writable: false,
            ..self
        }
    }

    const fn defaulted(self) -> Self {
        Column {
            defaulted: true,
            ..self
        }
    }
}

const fn text(field: &'static str, column: &'static str) -> Column {
    Column::new(field, column, Kind::Text)
}

const fn int(field: &'static str, column: &'static str) -> Column {
    Column::new(field, column, Kind::Integer)
}

const fn int_in(field: &'static str, column: &'static str, min: i64, max: i64) -> Column {
    Column::new(field, column, Kind::IntRange(min, max))
}

const fn real(field: &'static str, column: &'static str) -> Column {
    Column::new(field, column, Kind::Real)
}

const fn boolean(field: &'static str, column: &'static str) -> Column {
    Column::new(field, column, Kind::Bool)
}

const fn date(field: &'static str, column: &'static str) -> Column {
    Column::new(field, column, Kind::Date)
}

const fn time(field: &'static str, column: &'static str) -> Column {
    Column::new(field, column, Kind::Time)
}

const fn one_of(
    field: &'static str,
    column: &'static str,
    values: &'static [&'static str],
) -> Column {
    Column::new(field, column, Kind::Enum(values))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    Cascade,
    SetNull,
}

#[derive(Debug, Clone, Copy)]
pub struct Child {
    pub resource: &'static str,
    pub fk: &'static str,
    pub on_delete: OnDelete,
}

const fn cascade(resource: &'static str, fk: &'static str) -> Child {
    Child {
        resource,
        fk,
        on_delete: OnDelete::Cascade,
    }
}

const fn set_null(resource: &'static str, fk: &'static str) -> Child {
    Child {
        resource,
        fk,
        on_delete: OnDelete::SetNull,
    }
}

#[derive(Debug)]
pub struct Resource {
    /// Dotted method prefix, e.g. `timetable.periods`.
    pub name: &'static str,
    pub table: &'static str,
    /// Human label used in "not found" messages.
    pub label: &'static str,
    pub columns: &'static [Column],
    /// Api fields searched by the free-text `q` parameter.
    pub search: &'static [&'static str],
    pub default_sort: &'static str,
    pub children: &'static [Child],
}

impl Resource {
    pub fn column(&self, field: &str) -> Option<&'static Column> {
        self.columns.iter().find(|c| c.field == field)
    }

    /// REST path below `/api/v1`, e.g. `/timetable/periods`.
    pub fn http_path(&self) -> String {
        format!("/{}", self.name.replace('.', "/"))
    }
}

pub const STUDENT_STATUS: &[&str] = &["active", "inactive", "graduated", "transferred"];
pub const ENROLLMENT_STATUS: &[&str] = &["active", "withdrawn", "completed"];
pub const STAFF_STATUS: &[&str] = &["active", "on_leave", "inactive"];
pub const SUBSTITUTION_STATUS: &[&str] = &["pending", "approved", "rejected"];
pub const FEE_FREQUENCY: &[&str] = &["one_time", "monthly", "quarterly", "annual"];
pub const INVOICE_STATUS: &[&str] = &["pending", "partial", "paid", "overdue"];
pub const PAYMENT_METHOD: &[&str] = &["cash", "card", "bank_transfer", "cheque", "online"];
pub const TEMPLATE_CHANNEL: &[&str] = &["email", "sms", "push"];
pub const CAMPAIGN_STATUS: &[&str] = &["draft", "scheduled", "sent", "cancelled"];
pub const TICKET_STATUS: &[&str] = &["open", "in_progress", "resolved", "closed"];
pub const TICKET_PRIORITY: &[&str] = &["low", "normal", "high", "urgent"];
pub const ATTENDANCE_STATUS: &[&str] = &["present", "absent", "late", "excused"];
pub const APPLICATION_STATUS: &[&str] = &[
    "submitted",
    "under_review",
    "accepted",
    "rejected",
    "enrolled",
];

pub static STUDENTS: Resource = Resource {
    name: "students",
    table: "students",
    label: "student",
    columns: &[
        text("firstName", "first_name").required(),
        text("lastName", "last_name").required(),
        text("admissionNo", "admission_no"),
        date("dateOfBirth", "date_of_birth"),
        text("gender", "gender"),
        text("email", "email"),
        text("phone", "phone"),
        text("classId", "class_id").refs("classes"),
        text("sectionId", "section_id").refs("sections"),
        one_of("status", "status", STUDENT_STATUS).defaulted(),
    ],
    search: &["firstName", "lastName", "admissionNo", "email"],
    default_sort: "lastName",
    children: &[
        cascade("guardians", "student_id"),
        cascade("enrollments", "student_id"),
        cascade("fees.invoices", "student_id"),
        cascade("attendance", "student_id"),
        cascade("exams.results", "student_id"),
    ],
};

pub static GUARDIANS: Resource = Resource {
    name: "guardians",
    table: "guardians",
    label: "guardian",
    columns: &[
        text("studentId", "student_id").required().refs("students"),
        text("name", "name").required(),
        text("relation", "relation"),
        text("phone", "phone"),
        text("email", "email"),
        boolean("isPrimary", "is_primary").defaulted(),
    ],
    search: &["name", "phone", "email"],
    default_sort: "name",
    children: &[],
};

pub static ENROLLMENTS: Resource = Resource {
    name: "enrollments",
    table: "enrollments",
    label: "enrollment",
    columns: &[
        text("studentId", "student_id").required().refs("students"),
        text("sectionId", "section_id").required().refs("sections"),
        text("academicYearId", "academic_year_id")
            .required()
            .refs("academic-years"),
        date("enrolledOn", "enrolled_on"),
        one_of("status", "status", ENROLLMENT_STATUS).defaulted(),
    ],
    search: &[],
    default_sort: "enrolledOn",
    children: &[],
};

pub static CLASSES: Resource = Resource {
    name: "classes",
    table: "classes",
    label: "class",
    columns: &[
        text("name", "name").required(),
        int_in("gradeLevel", "grade_level", 0, 14),
        text("description", "description"),
    ],
    search: &["name", "description"],
    default_sort: "name",
    children: &[
        cascade("sections", "class_id"),
        cascade("exams", "class_id"),
        set_null("students", "class_id"),
        set_null("fees.structures", "class_id"),
        set_null("admissions.applications", "applying_for_class_id"),
    ],
};

pub static SECTIONS: Resource = Resource {
    name: "sections",
    table: "sections",
    label: "section",
    columns: &[
        text("classId", "class_id").required().refs("classes"),
        text("name", "name").required(),
        int("capacity", "capacity"),
        text("homeroomTeacherId", "homeroom_teacher_id").refs("staff"),
    ],
    search: &["name"],
    default_sort: "name",
    children: &[
        cascade("timetable.periods", "section_id"),
        cascade("enrollments", "section_id"),
        set_null("students", "section_id"),
        set_null("attendance", "section_id"),
    ],
};

pub static STAFF: Resource = Resource {
    name: "staff",
    table: "staff",
    label: "staff member",
    columns: &[
        text("firstName", "first_name").required(),
        text("lastName", "last_name").required(),
        text("email", "email"),
        text("phone", "phone"),
        text("role", "role"),
        text("department", "department"),
        one_of("status", "status", STAFF_STATUS).defaulted(),
    ],
    search: &["firstName", "lastName", "email", "department"],
    default_sort: "lastName",
    children: &[
        set_null("timetable.periods", "teacher_id"),
        set_null("sections", "homeroom_teacher_id"),
        cascade("timetable.substitutions", "substitute_teacher_id"),
        set_null("comms.tickets", "assigned_to"),
    ],
};

pub static ACADEMIC_YEARS: Resource = Resource {
    name: "academic-years",
    table: "academic_years",
    label: "academic year",
    columns: &[
        text("name", "name").required(),
        date("startDate", "start_date").required(),
        date("endDate", "end_date").required(),
        boolean("isCurrent", "is_current").defaulted(),
    ],
    search: &["name"],
    default_sort: "startDate",
    children: &[
        cascade("timetable.periods", "academic_year_id"),
        cascade("enrollments", "academic_year_id"),
        set_null("exams", "academic_year_id"),
    ],
};

pub static SUBJECTS: Resource = Resource {
    name: "timetable.subjects",
    table: "subjects",
    label: "subject",
    columns: &[
        text("code", "code").required(),
        text("name", "name").required(),
        int("credits", "credits"),
        boolean("isElective", "is_elective").defaulted(),
        text("description", "description"),
    ],
    search: &["code", "name"],
    default_sort: "name",
    children: &[
        set_null("timetable.periods", "subject_id"),
        cascade("exams.results", "subject_id"),
    ],
};

pub static ROOMS: Resource = Resource {
    name: "timetable.rooms",
    table: "rooms",
    label: "room",
    columns: &[
        text("name", "name").required(),
        text("building", "building"),
        int("capacity", "capacity"),
        text("roomType", "room_type"),
    ],
    search: &["name", "building"],
    default_sort: "name",
    children: &[
        set_null("timetable.periods", "room_id"),
        set_null("timetable.substitutions", "substitute_room_id"),
    ],
};

pub static PERIODS: Resource = Resource {
    name: "timetable.periods",
    table: "timetable_periods",
    label: "period",
    columns: &[
        text("sectionId", "section_id").required().refs("sections"),
        int("dayOfWeek", "day_of_week").required(),
        int("periodNumber", "period_number").required(),
        time("startTime", "start_time").required(),
        time("endTime", "end_time").required(),
        text("subjectId", "subject_id").refs("timetable.subjects"),
        text("teacherId", "teacher_id").refs("staff"),
        text("roomId", "room_id").refs("timetable.rooms"),
        text("academicYearId", "academic_year_id")
            .required()
            .refs("academic-years"),
        boolean("isBreak", "is_break").defaulted(),
    ],
    search: &[],
    default_sort: "dayOfWeek",
    children: &[cascade("timetable.substitutions", "period_id")],
};

pub static SUBSTITUTIONS: Resource = Resource {
    name: "timetable.substitutions",
    table: "substitutions",
    label: "substitution",
    columns: &[
        text("periodId", "period_id")
            .required()
            .refs("timetable.periods"),
        date("date", "date").required(),
        text("substituteTeacherId", "substitute_teacher_id")
            .required()
            .refs("staff"),
        text("substituteRoomId", "substitute_room_id").refs("timetable.rooms"),
        text("reason", "reason"),
        one_of("status", "status", SUBSTITUTION_STATUS).read_only(),
        text("approvedBy", "approved_by").read_only(),
        text("approvedAt", "approved_at").read_only(),
    ],
    search: &["reason"],
    default_sort: "date",
    children: &[],
};

pub static FEE_STRUCTURES: Resource = Resource {
    name: "fees.structures",
    table: "fee_structures",
    label: "fee structure",
    columns: &[
        text("name", "name").required(),
        text("classId", "class_id").refs("classes"),
        real("amount", "amount").required(),
        one_of("frequency", "frequency", FEE_FREQUENCY),
        int("dueDay", "due_day"),
    ],
    search: &["name"],
    default_sort: "name",
    children: &[set_null("fees.invoices", "fee_structure_id")],
};

pub static INVOICES: Resource = Resource {
    name: "fees.invoices",
    table: "invoices",
    label: "invoice",
    columns: &[
        text("studentId", "student_id").required().refs("students"),
        text("invoiceNo", "invoice_no"),
        text("feeStructureId", "fee_structure_id").refs("fees.structures"),
        real("amount", "amount").required(),
        real("paidAmount", "paid_amount").read_only(),
        date("dueDate", "due_date"),
        one_of("status", "status", INVOICE_STATUS).read_only(),
    ],
    search: &["invoiceNo"],
    default_sort: "dueDate",
    children: &[cascade("fees.payments", "invoice_id")],
};

pub static PAYMENTS: Resource = Resource {
    name: "fees.payments",
    table: "payments",
    label: "payment",
    columns: &[
        text("invoiceId", "invoice_id").required().refs("fees.invoices"),
        real("amount", "amount").required(),
        one_of("method", "method", PAYMENT_METHOD),
        date("paidAt", "paid_at"),
        text("reference", "reference"),
    ],
    search: &["reference"],
    default_sort: "paidAt",
    children: &[],
};

pub static TEMPLATES: Resource = Resource {
    name: "comms.templates",
    table: "comm_templates",
    label: "template",
    columns: &[
        text("name", "name").required(),
        one_of("channel", "channel", TEMPLATE_CHANNEL).required(),
        text("subject", "subject"),
        text("body", "body").required(),
    ],
    search: &["name", "subject", "body"],
    default_sort: "name",
    children: &[set_null("comms.campaigns", "template_id")],
};

pub static CAMPAIGNS: Resource = Resource {
    name: "comms.campaigns",
    table: "comm_campaigns",
    label: "campaign",
    columns: &[
        text("name", "name").required(),
        text("templateId", "template_id").refs("comms.templates"),
        text("audience", "audience"),
        one_of("status", "status", CAMPAIGN_STATUS).defaulted(),
        text("scheduledAt", "scheduled_at"),
    ],
    search: &["name", "audience"],
    default_sort: "name",
    children: &[],
};

pub static TICKETS: Resource = Resource {
    name: "comms.tickets",
    table: "comm_tickets",
    label: "ticket",
    columns: &[
        text("subject", "subject").required(),
        text("description", "description"),
        one_of("status", "status", TICKET_STATUS).defaulted(),
        one_of("priority", "priority", TICKET_PRIORITY).defaulted(),
        text("raisedBy", "raised_by"),
        text("assignedTo", "assigned_to").refs("staff"),
    ],
    search: &["subject", "description", "raisedBy"],
    default_sort: "createdAt",
    children: &[],
};

pub static ATTENDANCE: Resource = Resource {
    name: "attendance",
    table: "attendance_records",
    label: "attendance record",
    columns: &[
        text("studentId", "student_id").required().refs("students"),
        text("sectionId", "section_id").refs("sections"),
        date("date", "date").required(),
        one_of("status", "status", ATTENDANCE_STATUS).required(),
        text("remarks", "remarks"),
    ],
    search: &["remarks"],
    default_sort: "date",
    children: &[],
};

pub static EXAMS: Resource = Resource {
    name: "exams",
    table: "exams",
    label: "exam",
    columns: &[
        text("name", "name").required(),
        text("classId", "class_id").refs("classes"),
        text("academicYearId", "academic_year_id").refs("academic-years"),
        text("examType", "exam_type"),
        date("startDate", "start_date"),
        date("endDate", "end_date"),
    ],
    search: &["name", "examType"],
    default_sort: "startDate",
    children: &[cascade("exams.results", "exam_id")],
};

pub static EXAM_RESULTS: Resource = Resource {
    name: "exams.results",
    table: "exam_results",
    label: "exam result",
    columns: &[
        text("examId", "exam_id").required().refs("exams"),
        text("studentId", "student_id").required().refs("students"),
        text("subjectId", "subject_id")
            .required()
            .refs("timetable.subjects"),
        real("marksObtained", "marks_obtained"),
        real("maxMarks", "max_marks"),
        text("grade", "grade"),
    ],
    search: &["grade"],
    default_sort: "createdAt",
    children: &[],
};

pub static APPLICATIONS: Resource = Resource {
    name: "admissions.applications",
    table: "applications",
    label: "application",
    columns: &[
        text("applicantName", "applicant_name").required(),
        date("dateOfBirth", "date_of_birth"),
        text("applyingForClassId", "applying_for_class_id").refs("classes"),
        text("guardianName", "guardian_name"),
        text("guardianPhone", "guardian_phone"),
        text("email", "email"),
        one_of("status", "status", APPLICATION_STATUS).defaulted(),
        text("notes", "notes"),
    ],
    search: &["applicantName", "guardianName", "email"],
    default_sort: "createdAt",
    children: &[],
};

pub static RESOURCES: &[&Resource] = &[
    &STUDENTS,
    &GUARDIANS,
    &ENROLLMENTS,
    &CLASSES,
    &SECTIONS,
    &STAFF,
    &ACADEMIC_YEARS,
    &SUBJECTS,
    &ROOMS,
    &PERIODS,
    &SUBSTITUTIONS,
    &FEE_STRUCTURES,
    &INVOICES,
    &PAYMENTS,
    &TEMPLATES,
    &CAMPAIGNS,
    &TICKETS,
    &ATTENDANCE,
    &EXAMS,
    &EXAM_RESULTS,
    &APPLICATIONS,
];

pub fn find(name: &str) -> Option<&'static Resource> {
    RESOURCES.iter().copied().find(|r| r.name == name)
}
