use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar(workspace: &PathBuf) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_schoold");
    let mut child = Command::new(exe)
        .env("SCHOOLD_DB_PATH", workspace.join("school.sqlite3"))
        .env("SCHOOLD_MODE", "stdio")
        .env_remove("SCHOOLD_DEFAULT_BRANCH")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn schoold");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    branch: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
        "headers": { "X-Branch-Id": branch },
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    branch: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, branch, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_of(value: &serde_json::Value) -> &serde_json::Value {
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false), "expected error: {}", value);
    value.get("error").expect("error object")
}

fn id_of(v: &serde_json::Value) -> String {
    v["id"].as_str().expect("id").to_string()
}

#[test]
fn generator_fills_slots_and_refuses_overbooking() {
    let workspace = temp_dir("schoold-timetable-generate");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&workspace);

    let year = id_of(&request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "main",
        "academic-years.create",
        json!({
            "data": { "name": "2025-26", "startDate": "2025-04-01", "endDate": "2026-03-31" },
        }),
    ));
    let class = id_of(&request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "main",
        "classes.create",
        json!({ "data": { "name": "Class 7" } }),
    ));
    let section = id_of(&request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "main",
        "sections.create",
        json!({ "data": { "classId": class, "name": "C" } }),
    ));
    let maths = id_of(&request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "main",
        "timetable.subjects.create",
        json!({ "data": { "code": "MAT", "name": "Mathematics" } }),
    ));
    let english = id_of(&request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "main",
        "timetable.subjects.create",
        json!({ "data": { "code": "ENG", "name": "English" } }),
    ));

    let too_many = request(
        &mut stdin,
        &mut reader,
        "6",
        "main",
        "timetable.generate",
        json!({
            "sectionId": section,
            "academicYearId": year,
            "allocations": [
                { "subjectId": maths, "periodsPerWeek": 30 },
                { "subjectId": english, "periodsPerWeek": 19 },
            ],
        }),
    );
    let e = error_of(&too_many);
    assert_eq!(e["status"], 400);
    assert_eq!(e["detail"], "Not enough time slots available.");

    let generated = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "main",
        "timetable.generate",
        json!({
            "sectionId": section,
            "academicYearId": year,
            "allocations": [
                { "subjectId": maths, "periodsPerWeek": 6 },
                { "subjectId": english, "periodsPerWeek": 5 },
            ],
        }),
    );
    assert_eq!(generated["total"], 11);
    for p in generated["data"].as_array().expect("periods") {
        let day = p["dayOfWeek"].as_i64().expect("day");
        let number = p["periodNumber"].as_i64().expect("period");
        assert!((1..=6).contains(&day));
        assert!((1..=8).contains(&number));
    }

    // Running again replaces rather than appends.
    let again = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "main",
        "timetable.generate",
        json!({
            "sectionId": section,
            "academicYearId": year,
            "allocations": [{ "subjectId": maths, "periodsPerWeek": 4 }],
        }),
    );
    assert_eq!(again["replaced"], 11);

    let grid = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "main",
        "timetable.sections.get",
        json!({ "id": section, "academicYearId": year }),
    );
    assert_eq!(grid["total"], 4);
    let mut last = (0, 0);
    for p in grid["periods"].as_array().expect("periods") {
        let key = (
            p["dayOfWeek"].as_i64().expect("day"),
            p["periodNumber"].as_i64().expect("period"),
        );
        assert!(key > last, "grid must be ordered by day then period");
        last = key;
    }

    let elsewhere = request(
        &mut stdin,
        &mut reader,
        "10",
        "west",
        "timetable.generate",
        json!({
            "sectionId": section,
            "academicYearId": year,
            "allocations": [{ "subjectId": maths, "periodsPerWeek": 1 }],
        }),
    );
    assert_eq!(error_of(&elsewhere)["status"], 404);

    drop(stdin);
    let _ = child.wait();
}
