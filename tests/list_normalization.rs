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

fn seed_subjects(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) {
    for (i, (code, name, credits)) in [
        ("MAT", "Mathematics", 4),
        ("PHY", "Physics", 3),
        ("ART", "Art", 1),
        ("BIO", "Biology", 3),
        ("ECO", "Economics", 2),
    ]
    .into_iter()
    .enumerate()
    {
        request_ok(
            stdin,
            reader,
            &format!("seed-{i}"),
            "main",
            "timetable.subjects.create",
            json!({ "data": { "code": code, "name": name, "credits": credits } }),
        );
    }
}

fn names(page: &serde_json::Value) -> Vec<String> {
    page["data"]
        .as_array()
        .expect("data")
        .iter()
        .map(|r| r["name"].as_str().expect("name").to_string())
        .collect()
}

#[test]
fn list_params_are_normalized_and_whitelisted() {
    let workspace = temp_dir("schoold-list-normalization");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&workspace);
    seed_subjects(&mut stdin, &mut reader);

    let desc = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "main",
        "timetable.subjects.list",
        json!({ "sort": "-name" }),
    );
    let got = names(&desc);
    let mut expected = got.clone();
    expected.sort();
    expected.reverse();
    assert_eq!(got, expected);
    assert_eq!(got.first().map(String::as_str), Some("Physics"));

    let admin_style = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "main",
        "timetable.subjects.list",
        json!({ "sort": "[\"credits\",\"DESC\"]", "pageSize": "2", "page": "1" }),
    );
    assert_eq!(admin_style["total"], 5);
    assert_eq!(admin_style["perPage"], 2);
    assert_eq!(admin_style["data"].as_array().expect("data").len(), 2);
    assert_eq!(admin_style["data"][0]["name"], "Mathematics");

    let broken = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "main",
        "timetable.subjects.list",
        json!({ "filter": "{not json" }),
    );
    assert_eq!(broken["total"], 5);

    let filtered = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "main",
        "timetable.subjects.list",
        json!({ "filter": "{\"credits\":3,\"drop table\":1}", "sort": "name" }),
    );
    assert_eq!(names(&filtered), vec!["Biology", "Physics"]);

    let searched = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "main",
        "timetable.subjects.list",
        json!({ "q": "ART" }),
    );
    assert_eq!(names(&searched), vec!["Art"]);

    let physics_id = filtered["data"][1]["id"].as_str().expect("id").to_string();
    let by_ids = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "main",
        "timetable.subjects.list",
        json!({ "ids": [physics_id, "missing"] }),
    );
    assert_eq!(names(&by_ids), vec!["Physics"]);

    let clamped = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "main",
        "timetable.subjects.list",
        json!({ "perPage": 100000, "page": -3 }),
    );
    assert_eq!(clamped["perPage"], 200);
    assert_eq!(clamped["page"], 1);

    drop(stdin);
    let _ = child.wait();
}
