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
fn delete_is_not_idempotent_and_cascades() {
    let workspace = temp_dir("schoold-delete-semantics");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&workspace);

    let student = id_of(&request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "main",
        "students.create",
        json!({ "data": { "firstName": "Kai", "lastName": "Bose" } }),
    ));
    let guardian = id_of(&request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "main",
        "guardians.create",
        json!({ "data": { "studentId": student, "name": "Mira Bose", "isPrimary": true } }),
    ));
    let invoice = id_of(&request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "main",
        "fees.invoices.create",
        json!({ "data": { "studentId": student, "amount": 500 } }),
    ));
    request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "main",
        "fees.payments.create",
        json!({ "data": { "invoiceId": invoice, "amount": 100, "method": "cash" } }),
    );

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "main",
        "students.delete",
        json!({ "id": student }),
    );
    assert_eq!(first["id"], student.as_str());

    let second = request(
        &mut stdin,
        &mut reader,
        "6",
        "main",
        "students.delete",
        json!({ "id": student }),
    );
    let e = error_of(&second);
    assert_eq!(e["status"], 404);
    assert_eq!(e["code"], "not_found");

    for (i, (method, id)) in [
        ("guardians.get", guardian.as_str()),
        ("fees.invoices.get", invoice.as_str()),
    ]
    .into_iter()
    .enumerate()
    {
        let gone = request(
            &mut stdin,
            &mut reader,
            &format!("g{i}"),
            "main",
            method,
            json!({ "id": id }),
        );
        assert_eq!(error_of(&gone)["status"], 404, "{method}");
    }
    let payments = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "main",
        "fees.payments.list",
        json!({}),
    );
    assert_eq!(payments["total"], 0);

    // Soft references are cleared, not deleted.
    let template = id_of(&request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "main",
        "comms.templates.create",
        json!({ "data": { "name": "welcome", "channel": "email", "body": "Hi {{name}}" } }),
    ));
    let campaign = id_of(&request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "main",
        "comms.campaigns.create",
        json!({ "data": { "name": "term start", "templateId": template } }),
    ));
    request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "main",
        "comms.templates.delete",
        json!({ "id": template }),
    );
    let kept = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "main",
        "comms.campaigns.get",
        json!({ "id": campaign }),
    );
    assert!(kept["templateId"].is_null());
    assert_eq!(kept["status"], "draft");

    drop(stdin);
    let _ = child.wait();
}
