use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use tiny_http::{Response, Server};

fn gqlscope_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_gqlscope"));
    cmd.env("HOME", home);
    cmd.env_remove("GQLSCOPE_CONFIG");
    cmd.env_remove("GQLSCOPE_LOG");
    cmd.env_remove("GQLSCOPE_UI_COLOR");
    cmd.env_remove("GQLSCOPE_UI_MAX_TABLE_ROWS");
    cmd.env_remove("GQLSCOPE_TRANSPORT_TIMEOUT_SECS");
    cmd.env_remove("GQLSCOPE_AUDIT_CONCURRENT");
    cmd.env_remove("GQLSCOPE_AUDIT_PROBE_TIMEOUT_SECS");
    cmd.env_remove("GQLSCOPE_AUDIT_SKIP");
    cmd.env_remove("GQLSCOPE_REPORT_INCLUDE_INTROSPECTION");
    cmd
}

fn run(home: &Path, args: &[&str]) -> Output {
    gqlscope_cmd(home).args(args).output().expect("run gqlscope")
}

fn make_temp_home() -> PathBuf {
    static HOME_SEQ: AtomicU64 = AtomicU64::new(0);
    let seq = HOME_SEQ.fetch_add(1, Ordering::Relaxed);
    let home = std::env::temp_dir().join(format!("gqlscope-exit-test-{}-{seq}", std::process::id()));
    let _ = std::fs::remove_dir_all(&home);
    std::fs::create_dir_all(&home).expect("create home");
    home
}

/// Serves `body` with `status` to every request.
fn spawn_server(status: u16, body: &'static str) -> String {
    let server = Server::http("127.0.0.1:0").expect("bind");
    let addr = server.server_addr().to_ip().expect("ip addr");
    thread::spawn(move || {
        while let Ok(request) = server.recv() {
            let _ = request.respond(Response::from_string(body).with_status_code(status));
        }
    });
    format!("http://{addr}/graphql")
}

/// A port nothing listens on.
fn closed_port_target() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);
    format!("http://127.0.0.1:{port}/graphql")
}

#[test]
fn completion_unknown_shell_exits_2() {
    let home = make_temp_home();
    let out = run(&home, &["completion", "nope"]);
    assert_eq!(out.status.code(), Some(2));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn completion_bash_succeeds() {
    let home = make_temp_home();
    let out = run(&home, &["completion", "bash"]);
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("gqlscope"));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn invalid_headers_exit_2() {
    let home = make_temp_home();
    let out = run(
        &home,
        &["analyze", "--target", "http://127.0.0.1:9/graphql", "--headers", "[1]"],
    );
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("invalid headers JSON"));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn non_http_target_exits_2() {
    let home = make_temp_home();
    let out = run(&home, &["analyze", "--target", "ftp://example.com/graphql"]);
    assert_eq!(out.status.code(), Some(2));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn invalid_probe_filter_exits_2() {
    let home = make_temp_home();
    let out = run(
        &home,
        &["analyze", "--target", "http://127.0.0.1:9/graphql", "--skip", "["],
    );
    assert_eq!(out.status.code(), Some(2));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn zero_timeout_exits_2() {
    let home = make_temp_home();
    let out = run(&home, &["--timeout", "0", "probes"]);
    assert_eq!(out.status.code(), Some(2));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn timeout_longer_than_probe_deadline_exits_2() {
    let home = make_temp_home();
    let out = run(&home, &["--timeout", "120", "probes"]);
    assert_eq!(out.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("audit.probe_timeout_secs"));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn unreachable_target_exits_20() {
    let home = make_temp_home();
    let target = closed_port_target();
    let out = run(&home, &["--timeout", "5", "analyze", "--target", &target]);
    assert_eq!(out.status.code(), Some(20));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn non_json_body_exits_20() {
    let home = make_temp_home();
    let target = spawn_server(200, "<html>hello</html>");
    let out = run(&home, &["analyze", "--target", &target]);
    assert_eq!(out.status.code(), Some(20));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn disabled_introspection_exits_10() {
    let home = make_temp_home();
    let target = spawn_server(
        200,
        r#"{"errors": [{"message": "GraphQL introspection is not allowed"}]}"#,
    );
    let out = run(&home, &["analyze", "--target", &target]);
    assert_eq!(out.status.code(), Some(10));
    assert!(String::from_utf8_lossy(&out.stderr).contains("introspection is unavailable"));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn api_missing_target_exits_2_with_json_error() {
    use std::io::Write;
    use std::process::Stdio;

    let home = make_temp_home();
    let mut child = gqlscope_cmd(&home)
        .args(["api", "analyze"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn gqlscope");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(br#"{"headers": "{}"}"#)
        .expect("write stdin");
    let out = child.wait_with_output().expect("wait");
    assert_eq!(out.status.code(), Some(2));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("parse json");
    assert_eq!(v["error"], "target is required");
    let _ = std::fs::remove_dir_all(&home);
}
