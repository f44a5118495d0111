use std::fs;
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tempfile::TempDir;

fn desk_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("desk");
    path
}

fn write_config(root: &Path, extra: &str) -> PathBuf {
    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let config_content = format!(
        r#"[db]
path = "{}/data/desk.sqlite"

[collections]
read = ["dailytotals_t3global", "Locates"]
review = ["dailytotals_t3global", "Locates"]

[viewers.locates]
collection = "Locates"
filter = "date_range"
confirm_prompt = "Confirm marking this locate as reviewed?"
{}
"#,
        root.display(),
        extra
    );
    let config_path = config_dir.join("desk.toml");
    fs::write(&config_path, config_content).unwrap();
    config_path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    fs::write(
        root.join("totals.json"),
        r#"[
  {"id": "2024-01-01", "total": 10, "reviewed": true, "reviewedBy": "bo"},
  {"id": "2024-01-02", "total": 12},
  {"id": "2024-02-01", "total": 4}
]"#,
    )
    .unwrap();
    fs::write(
        root.join("locates.json"),
        r#"{
  "L-1": {"date": "2024-01-10", "rows": {"1": {"a": "x", "b": "he said \"hi\""}, "0": {"a": "1,2", "b": "y"}}},
  "L-2": {"date": "2024-03-10", "tags": ["a", "b"]}
}"#,
    )
    .unwrap();

    let config_path = write_config(&root, "");
    (tmp, config_path)
}

fn run_desk(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = desk_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .stdin(Stdio::null())
        .output()
        .unwrap_or_else(|e| panic!("Failed to run desk binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn seeded() -> (TempDir, PathBuf) {
    let (tmp, config_path) = setup_test_env();
    let root = tmp.path();
    let (_, stderr, ok) = run_desk(&config_path, &["init"]);
    assert!(ok, "init failed: {}", stderr);
    let totals = root.join("totals.json");
    let locates = root.join("locates.json");
    let (_, stderr, ok) = run_desk(
        &config_path,
        &["import", "dailytotals_t3global", totals.to_str().unwrap()],
    );
    assert!(ok, "import failed: {}", stderr);
    let (_, stderr, ok) = run_desk(&config_path, &["import", "Locates", locates.to_str().unwrap()]);
    assert!(ok, "import failed: {}", stderr);
    (tmp, config_path)
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success1) = run_desk(&config_path, &["init"]);
    assert!(success1, "First init failed");
    assert!(stdout.contains("initialized"));

    let (_, _, success2) = run_desk(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_import_and_collections() {
    let (_tmp, config_path) = seeded();
    let (stdout, stderr, ok) = run_desk(&config_path, &["collections"]);
    assert!(ok, "collections failed: {}", stderr);
    let totals = stdout
        .lines()
        .find(|l| l.starts_with("dailytotals_t3global"))
        .unwrap();
    assert!(totals.ends_with('3'), "got: {}", totals);
    assert!(stdout.contains("locates"));
}

#[test]
fn test_load_grid_and_json() {
    let (_tmp, config_path) = seeded();

    let (stdout, stderr, ok) = run_desk(
        &config_path,
        &[
            "load",
            "dailytotals_t3global",
            "--start",
            "2024-01-01",
            "--end",
            "2024-01-31",
        ],
    );
    assert!(ok, "load failed: {}", stderr);
    assert!(stdout.contains("2024-01-01"));
    assert!(stdout.contains("yes (bo)"));
    assert!(!stdout.contains("2024-02-01"));
    assert!(stdout.contains("2 document(s)"));

    let (stdout, _, ok) = run_desk(
        &config_path,
        &["load", "dailytotals_t3global", "--unreviewed", "--json"],
    );
    assert!(ok);
    let docs: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let ids: Vec<&str> = docs
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["2024-01-02", "2024-02-01"]);
}

#[test]
fn test_load_rejects_unlisted_collection() {
    let (_tmp, config_path) = seeded();
    let (_, stderr, ok) = run_desk(&config_path, &["load", "users"]);
    assert!(!ok);
    assert!(stderr.contains("unauthorized collection: users"));
}

#[test]
fn test_viewer_filter_mode_is_enforced() {
    let (_tmp, config_path) = seeded();
    let (_, stderr, ok) = run_desk(&config_path, &["load", "locates", "--date", "2024-01-10"]);
    assert!(!ok);
    assert!(stderr.contains("does not accept"));
}

#[test]
fn test_review_flow() {
    let (_tmp, config_path) = seeded();

    // Without --yes and without a terminal, nothing is written.
    let (_, _, ok) = run_desk(
        &config_path,
        &["review", "dailytotals_t3global", "2024-01-02", "--reviewer", "ana"],
    );
    assert!(!ok);

    // No reviewer: silently skipped.
    let (stdout, _, ok) = run_desk(
        &config_path,
        &["review", "dailytotals_t3global", "2024-01-02", "--yes"],
    );
    assert!(ok);
    assert!(!stdout.contains("reviewed dailytotals_t3global"));

    let (stdout, stderr, ok) = run_desk(
        &config_path,
        &[
            "review",
            "dailytotals_t3global",
            "2024-01-02",
            "--reviewer",
            "ana",
            "--yes",
        ],
    );
    assert!(ok, "review failed: {}", stderr);
    assert!(stdout.contains("reviewed dailytotals_t3global/2024-01-02 by ana"));

    let (stdout, _, ok) = run_desk(
        &config_path,
        &[
            "review",
            "dailytotals_t3global",
            "2024-01-02",
            "--reviewer",
            "bo",
            "--yes",
        ],
    );
    assert!(ok);
    assert!(stdout.contains("already reviewed by ana"));

    let (stdout, _, ok) = run_desk(
        &config_path,
        &[
            "review",
            "dailytotals_t3global",
            "2024-01-02",
            "--reviewer",
            "bo",
            "--yes",
            "--force",
        ],
    );
    assert!(ok);
    assert!(stdout.contains("by bo"));
}

#[test]
fn test_review_missing_document() {
    let (_tmp, config_path) = seeded();
    let (_, stderr, ok) = run_desk(
        &config_path,
        &[
            "review",
            "dailytotals_t3global",
            "2030-01-01",
            "--reviewer",
            "ana",
            "--yes",
        ],
    );
    assert!(!ok);
    assert!(stderr.contains("document not found"));
}

#[test]
fn test_review_only_collection_is_reviewable() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    let config_path = root.join("desk.toml");
    fs::write(
        &config_path,
        format!(
            r#"[db]
path = "{}/desk.sqlite"

[collections]
read = ["dailytotals_t3global"]
review = ["LocatesData"]
"#,
            root.display()
        ),
    )
    .unwrap();
    let data = root.join("locates_data.json");
    fs::write(&data, r#"[{"id": "d1", "qty": 3}]"#).unwrap();

    let (_, stderr, ok) = run_desk(&config_path, &["init"]);
    assert!(ok, "init failed: {}", stderr);
    let (_, stderr, ok) = run_desk(&config_path, &["import", "LocatesData", data.to_str().unwrap()]);
    assert!(ok, "import failed: {}", stderr);

    // Not readable...
    let (_, stderr, ok) = run_desk(&config_path, &["load", "LocatesData", "--json"]);
    assert!(!ok);
    assert!(stderr.contains("unauthorized collection"), "got: {}", stderr);

    // ...but reviewable.
    let (stdout, stderr, ok) = run_desk(
        &config_path,
        &["review", "LocatesData", "d1", "--reviewer", "ana", "--yes"],
    );
    assert!(ok, "review failed: {}", stderr);
    assert!(stdout.contains("reviewed LocatesData/d1 by ana"));

    // Missing documents still fail, in the store.
    let (_, stderr, ok) = run_desk(
        &config_path,
        &["review", "LocatesData", "d9", "--reviewer", "ana", "--yes"],
    );
    assert!(!ok);
    assert!(stderr.contains("no document to update"), "got: {}", stderr);
}

#[test]
fn test_export_csv() {
    let (tmp, config_path) = seeded();
    let out = tmp.path().join("csv");
    let (stdout, stderr, ok) = run_desk(
        &config_path,
        &["export", "locates", "L-1", "--out", out.to_str().unwrap()],
    );
    assert!(ok, "export failed: {}", stderr);
    assert!(stdout.contains("L-1_rows.csv"));

    let contents = fs::read_to_string(out.join("L-1_rows.csv")).unwrap();
    assert_eq!(
        contents,
        "a,b\r\n\"1,2\",\"y\"\r\n\"x\",\"he said \"\"hi\"\"\""
    );

    let (stdout, _, ok) = run_desk(
        &config_path,
        &["export", "locates", "L-2", "--out", out.to_str().unwrap()],
    );
    assert!(ok);
    assert!(stdout.contains("no record lists"));
}

// ─── Remote mode ────────────────────────────────────────────────────

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

struct ServerProcess(Child);

impl Drop for ServerProcess {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn spawn_server(config_path: &Path, port: u16) -> ServerProcess {
    let child = Command::new(desk_binary())
        .arg("--config")
        .arg(config_path)
        .arg("serve")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    let server = ServerProcess(child);
    for _ in 0..50 {
        std::thread::sleep(Duration::from_millis(100));
        if TcpStream::connect(("127.0.0.1", port)).is_ok() {
            return server;
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

#[test]
fn test_remote_load_and_review() {
    let (tmp, local_config) = seeded();
    let port = find_free_port();
    let server_config = write_config(
        &tmp.path().join("server"),
        &format!("\n[server]\nbind = \"127.0.0.1:{}\"\n", port),
    );
    // Same database for the server.
    let server_config_text = fs::read_to_string(&server_config)
        .unwrap()
        .replace(
            &format!("{}/server/data", tmp.path().display()),
            &format!("{}/data", tmp.path().display()),
        );
    fs::write(&server_config, server_config_text).unwrap();
    let _server = spawn_server(&server_config, port);

    let client_config = write_config(
        &tmp.path().join("client"),
        &format!(
            "\n[client]\nendpoint = \"http://127.0.0.1:{}\"\nreviewer = \"remote-ana\"\n",
            port
        ),
    );

    let (stdout, stderr, ok) = run_desk(
        &client_config,
        &["load", "dailytotals_t3global", "--date", "2024-02-01", "--json"],
    );
    assert!(ok, "remote load failed: {}", stderr);
    assert!(stdout.contains("\"2024-02-01\""));

    let (stdout, stderr, ok) = run_desk(
        &client_config,
        &["review", "dailytotals_t3global", "2024-02-01", "--yes"],
    );
    assert!(ok, "remote review failed: {}", stderr);
    assert!(stdout.contains("by remote-ana"));

    let (stdout, _, ok) = run_desk(
        &local_config,
        &["load", "dailytotals_t3global", "--date", "2024-02-01", "--json"],
    );
    assert!(ok);
    assert!(stdout.contains("remote-ana"));

    let (_, stderr, ok) = run_desk(&client_config, &["load", "users"]);
    assert!(!ok);
    assert!(stderr.contains("unauthorized collection: users"));
}
