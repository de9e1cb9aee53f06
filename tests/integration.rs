use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    let docs_dir = root.join("docs");
    fs::create_dir_all(&docs_dir).unwrap();
    fs::write(
        docs_dir.join("resume.md"),
        "# Resume\n\nAda builds Rust services for payments.\n\nShe has shipped cargo tooling and crates.",
    )
    .unwrap();
    fs::write(
        docs_dir.join("projects.md"),
        "# Projects\n\nA Python machine learning pipeline.\n\nDeep learning with PyTorch.",
    )
    .unwrap();
    fs::write(
        docs_dir.join("talks.txt"),
        "Talks about deployment and infrastructure.\n\nKubernetes and Docker in production.",
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/folio.sqlite"

[persona]
name = "Ada Example"
title = "Backend Engineer"

[documents]
dir = "{root}/docs"

[server]
bind = "127.0.0.1:0"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("folio.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_folio(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let workdir = config_path.parent().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_folio"))
        .current_dir(workdir)
        .env_remove("OPENAI_API_KEY")
        .env_remove("PUSHOVER_TOKEN")
        .env_remove("PUSHOVER_USER")
        .arg("--config")
        .arg(config_path)
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run folio: {}", e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_folio(&config_path, &["init"]);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("Database initialized"));
    assert!(tmp.path().join("data/folio.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();
    let (_, _, first) = run_folio(&config_path, &["init"]);
    let (_, stderr, second) = run_folio(&config_path, &["init"]);
    assert!(first);
    assert!(second, "second init failed: {}", stderr);
}

#[test]
fn test_missing_config_fails() {
    let (tmp, _) = setup_test_env();
    let (_, stderr, success) = run_folio(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"), "stderr: {}", stderr);
}

#[test]
fn test_invalid_config_fails() {
    let (_tmp, config_path) = setup_test_env();
    let mut content = fs::read_to_string(&config_path).unwrap();
    content.push_str("\n[model]\ntemperature = 5.0\n");
    fs::write(&config_path, content).unwrap();

    let (_, stderr, success) = run_folio(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("temperature"), "stderr: {}", stderr);
}

#[test]
fn test_chat_requires_api_key() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_folio(&config_path, &["chat", "--message", "hello"]);
    assert!(!success);
    assert!(stderr.contains("OPENAI_API_KEY"), "stderr: {}", stderr);
}

#[test]
fn test_serve_requires_api_key() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_folio(&config_path, &["serve"]);
    assert!(!success);
    assert!(stderr.contains("OPENAI_API_KEY"), "stderr: {}", stderr);
}

#[test]
fn test_documents_list() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_folio(&config_path, &["documents", "list"]);
    assert!(success, "list failed: {}", stderr);
    assert!(stdout.contains("resume.md"));
    assert!(stdout.contains("projects.md"));
    assert!(stdout.contains("talks.txt"));
}

#[test]
fn test_documents_stats() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) = run_folio(&config_path, &["documents", "stats"]);
    assert!(success);
    assert!(stdout.contains("Total:       3"), "got: {}", stdout);
    assert!(stdout.contains("Failed:      0"));
}

#[test]
fn test_documents_search() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) = run_folio(&config_path, &["documents", "search", "rust"]);
    assert!(success);
    assert!(stdout.starts_with("1. "), "got: {}", stdout);
    assert!(stdout.contains("resume.md"));
    assert!(!stdout.contains("projects.md"));
}

#[test]
fn test_documents_search_deterministic() {
    let (_tmp, config_path) = setup_test_env();
    let (first, _, _) = run_folio(&config_path, &["documents", "search", "deployment"]);
    let (second, _, _) = run_folio(&config_path, &["documents", "search", "deployment"]);
    assert_eq!(first, second);
}

#[test]
fn test_documents_search_no_results() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) = run_folio(&config_path, &["documents", "search", "zyxwvut"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_documents_add() {
    let (tmp, config_path) = setup_test_env();
    let upload = tmp.path().join("cover-letter.md");
    fs::write(&upload, "# Cover letter\n\nI would love to work on compilers.").unwrap();

    let (stdout, stderr, success) =
        run_folio(&config_path, &["documents", "add", upload.to_str().unwrap()]);
    assert!(success, "add failed: {}", stderr);
    assert!(stdout.contains("Added cover-letter.md"));
    assert!(tmp.path().join("docs/cover-letter.md").exists());

    let (list, _, _) = run_folio(&config_path, &["documents", "list"]);
    assert!(list.contains("cover-letter.md"));
}

#[test]
fn test_documents_add_unsupported() {
    let (tmp, config_path) = setup_test_env();
    let upload = tmp.path().join("photo.png");
    fs::write(&upload, [0u8; 8]).unwrap();

    let (_, stderr, success) =
        run_folio(&config_path, &["documents", "add", upload.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("unsupported file type"), "stderr: {}", stderr);
}

#[test]
fn test_analytics_empty() {
    let (_tmp, config_path) = setup_test_env();
    run_folio(&config_path, &["init"]);
    let (stdout, stderr, success) = run_folio(&config_path, &["analytics", "--days", "30"]);
    assert!(success, "analytics failed: {}", stderr);
    assert!(stdout.contains("Folio Analytics (last 30 days)"));
    assert!(stdout.contains("Conversations:   0"));
}

#[test]
fn test_analytics_rejects_zero_days() {
    let (_tmp, config_path) = setup_test_env();
    let (_, _, success) = run_folio(&config_path, &["analytics", "--days", "0"]);
    assert!(!success);
}

#[test]
fn test_contacts_empty() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) = run_folio(&config_path, &["contacts"]);
    assert!(success);
    assert!(stdout.contains("Contacts (0 total)"));
    assert!(stdout.contains("No contacts captured yet."));
}

#[test]
fn test_questions_empty() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) = run_folio(&config_path, &["questions", "--limit", "5"]);
    assert!(success);
    assert!(stdout.contains("No unanswered questions."));
}
