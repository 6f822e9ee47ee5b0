use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn sahayak_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_sahayak"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let knowledge = root.join("knowledge");
    fs::create_dir_all(knowledge.join("schemes")).unwrap();
    fs::write(
        knowledge.join("emi.txt"),
        "EMI (equated monthly instalment) is calculated as P x r x (1+r)^n / ((1+r)^n - 1).\n\
         Here P is the loan principal, r the monthly interest rate and n the number of months.",
    )
    .unwrap();
    fs::write(
        knowledge.join("schemes").join("kcc.md"),
        "# Kisan Credit Card\n\nKisan Credit Card gives farmers short-term credit for crops.\n\n\
         Prompt repayment earns an interest subvention.",
    )
    .unwrap();
    fs::write(
        knowledge.join("cibil.txt"),
        "A CIBIL score between 300 and 900 summarises your repayment history. Above 750 is good.",
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/sahayak.sqlite"

[knowledge]
root = "{root}/knowledge"

[chunking]
chunk_size = 200
chunk_overlap = 20

[embedding]
provider = "hash"
dims = 256

[retrieval]
top_k = 3
min_similarity = 0.0

[generation]
provider = "disabled"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("sahayak.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_sahayak(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = sahayak_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run sahayak binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_sahayak(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data").join("sahayak.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_sahayak(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_sahayak(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_folder() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_sahayak(&config_path, &["ingest"]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Scanned 3 files"));
    assert!(stdout.contains("indexed emi.txt"));
    assert!(stdout.contains("indexed schemes/kcc.md"));
}

#[test]
fn test_ingest_is_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    run_sahayak(&config_path, &["ingest"]);
    let (stdout, _, success) = run_sahayak(&config_path, &["ingest"]);
    assert!(success);
    assert!(stdout.contains("unchanged: 3"));
    assert!(!stdout.contains("indexed "));

    let (stdout, _, _) = run_sahayak(&config_path, &["status"]);
    assert!(stdout.contains("documents:           3"));
}

#[test]
fn test_ingest_full_bumps_versions() {
    let (_tmp, config_path) = setup_test_env();

    run_sahayak(&config_path, &["ingest"]);
    let (stdout, _, success) = run_sahayak(&config_path, &["ingest", "--full"]);
    assert!(success);
    assert!(stdout.contains("indexed emi.txt (version 2"));
}

#[test]
fn test_ingest_prune_removes_deleted_sources() {
    let (tmp, config_path) = setup_test_env();

    run_sahayak(&config_path, &["ingest"]);
    fs::remove_file(tmp.path().join("knowledge").join("cibil.txt")).unwrap();

    let (stdout, _, success) = run_sahayak(&config_path, &["ingest", "--prune"]);
    assert!(success);
    assert!(stdout.contains("removed cibil.txt"));

    let (stdout, _, _) = run_sahayak(&config_path, &["status"]);
    assert!(stdout.contains("documents:           2"));
    assert!(!stdout.contains("cibil.txt"));
}

#[test]
fn test_search_ranks_matching_source_first() {
    let (_tmp, config_path) = setup_test_env();

    run_sahayak(&config_path, &["ingest"]);
    let (stdout, stderr, success) =
        run_sahayak(&config_path, &["search", "Kisan Credit Card for farmers"]);
    assert!(success, "search failed: {}", stderr);
    let first = stdout.lines().next().unwrap();
    assert!(first.starts_with("1. ["), "{}", stdout);
    assert!(first.contains("schemes/kcc.md"), "{}", stdout);
}

#[test]
fn test_search_rejects_oversized_top_k() {
    let (_tmp, config_path) = setup_test_env();

    run_sahayak(&config_path, &["ingest"]);
    let (_, stderr, success) =
        run_sahayak(&config_path, &["search", "CIBIL", "--top-k", "1000000000000"]);
    assert!(!success);
    assert!(stderr.contains("1..=100"), "{}", stderr);
}

#[test]
fn test_search_deterministic() {
    let (_tmp, config_path) = setup_test_env();

    run_sahayak(&config_path, &["ingest"]);
    let (a, _, _) = run_sahayak(&config_path, &["search", "CIBIL score"]);
    let (b, _, _) = run_sahayak(&config_path, &["search", "CIBIL score"]);
    assert_eq!(a, b);
}

#[test]
fn test_search_on_empty_store() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_sahayak(&config_path, &["search", "anything"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_ask_without_generator_falls_back() {
    let (_tmp, config_path) = setup_test_env();

    run_sahayak(&config_path, &["ingest"]);
    let (stdout, stderr, success) = run_sahayak(&config_path, &["ask", "How is EMI calculated?"]);
    assert!(success, "ask failed: {}", stderr);
    assert!(stdout.contains("Please try again later"));
    assert!(stdout.contains("outcome: Unavailable"));
}

#[test]
fn test_ask_json_trace() {
    let (_tmp, config_path) = setup_test_env();

    run_sahayak(&config_path, &["ingest"]);
    let (stdout, _, success) =
        run_sahayak(&config_path, &["ask", "How is EMI calculated?", "--json"]);
    assert!(success);
    let trace: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(trace["query_text"], "How is EMI calculated?");
    assert_eq!(trace["generated_answer"]["outcome"], "unavailable");
    assert!(!trace["retrieval_results"].as_array().unwrap().is_empty());
}

#[test]
fn test_remove_source() {
    let (_tmp, config_path) = setup_test_env();

    run_sahayak(&config_path, &["ingest"]);
    let (stdout, _, success) = run_sahayak(&config_path, &["remove", "emi.txt"]);
    assert!(success);
    assert!(stdout.contains("Removed emi.txt"));

    let (stdout, _, _) = run_sahayak(&config_path, &["remove", "emi.txt"]);
    assert!(stdout.contains("No source named emi.txt"));
}

#[test]
fn test_reindex() {
    let (_tmp, config_path) = setup_test_env();

    run_sahayak(&config_path, &["ingest"]);
    let (stdout, stderr, success) = run_sahayak(&config_path, &["reindex"]);
    assert!(success, "reindex failed: {}", stderr);
    assert!(stdout.contains("with hash-v1-256"));
}

#[test]
fn test_eligibility_without_config() {
    let (stdout, stderr, success) = run_sahayak(
        Path::new("/definitely/not/here.toml"),
        &[
            "eligibility",
            "--income-annum",
            "600000",
            "--loan-amount",
            "1000000",
            "--loan-term",
            "10",
            "--cibil-score",
            "780",
        ],
    );
    assert!(success, "eligibility failed: {}", stderr);
    assert!(stdout.contains("eligible:           true"));
    assert!(stdout.contains("interest rate:      8.5%"));
    assert!(stdout.contains("tenure:             120 months"));
}

#[test]
fn test_eligibility_rejects_invalid_profile() {
    let (_tmp, config_path) = setup_test_env();
    let (_, _, success) = run_sahayak(
        &config_path,
        &[
            "eligibility",
            "--income-annum",
            "600000",
            "--loan-amount",
            "1000000",
            "--loan-term",
            "10",
            "--cibil-score",
            "1200",
        ],
    );
    assert!(!success);
}

#[test]
fn test_missing_config_is_an_error() {
    let (_, stderr, success) = run_sahayak(Path::new("/definitely/not/here.toml"), &["status"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_completions() {
    let (stdout, _, success) =
        run_sahayak(Path::new("/definitely/not/here.toml"), &["completions", "bash"]);
    assert!(success);
    assert!(stdout.contains("sahayak"));
}
