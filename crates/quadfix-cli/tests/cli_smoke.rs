use quadfix_store::{IndexOrdering, NativeStore, Quad, Term};
use serde_json::Value;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
const CONTEXT_CLASS: &str = "http://www.fluidops.com/Context";
const META_CONTEXT: &str = "http://www.fluidops.com/MetaContext";

struct TempDirGuard {
    path: PathBuf,
}

impl TempDirGuard {
    fn new(prefix: &str) -> Self {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "quadfix-cli-{prefix}-{}-{unique}",
            std::process::id()
        ));
        fs::create_dir_all(&path).expect("temp dir should be created");
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempDirGuard {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

fn run_repotool<I, S>(cwd: &Path, args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let bin = env!("CARGO_BIN_EXE_repotool");
    Command::new(bin)
        .current_dir(cwd)
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("repotool command should execute")
}

fn assert_success(output: &Output) {
    if !output.status.success() {
        panic!(
            "command failed with status {:?}\nstdout:\n{}\nstderr:\n{}",
            output.status.code(),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        );
    }
}

fn assert_failure(output: &Output) {
    if output.status.success() {
        panic!(
            "command unexpectedly succeeded\nstdout:\n{}\nstderr:\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        );
    }
}

fn stdout_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn parse_json_stdout(output: &Output) -> Value {
    serde_json::from_slice::<Value>(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "expected valid JSON stdout, got error: {e}\nstdout:\n{}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

fn default_ordering() -> IndexOrdering {
    "spoc,psoc".parse().expect("ordering should parse")
}

fn quad(n: usize, graph: Option<&str>) -> Quad {
    Quad::new(
        Term::iri(format!("urn:s{n}")),
        Term::iri("urn:p"),
        Term::literal(n.to_string()),
        graph.map(Term::iri),
    )
}

fn write_store(path: &Path, quads: impl IntoIterator<Item = Quad>) {
    let mut store = NativeStore::create(path, &default_ordering()).expect("store should be created");
    store.extend(quads).expect("quads should be inserted");
    store.close().expect("store should close");
}

fn write_plain_store(path: &Path, size: usize) {
    write_store(path, (0..size).map(|n| quad(n, None)));
}

fn corrupt_index(path: &Path, permutation: &str) {
    fs::write(path.join(format!("triples-{permutation}.dat")), b"\0garbage")
        .expect("index should be overwritten");
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

#[test]
fn no_arguments_prints_help_and_fails() {
    let tmp = TempDirGuard::new("help");
    let output = run_repotool(tmp.path(), Vec::<&str>::new());
    assert_failure(&output);
    let text = format!("{}{}", stdout_text(&output), stderr_text(&output));
    assert!(text.contains("--analyzeAndFix"));
}

#[test]
fn analyze_healthy_repository() {
    let tmp = TempDirGuard::new("healthy");
    let db = tmp.path().join("dbmodel");
    write_plain_store(&db, 12);

    let output = run_repotool(tmp.path(), ["-a", path_arg(&db).as_str()]);
    assert_success(&output);
    let stdout = stdout_text(&output);
    assert!(stdout.contains("1) Checking repository state with default indices (spoc,psoc)"));
    assert!(stdout.contains("Repository is healthy"));
    assert!(stdout.contains("size: 12"));
}

#[test]
fn analyze_json_keeps_stdout_machine_readable() {
    let tmp = TempDirGuard::new("json");
    let db = tmp.path().join("dbmodel");
    write_plain_store(&db, 7);
    corrupt_index(&db, "spoc");

    let output = run_repotool(tmp.path(), ["--analyze", "--json", path_arg(&db).as_str()]);
    assert_success(&output);
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["analysis"]["classification"]["status"], "corrupt");
    assert_eq!(payload["analysis"]["classification"]["index_fault"], true);
    assert_eq!(payload["outcome"]["outcome"], "corrupt");
    assert_eq!(payload["outcome"]["recovery_source"], "psoc");
    assert!(stderr_text(&output).contains("2) Checking repository state with individual indices"));
    // Analysis never repairs.
    assert!(!tmp.path().join("dbmodel.bak").exists());
}

#[test]
fn analyze_and_fix_repairs_in_place() {
    let tmp = TempDirGuard::new("fix");
    let db = tmp.path().join("dbmodel");
    write_plain_store(&db, 30);
    corrupt_index(&db, "spoc");

    let output = run_repotool(tmp.path(), ["-f", path_arg(&db).as_str()]);
    assert_success(&output);
    let stdout = stdout_text(&output);
    assert!(stdout.contains("4) Trying to repair database"));
    assert!(stdout.contains("Repository was repaired, backup at"));
    assert!(tmp.path().join("dbmodel.bak").is_dir());

    let again = run_repotool(tmp.path(), ["-a", path_arg(&db).as_str()]);
    assert_success(&again);
    assert!(stdout_text(&again).contains("Repository is healthy"));
}

#[test]
fn unrecoverable_repository_fails_with_remediation() {
    let tmp = TempDirGuard::new("unrecoverable");
    let db = tmp.path().join("dbmodel");
    write_plain_store(&db, 3);
    corrupt_index(&db, "spoc");
    corrupt_index(&db, "psoc");

    let output = run_repotool(tmp.path(), ["--analyzeAndFix", path_arg(&db).as_str()]);
    assert_failure(&output);
    let stderr = stderr_text(&output);
    assert!(stderr.contains("all indices are corrupt"));
    assert!(stderr.contains("remediation"));
    assert!(!tmp.path().join("dbmodel.tmp").exists());
    assert!(!tmp.path().join("dbmodel.bak").exists());
}

#[test]
fn locked_repository_is_refused() {
    let tmp = TempDirGuard::new("locked");
    let db = tmp.path().join("dbmodel");
    write_plain_store(&db, 3);
    fs::write(db.join("lock"), "pid=1\n").expect("lock file should be written");

    let output = run_repotool(tmp.path(), ["-a", path_arg(&db).as_str()]);
    assert_failure(&output);
    assert!(stdout_text(&output).contains("Repository is locked"));
    assert!(stderr_text(&output).contains("not accessed by any other process"));
}

#[test]
fn invalid_indices_fail_before_touching_the_store() {
    let tmp = TempDirGuard::new("bad-indices");
    let db = tmp.path().join("dbmodel");
    write_plain_store(&db, 3);

    let output = run_repotool(tmp.path(), ["-a", "-i", "spoc,sp", path_arg(&db).as_str()]);
    assert_failure(&output);
    assert!(stderr_text(&output).contains("invalid index configuration"));
    assert!(db.join("triples.prop").exists());
}

#[test]
fn config_file_supplies_default_repository_path() {
    let tmp = TempDirGuard::new("config");
    write_plain_store(&tmp.path().join("stores").join("main"), 4);
    fs::write(
        tmp.path().join("repotool.toml"),
        "data_dir = \"stores\"\nrepository_name = \"main\"\nnative_store_indices = \"psoc,spoc\"\n",
    )
    .expect("config should be written");

    let output = run_repotool(tmp.path(), ["-a"]);
    assert_success(&output);
    let stdout = stdout_text(&output);
    assert!(stdout.contains("Analyzing repository at stores/main"));
    assert!(stdout.contains("default indices (psoc,spoc)"));
    assert!(stdout.contains("size: 4"));
}

#[test]
fn cleanup_with_garbage_check_removes_ghosts() {
    let tmp = TempDirGuard::new("cleanup");
    let db = tmp.path().join("dbmodel");
    let mut quads = vec![Quad::new(
        Term::iri("urn:graph:kept"),
        Term::iri(RDF_TYPE),
        Term::iri(CONTEXT_CLASS),
        Some(Term::iri(META_CONTEXT)),
    )];
    quads.extend((0..4).map(|n| quad(n, Some("urn:graph:kept"))));
    quads.extend((10..16).map(|n| quad(n, Some("urn:graph:orphan"))));
    write_store(&db, quads);

    let output = run_repotool(tmp.path(), ["-c", "-g", "--json", path_arg(&db).as_str()]);
    assert_success(&output);
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["rebuild"]["size_old"], 11);
    assert_eq!(payload["ghost_cleanup_size"], 5);
    assert_eq!(payload["final_size"], 5);
    assert!(stderr_text(&output).contains("Cleaning up repository at"));
}
