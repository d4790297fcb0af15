//! Integration tests for sb

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::atomic::{AtomicUsize, Ordering};

use color_eyre::eyre::{bail, Context, Result};
use libtest_mimic::{Arguments, Trial};

// Re-export from lib for test registration
pub(crate) use integration_tests::{
    cluster_integration_test, integration_test, INTEGRATION_TESTS, TEST_NAMESPACE_PREFIX,
};


/// Get the path to the sb binary
///
/// Checks SB_PATH env var first, then looks for the binary in target directories.
pub(crate) fn get_sb_command() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("SB_PATH") {
        return Ok(PathBuf::from(path));
    }

    let candidates = ["target/debug/sb", "target/release/sb"];
    for candidate in candidates {
        let path = PathBuf::from(candidate);
        if path.exists() {
            return Ok(path.canonicalize()?);
        }
    }

    // Fall back to hoping it's in PATH
    Ok(PathBuf::from("sb"))
}

/// Check if `oc` is installed and logged in
pub(crate) fn cluster_available() -> bool {
    Command::new("oc")
        .args(["whoami"])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Captured output from a command with decoded stdout/stderr strings
pub(crate) struct CapturedOutput {
    pub output: Output,
    pub stdout: String,
    pub stderr: String,
}

impl CapturedOutput {
    pub fn new(output: Output) -> Self {
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        Self {
            output,
            stdout,
            stderr,
        }
    }

    /// Combined stdout and stderr
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }

    /// Assert that the command succeeded, printing debug info on failure
    pub fn assert_success(&self, context: &str) {
        assert!(
            self.output.status.success(),
            "{} failed:\nstdout: {}\nstderr: {}",
            context,
            self.stdout,
            self.stderr
        );
    }

    /// Assert the exit code, printing debug info on mismatch
    pub fn assert_code(&self, code: i32, context: &str) {
        assert_eq!(
            self.output.status.code(),
            Some(code),
            "{}:\nstdout: {}\nstderr: {}",
            context,
            self.stdout,
            self.stderr
        );
    }
}

/// Run sb, capturing output
pub(crate) fn run_sb(args: &[&str]) -> Result<CapturedOutput> {
    let sb = get_sb_command()?;
    let output = Command::new(&sb)
        .args(args)
        .output()
        .with_context(|| format!("Failed to run sb {:?}", args))?;
    Ok(CapturedOutput::new(output))
}

/// Run sb in a project directory with an empty config directory
pub(crate) fn run_sb_in(dir: &Path, args: &[&str]) -> Result<CapturedOutput> {
    let sb = get_sb_command()?;
    let output = Command::new(&sb)
        .current_dir(dir)
        .env("XDG_CONFIG_HOME", dir.join(".config"))
        .env_remove("SB_NAMESPACE")
        .args(args)
        .output()
        .with_context(|| format!("Failed to run sb {:?} in {:?}", args, dir))?;
    Ok(CapturedOutput::new(output))
}

/// Run a command and assert it succeeded, returning stdout
pub(crate) fn run_command_success(program: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .with_context(|| format!("Failed to run {} {:?}", program, args))?;
    let output = CapturedOutput::new(output);
    if !output.output.status.success() {
        bail!(
            "{} {:?} failed:\nstdout: {}\nstderr: {}",
            program,
            args,
            output.stdout,
            output.stderr
        );
    }
    Ok(output.stdout)
}

/// A scratch project: descriptor, sources and a built archive
pub(crate) struct TestProject {
    dir: tempfile::TempDir,
}

impl TestProject {
    /// Create a project named `name`; `namespace` goes into the descriptor
    /// when given.
    pub fn new(name: &str, namespace: Option<&str>) -> Result<Self> {
        let dir = tempfile::TempDir::new()?;
        let mut manifest = format!("name: {}\nversion: \"1.0\"\nport: 8080\n", name);
        if let Some(ns) = namespace {
            manifest.push_str(&format!("namespace: {}\n", ns));
        }
        std::fs::write(dir.path().join("MANIFEST"), manifest)?;

        let java = dir.path().join("src/main/java/demo");
        std::fs::create_dir_all(&java)?;
        std::fs::write(
            java.join("App.java"),
            "package demo;\npublic class App { public static void main(String[] a) {} }\n",
        )?;
        std::fs::write(dir.path().join("pom.xml"), "<project/>\n")?;
        std::fs::create_dir_all(dir.path().join("target"))?;
        std::fs::write(dir.path().join(format!("target/{}-1.0.jar", name)), "")?;

        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// A throwaway project (namespace), deleted on drop
pub(crate) struct NamespaceGuard {
    name: String,
}

static NAMESPACE_SEQ: AtomicUsize = AtomicUsize::new(0);

impl NamespaceGuard {
    pub fn create() -> Result<Self> {
        let seq = NAMESPACE_SEQ.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}{}-{}", TEST_NAMESPACE_PREFIX, std::process::id(), seq);
        run_command_success("oc", &["new-project", &name, "--skip-config-write"])?;
        Ok(Self { name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for NamespaceGuard {
    fn drop(&mut self) {
        // Best effort cleanup
        let _ = Command::new("oc")
            .args(["delete", "project", &self.name, "--wait=false"])
            .output();
    }
}

fn main() {
    // Initialize tracing for better debug output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Arguments::from_args();

    let has_cluster = cluster_available();
    if !has_cluster {
        eprintln!("Note: oc not logged in, skipping cluster tests");
    }

    // Collect tests from the distributed slice
    let tests: Vec<Trial> = INTEGRATION_TESTS
        .iter()
        .map(|test| {
            let name = test.name;
            let f = test.f;
            let requires_cluster = test.requires_cluster;

            let mut trial = Trial::test(name, move || f().map_err(|e| format!("{:?}", e).into()));

            if requires_cluster && !has_cluster {
                trial = trial.with_ignored_flag(true);
            }

            trial
        })
        .collect();

    libtest_mimic::run(&args, tests).exit();
}
