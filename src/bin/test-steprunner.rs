//! Runs inside a worker container to execute one test step and validate its
//! captured output against the step's `CheckOutput` matchers.

use clap::Parser;
use pkgfrontend::spec::test_spec::TestStep;
use pkgfrontend::test_exec::check::check_output;
use std::io::Write as _;
use std::process::{Command, Stdio};

#[derive(Parser)]
struct Args {
    #[arg(long)]
    test: String,
    #[arg(long)]
    errors: String,
    #[arg(long, default_value = "/run/test-step.json")]
    step_file: String,
}

fn main() {
    let args = Args::parse();

    let step_text = std::fs::read_to_string(&args.step_file)
        .unwrap_or_else(|e| panic!("reading step file {}: {e}", args.step_file));
    let step: TestStep =
        serde_json::from_str(&step_text).unwrap_or_else(|e| panic!("parsing step JSON: {e}"));

    let mut failures = Vec::new();

    let mut child = Command::new("/bin/sh")
        .arg("-c")
        .arg(&step.command)
        .envs(&step.env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap_or_else(|e| panic!("spawning step command: {e}"));

    if let Some(stdin_text) = &step.stdin {
        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(stdin_text.as_bytes());
        }
    }

    let output = child
        .wait_with_output()
        .unwrap_or_else(|e| panic!("waiting for step command: {e}"));
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if let Some(reason) = check_output(&step.stdout, &stdout) {
        failures.push(format!("test '{}', stdout: {reason}", args.test));
    }
    if let Some(reason) = check_output(&step.stderr, &stderr) {
        failures.push(format!("test '{}', stderr: {reason}", args.test));
    }

    if !failures.is_empty() {
        append_errors(&args.errors, &failures.join("\n"));
        std::process::exit(1);
    }
}

fn append_errors(path: &str, text: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap_or_else(|e| panic!("opening errors file {path}: {e}"));
    let _ = writeln!(file, "{text}");
}
