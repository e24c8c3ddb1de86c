//! Runs inside a worker container to validate a test's declared `files`
//! matchers against the rootfs.

use clap::Parser;
use pkgfrontend::spec::test_spec::FileCheckOutput;
use pkgfrontend::test_exec::check::check_file;
use std::collections::BTreeMap;
use std::io::Write as _;
use std::os::unix::fs::PermissionsExt;

#[derive(Parser)]
struct Args {
    #[arg(long)]
    errors: String,
    #[arg(long, default_value = "/run/test-files.json")]
    files_file: String,
    #[arg(long, default_value = "/")]
    root: String,
}

fn main() {
    let args = Args::parse();

    let files_text = std::fs::read_to_string(&args.files_file)
        .unwrap_or_else(|e| panic!("reading files manifest {}: {e}", args.files_file));
    let files: BTreeMap<String, FileCheckOutput> =
        serde_json::from_str(&files_text).unwrap_or_else(|e| panic!("parsing files JSON: {e}"));

    let mut failures = Vec::new();

    for (path, matcher) in &files {
        let full_path = format!("{}/{}", args.root.trim_end_matches('/'), path.trim_start_matches('/'));
        let metadata = std::fs::symlink_metadata(&full_path);
        let exists = metadata.is_ok();
        let (mode, is_dir) = match &metadata {
            Ok(m) => (Some(m.permissions().mode()), m.is_dir()),
            Err(_) => (None, false),
        };
        let contents = if exists && !is_dir {
            std::fs::read_to_string(&full_path).ok()
        } else {
            None
        };

        if let Some(reason) = check_file(matcher, path, exists, mode, is_dir, contents.as_deref()) {
            failures.push(reason);
        }
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
