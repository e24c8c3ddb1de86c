/*!
The test executor: builds and runs every declared test against a built
container, aggregating pass/fail per test.
*/

pub mod check;
pub mod error;

use crate::graph::{BuildClient, Cancellation, ContentRef, GraphOp, GraphState, Mount, NetworkPolicy};
use crate::spec::test_spec::TestSpec;
use crate::spec::Spec;
use crate::worker::Worker;
use error::Result;
use std::sync::Arc;
use tracing::instrument;

const FRONTEND_IMAGE: &str = "pkgfrontend:self";
const ERRORS_PATH: &str = "/result/errors.txt";

/// Runs every test declared for `target_key` against the built container.
/// `with_test_deps` is the state produced by installing `test-dependencies`
/// directly on top of the container; each test step and file check runs
/// with that state as the `Run` base, not nested under a mount. The client
/// is `Arc`-shared since tests run concurrently, each on its own
/// `tokio::task` — this is the one place in the pipeline where work fans
/// out in parallel.
#[instrument(level = "info", skip_all, fields(package = %spec.name, target_key))]
pub async fn run_tests<C: BuildClient + 'static>(
    client: Arc<C>,
    _worker: &Worker,
    spec: &Spec,
    _container_ref: &ContentRef,
    with_test_deps: GraphState,
    target_key: &str,
    cancellation: &Cancellation,
) -> Result<()> {
    if client.build_opts().get("DALEC_SKIP_TESTS").map(String::as_str) == Some("true") {
        tracing::info!("tests skipped via DALEC_SKIP_TESTS");
        client.warn(&with_test_deps, "tests skipped via DALEC_SKIP_TESTS").await;
        return Ok(());
    }

    let tests = spec.tests_for(target_key);
    tracing::info!(count = tests.len(), "running tests");
    let mut handles = Vec::with_capacity(tests.len());
    for test in tests.clone() {
        let client = client.clone();
        let with_test_deps = with_test_deps.clone();
        let cancellation = cancellation.clone();
        handles.push(tokio::spawn(async move {
            run_one_test(client.as_ref(), &test, with_test_deps, &cancellation).await
        }));
    }

    let test_names: Vec<String> = tests.iter().map(|t| t.name.clone()).collect();
    let mut failures = Vec::new();
    for (test_name, handle) in test_names.into_iter().zip(handles) {
        match handle.await {
            Ok(Ok(None)) => {}
            Ok(Ok(Some(failure_text))) => failures.push(format!("{test_name}:\n{failure_text}")),
            Ok(Err(e)) => failures.push(format!("{test_name}: engine error: {e}")),
            Err(join_err) => {
                return error::PanicSnafu {
                    test: test_name,
                    message: join_err.to_string(),
                    stack: String::new(),
                }
                .fail()
            }
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        error::TestsFailedSnafu {
            count: failures.len(),
            detail: failures.join("\n\n"),
        }
        .fail()
    }
}

/// Run one test's steps sequentially, then its file checks, reading back
/// `errors.txt` from the result state. Returns `Some(failure text)` if any
/// step or file check failed.
async fn run_one_test<C: BuildClient>(
    client: &C,
    test: &TestSpec,
    with_test_deps: GraphState,
    cancellation: &Cancellation,
) -> std::result::Result<Option<String>, C::Error> {
    let mut state = with_test_deps;

    for step in &test.steps {
        if cancellation.is_cancelled() {
            return Ok(None);
        }
        state = step_runner_op(&state, test, step);
        let solved = client.solve(&state).await?;
        if !read_errors(client, &solved.ref_).await?.is_empty() {
            break;
        }
    }

    if !test.files.is_empty() {
        state = checkfiles_op(&state, test);
    }

    let solved = client.solve(&state).await?;
    let errors = read_errors(client, &solved.ref_).await?;
    if errors.is_empty() {
        Ok(None)
    } else {
        Ok(Some(errors))
    }
}

async fn read_errors<C: BuildClient>(
    client: &C,
    ref_: &ContentRef,
) -> std::result::Result<String, C::Error> {
    match client.read_file(ref_, ERRORS_PATH).await {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(_) => Ok(String::new()),
    }
}

/// Mounts declared under a test's `mounts` map: `dest -> input name`,
/// resolved the same way `Source::Build` resolves a named engine input.
fn test_mounts(test: &TestSpec) -> Vec<Mount> {
    test.mounts
        .iter()
        .map(|(dest, name)| Mount {
            dest: dest.clone(),
            source: GraphState::new(GraphOp::Input { name: name.clone() }),
            read_only: true,
        })
        .collect()
}

/// A single test step, run via this frontend's own binary in
/// `test-steprunner` mode: the runner receives the step as JSON, executes
/// the command, and appends any matcher failures to `errors.txt` inside the
/// result state. `base` is the container under test itself (with
/// `withTestDeps` already applied), not a nested mount, so `step.command`
/// sees the same filesystem a real deployment would.
fn step_runner_op(base: &GraphState, test: &TestSpec, step: &crate::spec::test_spec::TestStep) -> GraphState {
    let step_json = serde_json::to_string(step).unwrap_or_default();
    let command = shell_words::join([
        "/opt/pkgfrontend/test-steprunner",
        "--test",
        test.name.as_str(),
        "--errors",
        ERRORS_PATH,
    ]);
    let mut mounts = vec![
        Mount {
            dest: "/opt/pkgfrontend".to_string(),
            source: GraphState::new(GraphOp::Image {
                ref_: FRONTEND_IMAGE.to_string(),
                cmd: None,
                path: None,
            }),
            read_only: true,
        },
        Mount {
            dest: "/run/test-step.json".to_string(),
            source: GraphState::new(GraphOp::File {
                path: "test-step.json".to_string(),
                contents: step_json.into_bytes(),
                mode: 0o644,
            }),
            read_only: true,
        },
    ];
    mounts.extend(test_mounts(test));

    GraphState::new(GraphOp::Run {
        base: Box::new(base.clone()),
        command,
        env: step.env.clone(),
        mounts,
        network: NetworkPolicy::None,
        cache_mounts: vec![],
    })
}

/// The final `test-checkfiles` invocation, validating the test's `files`
/// matchers against the container under test, which is `base` itself.
fn checkfiles_op(base: &GraphState, test: &TestSpec) -> GraphState {
    let files_json = serde_json::to_string(&test.files).unwrap_or_default();
    let mut mounts = vec![
        Mount {
            dest: "/opt/pkgfrontend".to_string(),
            source: GraphState::new(GraphOp::Image {
                ref_: FRONTEND_IMAGE.to_string(),
                cmd: None,
                path: None,
            }),
            read_only: true,
        },
        Mount {
            dest: "/run/test-files.json".to_string(),
            source: GraphState::new(GraphOp::File {
                path: "test-files.json".to_string(),
                contents: files_json.into_bytes(),
                mode: 0o644,
            }),
            read_only: true,
        },
    ];
    mounts.extend(test_mounts(test));

    GraphState::new(GraphOp::Run {
        base: Box::new(base.clone()),
        command: shell_words::join(["/opt/pkgfrontend/test-checkfiles", "--errors", ERRORS_PATH]),
        env: Default::default(),
        mounts,
        network: NetworkPolicy::None,
        cache_mounts: vec![],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::test_spec::TestStep;
    use std::collections::BTreeMap;

    #[test]
    fn step_runner_mounts_frontend_image_and_step_json() {
        let test = TestSpec {
            name: "smoke".to_string(),
            ..Default::default()
        };
        let step = TestStep {
            command: "echo hi".to_string(),
            env: Default::default(),
            stdin: None,
            stdout: Default::default(),
            stderr: Default::default(),
        };
        let base = GraphState::scratch();
        let op = step_runner_op(&base, &test, &step);
        match op.op() {
            GraphOp::Run { mounts, command, base: run_base, .. } => {
                assert!(command.contains("test-steprunner"));
                assert!(mounts.iter().any(|m| m.dest == "/opt/pkgfrontend"));
                assert!(!mounts.iter().any(|m| m.dest == "/rootfs"));
                assert!(matches!(run_base.op(), GraphOp::Scratch));
            }
            other => panic!("expected Run op, got {other:?}"),
        }
    }

    #[test]
    fn test_mounts_threaded_into_step_runner_and_checkfiles() {
        let mut mounts = BTreeMap::new();
        mounts.insert("/etc/extra".to_string(), "build-source:extra".to_string());
        let test = TestSpec {
            name: "smoke".to_string(),
            mounts,
            ..Default::default()
        };
        let step = TestStep {
            command: "echo hi".to_string(),
            env: Default::default(),
            stdin: None,
            stdout: Default::default(),
            stderr: Default::default(),
        };
        let base = GraphState::scratch();

        match step_runner_op(&base, &test, &step).op() {
            GraphOp::Run { mounts, .. } => {
                let mount = mounts.iter().find(|m| m.dest == "/etc/extra").expect("extra mount present");
                assert!(matches!(mount.source.op(), GraphOp::Input { name } if name == "build-source:extra"));
            }
            other => panic!("expected Run op, got {other:?}"),
        }

        match checkfiles_op(&base, &test).op() {
            GraphOp::Run { mounts, .. } => {
                assert!(mounts.iter().any(|m| m.dest == "/etc/extra"));
            }
            other => panic!("expected Run op, got {other:?}"),
        }
    }
}
