/*!
The Windows cross pipeline: a Linux worker with a mingw toolchain runs
`build.steps` to produce PE binaries, output either as a zip or copied into
a Windows container base.
*/

pub mod error;

use crate::graph::{GraphOp, GraphState, Mount, NetworkPolicy, Platform};
use crate::patcher::apply_patches;
use crate::resolver::{resolve_sources, SourceOptions};
use crate::spec::Spec;
use crate::worker::Worker;
use error::Result;
use snafu::ResultExt;
use std::collections::BTreeMap;
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Zip,
    Container,
}

/// One result per requested platform, keyed by the full tuple since distinct
/// `OSVersion`/`OSFeatures` combinations under the same `os/arch` would
/// otherwise collide.
#[instrument(level = "info", skip(worker, spec, platforms), fields(package = %spec.name, worker = %worker, platform_count = platforms.len()))]
pub fn build(
    worker: &Worker,
    spec: &Spec,
    mode: OutputMode,
    platforms: &[Platform],
) -> Result<BTreeMap<String, GraphState>> {
    if platforms.is_empty() {
        return error::NoPlatformsRequestedSnafu {
            package: spec.name.clone(),
        }
        .fail();
    }
    tracing::info!("starting Windows cross pipeline");

    let resolved = resolve_sources(spec, &SourceOptions::default()).context(error::ResolveSourcesSnafu)?;
    let patched = apply_patches(worker, spec, &resolved).context(error::ApplyPatchesSnafu)?;

    let mut out = BTreeMap::new();
    for platform in platforms {
        let binaries = run_build_steps(spec, &patched, platform);
        let state = match mode {
            OutputMode::Zip => zip_output(spec, binaries),
            OutputMode::Container => container_output(binaries, platform),
        };
        out.insert(platform.full_key(), state);
    }
    Ok(out)
}

fn run_build_steps(spec: &Spec, sources: &BTreeMap<String, GraphState>, platform: &Platform) -> GraphState {
    let mut mounts: Vec<Mount> = sources
        .iter()
        .map(|(name, state)| Mount {
            dest: format!("/src/{name}"),
            source: state.clone(),
            read_only: true,
        })
        .collect();

    let mut env = spec.build.env.clone();
    env.insert("GOOS".to_string(), "windows".to_string());
    env.insert("GOARCH".to_string(), platform.arch.clone());

    let command = spec
        .build
        .steps
        .iter()
        .map(|s| s.command.as_str())
        .collect::<Vec<_>>()
        .join(" && ");

    mounts.sort_by(|a, b| a.dest.cmp(&b.dest));

    GraphState::new(GraphOp::Run {
        base: Box::new(GraphState::new(GraphOp::Image {
            ref_: "docker.io/library/debian:bookworm".to_string(),
            cmd: None,
            path: None,
        })),
        command,
        env,
        mounts,
        network: NetworkPolicy::None,
        cache_mounts: vec![],
    })
}

fn zip_output(spec: &Spec, binaries: GraphState) -> GraphState {
    let command = format!("cd /out/bin && zip -r /out/{}.zip .", spec.name);
    GraphState::new(GraphOp::Run {
        base: Box::new(GraphState::new(GraphOp::Image {
            ref_: "docker.io/library/debian:bookworm".to_string(),
            cmd: None,
            path: None,
        })),
        command,
        env: Default::default(),
        mounts: vec![Mount {
            dest: "/out/bin".to_string(),
            source: binaries,
            read_only: true,
        }],
        network: NetworkPolicy::None,
        cache_mounts: vec![],
    })
}

fn container_output(binaries: GraphState, platform: &Platform) -> GraphState {
    let windows_platform = Platform {
        os: "windows".to_string(),
        ..platform.clone()
    };
    GraphState::new(GraphOp::Run {
        base: Box::new(GraphState::new(GraphOp::Image {
            ref_: format!(
                "mcr.microsoft.com/windows/nanoserver:{}",
                windows_platform.os_version.as_deref().unwrap_or("ltsc2022")
            ),
            cmd: None,
            path: None,
        })),
        command: "xcopy /E /Y C:\\src\\bin\\* C:\\Windows\\System32\\".to_string(),
        env: Default::default(),
        mounts: vec![Mount {
            dest: "/src/bin".to_string(),
            source: binaries,
            read_only: true,
        }],
        network: NetworkPolicy::None,
        cache_mounts: vec![],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> Spec {
        crate::spec::loader::load(
            br#"
name: hello
version: "1.0"
license: MIT
build:
  steps:
    - command: "go build -o /out/bin/hello.exe ./..."
"#,
            &Default::default(),
        )
        .unwrap()
    }

    fn windows_platform(version: &str) -> Platform {
        Platform {
            os: "windows".into(),
            arch: "amd64".into(),
            os_version: Some(version.into()),
            os_features: vec![],
        }
    }

    #[test]
    fn no_platforms_is_an_error() {
        let err = build(&Worker::WindowsCross, &spec(), OutputMode::Zip, &[]).unwrap_err();
        matches!(err, error::Error::NoPlatformsRequested { .. });
    }

    #[test]
    fn distinct_os_versions_produce_distinct_keys() {
        let platforms = vec![
            windows_platform("10.0.17763.1"),
            windows_platform("10.0.20348.1"),
        ];
        let results = build(&Worker::WindowsCross, &spec(), OutputMode::Zip, &platforms).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.keys().all(|k| k.starts_with("windows/amd64/10.0.")));
    }
}
