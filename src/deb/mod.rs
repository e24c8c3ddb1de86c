/*!
The DEB pipeline: symmetric to [`crate::rpm`], producing a `debian/` tree and
running `dpkg-buildpackage`.
*/

pub mod control;
pub mod error;

use crate::generator::resolve_generators;
use crate::graph::{GraphOp, GraphState, Mount, NetworkPolicy};
use crate::patcher::apply_patches;
use crate::resolver::{resolve_sources, SourceOptions};
use crate::spec::source::GeneratorKind;
use crate::spec::Spec;
use crate::worker::Worker;
use error::Result;
use snafu::ResultExt;
use tracing::instrument;

pub struct DebBuild {
    pub build_deps_package: GraphState,
    pub debs: GraphState,
}

#[instrument(level = "info", skip(worker, spec), fields(package = %spec.name, worker = %worker))]
pub fn build(worker: &Worker, spec: &Spec, target_key: &str) -> Result<DebBuild> {
    tracing::info!("starting DEB pipeline");
    let resolved = resolve_sources(spec, &SourceOptions::default()).context(error::ResolveSourcesSnafu)?;
    let patched = apply_patches(worker, spec, &resolved).context(error::ApplyPatchesSnafu)?;
    let generators =
        resolve_generators(worker, spec, &patched).context(error::ResolveGeneratorsSnafu)?;

    let used_kinds: Vec<GeneratorKind> = [GeneratorKind::Gomod, GeneratorKind::Pip, GeneratorKind::CargoHome]
        .into_iter()
        .filter(|k| generators.contains_key(k.output_key()))
        .collect();

    let source_root = assemble_debian_tree(spec, target_key, &used_kinds, &patched, &generators)?;

    let build_deps_package = build_deps_metapackage(worker, spec, target_key);
    let rootfs = install_build_deps(worker, build_deps_package.clone());

    let debs = GraphState::new(GraphOp::Run {
        base: Box::new(rootfs),
        command: "dpkg-buildpackage -us -uc -b".to_string(),
        env: Default::default(),
        mounts: vec![Mount {
            dest: format!("/build/{}", spec.name),
            source: source_root,
            read_only: false,
        }],
        network: NetworkPolicy::None,
        cache_mounts: vec![],
    });

    Ok(DebBuild {
        build_deps_package,
        debs,
    })
}

fn assemble_debian_tree(
    spec: &Spec,
    target_key: &str,
    used_kinds: &[GeneratorKind],
    sources: &std::collections::BTreeMap<String, GraphState>,
    generators: &std::collections::BTreeMap<&'static str, GraphState>,
) -> Result<GraphState> {
    let changelog = control::changelog_file(spec).context(error::ChangelogSnafu)?;

    let debian_dir = format!("/build/{}/debian", spec.name);
    let mut inputs = vec![
        GraphState::new(GraphOp::File {
            path: format!("{debian_dir}/control"),
            contents: control::control_file(spec, target_key).into_bytes(),
            mode: 0o644,
        }),
        GraphState::new(GraphOp::File {
            path: format!("{debian_dir}/rules"),
            contents: control::rules_file(spec, used_kinds).into_bytes(),
            mode: 0o755,
        }),
        GraphState::new(GraphOp::File {
            path: format!("{debian_dir}/changelog"),
            contents: changelog.into_bytes(),
            mode: 0o644,
        }),
        GraphState::new(GraphOp::File {
            path: format!("{debian_dir}/install"),
            contents: control::install_file(spec).into_bytes(),
            mode: 0o644,
        }),
        GraphState::new(GraphOp::File {
            path: format!("{debian_dir}/dirs"),
            contents: control::dirs_file(spec).into_bytes(),
            mode: 0o644,
        }),
        GraphState::new(GraphOp::File {
            path: format!("{debian_dir}/source/format"),
            contents: control::source_format().as_bytes().to_vec(),
            mode: 0o644,
        }),
    ];

    for kind in [GeneratorKind::Gomod, GeneratorKind::Pip, GeneratorKind::CargoHome] {
        if let Some(state) = generators.get(kind.output_key()) {
            inputs.push(state.clone());
        }
    }

    let tree = GraphState::new(GraphOp::Merge { inputs });

    // Resolved sources are already in their final shape (tarred for
    // directories, bare for files, per `resolver::maybe_tar`) — place each
    // one at its real destination via `Mount::dest`, not a second `Tar`.
    let source_mounts: Vec<Mount> = spec
        .sources
        .keys()
        .filter_map(|key| {
            sources.get(key).map(|state| Mount {
                dest: format!("/build/{}/{key}", spec.name),
                source: state.clone(),
                read_only: false,
            })
        })
        .collect();

    if source_mounts.is_empty() {
        return Ok(tree);
    }

    Ok(GraphState::new(GraphOp::Run {
        base: Box::new(tree),
        command: "true".to_string(),
        env: Default::default(),
        mounts: source_mounts,
        network: NetworkPolicy::None,
        cache_mounts: vec![],
    }))
}

/// Install the metapackage with `dpkg -i --force-depends`, then reconcile
/// with `aptitude install -f` using a solver hint that rejects uninstalling
/// the metapackage, forcing downgrade of transitive dependencies instead
/// when that is what the constraints require.
fn install_build_deps(worker: &Worker, build_deps_package: GraphState) -> GraphState {
    let packages_dir = GraphState::new(GraphOp::Filter {
        input: Box::new(build_deps_package),
        include: vec!["**/*.deb".to_string()],
        exclude: vec![],
    });

    GraphState::new(GraphOp::Run {
        base: Box::new(worker.base()),
        command: concat!(
            "dpkg -i --force-depends /packages/*.deb || true; ",
            "aptitude install -f -y ",
            "-o 'Aptitude::ProblemResolver::Hints::=reject builddeps :UNINST'"
        )
        .to_string(),
        env: Default::default(),
        mounts: vec![Mount {
            dest: "/packages".to_string(),
            source: packages_dir,
            read_only: true,
        }],
        network: NetworkPolicy::None,
        cache_mounts: vec![],
    })
}

pub fn build_deps_metapackage(worker: &Worker, spec: &Spec, target_key: &str) -> GraphState {
    let deps = spec.dependencies_for(target_key);
    let pkg_name = format!("{}-builddeps", spec.name);

    let control = {
        let mut out = String::new();
        use std::fmt::Write as _;
        let _ = writeln!(out, "Source: {pkg_name}");
        let _ = writeln!(out, "Priority: optional");
        let _ = writeln!(out, "Build-Depends: debhelper-compat (= 13)");
        out.push('\n');
        let _ = writeln!(out, "Package: {pkg_name}");
        let _ = writeln!(out, "Architecture: all");
        let depends = deps
            .build
            .iter()
            .flat_map(|(name, constraints)| {
                if constraints.version.is_empty() {
                    vec![name.clone()]
                } else {
                    constraints
                        .version
                        .iter()
                        .map(|v| format!("{name} ({v})"))
                        .collect()
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(out, "Depends: {depends}");
        let _ = writeln!(out, "Description: build dependency metapackage");
        out
    };

    let debian_dir = format!("/build/{pkg_name}/debian");
    let control_file = GraphState::new(GraphOp::File {
        path: format!("{debian_dir}/control"),
        contents: control.into_bytes(),
        mode: 0o644,
    });
    let rules_file = GraphState::new(GraphOp::File {
        path: format!("{debian_dir}/rules"),
        contents: b"#!/usr/bin/make -f\n%:\n\tdh $@\n".to_vec(),
        mode: 0o755,
    });

    GraphState::new(GraphOp::Run {
        base: Box::new(worker.base()),
        command: "dpkg-buildpackage -us -uc -b".to_string(),
        env: Default::default(),
        mounts: vec![Mount {
            dest: format!("/build/{pkg_name}"),
            source: GraphState::new(GraphOp::Merge {
                inputs: vec![control_file, rules_file],
            }),
            read_only: false,
        }],
        network: NetworkPolicy::None,
        cache_mounts: vec![],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_deps_metapackage_depends_line_carries_constraints() {
        let spec = crate::spec::loader::load(
            br#"
name: hello
version: "1.0"
license: MIT
dependencies:
  build:
    gcc:
      version: [">= 10"]
"#,
            &Default::default(),
        )
        .unwrap();
        let state = build_deps_metapackage(&Worker::Bookworm, &spec, "bookworm/deb");
        match state.op() {
            GraphOp::Run { mounts, .. } => match mounts[0].source.op() {
                GraphOp::Merge { inputs } => match inputs[0].op() {
                    GraphOp::File { contents, .. } => {
                        let text = String::from_utf8(contents.clone()).unwrap();
                        assert!(text.contains("gcc (>= 10)"));
                    }
                    other => panic!("expected File op, got {other:?}"),
                },
                other => panic!("expected Merge op, got {other:?}"),
            },
            other => panic!("expected Run op, got {other:?}"),
        }
    }

    #[test]
    fn full_pipeline_produces_debs_state() {
        let spec = crate::spec::loader::load(
            br#"
name: hello
version: "1.0"
license: MIT
sources:
  main:
    inline_file: { contents: "x" }
"#,
            &Default::default(),
        )
        .unwrap();
        let result = build(&Worker::Bookworm, &spec, "bookworm/deb").unwrap();
        match result.debs.op() {
            GraphOp::Run { command, .. } => assert!(command.contains("dpkg-buildpackage")),
            other => panic!("expected Run op, got {other:?}"),
        }
    }

    #[test]
    fn sources_placed_via_mount_not_double_tarred() {
        let spec = crate::spec::loader::load(
            br#"
name: hello
version: "1.0"
license: MIT
sources:
  main:
    inline_file: { contents: "x" }
"#,
            &Default::default(),
        )
        .unwrap();
        let mut sources = std::collections::BTreeMap::new();
        sources.insert("main".to_string(), GraphState::scratch());
        let tree = assemble_debian_tree(&spec, "bookworm/deb", &[], &sources, &Default::default()).unwrap();
        match tree.op() {
            GraphOp::Run { mounts, base, .. } => {
                assert_eq!(mounts.len(), 1);
                assert_eq!(mounts[0].dest, "/build/hello/main");
                assert!(matches!(mounts[0].source.op(), GraphOp::Scratch));
                assert!(matches!(base.op(), GraphOp::Merge { .. }));
            }
            other => panic!("expected Run op, got {other:?}"),
        }
    }
}
