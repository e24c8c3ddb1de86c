/*!
The RPM pipeline: resolves sources and patches, fans out generators, renders
a `.spec` file, assembles the `rpmbuild` tree, and runs `rpmbuild -ba`.
*/

pub mod buildroot;
pub mod error;
pub mod spec_template;

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

/// Everything produced by a successful RPM build: the package output
/// directory and the build-dependency metapackage used to seed the worker
/// rootfs before `rpmbuild` runs.
pub struct RpmBuild {
    pub build_deps_package: GraphState,
    pub rpms: GraphState,
}

/// Run the full RPM pipeline for `target_key` against `worker`.
#[instrument(level = "info", skip(worker, spec), fields(package = %spec.name, worker = %worker))]
pub fn build(worker: &Worker, spec: &Spec, target_key: &str) -> Result<RpmBuild> {
    tracing::info!("starting RPM pipeline");
    let resolved = resolve_sources(spec, &SourceOptions::default()).context(error::ResolveSourcesSnafu)?;
    let patched = apply_patches(worker, spec, &resolved).context(error::ApplyPatchesSnafu)?;
    let generators =
        resolve_generators(worker, spec, &patched).context(error::ResolveGeneratorsSnafu)?;

    let used_kinds: Vec<GeneratorKind> = [GeneratorKind::Gomod, GeneratorKind::Pip, GeneratorKind::CargoHome]
        .into_iter()
        .filter(|k| generators.contains_key(k.output_key()))
        .collect();

    let spec_text = spec_template::render(spec, target_key, &used_kinds);
    let root = buildroot::assemble(spec, &spec_text, &patched, &generators);

    let build_deps_package = build_deps_metapackage(worker, spec, target_key);
    let build_deps_rpms = GraphState::new(GraphOp::Filter {
        input: Box::new(build_deps_package.clone()),
        include: vec!["root/rpmbuild/RPMS/**".to_string()],
        exclude: vec![],
    });

    let rootfs = worker.install(worker.base(), build_deps_rpms, "/");

    let rpms = GraphState::new(GraphOp::Run {
        base: Box::new(rootfs),
        command: format!(
            "rpmbuild --define '_topdir /root/rpmbuild' -ba /root/rpmbuild/SPECS/{}/{}.spec",
            spec.name, spec.name
        ),
        env: Default::default(),
        mounts: vec![Mount {
            dest: "/root/rpmbuild".to_string(),
            source: root.state,
            read_only: false,
        }],
        network: NetworkPolicy::None,
        cache_mounts: vec![],
    });

    Ok(RpmBuild {
        build_deps_package,
        rpms,
    })
}

/// Rather than installing each build dependency individually (ordering
/// issues, partial-install rollback complexity), a tiny metapackage that
/// `Requires:` every declared build dependency is built first and installed
/// in one shot, seeding the worker rootfs for the real build.
pub fn build_deps_metapackage(worker: &Worker, spec: &Spec, target_key: &str) -> GraphState {
    let deps = spec.dependencies_for(target_key);
    let mut spec_text = String::new();
    spec_text.push_str(&format!("Name: {}-builddeps\n", spec.name));
    spec_text.push_str("Version: 1\n");
    spec_text.push_str("Release: 1\n");
    spec_text.push_str("License: MIT\n");
    spec_text.push_str("Summary: build dependency metapackage\n");
    spec_text.push_str("BuildArch: noarch\n");
    for (name, constraints) in &deps.build {
        if constraints.version.is_empty() {
            spec_text.push_str(&format!("Requires: {name}\n"));
        } else {
            for v in &constraints.version {
                spec_text.push_str(&format!("Requires: {name} {v}\n"));
            }
        }
    }
    spec_text.push_str("%description\nbuild dependency metapackage\n");
    spec_text.push_str("%files\n");

    let spec_file = GraphState::new(GraphOp::File {
        path: format!(
            "/root/rpmbuild/SPECS/{name}-builddeps/{name}-builddeps.spec",
            name = spec.name
        ),
        contents: spec_text.into_bytes(),
        mode: 0o644,
    });

    GraphState::new(GraphOp::Run {
        base: Box::new(worker.base()),
        command: format!(
            "rpmbuild --define '_topdir /root/rpmbuild' -ba /root/rpmbuild/SPECS/{name}-builddeps/{name}-builddeps.spec",
            name = spec.name
        ),
        env: Default::default(),
        mounts: vec![Mount {
            dest: "/root/rpmbuild".to_string(),
            source: spec_file,
            read_only: false,
        }],
        network: NetworkPolicy::None,
        cache_mounts: vec![],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_with_build_deps() -> Spec {
        crate::spec::loader::load(
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
        .unwrap()
    }

    #[test]
    fn build_deps_metapackage_requires_every_build_dependency() {
        let spec = spec_with_build_deps();
        let state = build_deps_metapackage(&Worker::Mariner2, &spec, "mariner2/rpm");
        match state.op() {
            GraphOp::Run { mounts, .. } => match mounts[0].source.op() {
                GraphOp::File { contents, .. } => {
                    let text = String::from_utf8(contents.clone()).unwrap();
                    assert!(text.contains("Requires: gcc >= 10"));
                }
                other => panic!("expected File op, got {other:?}"),
            },
            other => panic!("expected Run op, got {other:?}"),
        }
    }

    #[test]
    fn full_pipeline_produces_rpms_state() {
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
        let result = build(&Worker::Mariner2, &spec, "mariner2/rpm").unwrap();
        match result.rpms.op() {
            GraphOp::Run { command, .. } => assert!(command.contains("rpmbuild")),
            other => panic!("expected Run op, got {other:?}"),
        }
    }
}
