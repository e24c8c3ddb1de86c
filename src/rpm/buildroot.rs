//! Assembling the `rpmbuild` working tree as a build graph: `SOURCES/`,
//! `SPECS/<name>/<name>.spec`, and a `<name>.signatures.json` manifest.

use crate::graph::{GraphOp, GraphState, Mount, NetworkPolicy};
use crate::spec::source::GeneratorKind;
use crate::spec::Spec;
use std::collections::BTreeMap;

/// The buildroot: a merged filesystem tree under `/root/rpmbuild` ready to
/// hand to `rpmbuild -ba`.
pub struct BuildRoot {
    pub state: GraphState,
}

/// Assemble `SOURCES/` from resolved sources plus fused generator outputs,
/// write the rendered `.spec` file under `SPECS/<name>/`, and merge them
/// into one tree.
///
/// Each source is placed at its real `SOURCES/` destination via
/// `Mount::dest` and a `Run` step, not folded back into a bare `Merge` —
/// the resolved `GraphState`s only carry their own bare key internally
/// (`resolver::resolve_one`'s `GraphOp::File{path: name, ..}`), so a plain
/// `Merge` would land them at the wrong path.
pub fn assemble(
    spec: &Spec,
    spec_text: &str,
    resolved_sources: &BTreeMap<String, GraphState>,
    generator_outputs: &BTreeMap<&'static str, GraphState>,
) -> BuildRoot {
    let mut source_mounts = Vec::new();
    let mut filenames = Vec::new();

    for (key, source) in &spec.sources {
        let Some(state) = resolved_sources.get(key) else {
            continue;
        };
        let filename = super::spec_template::source_filename(key, source.is_dir());
        source_mounts.push(Mount {
            dest: format!("/root/rpmbuild/SOURCES/{filename}"),
            source: state.clone(),
            read_only: false,
        });
        filenames.push(filename);
    }

    for kind in [GeneratorKind::Gomod, GeneratorKind::Pip, GeneratorKind::CargoHome] {
        if let Some(state) = generator_outputs.get(kind.output_key()) {
            let filename = format!("{}.tar.gz", kind.output_key().trim_start_matches("__"));
            source_mounts.push(Mount {
                dest: format!("/root/rpmbuild/SOURCES/{filename}"),
                source: state.clone(),
                read_only: false,
            });
            filenames.push(filename);
        }
    }

    let spec_file = GraphState::new(GraphOp::File {
        path: format!("/root/rpmbuild/SPECS/{}/{}.spec", spec.name, spec.name),
        contents: spec_text.as_bytes().to_vec(),
        mode: 0o644,
    });

    let placed_sources = signatures_step(spec, source_mounts, &filenames);

    BuildRoot {
        state: GraphState::new(GraphOp::Merge {
            inputs: vec![spec_file, placed_sources],
        }),
    }
}

/// A `Run` step that places every resolved source at its real `SOURCES/`
/// destination, computes `sha256sum` over them, and writes
/// `<name>.signatures.json` next to the spec file.
fn signatures_step(spec: &Spec, source_mounts: Vec<Mount>, filenames: &[String]) -> GraphState {
    let command = format!(
        "cd /root/rpmbuild/SOURCES && sha256sum {} | \
         python3 -c \"import sys,json; print(json.dumps({{l.split()[1]: l.split()[0] for l in sys.stdin}}))\" \
         > /root/rpmbuild/SPECS/{}/{}.signatures.json",
        filenames.join(" "),
        spec.name,
        spec.name,
    );

    GraphState::new(GraphOp::Run {
        base: Box::new(GraphState::new(GraphOp::Image {
            ref_: "docker.io/library/debian:bookworm".to_string(),
            cmd: None,
            path: None,
        })),
        command,
        env: Default::default(),
        mounts: source_mounts,
        network: NetworkPolicy::None,
        cache_mounts: vec![],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_with_two_sources() -> Spec {
        crate::spec::loader::load(
            br#"
name: hello
version: "1.0"
license: MIT
sources:
  a:
    inline_file: { contents: "x" }
  b:
    inline_dir: { files: { f: { contents: "y" } } }
"#,
            &Default::default(),
        )
        .unwrap()
    }

    #[test]
    fn assemble_merges_spec_file_and_placed_sources() {
        let spec = spec_with_two_sources();
        let mut resolved = BTreeMap::new();
        resolved.insert("a".to_string(), GraphState::scratch());
        resolved.insert("b".to_string(), GraphState::scratch());
        let root = assemble(&spec, "Name: hello\n", &resolved, &BTreeMap::new());
        match root.state.op() {
            GraphOp::Merge { inputs } => {
                // spec file + the Run step that places sources and computes signatures
                assert_eq!(inputs.len(), 2);
                match inputs[1].op() {
                    GraphOp::Run { mounts, command, .. } => {
                        assert!(mounts
                            .iter()
                            .any(|m| m.dest == "/root/rpmbuild/SOURCES/a"));
                        assert!(mounts
                            .iter()
                            .any(|m| m.dest == "/root/rpmbuild/SOURCES/b.tar.gz"));
                        assert!(command.contains("sha256sum a b.tar.gz"));
                    }
                    other => panic!("expected Run op, got {other:?}"),
                }
            }
            other => panic!("expected Merge, got {other:?}"),
        }
    }
}
