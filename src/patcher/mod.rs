/*!
Applies ordered patches on top of resolved sources.
*/

pub mod error;

use crate::graph::{GraphOp, GraphState, Mount, NetworkPolicy};
use crate::spec::Spec;
use crate::worker::Worker;
use std::collections::BTreeMap;

/// For each source that has patches, construct a graph step that runs
/// `patch` with the source mounted read-write and each referenced patch
/// mounted read-only, applying them in declared order with the given
/// `strip` count. Sources without patches pass through untouched.
pub fn apply_patches(
    worker: &Worker,
    spec: &Spec,
    sources: &BTreeMap<String, GraphState>,
) -> error::Result<BTreeMap<String, GraphState>> {
    let mut out = sources.clone();

    for (source_key, patch_list) in &spec.patches {
        let Some(base) = sources.get(source_key) else {
            continue;
        };
        if patch_list.is_empty() {
            continue;
        }

        let mut current = base.clone();
        for patch in patch_list {
            let Some(patch_state) = sources.get(&patch.source) else {
                continue;
            };
            let patch_file = match &patch.path {
                Some(path) => format!("/patches/{}/{path}", patch.source),
                None => format!("/patches/{}", patch.source),
            };
            let command = format!("patch -p{strip} < {patch_file}", strip = patch.strip);
            current = GraphState::new(GraphOp::Run {
                base: Box::new(worker.base()),
                command,
                env: BTreeMap::new(),
                mounts: vec![
                    Mount {
                        dest: "/src".to_string(),
                        source: current,
                        read_only: false,
                    },
                    Mount {
                        dest: format!("/patches/{}", patch.source),
                        source: patch_state.clone(),
                        read_only: true,
                    },
                ],
                network: NetworkPolicy::None,
                cache_mounts: vec![],
            });
        }
        out.insert(source_key.clone(), current);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphOp;

    #[test]
    fn patches_apply_in_declared_order() {
        let mut sources = BTreeMap::new();
        sources.insert("src1".to_string(), GraphState::scratch());
        sources.insert("p1".to_string(), GraphState::scratch());
        sources.insert("p2".to_string(), GraphState::scratch());

        let mut spec = crate::spec::loader::load(
            br#"
name: hello
version: "1.0"
license: MIT
sources:
  src1:
    inline_file: { contents: "x" }
  p1:
    inline_file: { contents: "patch1" }
  p2:
    inline_file: { contents: "patch2" }
patches:
  src1:
    - source: p1
      strip: 1
    - source: p2
      strip: 0
"#,
            &Default::default(),
        )
        .unwrap();
        spec.name = spec.name.clone();

        let worker = Worker::Bookworm;
        let result = apply_patches(&worker, &spec, &sources).unwrap();
        let final_state = &result["src1"];
        match final_state.op() {
            GraphOp::Run { command, mounts, .. } => {
                assert!(command.contains("/patches/p2"));
                assert!(command.contains("-p0"));
                assert_eq!(mounts[1].dest, "/patches/p2");
            }
            other => panic!("expected Run op, got {other:?}"),
        }
    }

    #[test]
    fn patch_path_selects_file_within_multi_file_source() {
        let mut sources = BTreeMap::new();
        sources.insert("src1".to_string(), GraphState::scratch());
        sources.insert("patchset".to_string(), GraphState::scratch());

        let spec = crate::spec::loader::load(
            br#"
name: hello
version: "1.0"
license: MIT
sources:
  src1:
    inline_file: { contents: "x" }
  patchset:
    inline_dir:
      files:
        0001-fix.patch: { contents: "patch" }
patches:
  src1:
    - source: patchset
      path: 0001-fix.patch
      strip: 1
"#,
            &Default::default(),
        )
        .unwrap();

        let worker = Worker::Bookworm;
        let result = apply_patches(&worker, &spec, &sources).unwrap();
        match result["src1"].op() {
            GraphOp::Run { command, .. } => {
                assert!(command.contains("/patches/patchset/0001-fix.patch"));
            }
            other => panic!("expected Run op, got {other:?}"),
        }
    }
}
