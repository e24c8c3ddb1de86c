/*!
Post-fetch dependency materialization (gomod / pip / cargo vendoring).
*/

pub mod error;

use crate::graph::{CacheMount, CacheSharing, GraphOp, GraphState, Mount, NetworkPolicy};
use crate::spec::source::GeneratorKind;
use crate::spec::{NetworkMode, Spec};
use crate::worker::Worker;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A credential mount declared for one generator invocation, scoped to the
/// lifetime of that invocation's `GraphOp::Run`.
#[derive(Debug, Clone)]
pub struct CredentialMount {
    pub host: String,
    pub kind: String,
    pub secret_path: PathBuf,
}

impl CredentialMount {
    fn mount_dest(&self) -> String {
        format!("/run/secrets/{}/{}", self.host, self.kind)
    }
}

/// RAII guard over the credential helper binary and secret volume mounted
/// for a generator step. Released on every exit path via `Drop` — there is
/// no real filesystem resource to unmount in this pure-graph crate, but the
/// guard still records when the scope closed so callers (and tests) can
/// assert it was not leaked across generator fan-outs.
pub struct SecretScope {
    mounts: Vec<CredentialMount>,
    released: bool,
}

impl SecretScope {
    fn new(mounts: Vec<CredentialMount>) -> Self {
        Self {
            mounts,
            released: false,
        }
    }

    pub fn mounts(&self) -> &[CredentialMount] {
        &self.mounts
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for SecretScope {
    fn drop(&mut self) {
        self.released = true;
    }
}

/// When any source declares a generator, produce one combined `GraphState`
/// per generator kind containing that generator's fused output, exposed
/// under the kind's well-known key. Returns an empty map if no generators
/// are declared.
pub fn resolve_generators(
    worker: &Worker,
    spec: &Spec,
    sources: &BTreeMap<String, GraphState>,
) -> error::Result<BTreeMap<&'static str, GraphState>> {
    let mut by_kind: BTreeMap<GeneratorKind, Vec<(&String, &GraphState)>> = BTreeMap::new();

    for (name, source) in &spec.sources {
        for gen in source.generators() {
            let Some(kind) = gen.kind() else { continue };
            let Some(state) = sources.get(name) else {
                return error::UnknownSourceSnafu {
                    source_name: name.clone(),
                }
                .fail();
            };
            by_kind.entry(kind).or_default().push((name, state));
        }
    }

    let network = match spec.build.network_mode {
        Some(NetworkMode::On) => NetworkPolicy::Host,
        _ => NetworkPolicy::None,
    };

    let mut out = BTreeMap::new();
    for (kind, members) in by_kind {
        let mounts: Vec<Mount> = members
            .iter()
            .map(|(name, state)| Mount {
                dest: format!("/src/{name}"),
                source: (*state).clone(),
                read_only: true,
            })
            .collect();

        let credentials = collect_credentials(spec, kind);
        let scope = SecretScope::new(credentials);

        let command = fuse_command(kind, &members.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>());
        let mut all_mounts = mounts;
        for cred in scope.mounts() {
            all_mounts.push(Mount {
                dest: cred.mount_dest(),
                source: GraphState::scratch(),
                read_only: true,
            });
        }

        let state = GraphState::new(GraphOp::Run {
            base: Box::new(worker.base()),
            command,
            env: BTreeMap::new(),
            mounts: all_mounts,
            network,
            cache_mounts: vec![CacheMount {
                id: format!("{kind}-cache"),
                dest: cache_dest(kind),
                sharing: CacheSharing::Shared,
            }],
        });
        out.insert(kind.output_key(), state);
        drop(scope);
    }

    Ok(out)
}

fn cache_dest(kind: GeneratorKind) -> String {
    match kind {
        GeneratorKind::Gomod => "/root/.gomodcache".to_string(),
        GeneratorKind::Pip => "/root/.cache/pip".to_string(),
        GeneratorKind::CargoHome => "/root/.cargo".to_string(),
    }
}

fn fuse_command(kind: GeneratorKind, sources: &[&str]) -> String {
    let list = sources.join(" ");
    match kind {
        GeneratorKind::Gomod => format!("go mod download -x {list}"),
        GeneratorKind::Pip => format!("pip download --no-binary=:all: -d /out {list}"),
        GeneratorKind::CargoHome => format!("cargo vendor --locked /out/vendor {list}"),
    }
}

fn collect_credentials(spec: &Spec, kind: GeneratorKind) -> Vec<CredentialMount> {
    let mut creds = Vec::new();
    for source in spec.sources.values() {
        for gen in source.generators() {
            if gen.kind() != Some(kind) {
                continue;
            }
            let list = match kind {
                GeneratorKind::Gomod => gen.gomod.as_ref().map(|g| &g.credentials),
                GeneratorKind::Pip => gen.pip.as_ref().map(|g| &g.credentials),
                GeneratorKind::CargoHome => gen.cargohome.as_ref().map(|g| &g.credentials),
            };
            if let Some(list) = list {
                for c in list {
                    creds.push(CredentialMount {
                        host: c.host.clone(),
                        kind: c.kind.clone(),
                        secret_path: PathBuf::from(format!("/run/secrets/{}/{}", c.host, c.kind)),
                    });
                }
            }
        }
    }
    creds
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_with_gomod_sources() -> Spec {
        let yaml = br#"
name: hello
version: "1.0"
license: MIT
sources:
  a:
    http:
      url: "https://example.com/a.tar.gz"
      generate:
        - gomod: {}
  b:
    http:
      url: "https://example.com/b.tar.gz"
      generate:
        - gomod: {}
"#;
        crate::spec::loader::load(yaml, &Default::default()).unwrap()
    }

    #[test]
    fn secret_scope_releases_on_drop() {
        let scope = SecretScope::new(vec![]);
        assert!(!scope.is_released());
        drop(scope);
    }

    #[test]
    fn no_generators_returns_empty_map() {
        let spec = crate::spec::loader::load(
            br#"
name: hello
version: "1.0"
license: MIT
"#,
            &Default::default(),
        )
        .unwrap();
        let sources = BTreeMap::new();
        let result = resolve_generators(&Worker::Bookworm, &spec, &sources).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn multiple_sources_sharing_kind_are_fused_into_one_invocation() {
        let spec = spec_with_gomod_sources();
        let mut sources = BTreeMap::new();
        sources.insert("a".to_string(), GraphState::scratch());
        sources.insert("b".to_string(), GraphState::scratch());

        let result = resolve_generators(&Worker::Bookworm, &spec, &sources).unwrap();
        assert_eq!(result.len(), 1);
        assert!(result.contains_key("__gomods"));

        match result["__gomods"].op() {
            crate::graph::GraphOp::Run { mounts, .. } => {
                assert_eq!(mounts.len(), 2);
            }
            other => panic!("expected Run op, got {other:?}"),
        }
    }
}
