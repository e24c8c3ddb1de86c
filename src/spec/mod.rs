/*!
The Spec data model: a versioned description of a single software package,
its sources, patches, build steps, dependencies, artifacts, tests, and
output image metadata.

A [`Spec`] is constructed once by [`loader::load`] and is immutable
thereafter; every pipeline receives a shared reference and never mutates it.
*/

pub mod artifact;
pub mod error;
pub mod loader;
pub mod source;
pub mod test_spec;

pub use artifact::{ArtifactConfig, Artifacts, Directories, SystemdArtifacts};
pub use source::{PatchSpec, Source, SourceGenerator};
pub use test_spec::{CheckOutput, FileCheckOutput, TestSpec, TestStep};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The root entity: a versioned package description.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Spec {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub revision: Option<String>,
    pub license: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub packager: Option<String>,

    /// Mapping from source name to [`Source`]. Keys are stable identifiers
    /// used throughout (filenames, patch targets, build-script references).
    #[serde(default)]
    pub sources: BTreeMap<String, Source>,

    /// Mapping from source name to an ordered sequence of patches applied to
    /// it. The `source` field of each [`PatchSpec`] names another entry in
    /// `sources`.
    #[serde(default)]
    pub patches: BTreeMap<String, Vec<PatchSpec>>,

    #[serde(default)]
    pub build: BuildConfig,

    /// Declared build-arg names with default values, consulted during
    /// `${VAR}` templating at load time.
    #[serde(default)]
    pub args: BTreeMap<String, ArgValue>,

    #[serde(default)]
    pub dependencies: Dependencies,

    #[serde(default)]
    pub artifacts: Artifacts,

    /// Per-target overrides. A target override wins over the top-level value
    /// when resolving for that target.
    #[serde(default)]
    pub targets: BTreeMap<String, Target>,

    #[serde(default)]
    pub tests: Vec<TestSpec>,

    #[serde(default)]
    pub image: ImageConfig,

    /// Unrecognized `x-*` top-level keys, preserved verbatim.
    #[serde(flatten, default)]
    pub extensions: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ArgValue {
    String(String),
    Int(i64),
}

impl ArgValue {
    pub fn as_templated_string(&self) -> String {
        match self {
            ArgValue::String(s) => s.clone(),
            ArgValue::Int(i) => i.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BuildConfig {
    #[serde(default)]
    pub steps: Vec<BuildStep>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub network_mode: Option<NetworkMode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildStep {
    pub command: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    On,
    Off,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Dependencies {
    #[serde(default)]
    pub build: BTreeMap<String, PackageConstraints>,
    #[serde(default)]
    pub runtime: BTreeMap<String, PackageConstraints>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PackageConstraints {
    /// Distro-native constraint strings (`>= 1.2`, `< 3`), preserved in
    /// declaration order — order affects `%ifarch` emission order.
    #[serde(default)]
    pub version: Vec<String>,
    #[serde(default)]
    pub arch: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Target {
    #[serde(default)]
    pub dependencies: Option<Dependencies>,
    #[serde(default)]
    pub image: Option<ImageConfig>,
    #[serde(default)]
    pub tests: Vec<TestSpec>,
    #[serde(default)]
    pub signer: Option<Signer>,
    #[serde(default)]
    pub repositories: Vec<Repository>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Signer {
    pub image: String,
    #[serde(default)]
    pub cmdline: Option<String>,
    #[serde(default)]
    pub args: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Repository {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub gpg_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ImageConfig {
    #[serde(default)]
    pub entrypoint: Vec<String>,
    #[serde(default)]
    pub cmd: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub stop_signal: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub volumes: Vec<String>,
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub post: Option<ImagePost>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ImagePost {
    /// Mapping from link path to link target, applied as a second run
    /// against the already-installed rootfs mount.
    #[serde(default)]
    pub symlinks: BTreeMap<String, String>,
}

impl Spec {
    /// Resolve the [`Dependencies`] that apply when building `target_key`,
    /// honoring the per-field override-if-non-empty merge rule.
    pub fn dependencies_for(&self, target_key: &str) -> Dependencies {
        let root = &self.dependencies;
        match self.targets.get(target_key).and_then(|t| t.dependencies.as_ref()) {
            Some(over) => Dependencies {
                build: if over.build.is_empty() {
                    root.build.clone()
                } else {
                    over.build.clone()
                },
                runtime: if over.runtime.is_empty() {
                    root.runtime.clone()
                } else {
                    over.runtime.clone()
                },
            },
            None => root.clone(),
        }
    }

    /// Resolve the [`ImageConfig`] for `target_key`, per-field override
    /// semantics: a target override field wins only when non-empty/set.
    pub fn image_for(&self, target_key: &str) -> ImageConfig {
        let root = &self.image;
        let Some(over) = self.targets.get(target_key).and_then(|t| t.image.as_ref()) else {
            return root.clone();
        };
        ImageConfig {
            entrypoint: pick(&over.entrypoint, &root.entrypoint),
            cmd: pick(&over.cmd, &root.cmd),
            env: if over.env.is_empty() {
                root.env.clone()
            } else {
                over.env.clone()
            },
            working_dir: over.working_dir.clone().or_else(|| root.working_dir.clone()),
            stop_signal: over.stop_signal.clone().or_else(|| root.stop_signal.clone()),
            labels: if over.labels.is_empty() {
                root.labels.clone()
            } else {
                over.labels.clone()
            },
            volumes: pick(&over.volumes, &root.volumes),
            base: over.base.clone().or_else(|| root.base.clone()),
            post: over.post.clone().or_else(|| root.post.clone()),
        }
    }

    /// Tests declared at the top level plus any declared on the named
    /// target, in that order.
    pub fn tests_for(&self, target_key: &str) -> Vec<TestSpec> {
        let mut all = self.tests.clone();
        if let Some(t) = self.targets.get(target_key) {
            all.extend(t.tests.clone());
        }
        all
    }

    pub fn signer_for(&self, target_key: &str) -> Option<&Signer> {
        self.targets.get(target_key).and_then(|t| t.signer.as_ref())
    }

    pub fn repositories_for(&self, target_key: &str) -> &[Repository] {
        self.targets
            .get(target_key)
            .map(|t| t.repositories.as_slice())
            .unwrap_or(&[])
    }
}

fn pick<T: Clone>(over: &[T], root: &[T]) -> Vec<T> {
    if over.is_empty() {
        root.to_vec()
    } else {
        over.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_with_targets() -> Spec {
        let yaml = r#"
name: hello
version: "1.0"
license: MIT
targets:
  mariner2/rpm:
    dependencies:
      build:
        foo:
          version: [">= 1.0"]
"#;
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn target_override_wins_when_nonempty() {
        let spec = spec_with_targets();
        let deps = spec.dependencies_for("mariner2/rpm");
        assert_eq!(
            deps.build.get("foo").unwrap().version,
            vec![">= 1.0".to_string()]
        );
    }

    #[test]
    fn root_value_used_when_no_override() {
        let spec = spec_with_targets();
        let deps = spec.dependencies_for("bookworm/deb");
        assert!(deps.build.is_empty());
    }
}
