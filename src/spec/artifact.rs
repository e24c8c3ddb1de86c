//! Typed artifact mappings: what files in the buildroot become installable
//! package contents.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Artifacts {
    #[serde(default)]
    pub binaries: BTreeMap<String, ArtifactConfig>,
    #[serde(default)]
    pub manpages: BTreeMap<String, ArtifactConfig>,
    #[serde(default)]
    pub config_files: BTreeMap<String, ArtifactConfig>,
    #[serde(default)]
    pub docs: BTreeMap<String, ArtifactConfig>,
    #[serde(default)]
    pub licenses: BTreeMap<String, ArtifactConfig>,
    #[serde(default)]
    pub directories: Directories,
    #[serde(default)]
    pub data_dirs: BTreeMap<String, ArtifactConfig>,
    #[serde(default)]
    pub systemd: SystemdArtifacts,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Directories {
    #[serde(default)]
    pub config: BTreeMap<String, ArtifactConfig>,
    #[serde(default)]
    pub state: BTreeMap<String, ArtifactConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SystemdArtifacts {
    #[serde(default)]
    pub units: BTreeMap<String, SystemdUnit>,
    #[serde(default)]
    pub dropins: BTreeMap<String, ArtifactConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemdUnit {
    #[serde(flatten)]
    pub config: ArtifactConfig,
    #[serde(default)]
    pub enable: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ArtifactConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sub_path: Option<String>,
    #[serde(default)]
    pub mode: Option<u32>,
}

impl ArtifactConfig {
    /// The basename used when `name` is not set.
    pub fn resolved_name(&self, key: &str) -> String {
        self.name.clone().unwrap_or_else(|| {
            Path::new(key)
                .file_name()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| key.to_string())
        })
    }

    /// The path, relative to `root`, that `%install`/`%files` (or the DEB
    /// equivalent) must agree on for this artifact key.
    pub fn install_path(&self, key: &str, root: &str) -> String {
        let name = self.resolved_name(key);
        match &self.sub_path {
            Some(sub) if !sub.is_empty() => format!("{root}/{sub}/{name}"),
            _ => format!("{root}/{name}"),
        }
    }
}

impl Artifacts {
    /// Iterate every `(key, config, kind)` triple across all artifact
    /// categories, in lexicographic key order within each category —
    /// callers that need a single global ordering should sort the result.
    pub fn iter_all(&self) -> Vec<(&str, &ArtifactConfig, ArtifactKind)> {
        let mut out = Vec::new();
        for (k, v) in &self.binaries {
            out.push((k.as_str(), v, ArtifactKind::Binary));
        }
        for (k, v) in &self.manpages {
            out.push((k.as_str(), v, ArtifactKind::Manpage));
        }
        for (k, v) in &self.config_files {
            out.push((k.as_str(), v, ArtifactKind::ConfigFile));
        }
        for (k, v) in &self.docs {
            out.push((k.as_str(), v, ArtifactKind::Doc));
        }
        for (k, v) in &self.licenses {
            out.push((k.as_str(), v, ArtifactKind::License));
        }
        for (k, v) in &self.directories.config {
            out.push((k.as_str(), v, ArtifactKind::ConfigDir));
        }
        for (k, v) in &self.directories.state {
            out.push((k.as_str(), v, ArtifactKind::StateDir));
        }
        for (k, v) in &self.data_dirs {
            out.push((k.as_str(), v, ArtifactKind::DataDir));
        }
        for (k, v) in &self.systemd.units {
            out.push((k.as_str(), &v.config, ArtifactKind::SystemdUnit));
        }
        for (k, v) in &self.systemd.dropins {
            out.push((k.as_str(), v, ArtifactKind::SystemdDropin));
        }
        out
    }

    /// True iff at least one systemd unit has `enable: true`.
    pub fn systemd_post_required(&self) -> bool {
        self.systemd.units.values().any(|u| u.enable)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Binary,
    Manpage,
    ConfigFile,
    Doc,
    License,
    ConfigDir,
    StateDir,
    DataDir,
    SystemdUnit,
    SystemdDropin,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_name_falls_back_to_basename() {
        let cfg = ArtifactConfig::default();
        assert_eq!(cfg.resolved_name("path/to/hello.sh"), "hello.sh");
    }

    #[test]
    fn resolved_name_uses_override() {
        let cfg = ArtifactConfig {
            name: Some("hello".into()),
            ..Default::default()
        };
        assert_eq!(cfg.resolved_name("path/to/hello.sh"), "hello");
    }

    #[test]
    fn install_path_includes_sub_path() {
        let cfg = ArtifactConfig {
            name: Some("hello".into()),
            sub_path: Some("bin".into()),
            mode: None,
        };
        assert_eq!(
            cfg.install_path("hello.sh", "/usr"),
            "/usr/bin/hello".to_string()
        );
    }

    #[test]
    fn systemd_post_required_iff_any_enabled() {
        let mut artifacts = Artifacts::default();
        assert!(!artifacts.systemd_post_required());
        artifacts.systemd.units.insert(
            "foo.service".into(),
            SystemdUnit {
                config: ArtifactConfig::default(),
                enable: true,
            },
        );
        assert!(artifacts.systemd_post_required());
    }
}
