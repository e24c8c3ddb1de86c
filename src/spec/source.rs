//! The `Source` tagged union and its generators.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A source descriptor. Exactly one variant is populated, enforced by
/// `#[serde(untagged)]` over a set of structs whose field sets don't
/// otherwise overlap ambiguously (the loader re-validates this explicitly;
/// see `spec::error::Violation::AmbiguousSource`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Source {
    Http(HttpSource),
    Git(GitSource),
    Context(ContextSource),
    DockerImage(DockerImageSource),
    Build(BuildSource),
    InlineFile(InlineFile),
    InlineDir(InlineDir),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpSource {
    pub http: HttpSourceInner,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpSourceInner {
    pub url: String,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub generate: Vec<SourceGenerator>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GitSource {
    pub git: GitSourceInner,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GitSourceInner {
    pub url: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    #[serde(default)]
    pub submodules: bool,
    #[serde(default)]
    pub generate: Vec<SourceGenerator>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextSource {
    pub context: ContextSourceInner,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextSourceInner {
    pub name: String,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DockerImageSource {
    pub image: DockerImageSourceInner,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DockerImageSourceInner {
    pub ref_: String,
    #[serde(default)]
    pub cmd: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildSource {
    pub build: BuildSourceInner,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildSourceInner {
    /// Name of another source entry used as the build context.
    pub source: String,
    #[serde(default)]
    pub frontend: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub args: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InlineFile {
    pub inline_file: InlineFileInner,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InlineFileInner {
    pub contents: String,
    #[serde(default = "default_mode")]
    pub permissions: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InlineDir {
    pub inline_dir: InlineDirInner,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InlineDirInner {
    pub files: BTreeMap<String, InlineFileInner>,
}

fn default_mode() -> u32 {
    0o644
}

impl Source {
    /// Whether this source, once fetched, is a directory tree rather than
    /// a single file.
    pub fn is_dir(&self) -> bool {
        match self {
            Source::Http(_) => false,
            Source::Git(_) => true,
            Source::Context(_) => true,
            Source::DockerImage(s) => s.image.cmd.is_some(),
            Source::Build(_) => true,
            Source::InlineFile(_) => false,
            Source::InlineDir(_) => true,
        }
    }

    /// The declared post-fetch generators for this source, if any.
    pub fn generators(&self) -> &[SourceGenerator] {
        match self {
            Source::Http(s) => &s.http.generate,
            Source::Git(s) => &s.git.generate,
            _ => &[],
        }
    }
}

/// A post-fetch dependency materialization step declared on a source.
/// Exactly one field is populated; the loader enforces this mutual
/// exclusion at validation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceGenerator {
    #[serde(default)]
    pub gomod: Option<GomodGenerator>,
    #[serde(default)]
    pub pip: Option<PipGenerator>,
    #[serde(default)]
    pub cargohome: Option<CargoHomeGenerator>,
}

impl SourceGenerator {
    pub fn kind(&self) -> Option<GeneratorKind> {
        match (&self.gomod, &self.pip, &self.cargohome) {
            (Some(_), None, None) => Some(GeneratorKind::Gomod),
            (None, Some(_), None) => Some(GeneratorKind::Pip),
            (None, None, Some(_)) => Some(GeneratorKind::CargoHome),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum GeneratorKind {
    Gomod,
    Pip,
    CargoHome,
}

impl GeneratorKind {
    /// The well-known key under which the fused generator output is exposed
    /// to downstream pipelines.
    pub fn output_key(&self) -> &'static str {
        match self {
            GeneratorKind::Gomod => "__gomods",
            GeneratorKind::Pip => "__pipdeps",
            GeneratorKind::CargoHome => "__cargohome",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GomodGenerator {
    #[serde(default)]
    pub credentials: Vec<GeneratorCredential>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PipGenerator {
    #[serde(default)]
    pub credentials: Vec<GeneratorCredential>,
    #[serde(default)]
    pub requirements_files: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CargoHomeGenerator {
    #[serde(default)]
    pub credentials: Vec<GeneratorCredential>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratorCredential {
    pub host: String,
    pub kind: String,
}

/// A single entry in `spec.patches[source]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatchSpec {
    /// Names another entry in `sources`.
    pub source: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub strip: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_dir_total_over_variants() {
        let http = Source::Http(HttpSource {
            http: HttpSourceInner {
                url: "https://example.com/a.tar.gz".into(),
                digest: None,
                generate: vec![],
            },
        });
        assert!(!http.is_dir());

        let git = Source::Git(GitSource {
            git: GitSourceInner {
                url: "https://example.com/a.git".into(),
                git_ref: "main".into(),
                submodules: false,
                generate: vec![],
            },
        });
        assert!(git.is_dir());
    }

    #[test]
    fn generator_kind_mutual_exclusion() {
        let g = SourceGenerator {
            gomod: Some(GomodGenerator::default()),
            pip: Some(PipGenerator::default()),
            cargohome: None,
        };
        assert_eq!(g.kind(), None);

        let g = SourceGenerator {
            gomod: Some(GomodGenerator::default()),
            pip: None,
            cargohome: None,
        };
        assert_eq!(g.kind(), Some(GeneratorKind::Gomod));
    }
}
