/*!
Turns each `Source` descriptor into a [`GraphState`] subtree.
*/

pub mod error;

use crate::graph::{GraphOp, GraphState};
use crate::spec::source::Source;
use crate::spec::Spec;
use error::Result;
use std::collections::BTreeMap;

/// Caller-supplied resolution options (`sOpt` in the contract): fallback
/// directories for context sources the engine didn't supply, and whether
/// network access is currently permitted (mirrors `build.networkMode`).
#[derive(Debug, Clone, Default)]
pub struct SourceOptions {
    pub context_fallbacks: BTreeMap<String, GraphState>,
}

/// Resolve every declared source into a `GraphState`, one per key, in
/// lexicographic order of the key. `Spec::sources` is already a `BTreeMap`
/// so this holds by construction, but iteration here is written explicitly
/// to make the guarantee obvious at the call site.
pub fn resolve_sources(spec: &Spec, opts: &SourceOptions) -> Result<BTreeMap<String, GraphState>> {
    let mut out = BTreeMap::new();
    // `BTreeMap` iteration is already key-ordered; the explicit `keys()`
    // walk below documents that this function depends on that ordering.
    for name in spec.sources.keys() {
        let source = &spec.sources[name];
        let state = resolve_one(name, source, opts)?;
        let state = maybe_tar(name, source, state);
        out.insert(name.clone(), state);
    }
    Ok(out)
}

fn resolve_one(name: &str, source: &Source, opts: &SourceOptions) -> Result<GraphState> {
    match source {
        Source::Http(s) => {
            let digest = s.http.digest.clone();
            if let Some(d) = &digest {
                validate_digest_prefix(name, d)?;
            }
            Ok(GraphState::new(GraphOp::Http {
                url: s.http.url.clone(),
                digest,
            }))
        }
        Source::Git(s) => Ok(GraphState::new(GraphOp::Git {
            url: s.git.url.clone(),
            git_ref: s.git.git_ref.clone(),
            submodules: s.git.submodules,
        })),
        Source::Context(s) => {
            let state = opts.context_fallbacks.get(&s.context.name).cloned();
            let state = match state {
                Some(state) => state,
                // Missing-name is non-fatal when a fallback is documented
                // by the caller; absent both, fall back to an empty
                // scratch state rather than failing the whole resolve.
                None => GraphState::scratch(),
            };
            Ok(apply_filters(state, &s.context.include, &s.context.exclude))
        }
        Source::DockerImage(s) => Ok(GraphState::new(GraphOp::Image {
            ref_: s.image.ref_.clone(),
            cmd: s.image.cmd.clone(),
            path: s.image.path.clone(),
        })),
        Source::Build(_) => {
            // Recursive nested-Spec builds are driven by the caller, which
            // owns the recursion and frontend dispatch; this resolver only
            // produces the placeholder input slot the nested build fills.
            Ok(GraphState::new(GraphOp::Input {
                name: format!("build-source:{name}"),
            }))
        }
        Source::InlineFile(s) => Ok(GraphState::new(GraphOp::File {
            path: name.to_string(),
            contents: s.inline_file.contents.clone().into_bytes(),
            mode: s.inline_file.permissions,
        })),
        Source::InlineDir(s) => {
            let mut merged = Vec::new();
            // `BTreeMap` keeps file entries lexicographic, same guarantee
            // as the outer source map.
            for (path, file) in &s.inline_dir.files {
                merged.push(GraphState::new(GraphOp::File {
                    path: path.clone(),
                    contents: file.contents.clone().into_bytes(),
                    mode: file.permissions,
                }));
            }
            Ok(GraphState::new(GraphOp::Merge { inputs: merged }))
        }
    }
}

fn apply_filters(state: GraphState, include: &[String], exclude: &[String]) -> GraphState {
    if include.is_empty() && exclude.is_empty() {
        return state;
    }
    GraphState::new(GraphOp::Filter {
        input: Box::new(state),
        include: include.to_vec(),
        exclude: exclude.to_vec(),
    })
}

/// Directory-shaped sources are tarred (gzip) into `<key>.tar.gz` when fed
/// into packaging pipelines; file sources pass through verbatim.
fn maybe_tar(name: &str, source: &Source, state: GraphState) -> GraphState {
    if !source.is_dir() {
        return state;
    }
    GraphState::new(GraphOp::Tar {
        input: Box::new(state),
        name: format!("{name}.tar.gz"),
    })
}

fn validate_digest_prefix(name: &str, digest: &str) -> Result<()> {
    let Some((prefix, _)) = digest.split_once(':') else {
        return error::UnsupportedDigestAlgorithmSnafu {
            name: name.to_string(),
            prefix: digest.to_string(),
        }
        .fail();
    };
    match prefix {
        "sha256" | "sha512" => Ok(()),
        other => error::UnsupportedDigestAlgorithmSnafu {
            name: name.to_string(),
            prefix: other.to_string(),
        }
        .fail(),
    }
}

/// Verify fetched content against a declared digest.
pub fn verify_digest(name: &str, digest: &str, content: &[u8]) -> Result<()> {
    let (algo, expected) = digest
        .split_once(':')
        .ok_or_else(|| {
            error::Error::UnsupportedDigestAlgorithm {
                name: name.to_string(),
                prefix: digest.to_string(),
            }
        })?;
    let actual = match algo {
        "sha256" => {
            use sha2::{Digest, Sha256};
            let mut d = Sha256::new();
            d.update(content);
            hex::encode(d.finalize())
        }
        "sha512" => {
            use sha2::{Digest, Sha512};
            let mut d = Sha512::new();
            d.update(content);
            hex::encode(d.finalize())
        }
        other => {
            return error::UnsupportedDigestAlgorithmSnafu {
                name: name.to_string(),
                prefix: other.to_string(),
            }
            .fail()
        }
    };
    if actual != expected {
        return error::DigestMismatchSnafu {
            name: name.to_string(),
            expected: expected.to_string(),
            actual,
        }
        .fail();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::source::{InlineDirInner, InlineFileInner};
    use std::collections::BTreeMap as Map;

    fn spec_with_sources(keys: &[&str]) -> Spec {
        let mut sources = Map::new();
        for k in keys {
            sources.insert(
                k.to_string(),
                Source::InlineFile(crate::spec::source::InlineFile {
                    inline_file: InlineFileInner {
                        contents: "x".into(),
                        permissions: 0o644,
                    },
                }),
            );
        }
        Spec {
            name: "hello".into(),
            version: "1.0".into(),
            revision: None,
            license: "MIT".into(),
            description: None,
            website: None,
            vendor: None,
            packager: None,
            sources,
            patches: Default::default(),
            build: Default::default(),
            args: Default::default(),
            dependencies: Default::default(),
            artifacts: Default::default(),
            targets: Default::default(),
            tests: Default::default(),
            image: Default::default(),
            extensions: Default::default(),
        }
    }

    #[test]
    fn resolve_is_ordered_lexicographically_regardless_of_declaration_order() {
        let spec = spec_with_sources(&["c", "a", "b"]);
        let resolved = resolve_sources(&spec, &SourceOptions::default()).unwrap();
        let keys: Vec<&String> = resolved.keys().collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn directory_sources_are_tarred() {
        let mut files = Map::new();
        files.insert(
            "x".to_string(),
            InlineFileInner {
                contents: "orig".into(),
                permissions: 0o644,
            },
        );
        let mut spec = spec_with_sources(&[]);
        spec.sources.insert(
            "srcdir".into(),
            Source::InlineDir(crate::spec::source::InlineDir {
                inline_dir: InlineDirInner { files },
            }),
        );
        let resolved = resolve_sources(&spec, &SourceOptions::default()).unwrap();
        match resolved["srcdir"].op() {
            GraphOp::Tar { name, .. } => assert_eq!(name, "srcdir.tar.gz"),
            other => panic!("expected Tar op, got {other:?}"),
        }
    }

    #[test]
    fn unsupported_digest_algorithm_rejected() {
        assert!(validate_digest_prefix("x", "md5:abc").is_err());
        assert!(validate_digest_prefix("x", "sha256:abc").is_ok());
    }

    #[test]
    fn verify_digest_detects_mismatch() {
        let err = verify_digest("x", "sha256:deadbeef", b"hello").unwrap_err();
        matches!(err, error::Error::DigestMismatch { .. });
    }
}
