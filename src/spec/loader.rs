//! Parses and validates a package Spec document: `load(bytes, args) -> Spec`.

use super::error::{self, Result, Violation};
use super::{ArgValue, Spec};
use lazy_static::lazy_static;
use regex::Regex;
use snafu::ResultExt;
use std::collections::{BTreeMap, HashSet};
use tracing::instrument;

lazy_static! {
    static ref VAR_REF: Regex = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
}

/// Parse, template, and validate a Spec document.
///
/// `args` overrides the defaults declared in the document's own `args:`
/// block; any `${VAR}` reference in a string-valued field is substituted
/// before the document is deserialized into the typed [`Spec`] tree.
#[instrument(level = "debug", skip(bytes, args))]
pub fn load(bytes: &[u8], args: &BTreeMap<String, String>) -> Result<Spec> {
    let raw: serde_yaml::Value =
        serde_yaml::from_slice(bytes).context(error::DeserializeSnafu)?;

    let declared_args = declared_args(&raw);
    let mut resolved = declared_args;
    for (k, v) in args {
        resolved.insert(k.clone(), v.clone());
    }

    let templated = substitute(raw, &resolved);
    let spec: Spec = serde_yaml::from_value(templated).context(error::DeserializeSnafu)?;

    let violations = validate(&spec);
    if !violations.is_empty() {
        tracing::debug!(count = violations.len(), "spec failed validation");
        return error::ValidationSnafu { violations }.fail();
    }
    tracing::debug!(name = %spec.name, version = %spec.version, "spec loaded");
    Ok(spec)
}

/// Extract `spec.args` default values as strings, from the raw (untemplated)
/// document, so that `${VAR}` references inside `args:` default values
/// themselves are not a supported feature (defaults are taken literally).
fn declared_args(raw: &serde_yaml::Value) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    let Some(args) = raw.get("args").and_then(|v| v.as_mapping()) else {
        return out;
    };
    for (k, v) in args {
        let Some(k) = k.as_str() else { continue };
        let value = if let Some(s) = v.as_str() {
            s.to_string()
        } else if let Some(i) = v.as_i64() {
            i.to_string()
        } else {
            continue;
        };
        out.insert(k.to_string(), value);
    }
    out
}

fn substitute(value: serde_yaml::Value, args: &BTreeMap<String, String>) -> serde_yaml::Value {
    match value {
        serde_yaml::Value::String(s) => serde_yaml::Value::String(substitute_str(&s, args)),
        serde_yaml::Value::Sequence(seq) => {
            serde_yaml::Value::Sequence(seq.into_iter().map(|v| substitute(v, args)).collect())
        }
        serde_yaml::Value::Mapping(map) => serde_yaml::Value::Mapping(
            map.into_iter()
                .map(|(k, v)| (substitute(k, args), substitute(v, args)))
                .collect(),
        ),
        other => other,
    }
}

fn substitute_str(s: &str, args: &BTreeMap<String, String>) -> String {
    VAR_REF
        .replace_all(s, |caps: &regex::Captures| {
            let name = &caps[1];
            args.get(name).cloned().unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Run every validator and collect all violations instead of stopping at
/// the first one, so a single load reports everything wrong with a document.
fn validate(spec: &Spec) -> Vec<Violation> {
    let mut violations = Vec::new();

    if spec.name.trim().is_empty() {
        violations.push(Violation::new("name", "must not be empty"));
    }
    if spec.version.trim().is_empty() {
        violations.push(Violation::new("version", "must not be empty"));
    }
    if spec.license.trim().is_empty() {
        violations.push(Violation::new("license", "must not be empty"));
    }

    validate_patch_targets(spec, &mut violations);
    validate_patch_cycles(spec, &mut violations);
    validate_artifact_keys(spec, &mut violations);
    validate_generator_exclusivity(spec, &mut violations);
    validate_http_urls(spec, &mut violations);

    violations
}

/// Every `http` source's `url` must be a well-formed URL.
fn validate_http_urls(spec: &Spec, violations: &mut Vec<Violation>) {
    for (key, source) in &spec.sources {
        if let super::Source::Http(s) = source {
            if let Err(e) = url::Url::parse(&s.http.url) {
                violations.push(Violation::new(
                    format!("sources.{key}.http.url"),
                    format!("not a valid URL: {e}"),
                ));
            }
        }
    }
}

/// Every `patches[k]` entry references some `sources[v]`.
fn validate_patch_targets(spec: &Spec, violations: &mut Vec<Violation>) {
    for (source_key, patch_list) in &spec.patches {
        if !spec.sources.contains_key(source_key) {
            violations.push(Violation::new(
                format!("patches.{source_key}"),
                format!("references unknown source '{source_key}'"),
            ));
        }
        for (i, patch) in patch_list.iter().enumerate() {
            if !spec.sources.contains_key(&patch.source) {
                violations.push(Violation::new(
                    format!("patches.{source_key}[{i}].source"),
                    format!("references unknown source '{}'", patch.source),
                ));
            }
        }
    }
}

/// Rejects a source that is patched by content drawn (transitively) from
/// itself.
fn validate_patch_cycles(spec: &Spec, violations: &mut Vec<Violation>) {
    fn has_cycle(
        start: &str,
        current: &str,
        patches: &BTreeMap<String, Vec<super::PatchSpec>>,
        visiting: &mut HashSet<String>,
    ) -> bool {
        if !visiting.insert(current.to_string()) {
            return current == start;
        }
        if let Some(list) = patches.get(current) {
            for p in list {
                if p.source == start {
                    return true;
                }
                if has_cycle(start, &p.source, patches, visiting) {
                    return true;
                }
            }
        }
        false
    }

    for source_key in spec.patches.keys() {
        let mut visiting = HashSet::new();
        if has_cycle(source_key, source_key, &spec.patches, &mut visiting) {
            violations.push(Violation::new(
                format!("patches.{source_key}"),
                "participates in a patch reference cycle",
            ));
        }
    }
}

fn validate_artifact_keys(spec: &Spec, violations: &mut Vec<Violation>) {
    for (key, _, kind) in spec.artifacts.iter_all() {
        if key.trim().is_empty() {
            violations.push(Violation::new(
                format!("artifacts.{kind:?}"),
                "artifact key must not be empty",
            ));
        }
    }
}

/// Each generator entry must pick exactly one generator kind.
fn validate_generator_exclusivity(spec: &Spec, violations: &mut Vec<Violation>) {
    for (source_key, source) in &spec.sources {
        for (i, gen) in source.generators().iter().enumerate() {
            if gen.kind().is_none() {
                violations.push(Violation::new(
                    format!("sources.{source_key}.generate[{i}]"),
                    "exactly one of gomod, pip, cargohome must be set",
                ));
            }
        }
    }
}

/// Implements the `${VAR}` substitution rule against a pre-resolved arg map,
/// exposed for callers that have already computed the effective arg set
/// (e.g. from engine build-args) and just need the merge-and-override logic.
pub fn resolve_args(spec_args: &BTreeMap<String, ArgValue>, overrides: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = spec_args
        .iter()
        .map(|(k, v)| (k.clone(), v.as_templated_string()))
        .collect();
    for (k, v) in overrides {
        out.insert(k.clone(), v.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_build_args_with_defaults() {
        let yaml = br#"
name: hello
version: "${VER}"
license: MIT
args:
  VER: "1.0"
"#;
        let spec = load(yaml, &BTreeMap::new()).unwrap();
        assert_eq!(spec.version, "1.0");
    }

    #[test]
    fn override_replaces_default() {
        let yaml = br#"
name: hello
version: "${VER}"
license: MIT
args:
  VER: "1.0"
"#;
        let mut overrides = BTreeMap::new();
        overrides.insert("VER".to_string(), "2.0".to_string());
        let spec = load(yaml, &overrides).unwrap();
        assert_eq!(spec.version, "2.0");
    }

    #[test]
    fn missing_required_fields_reports_all_violations() {
        let yaml = br#"
name: ""
version: ""
license: ""
"#;
        let err = load(yaml, &BTreeMap::new()).unwrap_err();
        match err {
            error::Error::Validation { violations } => assert_eq!(violations.len(), 3),
            other => panic!("expected Validation error, got {other:?}"),
        }
    }

    #[test]
    fn patch_referencing_unknown_source_is_rejected() {
        let yaml = br#"
name: hello
version: "1.0"
license: MIT
sources:
  src1:
    inline_file:
      contents: "x"
patches:
  src1:
    - source: nope
      strip: 0
"#;
        let err = load(yaml, &BTreeMap::new()).unwrap_err();
        match err {
            error::Error::Validation { violations } => {
                assert!(violations.iter().any(|v| v.reason.contains("nope")));
            }
            other => panic!("expected Validation error, got {other:?}"),
        }
    }

    #[test]
    fn patch_cycle_is_rejected() {
        let yaml = br#"
name: hello
version: "1.0"
license: MIT
sources:
  a:
    inline_file:
      contents: "x"
  b:
    inline_file:
      contents: "y"
patches:
  a:
    - source: b
      strip: 0
  b:
    - source: a
      strip: 0
"#;
        let err = load(yaml, &BTreeMap::new()).unwrap_err();
        match err {
            error::Error::Validation { violations } => assert!(!violations.is_empty()),
            other => panic!("expected Validation error, got {other:?}"),
        }
    }
}
