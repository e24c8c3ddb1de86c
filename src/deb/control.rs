/*!
Pure templating functions building the `debian/` tree's text files.
*/

use crate::spec::artifact::ArtifactKind;
use crate::spec::source::GeneratorKind;
use crate::spec::Spec;
use serde::Serialize;
use std::fmt::Write as _;
use tinytemplate::TinyTemplate;

/// `debian/control`: source and binary package stanzas.
pub fn control_file(spec: &Spec, target_key: &str) -> String {
    let deps = spec.dependencies_for(target_key);
    let mut out = String::new();

    let _ = writeln!(out, "Source: {}", spec.name);
    let _ = writeln!(out, "Priority: optional");
    if let Some(maintainer) = &spec.packager {
        let _ = writeln!(out, "Maintainer: {maintainer}");
    }
    let _ = writeln!(out, "Build-Depends: debhelper-compat (= 13)");
    if let Some(url) = &spec.website {
        let _ = writeln!(out, "Homepage: {url}");
    }
    out.push('\n');

    let _ = writeln!(out, "Package: {}", spec.name);
    let _ = writeln!(out, "Architecture: any");
    let depends = dependency_list(&deps.runtime);
    if depends.is_empty() {
        let _ = writeln!(out, "Depends: ${{shlibs:Depends}}, ${{misc:Depends}}");
    } else {
        let _ = writeln!(
            out,
            "Depends: ${{shlibs:Depends}}, ${{misc:Depends}}, {depends}"
        );
    }
    let summary = spec.description.as_deref().unwrap_or(&spec.name);
    let _ = writeln!(out, "Description: {summary}");

    out
}

fn dependency_list(deps: &std::collections::BTreeMap<String, crate::spec::PackageConstraints>) -> String {
    let mut parts = Vec::new();
    for (name, constraints) in deps {
        if constraints.version.is_empty() {
            parts.push(name.clone());
        } else {
            for v in &constraints.version {
                parts.push(format!("{name} ({})", debianize_constraint(v)));
            }
        }
    }
    parts.join(", ")
}

/// `>= 1.2` stays as-is; debian version-constraint syntax matches RPM's
/// comparator grammar closely enough that no rewrite is needed beyond
/// trimming whitespace.
fn debianize_constraint(constraint: &str) -> String {
    constraint.trim().to_string()
}

/// `debian/rules`: the dh(1)-based build driver.
pub fn rules_file(spec: &Spec, generator_kinds: &[GeneratorKind]) -> String {
    let mut out = String::new();
    out.push_str("#!/usr/bin/make -f\n\n");
    if generator_kinds.contains(&GeneratorKind::Gomod) {
        out.push_str("export GOMODCACHE := $(CURDIR)/debian/gomods\n");
    }
    for (k, v) in &spec.build.env {
        let _ = writeln!(out, "export {k} := {v}");
    }
    out.push('\n');
    out.push_str("%:\n\tdh $@\n\n");
    if !spec.build.steps.is_empty() {
        out.push_str("override_dh_auto_build:\n");
        for step in &spec.build.steps {
            let _ = writeln!(out, "\t{}", step.command);
        }
        out.push('\n');
    }
    out.push_str("override_dh_auto_install:\n\tdh_auto_install --destdir=debian/");
    let _ = writeln!(out, "{}", spec.name);
    out
}

#[derive(Serialize)]
struct ChangelogEntry<'a> {
    name: &'a str,
    version: &'a str,
    release: &'a str,
    distro: &'static str,
}

const CHANGELOG_TEMPLATE: &str = "\
{name} ({version}-{release}) {distro}; urgency=medium

  * Automated build.

 -- {name} maintainers <maintainers@invalid>  Mon, 01 Jan 2024 00:00:00 +0000
";

/// `debian/changelog`, rendered with `tinytemplate` (the one place a real
/// template engine earns its keep: every other `.deb`/`.rpm` text file is a
/// pure `String` builder).
pub fn changelog_file(spec: &Spec) -> tinytemplate::error::Result<String> {
    let mut tt = TinyTemplate::new();
    tt.add_template("changelog", CHANGELOG_TEMPLATE)?;
    let release = spec.revision.as_deref().unwrap_or("1");
    tt.render(
        "changelog",
        &ChangelogEntry {
            name: &spec.name,
            version: &spec.version,
            release,
            distro: "unstable",
        },
    )
}

/// `debian/install`: `<source-in-builddir> <dest-dir>` pairs, one per
/// artifact.
pub fn install_file(spec: &Spec) -> String {
    let mut out = String::new();
    for (key, cfg, kind) in spec.artifacts.iter_all() {
        let dir = canonical_dir(kind);
        let sub = cfg.sub_path.as_deref().unwrap_or("");
        let dest = if sub.is_empty() {
            dir.to_string()
        } else {
            format!("{dir}/{sub}")
        };
        let _ = writeln!(out, "{key} {dest}");
    }
    out
}

/// `debian/dirs`: directories that must exist in the package even if empty
/// (state/config/data directories declared with no files yet installed).
pub fn dirs_file(spec: &Spec) -> String {
    let mut out = String::new();
    for (key, cfg, kind) in spec.artifacts.iter_all() {
        if !matches!(
            kind,
            ArtifactKind::ConfigDir | ArtifactKind::StateDir | ArtifactKind::DataDir
        ) {
            continue;
        }
        let dir = canonical_dir(kind);
        let name = cfg.resolved_name(key);
        let _ = writeln!(out, "{dir}/{name}");
    }
    out
}

pub fn source_format() -> &'static str {
    "3.0 (native)\n"
}

fn canonical_dir(kind: ArtifactKind) -> &'static str {
    match kind {
        ArtifactKind::Binary => "usr/bin",
        ArtifactKind::Manpage => "usr/share/man",
        ArtifactKind::ConfigFile => "etc",
        ArtifactKind::Doc => "usr/share/doc",
        ArtifactKind::License => "usr/share/doc",
        ArtifactKind::ConfigDir => "etc",
        ArtifactKind::StateDir => "var/lib",
        ArtifactKind::DataDir => "usr/share",
        ArtifactKind::SystemdUnit => "lib/systemd/system",
        ArtifactKind::SystemdDropin => "lib/systemd/system",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(yaml: &str) -> Spec {
        crate::spec::loader::load(yaml.as_bytes(), &Default::default()).unwrap()
    }

    #[test]
    fn control_lists_runtime_dependencies_with_constraints() {
        let spec = load(
            r#"
name: hello
version: "1.0"
license: MIT
dependencies:
  runtime:
    libfoo:
      version: [">= 1.0"]
"#,
        );
        let rendered = control_file(&spec, "bookworm/deb");
        assert!(rendered.contains("libfoo (>= 1.0)"));
    }

    #[test]
    fn rules_exports_gomodcache_when_generator_used() {
        let spec = load(
            r#"
name: hello
version: "1.0"
license: MIT
"#,
        );
        let rendered = rules_file(&spec, &[GeneratorKind::Gomod]);
        assert!(rendered.contains("GOMODCACHE"));
    }

    #[test]
    fn changelog_renders_name_and_version() {
        let spec = load(
            r#"
name: hello
version: "2.3"
license: MIT
"#,
        );
        let rendered = changelog_file(&spec).unwrap();
        assert!(rendered.starts_with("hello (2.3-1) unstable"));
    }
}
