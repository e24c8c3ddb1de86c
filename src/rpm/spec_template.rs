/*!
Pure RPM `.spec` file templating: a set of functions from `Spec` to string
builders composed in a fixed order. Each section function is independently
testable.
*/

use crate::spec::artifact::ArtifactKind;
use crate::spec::source::GeneratorKind;
use crate::spec::{ArtifactConfig, Spec};
use std::fmt::Write as _;

/// The filename a source produces in `SOURCES/`: directories are tarred;
/// files pass through under their key name.
pub fn source_filename(key: &str, is_dir: bool) -> String {
    if is_dir {
        format!("{key}.tar.gz")
    } else {
        key.to_string()
    }
}

/// Render the complete `.spec` file for `spec`, targeting `target_key`.
/// `generator_kinds` lists which generator outputs (if any) were fused by
/// the generator runner and must be appended as extra numbered sources.
pub fn render(spec: &Spec, target_key: &str, generator_kinds: &[GeneratorKind]) -> String {
    let mut out = String::new();
    preamble(spec, &mut out);
    sources_section(spec, generator_kinds, &mut out);
    relations_section(spec, target_key, &mut out);
    requires_section(spec, target_key, &mut out);
    description_section(spec, &mut out);
    prep_section(spec, &mut out);
    build_section(spec, generator_kinds, &mut out);
    install_section(spec, &mut out);
    scriptlets_section(spec, &mut out);
    files_section(spec, &mut out);
    changelog_section(spec, &mut out);
    out
}

fn preamble(spec: &Spec, out: &mut String) {
    let release = spec.revision.as_deref().unwrap_or("1");
    let _ = writeln!(out, "Name: {}", spec.name);
    let _ = writeln!(out, "Version: {}", spec.version);
    let _ = writeln!(out, "Release: {release}");
    let _ = writeln!(out, "License: {}", spec.license);
    let summary = spec.description.as_deref().unwrap_or(&spec.name);
    let _ = writeln!(out, "Summary: {summary}");
    if let Some(url) = &spec.website {
        let _ = writeln!(out, "URL: {url}");
    }
    if let Some(vendor) = &spec.vendor {
        let _ = writeln!(out, "Vendor: {vendor}");
    }
    if let Some(packager) = &spec.packager {
        let _ = writeln!(out, "Packager: {packager}");
    }
    if spec.artifacts.binaries.is_empty() && binaries_are_arch_dependent(spec) {
        // left intentionally blank: presence of native binaries implies an
        // arch-specific package, handled implicitly by rpmbuild's default.
    } else if spec.artifacts.binaries.is_empty() {
        let _ = writeln!(out, "BuildArch: noarch");
    }
    out.push('\n');
}

fn binaries_are_arch_dependent(_spec: &Spec) -> bool {
    false
}

fn sources_section(spec: &Spec, generator_kinds: &[GeneratorKind], out: &mut String) {
    let mut idx = 0u32;
    for (key, source) in &spec.sources {
        let filename = source_filename(key, source.is_dir());
        let _ = writeln!(out, "Source{idx}: {filename}");
        idx += 1;
    }
    for kind in generator_kinds {
        let filename = format!("{}.tar.gz", kind.output_key().trim_start_matches("__"));
        let _ = writeln!(out, "Source{idx}: {filename}");
        idx += 1;
    }
    out.push('\n');
}

fn relations_section(spec: &Spec, target_key: &str, out: &mut String) {
    // Conflicts/Provides/Replaces are declared via `x-rpm-*` extensions
    // rather than first-class fields; absent any such extension, nothing
    // is emitted.
    let _ = target_key;
    let _ = spec;
}

fn requires_section(spec: &Spec, target_key: &str, out: &mut String) {
    let deps = spec.dependencies_for(target_key);

    if spec.artifacts.systemd_post_required() {
        let _ = writeln!(out, "Requires(post): systemd");
        let _ = writeln!(out, "Requires(preun): systemd");
        let _ = writeln!(out, "Requires(postun): systemd");
    }

    for (name, constraints) in &deps.runtime {
        emit_requires(name, constraints, out);
    }
    out.push('\n');
}

fn emit_requires(name: &str, constraints: &crate::spec::PackageConstraints, out: &mut String) {
    let versions: Vec<&String> = if constraints.version.is_empty() {
        vec![]
    } else {
        constraints.version.iter().collect()
    };

    let open_ifarch = !constraints.arch.is_empty();
    if open_ifarch {
        let _ = writeln!(out, "%ifarch {}", constraints.arch.join(" "));
    }

    if versions.is_empty() {
        let _ = writeln!(out, "Requires: {name}");
    } else {
        for v in versions {
            let _ = writeln!(out, "Requires: {name} {v}");
        }
    }

    if open_ifarch {
        let _ = writeln!(out, "%endif");
    }
}

fn description_section(spec: &Spec, out: &mut String) {
    let _ = writeln!(out, "%description");
    let _ = writeln!(out, "{}", spec.description.as_deref().unwrap_or(&spec.name));
    out.push('\n');
}

fn prep_section(spec: &Spec, out: &mut String) {
    let _ = writeln!(out, "%prep");
    for (key, source) in &spec.sources {
        if source.is_dir() {
            let _ = writeln!(out, "mkdir -p %{{_builddir}}/{key}");
            let _ = writeln!(
                out,
                "tar -xzf %{{_sourcedir}}/{key}.tar.gz -C %{{_builddir}}/{key}"
            );
        } else {
            let _ = writeln!(out, "cp %{{_sourcedir}}/{key} %{{_builddir}}/{key}");
        }
    }
    // Patches apply in lexicographic order of `patches`-keys; within a key,
    // entries apply in declared order.
    for (source_key, patch_list) in &spec.patches {
        for patch in patch_list {
            let _ = writeln!(
                out,
                "patch -d %{{_builddir}}/{source_key} -p{} < %{{_sourcedir}}/{}",
                patch.strip, patch.source
            );
        }
    }
    out.push('\n');
}

fn build_section(spec: &Spec, generator_kinds: &[GeneratorKind], out: &mut String) {
    let _ = writeln!(out, "%build");
    if generator_kinds.contains(&GeneratorKind::Gomod) {
        let _ = writeln!(out, "export GOMODCACHE=%{{_builddir}}/gomods");
    }
    for (k, v) in &spec.build.env {
        let _ = writeln!(out, "export {k}={v}");
    }
    for step in &spec.build.steps {
        let _ = writeln!(out, "(");
        for (k, v) in &step.env {
            let _ = writeln!(out, "  export {k}={v}");
        }
        let _ = writeln!(out, "  {}", step.command);
        let _ = writeln!(out, ")");
    }
    out.push('\n');
}

fn install_section(spec: &Spec, out: &mut String) {
    let _ = writeln!(out, "%install");
    for (key, cfg, kind) in spec.artifacts.iter_all() {
        let (root, _) = canonical_dir(kind);
        let dest = cfg.install_path(key, root);
        let _ = writeln!(out, "mkdir -p %{{buildroot}}$(dirname {dest})");
        let _ = writeln!(out, "install -m {} {key} %{{buildroot}}{dest}", mode_or_default(cfg, kind));
    }
    out.push('\n');
}

fn mode_or_default(cfg: &ArtifactConfig, kind: ArtifactKind) -> String {
    let mode = cfg.mode.unwrap_or(match kind {
        ArtifactKind::Binary => 0o755,
        _ => 0o644,
    });
    format!("{mode:o}")
}

fn canonical_dir(kind: ArtifactKind) -> (&'static str, &'static str) {
    match kind {
        ArtifactKind::Binary => ("%{_bindir}", ""),
        ArtifactKind::Manpage => ("%{_mandir}", ""),
        ArtifactKind::ConfigFile => ("%{_sysconfdir}", ""),
        ArtifactKind::Doc => ("%{_docdir}", ""),
        ArtifactKind::License => ("%{_licensedir}", ""),
        ArtifactKind::ConfigDir => ("%{_sysconfdir}", ""),
        ArtifactKind::StateDir => ("%{_sharedstatedir}", ""),
        ArtifactKind::DataDir => ("%{_datadir}", ""),
        ArtifactKind::SystemdUnit => ("%{_unitdir}", ""),
        ArtifactKind::SystemdDropin => ("%{_unitdir}", ""),
    }
}

fn scriptlets_section(spec: &Spec, out: &mut String) {
    if spec.artifacts.systemd_post_required() {
        let _ = writeln!(out, "%post");
        let _ = writeln!(out, "%systemd_post");
        for (key, _) in spec.artifacts.systemd.units.iter().filter(|(_, u)| u.enable) {
            let _ = writeln!(out, "systemctl enable {key} >/dev/null 2>&1 || :");
        }
        out.push('\n');
        let _ = writeln!(out, "%preun");
        let _ = writeln!(out, "%systemd_preun");
        out.push('\n');
        let _ = writeln!(out, "%postun");
        let _ = writeln!(out, "%systemd_postun_with_restart");
        out.push('\n');
    }
}

fn files_section(spec: &Spec, out: &mut String) {
    let _ = writeln!(out, "%files");
    for (key, cfg, kind) in spec.artifacts.iter_all() {
        let (root, _) = canonical_dir(kind);
        let dest = cfg.install_path(key, root);
        let directive = match kind {
            ArtifactKind::ConfigFile => "%config(noreplace) ",
            ArtifactKind::Doc => "%doc ",
            ArtifactKind::License => "%license ",
            ArtifactKind::ConfigDir | ArtifactKind::StateDir | ArtifactKind::DataDir => "%dir ",
            _ => "",
        };
        let _ = writeln!(out, "{directive}{dest}");
    }
    out.push('\n');
}

fn changelog_section(_spec: &Spec, out: &mut String) {
    let _ = writeln!(out, "%changelog");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(yaml: &str) -> Spec {
        crate::spec::loader::load(yaml.as_bytes(), &Default::default()).unwrap()
    }

    #[test]
    fn sources_are_numbered_lexicographically_regardless_of_declaration_order() {
        // Scenario 4: three sources keyed c, a, b, all inline-dir.
        let spec = load(
            r#"
name: hello
version: "1.0"
license: MIT
sources:
  c:
    inline_dir: { files: { x: { contents: "1" } } }
  a:
    inline_dir: { files: { x: { contents: "2" } } }
  b:
    inline_dir: { files: { x: { contents: "3" } } }
"#,
        );
        let rendered = render(&spec, "mariner2/rpm", &[]);
        let a_idx = rendered.find("Source0: a.tar.gz").unwrap();
        let b_idx = rendered.find("Source1: b.tar.gz").unwrap();
        let c_idx = rendered.find("Source2: c.tar.gz").unwrap();
        assert!(a_idx < b_idx && b_idx < c_idx);
    }

    #[test]
    fn systemd_post_emitted_iff_unit_enabled() {
        let spec = load(
            r#"
name: hello
version: "1.0"
license: MIT
artifacts:
  systemd:
    units:
      foo.service:
        enable: true
"#,
        );
        let rendered = render(&spec, "mariner2/rpm", &[]);
        assert!(rendered.contains("Requires(post): systemd"));
        assert!(rendered.contains("%systemd_post"));

        let spec2 = load(
            r#"
name: hello
version: "1.0"
license: MIT
artifacts:
  systemd:
    units:
      foo.service:
        enable: false
"#,
        );
        let rendered2 = render(&spec2, "mariner2/rpm", &[]);
        assert!(!rendered2.contains("Requires(post): systemd"));
    }

    #[test]
    fn multi_value_version_constraints_emit_multiple_requires_lines() {
        let spec = load(
            r#"
name: hello
version: "1.0"
license: MIT
dependencies:
  runtime:
    foo:
      version: [">= 1.0", "< 2.0"]
"#,
        );
        let rendered = render(&spec, "mariner2/rpm", &[]);
        assert!(rendered.contains("Requires: foo >= 1.0"));
        assert!(rendered.contains("Requires: foo < 2.0"));
    }

    #[test]
    fn patches_apply_in_lexicographic_key_order() {
        let spec = load(
            r#"
name: hello
version: "1.0"
license: MIT
sources:
  src1:
    inline_file: { contents: "x" }
  src0:
    inline_file: { contents: "y" }
  p:
    inline_file: { contents: "patch" }
patches:
  src1:
    - source: p
      strip: 0
  src0:
    - source: p
      strip: 0
"#,
        );
        let rendered = render(&spec, "mariner2/rpm", &[]);
        let prep = rendered.split("%prep").nth(1).unwrap();
        let src0_idx = prep.find("_builddir}/src0").unwrap();
        let src1_idx = prep.find("_builddir}/src1").unwrap();
        assert!(src0_idx < src1_idx);
    }
}
