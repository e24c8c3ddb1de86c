/*!
The container assembler: installs built packages into a base image rootfs,
producing the final image content state.
*/

pub mod error;

use crate::graph::{GraphOp, GraphState, Mount, NetworkPolicy};
use crate::spec::{ImageConfig, Repository, Spec};
use crate::worker::Worker;
use tracing::instrument;

/// `true` if no package-manager binary would be on `PATH` in the final
/// rootfs. Spec-declared `image.base` overrides can replace the worker's own
/// base with a distroless one even when the worker itself is not; absent an
/// override, this falls back to the worker's own default.
fn is_distroless(worker: &Worker, image: &ImageConfig) -> bool {
    match &image.base {
        Some(base) => base.contains("distroless") || base.contains("scratch"),
        None => worker.is_distroless_base(),
    }
}

/// Installs `packages_dir` into the target image's base rootfs, applying
/// any configured repositories, then the distroless-manifest and
/// post-install symlink steps if applicable.
#[instrument(level = "info", skip(worker, spec, packages_dir), fields(package = %spec.name, worker = %worker, target_key))]
pub fn build_container(
    worker: &Worker,
    spec: &Spec,
    target_key: &str,
    packages_dir: GraphState,
) -> GraphState {
    tracing::info!("assembling container image");
    let image = spec.image_for(target_key);
    let repositories = spec.repositories_for(target_key);

    let base = match &image.base {
        Some(base_ref) => GraphState::new(GraphOp::Image {
            ref_: base_ref.clone(),
            cmd: None,
            path: None,
        }),
        None => worker.base(),
    };

    let mut mounts = vec![Mount {
        dest: "/packages".to_string(),
        source: packages_dir,
        read_only: true,
    }];
    mounts.extend(repository_mounts(repositories));

    let install_command = install_command(worker);
    let mut rootfs = GraphState::new(GraphOp::Run {
        base: Box::new(base),
        command: install_command,
        env: Default::default(),
        mounts,
        network: NetworkPolicy::None,
        cache_mounts: vec![],
    });

    if is_distroless(worker, &image) {
        tracing::debug!("distroless base detected, generating package manifest before db removal");
        rootfs = apply_distroless_manifest(worker, rootfs);
    }

    if !image.post.as_ref().map(|p| p.symlinks.is_empty()).unwrap_or(true) {
        rootfs = apply_post_symlinks(worker, rootfs, &image);
    }

    rootfs
}

fn install_command(worker: &Worker) -> String {
    if worker.is_rpm_based() {
        "tdnf install -y --nogpgcheck --installroot=/rootfs --setopt=reposdir=/etc/yum.repos.d /packages/*.rpm".to_string()
    } else {
        "dpkg --root=/rootfs -i /packages/*.deb || chroot /rootfs aptitude install -f -y".to_string()
    }
}

fn repository_mounts(repositories: &[Repository]) -> Vec<Mount> {
    repositories
        .iter()
        .map(|repo| Mount {
            dest: format!("/etc/yum.repos.d/{}.repo", repo.name),
            source: GraphState::new(GraphOp::File {
                path: format!("{}.repo", repo.name),
                contents: repo.data.clone().unwrap_or_default().into_bytes(),
                mode: 0o644,
            }),
            read_only: true,
        })
        .collect()
}

/// Distroless bases get a manifest generated before the package database is
/// deleted, so the final image carries no DB but still has a queryable
/// record of installed packages.
fn apply_distroless_manifest(worker: &Worker, rootfs: GraphState) -> GraphState {
    let (manifest_cmd, db_paths) = if worker.is_rpm_based() {
        (
            "rpm -qa --root=/rootfs --qf '%{NAME}\\t%{VERSION}-%{RELEASE}\\n' \
             > /rootfs/var/lib/rpmmanifest/container-manifest-1 && \
             rpm -qa --root=/rootfs --qf '%{NAME}\\t%{VERSION}-%{RELEASE}\\t%{ARCH}\\n' \
             > /rootfs/var/lib/rpmmanifest/container-manifest-2",
            "/rootfs/var/lib/rpm",
        )
    } else {
        (
            "dpkg --root=/rootfs -l > /rootfs/var/lib/rpmmanifest/container-manifest-1 && \
             dpkg --root=/rootfs -l > /rootfs/var/lib/rpmmanifest/container-manifest-2",
            "/rootfs/var/lib/dpkg",
        )
    };

    let command = format!(
        "mkdir -p /rootfs/var/lib/rpmmanifest && {manifest_cmd} && rm -rf {db_paths}"
    );

    GraphState::new(GraphOp::Run {
        base: Box::new(worker.base()),
        command,
        env: Default::default(),
        mounts: vec![Mount {
            dest: "/rootfs".to_string(),
            source: rootfs,
            read_only: false,
        }],
        network: NetworkPolicy::None,
        cache_mounts: vec![],
    })
}

fn apply_post_symlinks(worker: &Worker, rootfs: GraphState, image: &ImageConfig) -> GraphState {
    let symlinks = &image.post.as_ref().unwrap().symlinks;
    let command = symlinks
        .iter()
        .map(|(link, target)| format!("ln -sf {target} /rootfs{link}"))
        .collect::<Vec<_>>()
        .join(" && ");

    GraphState::new(GraphOp::Run {
        base: Box::new(worker.base()),
        command,
        env: Default::default(),
        mounts: vec![Mount {
            dest: "/rootfs".to_string(),
            source: rootfs,
            read_only: false,
        }],
        network: NetworkPolicy::None,
        cache_mounts: vec![],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distroless_override_triggers_manifest_even_for_rpm_worker() {
        let spec = crate::spec::loader::load(
            br#"
name: hello
version: "1.0"
license: MIT
image:
  base: "gcr.io/distroless/static"
"#,
            &Default::default(),
        )
        .unwrap();
        let result = build_container(&Worker::Mariner2, &spec, "mariner2/rpm", GraphState::scratch());
        match result.op() {
            GraphOp::Run { command, .. } => assert!(command.contains("rpmmanifest")),
            other => panic!("expected Run op, got {other:?}"),
        }
    }

    #[test]
    fn post_symlinks_applied_as_second_run() {
        let spec = crate::spec::loader::load(
            br#"
name: hello
version: "1.0"
license: MIT
image:
  post:
    symlinks:
      /usr/bin/hello: /opt/hello/bin/hello
"#,
            &Default::default(),
        )
        .unwrap();
        let result = build_container(&Worker::Bookworm, &spec, "bookworm/deb", GraphState::scratch());
        match result.op() {
            GraphOp::Run { command, .. } => {
                assert!(command.contains("ln -sf /opt/hello/bin/hello /rootfs/usr/bin/hello"))
            }
            other => panic!("expected Run op, got {other:?}"),
        }
    }

    #[test]
    fn repositories_become_mounts_on_install_step() {
        let spec = crate::spec::loader::load(
            br#"
name: hello
version: "1.0"
license: MIT
targets:
  mariner2/rpm:
    repositories:
      - name: extras
        url: "https://example.com/extras"
        data: "[extras]\nbaseurl=https://example.com/extras\n"
"#,
            &Default::default(),
        )
        .unwrap();
        let result = build_container(&Worker::Mariner2, &spec, "mariner2/rpm", GraphState::scratch());
        match result.op() {
            GraphOp::Run { mounts, .. } => {
                assert!(mounts.iter().any(|m| m.dest.contains("extras.repo")));
            }
            other => panic!("expected Run op, got {other:?}"),
        }
    }
}
