/*!
The worker capability model: a single tagged enum with per-variant methods
for each distro/toolchain family, rather than a trait-object graph.
*/

use crate::graph::{GraphOp, GraphState};
use crate::spec::ImageConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum Worker {
    Mariner2,
    Azlinux3,
    Bookworm,
    Bullseye,
    Jammy,
    Noble,
    WindowsCross,
}

impl Worker {
    /// Parse a target key's distro prefix (the path segment before the
    /// first `/`) into a `Worker`, used by the router's registered
    /// handlers.
    pub fn from_distro(distro: &str) -> Option<Self> {
        match distro {
            "mariner2" => Some(Worker::Mariner2),
            "azlinux3" => Some(Worker::Azlinux3),
            "bookworm" => Some(Worker::Bookworm),
            "bullseye" => Some(Worker::Bullseye),
            "jammy" => Some(Worker::Jammy),
            "noble" => Some(Worker::Noble),
            "windowscross" => Some(Worker::WindowsCross),
            _ => None,
        }
    }

    pub fn is_rpm_based(&self) -> bool {
        matches!(self, Worker::Mariner2 | Worker::Azlinux3)
    }

    pub fn is_deb_based(&self) -> bool {
        matches!(
            self,
            Worker::Bookworm | Worker::Bullseye | Worker::Jammy | Worker::Noble
        )
    }

    /// The worker's base image state, before any build tooling is layered
    /// on.
    pub fn base(&self) -> GraphState {
        GraphState::new(GraphOp::Image {
            ref_: self.base_image_ref().to_string(),
            cmd: None,
            path: None,
        })
    }

    fn base_image_ref(&self) -> &'static str {
        match self {
            Worker::Mariner2 => "mcr.microsoft.com/cbl-mariner/base/core:2.0",
            Worker::Azlinux3 => "mcr.microsoft.com/azurelinux/base/core:3.0",
            Worker::Bookworm => "docker.io/library/debian:bookworm",
            Worker::Bullseye => "docker.io/library/debian:bullseye",
            Worker::Jammy => "docker.io/library/ubuntu:jammy",
            Worker::Noble => "docker.io/library/ubuntu:noble",
            Worker::WindowsCross => "docker.io/library/debian:bookworm",
        }
    }

    /// The names of packages this worker needs pre-installed to run a
    /// build (the package-manager binary itself, plus `rpmbuild` / build
    /// essentials as appropriate).
    pub fn base_packages(&self) -> &'static [&'static str] {
        match self {
            Worker::Mariner2 | Worker::Azlinux3 => &["rpm-build", "tdnf", "build-essential"],
            Worker::Bookworm | Worker::Bullseye | Worker::Jammy | Worker::Noble => {
                &["dpkg-dev", "debhelper", "apt", "build-essential"]
            }
            Worker::WindowsCross => &["mingw-w64", "build-essential"],
        }
    }

    /// Install a set of package files into this worker's rootfs. `gpg`
    /// checking is always disabled for these installs: both the build-deps
    /// metapackage route and the container assembler rely on installing
    /// locally-built, unsigned packages.
    pub fn install(&self, base: GraphState, packages_dir: GraphState, installroot: &str) -> GraphState {
        let command = if self.is_rpm_based() {
            format!(
                "tdnf install -y --nogpgcheck --installroot={installroot} --setopt=reposdir=/etc/yum.repos.d /packages/*.rpm"
            )
        } else {
            format!(
                "dpkg -i --force-depends --instdir={installroot} /packages/*.deb || aptitude install -f -y"
            )
        };
        GraphState::new(GraphOp::Run {
            base: Box::new(base),
            command,
            env: Default::default(),
            mounts: vec![crate::graph::Mount {
                dest: "/packages".to_string(),
                source: packages_dir,
                read_only: true,
            }],
            network: crate::graph::NetworkPolicy::None,
            cache_mounts: vec![],
        })
    }

    /// The worker-family default image configuration, before any
    /// Spec-declared `image:` overrides are merged in.
    pub fn default_image_config(&self) -> ImageConfig {
        ImageConfig {
            entrypoint: vec![],
            cmd: vec!["/bin/sh".to_string()],
            env: Default::default(),
            working_dir: Some("/".to_string()),
            stop_signal: None,
            labels: Default::default(),
            volumes: vec![],
            base: None,
            post: None,
        }
    }

    /// `true` if no package-manager binary would be on `PATH` in this
    /// worker's base rootfs, i.e. a distroless base.
    pub fn is_distroless_base(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_distro_round_trips_known_keys() {
        assert_eq!(Worker::from_distro("mariner2"), Some(Worker::Mariner2));
        assert_eq!(Worker::from_distro("bookworm"), Some(Worker::Bookworm));
        assert_eq!(Worker::from_distro("nope"), None);
    }

    #[test]
    fn rpm_and_deb_families_are_disjoint() {
        for w in [
            Worker::Mariner2,
            Worker::Azlinux3,
            Worker::Bookworm,
            Worker::Bullseye,
            Worker::Jammy,
            Worker::Noble,
            Worker::WindowsCross,
        ] {
            assert!(!(w.is_rpm_based() && w.is_deb_based()));
        }
    }
}
