/*!
A declarative package-and-container build frontend: compiles a [`spec::Spec`]
document into a build graph ([`graph::GraphState`]) for an external
LLB-style engine, producing RPM, DEB, Windows, and container-image outputs.
*/

pub mod container;
pub mod deb;
pub mod generator;
pub mod graph;
pub mod patcher;
pub mod resolver;
pub mod router;
pub mod rpm;
pub mod signer;
pub mod spec;
pub mod test_exec;
pub mod windows;
pub mod worker;

use snafu::Snafu;

/// The top-level error any pipeline handler can return, aggregating every
/// component's own error type.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CoreError {
    #[snafu(display("{source}"))]
    Spec { source: spec::error::Error },

    #[snafu(display("{source}"))]
    Rpm { source: rpm::error::Error },

    #[snafu(display("{source}"))]
    Deb { source: deb::error::Error },

    #[snafu(display("{source}"))]
    Windows { source: windows::error::Error },

    #[snafu(display("{source}"))]
    Container { source: container::error::Error },

    #[snafu(display("{source}"))]
    TestExec { source: test_exec::error::Error },

    #[snafu(display("{source}"))]
    Signer { source: signer::error::Error },

    #[snafu(display("{source}"))]
    Router { source: router::error::UnknownTargetError },
}

pub type Result<T> = std::result::Result<T, CoreError>;
