use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("rpmbuild failed for package '{package}' with exit {exit}"))]
    PackageBuild { package: String, exit: i32 },

    #[snafu(display("resolving sources: {source}"))]
    ResolveSources { source: crate::resolver::error::Error },

    #[snafu(display("applying patches: {source}"))]
    ApplyPatches { source: crate::patcher::error::Error },

    #[snafu(display("resolving generators: {source}"))]
    ResolveGenerators { source: crate::generator::error::Error },
}

pub type Result<T> = std::result::Result<T, Error>;
