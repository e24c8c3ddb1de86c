use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("resolving sources: {source}"))]
    ResolveSources { source: crate::resolver::error::Error },

    #[snafu(display("applying patches: {source}"))]
    ApplyPatches { source: crate::patcher::error::Error },

    #[snafu(display("no platforms requested for windows build of '{package}'"))]
    NoPlatformsRequested { package: String },
}

pub type Result<T> = std::result::Result<T, Error>;
