use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("source '{name}' digest mismatch: expected {expected}, got {actual}"))]
    DigestMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[snafu(display("source '{name}' has an unsupported digest algorithm prefix '{prefix}'"))]
    UnsupportedDigestAlgorithm { name: String, prefix: String },

    #[snafu(display("context source '{name}' has no fallback and the engine provided none"))]
    MissingContext { name: String },

    #[snafu(display("build source '{name}' references unknown source '{target}'"))]
    UnknownBuildSource { name: String, target: String },
}

pub type Result<T> = std::result::Result<T, Error>;
