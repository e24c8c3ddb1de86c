use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("signer for target '{target_key}' failed: {detail}"))]
    SignFailed { target_key: String, detail: String },
}

pub type Result<T> = std::result::Result<T, Error>;
