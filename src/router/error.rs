use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(display("unknown target '{requested}', candidates: {}", candidates.join(", ")))]
pub struct UnknownTargetError {
    pub requested: String,
    pub candidates: Vec<String>,
}

pub type Result<T> = std::result::Result<T, UnknownTargetError>;
