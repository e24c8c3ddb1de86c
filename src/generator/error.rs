use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    // Field named `source_name`, not `source`: snafu treats a field
    // literally named `source` as a wrapped error requiring
    // `std::error::Error`, which a plain `String` does not implement.
    #[snafu(display("source '{source_name}' references unknown generator dependency"))]
    UnknownSource { source_name: String },
}

pub type Result<T> = std::result::Result<T, Error>;
