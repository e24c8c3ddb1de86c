use snafu::Snafu;

/// A patch step exited non-zero. Field named `source_name` (not `source`)
/// because `snafu` treats a field literally named `source` as a wrapped
/// error by convention, and this one names the package being patched.
#[derive(Debug, Snafu)]
#[snafu(display("patch '{patch}' failed to apply to source '{source_name}' (exit {exit})"))]
pub struct Error {
    pub source_name: String,
    pub patch: String,
    pub exit: i32,
}

pub type Result<T> = std::result::Result<T, Error>;
