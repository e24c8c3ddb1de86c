use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("install step failed assembling container for '{package}' with exit {exit}"))]
    InstallFailed { package: String, exit: i32 },
}

pub type Result<T> = std::result::Result<T, Error>;
