use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("test '{test}' panicked: {message}\n{stack}"))]
    Panic {
        test: String,
        message: String,
        stack: String,
    },

    #[snafu(display("{count} test(s) failed:\n{detail}"))]
    TestsFailed { count: usize, detail: String },
}

pub type Result<T> = std::result::Result<T, Error>;
