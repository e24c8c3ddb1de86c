use snafu::Snafu;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl std::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "operation cancelled")
    }
}

impl std::error::Error for Cancelled {}

#[derive(Debug, Snafu)]
pub enum EngineError<E: std::error::Error + 'static> {
    #[snafu(display("engine error: {source}"))]
    Engine { source: E },
    #[snafu(display("operation cancelled"))]
    Cancelled,
}
