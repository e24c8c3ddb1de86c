use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Failed to parse spec YAML: {source}"))]
    Deserialize { source: serde_yaml::Error },

    #[snafu(display(
        "Spec failed validation with {} problem(s):\n{}",
        violations.len(),
        violations.iter().map(|v| format!("  - {v}")).collect::<Vec<_>>().join("\n"),
    ))]
    Validation { violations: Vec<Violation> },
}

pub type Result<T> = std::result::Result<T, Error>;

/// A single validation failure. Every violation found during a load is
/// collected and reported together, not just the first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub field: String,
    pub reason: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

impl Violation {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
