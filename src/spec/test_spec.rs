//! Test declarations run against a built container.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TestSpec {
    pub name: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub mounts: BTreeMap<String, String>,
    #[serde(default)]
    pub steps: Vec<TestStep>,
    #[serde(default)]
    pub files: BTreeMap<String, FileCheckOutput>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestStep {
    pub command: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub stdin: Option<String>,
    #[serde(default)]
    pub stdout: CheckOutput,
    #[serde(default)]
    pub stderr: CheckOutput,
}

/// A matcher on captured stdout/stderr. Satisfied iff every declared field
/// is satisfied against the captured string. All fields absent is a no-op
/// (always satisfied).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CheckOutput {
    #[serde(default)]
    pub equals: Option<String>,
    #[serde(default)]
    pub contains: Option<String>,
    #[serde(default)]
    pub starts_with: Option<String>,
    #[serde(default)]
    pub ends_with: Option<String>,
    #[serde(default)]
    pub matches: Option<String>,
    #[serde(default)]
    pub empty: Option<bool>,
    #[serde(default)]
    pub not_empty: Option<bool>,
}

impl CheckOutput {
    pub fn is_noop(&self) -> bool {
        self.equals.is_none()
            && self.contains.is_none()
            && self.starts_with.is_none()
            && self.ends_with.is_none()
            && self.matches.is_none()
            && self.empty.is_none()
            && self.not_empty.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FileCheckOutput {
    #[serde(default)]
    pub not_exist: Option<bool>,
    #[serde(default)]
    pub permissions: Option<u32>,
    #[serde(default)]
    pub is_dir: Option<bool>,
    #[serde(default)]
    pub check_output: Option<CheckOutput>,
}
