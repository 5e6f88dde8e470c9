use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Isolated execution context a job is deployed into.
/// ---
/// There are exactly two variants. Each one resolves its own identity,
/// location and storage parameters, and submissions never mix them.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
    AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

impl Environment {
    /// Prefix that scopes process variables to this environment (`DEV_BUCKET`).
    pub fn variable_prefix(&self) -> &'static str {
        match self {
            Environment::Dev => "DEV_",
            Environment::Prod => "PROD_",
        }
    }
}
