use std::collections::BTreeMap;

use serde::Deserialize;

/// On-disk shape of `resources/config.yaml`.
/// ---
/// Scalars that authors commonly write either quoted or bare (`cpu: 4` vs
/// `cpu: "4"`) are kept as YAML values and normalized during validation.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RawDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub schedule: String,
    pub compute: RawCompute,
    pub parameters: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RawCompute {
    pub cpu: serde_yaml::Value,
    pub memory: serde_yaml::Value,
    #[serde(default)]
    pub timeout: Option<serde_yaml::Value>,
}

/// Text of a scalar YAML value; `None` for null, sequences and mappings.
pub fn scalar_text(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
