use pipewright_common::error::ValidationIssue;

/// Parses a descriptor document, keeping the error location when YAML is malformed.
pub fn parse_yaml(yaml_str: &str) -> Result<serde_yaml::Value, ValidationIssue> {
    serde_yaml::from_str(yaml_str).map_err(|e| {
        let err = if let Some(location) = e.location() {
            ParseError::InvalidYaml {
                line: location.line(),
                column: location.column(),
                message: e.to_string(),
            }
        } else {
            ParseError::InvalidYamlNoLocation {
                message: e.to_string(),
            }
        };
        ValidationIssue::new("<document>", err.to_string())
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid YAML at line {line}, column {column}: {message}")]
    InvalidYaml {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("Invalid YAML: {message}")]
    InvalidYamlNoLocation { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_document() {
        let value = parse_yaml("name: myfirstETL\nschedule: \"0 9 * * *\"\n").unwrap();
        assert_eq!(value["name"].as_str(), Some("myfirstETL"));
    }

    #[test]
    fn test_parse_error_carries_location() {
        let issue = parse_yaml("name: [unclosed\nschedule: x\n").unwrap_err();
        assert_eq!(issue.field, "<document>");
        assert!(issue.message.contains("line"), "{}", issue.message);
    }
}
