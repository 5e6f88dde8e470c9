use std::sync::LazyLock;

use regex::Regex;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").expect("placeholder regex is valid")
});

/// Why a template could not be expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// `{{NAME}}` names something the lookup does not know.
    Unknown(String),

    /// An opening `{{` without a matching `}}`.
    Unterminated,
}

/// Replaces every `{{NAME}}` in `input` with `lookup(NAME)`.
/// Text without placeholders is returned unchanged.
pub fn substitute<F>(input: &str, lookup: F) -> Result<String, TemplateError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut output = String::with_capacity(input.len());
    let mut last = 0;

    for caps in PLACEHOLDER.captures_iter(input) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };

        push_literal(&mut output, &input[last..whole.start()])?;

        let name = name.as_str();
        let value = lookup(name).ok_or_else(|| TemplateError::Unknown(name.to_string()))?;
        output.push_str(&value);
        last = whole.end();
    }

    push_literal(&mut output, &input[last..])?;
    Ok(output)
}

/// Whether `input` still contains placeholder syntax.
pub fn has_placeholders(input: &str) -> bool {
    input.contains("{{")
}

fn push_literal(output: &mut String, literal: &str) -> Result<(), TemplateError> {
    if literal.contains("{{") {
        return Err(TemplateError::Unterminated);
    }
    output.push_str(literal);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "BUCKET" => Some("acme-prod-data".to_string()),
            "ENVIRONMENT" => Some("prod".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_substitutes_all_occurrences() {
        let out = substitute("gs://{{BUCKET}}/{{ ENVIRONMENT }}/{{BUCKET}}.csv", lookup).unwrap();
        assert_eq!(out, "gs://acme-prod-data/prod/acme-prod-data.csv");
    }

    #[test]
    fn test_plain_text_is_unchanged() {
        assert_eq!(
            substitute("https://example.org/data.csv", lookup).unwrap(),
            "https://example.org/data.csv"
        );
    }

    #[test]
    fn test_unknown_placeholder() {
        assert_eq!(
            substitute("{{HOME}}/x", lookup),
            Err(TemplateError::Unknown("HOME".to_string()))
        );
    }

    #[test]
    fn test_unterminated_placeholder() {
        assert_eq!(
            substitute("gs://{{BUCKET/data", lookup),
            Err(TemplateError::Unterminated)
        );
    }

    #[test]
    fn test_has_placeholders() {
        assert!(has_placeholders("gs://{{BUCKET}}"));
        assert!(!has_placeholders("gs://bucket"));
    }
}
