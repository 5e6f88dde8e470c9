use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CronError {
    #[error("schedule is empty")]
    Empty,

    #[error("time zone prefix '{0}' has no zone name")]
    EmptyTimeZone(String),

    #[error("expected 5 fields (minute hour day-of-month month day-of-week), found {0}")]
    FieldCount(usize),

    #[error("invalid {field} field '{token}': {reason}")]
    InvalidField {
        field: &'static str,
        token: String,
        reason: String,
    },
}

struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    /// Symbolic names, mapped to `names_offset + index`.
    names: &'static [&'static str],
    names_offset: u32,
}

const MONTHS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

const WEEKDAYS: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

const FIELDS: [FieldSpec; 5] = [
    FieldSpec {
        name: "minute",
        min: 0,
        max: 59,
        names: &[],
        names_offset: 0,
    },
    FieldSpec {
        name: "hour",
        min: 0,
        max: 23,
        names: &[],
        names_offset: 0,
    },
    FieldSpec {
        name: "day-of-month",
        min: 1,
        max: 31,
        names: &[],
        names_offset: 0,
    },
    FieldSpec {
        name: "month",
        min: 1,
        max: 12,
        names: &MONTHS,
        names_offset: 1,
    },
    FieldSpec {
        name: "day-of-week",
        min: 0,
        max: 7,
        names: &WEEKDAYS,
        names_offset: 0,
    },
];

const TZ_PREFIXES: [&str; 2] = ["CRON_TZ=", "TZ="];

/// A validated 5-field cron expression.
/// ---
/// The expression may carry a leading `TZ=<zone>` or `CRON_TZ=<zone>` prefix,
/// which the execution service understands natively. The original text is kept
/// verbatim so the service receives exactly what the job author wrote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CronSchedule {
    expression: String,
    time_zone: Option<String>,
}

impl CronSchedule {
    pub fn parse(raw: &str) -> Result<Self, CronError> {
        let expression = raw.trim();
        if expression.is_empty() {
            return Err(CronError::Empty);
        }

        let mut time_zone = None;
        let mut body = expression;

        if let Some(prefix) = TZ_PREFIXES.iter().find(|p| expression.starts_with(*p)) {
            let rest = &expression[prefix.len()..];
            let (zone, remainder) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            if zone.is_empty() {
                return Err(CronError::EmptyTimeZone(prefix.to_string()));
            }
            time_zone = Some(zone.to_string());
            body = remainder;
        }

        let fields: Vec<&str> = body.split_whitespace().collect();
        if fields.len() != FIELDS.len() {
            return Err(CronError::FieldCount(fields.len()));
        }

        for (token, spec) in fields.iter().zip(FIELDS.iter()) {
            validate_field(token, spec)?;
        }

        Ok(Self {
            expression: expression.to_string(),
            time_zone,
        })
    }

    /// The expression as written, including any time zone prefix.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn time_zone(&self) -> Option<&str> {
        self.time_zone.as_deref()
    }
}

fn validate_field(token: &str, spec: &FieldSpec) -> Result<(), CronError> {
    let invalid = |reason: String| CronError::InvalidField {
        field: spec.name,
        token: token.to_string(),
        reason,
    };

    for item in token.split(',') {
        if item.is_empty() {
            return Err(invalid("empty list element".to_string()));
        }

        let (range, step) = match item.split_once('/') {
            Some((range, step)) => (range, Some(step)),
            None => (item, None),
        };

        if let Some(step) = step {
            match step.parse::<u32>() {
                Ok(0) => return Err(invalid("step must be greater than zero".to_string())),
                Ok(_) => {}
                Err(_) => return Err(invalid(format!("step '{}' is not a number", step))),
            }
        }

        if range == "*" {
            continue;
        }

        match range.split_once('-') {
            Some((start, end)) => {
                let start = parse_value(start, spec).map_err(&invalid)?;
                let end = parse_value(end, spec).map_err(&invalid)?;
                if start > end {
                    return Err(invalid(format!("range {}-{} is reversed", start, end)));
                }
            }
            None => {
                parse_value(range, spec).map_err(&invalid)?;
            }
        }
    }

    Ok(())
}

fn parse_value(token: &str, spec: &FieldSpec) -> Result<u32, String> {
    if let Ok(value) = token.parse::<u32>() {
        if value < spec.min || value > spec.max {
            return Err(format!(
                "{} is outside {}-{}",
                value, spec.min, spec.max
            ));
        }
        return Ok(value);
    }

    spec.names
        .iter()
        .position(|name| name.eq_ignore_ascii_case(token))
        .map(|idx| idx as u32 + spec.names_offset)
        .ok_or_else(|| format!("'{}' is not a valid value", token))
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

impl TryFrom<String> for CronSchedule {
    type Error = CronError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        CronSchedule::parse(&value)
    }
}

impl From<CronSchedule> for String {
    fn from(value: CronSchedule) -> Self {
        value.expression
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_common_expressions() {
        for expr in [
            "0 9 * * *",
            "*/15 * * * *",
            "0 0 1 JAN,JUL *",
            "30 6 * * MON-FRI",
            "0 0-23/2 * * 0,7",
            "5 4 1-15/3 * sun",
        ] {
            assert!(CronSchedule::parse(expr).is_ok(), "expected '{}' to parse", expr);
        }
    }

    #[test]
    fn test_time_zone_prefix() {
        let schedule = CronSchedule::parse("TZ=America/Lima 0 9 * * *").unwrap();
        assert_eq!(schedule.time_zone(), Some("America/Lima"));
        assert_eq!(schedule.expression(), "TZ=America/Lima 0 9 * * *");

        let schedule = CronSchedule::parse("CRON_TZ=UTC 0 9 * * *").unwrap();
        assert_eq!(schedule.time_zone(), Some("UTC"));

        assert_eq!(
            CronSchedule::parse("TZ= 0 9 * * *"),
            Err(CronError::EmptyTimeZone("TZ=".to_string()))
        );
    }

    #[test]
    fn test_rejects_wrong_field_count() {
        assert_eq!(
            CronSchedule::parse("0 9 * *"),
            Err(CronError::FieldCount(4))
        );
        assert_eq!(
            CronSchedule::parse("0 0 9 * * *"),
            Err(CronError::FieldCount(6))
        );
        assert_eq!(CronSchedule::parse("   "), Err(CronError::Empty));
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let err = CronSchedule::parse("60 9 * * *").unwrap_err();
        assert!(matches!(err, CronError::InvalidField { field: "minute", .. }));

        let err = CronSchedule::parse("0 24 * * *").unwrap_err();
        assert!(matches!(err, CronError::InvalidField { field: "hour", .. }));

        let err = CronSchedule::parse("0 9 0 * *").unwrap_err();
        assert!(matches!(err, CronError::InvalidField { field: "day-of-month", .. }));

        let err = CronSchedule::parse("0 9 * 13 *").unwrap_err();
        assert!(matches!(err, CronError::InvalidField { field: "month", .. }));
    }

    #[test]
    fn test_rejects_malformed_tokens() {
        assert!(CronSchedule::parse("*/0 * * * *").is_err());
        assert!(CronSchedule::parse("5-1 * * * *").is_err());
        assert!(CronSchedule::parse("1,,2 * * * *").is_err());
        assert!(CronSchedule::parse("@daily").is_err());
        assert!(CronSchedule::parse("0 9 * * FUNDAY").is_err());
    }

    #[test]
    fn test_serde_uses_plain_string() {
        let schedule: CronSchedule = serde_json::from_str("\"0 9 * * *\"").unwrap();
        assert_eq!(schedule.expression(), "0 9 * * *");
        assert_eq!(serde_json::to_string(&schedule).unwrap(), "\"0 9 * * *\"");
        assert!(serde_json::from_str::<CronSchedule>("\"whenever\"").is_err());
    }
}
