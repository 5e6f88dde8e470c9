use std::{fmt, time::Duration};

use byte_unit::Byte;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{raw}' is not a valid {kind}: {reason}")]
pub struct QuantityError {
    pub kind: &'static str,
    pub raw: String,
    pub reason: String,
}

impl QuantityError {
    fn new(kind: &'static str, raw: &str, reason: impl Into<String>) -> Self {
        Self {
            kind,
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }
}

/// Resource envelope requested by a job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeSpec {
    pub cpu: CpuQuantity,
    pub memory: MemoryQuantity,
    pub timeout: Option<TimeoutSpec>,
}

/// CPU limit, written as cores (`4`, `0.5`) or millicores (`500m`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CpuQuantity {
    raw: String,
    millicores: u64,
}

impl CpuQuantity {
    pub fn parse(raw: &str) -> Result<Self, QuantityError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(QuantityError::new("cpu quantity", raw, "value is empty"));
        }

        let millicores = if let Some(millis) = trimmed.strip_suffix('m') {
            millis
                .parse::<u64>()
                .map_err(|_| QuantityError::new("cpu quantity", raw, "millicores must be an integer"))?
        } else {
            let cores = trimmed
                .parse::<f64>()
                .map_err(|_| QuantityError::new("cpu quantity", raw, "expected a number of cores"))?;
            if !cores.is_finite() || cores < 0.0 {
                return Err(QuantityError::new(
                    "cpu quantity",
                    raw,
                    "cores must be a finite non-negative number",
                ));
            }
            (cores * 1000.0).round() as u64
        };

        Ok(Self {
            raw: trimmed.to_string(),
            millicores,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn millicores(&self) -> u64 {
        self.millicores
    }

    pub fn cores(&self) -> f64 {
        self.millicores as f64 / 1000.0
    }
}

/// Memory limit in Kubernetes-style (`16Gi`) or byte-unit (`2GB`) notation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MemoryQuantity {
    raw: String,
    bytes: u64,
}

impl MemoryQuantity {
    pub fn parse(raw: &str) -> Result<Self, QuantityError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(QuantityError::new("memory quantity", raw, "value is empty"));
        }

        // `Gi` / `Mi` are binary units without the trailing byte marker.
        let mut normalized = trimmed.to_string();
        if normalized.ends_with('i') {
            normalized.push('B');
        }

        let bytes = Byte::parse_str(&normalized, true)
            .map_err(|e| QuantityError::new("memory quantity", raw, e.to_string()))?
            .as_u64();

        Ok(Self {
            raw: trimmed.to_string(),
            bytes,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Decimal gigabytes, the unit the pipeline spec uses for memory limits.
    pub fn gigabytes(&self) -> f64 {
        self.bytes as f64 / 1_000_000_000.0
    }
}

/// Step timeout: bare seconds or a number with an `s`/`m`/`h`/`d` suffix.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeoutSpec {
    raw: String,
    duration: Duration,
}

impl TimeoutSpec {
    pub fn parse(raw: &str) -> Result<Self, QuantityError> {
        let trimmed = raw.trim();
        let (digits, multiplier) = match trimmed.char_indices().last() {
            Some((idx, 's')) => (&trimmed[..idx], 1),
            Some((idx, 'm')) => (&trimmed[..idx], 60),
            Some((idx, 'h')) => (&trimmed[..idx], 3_600),
            Some((idx, 'd')) => (&trimmed[..idx], 86_400),
            Some(_) => (trimmed, 1),
            None => return Err(QuantityError::new("timeout", raw, "value is empty")),
        };

        let amount = digits
            .trim()
            .parse::<u64>()
            .map_err(|_| QuantityError::new("timeout", raw, "expected an integer with optional s/m/h/d suffix"))?;

        let seconds = amount
            .checked_mul(multiplier)
            .ok_or_else(|| QuantityError::new("timeout", raw, "value is too large"))?;

        Ok(Self {
            raw: trimmed.to_string(),
            duration: Duration::from_secs(seconds),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

macro_rules! string_backed {
    ($ty:ident) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.raw)
            }
        }

        impl TryFrom<String> for $ty {
            type Error = QuantityError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                $ty::parse(&value)
            }
        }

        impl From<$ty> for String {
            fn from(value: $ty) -> Self {
                value.raw
            }
        }
    };
}

string_backed!(CpuQuantity);
string_backed!(MemoryQuantity);
string_backed!(TimeoutSpec);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_quantities() {
        assert_eq!(CpuQuantity::parse("4").unwrap().millicores(), 4_000);
        assert_eq!(CpuQuantity::parse("0.5").unwrap().millicores(), 500);
        assert_eq!(CpuQuantity::parse("250m").unwrap().millicores(), 250);
        assert_eq!(CpuQuantity::parse("0").unwrap().millicores(), 0);
        assert_eq!(CpuQuantity::parse("2").unwrap().cores(), 2.0);

        assert!(CpuQuantity::parse("").is_err());
        assert!(CpuQuantity::parse("four").is_err());
        assert!(CpuQuantity::parse("-1").is_err());
        assert!(CpuQuantity::parse("1.5m").is_err());
    }

    #[test]
    fn test_memory_quantities() {
        assert_eq!(MemoryQuantity::parse("512Mi").unwrap().bytes(), 512 * 1024 * 1024);
        assert_eq!(
            MemoryQuantity::parse("16Gi").unwrap().bytes(),
            16 * 1024 * 1024 * 1024
        );
        assert_eq!(MemoryQuantity::parse("16Gi").unwrap().as_str(), "16Gi");

        assert!(MemoryQuantity::parse("").is_err());
        assert!(MemoryQuantity::parse("lots").is_err());
    }

    #[test]
    fn test_timeouts() {
        assert_eq!(TimeoutSpec::parse("3600").unwrap().duration(), Duration::from_secs(3600));
        assert_eq!(TimeoutSpec::parse("90s").unwrap().duration(), Duration::from_secs(90));
        assert_eq!(TimeoutSpec::parse("30m").unwrap().duration(), Duration::from_secs(1800));
        assert_eq!(TimeoutSpec::parse("2h").unwrap().duration(), Duration::from_secs(7200));
        assert_eq!(TimeoutSpec::parse("1d").unwrap().duration(), Duration::from_secs(86_400));

        assert!(TimeoutSpec::parse("").is_err());
        assert!(TimeoutSpec::parse("soon").is_err());
        assert!(TimeoutSpec::parse("10w").is_err());
    }
}
