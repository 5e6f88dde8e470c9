use std::collections::BTreeMap;

use pipewright_common::{
    error::{Error, ValidationIssues},
    job::{
        ComputeSpec, CpuQuantity, CronSchedule, IDENTITY_FIELDS, JobDescriptor, MemoryQuantity,
        TimeoutSpec,
    },
};
use serde_yaml::Value;

use crate::schema::{RawDescriptor, scalar_text};

const REQUIRED_FIELDS: [&str; 4] = ["name", "schedule", "compute", "parameters"];
const REQUIRED_COMPUTE_FIELDS: [&str; 2] = ["cpu", "memory"];

/// Checks a parsed descriptor document and converts it into a [`JobDescriptor`].
/// ---
/// Structural problems (missing or forbidden keys) are collected first so the
/// author sees all of them at once; semantic checks only run on a document
/// with the expected shape.
pub fn validate_descriptor(job: &str, document: Value) -> Result<JobDescriptor, Error> {
    let mut issues = ValidationIssues::new();

    check_structure(&document, &mut issues);
    if !issues.is_empty() {
        return Err(invalid(job, issues));
    }

    let raw: RawDescriptor = match serde_yaml::from_value(document) {
        Ok(raw) => raw,
        Err(e) => {
            issues.push("<schema>", e.to_string());
            return Err(invalid(job, issues));
        }
    };

    if raw.name != job {
        issues.push(
            "name",
            format!("'{}' does not match the job directory '{}'", raw.name, job),
        );
    }
    if !is_valid_identifier(&raw.name) {
        issues.push("name", "may only contain letters, digits, '-' and '_'");
    }

    let schedule = CronSchedule::parse(&raw.schedule)
        .map_err(|e| issues.push("schedule", e.to_string()))
        .ok();

    let cpu = parse_scalar(&raw.compute.cpu, "compute.cpu", &mut issues, CpuQuantity::parse);
    let memory = parse_scalar(
        &raw.compute.memory,
        "compute.memory",
        &mut issues,
        MemoryQuantity::parse,
    );
    let timeout = match &raw.compute.timeout {
        Some(value) => parse_scalar(value, "compute.timeout", &mut issues, TimeoutSpec::parse)
            .map(Some),
        None => Some(None),
    };

    let mut parameters = BTreeMap::new();
    for (key, value) in raw.parameters.iter() {
        let field = format!("parameters.{}", key);

        if !is_valid_identifier(key) {
            issues.push(&field, "parameter names may only contain letters, digits, '-' and '_'");
            continue;
        }
        if IDENTITY_FIELDS.contains(&key.as_str()) {
            issues.push(
                &field,
                "identity values come from environment configuration; use a {{placeholder}}",
            );
            continue;
        }

        match scalar_text(value) {
            Some(text) => {
                parameters.insert(key.clone(), text);
            }
            None => issues.push(&field, "must be a string, number or boolean"),
        }
    }

    match (schedule, cpu, memory, timeout) {
        (Some(schedule), Some(cpu), Some(memory), Some(timeout)) if issues.is_empty() => {
            Ok(JobDescriptor {
                name: raw.name,
                description: raw.description.filter(|d| !d.trim().is_empty()),
                schedule,
                compute: ComputeSpec {
                    cpu,
                    memory,
                    timeout,
                },
                parameters,
            })
        }
        _ => Err(invalid(job, issues)),
    }
}

fn check_structure(document: &Value, issues: &mut ValidationIssues) {
    let Some(mapping) = document.as_mapping() else {
        issues.push("<document>", "descriptor must be a mapping");
        return;
    };

    for field in REQUIRED_FIELDS {
        if !mapping.contains_key(field) {
            issues.push(field, "missing required field");
        }
    }

    for field in IDENTITY_FIELDS {
        if mapping.contains_key(field) {
            issues.push(
                field,
                "identity fields must come from environment configuration, not the descriptor",
            );
        }
    }

    if let Some(schedule) = mapping.get("schedule") {
        if !schedule.is_string() {
            issues.push("schedule", "must be a quoted cron expression");
        }
    }

    if let Some(parameters) = mapping.get("parameters") {
        if !parameters.is_mapping() {
            issues.push("parameters", "must be a mapping of name to value");
        }
    }

    match mapping.get("compute") {
        Some(Value::Mapping(compute)) => {
            for field in REQUIRED_COMPUTE_FIELDS {
                if !compute.contains_key(field) {
                    issues.push(format!("compute.{}", field), "missing required field");
                }
            }
        }
        Some(_) => issues.push("compute", "must be a mapping with cpu and memory"),
        None => {}
    }
}

fn parse_scalar<T, E: ToString>(
    value: &Value,
    field: &str,
    issues: &mut ValidationIssues,
    parse: impl Fn(&str) -> Result<T, E>,
) -> Option<T> {
    let Some(text) = scalar_text(value) else {
        issues.push(field, "must be a scalar value");
        return None;
    };

    parse(&text).map_err(|e| issues.push(field, e.to_string())).ok()
}

fn is_valid_identifier(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn invalid(job: &str, issues: ValidationIssues) -> Error {
    Error::Validation {
        job: job.to_string(),
        issues,
    }
}
