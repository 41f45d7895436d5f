//! Attribute validation
//!
//! Each resource declares a table of `(field, validator)` pairs. The provider
//! runs the table against the configuration before it is decoded, so
//! validators only ever see raw JSON values and stay free of side effects.

use crate::ids::{PerimeterId, ProfileId};
use crate::schema::Diagnostic;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::LazyLock;

pub const MAX_RESOURCE_GROUP_NAME_LENGTH: usize = 90;
pub const MAX_TAG_COUNT: usize = 50;
pub const MAX_TAG_KEY_LENGTH: usize = 512;
pub const MAX_TAG_VALUE_LENGTH: usize = 256;

/// Allowed values of an association's access mode
pub const ACCESS_MODES: &[&str] = &["Audit", "Enforced", "Learning"];

static RESOURCE_GROUP_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[-\w._()]+$").expect("resource group pattern is valid")
});

/// Validation outcome for a single value
pub type ValidateResult = Result<(), String>;

/// A validator bound to the attribute it checks
#[derive(Clone, Copy)]
pub struct FieldValidator {
    pub field: &'static str,
    pub check: fn(&Value) -> ValidateResult,
}

impl FieldValidator {
    pub const fn new(field: &'static str, check: fn(&Value) -> ValidateResult) -> Self {
        Self { field, check }
    }
}

/// Run a validator table against a configuration
///
/// Absent and null values are skipped: requiredness is the schema's concern and
/// values unknown at plan time arrive as null.
pub fn validate(table: &[FieldValidator], config: &HashMap<String, Value>) -> Vec<Diagnostic> {
    table
        .iter()
        .filter_map(|v| {
            let value = config.get(v.field).filter(|value| !value.is_null())?;
            (v.check)(value).err().map(|message| {
                Diagnostic::error(&format!("{}: {}", v.field, message))
                    .with_attribute(vec![v.field.to_string()])
            })
        })
        .collect()
}

fn as_str(value: &Value) -> Result<&str, String> {
    value
        .as_str()
        .ok_or_else(|| format!("expected a string, got {}", value))
}

pub fn string_is_not_empty(value: &Value) -> ValidateResult {
    if as_str(value)?.trim().is_empty() {
        return Err("must not be empty or consist only of whitespace".to_string());
    }
    Ok(())
}

pub fn resource_group_name(value: &Value) -> ValidateResult {
    let name = as_str(value)?;

    if name.is_empty() || name.chars().count() > MAX_RESOURCE_GROUP_NAME_LENGTH {
        return Err(format!(
            "must be between 1 and {} characters in length",
            MAX_RESOURCE_GROUP_NAME_LENGTH
        ));
    }
    if name.ends_with('.') {
        return Err("cannot end with a period".to_string());
    }
    if !RESOURCE_GROUP_NAME_REGEX.is_match(name) {
        return Err(
            "may only contain alphanumeric characters, dash, underscores, parentheses and periods"
                .to_string(),
        );
    }

    Ok(())
}

pub fn perimeter_id(value: &Value) -> ValidateResult {
    PerimeterId::parse(as_str(value)?)
        .map(|_| ())
        .map_err(|e| e.to_string())
}

pub fn profile_id(value: &Value) -> ValidateResult {
    ProfileId::parse(as_str(value)?)
        .map(|_| ())
        .map_err(|e| e.to_string())
}

pub fn access_mode(value: &Value) -> ValidateResult {
    let mode = as_str(value)?;
    if !ACCESS_MODES.contains(&mode) {
        return Err(format!(
            "expected one of [{}], got {:?}",
            ACCESS_MODES.join(", "),
            mode
        ));
    }
    Ok(())
}

pub fn tags(value: &Value) -> ValidateResult {
    let tags = value
        .as_object()
        .ok_or_else(|| format!("expected a map, got {}", value))?;

    if tags.len() > MAX_TAG_COUNT {
        return Err(format!(
            "a maximum of {} tags can be applied to each resource",
            MAX_TAG_COUNT
        ));
    }

    for (key, tag_value) in tags {
        if key.chars().count() > MAX_TAG_KEY_LENGTH {
            return Err(format!(
                "the maximum length for a tag key is {} characters: {:?}",
                MAX_TAG_KEY_LENGTH, key
            ));
        }
        let tag_value = tag_value
            .as_str()
            .ok_or_else(|| format!("value of tag {:?} must be a string", key))?;
        if tag_value.chars().count() > MAX_TAG_VALUE_LENGTH {
            return Err(format!(
                "the maximum length for a tag value is {} characters: {:?}",
                MAX_TAG_VALUE_LENGTH, key
            ));
        }
    }

    Ok(())
}
