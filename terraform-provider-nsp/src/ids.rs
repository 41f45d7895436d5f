//! Resource identifiers for network security perimeters
//!
//! Azure Resource Manager identifies resources by hierarchical paths such as
//! `/subscriptions/{sub}/resourceGroups/{rg}/providers/Microsoft.Network/networkSecurityPerimeters/{nsp}`.
//! Parsing is exact: segment keys are matched case-sensitively, no segment may
//! be empty, and `parse(id.to_string()) == id` for every id built here.

use std::fmt;
use thiserror::Error;

const PROVIDER_NAMESPACE: &str = "Microsoft.Network";

/// Identifier parse error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("parsing {kind} ID {input:?}: {reason}")]
pub struct IdParseError {
    pub kind: &'static str,
    pub input: String,
    pub reason: String,
}

/// One key/value pair of an id template
enum Segment {
    /// Key followed by a fixed value
    Static(&'static str, &'static str),
    /// Key followed by a caller-chosen, non-empty value
    Named(&'static str),
}

const PERIMETER_TEMPLATE: &[Segment] = &[
    Segment::Named("subscriptions"),
    Segment::Named("resourceGroups"),
    Segment::Static("providers", PROVIDER_NAMESPACE),
    Segment::Named("networkSecurityPerimeters"),
];

const PROFILE_TEMPLATE: &[Segment] = &[
    Segment::Named("subscriptions"),
    Segment::Named("resourceGroups"),
    Segment::Static("providers", PROVIDER_NAMESPACE),
    Segment::Named("networkSecurityPerimeters"),
    Segment::Named("profiles"),
];

const ASSOCIATION_TEMPLATE: &[Segment] = &[
    Segment::Named("subscriptions"),
    Segment::Named("resourceGroups"),
    Segment::Static("providers", PROVIDER_NAMESPACE),
    Segment::Named("networkSecurityPerimeters"),
    Segment::Named("resourceAssociations"),
];

/// Split `input` according to `template`, returning the named values in order
fn parse_segments<'a>(
    kind: &'static str,
    input: &'a str,
    template: &[Segment],
) -> Result<Vec<&'a str>, IdParseError> {
    let fail = |reason: String| IdParseError {
        kind,
        input: input.to_string(),
        reason,
    };

    let path = input
        .strip_prefix('/')
        .ok_or_else(|| fail("expected a leading '/'".to_string()))?;
    let parts: Vec<&str> = path.split('/').collect();

    if parts.len() != template.len() * 2 {
        return Err(fail(format!(
            "expected {} segments but found {}",
            template.len() * 2,
            parts.len()
        )));
    }

    let mut values = Vec::new();
    for (segment, pair) in template.iter().zip(parts.chunks(2)) {
        let (key, value) = (pair[0], pair[1]);
        match segment {
            Segment::Static(expected_key, expected_value) => {
                if key != *expected_key || value != *expected_value {
                    return Err(fail(format!(
                        "expected segment {:?} to be {:?} but found {:?}",
                        expected_key,
                        expected_value,
                        format!("{}/{}", key, value)
                    )));
                }
            }
            Segment::Named(expected_key) => {
                if key != *expected_key {
                    return Err(fail(format!(
                        "expected segment {:?} but found {:?}",
                        expected_key, key
                    )));
                }
                if value.is_empty() {
                    return Err(fail(format!("segment {:?} has an empty value", key)));
                }
                values.push(value);
            }
        }
    }

    Ok(values)
}

/// Network security perimeter id
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PerimeterId {
    pub subscription_id: String,
    pub resource_group_name: String,
    pub perimeter_name: String,
}

impl PerimeterId {
    pub fn new(subscription_id: &str, resource_group_name: &str, perimeter_name: &str) -> Self {
        Self {
            subscription_id: subscription_id.to_string(),
            resource_group_name: resource_group_name.to_string(),
            perimeter_name: perimeter_name.to_string(),
        }
    }

    pub fn parse(input: &str) -> Result<Self, IdParseError> {
        let v = parse_segments("Network Security Perimeter", input, PERIMETER_TEMPLATE)?;
        Ok(Self::new(v[0], v[1], v[2]))
    }
}

impl fmt::Display for PerimeterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/subscriptions/{}/resourceGroups/{}/providers/{}/networkSecurityPerimeters/{}",
            self.subscription_id, self.resource_group_name, PROVIDER_NAMESPACE, self.perimeter_name
        )
    }
}

/// Network security perimeter profile id
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProfileId {
    pub subscription_id: String,
    pub resource_group_name: String,
    pub perimeter_name: String,
    pub profile_name: String,
}

impl ProfileId {
    pub fn new(
        subscription_id: &str,
        resource_group_name: &str,
        perimeter_name: &str,
        profile_name: &str,
    ) -> Self {
        Self {
            subscription_id: subscription_id.to_string(),
            resource_group_name: resource_group_name.to_string(),
            perimeter_name: perimeter_name.to_string(),
            profile_name: profile_name.to_string(),
        }
    }

    pub fn parse(input: &str) -> Result<Self, IdParseError> {
        let v = parse_segments("Network Security Perimeter Profile", input, PROFILE_TEMPLATE)?;
        Ok(Self::new(v[0], v[1], v[2], v[3]))
    }

    /// The perimeter this profile belongs to
    pub fn perimeter_id(&self) -> PerimeterId {
        PerimeterId::new(
            &self.subscription_id,
            &self.resource_group_name,
            &self.perimeter_name,
        )
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/profiles/{}", self.perimeter_id(), self.profile_name)
    }
}

/// Network security perimeter resource association id
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceAssociationId {
    pub subscription_id: String,
    pub resource_group_name: String,
    pub perimeter_name: String,
    pub association_name: String,
}

impl ResourceAssociationId {
    pub fn new(
        subscription_id: &str,
        resource_group_name: &str,
        perimeter_name: &str,
        association_name: &str,
    ) -> Self {
        Self {
            subscription_id: subscription_id.to_string(),
            resource_group_name: resource_group_name.to_string(),
            perimeter_name: perimeter_name.to_string(),
            association_name: association_name.to_string(),
        }
    }

    pub fn parse(input: &str) -> Result<Self, IdParseError> {
        let v = parse_segments("Resource Association", input, ASSOCIATION_TEMPLATE)?;
        Ok(Self::new(v[0], v[1], v[2], v[3]))
    }

    pub fn perimeter_id(&self) -> PerimeterId {
        PerimeterId::new(
            &self.subscription_id,
            &self.resource_group_name,
            &self.perimeter_name,
        )
    }
}

impl fmt::Display for ResourceAssociationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/resourceAssociations/{}",
            self.perimeter_id(),
            self.association_name
        )
    }
}

/// Final path segment of an arbitrary resource id, ignoring a trailing '/'
pub fn last_segment(resource_id: &str) -> Option<&str> {
    resource_id.split('/').filter(|s| !s.is_empty()).last()
}
