//! Azure location normalization

/// Canonical form of an Azure location: lower-case with spaces removed,
/// so `"West US"` and `"westus"` compare equal.
pub fn normalize(input: &str) -> String {
    input.replace(' ', "").to_lowercase()
}
