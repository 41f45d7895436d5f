//! Terraform provider for Azure Network Security Perimeters
//!
//! Manages network security perimeter profiles and resource associations
//! through the Azure Resource Manager REST API.

pub mod client;
pub mod config;
pub mod error;
pub mod ids;
pub mod location;
pub mod provider;
pub mod resources;
pub mod schema;
pub mod validation;

pub use provider::NspProvider;
