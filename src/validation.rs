//! Input validation and sanitization for user-supplied identifiers.
//!
//! This module provides functions to validate user-supplied IDs and other inputs
//! before they are used in file path construction, preventing path traversal attacks
//! and other security issues.

use anyhow::{bail, Result};

/// Maximum allowed length for IDs (runner, track, signal).
pub const MAX_ID_LENGTH: usize = 128;

/// Maximum allowed length for descriptions.
pub const MAX_DESCRIPTION_LENGTH: usize = 500;

/// Reserved names that cannot be used as IDs (case-insensitive).
const RESERVED_NAMES: &[&str] = &[
    ".", "..", "con", "prn", "aux", "nul", "com1", "com2", "com3", "com4", "com5", "com6", "com7",
    "com8", "com9", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

/// Validates that an ID is safe for use in file paths.
///
/// An ID is valid if:
/// - It is not empty
/// - It is no longer than MAX_ID_LENGTH characters
/// - It contains only alphanumeric characters, dashes, and underscores
/// - It does not use reserved system names
///
/// # Arguments
///
/// * `id` - The ID string to validate
///
/// # Returns
///
/// * `Ok(())` if the ID is valid
/// * `Err` with a descriptive message if validation fails
///
/// # Examples
///
/// ```
/// use weft::validation::validate_id;
///
/// assert!(validate_id("runner-001").is_ok());
/// assert!(validate_id("track_2024").is_ok());
/// assert!(validate_id("").is_err());
/// assert!(validate_id("../etc/passwd").is_err());
/// ```
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        bail!("ID cannot be empty");
    }

    if id.len() > MAX_ID_LENGTH {
        bail!(
            "ID too long: {} characters (max {})",
            id.len(),
            MAX_ID_LENGTH
        );
    }

    let valid_chars = id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid_chars {
        bail!("ID '{id}' contains invalid characters. Use only alphanumeric characters, dashes (-), and underscores (_)");
    }

    let id_lower = id.to_lowercase();
    if RESERVED_NAMES.contains(&id_lower.as_str()) {
        bail!("ID '{id}' uses a reserved name");
    }

    Ok(())
}

/// Validates that a description is within acceptable length limits.
///
/// # Arguments
///
/// * `description` - The description string to validate
///
/// # Returns
///
/// * `Ok(())` if the description is valid
/// * `Err` with a descriptive message if validation fails
pub fn validate_description(description: &str) -> Result<()> {
    if description.len() > MAX_DESCRIPTION_LENGTH {
        bail!(
            "Description too long: {} characters (max {})",
            description.len(),
            MAX_DESCRIPTION_LENGTH
        );
    }

    Ok(())
}

/// Clap value parser for validating ID arguments.
///
/// Use this with clap's `value_parser` attribute to validate IDs at parse time.
///
/// # Examples
///
/// ```ignore
/// #[arg(value_parser = clap_id_validator)]
/// id: String,
/// ```
pub fn clap_id_validator(s: &str) -> Result<String, String> {
    validate_id(s).map_err(|e| e.to_string())?;
    Ok(s.to_string())
}
