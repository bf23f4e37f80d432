//! Validation and normalization for addresses, bundle names and load paths
//!
//! Everything that ends up inside a bundle name or a catalog internal id passes
//! through here so the same normalization is applied at every stage.

use crate::error::{PackError, Result};
use regex::Regex;
use std::sync::OnceLock;

/// Scheme prefixes corrupted by a backslash path join (`http:\host` -> `http://host`)
const BROKEN_SCHEME_PATTERN: &str = r"^(https?):\\+";

fn broken_scheme() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(BROKEN_SCHEME_PATTERN).expect("scheme pattern is valid"))
}

/// Reject addresses that would collide with the runtime's sub-object syntax
///
/// # Examples
///
/// ```
/// use bundlepack::core::validation::validate_address;
///
/// assert!(validate_address("characters/hero").is_ok());
/// assert!(validate_address("atlas[3]").is_err());
/// assert!(validate_address("weird]name").is_err());
/// ```
pub fn validate_address(address: &str) -> Result<()> {
    if address.contains('[') || address.contains(']') {
        return Err(PackError::InvalidAddress(address.to_string()));
    }
    Ok(())
}

/// Normalize a bundle input name
///
/// Removes spaces and folds backslashes and doubled slashes. Case is kept;
/// collision checks downstream are case-insensitive.
pub fn normalize_bundle_name(name: &str) -> String {
    name.replace(' ', "")
        .replace('\\', "/")
        .replace("//", "/")
}

/// Normalize a group name for use as a final bundle name prefix
pub fn sanitize_group_name(name: &str) -> String {
    normalize_bundle_name(name).to_lowercase()
}

/// Normalize separators in an internal id and repair URL schemes
///
/// # Examples
///
/// ```
/// use bundlepack::core::validation::repair_internal_id;
///
/// assert_eq!(
///     repair_internal_id("https:\\cdn.example.com\\dlc\\a.bundle"),
///     "https://cdn.example.com/dlc/a.bundle"
/// );
/// assert_eq!(repair_internal_id("{RuntimePath}\\a.bundle"), "{RuntimePath}/a.bundle");
/// ```
pub fn repair_internal_id(internal_id: &str) -> String {
    let repaired = broken_scheme().replace(internal_id, "$1://");
    repaired.replace('\\', "/")
}

/// Join a load path and a file name with a single `/`
pub fn join_load_path(load_path: &str, file_name: &str) -> String {
    let base = load_path.trim_end_matches(['/', '\\']);
    if base.is_empty() {
        file_name.to_string()
    } else {
        format!("{}/{}", base, file_name)
    }
}

/// File name component of an internal id (works for both separators)
pub fn file_name_of(internal_id: &str) -> &str {
    internal_id
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(internal_id)
}

/// Strip the temporary `_{hash}` suffix from a bundle file name or path
///
/// Returns `None` unless the file name ends in `_{hash}.bundle` with a
/// non-empty name left in front of it.
///
/// # Examples
///
/// ```
/// use bundlepack::core::validation::strip_hash_from_bundle_location;
///
/// assert_eq!(
///     strip_hash_from_bundle_location("out/foo_bar_9f8c.bundle", "9f8c").as_deref(),
///     Some("out/foo_bar.bundle")
/// );
/// assert_eq!(strip_hash_from_bundle_location("out/foo_bar.bundle", "9f8c"), None);
/// ```
pub fn strip_hash_from_bundle_location(location: &str, hash: &str) -> Option<String> {
    if hash.is_empty() {
        return None;
    }
    let stem = location.strip_suffix(&format!("_{}.bundle", hash))?;
    if stem.is_empty() || stem.ends_with('/') || stem.ends_with('\\') {
        return None;
    }
    Some(format!("{}.bundle", stem))
}
