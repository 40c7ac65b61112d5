//! Known road test centres and their location ids.

use crate::request::ValidationError;

pub const KNOWN_LOCATIONS: &[(&str, u32)] = &[
    ("Richmond claim centre (Elmbridge Way)", 273),
    ("Richmond driver licensing (Lansdowne Centre mall)", 93),
    ("Vancouver driver licensing (Point Grey)", 9),
    ("Vancouver claim centre (Kingsway)", 275),
    ("Burnaby claim centre (Wayburne Drive)", 274),
    ("Surrey driver licensing", 11),
    ("Newton claim centre (68 Avenue)", 271),
    ("Surrey claim centre (152A St.)", 269),
    ("North Vancouver driver licensing", 8),
];

/// Resolve a location given either as a numeric id or a known centre name
/// (case-insensitive).
pub fn resolve(location: &str) -> Result<u32, ValidationError> {
    let trimmed = location.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Missing("location"));
    }
    if let Ok(id) = trimmed.parse::<u32>() {
        return Ok(id);
    }

    KNOWN_LOCATIONS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(trimmed))
        .map(|(_, id)| *id)
        .ok_or_else(|| ValidationError::UnknownLocation(trimmed.to_string()))
}

pub fn name_of(id: u32) -> Option<&'static str> {
    KNOWN_LOCATIONS
        .iter()
        .find(|(_, known)| *known == id)
        .map(|(name, _)| *name)
}
