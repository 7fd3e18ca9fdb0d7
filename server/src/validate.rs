//! Input checks shared by the core components

use crate::error::{CoreError, CoreResult};

/// A required numeric field; NaN and infinities count as non-numeric
pub fn required_number(field: &str, value: Option<f64>) -> CoreResult<f64> {
    let value = value.ok_or_else(|| CoreError::validation(format!("{field} is required")))?;
    finite(field, value)
}

/// An optional numeric field that must be finite when present
pub fn optional_number(field: &str, value: Option<f64>) -> CoreResult<Option<f64>> {
    value.map(|v| finite(field, v)).transpose()
}

fn finite(field: &str, value: f64) -> CoreResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(CoreError::validation(format!("{field} must be numeric")))
    }
}

/// Latitude and longitude, both required and within WGS84 bounds
pub fn position(latitude: Option<f64>, longitude: Option<f64>) -> CoreResult<(f64, f64)> {
    let lat = required_number("latitude", latitude)?;
    let lon = required_number("longitude", longitude)?;

    if !(-90.0..=90.0).contains(&lat) {
        return Err(CoreError::validation(format!("latitude out of range: {lat}")));
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(CoreError::validation(format!("longitude out of range: {lon}")));
    }
    Ok((lat, lon))
}

/// A vehicle id must be present and non-blank
pub fn drone_id(id: &str) -> CoreResult<String> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(CoreError::validation("droneId is required"));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_requires_both_fields() {
        assert!(position(Some(1.0), None).is_err());
        assert!(position(None, Some(1.0)).is_err());
        assert_eq!(position(Some(37.0), Some(-122.0)).unwrap(), (37.0, -122.0));
    }

    #[test]
    fn test_position_rejects_non_finite_and_out_of_range() {
        assert!(position(Some(f64::NAN), Some(0.0)).is_err());
        assert!(position(Some(0.0), Some(f64::INFINITY)).is_err());
        assert!(position(Some(90.5), Some(0.0)).is_err());
        assert!(position(Some(0.0), Some(-180.5)).is_err());
        assert!(position(Some(-90.0), Some(180.0)).is_ok());
    }

    #[test]
    fn test_drone_id_trims() {
        assert_eq!(drone_id("  drone_01 ").unwrap(), "drone_01");
        assert!(matches!(drone_id("   "), Err(CoreError::Validation(_))));
    }
}
