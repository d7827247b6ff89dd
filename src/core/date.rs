use crate::core::error::RateError;

/// Zero-pads a month or day number to two digits, e.g. `5` becomes `"05"`.
///
/// Values of three or more digits are returned unpadded. Zero and negative
/// values are rejected.
pub fn format_date_component(component: i64) -> Result<String, RateError> {
    if component == 0 {
        return Err(RateError::InvalidInput(
            "Date component cannot be zero. Must be 1 or greater.".to_string(),
        ));
    }
    if component < 1 {
        return Err(RateError::InvalidInput(format!(
            "Date component cannot be negative. Received: {component}."
        )));
    }
    Ok(format!("{component:02}"))
}
