//! Row shapes of the nine object tables
//!
//! These mirror the column sets the management REST layer writes. The
//! string-packed columns (`status_flags` as CHAR(4), `state_text` as one
//! `;`-joined VARCHAR) are wire-fixed against that layer; they stay strings
//! here and are converted to typed values by the object constructors.

/// `tbl_analog_input_objects`
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AnalogInputRow {
    pub id: u32,
    pub object_identifier: u32,
    pub object_name: String,
    pub present_value: f64,
    pub description: Option<String>,
    pub status_flags: String,
    pub event_state: String,
    pub out_of_service: bool,
    pub units: String,
    pub cov_increment: f64,
}

/// `tbl_analog_output_objects`
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AnalogOutputRow {
    pub id: u32,
    pub object_identifier: u32,
    pub object_name: String,
    pub present_value: f64,
    pub description: Option<String>,
    pub status_flags: String,
    pub event_state: String,
    pub out_of_service: bool,
    pub units: String,
    pub relinquish_default: f64,
    pub current_command_priority: Option<u8>,
    pub cov_increment: f64,
}

/// `tbl_analog_value_objects`
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AnalogValueRow {
    pub id: u32,
    pub object_identifier: u32,
    pub object_name: String,
    pub present_value: f64,
    pub description: Option<String>,
    pub status_flags: String,
    pub event_state: String,
    pub out_of_service: bool,
    pub units: String,
    pub cov_increment: f64,
}

/// `tbl_binary_input_objects`
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BinaryInputRow {
    pub id: u32,
    pub object_identifier: u32,
    pub object_name: String,
    pub present_value: String,
    pub description: Option<String>,
    pub status_flags: String,
    pub event_state: String,
    pub out_of_service: bool,
    pub polarity: String,
}

/// `tbl_binary_output_objects`
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BinaryOutputRow {
    pub id: u32,
    pub object_identifier: u32,
    pub object_name: String,
    pub present_value: String,
    pub description: Option<String>,
    pub status_flags: String,
    pub event_state: String,
    pub out_of_service: bool,
    pub polarity: String,
    pub relinquish_default: String,
    pub current_command_priority: Option<u8>,
}

/// `tbl_binary_value_objects`
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BinaryValueRow {
    pub id: u32,
    pub object_identifier: u32,
    pub object_name: String,
    pub present_value: String,
    pub description: Option<String>,
    pub status_flags: String,
    pub event_state: String,
    pub out_of_service: bool,
}

/// `tbl_multi_state_input_objects`
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MultiStateInputRow {
    pub id: u32,
    pub object_identifier: u32,
    pub object_name: String,
    pub present_value: u32,
    pub description: Option<String>,
    pub status_flags: String,
    pub event_state: String,
    pub out_of_service: bool,
    pub number_of_states: u8,
    pub state_text: Option<String>,
}

/// `tbl_multi_state_output_objects`
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MultiStateOutputRow {
    pub id: u32,
    pub object_identifier: u32,
    pub object_name: String,
    pub present_value: u32,
    pub description: Option<String>,
    pub status_flags: String,
    pub event_state: String,
    pub out_of_service: bool,
    pub number_of_states: u8,
    pub state_text: Option<String>,
    pub relinquish_default: u32,
    pub current_command_priority: Option<u8>,
}

/// `tbl_multi_state_value_objects`
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MultiStateValueRow {
    pub id: u32,
    pub object_identifier: u32,
    pub object_name: String,
    pub present_value: u32,
    pub description: Option<String>,
    pub status_flags: String,
    pub event_state: String,
    pub out_of_service: bool,
    pub number_of_states: u8,
    pub state_text: Option<String>,
}

/// Validate the command-priority column (1..=16 or NULL). The value is never
/// applied to a live object; the check keeps a bad row from going unnoticed.
pub fn validate_command_priority(priority: Option<u8>) -> crate::object::Result<()> {
    match priority {
        None => Ok(()),
        Some(p) if (1..=16).contains(&p) => Ok(()),
        Some(p) => Err(crate::object::ObjectError::InvalidValue(format!(
            "current_command_priority must be 1..=16 or NULL, got {}",
            p
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_priority_bounds() {
        assert!(validate_command_priority(None).is_ok());
        assert!(validate_command_priority(Some(1)).is_ok());
        assert!(validate_command_priority(Some(16)).is_ok());
        assert!(validate_command_priority(Some(0)).is_err());
        assert!(validate_command_priority(Some(17)).is_err());
    }
}
