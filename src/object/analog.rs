//! Analog Object Types Implementation
//!
//! Analog Input, Analog Output and Analog Value objects as defined in
//! ASHRAE 135. Present values are held as IEEE-754 doubles and served over
//! the wire as REAL.
//!
//! The refresh pass overwrites every mapped property from the database row
//! except the present value of Analog Output objects, whose authority lives
//! in memory between persistence cycles, and the present value of any object
//! that is out of service.

use crate::db::rows::{AnalogInputRow, AnalogOutputRow, AnalogValueRow};
use crate::object::{
    parse_common, CovEvent, EngineeringUnits, EventState, ObjectError, ObjectIdentifier,
    ObjectType, PropertyIdentifier, PropertyValue, Result, StatusFlags,
};

fn parse_cov_increment(value: f64) -> Result<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ObjectError::InvalidValue(format!(
            "cov_increment must be a finite value >= 0, got {}",
            value
        )))
    }
}

fn present_value_from_write(value: PropertyValue) -> Result<f64> {
    match value {
        PropertyValue::Real(v) => Ok(v as f64),
        PropertyValue::Double(v) => Ok(v),
        _ => Err(ObjectError::InvalidPropertyType),
    }
}

/// Analog Input object
#[derive(Debug, Clone)]
pub struct AnalogInput {
    /// Object identifier
    pub identifier: ObjectIdentifier,
    /// Object name
    pub object_name: String,
    /// Present value
    pub present_value: f64,
    /// Description
    pub description: String,
    /// Status flags
    pub status_flags: StatusFlags,
    /// Event state
    pub event_state: EventState,
    /// Out of service
    pub out_of_service: bool,
    /// Engineering units
    pub units: EngineeringUnits,
    /// COV increment
    pub cov_increment: f64,
}

impl AnalogInput {
    /// Build a live object from its database row
    pub fn from_row(row: &AnalogInputRow) -> Result<Self> {
        let common = parse_common(
            &row.object_name,
            row.description.as_deref(),
            &row.status_flags,
            &row.event_state,
            row.out_of_service,
            false,
        )?;
        Ok(Self {
            identifier: ObjectIdentifier::new(ObjectType::AnalogInput, row.object_identifier),
            object_name: common.object_name,
            present_value: row.present_value,
            description: common.description,
            status_flags: common.status_flags,
            event_state: common.event_state,
            out_of_service: common.out_of_service,
            units: EngineeringUnits::parse(&row.units)?,
            cov_increment: parse_cov_increment(row.cov_increment)?,
        })
    }

    /// Refresh every mapped property from the row. The present value is kept
    /// while the object is out of service so operator-asserted values survive.
    /// Validation happens before any assignment, so a malformed row leaves
    /// the object untouched.
    pub fn apply_row(&mut self, row: &AnalogInputRow) -> Result<Option<CovEvent>> {
        let common = parse_common(
            &row.object_name,
            row.description.as_deref(),
            &row.status_flags,
            &row.event_state,
            row.out_of_service,
            false,
        )?;
        let units = EngineeringUnits::parse(&row.units)?;
        let cov_increment = parse_cov_increment(row.cov_increment)?;

        let changed = (!self.out_of_service && self.present_value != row.present_value)
            || self.status_flags != common.status_flags;

        if !self.out_of_service {
            self.present_value = row.present_value;
        }
        self.object_name = common.object_name;
        self.description = common.description;
        self.status_flags = common.status_flags;
        self.event_state = common.event_state;
        self.out_of_service = common.out_of_service;
        self.units = units;
        self.cov_increment = cov_increment;

        Ok(changed.then_some(CovEvent { object: self.identifier }))
    }

    pub fn read_property(&self, property: PropertyIdentifier) -> Result<PropertyValue> {
        match property {
            PropertyIdentifier::ObjectIdentifier => {
                Ok(PropertyValue::ObjectIdentifier(self.identifier))
            }
            PropertyIdentifier::ObjectName => {
                Ok(PropertyValue::CharacterString(self.object_name.clone()))
            }
            PropertyIdentifier::ObjectType => {
                Ok(PropertyValue::Enumerated(ObjectType::AnalogInput as u32))
            }
            PropertyIdentifier::PresentValue => Ok(PropertyValue::Real(self.present_value as f32)),
            PropertyIdentifier::Description => {
                Ok(PropertyValue::CharacterString(self.description.clone()))
            }
            PropertyIdentifier::StatusFlags => {
                Ok(PropertyValue::BitString(self.status_flags.bits().to_vec()))
            }
            PropertyIdentifier::EventState => Ok(PropertyValue::Enumerated(self.event_state as u32)),
            PropertyIdentifier::OutOfService => Ok(PropertyValue::Boolean(self.out_of_service)),
            PropertyIdentifier::Units => Ok(PropertyValue::Enumerated(self.units as u32)),
            PropertyIdentifier::CovIncrement => {
                Ok(PropertyValue::Real(self.cov_increment as f32))
            }
            _ => Err(ObjectError::UnknownProperty),
        }
    }

    pub fn write_property(
        &mut self,
        property: PropertyIdentifier,
        value: PropertyValue,
    ) -> Result<Option<CovEvent>> {
        match property {
            PropertyIdentifier::PresentValue => {
                // Inputs accept present-value writes only while out of service
                if !self.out_of_service {
                    return Err(ObjectError::PropertyNotWritable);
                }
                self.present_value = present_value_from_write(value)?;
                Ok(Some(CovEvent { object: self.identifier }))
            }
            PropertyIdentifier::OutOfService => {
                if let PropertyValue::Boolean(oos) = value {
                    self.out_of_service = oos;
                    self.status_flags.out_of_service = oos;
                    Ok(Some(CovEvent { object: self.identifier }))
                } else {
                    Err(ObjectError::InvalidPropertyType)
                }
            }
            _ => Err(ObjectError::PropertyNotWritable),
        }
    }

    pub fn property_list(&self) -> Vec<PropertyIdentifier> {
        vec![
            PropertyIdentifier::ObjectIdentifier,
            PropertyIdentifier::ObjectName,
            PropertyIdentifier::ObjectType,
            PropertyIdentifier::PresentValue,
            PropertyIdentifier::Description,
            PropertyIdentifier::StatusFlags,
            PropertyIdentifier::EventState,
            PropertyIdentifier::OutOfService,
            PropertyIdentifier::Units,
            PropertyIdentifier::CovIncrement,
        ]
    }
}

/// Analog Output object
///
/// The commanded present value is authoritative in memory (the persistence
/// task writes it back); refresh never touches it.
#[derive(Debug, Clone)]
pub struct AnalogOutput {
    /// Object identifier
    pub identifier: ObjectIdentifier,
    /// Object name
    pub object_name: String,
    /// Present value (commanded)
    pub present_value: f64,
    /// Description
    pub description: String,
    /// Status flags
    pub status_flags: StatusFlags,
    /// Event state
    pub event_state: EventState,
    /// Out of service
    pub out_of_service: bool,
    /// Engineering units
    pub units: EngineeringUnits,
    /// Relinquish default
    pub relinquish_default: f64,
    /// COV increment
    pub cov_increment: f64,
}

impl AnalogOutput {
    /// Build a live object from its database row. The row's present value
    /// seeds the commanded value; after bootstrap authority moves to memory.
    pub fn from_row(row: &AnalogOutputRow) -> Result<Self> {
        let common = parse_common(
            &row.object_name,
            row.description.as_deref(),
            &row.status_flags,
            &row.event_state,
            row.out_of_service,
            false,
        )?;
        crate::db::rows::validate_command_priority(row.current_command_priority)?;
        Ok(Self {
            identifier: ObjectIdentifier::new(ObjectType::AnalogOutput, row.object_identifier),
            object_name: common.object_name,
            present_value: row.present_value,
            description: common.description,
            status_flags: common.status_flags,
            event_state: common.event_state,
            out_of_service: common.out_of_service,
            units: EngineeringUnits::parse(&row.units)?,
            relinquish_default: row.relinquish_default,
            cov_increment: parse_cov_increment(row.cov_increment)?,
        })
    }

    /// Refresh from the row, keeping the commanded present value and the
    /// command priority (database-only, never applied to the live object)
    pub fn apply_row(&mut self, row: &AnalogOutputRow) -> Result<Option<CovEvent>> {
        let common = parse_common(
            &row.object_name,
            row.description.as_deref(),
            &row.status_flags,
            &row.event_state,
            row.out_of_service,
            false,
        )?;
        let units = EngineeringUnits::parse(&row.units)?;
        let cov_increment = parse_cov_increment(row.cov_increment)?;
        crate::db::rows::validate_command_priority(row.current_command_priority)?;

        let changed = self.status_flags != common.status_flags;

        self.object_name = common.object_name;
        self.description = common.description;
        self.status_flags = common.status_flags;
        self.event_state = common.event_state;
        self.out_of_service = common.out_of_service;
        self.units = units;
        self.relinquish_default = row.relinquish_default;
        self.cov_increment = cov_increment;

        Ok(changed.then_some(CovEvent { object: self.identifier }))
    }

    pub fn read_property(&self, property: PropertyIdentifier) -> Result<PropertyValue> {
        match property {
            PropertyIdentifier::ObjectIdentifier => {
                Ok(PropertyValue::ObjectIdentifier(self.identifier))
            }
            PropertyIdentifier::ObjectName => {
                Ok(PropertyValue::CharacterString(self.object_name.clone()))
            }
            PropertyIdentifier::ObjectType => {
                Ok(PropertyValue::Enumerated(ObjectType::AnalogOutput as u32))
            }
            PropertyIdentifier::PresentValue => Ok(PropertyValue::Real(self.present_value as f32)),
            PropertyIdentifier::Description => {
                Ok(PropertyValue::CharacterString(self.description.clone()))
            }
            PropertyIdentifier::StatusFlags => {
                Ok(PropertyValue::BitString(self.status_flags.bits().to_vec()))
            }
            PropertyIdentifier::EventState => Ok(PropertyValue::Enumerated(self.event_state as u32)),
            PropertyIdentifier::OutOfService => Ok(PropertyValue::Boolean(self.out_of_service)),
            PropertyIdentifier::Units => Ok(PropertyValue::Enumerated(self.units as u32)),
            PropertyIdentifier::RelinquishDefault => {
                Ok(PropertyValue::Real(self.relinquish_default as f32))
            }
            PropertyIdentifier::CovIncrement => {
                Ok(PropertyValue::Real(self.cov_increment as f32))
            }
            _ => Err(ObjectError::UnknownProperty),
        }
    }

    pub fn write_property(
        &mut self,
        property: PropertyIdentifier,
        value: PropertyValue,
    ) -> Result<Option<CovEvent>> {
        match property {
            PropertyIdentifier::PresentValue => {
                self.present_value = present_value_from_write(value)?;
                Ok(Some(CovEvent { object: self.identifier }))
            }
            PropertyIdentifier::OutOfService => {
                if let PropertyValue::Boolean(oos) = value {
                    self.out_of_service = oos;
                    self.status_flags.out_of_service = oos;
                    Ok(Some(CovEvent { object: self.identifier }))
                } else {
                    Err(ObjectError::InvalidPropertyType)
                }
            }
            _ => Err(ObjectError::PropertyNotWritable),
        }
    }

    pub fn property_list(&self) -> Vec<PropertyIdentifier> {
        vec![
            PropertyIdentifier::ObjectIdentifier,
            PropertyIdentifier::ObjectName,
            PropertyIdentifier::ObjectType,
            PropertyIdentifier::PresentValue,
            PropertyIdentifier::Description,
            PropertyIdentifier::StatusFlags,
            PropertyIdentifier::EventState,
            PropertyIdentifier::OutOfService,
            PropertyIdentifier::Units,
            PropertyIdentifier::RelinquishDefault,
            PropertyIdentifier::CovIncrement,
        ]
    }
}

/// Analog Value object
#[derive(Debug, Clone)]
pub struct AnalogValue {
    /// Object identifier
    pub identifier: ObjectIdentifier,
    /// Object name
    pub object_name: String,
    /// Present value
    pub present_value: f64,
    /// Description
    pub description: String,
    /// Status flags
    pub status_flags: StatusFlags,
    /// Event state
    pub event_state: EventState,
    /// Out of service
    pub out_of_service: bool,
    /// Engineering units
    pub units: EngineeringUnits,
    /// COV increment
    pub cov_increment: f64,
}

impl AnalogValue {
    /// Build a live object from its database row
    pub fn from_row(row: &AnalogValueRow) -> Result<Self> {
        let common = parse_common(
            &row.object_name,
            row.description.as_deref(),
            &row.status_flags,
            &row.event_state,
            row.out_of_service,
            false,
        )?;
        Ok(Self {
            identifier: ObjectIdentifier::new(ObjectType::AnalogValue, row.object_identifier),
            object_name: common.object_name,
            present_value: row.present_value,
            description: common.description,
            status_flags: common.status_flags,
            event_state: common.event_state,
            out_of_service: common.out_of_service,
            units: EngineeringUnits::parse(&row.units)?,
            cov_increment: parse_cov_increment(row.cov_increment)?,
        })
    }

    /// Refresh every mapped property from the row; see
    /// [`AnalogInput::apply_row`] for the out-of-service rule
    pub fn apply_row(&mut self, row: &AnalogValueRow) -> Result<Option<CovEvent>> {
        let common = parse_common(
            &row.object_name,
            row.description.as_deref(),
            &row.status_flags,
            &row.event_state,
            row.out_of_service,
            false,
        )?;
        let units = EngineeringUnits::parse(&row.units)?;
        let cov_increment = parse_cov_increment(row.cov_increment)?;

        let changed = (!self.out_of_service && self.present_value != row.present_value)
            || self.status_flags != common.status_flags;

        if !self.out_of_service {
            self.present_value = row.present_value;
        }
        self.object_name = common.object_name;
        self.description = common.description;
        self.status_flags = common.status_flags;
        self.event_state = common.event_state;
        self.out_of_service = common.out_of_service;
        self.units = units;
        self.cov_increment = cov_increment;

        Ok(changed.then_some(CovEvent { object: self.identifier }))
    }

    pub fn read_property(&self, property: PropertyIdentifier) -> Result<PropertyValue> {
        match property {
            PropertyIdentifier::ObjectIdentifier => {
                Ok(PropertyValue::ObjectIdentifier(self.identifier))
            }
            PropertyIdentifier::ObjectName => {
                Ok(PropertyValue::CharacterString(self.object_name.clone()))
            }
            PropertyIdentifier::ObjectType => {
                Ok(PropertyValue::Enumerated(ObjectType::AnalogValue as u32))
            }
            PropertyIdentifier::PresentValue => Ok(PropertyValue::Real(self.present_value as f32)),
            PropertyIdentifier::Description => {
                Ok(PropertyValue::CharacterString(self.description.clone()))
            }
            PropertyIdentifier::StatusFlags => {
                Ok(PropertyValue::BitString(self.status_flags.bits().to_vec()))
            }
            PropertyIdentifier::EventState => Ok(PropertyValue::Enumerated(self.event_state as u32)),
            PropertyIdentifier::OutOfService => Ok(PropertyValue::Boolean(self.out_of_service)),
            PropertyIdentifier::Units => Ok(PropertyValue::Enumerated(self.units as u32)),
            PropertyIdentifier::CovIncrement => {
                Ok(PropertyValue::Real(self.cov_increment as f32))
            }
            _ => Err(ObjectError::UnknownProperty),
        }
    }

    pub fn write_property(
        &mut self,
        property: PropertyIdentifier,
        value: PropertyValue,
    ) -> Result<Option<CovEvent>> {
        match property {
            PropertyIdentifier::PresentValue => {
                if !self.out_of_service {
                    return Err(ObjectError::PropertyNotWritable);
                }
                self.present_value = present_value_from_write(value)?;
                Ok(Some(CovEvent { object: self.identifier }))
            }
            PropertyIdentifier::OutOfService => {
                if let PropertyValue::Boolean(oos) = value {
                    self.out_of_service = oos;
                    self.status_flags.out_of_service = oos;
                    Ok(Some(CovEvent { object: self.identifier }))
                } else {
                    Err(ObjectError::InvalidPropertyType)
                }
            }
            _ => Err(ObjectError::PropertyNotWritable),
        }
    }

    pub fn property_list(&self) -> Vec<PropertyIdentifier> {
        vec![
            PropertyIdentifier::ObjectIdentifier,
            PropertyIdentifier::ObjectName,
            PropertyIdentifier::ObjectType,
            PropertyIdentifier::PresentValue,
            PropertyIdentifier::Description,
            PropertyIdentifier::StatusFlags,
            PropertyIdentifier::EventState,
            PropertyIdentifier::OutOfService,
            PropertyIdentifier::Units,
            PropertyIdentifier::CovIncrement,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input_row() -> AnalogInputRow {
        AnalogInputRow {
            id: 1,
            object_identifier: 1001,
            object_name: "T1".to_string(),
            present_value: 25.5,
            description: Some("Space temperature".to_string()),
            status_flags: "0000".to_string(),
            event_state: "normal".to_string(),
            out_of_service: false,
            units: "degreesCelsius".to_string(),
            cov_increment: 0.1,
        }
    }

    fn output_row() -> AnalogOutputRow {
        AnalogOutputRow {
            id: 1,
            object_identifier: 2001,
            object_name: "DMP1".to_string(),
            present_value: 0.0,
            description: None,
            status_flags: "0000".to_string(),
            event_state: "normal".to_string(),
            out_of_service: false,
            units: "percent".to_string(),
            relinquish_default: 0.0,
            current_command_priority: Some(8),
            cov_increment: 1.0,
        }
    }

    #[test]
    fn test_input_from_row() {
        let ai = AnalogInput::from_row(&input_row()).unwrap();
        assert_eq!(ai.identifier.instance, 1001);
        assert_eq!(ai.present_value, 25.5);
        assert_eq!(ai.units, EngineeringUnits::DegreesCelsius);
        assert_eq!(
            ai.read_property(PropertyIdentifier::PresentValue).unwrap(),
            PropertyValue::Real(25.5)
        );
    }

    #[test]
    fn test_input_refresh_tracks_database() {
        let mut ai = AnalogInput::from_row(&input_row()).unwrap();
        let mut row = input_row();
        row.present_value = 25.8;
        let event = ai.apply_row(&row).unwrap();
        assert_eq!(ai.present_value, 25.8);
        assert!(event.is_some());
    }

    #[test]
    fn test_input_rejects_direct_write_in_service() {
        let mut ai = AnalogInput::from_row(&input_row()).unwrap();
        let err = ai
            .write_property(PropertyIdentifier::PresentValue, PropertyValue::Real(1.0))
            .unwrap_err();
        assert_eq!(err, ObjectError::PropertyNotWritable);
    }

    #[test]
    fn test_out_of_service_suspends_refresh_of_present_value() {
        let mut ai = AnalogInput::from_row(&input_row()).unwrap();
        ai.write_property(PropertyIdentifier::OutOfService, PropertyValue::Boolean(true))
            .unwrap();
        ai.write_property(PropertyIdentifier::PresentValue, PropertyValue::Real(99.0))
            .unwrap();

        let mut row = input_row();
        row.present_value = 11.0;
        row.status_flags = "0001".to_string();
        row.out_of_service = true;
        ai.apply_row(&row).unwrap();
        assert_eq!(ai.present_value, 99.0);
    }

    #[test]
    fn test_output_refresh_keeps_commanded_value() {
        let mut ao = AnalogOutput::from_row(&output_row()).unwrap();
        ao.write_property(PropertyIdentifier::PresentValue, PropertyValue::Real(42.0))
            .unwrap();

        // Database still holds the stale value; refresh must not win
        let row = output_row();
        ao.apply_row(&row).unwrap();
        assert_eq!(ao.present_value, 42.0);
        assert_eq!(
            ao.read_property(PropertyIdentifier::PresentValue).unwrap(),
            PropertyValue::Real(42.0)
        );
    }

    #[test]
    fn test_malformed_row_leaves_object_untouched() {
        let mut ai = AnalogInput::from_row(&input_row()).unwrap();
        let mut row = input_row();
        row.present_value = 70.0;
        row.status_flags = "012".to_string();
        assert!(ai.apply_row(&row).is_err());
        assert_eq!(ai.present_value, 25.5);
        assert_eq!(ai.status_flags, StatusFlags::default());
    }

    #[test]
    fn test_negative_cov_increment_rejected() {
        let mut row = input_row();
        row.cov_increment = -0.5;
        assert!(AnalogInput::from_row(&row).is_err());
    }
}
