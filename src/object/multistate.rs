//! Multi-state Object Types Implementation
//!
//! Multi-state Input, Output and Value objects as defined in ASHRAE 135.
//! The present value is a 1-based state index bounded by `number_of_states`;
//! state labels are persisted as one `;`-separated column and split on load.

use crate::db::rows::{MultiStateInputRow, MultiStateOutputRow, MultiStateValueRow};
use crate::object::{
    parse_common, CommonProps, CovEvent, EventState, ObjectError, ObjectIdentifier, ObjectType,
    PropertyIdentifier, PropertyValue, Result, StatusFlags,
};

/// The validated multi-state specific property block
#[derive(Debug, Clone)]
struct StateProps {
    present_value: u32,
    number_of_states: u32,
    state_text: Option<Vec<String>>,
}

/// Validate present value, state count and labels together (invariant: the
/// present value is in 1..=number_of_states and the label list, if present,
/// has exactly number_of_states entries)
fn parse_states(
    present_value: u32,
    number_of_states: u32,
    state_text: Option<&str>,
) -> Result<StateProps> {
    if !(1..=255).contains(&number_of_states) {
        return Err(ObjectError::InvalidValue(format!(
            "number_of_states must be 1..=255, got {}",
            number_of_states
        )));
    }
    if present_value < 1 || present_value > number_of_states {
        return Err(ObjectError::InvalidValue(format!(
            "present_value {} outside 1..={}",
            present_value, number_of_states
        )));
    }
    let state_text = match state_text {
        Some(text) if !text.is_empty() => {
            let labels: Vec<String> = text.split(';').map(str::to_string).collect();
            if labels.len() != number_of_states as usize {
                return Err(ObjectError::InvalidValue(format!(
                    "state_text has {} labels for {} states",
                    labels.len(),
                    number_of_states
                )));
            }
            Some(labels)
        }
        _ => None,
    };
    Ok(StateProps {
        present_value,
        number_of_states,
        state_text,
    })
}

fn state_from_write(value: PropertyValue, number_of_states: u32) -> Result<u32> {
    let state = match value {
        PropertyValue::Unsigned(v) => v,
        PropertyValue::Enumerated(v) => v,
        _ => return Err(ObjectError::InvalidPropertyType),
    };
    if state < 1 || state > number_of_states {
        return Err(ObjectError::InvalidValue(format!(
            "state {} outside 1..={}",
            state, number_of_states
        )));
    }
    Ok(state)
}

fn read_state_property(
    identifier: ObjectIdentifier,
    object_name: &str,
    description: &str,
    status_flags: StatusFlags,
    event_state: EventState,
    out_of_service: bool,
    present_value: u32,
    number_of_states: u32,
    state_text: Option<&[String]>,
    property: PropertyIdentifier,
) -> Result<PropertyValue> {
    match property {
        PropertyIdentifier::ObjectIdentifier => Ok(PropertyValue::ObjectIdentifier(identifier)),
        PropertyIdentifier::ObjectName => {
            Ok(PropertyValue::CharacterString(object_name.to_string()))
        }
        PropertyIdentifier::ObjectType => {
            Ok(PropertyValue::Enumerated(identifier.object_type as u32))
        }
        PropertyIdentifier::PresentValue => Ok(PropertyValue::Unsigned(present_value)),
        PropertyIdentifier::Description => {
            Ok(PropertyValue::CharacterString(description.to_string()))
        }
        PropertyIdentifier::StatusFlags => Ok(PropertyValue::BitString(status_flags.bits().to_vec())),
        PropertyIdentifier::EventState => Ok(PropertyValue::Enumerated(event_state as u32)),
        PropertyIdentifier::OutOfService => Ok(PropertyValue::Boolean(out_of_service)),
        PropertyIdentifier::NumberOfStates => Ok(PropertyValue::Unsigned(number_of_states)),
        PropertyIdentifier::StateText => match state_text {
            Some(labels) => Ok(PropertyValue::Array(
                labels
                    .iter()
                    .map(|label| PropertyValue::CharacterString(label.clone()))
                    .collect(),
            )),
            None => Err(ObjectError::UnknownProperty),
        },
        _ => Err(ObjectError::UnknownProperty),
    }
}

/// Multi-state Input object
#[derive(Debug, Clone)]
pub struct MultiStateInput {
    /// Object identifier
    pub identifier: ObjectIdentifier,
    /// Object name
    pub object_name: String,
    /// Present value (1-based state index)
    pub present_value: u32,
    /// Description
    pub description: String,
    /// Status flags
    pub status_flags: StatusFlags,
    /// Event state (normal/fault/offnormal only)
    pub event_state: EventState,
    /// Out of service
    pub out_of_service: bool,
    /// Number of states
    pub number_of_states: u32,
    /// State labels
    pub state_text: Option<Vec<String>>,
}

impl MultiStateInput {
    /// Build a live object from its database row
    pub fn from_row(row: &MultiStateInputRow) -> Result<Self> {
        let common = common_of(row.object_name.as_str(), row)?;
        let states = parse_states(
            row.present_value,
            row.number_of_states as u32,
            row.state_text.as_deref(),
        )?;
        Ok(Self {
            identifier: ObjectIdentifier::new(ObjectType::MultiStateInput, row.object_identifier),
            object_name: common.object_name,
            present_value: states.present_value,
            description: common.description,
            status_flags: common.status_flags,
            event_state: common.event_state,
            out_of_service: common.out_of_service,
            number_of_states: states.number_of_states,
            state_text: states.state_text,
        })
    }

    /// Refresh from the row; the present value is kept while out of service
    pub fn apply_row(&mut self, row: &MultiStateInputRow) -> Result<Option<CovEvent>> {
        let common = common_of(row.object_name.as_str(), row)?;
        let states = parse_states(
            row.present_value,
            row.number_of_states as u32,
            row.state_text.as_deref(),
        )?;

        let changed = (!self.out_of_service && self.present_value != states.present_value)
            || self.status_flags != common.status_flags;

        if !self.out_of_service {
            self.present_value = states.present_value;
        }
        self.object_name = common.object_name;
        self.description = common.description;
        self.status_flags = common.status_flags;
        self.event_state = common.event_state;
        self.out_of_service = common.out_of_service;
        self.number_of_states = states.number_of_states;
        self.state_text = states.state_text;

        Ok(changed.then_some(CovEvent { object: self.identifier }))
    }

    pub fn read_property(&self, property: PropertyIdentifier) -> Result<PropertyValue> {
        read_state_property(
            self.identifier,
            &self.object_name,
            &self.description,
            self.status_flags,
            self.event_state,
            self.out_of_service,
            self.present_value,
            self.number_of_states,
            self.state_text.as_deref(),
            property,
        )
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
                self.present_value = state_from_write(value, self.number_of_states)?;
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
        let mut list = vec![
            PropertyIdentifier::ObjectIdentifier,
            PropertyIdentifier::ObjectName,
            PropertyIdentifier::ObjectType,
            PropertyIdentifier::PresentValue,
            PropertyIdentifier::Description,
            PropertyIdentifier::StatusFlags,
            PropertyIdentifier::EventState,
            PropertyIdentifier::OutOfService,
            PropertyIdentifier::NumberOfStates,
        ];
        if self.state_text.is_some() {
            list.push(PropertyIdentifier::StateText);
        }
        list
    }
}

/// Multi-state Output object
///
/// The commanded present value is authoritative in memory; refresh never
/// touches it. The bounds check still runs against the refreshed
/// `number_of_states`.
#[derive(Debug, Clone)]
pub struct MultiStateOutput {
    /// Object identifier
    pub identifier: ObjectIdentifier,
    /// Object name
    pub object_name: String,
    /// Present value (commanded, 1-based state index)
    pub present_value: u32,
    /// Description
    pub description: String,
    /// Status flags
    pub status_flags: StatusFlags,
    /// Event state (normal/fault/offnormal only)
    pub event_state: EventState,
    /// Out of service
    pub out_of_service: bool,
    /// Number of states
    pub number_of_states: u32,
    /// State labels
    pub state_text: Option<Vec<String>>,
    /// Relinquish default (1-based state index)
    pub relinquish_default: u32,
}

impl MultiStateOutput {
    /// Build a live object from its database row
    pub fn from_row(row: &MultiStateOutputRow) -> Result<Self> {
        let common = common_of(row.object_name.as_str(), row)?;
        let states = parse_states(
            row.present_value,
            row.number_of_states as u32,
            row.state_text.as_deref(),
        )?;
        if row.relinquish_default < 1 {
            return Err(ObjectError::InvalidValue(format!(
                "relinquish_default must be >= 1, got {}",
                row.relinquish_default
            )));
        }
        crate::db::rows::validate_command_priority(row.current_command_priority)?;
        Ok(Self {
            identifier: ObjectIdentifier::new(ObjectType::MultiStateOutput, row.object_identifier),
            object_name: common.object_name,
            present_value: states.present_value,
            description: common.description,
            status_flags: common.status_flags,
            event_state: common.event_state,
            out_of_service: common.out_of_service,
            number_of_states: states.number_of_states,
            state_text: states.state_text,
            relinquish_default: row.relinquish_default,
        })
    }

    /// Refresh from the row, keeping the commanded present value
    pub fn apply_row(&mut self, row: &MultiStateOutputRow) -> Result<Option<CovEvent>> {
        let common = common_of(row.object_name.as_str(), row)?;
        // Validate the row's own present value against its state count even
        // though the commanded value is kept
        let states = parse_states(
            row.present_value,
            row.number_of_states as u32,
            row.state_text.as_deref(),
        )?;
        if row.relinquish_default < 1 {
            return Err(ObjectError::InvalidValue(format!(
                "relinquish_default must be >= 1, got {}",
                row.relinquish_default
            )));
        }
        crate::db::rows::validate_command_priority(row.current_command_priority)?;

        let changed = self.status_flags != common.status_flags;

        self.object_name = common.object_name;
        self.description = common.description;
        self.status_flags = common.status_flags;
        self.event_state = common.event_state;
        self.out_of_service = common.out_of_service;
        self.number_of_states = states.number_of_states;
        self.state_text = states.state_text;
        self.relinquish_default = row.relinquish_default;

        Ok(changed.then_some(CovEvent { object: self.identifier }))
    }

    pub fn read_property(&self, property: PropertyIdentifier) -> Result<PropertyValue> {
        match property {
            PropertyIdentifier::RelinquishDefault => {
                Ok(PropertyValue::Unsigned(self.relinquish_default))
            }
            _ => read_state_property(
                self.identifier,
                &self.object_name,
                &self.description,
                self.status_flags,
                self.event_state,
                self.out_of_service,
                self.present_value,
                self.number_of_states,
                self.state_text.as_deref(),
                property,
            ),
        }
    }

    pub fn write_property(
        &mut self,
        property: PropertyIdentifier,
        value: PropertyValue,
    ) -> Result<Option<CovEvent>> {
        match property {
            PropertyIdentifier::PresentValue => {
                self.present_value = state_from_write(value, self.number_of_states)?;
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
        let mut list = vec![
            PropertyIdentifier::ObjectIdentifier,
            PropertyIdentifier::ObjectName,
            PropertyIdentifier::ObjectType,
            PropertyIdentifier::PresentValue,
            PropertyIdentifier::Description,
            PropertyIdentifier::StatusFlags,
            PropertyIdentifier::EventState,
            PropertyIdentifier::OutOfService,
            PropertyIdentifier::NumberOfStates,
            PropertyIdentifier::RelinquishDefault,
        ];
        if self.state_text.is_some() {
            list.push(PropertyIdentifier::StateText);
        }
        list
    }
}

/// Multi-state Value object
#[derive(Debug, Clone)]
pub struct MultiStateValue {
    /// Object identifier
    pub identifier: ObjectIdentifier,
    /// Object name
    pub object_name: String,
    /// Present value (1-based state index)
    pub present_value: u32,
    /// Description
    pub description: String,
    /// Status flags
    pub status_flags: StatusFlags,
    /// Event state (normal/fault/offnormal only)
    pub event_state: EventState,
    /// Out of service
    pub out_of_service: bool,
    /// Number of states
    pub number_of_states: u32,
    /// State labels
    pub state_text: Option<Vec<String>>,
}

impl MultiStateValue {
    /// Build a live object from its database row
    pub fn from_row(row: &MultiStateValueRow) -> Result<Self> {
        let common = common_of(row.object_name.as_str(), row)?;
        let states = parse_states(
            row.present_value,
            row.number_of_states as u32,
            row.state_text.as_deref(),
        )?;
        Ok(Self {
            identifier: ObjectIdentifier::new(ObjectType::MultiStateValue, row.object_identifier),
            object_name: common.object_name,
            present_value: states.present_value,
            description: common.description,
            status_flags: common.status_flags,
            event_state: common.event_state,
            out_of_service: common.out_of_service,
            number_of_states: states.number_of_states,
            state_text: states.state_text,
        })
    }

    /// Refresh from the row; the present value is kept while out of service
    pub fn apply_row(&mut self, row: &MultiStateValueRow) -> Result<Option<CovEvent>> {
        let common = common_of(row.object_name.as_str(), row)?;
        let states = parse_states(
            row.present_value,
            row.number_of_states as u32,
            row.state_text.as_deref(),
        )?;

        let changed = (!self.out_of_service && self.present_value != states.present_value)
            || self.status_flags != common.status_flags;

        if !self.out_of_service {
            self.present_value = states.present_value;
        }
        self.object_name = common.object_name;
        self.description = common.description;
        self.status_flags = common.status_flags;
        self.event_state = common.event_state;
        self.out_of_service = common.out_of_service;
        self.number_of_states = states.number_of_states;
        self.state_text = states.state_text;

        Ok(changed.then_some(CovEvent { object: self.identifier }))
    }

    pub fn read_property(&self, property: PropertyIdentifier) -> Result<PropertyValue> {
        read_state_property(
            self.identifier,
            &self.object_name,
            &self.description,
            self.status_flags,
            self.event_state,
            self.out_of_service,
            self.present_value,
            self.number_of_states,
            self.state_text.as_deref(),
            property,
        )
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
                self.present_value = state_from_write(value, self.number_of_states)?;
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
        let mut list = vec![
            PropertyIdentifier::ObjectIdentifier,
            PropertyIdentifier::ObjectName,
            PropertyIdentifier::ObjectType,
            PropertyIdentifier::PresentValue,
            PropertyIdentifier::Description,
            PropertyIdentifier::StatusFlags,
            PropertyIdentifier::EventState,
            PropertyIdentifier::OutOfService,
            PropertyIdentifier::NumberOfStates,
        ];
        if self.state_text.is_some() {
            list.push(PropertyIdentifier::StateText);
        }
        list
    }
}

/// Shared common-column parsing for the three multi-state row shapes
trait MultiStateRow {
    fn description(&self) -> Option<&str>;
    fn status_flags(&self) -> &str;
    fn event_state(&self) -> &str;
    fn out_of_service(&self) -> bool;
}

macro_rules! impl_multi_state_row {
    ($row:ty) => {
        impl MultiStateRow for $row {
            fn description(&self) -> Option<&str> {
                self.description.as_deref()
            }
            fn status_flags(&self) -> &str {
                &self.status_flags
            }
            fn event_state(&self) -> &str {
                &self.event_state
            }
            fn out_of_service(&self) -> bool {
                self.out_of_service
            }
        }
    };
}

impl_multi_state_row!(MultiStateInputRow);
impl_multi_state_row!(MultiStateOutputRow);
impl_multi_state_row!(MultiStateValueRow);

fn common_of<R: MultiStateRow>(object_name: &str, row: &R) -> Result<CommonProps> {
    parse_common(
        object_name,
        row.description(),
        row.status_flags(),
        row.event_state(),
        row.out_of_service(),
        true,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output_row() -> MultiStateOutputRow {
        MultiStateOutputRow {
            id: 3,
            object_identifier: 6001,
            object_name: "AHU mode".to_string(),
            present_value: 1,
            description: Some("Air handler operating mode".to_string()),
            status_flags: "0000".to_string(),
            event_state: "normal".to_string(),
            out_of_service: false,
            number_of_states: 3,
            state_text: Some("Off;Low;High".to_string()),
            relinquish_default: 1,
            current_command_priority: None,
        }
    }

    #[test]
    fn test_state_text_split() {
        let mso = MultiStateOutput::from_row(&output_row()).unwrap();
        assert_eq!(
            mso.state_text,
            Some(vec!["Off".to_string(), "Low".to_string(), "High".to_string()])
        );
        assert_eq!(mso.number_of_states, 3);
    }

    #[test]
    fn test_state_text_length_mismatch_rejected() {
        let mut row = output_row();
        row.state_text = Some("Off;On".to_string());
        assert!(MultiStateOutput::from_row(&row).is_err());
    }

    #[test]
    fn test_write_bounds() {
        let mut mso = MultiStateOutput::from_row(&output_row()).unwrap();

        let err = mso
            .write_property(PropertyIdentifier::PresentValue, PropertyValue::Unsigned(0))
            .unwrap_err();
        assert!(matches!(err, ObjectError::InvalidValue(_)));

        let err = mso
            .write_property(PropertyIdentifier::PresentValue, PropertyValue::Unsigned(4))
            .unwrap_err();
        assert!(matches!(err, ObjectError::InvalidValue(_)));
        assert_eq!(mso.present_value, 1);

        mso.write_property(PropertyIdentifier::PresentValue, PropertyValue::Unsigned(3))
            .unwrap();
        assert_eq!(mso.present_value, 3);
    }

    #[test]
    fn test_output_refresh_keeps_commanded_state() {
        let mut mso = MultiStateOutput::from_row(&output_row()).unwrap();
        mso.write_property(PropertyIdentifier::PresentValue, PropertyValue::Unsigned(2))
            .unwrap();
        mso.apply_row(&output_row()).unwrap();
        assert_eq!(mso.present_value, 2);
    }

    #[test]
    fn test_row_present_value_out_of_bounds_rejected() {
        let mut row = output_row();
        row.present_value = 9;
        assert!(MultiStateOutput::from_row(&row).is_err());
    }

    #[test]
    fn test_state_text_read_as_array() {
        let msv = MultiStateValue::from_row(&MultiStateValueRow {
            id: 1,
            object_identifier: 7001,
            object_name: "Season".to_string(),
            present_value: 2,
            description: None,
            status_flags: "0000".to_string(),
            event_state: "normal".to_string(),
            out_of_service: false,
            number_of_states: 2,
            state_text: Some("Heating;Cooling".to_string()),
        })
        .unwrap();

        match msv.read_property(PropertyIdentifier::StateText).unwrap() {
            PropertyValue::Array(labels) => assert_eq!(labels.len(), 2),
            other => panic!("expected array, got {:?}", other),
        }
    }
}
