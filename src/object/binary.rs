//! Binary Object Types Implementation
//!
//! Binary Input, Binary Output and Binary Value objects as defined in
//! ASHRAE 135. The present value is the two-state `active`/`inactive`
//! enumeration, stored in the database under those names.

use crate::db::rows::{BinaryInputRow, BinaryOutputRow, BinaryValueRow};
use crate::object::{
    parse_common, CovEvent, EventState, ObjectError, ObjectIdentifier, ObjectType,
    PropertyIdentifier, PropertyValue, Result, StatusFlags,
};

/// The two-state present value of binary objects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum BinaryPv {
    Inactive = 0,
    Active = 1,
}

impl BinaryPv {
    /// Parse the database name
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "inactive" => Ok(BinaryPv::Inactive),
            "active" => Ok(BinaryPv::Active),
            _ => Err(ObjectError::InvalidValue(format!("unknown binary value: {:?}", name))),
        }
    }

    /// Render the database name
    pub fn as_db_str(&self) -> &'static str {
        match self {
            BinaryPv::Inactive => "inactive",
            BinaryPv::Active => "active",
        }
    }

    fn from_write(value: PropertyValue) -> Result<Self> {
        match value {
            PropertyValue::Enumerated(0) => Ok(BinaryPv::Inactive),
            PropertyValue::Enumerated(1) => Ok(BinaryPv::Active),
            PropertyValue::Enumerated(other) => Err(ObjectError::InvalidValue(format!(
                "binary present value must be 0 or 1, got {}",
                other
            ))),
            _ => Err(ObjectError::InvalidPropertyType),
        }
    }
}

/// Physical polarity of binary inputs and outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Polarity {
    Normal = 0,
    Reverse = 1,
}

impl Polarity {
    /// Parse the database name
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "normal" => Ok(Polarity::Normal),
            "reverse" => Ok(Polarity::Reverse),
            _ => Err(ObjectError::InvalidValue(format!("unknown polarity: {:?}", name))),
        }
    }
}

/// Binary Input object
#[derive(Debug, Clone)]
pub struct BinaryInput {
    /// Object identifier
    pub identifier: ObjectIdentifier,
    /// Object name
    pub object_name: String,
    /// Present value
    pub present_value: BinaryPv,
    /// Description
    pub description: String,
    /// Status flags
    pub status_flags: StatusFlags,
    /// Event state (normal/fault/offnormal only)
    pub event_state: EventState,
    /// Out of service
    pub out_of_service: bool,
    /// Polarity
    pub polarity: Polarity,
}

impl BinaryInput {
    /// Build a live object from its database row
    pub fn from_row(row: &BinaryInputRow) -> Result<Self> {
        let common = parse_common(
            &row.object_name,
            row.description.as_deref(),
            &row.status_flags,
            &row.event_state,
            row.out_of_service,
            true,
        )?;
        Ok(Self {
            identifier: ObjectIdentifier::new(ObjectType::BinaryInput, row.object_identifier),
            object_name: common.object_name,
            present_value: BinaryPv::parse(&row.present_value)?,
            description: common.description,
            status_flags: common.status_flags,
            event_state: common.event_state,
            out_of_service: common.out_of_service,
            polarity: Polarity::parse(&row.polarity)?,
        })
    }

    /// Refresh from the row; the present value is kept while out of service
    pub fn apply_row(&mut self, row: &BinaryInputRow) -> Result<Option<CovEvent>> {
        let common = parse_common(
            &row.object_name,
            row.description.as_deref(),
            &row.status_flags,
            &row.event_state,
            row.out_of_service,
            true,
        )?;
        let present_value = BinaryPv::parse(&row.present_value)?;
        let polarity = Polarity::parse(&row.polarity)?;

        let changed = (!self.out_of_service && self.present_value != present_value)
            || self.status_flags != common.status_flags;

        if !self.out_of_service {
            self.present_value = present_value;
        }
        self.object_name = common.object_name;
        self.description = common.description;
        self.status_flags = common.status_flags;
        self.event_state = common.event_state;
        self.out_of_service = common.out_of_service;
        self.polarity = polarity;

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
                Ok(PropertyValue::Enumerated(ObjectType::BinaryInput as u32))
            }
            PropertyIdentifier::PresentValue => {
                Ok(PropertyValue::Enumerated(self.present_value as u32))
            }
            PropertyIdentifier::Description => {
                Ok(PropertyValue::CharacterString(self.description.clone()))
            }
            PropertyIdentifier::StatusFlags => {
                Ok(PropertyValue::BitString(self.status_flags.bits().to_vec()))
            }
            PropertyIdentifier::EventState => Ok(PropertyValue::Enumerated(self.event_state as u32)),
            PropertyIdentifier::OutOfService => Ok(PropertyValue::Boolean(self.out_of_service)),
            PropertyIdentifier::Polarity => Ok(PropertyValue::Enumerated(self.polarity as u32)),
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
                self.present_value = BinaryPv::from_write(value)?;
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
            PropertyIdentifier::Polarity,
        ]
    }
}

/// Binary Output object
///
/// The commanded present value is authoritative in memory; refresh never
/// touches it.
#[derive(Debug, Clone)]
pub struct BinaryOutput {
    /// Object identifier
    pub identifier: ObjectIdentifier,
    /// Object name
    pub object_name: String,
    /// Present value (commanded)
    pub present_value: BinaryPv,
    /// Description
    pub description: String,
    /// Status flags
    pub status_flags: StatusFlags,
    /// Event state (normal/fault/offnormal only)
    pub event_state: EventState,
    /// Out of service
    pub out_of_service: bool,
    /// Polarity
    pub polarity: Polarity,
    /// Relinquish default
    pub relinquish_default: BinaryPv,
}

impl BinaryOutput {
    /// Build a live object from its database row
    pub fn from_row(row: &BinaryOutputRow) -> Result<Self> {
        let common = parse_common(
            &row.object_name,
            row.description.as_deref(),
            &row.status_flags,
            &row.event_state,
            row.out_of_service,
            true,
        )?;
        crate::db::rows::validate_command_priority(row.current_command_priority)?;
        Ok(Self {
            identifier: ObjectIdentifier::new(ObjectType::BinaryOutput, row.object_identifier),
            object_name: common.object_name,
            present_value: BinaryPv::parse(&row.present_value)?,
            description: common.description,
            status_flags: common.status_flags,
            event_state: common.event_state,
            out_of_service: common.out_of_service,
            polarity: Polarity::parse(&row.polarity)?,
            relinquish_default: BinaryPv::parse(&row.relinquish_default)?,
        })
    }

    /// Refresh from the row, keeping the commanded present value
    pub fn apply_row(&mut self, row: &BinaryOutputRow) -> Result<Option<CovEvent>> {
        let common = parse_common(
            &row.object_name,
            row.description.as_deref(),
            &row.status_flags,
            &row.event_state,
            row.out_of_service,
            true,
        )?;
        let polarity = Polarity::parse(&row.polarity)?;
        let relinquish_default = BinaryPv::parse(&row.relinquish_default)?;
        crate::db::rows::validate_command_priority(row.current_command_priority)?;

        let changed = self.status_flags != common.status_flags;

        self.object_name = common.object_name;
        self.description = common.description;
        self.status_flags = common.status_flags;
        self.event_state = common.event_state;
        self.out_of_service = common.out_of_service;
        self.polarity = polarity;
        self.relinquish_default = relinquish_default;

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
                Ok(PropertyValue::Enumerated(ObjectType::BinaryOutput as u32))
            }
            PropertyIdentifier::PresentValue => {
                Ok(PropertyValue::Enumerated(self.present_value as u32))
            }
            PropertyIdentifier::Description => {
                Ok(PropertyValue::CharacterString(self.description.clone()))
            }
            PropertyIdentifier::StatusFlags => {
                Ok(PropertyValue::BitString(self.status_flags.bits().to_vec()))
            }
            PropertyIdentifier::EventState => Ok(PropertyValue::Enumerated(self.event_state as u32)),
            PropertyIdentifier::OutOfService => Ok(PropertyValue::Boolean(self.out_of_service)),
            PropertyIdentifier::Polarity => Ok(PropertyValue::Enumerated(self.polarity as u32)),
            PropertyIdentifier::RelinquishDefault => {
                Ok(PropertyValue::Enumerated(self.relinquish_default as u32))
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
                self.present_value = BinaryPv::from_write(value)?;
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
            PropertyIdentifier::Polarity,
            PropertyIdentifier::RelinquishDefault,
        ]
    }
}

/// Binary Value object
#[derive(Debug, Clone)]
pub struct BinaryValue {
    /// Object identifier
    pub identifier: ObjectIdentifier,
    /// Object name
    pub object_name: String,
    /// Present value
    pub present_value: BinaryPv,
    /// Description
    pub description: String,
    /// Status flags
    pub status_flags: StatusFlags,
    /// Event state (normal/fault/offnormal only)
    pub event_state: EventState,
    /// Out of service
    pub out_of_service: bool,
}

impl BinaryValue {
    /// Build a live object from its database row
    pub fn from_row(row: &BinaryValueRow) -> Result<Self> {
        let common = parse_common(
            &row.object_name,
            row.description.as_deref(),
            &row.status_flags,
            &row.event_state,
            row.out_of_service,
            true,
        )?;
        Ok(Self {
            identifier: ObjectIdentifier::new(ObjectType::BinaryValue, row.object_identifier),
            object_name: common.object_name,
            present_value: BinaryPv::parse(&row.present_value)?,
            description: common.description,
            status_flags: common.status_flags,
            event_state: common.event_state,
            out_of_service: common.out_of_service,
        })
    }

    /// Refresh from the row; the present value is kept while out of service
    pub fn apply_row(&mut self, row: &BinaryValueRow) -> Result<Option<CovEvent>> {
        let common = parse_common(
            &row.object_name,
            row.description.as_deref(),
            &row.status_flags,
            &row.event_state,
            row.out_of_service,
            true,
        )?;
        let present_value = BinaryPv::parse(&row.present_value)?;

        let changed = (!self.out_of_service && self.present_value != present_value)
            || self.status_flags != common.status_flags;

        if !self.out_of_service {
            self.present_value = present_value;
        }
        self.object_name = common.object_name;
        self.description = common.description;
        self.status_flags = common.status_flags;
        self.event_state = common.event_state;
        self.out_of_service = common.out_of_service;

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
                Ok(PropertyValue::Enumerated(ObjectType::BinaryValue as u32))
            }
            PropertyIdentifier::PresentValue => {
                Ok(PropertyValue::Enumerated(self.present_value as u32))
            }
            PropertyIdentifier::Description => {
                Ok(PropertyValue::CharacterString(self.description.clone()))
            }
            PropertyIdentifier::StatusFlags => {
                Ok(PropertyValue::BitString(self.status_flags.bits().to_vec()))
            }
            PropertyIdentifier::EventState => Ok(PropertyValue::Enumerated(self.event_state as u32)),
            PropertyIdentifier::OutOfService => Ok(PropertyValue::Boolean(self.out_of_service)),
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
                self.present_value = BinaryPv::from_write(value)?;
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
        ]
    }
}
