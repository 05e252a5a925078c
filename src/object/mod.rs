//! BACnet Object Model
//!
//! This module defines the object types the server exposes and their property
//! model according to ASHRAE 135. Objects are the fundamental modeling concept
//! in BACnet, representing physical inputs, outputs and control values.
//!
//! The server hosts exactly ten object kinds: the nine database-backed
//! input/output/value types (analog, binary, multi-state) and one Device
//! object built from the identity file. Objects are constructed once at
//! bootstrap from a database snapshot and live until process exit; the
//! periodic refresh and persistence passes keep them synchronized with the
//! database afterwards.
//!
//! Authority over `present_value` is split: for output objects the live
//! object is authoritative and the database copy is a persisted reflection,
//! for everything else the database is authoritative and the live object is
//! a cache.

use thiserror::Error;

/// Result type for object operations
pub type Result<T> = std::result::Result<T, ObjectError>;

/// Errors that can occur with object operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ObjectError {
    /// Object not found
    #[error("object not found")]
    NotFound,
    /// Unknown property
    #[error("unknown property")]
    UnknownProperty,
    /// Property not writable
    #[error("property not writable")]
    PropertyNotWritable,
    /// Invalid property type
    #[error("invalid property type")]
    InvalidPropertyType,
    /// Invalid property value
    #[error("invalid value: {0}")]
    InvalidValue(String),
    /// Invalid object configuration
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// BACnet object types hosted by this server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ObjectType {
    AnalogInput = 0,
    AnalogOutput = 1,
    AnalogValue = 2,
    BinaryInput = 3,
    BinaryOutput = 4,
    BinaryValue = 5,
    Device = 8,
    MultiStateInput = 13,
    MultiStateOutput = 14,
    MultiStateValue = 19,
}

impl ObjectType {
    /// The nine database-backed types, in refresh application order
    pub const DB_BACKED: [ObjectType; 9] = [
        ObjectType::AnalogInput,
        ObjectType::AnalogOutput,
        ObjectType::AnalogValue,
        ObjectType::BinaryInput,
        ObjectType::BinaryOutput,
        ObjectType::BinaryValue,
        ObjectType::MultiStateInput,
        ObjectType::MultiStateOutput,
        ObjectType::MultiStateValue,
    ];

    /// Whether this is a commandable output type
    pub fn is_output(&self) -> bool {
        matches!(
            self,
            ObjectType::AnalogOutput | ObjectType::BinaryOutput | ObjectType::MultiStateOutput
        )
    }
}

impl TryFrom<u16> for ObjectType {
    type Error = ObjectError;

    fn try_from(value: u16) -> Result<Self> {
        match value {
            0 => Ok(ObjectType::AnalogInput),
            1 => Ok(ObjectType::AnalogOutput),
            2 => Ok(ObjectType::AnalogValue),
            3 => Ok(ObjectType::BinaryInput),
            4 => Ok(ObjectType::BinaryOutput),
            5 => Ok(ObjectType::BinaryValue),
            8 => Ok(ObjectType::Device),
            13 => Ok(ObjectType::MultiStateInput),
            14 => Ok(ObjectType::MultiStateOutput),
            19 => Ok(ObjectType::MultiStateValue),
            _ => Err(ObjectError::InvalidValue(format!("unknown object type: {}", value))),
        }
    }
}

/// BACnet property identifiers served by this device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PropertyIdentifier {
    All = 8,
    ApplicationSoftwareVersion = 12,
    CovIncrement = 22,
    Description = 28,
    EventState = 36,
    FirmwareRevision = 44,
    MaxApduLengthAccepted = 62,
    ModelName = 70,
    NumberOfStates = 74,
    ObjectIdentifier = 75,
    ObjectList = 76,
    ObjectName = 77,
    ObjectType = 79,
    Optional = 80,
    OutOfService = 81,
    Polarity = 84,
    PresentValue = 85,
    ProtocolVersion = 98,
    RelinquishDefault = 104,
    Required = 105,
    SegmentationSupported = 107,
    StateText = 110,
    StatusFlags = 111,
    SystemStatus = 112,
    Units = 117,
    VendorIdentifier = 120,
    VendorName = 121,
    ProtocolRevision = 139,
    DatabaseRevision = 155,
}

impl TryFrom<u32> for PropertyIdentifier {
    type Error = ObjectError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            8 => Ok(Self::All),
            12 => Ok(Self::ApplicationSoftwareVersion),
            22 => Ok(Self::CovIncrement),
            28 => Ok(Self::Description),
            36 => Ok(Self::EventState),
            44 => Ok(Self::FirmwareRevision),
            62 => Ok(Self::MaxApduLengthAccepted),
            70 => Ok(Self::ModelName),
            74 => Ok(Self::NumberOfStates),
            75 => Ok(Self::ObjectIdentifier),
            76 => Ok(Self::ObjectList),
            77 => Ok(Self::ObjectName),
            79 => Ok(Self::ObjectType),
            80 => Ok(Self::Optional),
            81 => Ok(Self::OutOfService),
            84 => Ok(Self::Polarity),
            85 => Ok(Self::PresentValue),
            98 => Ok(Self::ProtocolVersion),
            104 => Ok(Self::RelinquishDefault),
            105 => Ok(Self::Required),
            107 => Ok(Self::SegmentationSupported),
            110 => Ok(Self::StateText),
            111 => Ok(Self::StatusFlags),
            112 => Ok(Self::SystemStatus),
            117 => Ok(Self::Units),
            120 => Ok(Self::VendorIdentifier),
            121 => Ok(Self::VendorName),
            139 => Ok(Self::ProtocolRevision),
            155 => Ok(Self::DatabaseRevision),
            _ => Err(ObjectError::UnknownProperty),
        }
    }
}

/// Object identifier (type + instance number)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectIdentifier {
    pub object_type: ObjectType,
    pub instance: u32,
}

impl ObjectIdentifier {
    /// Create a new object identifier
    pub fn new(object_type: ObjectType, instance: u32) -> Self {
        Self {
            object_type,
            instance,
        }
    }

    /// Check if instance number is valid (0-4194302)
    pub fn is_valid(&self) -> bool {
        self.instance <= 0x3F_FFFE
    }
}

/// Property values exchanged between the wire, the objects and the tasks
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Null,
    Boolean(bool),
    Unsigned(u32),
    Signed(i32),
    Real(f32),
    Double(f64),
    CharacterString(String),
    BitString(Vec<bool>),
    Enumerated(u32),
    ObjectIdentifier(ObjectIdentifier),
    Array(Vec<PropertyValue>),
}

impl PropertyValue {
    /// Encode this value with its application tag
    pub fn encode(&self, buffer: &mut Vec<u8>) -> crate::encoding::Result<()> {
        use crate::encoding::*;

        match self {
            PropertyValue::Null => encode_null(buffer),
            PropertyValue::Boolean(v) => encode_boolean(buffer, *v),
            PropertyValue::Unsigned(v) => encode_unsigned(buffer, *v),
            PropertyValue::Signed(v) => encode_signed(buffer, *v),
            PropertyValue::Real(v) => encode_real(buffer, *v),
            PropertyValue::Double(v) => encode_double(buffer, *v),
            PropertyValue::CharacterString(v) => encode_character_string(buffer, v),
            PropertyValue::BitString(v) => encode_bit_string(buffer, v),
            PropertyValue::Enumerated(v) => encode_enumerated(buffer, *v),
            PropertyValue::ObjectIdentifier(v) => {
                encode_object_identifier(buffer, v.object_type as u16, v.instance)
            }
            PropertyValue::Array(values) => {
                for value in values {
                    value.encode(buffer)?;
                }
                Ok(())
            }
        }
    }

    /// Decode a single application-tagged value
    pub fn decode(data: &[u8]) -> crate::encoding::Result<(Self, usize)> {
        use crate::encoding::*;

        let tag = peek_application_tag(data)?;
        match tag {
            ApplicationTag::Null => {
                let (_, _, consumed) = decode_application_tag(data)?;
                Ok((PropertyValue::Null, consumed))
            }
            ApplicationTag::Boolean => {
                let (v, consumed) = decode_boolean(data)?;
                Ok((PropertyValue::Boolean(v), consumed))
            }
            ApplicationTag::UnsignedInt => {
                let (v, consumed) = decode_unsigned(data)?;
                Ok((PropertyValue::Unsigned(v), consumed))
            }
            ApplicationTag::SignedInt => {
                let (v, consumed) = decode_signed(data)?;
                Ok((PropertyValue::Signed(v), consumed))
            }
            ApplicationTag::Real => {
                let (v, consumed) = decode_real(data)?;
                Ok((PropertyValue::Real(v), consumed))
            }
            ApplicationTag::Double => {
                let (v, consumed) = decode_double(data)?;
                Ok((PropertyValue::Double(v), consumed))
            }
            ApplicationTag::CharacterString => {
                let (v, consumed) = decode_character_string(data)?;
                Ok((PropertyValue::CharacterString(v), consumed))
            }
            ApplicationTag::BitString => {
                let (v, consumed) = decode_bit_string(data)?;
                Ok((PropertyValue::BitString(v), consumed))
            }
            ApplicationTag::Enumerated => {
                let (v, consumed) = decode_enumerated(data)?;
                Ok((PropertyValue::Enumerated(v), consumed))
            }
            ApplicationTag::ObjectIdentifier => {
                let ((object_type, instance), consumed) = decode_object_identifier(data)?;
                let object_type = ObjectType::try_from(object_type)
                    .map_err(|_| EncodingError::ValueOutOfRange)?;
                Ok((
                    PropertyValue::ObjectIdentifier(ObjectIdentifier::new(object_type, instance)),
                    consumed,
                ))
            }
            _ => Err(EncodingError::InvalidTag),
        }
    }
}

/// Status flags carried on every object (in_alarm, fault, overridden,
/// out_of_service), persisted as a 4-character `0`/`1` string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusFlags {
    pub in_alarm: bool,
    pub fault: bool,
    pub overridden: bool,
    pub out_of_service: bool,
}

impl StatusFlags {
    /// Parse the database representation; anything but exactly four `0`/`1`
    /// characters is rejected
    pub fn parse(text: &str) -> Result<Self> {
        let bytes = text.as_bytes();
        if bytes.len() != 4 || !bytes.iter().all(|b| *b == b'0' || *b == b'1') {
            return Err(ObjectError::InvalidValue(format!(
                "status_flags must be 4 characters of 0/1, got {:?}",
                text
            )));
        }
        Ok(Self {
            in_alarm: bytes[0] == b'1',
            fault: bytes[1] == b'1',
            overridden: bytes[2] == b'1',
            out_of_service: bytes[3] == b'1',
        })
    }

    /// Render the database representation
    pub fn to_db_string(&self) -> String {
        let bit = |b: bool| if b { '1' } else { '0' };
        [
            bit(self.in_alarm),
            bit(self.fault),
            bit(self.overridden),
            bit(self.out_of_service),
        ]
        .iter()
        .collect()
    }

    /// The four bits in wire order
    pub fn bits(&self) -> [bool; 4] {
        [self.in_alarm, self.fault, self.overridden, self.out_of_service]
    }
}

/// Event state enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum EventState {
    Normal = 0,
    Fault = 1,
    Offnormal = 2,
    HighLimit = 3,
    LowLimit = 4,
}

impl EventState {
    /// Parse the database name for an analog object (full set)
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "normal" => Ok(EventState::Normal),
            "fault" => Ok(EventState::Fault),
            "offnormal" => Ok(EventState::Offnormal),
            "highLimit" => Ok(EventState::HighLimit),
            "lowLimit" => Ok(EventState::LowLimit),
            _ => Err(ObjectError::InvalidValue(format!("unknown event state: {:?}", name))),
        }
    }

    /// Parse the database name for binary and multi-state objects, which
    /// only allow normal/fault/offnormal
    pub fn parse_restricted(name: &str) -> Result<Self> {
        match Self::parse(name)? {
            state @ (EventState::Normal | EventState::Fault | EventState::Offnormal) => Ok(state),
            state => Err(ObjectError::InvalidValue(format!(
                "event state {:?} not allowed for this object type",
                state
            ))),
        }
    }
}

/// BACnet engineering units (the subset the management layer writes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum EngineeringUnits {
    Amperes = 3,
    Volts = 5,
    PercentRelativeHumidity = 29,
    Watts = 47,
    Kilowatts = 48,
    Pascals = 53,
    Kilopascals = 54,
    DegreesCelsius = 62,
    DegreesKelvin = 63,
    DegreesFahrenheit = 64,
    MetersPerSecond = 74,
    NoUnits = 95,
    PartsPerMillion = 96,
    Percent = 98,
}

impl EngineeringUnits {
    /// Parse the unit name stored in the database
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "amperes" => Ok(Self::Amperes),
            "volts" => Ok(Self::Volts),
            "percentRelativeHumidity" => Ok(Self::PercentRelativeHumidity),
            "watts" => Ok(Self::Watts),
            "kilowatts" => Ok(Self::Kilowatts),
            "pascals" => Ok(Self::Pascals),
            "kilopascals" => Ok(Self::Kilopascals),
            "degreesCelsius" => Ok(Self::DegreesCelsius),
            "degreesKelvin" => Ok(Self::DegreesKelvin),
            "degreesFahrenheit" => Ok(Self::DegreesFahrenheit),
            "metersPerSecond" => Ok(Self::MetersPerSecond),
            "noUnits" => Ok(Self::NoUnits),
            "partsPerMillion" => Ok(Self::PartsPerMillion),
            "percent" => Ok(Self::Percent),
            _ => Err(ObjectError::InvalidValue(format!("unknown engineering units: {:?}", name))),
        }
    }
}

/// The common property block shared by all nine database-backed types,
/// parsed and validated from its database representation
#[derive(Debug, Clone)]
pub struct CommonProps {
    pub object_name: String,
    pub description: String,
    pub status_flags: StatusFlags,
    pub event_state: EventState,
    pub out_of_service: bool,
}

/// Parse the common column set. `restricted_event_state` applies the
/// binary/multi-state event-state restriction.
pub fn parse_common(
    object_name: &str,
    description: Option<&str>,
    status_flags: &str,
    event_state: &str,
    out_of_service: bool,
    restricted_event_state: bool,
) -> Result<CommonProps> {
    if object_name.is_empty() || object_name.len() > 255 {
        return Err(ObjectError::InvalidValue(format!(
            "object_name must be 1..=255 characters, got {} characters",
            object_name.len()
        )));
    }
    let description = description.unwrap_or_default();
    if description.len() > 255 {
        return Err(ObjectError::InvalidValue(
            "description longer than 255 characters".to_string(),
        ));
    }
    let status_flags = StatusFlags::parse(status_flags)?;
    let event_state = if restricted_event_state {
        EventState::parse_restricted(event_state)?
    } else {
        EventState::parse(event_state)?
    };
    Ok(CommonProps {
        object_name: object_name.to_string(),
        description: description.to_string(),
        status_flags,
        event_state,
        out_of_service,
    })
}

/// Commanded present-value of an output object, snapshotted by the
/// persistence task
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandedValue {
    Analog(f64),
    Binary(binary::BinaryPv),
    MultiState(u32),
}

/// A present-value or status-flags change that the COV subsystem should
/// evaluate against active subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CovEvent {
    pub object: ObjectIdentifier,
}

pub mod analog;
pub mod binary;
pub mod device;
pub mod multistate;
pub mod registry;

pub use analog::{AnalogInput, AnalogOutput, AnalogValue};
pub use binary::{BinaryInput, BinaryOutput, BinaryPv, BinaryValue, Polarity};
pub use device::{Device, Segmentation};
pub use multistate::{MultiStateInput, MultiStateOutput, MultiStateValue};
pub use registry::ObjectRegistry;

/// One live object, tagged by its BACnet type
///
/// The tagged form keeps service dispatch and the two synchronization passes
/// exhaustive over the object kinds the server can host.
#[derive(Debug, Clone)]
pub enum BacnetObject {
    AnalogInput(AnalogInput),
    AnalogOutput(AnalogOutput),
    AnalogValue(AnalogValue),
    BinaryInput(BinaryInput),
    BinaryOutput(BinaryOutput),
    BinaryValue(BinaryValue),
    MultiStateInput(MultiStateInput),
    MultiStateOutput(MultiStateOutput),
    MultiStateValue(MultiStateValue),
    Device(Device),
}

impl BacnetObject {
    /// Get the object identifier
    pub fn identifier(&self) -> ObjectIdentifier {
        match self {
            BacnetObject::AnalogInput(o) => o.identifier,
            BacnetObject::AnalogOutput(o) => o.identifier,
            BacnetObject::AnalogValue(o) => o.identifier,
            BacnetObject::BinaryInput(o) => o.identifier,
            BacnetObject::BinaryOutput(o) => o.identifier,
            BacnetObject::BinaryValue(o) => o.identifier,
            BacnetObject::MultiStateInput(o) => o.identifier,
            BacnetObject::MultiStateOutput(o) => o.identifier,
            BacnetObject::MultiStateValue(o) => o.identifier,
            BacnetObject::Device(o) => o.identifier,
        }
    }

    /// Get a property value
    pub fn read_property(&self, property: PropertyIdentifier) -> Result<PropertyValue> {
        match self {
            BacnetObject::AnalogInput(o) => o.read_property(property),
            BacnetObject::AnalogOutput(o) => o.read_property(property),
            BacnetObject::AnalogValue(o) => o.read_property(property),
            BacnetObject::BinaryInput(o) => o.read_property(property),
            BacnetObject::BinaryOutput(o) => o.read_property(property),
            BacnetObject::BinaryValue(o) => o.read_property(property),
            BacnetObject::MultiStateInput(o) => o.read_property(property),
            BacnetObject::MultiStateOutput(o) => o.read_property(property),
            BacnetObject::MultiStateValue(o) => o.read_property(property),
            BacnetObject::Device(o) => o.read_property(property),
        }
    }

    /// Apply a client WriteProperty; validation happens before any state is
    /// touched, so a rejected write leaves the object unchanged
    pub fn write_property(
        &mut self,
        property: PropertyIdentifier,
        value: PropertyValue,
    ) -> Result<Option<CovEvent>> {
        match self {
            BacnetObject::AnalogInput(o) => o.write_property(property, value),
            BacnetObject::AnalogOutput(o) => o.write_property(property, value),
            BacnetObject::AnalogValue(o) => o.write_property(property, value),
            BacnetObject::BinaryInput(o) => o.write_property(property, value),
            BacnetObject::BinaryOutput(o) => o.write_property(property, value),
            BacnetObject::BinaryValue(o) => o.write_property(property, value),
            BacnetObject::MultiStateInput(o) => o.write_property(property, value),
            BacnetObject::MultiStateOutput(o) => o.write_property(property, value),
            BacnetObject::MultiStateValue(o) => o.write_property(property, value),
            BacnetObject::Device(_) => Err(ObjectError::PropertyNotWritable),
        }
    }

    /// The commanded present-value, for output objects only
    pub fn commanded_value(&self) -> Option<CommandedValue> {
        match self {
            BacnetObject::AnalogOutput(o) => Some(CommandedValue::Analog(o.present_value)),
            BacnetObject::BinaryOutput(o) => Some(CommandedValue::Binary(o.present_value)),
            BacnetObject::MultiStateOutput(o) => Some(CommandedValue::MultiState(o.present_value)),
            _ => None,
        }
    }

    /// List of the properties this object serves (used by
    /// ReadPropertyMultiple `all` handling)
    pub fn property_list(&self) -> Vec<PropertyIdentifier> {
        match self {
            BacnetObject::AnalogInput(o) => o.property_list(),
            BacnetObject::AnalogOutput(o) => o.property_list(),
            BacnetObject::AnalogValue(o) => o.property_list(),
            BacnetObject::BinaryInput(o) => o.property_list(),
            BacnetObject::BinaryOutput(o) => o.property_list(),
            BacnetObject::BinaryValue(o) => o.property_list(),
            BacnetObject::MultiStateInput(o) => o.property_list(),
            BacnetObject::MultiStateOutput(o) => o.property_list(),
            BacnetObject::MultiStateValue(o) => o.property_list(),
            BacnetObject::Device(o) => o.property_list(),
        }
    }

    /// Current status flags
    pub fn status_flags(&self) -> StatusFlags {
        match self {
            BacnetObject::AnalogInput(o) => o.status_flags,
            BacnetObject::AnalogOutput(o) => o.status_flags,
            BacnetObject::AnalogValue(o) => o.status_flags,
            BacnetObject::BinaryInput(o) => o.status_flags,
            BacnetObject::BinaryOutput(o) => o.status_flags,
            BacnetObject::BinaryValue(o) => o.status_flags,
            BacnetObject::MultiStateInput(o) => o.status_flags,
            BacnetObject::MultiStateOutput(o) => o.status_flags,
            BacnetObject::MultiStateValue(o) => o.status_flags,
            BacnetObject::Device(_) => StatusFlags::default(),
        }
    }

    /// The COV increment, for analog objects
    pub fn cov_increment(&self) -> Option<f64> {
        match self {
            BacnetObject::AnalogInput(o) => Some(o.cov_increment),
            BacnetObject::AnalogOutput(o) => Some(o.cov_increment),
            BacnetObject::AnalogValue(o) => Some(o.cov_increment),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_flags_parse() {
        let flags = StatusFlags::parse("0101").unwrap();
        assert!(!flags.in_alarm);
        assert!(flags.fault);
        assert!(!flags.overridden);
        assert!(flags.out_of_service);
        assert_eq!(flags.to_db_string(), "0101");
    }

    #[test]
    fn test_status_flags_rejects_bad_length() {
        assert!(StatusFlags::parse("012").is_err());
        assert!(StatusFlags::parse("00000").is_err());
        assert!(StatusFlags::parse("01x1").is_err());
    }

    #[test]
    fn test_event_state_restricted() {
        assert_eq!(EventState::parse_restricted("offnormal").unwrap(), EventState::Offnormal);
        assert!(EventState::parse_restricted("highLimit").is_err());
        assert_eq!(EventState::parse("highLimit").unwrap(), EventState::HighLimit);
    }

    #[test]
    fn test_object_type_codes() {
        assert_eq!(ObjectType::AnalogInput as u16, 0);
        assert_eq!(ObjectType::MultiStateValue as u16, 19);
        assert_eq!(ObjectType::try_from(14).unwrap(), ObjectType::MultiStateOutput);
        assert!(ObjectType::try_from(6).is_err());
    }

    #[test]
    fn test_property_value_round_trip() {
        let values = [
            PropertyValue::Real(42.5),
            PropertyValue::Boolean(true),
            PropertyValue::Unsigned(3),
            PropertyValue::Enumerated(1),
            PropertyValue::CharacterString("pump".into()),
            PropertyValue::BitString(vec![false, true, false, false]),
        ];
        for value in values {
            let mut buffer = Vec::new();
            value.encode(&mut buffer).unwrap();
            let (decoded, consumed) = PropertyValue::decode(&buffer).unwrap();
            assert_eq!(decoded, value);
            assert_eq!(consumed, buffer.len());
        }
    }
}
