//! Device Object Implementation
//!
//! The single Device object every BACnet device must expose. Unlike the nine
//! database-backed types it is built once from the identity file and never
//! refreshed or persisted. The object-list property is answered by the
//! server from the registry, since the device itself does not own the other
//! objects.

use crate::object::{
    ObjectError, ObjectIdentifier, ObjectType, PropertyIdentifier, PropertyValue, Result,
};

/// Segmentation support enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Segmentation {
    Both = 0,
    Transmit = 1,
    Receive = 2,
    NoSegmentation = 3,
}

/// Device object
#[derive(Debug, Clone)]
pub struct Device {
    /// Object identifier (always type Device)
    pub identifier: ObjectIdentifier,
    /// Object name (required property)
    pub object_name: String,
    /// Vendor name
    pub vendor_name: String,
    /// Vendor identifier
    pub vendor_identifier: u16,
    /// Model name
    pub model_name: String,
    /// Firmware revision
    pub firmware_revision: String,
    /// Application software version
    pub application_software_version: String,
    /// Protocol version (always 1)
    pub protocol_version: u8,
    /// Protocol revision
    pub protocol_revision: u8,
    /// Maximum APDU length accepted
    pub max_apdu_length_accepted: u16,
    /// Segmentation support
    pub segmentation_supported: Segmentation,
    /// Database revision
    pub database_revision: u32,
}

impl Device {
    /// Create a new Device object
    pub fn new(instance: u32, object_name: String, vendor_identifier: u16) -> Result<Self> {
        let identifier = ObjectIdentifier::new(ObjectType::Device, instance);
        if !identifier.is_valid() {
            return Err(ObjectError::InvalidConfiguration(format!(
                "device instance {} out of range",
                instance
            )));
        }
        if object_name.is_empty() {
            return Err(ObjectError::InvalidConfiguration(
                "device object name must not be empty".to_string(),
            ));
        }
        Ok(Self {
            identifier,
            object_name,
            vendor_name: String::from("bacnetd"),
            vendor_identifier,
            model_name: String::from("bacnetd device server"),
            firmware_revision: env!("CARGO_PKG_VERSION").to_string(),
            application_software_version: env!("CARGO_PKG_VERSION").to_string(),
            protocol_version: 1,
            protocol_revision: 22,
            max_apdu_length_accepted: 1476,
            segmentation_supported: Segmentation::NoSegmentation,
            database_revision: 1,
        })
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
                Ok(PropertyValue::Enumerated(ObjectType::Device as u32))
            }
            // Operational = 0
            PropertyIdentifier::SystemStatus => Ok(PropertyValue::Enumerated(0)),
            PropertyIdentifier::VendorName => {
                Ok(PropertyValue::CharacterString(self.vendor_name.clone()))
            }
            PropertyIdentifier::VendorIdentifier => {
                Ok(PropertyValue::Unsigned(self.vendor_identifier as u32))
            }
            PropertyIdentifier::ModelName => {
                Ok(PropertyValue::CharacterString(self.model_name.clone()))
            }
            PropertyIdentifier::FirmwareRevision => {
                Ok(PropertyValue::CharacterString(self.firmware_revision.clone()))
            }
            PropertyIdentifier::ApplicationSoftwareVersion => Ok(PropertyValue::CharacterString(
                self.application_software_version.clone(),
            )),
            PropertyIdentifier::ProtocolVersion => {
                Ok(PropertyValue::Unsigned(self.protocol_version as u32))
            }
            PropertyIdentifier::ProtocolRevision => {
                Ok(PropertyValue::Unsigned(self.protocol_revision as u32))
            }
            PropertyIdentifier::MaxApduLengthAccepted => {
                Ok(PropertyValue::Unsigned(self.max_apdu_length_accepted as u32))
            }
            PropertyIdentifier::SegmentationSupported => {
                Ok(PropertyValue::Enumerated(self.segmentation_supported as u32))
            }
            PropertyIdentifier::DatabaseRevision => {
                Ok(PropertyValue::Unsigned(self.database_revision))
            }
            // ObjectList is served by the registry, which owns the object set
            _ => Err(ObjectError::UnknownProperty),
        }
    }

    pub fn property_list(&self) -> Vec<PropertyIdentifier> {
        vec![
            PropertyIdentifier::ObjectIdentifier,
            PropertyIdentifier::ObjectName,
            PropertyIdentifier::ObjectType,
            PropertyIdentifier::SystemStatus,
            PropertyIdentifier::VendorName,
            PropertyIdentifier::VendorIdentifier,
            PropertyIdentifier::ModelName,
            PropertyIdentifier::FirmwareRevision,
            PropertyIdentifier::ApplicationSoftwareVersion,
            PropertyIdentifier::ProtocolVersion,
            PropertyIdentifier::ProtocolRevision,
            PropertyIdentifier::MaxApduLengthAccepted,
            PropertyIdentifier::SegmentationSupported,
            PropertyIdentifier::ObjectList,
            PropertyIdentifier::DatabaseRevision,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_creation() {
        let device = Device::new(600001, "Plant controller".to_string(), 15).unwrap();
        assert_eq!(device.identifier.instance, 600001);
        assert_eq!(device.identifier.object_type, ObjectType::Device);
    }

    #[test]
    fn test_device_instance_range() {
        assert!(Device::new(0x400000, "too big".to_string(), 15).is_err());
        assert!(Device::new(1, String::new(), 15).is_err());
    }

    #[test]
    fn test_device_properties() {
        let device = Device::new(42, "D".to_string(), 999).unwrap();
        assert_eq!(
            device.read_property(PropertyIdentifier::VendorIdentifier).unwrap(),
            PropertyValue::Unsigned(999)
        );
        assert_eq!(
            device.read_property(PropertyIdentifier::ProtocolVersion).unwrap(),
            PropertyValue::Unsigned(1)
        );
        assert!(device.read_property(PropertyIdentifier::PresentValue).is_err());
    }
}
