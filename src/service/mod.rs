//! BACnet Service Layer
//!
//! Service choice enumerations and the request/ack codecs for the services
//! this device implements: ReadProperty, ReadPropertyMultiple,
//! WriteProperty, SubscribeCOV, COV notification delivery, and the Who-Is /
//! I-Am discovery pair.
//!
//! The request structs decode the service data of incoming confirmed
//! requests; the ack forms encode outgoing responses. Both directions are
//! kept symmetric so the test suite can drive the server with real frames.

use std::net::SocketAddr;

use thiserror::Error;

use crate::encoding::context::{
    decode_context_enumerated, decode_context_object_id, decode_context_tag,
    decode_context_unsigned, encode_closing_tag, encode_context_enumerated,
    encode_context_object_id, encode_context_tag, encode_context_unsigned, encode_opening_tag,
    is_closing_tag, is_context_tag, is_opening_tag, skip_element,
};
use crate::encoding::{
    decode_enumerated, decode_object_identifier, decode_unsigned, encode_enumerated,
    encode_object_identifier, encode_unsigned, EncodingError, Result as EncodingResult,
};
use crate::object::{ObjectError, ObjectIdentifier, PropertyValue, StatusFlags};

/// Result type for service operations
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Errors that can occur during service operations
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Unsupported service choice
    #[error("unsupported service choice: {0}")]
    UnsupportedServiceChoice(u8),
    /// Malformed service data
    #[error("malformed service data: {0}")]
    Malformed(#[from] EncodingError),
}

/// Confirmed service choices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConfirmedServiceChoice {
    ConfirmedCovNotification = 1,
    SubscribeCov = 5,
    ReadProperty = 12,
    ReadPropertyMultiple = 14,
    WriteProperty = 15,
}

impl TryFrom<u8> for ConfirmedServiceChoice {
    type Error = ServiceError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::ConfirmedCovNotification),
            5 => Ok(Self::SubscribeCov),
            12 => Ok(Self::ReadProperty),
            14 => Ok(Self::ReadPropertyMultiple),
            15 => Ok(Self::WriteProperty),
            other => Err(ServiceError::UnsupportedServiceChoice(other)),
        }
    }
}

/// Unconfirmed service choices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UnconfirmedServiceChoice {
    IAm = 0,
    UnconfirmedCovNotification = 2,
    WhoIs = 8,
}

impl TryFrom<u8> for UnconfirmedServiceChoice {
    type Error = ServiceError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::IAm),
            2 => Ok(Self::UnconfirmedCovNotification),
            8 => Ok(Self::WhoIs),
            other => Err(ServiceError::UnsupportedServiceChoice(other)),
        }
    }
}

/// Reject reason codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RejectReason {
    Other = 0,
    InconsistentParameters = 2,
    InvalidParameterDataType = 3,
    InvalidTag = 4,
    MissingRequiredParameter = 5,
    ParameterOutOfRange = 6,
    UnrecognizedService = 9,
}

/// Abort reason codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AbortReason {
    Other = 0,
    BufferOverflow = 1,
    SegmentationNotSupported = 4,
}

/// BACnet error classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorClass {
    Device = 0,
    Object = 1,
    Property = 2,
    Resources = 3,
    Services = 5,
}

/// BACnet error codes (subset used by this device)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Other = 0,
    InvalidDataType = 9,
    UnknownObject = 31,
    UnknownProperty = 32,
    ValueOutOfRange = 37,
    WriteAccessDenied = 40,
    InvalidArrayIndex = 42,
}

/// Map an object-model error to the BACnet error class/code pair returned to
/// the client
pub fn error_for(error: &ObjectError) -> (ErrorClass, ErrorCode) {
    match error {
        ObjectError::NotFound => (ErrorClass::Object, ErrorCode::UnknownObject),
        ObjectError::UnknownProperty => (ErrorClass::Property, ErrorCode::UnknownProperty),
        ObjectError::PropertyNotWritable => (ErrorClass::Property, ErrorCode::WriteAccessDenied),
        ObjectError::InvalidPropertyType => (ErrorClass::Property, ErrorCode::InvalidDataType),
        ObjectError::InvalidValue(_) => (ErrorClass::Property, ErrorCode::ValueOutOfRange),
        ObjectError::InvalidConfiguration(_) => (ErrorClass::Device, ErrorCode::Other),
    }
}

/// Special array index value indicating all elements
pub const BACNET_ARRAY_ALL: u32 = 0xFFFF_FFFF;

/// Read Property request (confirmed service)
///
/// The object type is kept raw so a request for a type this device does not
/// host maps to an unknown-object error rather than a decode failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadPropertyRequest {
    /// Object type number
    pub object_type: u16,
    /// Object instance
    pub instance: u32,
    /// Property identifier
    pub property_identifier: u32,
    /// Property array index (optional)
    pub property_array_index: Option<u32>,
}

impl ReadPropertyRequest {
    /// Decode the service data of a ReadProperty request
    pub fn decode(data: &[u8]) -> EncodingResult<Self> {
        let mut pos = 0;

        let ((object_type, instance), consumed) = decode_context_object_id(data, 0)?;
        pos += consumed;

        let (property_identifier, consumed) = decode_context_enumerated(&data[pos..], 1)?;
        pos += consumed;

        let property_array_index = if pos < data.len() && is_context_tag(&data[pos..], 2) {
            let (index, _) = decode_context_unsigned(&data[pos..], 2)?;
            Some(index)
        } else {
            None
        };

        Ok(Self {
            object_type,
            instance,
            property_identifier,
            property_array_index,
        })
    }

    /// Encode the service data of a ReadProperty request
    pub fn encode(&self, buffer: &mut Vec<u8>) -> EncodingResult<()> {
        encode_context_object_id(buffer, 0, self.object_type, self.instance)?;
        encode_context_enumerated(buffer, 1, self.property_identifier)?;
        if let Some(index) = self.property_array_index {
            encode_context_unsigned(buffer, 2, index)?;
        }
        Ok(())
    }
}

/// Read Property acknowledgment (the ComplexACK service data)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadPropertyAck {
    pub object_type: u16,
    pub instance: u32,
    pub property_identifier: u32,
    pub property_array_index: Option<u32>,
    /// Application-tagged encoded property value
    pub property_value: Vec<u8>,
}

impl ReadPropertyAck {
    /// Encode the acknowledgment service data
    pub fn encode(&self, buffer: &mut Vec<u8>) -> EncodingResult<()> {
        encode_context_object_id(buffer, 0, self.object_type, self.instance)?;
        encode_context_enumerated(buffer, 1, self.property_identifier)?;
        if let Some(index) = self.property_array_index {
            encode_context_unsigned(buffer, 2, index)?;
        }
        encode_opening_tag(buffer, 3)?;
        buffer.extend_from_slice(&self.property_value);
        encode_closing_tag(buffer, 3)?;
        Ok(())
    }

    /// Decode an acknowledgment (client side; used by the test suite)
    pub fn decode(data: &[u8]) -> EncodingResult<Self> {
        let mut pos = 0;

        let ((object_type, instance), consumed) = decode_context_object_id(data, 0)?;
        pos += consumed;

        let (property_identifier, consumed) = decode_context_enumerated(&data[pos..], 1)?;
        pos += consumed;

        let property_array_index = if is_context_tag(&data[pos..], 2) {
            let (index, consumed) = decode_context_unsigned(&data[pos..], 2)?;
            pos += consumed;
            Some(index)
        } else {
            None
        };

        if !is_opening_tag(&data[pos..], 3) {
            return Err(EncodingError::InvalidTag);
        }
        pos += 1;

        let value_start = pos;
        while pos < data.len() && !is_closing_tag(&data[pos..], 3) {
            pos += skip_element(&data[pos..])?;
        }
        if pos >= data.len() {
            return Err(EncodingError::BufferUnderflow);
        }

        Ok(Self {
            object_type,
            instance,
            property_identifier,
            property_array_index,
            property_value: data[value_start..pos].to_vec(),
        })
    }
}

/// Write Property request (confirmed service)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WritePropertyRequest {
    pub object_type: u16,
    pub instance: u32,
    pub property_identifier: u32,
    pub property_array_index: Option<u32>,
    /// Application-tagged encoded value
    pub property_value: Vec<u8>,
    /// Write priority (1..=16); decoded but not used for arbitration
    pub priority: Option<u8>,
}

impl WritePropertyRequest {
    /// Decode the service data of a WriteProperty request
    pub fn decode(data: &[u8]) -> EncodingResult<Self> {
        let mut pos = 0;

        let ((object_type, instance), consumed) = decode_context_object_id(data, 0)?;
        pos += consumed;

        let (property_identifier, consumed) = decode_context_enumerated(&data[pos..], 1)?;
        pos += consumed;

        let property_array_index = if is_context_tag(&data[pos..], 2) {
            let (index, consumed) = decode_context_unsigned(&data[pos..], 2)?;
            pos += consumed;
            Some(index)
        } else {
            None
        };

        if !is_opening_tag(&data[pos..], 3) {
            return Err(EncodingError::InvalidTag);
        }
        pos += 1;

        let value_start = pos;
        while pos < data.len() && !is_closing_tag(&data[pos..], 3) {
            pos += skip_element(&data[pos..])?;
        }
        if pos >= data.len() {
            return Err(EncodingError::BufferUnderflow);
        }
        let property_value = data[value_start..pos].to_vec();
        pos += 1;

        let priority = if pos < data.len() && is_context_tag(&data[pos..], 4) {
            let (priority, _) = decode_context_unsigned(&data[pos..], 4)?;
            if !(1..=16).contains(&priority) {
                return Err(EncodingError::ValueOutOfRange);
            }
            Some(priority as u8)
        } else {
            None
        };

        Ok(Self {
            object_type,
            instance,
            property_identifier,
            property_array_index,
            property_value,
            priority,
        })
    }

    /// Encode the service data of a WriteProperty request
    pub fn encode(&self, buffer: &mut Vec<u8>) -> EncodingResult<()> {
        encode_context_object_id(buffer, 0, self.object_type, self.instance)?;
        encode_context_enumerated(buffer, 1, self.property_identifier)?;
        if let Some(index) = self.property_array_index {
            encode_context_unsigned(buffer, 2, index)?;
        }
        encode_opening_tag(buffer, 3)?;
        buffer.extend_from_slice(&self.property_value);
        encode_closing_tag(buffer, 3)?;
        if let Some(priority) = self.priority {
            encode_context_unsigned(buffer, 4, priority as u32)?;
        }
        Ok(())
    }
}

/// One property reference inside a read access specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyReference {
    pub property_identifier: u32,
    pub property_array_index: Option<u32>,
}

/// One object's worth of property references in an RPM request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadAccessSpecification {
    pub object_type: u16,
    pub instance: u32,
    pub properties: Vec<PropertyReference>,
}

/// Read Property Multiple request (confirmed service)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReadPropertyMultipleRequest {
    pub specifications: Vec<ReadAccessSpecification>,
}

impl ReadPropertyMultipleRequest {
    /// Decode the service data of a ReadPropertyMultiple request
    pub fn decode(data: &[u8]) -> EncodingResult<Self> {
        let mut specifications = Vec::new();
        let mut pos = 0;

        while pos < data.len() {
            let ((object_type, instance), consumed) = decode_context_object_id(&data[pos..], 0)?;
            pos += consumed;

            if !is_opening_tag(&data[pos..], 1) {
                return Err(EncodingError::InvalidTag);
            }
            pos += 1;

            let mut properties = Vec::new();
            while pos < data.len() && !is_closing_tag(&data[pos..], 1) {
                let (property_identifier, consumed) =
                    decode_context_enumerated(&data[pos..], 0)?;
                pos += consumed;

                let property_array_index = if pos < data.len() && is_context_tag(&data[pos..], 1) {
                    // Distinguish a context-1 primitive (array index) from
                    // the closing tag, which is_closing_tag already excluded
                    let (index, consumed) = decode_context_unsigned(&data[pos..], 1)?;
                    pos += consumed;
                    Some(index)
                } else {
                    None
                };

                properties.push(PropertyReference {
                    property_identifier,
                    property_array_index,
                });
            }
            if pos >= data.len() {
                return Err(EncodingError::BufferUnderflow);
            }
            pos += 1; // closing tag 1

            specifications.push(ReadAccessSpecification {
                object_type,
                instance,
                properties,
            });
        }

        Ok(Self { specifications })
    }

    /// Encode the service data of a ReadPropertyMultiple request
    pub fn encode(&self, buffer: &mut Vec<u8>) -> EncodingResult<()> {
        for spec in &self.specifications {
            encode_context_object_id(buffer, 0, spec.object_type, spec.instance)?;
            encode_opening_tag(buffer, 1)?;
            for property in &spec.properties {
                encode_context_enumerated(buffer, 0, property.property_identifier)?;
                if let Some(index) = property.property_array_index {
                    encode_context_unsigned(buffer, 1, index)?;
                }
            }
            encode_closing_tag(buffer, 1)?;
        }
        Ok(())
    }
}

/// Outcome of one property read inside an RPM response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadResult {
    /// Application-tagged encoded value
    Value(Vec<u8>),
    /// Property access error
    Error(ErrorClass, ErrorCode),
}

/// One object's results inside an RPM response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadAccessResult {
    pub object_type: u16,
    pub instance: u32,
    pub results: Vec<(PropertyReference, ReadResult)>,
}

impl ReadAccessResult {
    /// Encode this result list in ReadPropertyMultiple-ACK form
    pub fn encode(&self, buffer: &mut Vec<u8>) -> EncodingResult<()> {
        encode_context_object_id(buffer, 0, self.object_type, self.instance)?;
        encode_opening_tag(buffer, 1)?;
        for (reference, result) in &self.results {
            encode_context_enumerated(buffer, 2, reference.property_identifier)?;
            if let Some(index) = reference.property_array_index {
                encode_context_unsigned(buffer, 3, index)?;
            }
            match result {
                ReadResult::Value(value) => {
                    encode_opening_tag(buffer, 4)?;
                    buffer.extend_from_slice(value);
                    encode_closing_tag(buffer, 4)?;
                }
                ReadResult::Error(class, code) => {
                    encode_opening_tag(buffer, 5)?;
                    encode_enumerated(buffer, *class as u32)?;
                    encode_enumerated(buffer, *code as u32)?;
                    encode_closing_tag(buffer, 5)?;
                }
            }
        }
        encode_closing_tag(buffer, 1)?;
        Ok(())
    }
}

/// Who-Is request (unconfirmed service)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WhoIsRequest {
    /// Low limit of device instance range (optional)
    pub device_instance_range_low_limit: Option<u32>,
    /// High limit of device instance range (optional)
    pub device_instance_range_high_limit: Option<u32>,
}

impl WhoIsRequest {
    /// Decode a Who-Is request; an empty body addresses all devices
    pub fn decode(data: &[u8]) -> EncodingResult<Self> {
        if data.is_empty() {
            return Ok(Self::default());
        }

        let (low, consumed) = decode_context_unsigned(data, 0)?;
        let (high, _) = decode_context_unsigned(&data[consumed..], 1)?;
        Ok(Self {
            device_instance_range_low_limit: Some(low),
            device_instance_range_high_limit: Some(high),
        })
    }

    /// Encode a Who-Is request
    pub fn encode(&self, buffer: &mut Vec<u8>) -> EncodingResult<()> {
        if let (Some(low), Some(high)) = (
            self.device_instance_range_low_limit,
            self.device_instance_range_high_limit,
        ) {
            encode_context_unsigned(buffer, 0, low)?;
            encode_context_unsigned(buffer, 1, high)?;
        }
        Ok(())
    }

    /// Check if this request matches a device instance
    pub fn matches(&self, device_instance: u32) -> bool {
        match (
            self.device_instance_range_low_limit,
            self.device_instance_range_high_limit,
        ) {
            (Some(low), Some(high)) => (low..=high).contains(&device_instance),
            _ => true,
        }
    }
}

/// I-Am request (unconfirmed service)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IAmRequest {
    pub device_instance: u32,
    pub max_apdu_length_accepted: u32,
    pub segmentation_supported: u32,
    pub vendor_identifier: u32,
}

impl IAmRequest {
    /// Encode an I-Am request (all application-tagged)
    pub fn encode(&self, buffer: &mut Vec<u8>) -> EncodingResult<()> {
        encode_object_identifier(buffer, crate::object::ObjectType::Device as u16, self.device_instance)?;
        encode_unsigned(buffer, self.max_apdu_length_accepted)?;
        encode_enumerated(buffer, self.segmentation_supported)?;
        encode_unsigned(buffer, self.vendor_identifier)?;
        Ok(())
    }

    /// Decode an I-Am request
    pub fn decode(data: &[u8]) -> EncodingResult<Self> {
        let mut pos = 0;
        let ((_, device_instance), consumed) = decode_object_identifier(data)?;
        pos += consumed;
        let (max_apdu_length_accepted, consumed) = decode_unsigned(&data[pos..])?;
        pos += consumed;
        let (segmentation_supported, consumed) = decode_enumerated(&data[pos..])?;
        pos += consumed;
        let (vendor_identifier, _) = decode_unsigned(&data[pos..])?;
        Ok(Self {
            device_instance,
            max_apdu_length_accepted,
            segmentation_supported,
            vendor_identifier,
        })
    }
}

/// Subscribe COV request (confirmed service)
///
/// A request without the confirmed-notifications and lifetime parameters is
/// a cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeCovRequest {
    pub subscriber_process_identifier: u32,
    pub object_type: u16,
    pub instance: u32,
    pub issue_confirmed_notifications: Option<bool>,
    /// Lifetime in seconds, 0 = permanent
    pub lifetime: Option<u32>,
}

impl SubscribeCovRequest {
    /// Whether this request cancels an existing subscription
    pub fn is_cancellation(&self) -> bool {
        self.issue_confirmed_notifications.is_none() && self.lifetime.is_none()
    }

    /// Decode the service data of a SubscribeCOV request
    pub fn decode(data: &[u8]) -> EncodingResult<Self> {
        let mut pos = 0;

        let (subscriber_process_identifier, consumed) = decode_context_unsigned(data, 0)?;
        pos += consumed;

        let ((object_type, instance), consumed) = decode_context_object_id(&data[pos..], 1)?;
        pos += consumed;

        let issue_confirmed_notifications = if pos < data.len() && is_context_tag(&data[pos..], 2) {
            let (tag_number, length, consumed) = decode_context_tag(&data[pos..])?;
            debug_assert_eq!(tag_number, 2);
            if length != 1 || data.len() < pos + consumed + 1 {
                return Err(EncodingError::InvalidLength);
            }
            let value = data[pos + consumed] != 0;
            pos += consumed + 1;
            Some(value)
        } else {
            None
        };

        let lifetime = if pos < data.len() && is_context_tag(&data[pos..], 3) {
            let (lifetime, _) = decode_context_unsigned(&data[pos..], 3)?;
            Some(lifetime)
        } else {
            None
        };

        Ok(Self {
            subscriber_process_identifier,
            object_type,
            instance,
            issue_confirmed_notifications,
            lifetime,
        })
    }

    /// Encode the service data of a SubscribeCOV request
    pub fn encode(&self, buffer: &mut Vec<u8>) -> EncodingResult<()> {
        encode_context_unsigned(buffer, 0, self.subscriber_process_identifier)?;
        encode_context_object_id(buffer, 1, self.object_type, self.instance)?;
        if let Some(confirmed) = self.issue_confirmed_notifications {
            encode_context_tag(buffer, 2, 1)?;
            buffer.push(if confirmed { 1 } else { 0 });
        }
        if let Some(lifetime) = self.lifetime {
            encode_context_unsigned(buffer, 3, lifetime)?;
        }
        Ok(())
    }
}

/// COV notification service data (confirmed and unconfirmed share it)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CovNotification {
    pub subscriber_process_identifier: u32,
    pub initiating_device_instance: u32,
    pub object_type: u16,
    pub instance: u32,
    /// Seconds left on the subscription, 0 = permanent
    pub time_remaining: u32,
    /// (property identifier, application-tagged encoded value) pairs
    pub values: Vec<(u32, Vec<u8>)>,
}

impl CovNotification {
    /// Encode the notification service data
    pub fn encode(&self, buffer: &mut Vec<u8>) -> EncodingResult<()> {
        encode_context_unsigned(buffer, 0, self.subscriber_process_identifier)?;
        encode_context_object_id(
            buffer,
            1,
            crate::object::ObjectType::Device as u16,
            self.initiating_device_instance,
        )?;
        encode_context_object_id(buffer, 2, self.object_type, self.instance)?;
        encode_context_unsigned(buffer, 3, self.time_remaining)?;
        encode_opening_tag(buffer, 4)?;
        for (property_identifier, value) in &self.values {
            encode_context_enumerated(buffer, 0, *property_identifier)?;
            encode_opening_tag(buffer, 2)?;
            buffer.extend_from_slice(value);
            encode_closing_tag(buffer, 2)?;
        }
        encode_closing_tag(buffer, 4)?;
        Ok(())
    }

    /// Decode a notification (subscriber side; used by the test suite)
    pub fn decode(data: &[u8]) -> EncodingResult<Self> {
        let mut pos = 0;

        let (subscriber_process_identifier, consumed) = decode_context_unsigned(data, 0)?;
        pos += consumed;
        let ((_, initiating_device_instance), consumed) = decode_context_object_id(&data[pos..], 1)?;
        pos += consumed;
        let ((object_type, instance), consumed) = decode_context_object_id(&data[pos..], 2)?;
        pos += consumed;
        let (time_remaining, consumed) = decode_context_unsigned(&data[pos..], 3)?;
        pos += consumed;

        if !is_opening_tag(&data[pos..], 4) {
            return Err(EncodingError::InvalidTag);
        }
        pos += 1;

        let mut values = Vec::new();
        while pos < data.len() && !is_closing_tag(&data[pos..], 4) {
            let (property_identifier, consumed) = decode_context_enumerated(&data[pos..], 0)?;
            pos += consumed;

            if !is_opening_tag(&data[pos..], 2) {
                return Err(EncodingError::InvalidTag);
            }
            pos += 1;

            let value_start = pos;
            while pos < data.len() && !is_closing_tag(&data[pos..], 2) {
                pos += skip_element(&data[pos..])?;
            }
            if pos >= data.len() {
                return Err(EncodingError::BufferUnderflow);
            }
            values.push((property_identifier, data[value_start..pos].to_vec()));
            pos += 1;
        }
        if pos >= data.len() {
            return Err(EncodingError::BufferUnderflow);
        }

        Ok(Self {
            subscriber_process_identifier,
            initiating_device_instance,
            object_type,
            instance,
            time_remaining,
            values,
        })
    }
}

/// One active COV subscription
#[derive(Debug, Clone)]
pub struct CovSubscription {
    /// Subscriber process identifier
    pub process_identifier: u32,
    /// Delivery address of the subscriber
    pub subscriber: SocketAddr,
    /// Monitored object
    pub object: ObjectIdentifier,
    /// Deliver confirmed notifications
    pub issue_confirmed_notifications: bool,
    /// Lifetime in seconds, 0 = permanent
    pub lifetime: u32,
    /// Remaining time in seconds
    pub time_remaining: u32,
    /// Last notified present value
    pub last_value: Option<PropertyValue>,
    /// Last notified status flags
    pub last_flags: Option<StatusFlags>,
}

impl CovSubscription {
    /// Check if the subscription has expired
    pub fn is_expired(&self) -> bool {
        self.lifetime > 0 && self.time_remaining == 0
    }
}

/// Active COV subscription bookkeeping
#[derive(Debug, Default)]
pub struct CovSubscriptions {
    subscriptions: Vec<CovSubscription>,
}

impl CovSubscriptions {
    /// Create an empty subscription set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a subscription. A resubscription by the same process
    /// and address for the same object restarts the lifetime.
    pub fn subscribe(&mut self, subscription: CovSubscription) {
        self.subscriptions.retain(|s| {
            !(s.subscriber == subscription.subscriber
                && s.process_identifier == subscription.process_identifier
                && s.object == subscription.object)
        });
        self.subscriptions.push(subscription);
    }

    /// Remove a subscription
    pub fn cancel(&mut self, subscriber: SocketAddr, process_identifier: u32, object: ObjectIdentifier) {
        self.subscriptions.retain(|s| {
            !(s.subscriber == subscriber
                && s.process_identifier == process_identifier
                && s.object == object)
        });
    }

    /// Mutable access to every live subscription for an object
    pub fn for_object_mut(
        &mut self,
        object: ObjectIdentifier,
    ) -> impl Iterator<Item = &mut CovSubscription> {
        self.subscriptions
            .iter_mut()
            .filter(move |s| s.object == object && !s.is_expired())
    }

    /// Count down lifetimes and drop expired subscriptions
    pub fn tick(&mut self, elapsed_seconds: u32) {
        for subscription in &mut self.subscriptions {
            if subscription.lifetime > 0 {
                subscription.time_remaining =
                    subscription.time_remaining.saturating_sub(elapsed_seconds);
            }
        }
        self.subscriptions.retain(|s| !s.is_expired());
    }

    /// Number of live subscriptions
    pub fn active_count(&self) -> usize {
        self.subscriptions.iter().filter(|s| !s.is_expired()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectType;

    #[test]
    fn test_read_property_request_round_trip() {
        let request = ReadPropertyRequest {
            object_type: ObjectType::AnalogInput as u16,
            instance: 1001,
            property_identifier: 85,
            property_array_index: None,
        };
        let mut buffer = Vec::new();
        request.encode(&mut buffer).unwrap();
        assert_eq!(ReadPropertyRequest::decode(&buffer).unwrap(), request);
    }

    #[test]
    fn test_read_property_ack_round_trip() {
        let mut value = Vec::new();
        crate::encoding::encode_real(&mut value, 25.5).unwrap();
        let ack = ReadPropertyAck {
            object_type: 0,
            instance: 1001,
            property_identifier: 85,
            property_array_index: None,
            property_value: value,
        };
        let mut buffer = Vec::new();
        ack.encode(&mut buffer).unwrap();
        assert_eq!(ReadPropertyAck::decode(&buffer).unwrap(), ack);
    }

    #[test]
    fn test_write_property_request_round_trip() {
        let mut value = Vec::new();
        crate::encoding::encode_real(&mut value, 42.0).unwrap();
        let request = WritePropertyRequest {
            object_type: ObjectType::AnalogOutput as u16,
            instance: 2001,
            property_identifier: 85,
            property_array_index: None,
            property_value: value,
            priority: Some(8),
        };
        let mut buffer = Vec::new();
        request.encode(&mut buffer).unwrap();
        assert_eq!(WritePropertyRequest::decode(&buffer).unwrap(), request);
    }

    #[test]
    fn test_write_property_priority_range() {
        let request = WritePropertyRequest {
            object_type: 1,
            instance: 1,
            property_identifier: 85,
            property_array_index: None,
            property_value: vec![0x44, 0x00, 0x00, 0x00, 0x00],
            priority: Some(17),
        };
        let mut buffer = Vec::new();
        request.encode(&mut buffer).unwrap();
        assert!(WritePropertyRequest::decode(&buffer).is_err());
    }

    #[test]
    fn test_rpm_request_round_trip() {
        let request = ReadPropertyMultipleRequest {
            specifications: vec![
                ReadAccessSpecification {
                    object_type: 0,
                    instance: 1001,
                    properties: vec![
                        PropertyReference {
                            property_identifier: 85,
                            property_array_index: None,
                        },
                        PropertyReference {
                            property_identifier: 111,
                            property_array_index: None,
                        },
                    ],
                },
                ReadAccessSpecification {
                    object_type: 8,
                    instance: 600001,
                    properties: vec![PropertyReference {
                        property_identifier: 76,
                        property_array_index: Some(0),
                    }],
                },
            ],
        };
        let mut buffer = Vec::new();
        request.encode(&mut buffer).unwrap();
        assert_eq!(ReadPropertyMultipleRequest::decode(&buffer).unwrap(), request);
    }

    #[test]
    fn test_who_is_matching() {
        let all = WhoIsRequest::default();
        assert!(all.matches(600001));

        let ranged = WhoIsRequest {
            device_instance_range_low_limit: Some(100),
            device_instance_range_high_limit: Some(200),
        };
        assert!(ranged.matches(150));
        assert!(!ranged.matches(600001));
    }

    #[test]
    fn test_who_is_round_trip() {
        let request = WhoIsRequest {
            device_instance_range_low_limit: Some(600001),
            device_instance_range_high_limit: Some(600001),
        };
        let mut buffer = Vec::new();
        request.encode(&mut buffer).unwrap();
        assert_eq!(WhoIsRequest::decode(&buffer).unwrap(), request);

        assert_eq!(WhoIsRequest::decode(&[]).unwrap(), WhoIsRequest::default());
    }

    #[test]
    fn test_i_am_round_trip() {
        let request = IAmRequest {
            device_instance: 600001,
            max_apdu_length_accepted: 1476,
            segmentation_supported: 3,
            vendor_identifier: 15,
        };
        let mut buffer = Vec::new();
        request.encode(&mut buffer).unwrap();
        assert_eq!(IAmRequest::decode(&buffer).unwrap(), request);
    }

    #[test]
    fn test_subscribe_cov_round_trip() {
        let request = SubscribeCovRequest {
            subscriber_process_identifier: 18,
            object_type: 0,
            instance: 1001,
            issue_confirmed_notifications: Some(false),
            lifetime: Some(300),
        };
        let mut buffer = Vec::new();
        request.encode(&mut buffer).unwrap();
        let decoded = SubscribeCovRequest::decode(&buffer).unwrap();
        assert_eq!(decoded, request);
        assert!(!decoded.is_cancellation());
    }

    #[test]
    fn test_subscribe_cov_cancellation() {
        let request = SubscribeCovRequest {
            subscriber_process_identifier: 18,
            object_type: 0,
            instance: 1001,
            issue_confirmed_notifications: None,
            lifetime: None,
        };
        let mut buffer = Vec::new();
        request.encode(&mut buffer).unwrap();
        assert!(SubscribeCovRequest::decode(&buffer).unwrap().is_cancellation());
    }

    #[test]
    fn test_cov_notification_round_trip() {
        let mut pv = Vec::new();
        crate::encoding::encode_real(&mut pv, 25.8).unwrap();
        let mut flags = Vec::new();
        crate::encoding::encode_bit_string(&mut flags, &[false, false, false, false]).unwrap();

        let notification = CovNotification {
            subscriber_process_identifier: 18,
            initiating_device_instance: 600001,
            object_type: 0,
            instance: 1001,
            time_remaining: 300,
            values: vec![(85, pv), (111, flags)],
        };
        let mut buffer = Vec::new();
        notification.encode(&mut buffer).unwrap();
        assert_eq!(CovNotification::decode(&buffer).unwrap(), notification);
    }

    #[test]
    fn test_subscription_lifecycle() {
        let mut subscriptions = CovSubscriptions::new();
        let subscriber: SocketAddr = "192.168.1.50:47808".parse().unwrap();
        let object = ObjectIdentifier::new(ObjectType::AnalogInput, 1001);

        subscriptions.subscribe(CovSubscription {
            process_identifier: 18,
            subscriber,
            object,
            issue_confirmed_notifications: false,
            lifetime: 10,
            time_remaining: 10,
            last_value: None,
            last_flags: None,
        });
        assert_eq!(subscriptions.active_count(), 1);

        // Resubscription replaces, not duplicates
        subscriptions.subscribe(CovSubscription {
            process_identifier: 18,
            subscriber,
            object,
            issue_confirmed_notifications: true,
            lifetime: 20,
            time_remaining: 20,
            last_value: None,
            last_flags: None,
        });
        assert_eq!(subscriptions.active_count(), 1);

        subscriptions.tick(20);
        assert_eq!(subscriptions.active_count(), 0);
    }

    #[test]
    fn test_cancel_subscription() {
        let mut subscriptions = CovSubscriptions::new();
        let subscriber: SocketAddr = "192.168.1.50:47808".parse().unwrap();
        let object = ObjectIdentifier::new(ObjectType::AnalogInput, 1001);

        subscriptions.subscribe(CovSubscription {
            process_identifier: 18,
            subscriber,
            object,
            issue_confirmed_notifications: false,
            lifetime: 0,
            time_remaining: 0,
            last_value: None,
            last_flags: None,
        });
        subscriptions.cancel(subscriber, 18, object);
        assert_eq!(subscriptions.active_count(), 0);
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(
            error_for(&ObjectError::InvalidValue("x".into())),
            (ErrorClass::Property, ErrorCode::ValueOutOfRange)
        );
        assert_eq!(
            error_for(&ObjectError::NotFound),
            (ErrorClass::Object, ErrorCode::UnknownObject)
        );
    }
}
