//! BACnet Application Layer Module
//!
//! Application Protocol Data Unit (APDU) forms and their codec. The server
//! answers confirmed requests with SimpleACK / ComplexACK / Error / Reject /
//! Abort PDUs and emits unconfirmed requests for I-Am and COV notifications.
//!
//! Segmented transactions are not supported: the device announces
//! no-segmentation and aborts incoming segmented requests.

use thiserror::Error;

use crate::encoding::{decode_enumerated, encode_enumerated};

/// Result type for application layer operations
pub type Result<T> = std::result::Result<T, ApplicationError>;

/// Errors that can occur in application layer operations
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// Invalid APDU format
    #[error("invalid APDU: {0}")]
    InvalidApdu(String),
    /// Unsupported APDU type
    #[error("unsupported APDU type")]
    UnsupportedApduType,
}

/// APDU types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ApduType {
    ConfirmedRequest = 0,
    UnconfirmedRequest = 1,
    SimpleAck = 2,
    ComplexAck = 3,
    SegmentAck = 4,
    Error = 5,
    Reject = 6,
    Abort = 7,
}

/// Maximum APDU size that can be accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxApduSize {
    Up50 = 0,
    Up128 = 1,
    Up206 = 2,
    Up480 = 3,
    Up1024 = 4,
    Up1476 = 5,
}

impl MaxApduSize {
    /// Get the actual size in bytes
    pub fn size(&self) -> usize {
        match self {
            MaxApduSize::Up50 => 50,
            MaxApduSize::Up128 => 128,
            MaxApduSize::Up206 => 206,
            MaxApduSize::Up480 => 480,
            MaxApduSize::Up1024 => 1024,
            MaxApduSize::Up1476 => 1476,
        }
    }

    fn from_nibble(value: u8) -> Self {
        match value & 0x0F {
            0 => MaxApduSize::Up50,
            1 => MaxApduSize::Up128,
            2 => MaxApduSize::Up206,
            3 => MaxApduSize::Up480,
            4 => MaxApduSize::Up1024,
            _ => MaxApduSize::Up1476,
        }
    }
}

/// Application Protocol Data Unit
#[derive(Debug, Clone)]
pub enum Apdu {
    /// Confirmed service request
    ConfirmedRequest {
        segmented: bool,
        max_response_size: MaxApduSize,
        invoke_id: u8,
        service_choice: u8,
        service_data: Vec<u8>,
    },

    /// Unconfirmed service request
    UnconfirmedRequest {
        service_choice: u8,
        service_data: Vec<u8>,
    },

    /// Simple acknowledgment
    SimpleAck { invoke_id: u8, service_choice: u8 },

    /// Complex acknowledgment
    ComplexAck {
        invoke_id: u8,
        service_choice: u8,
        service_data: Vec<u8>,
    },

    /// Error PDU; class and code are carried as application-tagged
    /// enumerated values
    Error {
        invoke_id: u8,
        service_choice: u8,
        error_class: u32,
        error_code: u32,
    },

    /// Reject PDU
    Reject { invoke_id: u8, reject_reason: u8 },

    /// Abort PDU
    Abort {
        server: bool,
        invoke_id: u8,
        abort_reason: u8,
    },
}

impl Apdu {
    /// Encode APDU to bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::new();

        match self {
            Apdu::ConfirmedRequest {
                segmented: _,
                max_response_size,
                invoke_id,
                service_choice,
                service_data,
            } => {
                buffer.push((ApduType::ConfirmedRequest as u8) << 4);
                buffer.push(*max_response_size as u8);
                buffer.push(*invoke_id);
                buffer.push(*service_choice);
                buffer.extend_from_slice(service_data);
            }

            Apdu::UnconfirmedRequest {
                service_choice,
                service_data,
            } => {
                buffer.push((ApduType::UnconfirmedRequest as u8) << 4);
                buffer.push(*service_choice);
                buffer.extend_from_slice(service_data);
            }

            Apdu::SimpleAck {
                invoke_id,
                service_choice,
            } => {
                buffer.push((ApduType::SimpleAck as u8) << 4);
                buffer.push(*invoke_id);
                buffer.push(*service_choice);
            }

            Apdu::ComplexAck {
                invoke_id,
                service_choice,
                service_data,
            } => {
                buffer.push((ApduType::ComplexAck as u8) << 4);
                buffer.push(*invoke_id);
                buffer.push(*service_choice);
                buffer.extend_from_slice(service_data);
            }

            Apdu::Error {
                invoke_id,
                service_choice,
                error_class,
                error_code,
            } => {
                buffer.push((ApduType::Error as u8) << 4);
                buffer.push(*invoke_id);
                buffer.push(*service_choice);
                // Infallible: enumerated encoding into a Vec cannot fail
                let _ = encode_enumerated(&mut buffer, *error_class);
                let _ = encode_enumerated(&mut buffer, *error_code);
            }

            Apdu::Reject {
                invoke_id,
                reject_reason,
            } => {
                buffer.push((ApduType::Reject as u8) << 4);
                buffer.push(*invoke_id);
                buffer.push(*reject_reason);
            }

            Apdu::Abort {
                server,
                invoke_id,
                abort_reason,
            } => {
                let mut pdu_type = (ApduType::Abort as u8) << 4;
                if *server {
                    pdu_type |= 0x01;
                }
                buffer.push(pdu_type);
                buffer.push(*invoke_id);
                buffer.push(*abort_reason);
            }
        }

        buffer
    }

    /// Decode APDU from bytes
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(ApplicationError::InvalidApdu("empty APDU".to_string()));
        }

        let pdu_type_byte = data[0];
        match (pdu_type_byte >> 4) & 0x0F {
            0 => {
                if data.len() < 4 {
                    return Err(ApplicationError::InvalidApdu(
                        "confirmed request too short".to_string(),
                    ));
                }

                let segmented = (pdu_type_byte & 0x08) != 0;
                let max_response_size = MaxApduSize::from_nibble(data[1]);
                let invoke_id = data[2];

                let mut pos = 3;
                if segmented {
                    // Sequence number and window size precede the choice
                    pos += 2;
                    if pos >= data.len() {
                        return Err(ApplicationError::InvalidApdu(
                            "segmented request too short".to_string(),
                        ));
                    }
                }

                let service_choice = data[pos];
                let service_data = data[pos + 1..].to_vec();

                Ok(Apdu::ConfirmedRequest {
                    segmented,
                    max_response_size,
                    invoke_id,
                    service_choice,
                    service_data,
                })
            }

            1 => {
                if data.len() < 2 {
                    return Err(ApplicationError::InvalidApdu(
                        "unconfirmed request too short".to_string(),
                    ));
                }

                Ok(Apdu::UnconfirmedRequest {
                    service_choice: data[1],
                    service_data: data[2..].to_vec(),
                })
            }

            2 => {
                if data.len() < 3 {
                    return Err(ApplicationError::InvalidApdu("SimpleAck too short".to_string()));
                }

                Ok(Apdu::SimpleAck {
                    invoke_id: data[1],
                    service_choice: data[2],
                })
            }

            3 => {
                if data.len() < 3 {
                    return Err(ApplicationError::InvalidApdu("ComplexAck too short".to_string()));
                }

                Ok(Apdu::ComplexAck {
                    invoke_id: data[1],
                    service_choice: data[2],
                    service_data: data[3..].to_vec(),
                })
            }

            5 => {
                if data.len() < 5 {
                    return Err(ApplicationError::InvalidApdu("Error PDU too short".to_string()));
                }

                let invoke_id = data[1];
                let service_choice = data[2];
                let mut pos = 3;
                let (error_class, consumed) = decode_enumerated(&data[pos..])
                    .map_err(|e| ApplicationError::InvalidApdu(e.to_string()))?;
                pos += consumed;
                let (error_code, _) = decode_enumerated(&data[pos..])
                    .map_err(|e| ApplicationError::InvalidApdu(e.to_string()))?;

                Ok(Apdu::Error {
                    invoke_id,
                    service_choice,
                    error_class,
                    error_code,
                })
            }

            6 => {
                if data.len() < 3 {
                    return Err(ApplicationError::InvalidApdu("Reject PDU too short".to_string()));
                }

                Ok(Apdu::Reject {
                    invoke_id: data[1],
                    reject_reason: data[2],
                })
            }

            7 => {
                if data.len() < 3 {
                    return Err(ApplicationError::InvalidApdu("Abort PDU too short".to_string()));
                }

                Ok(Apdu::Abort {
                    server: (pdu_type_byte & 0x01) != 0,
                    invoke_id: data[1],
                    abort_reason: data[2],
                })
            }

            // SegmentAck (4) is only meaningful for segmented transactions
            _ => Err(ApplicationError::UnsupportedApduType),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmed_request_round_trip() {
        let apdu = Apdu::ConfirmedRequest {
            segmented: false,
            max_response_size: MaxApduSize::Up1476,
            invoke_id: 123,
            service_choice: 12, // ReadProperty
            service_data: vec![0x0C, 0x02, 0x00, 0x00, 0x08, 0x19, 0x55],
        };

        let encoded = apdu.encode();
        match Apdu::decode(&encoded).unwrap() {
            Apdu::ConfirmedRequest {
                invoke_id,
                service_choice,
                service_data,
                ..
            } => {
                assert_eq!(invoke_id, 123);
                assert_eq!(service_choice, 12);
                assert_eq!(service_data, vec![0x0C, 0x02, 0x00, 0x00, 0x08, 0x19, 0x55]);
            }
            other => panic!("expected ConfirmedRequest, got {:?}", other),
        }
    }

    #[test]
    fn test_segmented_flag_detected() {
        // Type 0 with segmented bit, max info, invoke id, seq, window, choice
        let raw = [0x08, 0x05, 0x01, 0x00, 0x01, 0x0C, 0xAA];
        match Apdu::decode(&raw).unwrap() {
            Apdu::ConfirmedRequest {
                segmented,
                service_choice,
                ..
            } => {
                assert!(segmented);
                assert_eq!(service_choice, 0x0C);
            }
            other => panic!("expected ConfirmedRequest, got {:?}", other),
        }
    }

    #[test]
    fn test_error_pdu_round_trip() {
        let apdu = Apdu::Error {
            invoke_id: 7,
            service_choice: 15,
            error_class: 2,  // property
            error_code: 37,  // value-out-of-range
        };

        let encoded = apdu.encode();
        match Apdu::decode(&encoded).unwrap() {
            Apdu::Error {
                invoke_id,
                error_class,
                error_code,
                ..
            } => {
                assert_eq!(invoke_id, 7);
                assert_eq!(error_class, 2);
                assert_eq!(error_code, 37);
            }
            other => panic!("expected Error, got {:?}", other),
        }
    }

    #[test]
    fn test_simple_ack_round_trip() {
        let encoded = Apdu::SimpleAck {
            invoke_id: 42,
            service_choice: 15,
        }
        .encode();
        assert_eq!(encoded, vec![0x20, 42, 15]);
    }

    #[test]
    fn test_empty_apdu_rejected() {
        assert!(Apdu::decode(&[]).is_err());
    }
}
