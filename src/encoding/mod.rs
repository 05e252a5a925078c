//! BACnet Encoding and Decoding Utilities
//!
//! This module implements the subset of ASHRAE 135 clause 20 tagged-data
//! encoding that the server needs to parse incoming service requests and to
//! build responses and notifications.
//!
//! # Overview
//!
//! BACnet encodes every data element as tag-length-value. Application tags
//! identify the primitive type; context tags identify a field's position
//! inside a service-specific sequence; opening/closing tag pairs delimit
//! constructed values.
//!
//! Encoding functions append to a caller-supplied buffer. Decoding functions
//! take a byte slice and return the decoded value together with the number of
//! bytes consumed, so callers can walk a service data block field by field.

use thiserror::Error;

/// Result type for encoding operations
pub type Result<T> = std::result::Result<T, EncodingError>;

/// Errors that can occur during encoding/decoding operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodingError {
    /// Buffer underflow during decoding
    #[error("buffer underflow during decoding")]
    BufferUnderflow,
    /// Invalid tag number encountered
    #[error("invalid tag number encountered")]
    InvalidTag,
    /// Invalid length value
    #[error("invalid length value")]
    InvalidLength,
    /// Invalid encoding format
    #[error("invalid format: {0}")]
    InvalidFormat(String),
    /// Value out of valid range
    #[error("value out of valid range")]
    ValueOutOfRange,
}

/// BACnet application tag numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ApplicationTag {
    Null = 0,
    Boolean = 1,
    UnsignedInt = 2,
    SignedInt = 3,
    Real = 4,
    Double = 5,
    OctetString = 6,
    CharacterString = 7,
    BitString = 8,
    Enumerated = 9,
    Date = 10,
    Time = 11,
    ObjectIdentifier = 12,
}

impl TryFrom<u8> for ApplicationTag {
    type Error = EncodingError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(ApplicationTag::Null),
            1 => Ok(ApplicationTag::Boolean),
            2 => Ok(ApplicationTag::UnsignedInt),
            3 => Ok(ApplicationTag::SignedInt),
            4 => Ok(ApplicationTag::Real),
            5 => Ok(ApplicationTag::Double),
            6 => Ok(ApplicationTag::OctetString),
            7 => Ok(ApplicationTag::CharacterString),
            8 => Ok(ApplicationTag::BitString),
            9 => Ok(ApplicationTag::Enumerated),
            10 => Ok(ApplicationTag::Date),
            11 => Ok(ApplicationTag::Time),
            12 => Ok(ApplicationTag::ObjectIdentifier),
            _ => Err(EncodingError::InvalidTag),
        }
    }
}

/// Encode a BACnet application tag
pub fn encode_application_tag(
    buffer: &mut Vec<u8>,
    tag: ApplicationTag,
    length: usize,
) -> Result<()> {
    let tag_byte = if length < 5 {
        (tag as u8) << 4 | (length as u8)
    } else {
        (tag as u8) << 4 | 5
    };

    buffer.push(tag_byte);

    if length >= 5 {
        if length < 254 {
            buffer.push(length as u8);
        } else if length < 65536 {
            buffer.push(254);
            buffer.extend_from_slice(&(length as u16).to_be_bytes());
        } else {
            buffer.push(255);
            buffer.extend_from_slice(&(length as u32).to_be_bytes());
        }
    }

    Ok(())
}

/// Decode a BACnet application tag, returning (tag, length, bytes consumed)
pub fn decode_application_tag(data: &[u8]) -> Result<(ApplicationTag, usize, usize)> {
    if data.is_empty() {
        return Err(EncodingError::InvalidTag);
    }

    let tag_byte = data[0];
    if tag_byte & 0x08 != 0 {
        // Class bit set: context-specific, not an application tag
        return Err(EncodingError::InvalidTag);
    }
    let tag = ApplicationTag::try_from(tag_byte >> 4)?;
    let mut length = (tag_byte & 0x07) as usize;
    let mut consumed = 1;

    if length == 5 {
        if data.len() < 2 {
            return Err(EncodingError::BufferUnderflow);
        }

        let len_byte = data[1];
        consumed += 1;

        if len_byte < 254 {
            length = len_byte as usize;
        } else if len_byte == 254 {
            if data.len() < 4 {
                return Err(EncodingError::BufferUnderflow);
            }
            length = u16::from_be_bytes([data[2], data[3]]) as usize;
            consumed += 2;
        } else {
            if data.len() < 6 {
                return Err(EncodingError::BufferUnderflow);
            }
            length = u32::from_be_bytes([data[2], data[3], data[4], data[5]]) as usize;
            consumed += 4;
        }
    }

    Ok((tag, length, consumed))
}

/// Peek at the application tag of the next element without consuming it
pub fn peek_application_tag(data: &[u8]) -> Result<ApplicationTag> {
    if data.is_empty() {
        return Err(EncodingError::BufferUnderflow);
    }
    if data[0] & 0x08 != 0 {
        return Err(EncodingError::InvalidTag);
    }
    ApplicationTag::try_from(data[0] >> 4)
}

/// Encode a BACnet null value
pub fn encode_null(buffer: &mut Vec<u8>) -> Result<()> {
    encode_application_tag(buffer, ApplicationTag::Null, 0)
}

/// Encode a BACnet boolean value
pub fn encode_boolean(buffer: &mut Vec<u8>, value: bool) -> Result<()> {
    encode_application_tag(buffer, ApplicationTag::Boolean, if value { 1 } else { 0 })
}

/// Decode a BACnet boolean value
pub fn decode_boolean(data: &[u8]) -> Result<(bool, usize)> {
    let (tag, length, consumed) = decode_application_tag(data)?;

    if tag != ApplicationTag::Boolean {
        return Err(EncodingError::InvalidTag);
    }

    let value = match length {
        0 => false,
        1 => true,
        _ => return Err(EncodingError::InvalidLength),
    };

    Ok((value, consumed))
}

fn unsigned_content(value: u32) -> Vec<u8> {
    if value <= 0xFF {
        vec![value as u8]
    } else if value <= 0xFFFF {
        (value as u16).to_be_bytes().to_vec()
    } else if value <= 0xFF_FFFF {
        value.to_be_bytes()[1..].to_vec()
    } else {
        value.to_be_bytes().to_vec()
    }
}

fn unsigned_from_content(data: &[u8], length: usize) -> Result<u32> {
    if data.len() < length {
        return Err(EncodingError::BufferUnderflow);
    }
    let value = match length {
        1 => data[0] as u32,
        2 => u16::from_be_bytes([data[0], data[1]]) as u32,
        3 => u32::from_be_bytes([0, data[0], data[1], data[2]]),
        4 => u32::from_be_bytes([data[0], data[1], data[2], data[3]]),
        _ => return Err(EncodingError::InvalidLength),
    };
    Ok(value)
}

/// Encode a BACnet unsigned integer
pub fn encode_unsigned(buffer: &mut Vec<u8>, value: u32) -> Result<()> {
    let bytes = unsigned_content(value);
    encode_application_tag(buffer, ApplicationTag::UnsignedInt, bytes.len())?;
    buffer.extend_from_slice(&bytes);
    Ok(())
}

/// Decode a BACnet unsigned integer
pub fn decode_unsigned(data: &[u8]) -> Result<(u32, usize)> {
    let (tag, length, consumed) = decode_application_tag(data)?;

    if tag != ApplicationTag::UnsignedInt {
        return Err(EncodingError::InvalidTag);
    }

    let value = unsigned_from_content(&data[consumed..], length)?;
    Ok((value, consumed + length))
}

/// Encode a BACnet signed integer
pub fn encode_signed(buffer: &mut Vec<u8>, value: i32) -> Result<()> {
    let bytes = if (-128..=127).contains(&value) {
        vec![value as u8]
    } else if (-32768..=32767).contains(&value) {
        (value as i16).to_be_bytes().to_vec()
    } else if (-8_388_608..=8_388_607).contains(&value) {
        value.to_be_bytes()[1..].to_vec()
    } else {
        value.to_be_bytes().to_vec()
    };

    encode_application_tag(buffer, ApplicationTag::SignedInt, bytes.len())?;
    buffer.extend_from_slice(&bytes);
    Ok(())
}

/// Decode a BACnet signed integer
pub fn decode_signed(data: &[u8]) -> Result<(i32, usize)> {
    let (tag, length, mut consumed) = decode_application_tag(data)?;

    if tag != ApplicationTag::SignedInt {
        return Err(EncodingError::InvalidTag);
    }

    if data.len() < consumed + length {
        return Err(EncodingError::BufferUnderflow);
    }

    let value = match length {
        1 => data[consumed] as i8 as i32,
        2 => i16::from_be_bytes([data[consumed], data[consumed + 1]]) as i32,
        3 => {
            let sign_extend = if data[consumed] & 0x80 != 0 { 0xFF } else { 0x00 };
            i32::from_be_bytes([sign_extend, data[consumed], data[consumed + 1], data[consumed + 2]])
        }
        4 => i32::from_be_bytes([
            data[consumed],
            data[consumed + 1],
            data[consumed + 2],
            data[consumed + 3],
        ]),
        _ => return Err(EncodingError::InvalidLength),
    };

    consumed += length;
    Ok((value, consumed))
}

/// Encode a BACnet real (32-bit float) value
pub fn encode_real(buffer: &mut Vec<u8>, value: f32) -> Result<()> {
    encode_application_tag(buffer, ApplicationTag::Real, 4)?;
    buffer.extend_from_slice(&value.to_be_bytes());
    Ok(())
}

/// Decode a BACnet real (32-bit float) value
pub fn decode_real(data: &[u8]) -> Result<(f32, usize)> {
    let (tag, length, mut consumed) = decode_application_tag(data)?;

    if tag != ApplicationTag::Real {
        return Err(EncodingError::InvalidTag);
    }

    if length != 4 || data.len() < consumed + 4 {
        return Err(EncodingError::InvalidLength);
    }

    let value = f32::from_be_bytes([
        data[consumed],
        data[consumed + 1],
        data[consumed + 2],
        data[consumed + 3],
    ]);

    consumed += 4;
    Ok((value, consumed))
}

/// Encode a BACnet double (64-bit float) value
pub fn encode_double(buffer: &mut Vec<u8>, value: f64) -> Result<()> {
    encode_application_tag(buffer, ApplicationTag::Double, 8)?;
    buffer.extend_from_slice(&value.to_be_bytes());
    Ok(())
}

/// Decode a BACnet double (64-bit float) value
pub fn decode_double(data: &[u8]) -> Result<(f64, usize)> {
    let (tag, length, mut consumed) = decode_application_tag(data)?;

    if tag != ApplicationTag::Double {
        return Err(EncodingError::InvalidTag);
    }

    if length != 8 || data.len() < consumed + 8 {
        return Err(EncodingError::InvalidLength);
    }

    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[consumed..consumed + 8]);
    let value = f64::from_be_bytes(bytes);

    consumed += 8;
    Ok((value, consumed))
}

/// Encode a BACnet character string (ANSI X3.4 / UTF-8 character set)
pub fn encode_character_string(buffer: &mut Vec<u8>, value: &str) -> Result<()> {
    let string_bytes = value.as_bytes();
    encode_application_tag(buffer, ApplicationTag::CharacterString, string_bytes.len() + 1)?;
    buffer.push(0); // Character set encoding (0 = ANSI X3.4)
    buffer.extend_from_slice(string_bytes);
    Ok(())
}

/// Decode a BACnet character string
pub fn decode_character_string(data: &[u8]) -> Result<(String, usize)> {
    let (tag, length, mut consumed) = decode_application_tag(data)?;

    if tag != ApplicationTag::CharacterString {
        return Err(EncodingError::InvalidTag);
    }

    if length == 0 || data.len() < consumed + length {
        return Err(EncodingError::BufferUnderflow);
    }

    // Skip character set encoding byte
    consumed += 1;

    let string_data = &data[consumed..consumed + length - 1];
    let value = String::from_utf8(string_data.to_vec())
        .map_err(|_| EncodingError::InvalidFormat("invalid UTF-8 string".to_string()))?;

    consumed += length - 1;
    Ok((value, consumed))
}

/// Encode a BACnet enumerated value
pub fn encode_enumerated(buffer: &mut Vec<u8>, value: u32) -> Result<()> {
    let bytes = unsigned_content(value);
    encode_application_tag(buffer, ApplicationTag::Enumerated, bytes.len())?;
    buffer.extend_from_slice(&bytes);
    Ok(())
}

/// Decode a BACnet enumerated value
pub fn decode_enumerated(data: &[u8]) -> Result<(u32, usize)> {
    let (tag, length, consumed) = decode_application_tag(data)?;

    if tag != ApplicationTag::Enumerated {
        return Err(EncodingError::InvalidTag);
    }

    let value = unsigned_from_content(&data[consumed..], length)?;
    Ok((value, consumed + length))
}

/// Encode a BACnet bit string
pub fn encode_bit_string(buffer: &mut Vec<u8>, bits: &[bool]) -> Result<()> {
    let byte_count = bits.len().div_ceil(8);
    let unused_bits = if bits.len() % 8 == 0 { 0 } else { 8 - (bits.len() % 8) };

    encode_application_tag(buffer, ApplicationTag::BitString, byte_count + 1)?;
    buffer.push(unused_bits as u8);

    let mut current_byte = 0u8;
    let mut bit_pos = 0;

    for &bit in bits {
        if bit {
            current_byte |= 1 << (7 - bit_pos);
        }
        bit_pos += 1;

        if bit_pos == 8 {
            buffer.push(current_byte);
            current_byte = 0;
            bit_pos = 0;
        }
    }

    if bit_pos > 0 {
        buffer.push(current_byte);
    }

    Ok(())
}

/// Decode a BACnet bit string
pub fn decode_bit_string(data: &[u8]) -> Result<(Vec<bool>, usize)> {
    let (tag, length, mut consumed) = decode_application_tag(data)?;

    if tag != ApplicationTag::BitString {
        return Err(EncodingError::InvalidTag);
    }

    if length == 0 || data.len() < consumed + length {
        return Err(EncodingError::BufferUnderflow);
    }

    let unused_bits = data[consumed] as usize;
    consumed += 1;

    if unused_bits > 7 {
        return Err(EncodingError::InvalidFormat("invalid unused bits count".to_string()));
    }

    let mut bits = Vec::new();
    let byte_count = length - 1;

    for i in 0..byte_count {
        let byte_val = data[consumed + i];
        let bits_in_byte = if i == byte_count - 1 { 8 - unused_bits } else { 8 };

        for bit_pos in 0..bits_in_byte {
            bits.push((byte_val & (1 << (7 - bit_pos))) != 0);
        }
    }

    consumed += byte_count;
    Ok((bits, consumed))
}

/// Encode a BACnet object identifier
pub fn encode_object_identifier(buffer: &mut Vec<u8>, object_type: u16, instance: u32) -> Result<()> {
    if object_type > 0x3FF || instance > 0x3F_FFFF {
        return Err(EncodingError::ValueOutOfRange);
    }

    let object_id = ((object_type as u32) << 22) | instance;
    encode_application_tag(buffer, ApplicationTag::ObjectIdentifier, 4)?;
    buffer.extend_from_slice(&object_id.to_be_bytes());
    Ok(())
}

/// Decode a BACnet object identifier
pub fn decode_object_identifier(data: &[u8]) -> Result<((u16, u32), usize)> {
    let (tag, length, mut consumed) = decode_application_tag(data)?;

    if tag != ApplicationTag::ObjectIdentifier {
        return Err(EncodingError::InvalidTag);
    }

    if length != 4 || data.len() < consumed + 4 {
        return Err(EncodingError::InvalidLength);
    }

    let object_id = u32::from_be_bytes([
        data[consumed],
        data[consumed + 1],
        data[consumed + 2],
        data[consumed + 3],
    ]);

    let object_type = (object_id >> 22) as u16;
    let instance = object_id & 0x3F_FFFF;

    consumed += 4;
    Ok(((object_type, instance), consumed))
}

/// Context-specific tag encoding/decoding
pub mod context {
    use super::*;

    /// Encode a context-specific tag
    pub fn encode_context_tag(buffer: &mut Vec<u8>, tag_number: u8, length: usize) -> Result<()> {
        if tag_number > 14 {
            return Err(EncodingError::ValueOutOfRange);
        }

        let tag_byte = if length < 5 {
            0x08 | (tag_number << 4) | (length as u8)
        } else {
            0x08 | (tag_number << 4) | 5
        };

        buffer.push(tag_byte);

        if length >= 5 {
            if length < 254 {
                buffer.push(length as u8);
            } else if length < 65536 {
                buffer.push(254);
                buffer.extend_from_slice(&(length as u16).to_be_bytes());
            } else {
                buffer.push(255);
                buffer.extend_from_slice(&(length as u32).to_be_bytes());
            }
        }

        Ok(())
    }

    /// Decode a context-specific tag, returning (tag number, length, bytes consumed)
    pub fn decode_context_tag(data: &[u8]) -> Result<(u8, usize, usize)> {
        if data.is_empty() {
            return Err(EncodingError::BufferUnderflow);
        }

        let tag_byte = data[0];
        if (tag_byte & 0x08) == 0 {
            return Err(EncodingError::InvalidTag);
        }

        let tag_number = (tag_byte >> 4) & 0x0F;
        let mut length = (tag_byte & 0x07) as usize;
        let mut consumed = 1;

        if length == 6 || length == 7 {
            // Opening/closing tags carry no primitive content
            return Err(EncodingError::InvalidTag);
        }

        if length == 5 {
            if data.len() < 2 {
                return Err(EncodingError::BufferUnderflow);
            }

            let len_byte = data[1];
            consumed += 1;

            if len_byte < 254 {
                length = len_byte as usize;
            } else if len_byte == 254 {
                if data.len() < 4 {
                    return Err(EncodingError::BufferUnderflow);
                }
                length = u16::from_be_bytes([data[2], data[3]]) as usize;
                consumed += 2;
            } else {
                if data.len() < 6 {
                    return Err(EncodingError::BufferUnderflow);
                }
                length = u32::from_be_bytes([data[2], data[3], data[4], data[5]]) as usize;
                consumed += 4;
            }
        }

        Ok((tag_number, length, consumed))
    }

    /// Encode opening tag for constructed data
    pub fn encode_opening_tag(buffer: &mut Vec<u8>, tag_number: u8) -> Result<()> {
        if tag_number > 14 {
            return Err(EncodingError::ValueOutOfRange);
        }
        buffer.push(0x0E | (tag_number << 4));
        Ok(())
    }

    /// Encode closing tag for constructed data
    pub fn encode_closing_tag(buffer: &mut Vec<u8>, tag_number: u8) -> Result<()> {
        if tag_number > 14 {
            return Err(EncodingError::ValueOutOfRange);
        }
        buffer.push(0x0F | (tag_number << 4));
        Ok(())
    }

    /// Check whether the next byte is the opening tag for `tag_number`
    pub fn is_opening_tag(data: &[u8], tag_number: u8) -> bool {
        !data.is_empty() && data[0] == (0x0E | (tag_number << 4))
    }

    /// Check whether the next byte is the closing tag for `tag_number`
    pub fn is_closing_tag(data: &[u8], tag_number: u8) -> bool {
        !data.is_empty() && data[0] == (0x0F | (tag_number << 4))
    }

    /// Check whether the next element is a context tag with the given number
    pub fn is_context_tag(data: &[u8], tag_number: u8) -> bool {
        match decode_context_tag(data) {
            Ok((number, _, _)) => number == tag_number,
            Err(_) => false,
        }
    }

    /// Encode an unsigned integer with a context-specific tag
    pub fn encode_context_unsigned(buffer: &mut Vec<u8>, tag_number: u8, value: u32) -> Result<()> {
        let content = super::unsigned_content(value);
        encode_context_tag(buffer, tag_number, content.len())?;
        buffer.extend_from_slice(&content);
        Ok(())
    }

    /// Decode an unsigned integer expected under a specific context tag
    pub fn decode_context_unsigned(data: &[u8], tag_number: u8) -> Result<(u32, usize)> {
        let (number, length, consumed) = decode_context_tag(data)?;
        if number != tag_number {
            return Err(EncodingError::InvalidTag);
        }
        let value = super::unsigned_from_content(&data[consumed..], length)?;
        Ok((value, consumed + length))
    }

    /// Encode an enumerated value with a context-specific tag
    pub fn encode_context_enumerated(buffer: &mut Vec<u8>, tag_number: u8, value: u32) -> Result<()> {
        encode_context_unsigned(buffer, tag_number, value)
    }

    /// Decode an enumerated value expected under a specific context tag
    pub fn decode_context_enumerated(data: &[u8], tag_number: u8) -> Result<(u32, usize)> {
        decode_context_unsigned(data, tag_number)
    }

    /// Encode an object identifier with a context-specific tag
    pub fn encode_context_object_id(
        buffer: &mut Vec<u8>,
        tag_number: u8,
        object_type: u16,
        instance: u32,
    ) -> Result<()> {
        if object_type > 0x3FF || instance > 0x3F_FFFF {
            return Err(EncodingError::ValueOutOfRange);
        }
        let object_id = ((object_type as u32) << 22) | instance;
        encode_context_tag(buffer, tag_number, 4)?;
        buffer.extend_from_slice(&object_id.to_be_bytes());
        Ok(())
    }

    /// Decode an object identifier expected under a specific context tag
    pub fn decode_context_object_id(data: &[u8], tag_number: u8) -> Result<((u16, u32), usize)> {
        let (number, length, consumed) = decode_context_tag(data)?;
        if number != tag_number {
            return Err(EncodingError::InvalidTag);
        }
        if length != 4 || data.len() < consumed + 4 {
            return Err(EncodingError::InvalidLength);
        }
        let object_id = u32::from_be_bytes([
            data[consumed],
            data[consumed + 1],
            data[consumed + 2],
            data[consumed + 3],
        ]);
        Ok((((object_id >> 22) as u16, object_id & 0x3F_FFFF), consumed + 4))
    }

    /// Skip one element (primitive or constructed) and return the bytes consumed
    pub fn skip_element(data: &[u8]) -> Result<usize> {
        if data.is_empty() {
            return Err(EncodingError::BufferUnderflow);
        }

        let tag_byte = data[0];
        let is_context = tag_byte & 0x08 != 0;

        if is_context && (tag_byte & 0x07) == 6 {
            // Constructed element: skip to matching closing tag
            let tag_number = (tag_byte >> 4) & 0x0F;
            let mut pos = 1;
            let mut depth = 1;
            while pos < data.len() {
                if is_opening_tag(&data[pos..], tag_number) {
                    depth += 1;
                    pos += 1;
                } else if is_closing_tag(&data[pos..], tag_number) {
                    depth -= 1;
                    pos += 1;
                    if depth == 0 {
                        return Ok(pos);
                    }
                } else {
                    pos += skip_element(&data[pos..])?;
                }
            }
            return Err(EncodingError::BufferUnderflow);
        }

        let (_, length, consumed) = if is_context {
            decode_context_tag(data)?
        } else {
            let (tag, length, consumed) = decode_application_tag(data)?;
            // Booleans carry their value in the length field
            if tag == ApplicationTag::Boolean {
                return Ok(consumed);
            }
            (0, length, consumed)
        };

        if data.len() < consumed + length {
            return Err(EncodingError::BufferUnderflow);
        }
        Ok(consumed + length)
    }
}

#[cfg(test)]
mod tests {
    use super::context::*;
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_unsigned_round_trip() {
        for value in [0u32, 1, 255, 256, 65535, 65536, 0xFF_FFFF, u32::MAX] {
            let mut buffer = Vec::new();
            encode_unsigned(&mut buffer, value).unwrap();
            let (decoded, consumed) = decode_unsigned(&buffer).unwrap();
            assert_eq!(decoded, value);
            assert_eq!(consumed, buffer.len());
        }
    }

    #[test]
    fn test_real_round_trip() {
        let mut buffer = Vec::new();
        encode_real(&mut buffer, 25.5).unwrap();
        let (decoded, consumed) = decode_real(&buffer).unwrap();
        assert_eq!(decoded, 25.5);
        assert_eq!(consumed, 5);
    }

    #[test]
    fn test_character_string_round_trip() {
        let mut buffer = Vec::new();
        encode_character_string(&mut buffer, "Space Temp T1").unwrap();
        let (decoded, _) = decode_character_string(&buffer).unwrap();
        assert_eq!(decoded, "Space Temp T1");
    }

    #[test]
    fn test_bit_string_four_bits() {
        let mut buffer = Vec::new();
        encode_bit_string(&mut buffer, &[false, true, false, true]).unwrap();
        let (decoded, _) = decode_bit_string(&buffer).unwrap();
        assert_eq!(decoded, vec![false, true, false, true]);
    }

    #[test]
    fn test_object_identifier_round_trip() {
        let mut buffer = Vec::new();
        encode_object_identifier(&mut buffer, 0, 1001).unwrap();
        let ((object_type, instance), consumed) = decode_object_identifier(&buffer).unwrap();
        assert_eq!(object_type, 0);
        assert_eq!(instance, 1001);
        assert_eq!(consumed, 5);
    }

    #[test]
    fn test_object_identifier_range_check() {
        let mut buffer = Vec::new();
        assert!(matches!(
            encode_object_identifier(&mut buffer, 0x400, 1),
            Err(EncodingError::ValueOutOfRange)
        ));
    }

    #[test]
    fn test_context_unsigned() {
        let mut buffer = Vec::new();
        encode_context_unsigned(&mut buffer, 3, 120).unwrap();
        let (value, consumed) = decode_context_unsigned(&buffer, 3).unwrap();
        assert_eq!(value, 120);
        assert_eq!(consumed, buffer.len());

        // Wrong tag number is rejected
        assert!(decode_context_unsigned(&buffer, 1).is_err());
    }

    #[test]
    fn test_application_tag_rejects_context_class() {
        // 0x09 is context tag 0, length 1
        assert!(decode_application_tag(&[0x09, 0x01]).is_err());
    }

    #[test]
    fn test_skip_constructed_element() {
        let mut buffer = Vec::new();
        encode_opening_tag(&mut buffer, 3).unwrap();
        encode_real(&mut buffer, 1.0).unwrap();
        encode_character_string(&mut buffer, "x").unwrap();
        encode_closing_tag(&mut buffer, 3).unwrap();
        buffer.push(0xAA); // trailing data must remain unconsumed

        let consumed = skip_element(&buffer).unwrap();
        assert_eq!(consumed, buffer.len() - 1);
    }

    proptest! {
        #[test]
        fn prop_unsigned_round_trip(value in any::<u32>()) {
            let mut buffer = Vec::new();
            encode_unsigned(&mut buffer, value).unwrap();
            let (decoded, consumed) = decode_unsigned(&buffer).unwrap();
            prop_assert_eq!(decoded, value);
            prop_assert_eq!(consumed, buffer.len());
        }

        #[test]
        fn prop_double_round_trip(value in any::<f64>()) {
            let mut buffer = Vec::new();
            encode_double(&mut buffer, value).unwrap();
            let (decoded, consumed) = decode_double(&buffer).unwrap();
            if value.is_nan() {
                prop_assert!(decoded.is_nan());
            } else {
                prop_assert_eq!(decoded, value);
            }
            prop_assert_eq!(consumed, buffer.len());
        }
    }
}
