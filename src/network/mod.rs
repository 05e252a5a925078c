//! BACnet Network Layer Module
//!
//! Minimal NPDU handling for a non-routing, final-destination device. The
//! server unwraps incoming NPDUs to reach the APDU, ignores network-layer
//! messages and routed destinations for other networks, and wraps outgoing
//! APDUs in a local-network NPDU.

use thiserror::Error;

/// BACnet network layer protocol version
pub const NPDU_VERSION: u8 = 1;

const CONTROL_NETWORK_MESSAGE: u8 = 0x80;
const CONTROL_DESTINATION: u8 = 0x20;
const CONTROL_SOURCE: u8 = 0x08;
const CONTROL_EXPECTING_REPLY: u8 = 0x04;

/// Result type for network layer operations
pub type Result<T> = std::result::Result<T, NetworkError>;

/// Errors that can occur in network layer operations
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("NPDU too short")]
    Truncated,
    #[error("unsupported NPDU version {0}")]
    UnsupportedVersion(u8),
    #[error("network layer message (type {0}), not an APDU")]
    NetworkMessage(u8),
    #[error("NPDU routed to remote network {0}")]
    NotForUs(u16),
}

/// Decoded NPDU header information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NpduInfo {
    /// The sender expects a reply (confirmed request)
    pub expecting_reply: bool,
}

/// Unwrap an NPDU, returning header info and the APDU byte range.
///
/// Frames destined for a remote network (DNET other than the global
/// broadcast network 0xFFFF) are rejected since this device does not route.
pub fn unwrap_apdu(data: &[u8]) -> Result<(NpduInfo, &[u8])> {
    if data.len() < 2 {
        return Err(NetworkError::Truncated);
    }
    if data[0] != NPDU_VERSION {
        return Err(NetworkError::UnsupportedVersion(data[0]));
    }

    let control = data[1];
    let mut pos = 2;

    if control & CONTROL_DESTINATION != 0 {
        if data.len() < pos + 3 {
            return Err(NetworkError::Truncated);
        }
        let dnet = u16::from_be_bytes([data[pos], data[pos + 1]]);
        let dlen = data[pos + 2] as usize;
        pos += 3 + dlen;
        if dnet != 0xFFFF {
            return Err(NetworkError::NotForUs(dnet));
        }
    }

    if control & CONTROL_SOURCE != 0 {
        if data.len() < pos + 3 {
            return Err(NetworkError::Truncated);
        }
        let slen = data[pos + 2] as usize;
        pos += 3 + slen;
    }

    if control & CONTROL_DESTINATION != 0 {
        // Hop count follows the source information
        pos += 1;
    }

    if data.len() < pos {
        return Err(NetworkError::Truncated);
    }

    if control & CONTROL_NETWORK_MESSAGE != 0 {
        let message_type = data.get(pos).copied().unwrap_or(0);
        return Err(NetworkError::NetworkMessage(message_type));
    }

    Ok((
        NpduInfo {
            expecting_reply: control & CONTROL_EXPECTING_REPLY != 0,
        },
        &data[pos..],
    ))
}

/// Wrap an APDU in a local-network NPDU
pub fn wrap_apdu(apdu: &[u8], expecting_reply: bool) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(apdu.len() + 2);
    buffer.push(NPDU_VERSION);
    buffer.push(if expecting_reply { CONTROL_EXPECTING_REPLY } else { 0 });
    buffer.extend_from_slice(apdu);
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_unwrap() {
        let apdu = [0x10, 0x08];
        let npdu = wrap_apdu(&apdu, false);
        let (info, inner) = unwrap_apdu(&npdu).unwrap();
        assert!(!info.expecting_reply);
        assert_eq!(inner, apdu);
    }

    #[test]
    fn test_expecting_reply_flag() {
        let npdu = wrap_apdu(&[0x00], true);
        let (info, _) = unwrap_apdu(&npdu).unwrap();
        assert!(info.expecting_reply);
    }

    #[test]
    fn test_global_broadcast_destination_accepted() {
        // version, control(dest), DNET=0xFFFF, DLEN=0, hop count, APDU
        let npdu = [0x01, 0x20, 0xFF, 0xFF, 0x00, 0xFF, 0x10, 0x08];
        let (_, apdu) = unwrap_apdu(&npdu).unwrap();
        assert_eq!(apdu, &[0x10, 0x08]);
    }

    #[test]
    fn test_remote_network_rejected() {
        let npdu = [0x01, 0x20, 0x00, 0x05, 0x00, 0xFF, 0x10, 0x08];
        assert!(matches!(unwrap_apdu(&npdu), Err(NetworkError::NotForUs(5))));
    }

    #[test]
    fn test_network_message_rejected() {
        // Who-Is-Router-To-Network (0x00)
        let npdu = [0x01, 0x80, 0x00];
        assert!(matches!(unwrap_apdu(&npdu), Err(NetworkError::NetworkMessage(0))));
    }

    #[test]
    fn test_wrong_version_rejected() {
        assert!(matches!(
            unwrap_apdu(&[0x02, 0x00, 0x00]),
            Err(NetworkError::UnsupportedVersion(2))
        ));
    }
}
