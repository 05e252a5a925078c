//! BACnet/IP Data Link Implementation
//!
//! BACnet Virtual Link Layer (BVLL, Annex J) framing and the async UDP
//! transport. Every frame starts with the BVLL type octet 0x81, a function
//! code and a two-byte length covering the whole frame.
//!
//! The transport binds the configured device address, joins nothing and
//! routes nothing; broadcasts go to the subnet's directed broadcast address.

use std::io;
use std::net::{SocketAddr, SocketAddrV4};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use super::{DataLinkError, Result};

/// BVLL type octet for BACnet/IP
pub const BVLL_TYPE_BACNET_IP: u8 = 0x81;

/// BVLC function codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BvlcFunction {
    BvlcResult = 0x00,
    WriteBroadcastDistributionTable = 0x01,
    ReadBroadcastDistributionTable = 0x02,
    ForwardedNpdu = 0x04,
    RegisterForeignDevice = 0x05,
    DistributeBroadcastToNetwork = 0x09,
    OriginalUnicastNpdu = 0x0A,
    OriginalBroadcastNpdu = 0x0B,
}

impl TryFrom<u8> for BvlcFunction {
    type Error = DataLinkError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(BvlcFunction::BvlcResult),
            0x01 => Ok(BvlcFunction::WriteBroadcastDistributionTable),
            0x02 => Ok(BvlcFunction::ReadBroadcastDistributionTable),
            0x04 => Ok(BvlcFunction::ForwardedNpdu),
            0x05 => Ok(BvlcFunction::RegisterForeignDevice),
            0x09 => Ok(BvlcFunction::DistributeBroadcastToNetwork),
            0x0A => Ok(BvlcFunction::OriginalUnicastNpdu),
            0x0B => Ok(BvlcFunction::OriginalBroadcastNpdu),
            other => Err(DataLinkError::UnknownFunction(other)),
        }
    }
}

/// BVLL frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BvlcHeader {
    pub function: BvlcFunction,
    pub length: u16,
}

impl BvlcHeader {
    /// Create a header for a frame whose payload is `payload_len` bytes
    pub fn new(function: BvlcFunction, payload_len: usize) -> Self {
        Self {
            function,
            length: (payload_len + 4) as u16,
        }
    }

    /// Encode the four header bytes
    pub fn encode(&self) -> [u8; 4] {
        let length = self.length.to_be_bytes();
        [BVLL_TYPE_BACNET_IP, self.function as u8, length[0], length[1]]
    }

    /// Decode a header from the start of a frame
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(DataLinkError::Truncated);
        }
        if data[0] != BVLL_TYPE_BACNET_IP {
            return Err(DataLinkError::NotBvll(data[0]));
        }
        let function = BvlcFunction::try_from(data[1])?;
        let length = u16::from_be_bytes([data[2], data[3]]);
        Ok(Self { function, length })
    }
}

/// Extract the NPDU from a received BVLL frame.
///
/// Original unicast and broadcast frames carry the NPDU right after the
/// header; a Forwarded-NPDU (relayed by a BBMD) carries the originating
/// address first. BVLC control messages carry no NPDU and are reported as
/// such so the caller can ignore them.
pub fn extract_npdu(frame: &[u8]) -> Result<&[u8]> {
    let header = BvlcHeader::decode(frame)?;
    if header.length as usize != frame.len() {
        return Err(DataLinkError::LengthMismatch {
            field: header.length,
            actual: frame.len(),
        });
    }
    match header.function {
        BvlcFunction::OriginalUnicastNpdu | BvlcFunction::OriginalBroadcastNpdu => Ok(&frame[4..]),
        BvlcFunction::ForwardedNpdu => {
            // Six bytes of originating B/IP address precede the NPDU
            if frame.len() < 10 {
                return Err(DataLinkError::Truncated);
            }
            Ok(&frame[10..])
        }
        function => Err(DataLinkError::ControlMessage(function)),
    }
}

/// Frame an NPDU for transmission
pub fn frame_npdu(function: BvlcFunction, npdu: &[u8]) -> Vec<u8> {
    let header = BvlcHeader::new(function, npdu.len());
    let mut frame = Vec::with_capacity(npdu.len() + 4);
    frame.extend_from_slice(&header.encode());
    frame.extend_from_slice(npdu);
    frame
}

/// Async BACnet/IP UDP transport
#[derive(Debug)]
pub struct BipTransport {
    socket: UdpSocket,
    broadcast: SocketAddrV4,
}

impl BipTransport {
    /// Bind the device address. The socket is set up for address reuse and
    /// subnet broadcast transmission.
    pub async fn bind(address: SocketAddrV4, broadcast: SocketAddrV4) -> io::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_nonblocking(true)?;
        socket.set_reuse_address(true)?;
        socket.set_broadcast(true)?;
        socket.bind(&SocketAddr::V4(address).into())?;

        let socket = UdpSocket::from_std(socket.into())?;
        Ok(Self { socket, broadcast })
    }

    /// Local address the transport is bound to
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receive one frame
    pub async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }

    /// Send an NPDU to one peer
    pub async fn send_unicast(&self, npdu: &[u8], dest: SocketAddr) -> io::Result<()> {
        let frame = frame_npdu(BvlcFunction::OriginalUnicastNpdu, npdu);
        self.socket.send_to(&frame, dest).await?;
        Ok(())
    }

    /// Send an NPDU to the local subnet broadcast address
    pub async fn send_broadcast(&self, npdu: &[u8]) -> io::Result<()> {
        let frame = frame_npdu(BvlcFunction::OriginalBroadcastNpdu, npdu);
        self.socket
            .send_to(&frame, SocketAddr::V4(self.broadcast))
            .await?;
        Ok(())
    }
}
