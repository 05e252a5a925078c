//! bacnetd: a BACnet/IP device server backed by a relational database.
//!
//! The server exposes the nine standard input/output/value object types
//! (analog, binary, multi-state) over BACnet/IP, answers ReadProperty,
//! ReadPropertyMultiple, WriteProperty and SubscribeCOV, and keeps the
//! object set synchronized with a MySQL database of record: a periodic
//! refresh pass pulls configuration and sensor values into the live
//! objects, a periodic persistence pass writes commanded output values
//! back. A database outage is never fatal; the object set fails static and
//! resynchronizes when the database returns.

pub mod app;
pub mod config;
pub mod datalink;
pub mod db;
pub mod encoding;
pub mod network;
pub mod object;
pub mod server;
pub mod service;
pub mod sync;

pub use config::{DeviceIdentity, Settings};
pub use datalink::BipTransport;
pub use object::{BacnetObject, ObjectIdentifier, ObjectRegistry, ObjectType, PropertyIdentifier};
pub use server::Server;
pub use service::{ConfirmedServiceChoice, UnconfirmedServiceChoice};

/// BACnet protocol version implemented by the application layer
pub const BACNET_PROTOCOL_VERSION: u8 = 1;

/// Largest APDU this device accepts or produces
pub const BACNET_MAX_APDU: usize = 1476;
