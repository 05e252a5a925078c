use std::net::{SocketAddr, SocketAddrV4};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;

use crate::app::Apdu;
use crate::config::{DbSettings, DeviceIdentity, Settings};
use crate::datalink::bip::{extract_npdu, frame_npdu, BvlcFunction};
use crate::db::rows::{AnalogInputRow, AnalogOutputRow, MultiStateOutputRow};
use crate::network;
use crate::object::{ObjectIdentifier, ObjectType, PropertyIdentifier, PropertyValue};
use crate::service::{
    ConfirmedServiceChoice, CovNotification, IAmRequest, PropertyReference, ReadPropertyAck,
    ReadPropertyMultipleRequest, ReadPropertyRequest, ReadAccessSpecification,
    SubscribeCovRequest, UnconfirmedServiceChoice, WhoIsRequest, WritePropertyRequest,
};
use crate::sync::refresh::{apply_snapshot, RowSnapshot};

use super::{build_registry, Server};

fn test_settings() -> Settings {
    Settings {
        device_ini: "device.ini".into(),
        db: DbSettings {
            host: "127.0.0.1".to_string(),
            port: 3306,
            user: "bacnet".to_string(),
            password: "secret".to_string(),
            database: "bacnet".to_string(),
        },
        persistence_interval: 5,
        refreshing_interval: 2,
    }
}

fn test_identity(broadcast: SocketAddrV4) -> DeviceIdentity {
    DeviceIdentity {
        instance: 600001,
        object_name: "Test device".to_string(),
        vendor_identifier: 15,
        address: "127.0.0.1:0".parse().unwrap(),
        broadcast,
    }
}

fn test_snapshot() -> RowSnapshot {
    let mut snapshot = RowSnapshot::default();
    snapshot.analog_inputs.insert(
        1001,
        AnalogInputRow {
            id: 1,
            object_identifier: 1001,
            object_name: "T1".to_string(),
            present_value: 25.5,
            description: Some("Space temperature".to_string()),
            status_flags: "0000".to_string(),
            event_state: "normal".to_string(),
            out_of_service: false,
            units: "degreesCelsius".to_string(),
            cov_increment: 0.1,
        },
    );
    snapshot.analog_outputs.insert(
        2001,
        AnalogOutputRow {
            id: 1,
            object_identifier: 2001,
            object_name: "DMP1".to_string(),
            present_value: 0.0,
            description: None,
            status_flags: "0000".to_string(),
            event_state: "normal".to_string(),
            out_of_service: false,
            units: "percent".to_string(),
            relinquish_default: 0.0,
            current_command_priority: None,
            cov_increment: 1.0,
        },
    );
    snapshot.multi_state_outputs.insert(
        6001,
        MultiStateOutputRow {
            id: 1,
            object_identifier: 6001,
            object_name: "AHU mode".to_string(),
            present_value: 1,
            description: None,
            status_flags: "0000".to_string(),
            event_state: "normal".to_string(),
            out_of_service: false,
            number_of_states: 3,
            state_text: Some("Off;Low;High".to_string()),
            relinquish_default: 1,
            current_command_priority: None,
        },
    );
    snapshot
}

async fn test_server(broadcast: SocketAddrV4) -> Server {
    let settings = test_settings();
    let identity = test_identity(broadcast);
    let registry = build_registry(&identity, &test_snapshot()).unwrap();
    let transport = crate::datalink::bip::BipTransport::bind(identity.address, identity.broadcast)
        .await
        .unwrap();
    Server::new(&settings, identity, transport, registry)
}

fn loopback() -> SocketAddrV4 {
    "127.0.0.1:1".parse().unwrap()
}

fn peer() -> SocketAddr {
    "127.0.0.1:55555".parse().unwrap()
}

fn read_property_data(object_type: u16, instance: u32, property: u32) -> Vec<u8> {
    let mut data = Vec::new();
    ReadPropertyRequest {
        object_type,
        instance,
        property_identifier: property,
        property_array_index: None,
    }
    .encode(&mut data)
    .unwrap();
    data
}

fn write_property_data(object_type: u16, instance: u32, value: PropertyValue) -> Vec<u8> {
    let mut value_bytes = Vec::new();
    value.encode(&mut value_bytes).unwrap();
    let mut data = Vec::new();
    WritePropertyRequest {
        object_type,
        instance,
        property_identifier: PropertyIdentifier::PresentValue as u32,
        property_array_index: None,
        property_value: value_bytes,
        priority: Some(8),
    }
    .encode(&mut data)
    .unwrap();
    data
}

#[tokio::test]
async fn test_read_property_returns_real() {
    let mut server = test_server(loopback()).await;
    let data = read_property_data(0, 1001, PropertyIdentifier::PresentValue as u32);

    let (response, events) = server.handle_confirmed(
        ConfirmedServiceChoice::ReadProperty as u8,
        &data,
        1,
        peer(),
    );
    assert!(events.is_empty());

    match response {
        Apdu::ComplexAck {
            invoke_id,
            service_data,
            ..
        } => {
            assert_eq!(invoke_id, 1);
            let ack = ReadPropertyAck::decode(&service_data).unwrap();
            let (value, _) = PropertyValue::decode(&ack.property_value).unwrap();
            assert_eq!(value, PropertyValue::Real(25.5));
        }
        other => panic!("expected ComplexAck, got {:?}", other),
    }
}

#[tokio::test]
async fn test_commanded_write_wins_over_refresh() {
    let mut server = test_server(loopback()).await;
    let data = write_property_data(1, 2001, PropertyValue::Real(42.0));

    let (response, events) = server.handle_confirmed(
        ConfirmedServiceChoice::WriteProperty as u8,
        &data,
        2,
        peer(),
    );
    assert!(matches!(response, Apdu::SimpleAck { invoke_id: 2, .. }));
    assert_eq!(events.len(), 1);

    let id = ObjectIdentifier::new(ObjectType::AnalogOutput, 2001);
    assert_eq!(
        server.registry().read_property(id, PropertyIdentifier::PresentValue).unwrap(),
        PropertyValue::Real(42.0)
    );

    // A refresh carrying the stale database value must not win
    apply_snapshot(server.registry(), &test_snapshot());
    assert_eq!(
        server.registry().read_property(id, PropertyIdentifier::PresentValue).unwrap(),
        PropertyValue::Real(42.0)
    );

    // The persistence snapshot carries the commanded value
    let commanded = server.registry().snapshot_commanded();
    assert!(commanded
        .iter()
        .any(|(identifier, value)| identifier.instance == 2001
            && *value == crate::object::CommandedValue::Analog(42.0)));
}

#[tokio::test]
async fn test_multi_state_write_out_of_range() {
    let mut server = test_server(loopback()).await;
    let data = write_property_data(14, 6001, PropertyValue::Unsigned(4));

    let (response, events) = server.handle_confirmed(
        ConfirmedServiceChoice::WriteProperty as u8,
        &data,
        3,
        peer(),
    );
    assert!(events.is_empty());
    match response {
        Apdu::Error {
            error_class,
            error_code,
            ..
        } => {
            assert_eq!(error_class, 2); // property
            assert_eq!(error_code, 37); // value-out-of-range
        }
        other => panic!("expected Error, got {:?}", other),
    }

    let id = ObjectIdentifier::new(ObjectType::MultiStateOutput, 6001);
    assert_eq!(
        server.registry().read_property(id, PropertyIdentifier::PresentValue).unwrap(),
        PropertyValue::Unsigned(1)
    );
}

#[tokio::test]
async fn test_unknown_object_error() {
    let mut server = test_server(loopback()).await;
    let data = read_property_data(0, 9999, PropertyIdentifier::PresentValue as u32);

    let (response, _) = server.handle_confirmed(
        ConfirmedServiceChoice::ReadProperty as u8,
        &data,
        4,
        peer(),
    );
    match response {
        Apdu::Error {
            error_class,
            error_code,
            ..
        } => {
            assert_eq!(error_class, 1); // object
            assert_eq!(error_code, 31); // unknown-object
        }
        other => panic!("expected Error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_read_property_multiple_all() {
    let mut server = test_server(loopback()).await;
    let mut data = Vec::new();
    ReadPropertyMultipleRequest {
        specifications: vec![ReadAccessSpecification {
            object_type: 0,
            instance: 1001,
            properties: vec![PropertyReference {
                property_identifier: PropertyIdentifier::All as u32,
                property_array_index: None,
            }],
        }],
    }
    .encode(&mut data)
    .unwrap();

    let (response, _) = server.handle_confirmed(
        ConfirmedServiceChoice::ReadPropertyMultiple as u8,
        &data,
        5,
        peer(),
    );
    match response {
        Apdu::ComplexAck { service_data, .. } => assert!(!service_data.is_empty()),
        other => panic!("expected ComplexAck, got {:?}", other),
    }
}

#[tokio::test]
async fn test_device_object_list() {
    let mut server = test_server(loopback()).await;
    let data = read_property_data(8, 600001, PropertyIdentifier::ObjectList as u32);

    let (response, _) = server.handle_confirmed(
        ConfirmedServiceChoice::ReadProperty as u8,
        &data,
        6,
        peer(),
    );
    match response {
        Apdu::ComplexAck { service_data, .. } => {
            let ack = ReadPropertyAck::decode(&service_data).unwrap();
            // Device + AI + AO + MSO
            let mut identifiers = Vec::new();
            let mut pos = 0;
            while pos < ack.property_value.len() {
                let (value, consumed) = PropertyValue::decode(&ack.property_value[pos..]).unwrap();
                identifiers.push(value);
                pos += consumed;
            }
            assert_eq!(identifiers.len(), 4);
            assert_eq!(
                identifiers[0],
                PropertyValue::ObjectIdentifier(ObjectIdentifier::new(ObjectType::Device, 600001))
            );
        }
        other => panic!("expected ComplexAck, got {:?}", other),
    }
}

#[tokio::test]
async fn test_cov_subscription_and_refresh_notification() {
    let subscriber = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let subscriber_addr = subscriber.local_addr().unwrap();

    let mut server = test_server(loopback()).await;

    // Subscribe to the analog input with unconfirmed notifications
    let mut data = Vec::new();
    SubscribeCovRequest {
        subscriber_process_identifier: 18,
        object_type: 0,
        instance: 1001,
        issue_confirmed_notifications: Some(false),
        lifetime: Some(300),
    }
    .encode(&mut data)
    .unwrap();

    let (response, events) = server.handle_confirmed(
        ConfirmedServiceChoice::SubscribeCov as u8,
        &data,
        7,
        subscriber_addr,
    );
    assert!(matches!(response, Apdu::SimpleAck { .. }));

    // Initial notification on subscription
    server.dispatch_cov_events(events).await;
    let initial = recv_notification(&subscriber).await;
    let (value, _) = PropertyValue::decode(&initial.values[0].1).unwrap();
    assert_eq!(value, PropertyValue::Real(25.5));

    // A sub-increment move stays silent
    let mut snapshot = test_snapshot();
    snapshot.analog_inputs.get_mut(&1001).unwrap().present_value = 25.55;
    let events = apply_snapshot(server.registry(), &snapshot);
    server.dispatch_cov_events(events).await;

    // A move past the increment notifies with the new value
    snapshot.analog_inputs.get_mut(&1001).unwrap().present_value = 25.8;
    let events = apply_snapshot(server.registry(), &snapshot);
    server.dispatch_cov_events(events).await;

    let notification = recv_notification(&subscriber).await;
    assert_eq!(notification.instance, 1001);
    assert_eq!(notification.initiating_device_instance, 600001);
    let (value, _) = PropertyValue::decode(&notification.values[0].1).unwrap();
    assert_eq!(value, PropertyValue::Real(25.8));
}

#[tokio::test]
async fn test_who_is_answered_with_i_am() {
    let listener = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let listener_v4 = match listener.local_addr().unwrap() {
        SocketAddr::V4(addr) => addr,
        other => panic!("unexpected address family: {:?}", other),
    };

    // Point the "broadcast" address at the listener
    let mut server = test_server(listener_v4).await;

    let mut service_data = Vec::new();
    WhoIsRequest {
        device_instance_range_low_limit: Some(600000),
        device_instance_range_high_limit: Some(600010),
    }
    .encode(&mut service_data)
    .unwrap();
    let apdu = Apdu::UnconfirmedRequest {
        service_choice: UnconfirmedServiceChoice::WhoIs as u8,
        service_data,
    };
    let npdu = network::wrap_apdu(&apdu.encode(), false);
    let frame = frame_npdu(BvlcFunction::OriginalBroadcastNpdu, &npdu);

    server.handle_frame(&frame, peer()).await;

    let mut buf = vec![0u8; 1500];
    let (len, _) = timeout(Duration::from_secs(2), listener.recv_from(&mut buf))
        .await
        .expect("timed out waiting for I-Am")
        .unwrap();

    let npdu = extract_npdu(&buf[..len]).unwrap();
    let (_, apdu_bytes) = network::unwrap_apdu(npdu).unwrap();
    match Apdu::decode(apdu_bytes).unwrap() {
        Apdu::UnconfirmedRequest {
            service_choice,
            service_data,
        } => {
            assert_eq!(service_choice, UnconfirmedServiceChoice::IAm as u8);
            let i_am = IAmRequest::decode(&service_data).unwrap();
            assert_eq!(i_am.device_instance, 600001);
            assert_eq!(i_am.vendor_identifier, 15);
        }
        other => panic!("expected I-Am, got {:?}", other),
    }
}

#[tokio::test]
async fn test_out_of_range_who_is_ignored() {
    let listener = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let listener_v4 = match listener.local_addr().unwrap() {
        SocketAddr::V4(addr) => addr,
        other => panic!("unexpected address family: {:?}", other),
    };
    let mut server = test_server(listener_v4).await;

    let mut service_data = Vec::new();
    WhoIsRequest {
        device_instance_range_low_limit: Some(1),
        device_instance_range_high_limit: Some(10),
    }
    .encode(&mut service_data)
    .unwrap();
    let apdu = Apdu::UnconfirmedRequest {
        service_choice: UnconfirmedServiceChoice::WhoIs as u8,
        service_data,
    };
    let npdu = network::wrap_apdu(&apdu.encode(), false);
    let frame = frame_npdu(BvlcFunction::OriginalBroadcastNpdu, &npdu);

    server.handle_frame(&frame, peer()).await;

    let mut buf = vec![0u8; 1500];
    let outcome = timeout(Duration::from_millis(200), listener.recv_from(&mut buf)).await;
    assert!(outcome.is_err(), "device must stay silent for a non-matching Who-Is");
}

async fn recv_notification(subscriber: &UdpSocket) -> CovNotification {
    let mut buf = vec![0u8; 1500];
    let (len, _) = timeout(Duration::from_secs(2), subscriber.recv_from(&mut buf))
        .await
        .expect("timed out waiting for COV notification")
        .unwrap();
    let npdu = extract_npdu(&buf[..len]).unwrap();
    let (_, apdu_bytes) = network::unwrap_apdu(npdu).unwrap();
    match Apdu::decode(apdu_bytes).unwrap() {
        Apdu::UnconfirmedRequest {
            service_choice,
            service_data,
        } => {
            assert_eq!(service_choice, UnconfirmedServiceChoice::UnconfirmedCovNotification as u8);
            CovNotification::decode(&service_data).unwrap()
        }
        other => panic!("expected notification, got {:?}", other),
    }
}
