//! BACnet Application Binding and Event Loop
//!
//! [`Server`] bundles the live object registry, the COV subscription set,
//! the BACnet/IP transport and the two synchronization tasks into one value
//! owned by `main`. Its event loop is the cooperative scheduler: incoming
//! PDUs, the refresh timer, the persistence timer and the one-second COV
//! lifetime timer are multiplexed on a single task, so registry access never
//! races and each periodic task body runs to completion between PDUs.

use std::net::SocketAddr;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::{interval, MissedTickBehavior};

use crate::app::{Apdu, MaxApduSize};
use crate::config::{DeviceIdentity, Settings};
use crate::datalink::bip::{extract_npdu, BipTransport};
use crate::db::Gateway;
use crate::network;
use crate::object::{
    BacnetObject, CovEvent, Device, ObjectIdentifier, ObjectRegistry, ObjectType,
    PropertyIdentifier, PropertyValue,
};
use crate::service::{
    error_for, AbortReason, ConfirmedServiceChoice, CovNotification, CovSubscription,
    CovSubscriptions, ErrorClass, ErrorCode, IAmRequest, PropertyReference, ReadAccessResult,
    ReadPropertyAck, ReadPropertyMultipleRequest, ReadPropertyRequest, ReadResult, RejectReason,
    SubscribeCovRequest, UnconfirmedServiceChoice, WhoIsRequest, WritePropertyRequest,
    BACNET_ARRAY_ALL,
};
use crate::sync::refresh::RowSnapshot;
use crate::sync::{PersistTask, RefreshTask};

/// The assembled device server
pub struct Server {
    registry: ObjectRegistry,
    identity: DeviceIdentity,
    device_id: ObjectIdentifier,
    transport: BipTransport,
    refresh: RefreshTask,
    persist: PersistTask,
    subscriptions: CovSubscriptions,
    refreshing_interval: Duration,
    persistence_interval: Duration,
    invoke_id: u8,
}

/// Build the registry from a bootstrap snapshot: the device object first,
/// then the nine types in refresh order, instances ascending. A bad row at
/// bootstrap is fatal (unlike refresh, where it is row-local).
pub fn build_registry(
    identity: &DeviceIdentity,
    snapshot: &RowSnapshot,
) -> crate::object::Result<ObjectRegistry> {
    let registry = ObjectRegistry::new();
    registry.insert(BacnetObject::Device(Device::new(
        identity.instance,
        identity.object_name.clone(),
        identity.vendor_identifier,
    )?))?;

    fn sorted<'a, R>(rows: &'a std::collections::HashMap<u32, R>) -> Vec<&'a R> {
        let mut keyed: Vec<(&u32, &R)> = rows.iter().collect();
        keyed.sort_by_key(|(instance, _)| **instance);
        keyed.into_iter().map(|(_, row)| row).collect()
    }

    for row in sorted(&snapshot.analog_inputs) {
        registry.insert(BacnetObject::AnalogInput(crate::object::AnalogInput::from_row(row)?))?;
    }
    for row in sorted(&snapshot.analog_outputs) {
        registry.insert(BacnetObject::AnalogOutput(crate::object::AnalogOutput::from_row(row)?))?;
    }
    for row in sorted(&snapshot.analog_values) {
        registry.insert(BacnetObject::AnalogValue(crate::object::AnalogValue::from_row(row)?))?;
    }
    for row in sorted(&snapshot.binary_inputs) {
        registry.insert(BacnetObject::BinaryInput(crate::object::BinaryInput::from_row(row)?))?;
    }
    for row in sorted(&snapshot.binary_outputs) {
        registry.insert(BacnetObject::BinaryOutput(crate::object::BinaryOutput::from_row(row)?))?;
    }
    for row in sorted(&snapshot.binary_values) {
        registry.insert(BacnetObject::BinaryValue(crate::object::BinaryValue::from_row(row)?))?;
    }
    for row in sorted(&snapshot.multi_state_inputs) {
        registry.insert(BacnetObject::MultiStateInput(
            crate::object::MultiStateInput::from_row(row)?,
        ))?;
    }
    for row in sorted(&snapshot.multi_state_outputs) {
        registry.insert(BacnetObject::MultiStateOutput(
            crate::object::MultiStateOutput::from_row(row)?,
        ))?;
    }
    for row in sorted(&snapshot.multi_state_values) {
        registry.insert(BacnetObject::MultiStateValue(
            crate::object::MultiStateValue::from_row(row)?,
        ))?;
    }

    Ok(registry)
}

enum Tick {
    Frame(usize, SocketAddr),
    Refresh,
    Persist,
    CovSecond,
    Shutdown,
}

impl Server {
    /// Assemble a server from already-built parts
    pub fn new(
        settings: &Settings,
        identity: DeviceIdentity,
        transport: BipTransport,
        registry: ObjectRegistry,
    ) -> Self {
        let device_id = ObjectIdentifier::new(ObjectType::Device, identity.instance);
        Self {
            registry,
            device_id,
            transport,
            refresh: RefreshTask::new(Gateway::new(&settings.db)),
            persist: PersistTask::new(Gateway::new(&settings.db)),
            subscriptions: CovSubscriptions::new(),
            refreshing_interval: Duration::from_secs(settings.refreshing_interval),
            persistence_interval: Duration::from_secs(settings.persistence_interval),
            invoke_id: 0,
            identity,
        }
    }

    /// Open the database, read all rows, build the object set, bind the
    /// socket. Any failure here is fatal (§ exit codes: non-zero).
    pub async fn bootstrap(settings: &Settings, identity: DeviceIdentity) -> anyhow::Result<Self> {
        let mut loader = RefreshTask::new(Gateway::new(&settings.db));
        let snapshot = loader.initial_snapshot().await?;
        let registry = build_registry(&identity, &snapshot)?;
        info!(
            "loaded {} objects from database ({} with commanded outputs)",
            registry.len(),
            registry.snapshot_commanded().len()
        );

        let transport = BipTransport::bind(identity.address, identity.broadcast).await?;
        info!(
            "device {} \"{}\" listening on {}",
            identity.instance,
            identity.object_name,
            transport.local_addr()?
        );

        Ok(Self::new(settings, identity, transport, registry))
    }

    /// Shared access to the object registry
    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    /// Announce the device and serve until interrupted
    pub async fn run(mut self) -> anyhow::Result<()> {
        self.send_i_am().await;

        let mut refresh_timer = interval(self.refreshing_interval);
        refresh_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut persist_timer = interval(self.persistence_interval);
        persist_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cov_timer = interval(Duration::from_secs(1));
        cov_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut buf = vec![0u8; 1500];

        loop {
            let tick = tokio::select! {
                received = self.transport.recv_from(&mut buf) => match received {
                    Ok((len, peer)) => Tick::Frame(len, peer),
                    Err(error) => {
                        warn!("socket receive failed: {}", error);
                        continue;
                    }
                },
                _ = refresh_timer.tick() => Tick::Refresh,
                _ = persist_timer.tick() => Tick::Persist,
                _ = cov_timer.tick() => Tick::CovSecond,
                _ = tokio::signal::ctrl_c() => Tick::Shutdown,
            };

            match tick {
                Tick::Frame(len, peer) => {
                    let frame = buf[..len].to_vec();
                    self.handle_frame(&frame, peer).await;
                }
                Tick::Refresh => {
                    let events = self.refresh.run_cycle(&self.registry).await;
                    self.dispatch_cov_events(events).await;
                }
                Tick::Persist => {
                    self.persist.run_cycle(&self.registry).await;
                }
                Tick::CovSecond => {
                    self.subscriptions.tick(1);
                }
                Tick::Shutdown => {
                    info!("shutdown requested");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Broadcast an I-Am announcing this device
    async fn send_i_am(&self) {
        let i_am = IAmRequest {
            device_instance: self.identity.instance,
            max_apdu_length_accepted: 1476,
            segmentation_supported: crate::object::Segmentation::NoSegmentation as u32,
            vendor_identifier: self.identity.vendor_identifier as u32,
        };
        let mut service_data = Vec::new();
        if i_am.encode(&mut service_data).is_err() {
            return;
        }
        let apdu = Apdu::UnconfirmedRequest {
            service_choice: UnconfirmedServiceChoice::IAm as u8,
            service_data,
        };
        let npdu = network::wrap_apdu(&apdu.encode(), false);
        if let Err(error) = self.transport.send_broadcast(&npdu).await {
            warn!("I-Am broadcast failed: {}", error);
        }
    }

    /// Process one received BVLL frame
    pub async fn handle_frame(&mut self, frame: &[u8], peer: SocketAddr) {
        let npdu = match extract_npdu(frame) {
            Ok(npdu) => npdu,
            Err(error) => {
                debug!("{} from {}", error, peer);
                return;
            }
        };

        let apdu_bytes = match network::unwrap_apdu(npdu) {
            Ok((_, apdu)) => apdu,
            Err(error) => {
                debug!("{} from {}", error, peer);
                return;
            }
        };

        let apdu = match Apdu::decode(apdu_bytes) {
            Ok(apdu) => apdu,
            Err(error) => {
                debug!("undecodable APDU from {}: {}", peer, error);
                return;
            }
        };

        match apdu {
            Apdu::ConfirmedRequest {
                segmented: true,
                invoke_id,
                ..
            } => {
                self.send_response(
                    Apdu::Abort {
                        server: true,
                        invoke_id,
                        abort_reason: AbortReason::SegmentationNotSupported as u8,
                    },
                    peer,
                )
                .await;
            }
            Apdu::ConfirmedRequest {
                max_response_size,
                invoke_id,
                service_choice,
                service_data,
                ..
            } => {
                let (response, events) =
                    self.handle_confirmed(service_choice, &service_data, invoke_id, peer);
                let response = enforce_response_size(response, max_response_size, invoke_id);
                self.send_response(response, peer).await;
                self.dispatch_cov_events(events).await;
            }
            Apdu::UnconfirmedRequest {
                service_choice,
                service_data,
            } => {
                self.handle_unconfirmed(service_choice, &service_data, peer).await;
            }
            // Acks to our confirmed COV notifications; delivery is
            // fire-and-forget so there is nothing to correlate
            Apdu::SimpleAck { .. } | Apdu::ComplexAck { .. } | Apdu::Error { .. } => {}
            Apdu::Reject { .. } | Apdu::Abort { .. } => {}
        }
    }

    async fn send_response(&self, response: Apdu, peer: SocketAddr) {
        let npdu = network::wrap_apdu(&response.encode(), false);
        if let Err(error) = self.transport.send_unicast(&npdu, peer).await {
            warn!("send to {} failed: {}", peer, error);
        }
    }

    /// Dispatch a confirmed request, producing the response APDU and any
    /// change events for the COV subsystem. No I/O happens here.
    pub fn handle_confirmed(
        &mut self,
        service_choice: u8,
        service_data: &[u8],
        invoke_id: u8,
        peer: SocketAddr,
    ) -> (Apdu, Vec<CovEvent>) {
        let choice = match ConfirmedServiceChoice::try_from(service_choice) {
            Ok(choice) => choice,
            Err(_) => {
                return (
                    Apdu::Reject {
                        invoke_id,
                        reject_reason: RejectReason::UnrecognizedService as u8,
                    },
                    Vec::new(),
                )
            }
        };

        match choice {
            ConfirmedServiceChoice::ReadProperty => {
                (self.handle_read_property(service_data, invoke_id), Vec::new())
            }
            ConfirmedServiceChoice::ReadPropertyMultiple => {
                (self.handle_read_property_multiple(service_data, invoke_id), Vec::new())
            }
            ConfirmedServiceChoice::WriteProperty => {
                self.handle_write_property(service_data, invoke_id)
            }
            ConfirmedServiceChoice::SubscribeCov => {
                self.handle_subscribe_cov(service_data, invoke_id, peer)
            }
            ConfirmedServiceChoice::ConfirmedCovNotification => (
                // This device subscribes to nothing
                Apdu::Reject {
                    invoke_id,
                    reject_reason: RejectReason::UnrecognizedService as u8,
                },
                Vec::new(),
            ),
        }
    }

    fn handle_read_property(&self, service_data: &[u8], invoke_id: u8) -> Apdu {
        let service_choice = ConfirmedServiceChoice::ReadProperty as u8;
        let request = match ReadPropertyRequest::decode(service_data) {
            Ok(request) => request,
            Err(_) => {
                return Apdu::Reject {
                    invoke_id,
                    reject_reason: RejectReason::InvalidTag as u8,
                }
            }
        };

        match self.read_encoded(
            request.object_type,
            request.instance,
            request.property_identifier,
            request.property_array_index,
        ) {
            Ok(property_value) => {
                let ack = ReadPropertyAck {
                    object_type: request.object_type,
                    instance: request.instance,
                    property_identifier: request.property_identifier,
                    property_array_index: request.property_array_index,
                    property_value,
                };
                let mut service_data = Vec::new();
                match ack.encode(&mut service_data) {
                    Ok(()) => Apdu::ComplexAck {
                        invoke_id,
                        service_choice,
                        service_data,
                    },
                    Err(_) => Apdu::Error {
                        invoke_id,
                        service_choice,
                        error_class: ErrorClass::Services as u32,
                        error_code: ErrorCode::Other as u32,
                    },
                }
            }
            Err((class, code)) => Apdu::Error {
                invoke_id,
                service_choice,
                error_class: class as u32,
                error_code: code as u32,
            },
        }
    }

    fn handle_read_property_multiple(&self, service_data: &[u8], invoke_id: u8) -> Apdu {
        let service_choice = ConfirmedServiceChoice::ReadPropertyMultiple as u8;
        let request = match ReadPropertyMultipleRequest::decode(service_data) {
            Ok(request) => request,
            Err(_) => {
                return Apdu::Reject {
                    invoke_id,
                    reject_reason: RejectReason::InvalidTag as u8,
                }
            }
        };

        let mut ack_data = Vec::new();
        for spec in &request.specifications {
            let mut results = Vec::new();
            for reference in self.expand_references(spec) {
                let result = match self.read_encoded(
                    spec.object_type,
                    spec.instance,
                    reference.property_identifier,
                    reference.property_array_index,
                ) {
                    Ok(value) => ReadResult::Value(value),
                    Err((class, code)) => ReadResult::Error(class, code),
                };
                results.push((reference, result));
            }
            let access_result = ReadAccessResult {
                object_type: spec.object_type,
                instance: spec.instance,
                results,
            };
            if access_result.encode(&mut ack_data).is_err() {
                return Apdu::Error {
                    invoke_id,
                    service_choice,
                    error_class: ErrorClass::Services as u32,
                    error_code: ErrorCode::Other as u32,
                };
            }
        }

        Apdu::ComplexAck {
            invoke_id,
            service_choice,
            service_data: ack_data,
        }
    }

    /// Expand the `all` / `required` / `optional` special references into
    /// the object's property list
    fn expand_references(
        &self,
        spec: &crate::service::ReadAccessSpecification,
    ) -> Vec<PropertyReference> {
        let mut expanded = Vec::new();
        for reference in &spec.properties {
            let special = PropertyIdentifier::try_from(reference.property_identifier).ok();
            match special {
                Some(PropertyIdentifier::All) | Some(PropertyIdentifier::Required) => {
                    let listed = ObjectType::try_from(spec.object_type)
                        .ok()
                        .map(|object_type| ObjectIdentifier::new(object_type, spec.instance))
                        .and_then(|id| {
                            self.registry.with_object(id, |object| object.property_list()).ok()
                        });
                    match listed {
                        Some(properties) => {
                            expanded.extend(properties.into_iter().map(|p| PropertyReference {
                                property_identifier: p as u32,
                                property_array_index: None,
                            }));
                        }
                        // Unknown object: report the error on the special
                        // reference itself
                        None => expanded.push(reference.clone()),
                    }
                }
                // Every property this device serves is required
                Some(PropertyIdentifier::Optional) => {}
                _ => expanded.push(reference.clone()),
            }
        }
        expanded
    }

    fn handle_write_property(
        &mut self,
        service_data: &[u8],
        invoke_id: u8,
    ) -> (Apdu, Vec<CovEvent>) {
        let service_choice = ConfirmedServiceChoice::WriteProperty as u8;
        let request = match WritePropertyRequest::decode(service_data) {
            Ok(request) => request,
            Err(_) => {
                return (
                    Apdu::Reject {
                        invoke_id,
                        reject_reason: RejectReason::InvalidTag as u8,
                    },
                    Vec::new(),
                )
            }
        };

        let error = |class: ErrorClass, code: ErrorCode| {
            (
                Apdu::Error {
                    invoke_id,
                    service_choice,
                    error_class: class as u32,
                    error_code: code as u32,
                },
                Vec::new(),
            )
        };

        let object_type = match ObjectType::try_from(request.object_type) {
            Ok(object_type) => object_type,
            Err(_) => return error(ErrorClass::Object, ErrorCode::UnknownObject),
        };
        let identifier = ObjectIdentifier::new(object_type, request.instance);

        let property = match PropertyIdentifier::try_from(request.property_identifier) {
            Ok(property) => property,
            Err(_) => return error(ErrorClass::Property, ErrorCode::UnknownProperty),
        };

        let value = match PropertyValue::decode(&request.property_value) {
            Ok((value, consumed)) if consumed == request.property_value.len() => value,
            _ => return error(ErrorClass::Property, ErrorCode::InvalidDataType),
        };

        match self.registry.write_property(identifier, property, value) {
            Ok(event) => {
                debug!(
                    "WriteProperty {:?} {} {:?} ok",
                    object_type, request.instance, property
                );
                (
                    Apdu::SimpleAck {
                        invoke_id,
                        service_choice,
                    },
                    event.into_iter().collect(),
                )
            }
            Err(object_error) => {
                let (class, code) = error_for(&object_error);
                error(class, code)
            }
        }
    }

    fn handle_subscribe_cov(
        &mut self,
        service_data: &[u8],
        invoke_id: u8,
        peer: SocketAddr,
    ) -> (Apdu, Vec<CovEvent>) {
        let service_choice = ConfirmedServiceChoice::SubscribeCov as u8;
        let request = match SubscribeCovRequest::decode(service_data) {
            Ok(request) => request,
            Err(_) => {
                return (
                    Apdu::Reject {
                        invoke_id,
                        reject_reason: RejectReason::InvalidTag as u8,
                    },
                    Vec::new(),
                )
            }
        };

        let object_type = match ObjectType::try_from(request.object_type) {
            Ok(object_type) => object_type,
            Err(_) => {
                return (
                    Apdu::Error {
                        invoke_id,
                        service_choice,
                        error_class: ErrorClass::Object as u32,
                        error_code: ErrorCode::UnknownObject as u32,
                    },
                    Vec::new(),
                )
            }
        };
        let object = ObjectIdentifier::new(object_type, request.instance);

        if !self.registry.contains(object) {
            return (
                Apdu::Error {
                    invoke_id,
                    service_choice,
                    error_class: ErrorClass::Object as u32,
                    error_code: ErrorCode::UnknownObject as u32,
                },
                Vec::new(),
            );
        }

        let ack = Apdu::SimpleAck {
            invoke_id,
            service_choice,
        };

        if request.is_cancellation() {
            self.subscriptions
                .cancel(peer, request.subscriber_process_identifier, object);
            return (ack, Vec::new());
        }

        let lifetime = request.lifetime.unwrap_or(0);
        self.subscriptions.subscribe(CovSubscription {
            process_identifier: request.subscriber_process_identifier,
            subscriber: peer,
            object,
            issue_confirmed_notifications: request.issue_confirmed_notifications.unwrap_or(false),
            lifetime,
            time_remaining: lifetime,
            last_value: None,
            last_flags: None,
        });
        info!(
            "COV subscription from {} (process {}) on {:?} {}",
            peer, request.subscriber_process_identifier, object_type, request.instance
        );

        // The initial notification required on subscription falls out of the
        // change evaluation: a fresh subscription has no last-notified value
        (ack, vec![CovEvent { object }])
    }

    /// Read a property as application-tagged bytes, handling the registry-
    /// answered object-list and the array-index forms
    fn read_encoded(
        &self,
        raw_type: u16,
        instance: u32,
        raw_property: u32,
        array_index: Option<u32>,
    ) -> std::result::Result<Vec<u8>, (ErrorClass, ErrorCode)> {
        let object_type = ObjectType::try_from(raw_type)
            .map_err(|_| (ErrorClass::Object, ErrorCode::UnknownObject))?;
        let identifier = ObjectIdentifier::new(object_type, instance);
        let property = PropertyIdentifier::try_from(raw_property)
            .map_err(|_| (ErrorClass::Property, ErrorCode::UnknownProperty))?;

        let array_index = array_index.filter(|index| *index != BACNET_ARRAY_ALL);

        let value = if property == PropertyIdentifier::ObjectList {
            if identifier != self.device_id {
                return Err((ErrorClass::Property, ErrorCode::UnknownProperty));
            }
            let identifiers = self.registry.identifiers();
            match array_index {
                None => PropertyValue::Array(
                    identifiers.into_iter().map(PropertyValue::ObjectIdentifier).collect(),
                ),
                Some(0) => PropertyValue::Unsigned(identifiers.len() as u32),
                Some(index) => {
                    let element = identifiers
                        .get(index as usize - 1)
                        .copied()
                        .ok_or((ErrorClass::Property, ErrorCode::InvalidArrayIndex))?;
                    PropertyValue::ObjectIdentifier(element)
                }
            }
        } else {
            if array_index.is_some() {
                return Err((ErrorClass::Property, ErrorCode::InvalidArrayIndex));
            }
            self.registry
                .read_property(identifier, property)
                .map_err(|error| error_for(&error))?
        };

        let mut buffer = Vec::new();
        value
            .encode(&mut buffer)
            .map_err(|_| (ErrorClass::Services, ErrorCode::Other))?;
        Ok(buffer)
    }

    /// Evaluate change events against the active subscriptions and deliver
    /// notifications
    pub async fn dispatch_cov_events(&mut self, events: Vec<CovEvent>) {
        for event in events {
            let state = self.registry.with_object(event.object, |object| {
                (
                    object.read_property(PropertyIdentifier::PresentValue),
                    object.status_flags(),
                    object.cov_increment(),
                )
            });
            let (present_value, status_flags, cov_increment) = match state {
                Ok((Ok(present_value), status_flags, cov_increment)) => {
                    (present_value, status_flags, cov_increment)
                }
                _ => continue,
            };

            let device_instance = self.identity.instance;
            let mut deliveries = Vec::new();

            for subscription in self.subscriptions.for_object_mut(event.object) {
                let flags_changed = subscription.last_flags != Some(status_flags);
                let value_changed = match (&subscription.last_value, &present_value) {
                    (None, _) => true,
                    (Some(PropertyValue::Real(last)), PropertyValue::Real(new)) => {
                        match cov_increment {
                            Some(increment) => {
                                ((*new as f64) - (*last as f64)).abs() >= increment
                            }
                            None => new != last,
                        }
                    }
                    (Some(last), new) => last != new,
                };

                if !(flags_changed || value_changed) {
                    continue;
                }

                subscription.last_value = Some(present_value.clone());
                subscription.last_flags = Some(status_flags);

                let mut pv_bytes = Vec::new();
                let mut flag_bytes = Vec::new();
                if present_value.encode(&mut pv_bytes).is_err() {
                    continue;
                }
                if PropertyValue::BitString(status_flags.bits().to_vec())
                    .encode(&mut flag_bytes)
                    .is_err()
                {
                    continue;
                }

                let notification = CovNotification {
                    subscriber_process_identifier: subscription.process_identifier,
                    initiating_device_instance: device_instance,
                    object_type: event.object.object_type as u16,
                    instance: event.object.instance,
                    time_remaining: subscription.time_remaining,
                    values: vec![
                        (PropertyIdentifier::PresentValue as u32, pv_bytes),
                        (PropertyIdentifier::StatusFlags as u32, flag_bytes),
                    ],
                };
                deliveries.push((
                    subscription.subscriber,
                    subscription.issue_confirmed_notifications,
                    notification,
                ));
            }

            for (subscriber, confirmed, notification) in deliveries {
                self.send_notification(subscriber, confirmed, notification).await;
            }
        }
    }

    async fn send_notification(
        &mut self,
        subscriber: SocketAddr,
        confirmed: bool,
        notification: CovNotification,
    ) {
        let mut service_data = Vec::new();
        if notification.encode(&mut service_data).is_err() {
            return;
        }

        let apdu = if confirmed {
            self.invoke_id = self.invoke_id.wrapping_add(1);
            Apdu::ConfirmedRequest {
                segmented: false,
                max_response_size: MaxApduSize::Up1476,
                invoke_id: self.invoke_id,
                service_choice: ConfirmedServiceChoice::ConfirmedCovNotification as u8,
                service_data,
            }
        } else {
            Apdu::UnconfirmedRequest {
                service_choice: UnconfirmedServiceChoice::UnconfirmedCovNotification as u8,
                service_data,
            }
        };

        let npdu = network::wrap_apdu(&apdu.encode(), confirmed);
        if let Err(error) = self.transport.send_unicast(&npdu, subscriber).await {
            warn!("COV notification to {} failed: {}", subscriber, error);
        }
    }

    async fn handle_unconfirmed(&mut self, service_choice: u8, service_data: &[u8], peer: SocketAddr) {
        match UnconfirmedServiceChoice::try_from(service_choice) {
            Ok(UnconfirmedServiceChoice::WhoIs) => {
                let request = match WhoIsRequest::decode(service_data) {
                    Ok(request) => request,
                    Err(_) => return,
                };
                if request.matches(self.identity.instance) {
                    debug!("Who-Is from {} matches, answering I-Am", peer);
                    self.send_i_am().await;
                }
            }
            // This device originates I-Am and COV notifications but does not
            // consume them
            Ok(UnconfirmedServiceChoice::IAm)
            | Ok(UnconfirmedServiceChoice::UnconfirmedCovNotification) => {}
            Err(_) => {}
        }
    }
}

/// Replace a too-large response with an abort; the device does not segment
fn enforce_response_size(response: Apdu, max_response_size: MaxApduSize, invoke_id: u8) -> Apdu {
    let encoded_len = match &response {
        Apdu::ComplexAck { service_data, .. } => service_data.len() + 3,
        _ => return response,
    };
    if encoded_len > max_response_size.size() {
        Apdu::Abort {
            server: true,
            invoke_id,
            abort_reason: AbortReason::BufferOverflow as u8,
        }
    } else {
        response
    }
}

#[cfg(test)]
mod tests;
