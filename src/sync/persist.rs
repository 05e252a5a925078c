//! Persistence Task (live objects -> database)
//!
//! Runs every `persistence_interval` seconds. Each cycle snapshots the
//! commanded present-value of every output object under the registry lock
//! and writes each value back keyed by BACnet instance. Input and Value
//! objects are never written back: their authority is the database.
//!
//! On a mid-cycle failure the cycle stops, the connection is dropped for
//! reconnection next cycle, and the writes already committed stay committed;
//! the remaining commanded values simply flush on a later cycle.

use log::debug;

use crate::db::Gateway;
use crate::object::{CommandedValue, ObjectIdentifier, ObjectRegistry};

use super::{ConnectionState, TaskHealth};

/// The periodic objects -> database pass
pub struct PersistTask {
    gateway: Gateway,
    health: TaskHealth,
}

impl PersistTask {
    pub fn new(gateway: Gateway) -> Self {
        Self {
            gateway,
            health: TaskHealth::new("persist"),
        }
    }

    /// Current connection state
    pub fn connection_state(&self) -> ConnectionState {
        self.health.state()
    }

    /// Run one persistence cycle. Returns the number of rows written back.
    pub async fn run_cycle(&mut self, registry: &ObjectRegistry) -> usize {
        let written = self.cycle_inner(registry).await;
        if self.health.state() == ConnectionState::Failing {
            self.gateway.close().await;
        }
        self.health.end_cycle();
        written
    }

    async fn cycle_inner(&mut self, registry: &ObjectRegistry) -> usize {
        if !self.gateway.is_connected() {
            self.health.connecting();
        }
        if let Err(error) = self.gateway.ensure_connected().await {
            self.health.failing(&error);
            return 0;
        }
        self.health.open();

        // Snapshot under the lock, write back without it
        let commanded = registry.snapshot_commanded();
        let mut written = 0usize;

        for (identifier, value) in commanded {
            if let Err(error) = self.write_back(identifier, value).await {
                self.health.failing(&error);
                break;
            }
            written += 1;
        }

        debug!("persist: wrote back {} output present-values", written);
        written
    }

    async fn write_back(
        &mut self,
        identifier: ObjectIdentifier,
        value: CommandedValue,
    ) -> crate::db::Result<()> {
        match value {
            CommandedValue::Analog(value) => {
                self.gateway
                    .update_analog_output_present_value(identifier.instance, value)
                    .await
            }
            CommandedValue::Binary(value) => {
                self.gateway
                    .update_binary_output_present_value(identifier.instance, value)
                    .await
            }
            CommandedValue::MultiState(value) => {
                self.gateway
                    .update_multi_state_output_present_value(identifier.instance, value)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::db::rows::{AnalogOutputRow, BinaryOutputRow, MultiStateOutputRow};
    use crate::object::{
        AnalogOutput, BacnetObject, BinaryOutput, BinaryPv, CommandedValue, MultiStateOutput,
        ObjectRegistry, PropertyIdentifier, PropertyValue,
    };

    fn registry_with_outputs() -> ObjectRegistry {
        let registry = ObjectRegistry::new();
        registry
            .insert(BacnetObject::AnalogOutput(
                AnalogOutput::from_row(&AnalogOutputRow {
                    id: 1,
                    object_identifier: 2001,
                    object_name: "AO".to_string(),
                    present_value: 0.0,
                    description: None,
                    status_flags: "0000".to_string(),
                    event_state: "normal".to_string(),
                    out_of_service: false,
                    units: "percent".to_string(),
                    relinquish_default: 0.0,
                    current_command_priority: None,
                    cov_increment: 1.0,
                })
                .unwrap(),
            ))
            .unwrap();
        registry
            .insert(BacnetObject::BinaryOutput(
                BinaryOutput::from_row(&BinaryOutputRow {
                    id: 2,
                    object_identifier: 4001,
                    object_name: "BO".to_string(),
                    present_value: "inactive".to_string(),
                    description: None,
                    status_flags: "0000".to_string(),
                    event_state: "normal".to_string(),
                    out_of_service: false,
                    polarity: "normal".to_string(),
                    relinquish_default: "inactive".to_string(),
                    current_command_priority: None,
                })
                .unwrap(),
            ))
            .unwrap();
        registry
            .insert(BacnetObject::MultiStateOutput(
                MultiStateOutput::from_row(&MultiStateOutputRow {
                    id: 3,
                    object_identifier: 6001,
                    object_name: "MSO".to_string(),
                    present_value: 1,
                    description: None,
                    status_flags: "0000".to_string(),
                    event_state: "normal".to_string(),
                    out_of_service: false,
                    number_of_states: 3,
                    state_text: None,
                    relinquish_default: 1,
                    current_command_priority: None,
                })
                .unwrap(),
            ))
            .unwrap();
        registry
    }

    #[test]
    fn test_snapshot_reflects_client_writes() {
        let registry = registry_with_outputs();
        let ids = registry.identifiers();

        registry
            .write_property(ids[0], PropertyIdentifier::PresentValue, PropertyValue::Real(42.0))
            .unwrap();
        registry
            .write_property(ids[1], PropertyIdentifier::PresentValue, PropertyValue::Enumerated(1))
            .unwrap();
        registry
            .write_property(ids[2], PropertyIdentifier::PresentValue, PropertyValue::Unsigned(2))
            .unwrap();

        let snapshot = registry.snapshot_commanded();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[0].1, CommandedValue::Analog(42.0));
        assert_eq!(snapshot[1].1, CommandedValue::Binary(BinaryPv::Active));
        assert_eq!(snapshot[2].1, CommandedValue::MultiState(2));
    }
}
