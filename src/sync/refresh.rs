//! Refresh Task (database -> live objects)
//!
//! Runs every `refreshing_interval` seconds. Each cycle reads all nine
//! object tables, indexes the rows by instance and applies them to the live
//! objects in type order. Properties whose authority lives in memory are
//! never overwritten: the commanded present-value of output objects, the
//! present-value of any object that is out of service, and the
//! database-only command priority column.
//!
//! A malformed row is logged and skipped for the cycle without touching its
//! object; a database failure ends the cycle early and the object set keeps
//! its last-known values (fail-static).

use std::collections::HashMap;

use log::{debug, warn};

use crate::db::rows::*;
use crate::db::Gateway;
use crate::object::{BacnetObject, CovEvent, ObjectRegistry};

use super::{ConnectionState, TaskHealth};

/// One cycle's worth of rows, indexed by instance per type
#[derive(Debug, Default)]
pub struct RowSnapshot {
    pub analog_inputs: HashMap<u32, AnalogInputRow>,
    pub analog_outputs: HashMap<u32, AnalogOutputRow>,
    pub analog_values: HashMap<u32, AnalogValueRow>,
    pub binary_inputs: HashMap<u32, BinaryInputRow>,
    pub binary_outputs: HashMap<u32, BinaryOutputRow>,
    pub binary_values: HashMap<u32, BinaryValueRow>,
    pub multi_state_inputs: HashMap<u32, MultiStateInputRow>,
    pub multi_state_outputs: HashMap<u32, MultiStateOutputRow>,
    pub multi_state_values: HashMap<u32, MultiStateValueRow>,
}

fn index_by_instance<R>(rows: Vec<R>, instance: impl Fn(&R) -> u32) -> HashMap<u32, R> {
    rows.into_iter().map(|row| (instance(&row), row)).collect()
}

/// The periodic database -> objects pass
pub struct RefreshTask {
    gateway: Gateway,
    health: TaskHealth,
}

impl RefreshTask {
    pub fn new(gateway: Gateway) -> Self {
        Self {
            gateway,
            health: TaskHealth::new("refresh"),
        }
    }

    /// Current connection state
    pub fn connection_state(&self) -> ConnectionState {
        self.health.state()
    }

    /// Connect and take the bootstrap snapshot. Unlike the periodic cycle,
    /// a failure here is fatal: objects exist only from rows.
    pub async fn initial_snapshot(&mut self) -> crate::db::Result<RowSnapshot> {
        self.health.connecting();
        self.gateway.ensure_connected().await?;
        self.health.open();
        self.read_snapshot().await
    }

    /// Run one refresh cycle. Returns the change events for the COV
    /// subsystem; an unreachable database yields no events and no changes.
    pub async fn run_cycle(&mut self, registry: &ObjectRegistry) -> Vec<CovEvent> {
        let events = self.cycle_inner(registry).await;
        if self.health.state() == ConnectionState::Failing {
            self.gateway.close().await;
        }
        self.health.end_cycle();
        events
    }

    async fn cycle_inner(&mut self, registry: &ObjectRegistry) -> Vec<CovEvent> {
        if !self.gateway.is_connected() {
            self.health.connecting();
        }
        if let Err(error) = self.gateway.ensure_connected().await {
            self.health.failing(&error);
            return Vec::new();
        }
        self.health.open();

        let snapshot = match self.read_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                self.health.failing(&error);
                return Vec::new();
            }
        };

        apply_snapshot(registry, &snapshot)
    }

    /// Execute the nine read queries and index the rows by instance
    pub async fn read_snapshot(&mut self) -> crate::db::Result<RowSnapshot> {
        let gateway = &mut self.gateway;
        let snapshot = RowSnapshot {
            analog_inputs: index_by_instance(gateway.fetch_analog_inputs().await?, |r| {
                r.object_identifier
            }),
            analog_outputs: index_by_instance(gateway.fetch_analog_outputs().await?, |r| {
                r.object_identifier
            }),
            analog_values: index_by_instance(gateway.fetch_analog_values().await?, |r| {
                r.object_identifier
            }),
            binary_inputs: index_by_instance(gateway.fetch_binary_inputs().await?, |r| {
                r.object_identifier
            }),
            binary_outputs: index_by_instance(gateway.fetch_binary_outputs().await?, |r| {
                r.object_identifier
            }),
            binary_values: index_by_instance(gateway.fetch_binary_values().await?, |r| {
                r.object_identifier
            }),
            multi_state_inputs: index_by_instance(gateway.fetch_multi_state_inputs().await?, |r| {
                r.object_identifier
            }),
            multi_state_outputs: index_by_instance(
                gateway.fetch_multi_state_outputs().await?,
                |r| r.object_identifier,
            ),
            multi_state_values: index_by_instance(gateway.fetch_multi_state_values().await?, |r| {
                r.object_identifier
            }),
        };
        Ok(snapshot)
    }
}

/// Apply one snapshot to every registered object. Objects without a row are
/// left untouched (removal takes effect on restart only); each object's
/// property block updates atomically under the registry lock.
pub fn apply_snapshot(registry: &ObjectRegistry, snapshot: &RowSnapshot) -> Vec<CovEvent> {
    let mut events = Vec::new();
    let mut applied = 0usize;

    for identifier in registry.identifiers() {
        let instance = identifier.instance;
        let result = registry.with_object_mut(identifier, |object| match object {
            BacnetObject::AnalogInput(o) => match snapshot.analog_inputs.get(&instance) {
                Some(row) => o.apply_row(row).map(Some),
                None => Ok(None),
            },
            BacnetObject::AnalogOutput(o) => match snapshot.analog_outputs.get(&instance) {
                Some(row) => o.apply_row(row).map(Some),
                None => Ok(None),
            },
            BacnetObject::AnalogValue(o) => match snapshot.analog_values.get(&instance) {
                Some(row) => o.apply_row(row).map(Some),
                None => Ok(None),
            },
            BacnetObject::BinaryInput(o) => match snapshot.binary_inputs.get(&instance) {
                Some(row) => o.apply_row(row).map(Some),
                None => Ok(None),
            },
            BacnetObject::BinaryOutput(o) => match snapshot.binary_outputs.get(&instance) {
                Some(row) => o.apply_row(row).map(Some),
                None => Ok(None),
            },
            BacnetObject::BinaryValue(o) => match snapshot.binary_values.get(&instance) {
                Some(row) => o.apply_row(row).map(Some),
                None => Ok(None),
            },
            BacnetObject::MultiStateInput(o) => match snapshot.multi_state_inputs.get(&instance) {
                Some(row) => o.apply_row(row).map(Some),
                None => Ok(None),
            },
            BacnetObject::MultiStateOutput(o) => match snapshot.multi_state_outputs.get(&instance) {
                Some(row) => o.apply_row(row).map(Some),
                None => Ok(None),
            },
            BacnetObject::MultiStateValue(o) => match snapshot.multi_state_values.get(&instance) {
                Some(row) => o.apply_row(row).map(Some),
                None => Ok(None),
            },
            BacnetObject::Device(_) => Ok(None),
        });

        match result {
            Ok(Ok(Some(event))) => {
                applied += 1;
                if let Some(event) = event {
                    events.push(event);
                }
            }
            Ok(Ok(None)) => {}
            Ok(Err(error)) => {
                warn!(
                    "refresh: skipping {:?} {}: {}",
                    identifier.object_type, identifier.instance, error
                );
            }
            Err(error) => {
                warn!("refresh: {:?}: {}", identifier, error);
            }
        }
    }

    debug!("refresh: applied {} rows, {} change events", applied, events.len());
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{
        AnalogInput, AnalogOutput, ObjectIdentifier, ObjectType, PropertyIdentifier, PropertyValue,
    };

    fn analog_input_row(instance: u32, pv: f64) -> AnalogInputRow {
        AnalogInputRow {
            id: 1,
            object_identifier: instance,
            object_name: format!("AI{}", instance),
            present_value: pv,
            description: None,
            status_flags: "0000".to_string(),
            event_state: "normal".to_string(),
            out_of_service: false,
            units: "degreesCelsius".to_string(),
            cov_increment: 0.1,
        }
    }

    fn analog_output_row(instance: u32, pv: f64) -> AnalogOutputRow {
        AnalogOutputRow {
            id: 1,
            object_identifier: instance,
            object_name: format!("AO{}", instance),
            present_value: pv,
            description: None,
            status_flags: "0000".to_string(),
            event_state: "normal".to_string(),
            out_of_service: false,
            units: "percent".to_string(),
            relinquish_default: 0.0,
            current_command_priority: None,
            cov_increment: 1.0,
        }
    }

    fn registry_with(rows: &RowSnapshot) -> ObjectRegistry {
        let registry = ObjectRegistry::new();
        for row in rows.analog_inputs.values() {
            registry
                .insert(BacnetObject::AnalogInput(AnalogInput::from_row(row).unwrap()))
                .unwrap();
        }
        for row in rows.analog_outputs.values() {
            registry
                .insert(BacnetObject::AnalogOutput(AnalogOutput::from_row(row).unwrap()))
                .unwrap();
        }
        registry
    }

    #[test]
    fn test_snapshot_applies_input_change() {
        let mut snapshot = RowSnapshot::default();
        snapshot.analog_inputs.insert(1001, analog_input_row(1001, 25.5));
        let registry = registry_with(&snapshot);

        snapshot.analog_inputs.get_mut(&1001).unwrap().present_value = 25.8;
        let events = apply_snapshot(&registry, &snapshot);

        let id = ObjectIdentifier::new(ObjectType::AnalogInput, 1001);
        assert_eq!(
            registry.read_property(id, PropertyIdentifier::PresentValue).unwrap(),
            PropertyValue::Real(25.8)
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].object, id);
    }

    #[test]
    fn test_snapshot_never_overwrites_commanded_output() {
        let mut snapshot = RowSnapshot::default();
        snapshot.analog_outputs.insert(2001, analog_output_row(2001, 0.0));
        let registry = registry_with(&snapshot);

        let id = ObjectIdentifier::new(ObjectType::AnalogOutput, 2001);
        registry
            .write_property(id, PropertyIdentifier::PresentValue, PropertyValue::Real(42.0))
            .unwrap();

        // Database still says 0.0; the commanded value must win
        apply_snapshot(&registry, &snapshot);
        assert_eq!(
            registry.read_property(id, PropertyIdentifier::PresentValue).unwrap(),
            PropertyValue::Real(42.0)
        );
    }

    #[test]
    fn test_object_without_row_left_untouched() {
        let mut snapshot = RowSnapshot::default();
        snapshot.analog_inputs.insert(1001, analog_input_row(1001, 25.5));
        let registry = registry_with(&snapshot);

        let empty = RowSnapshot::default();
        let events = apply_snapshot(&registry, &empty);
        assert!(events.is_empty());

        let id = ObjectIdentifier::new(ObjectType::AnalogInput, 1001);
        assert_eq!(
            registry.read_property(id, PropertyIdentifier::PresentValue).unwrap(),
            PropertyValue::Real(25.5)
        );
    }

    #[test]
    fn test_malformed_row_skips_object_but_not_cycle() {
        let mut snapshot = RowSnapshot::default();
        snapshot.analog_inputs.insert(1001, analog_input_row(1001, 25.5));
        snapshot.analog_inputs.insert(1002, analog_input_row(1002, 30.0));
        let registry = registry_with(&snapshot);

        // 1001's row goes bad, 1002 moves; only 1002 refreshes
        snapshot.analog_inputs.get_mut(&1001).unwrap().status_flags = "012".to_string();
        snapshot.analog_inputs.get_mut(&1001).unwrap().present_value = 99.0;
        snapshot.analog_inputs.get_mut(&1002).unwrap().present_value = 31.0;

        apply_snapshot(&registry, &snapshot);

        let bad = ObjectIdentifier::new(ObjectType::AnalogInput, 1001);
        let good = ObjectIdentifier::new(ObjectType::AnalogInput, 1002);
        assert_eq!(
            registry.read_property(bad, PropertyIdentifier::PresentValue).unwrap(),
            PropertyValue::Real(25.5)
        );
        assert_eq!(
            registry.read_property(good, PropertyIdentifier::PresentValue).unwrap(),
            PropertyValue::Real(31.0)
        );
    }

    #[test]
    fn test_unchanged_row_emits_no_event() {
        let mut snapshot = RowSnapshot::default();
        snapshot.analog_inputs.insert(1001, analog_input_row(1001, 25.5));
        let registry = registry_with(&snapshot);

        let events = apply_snapshot(&registry, &snapshot);
        assert!(events.is_empty());
    }
}
