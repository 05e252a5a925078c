//! Object Registry
//!
//! Holds the live object set: one ordered sequence plus a
//! `(type, instance)` index. Objects are inserted once at bootstrap and
//! removed only at process exit; the registry therefore never shrinks.
//!
//! All property state lives behind a single read/write lock so a client
//! reading through the service layer sees either the pre-cycle or the
//! post-cycle value of a property, never a half-applied row. The lock is
//! only ever held for the duration of a synchronous closure and never
//! across an await point.

use std::collections::HashMap;
use std::sync::RwLock;

use super::{
    BacnetObject, CommandedValue, ObjectError, ObjectIdentifier, PropertyIdentifier,
    PropertyValue, Result,
};

/// Registry of all live objects, keyed by `(type, instance)`
#[derive(Debug, Default)]
pub struct ObjectRegistry {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    objects: HashMap<ObjectIdentifier, BacnetObject>,
    order: Vec<ObjectIdentifier>,
}

impl ObjectRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object. Rejects duplicate `(type, instance)` pairs.
    pub fn insert(&self, object: BacnetObject) -> Result<()> {
        let identifier = object.identifier();
        if !identifier.is_valid() {
            return Err(ObjectError::InvalidConfiguration(format!(
                "instance {} out of range",
                identifier.instance
            )));
        }

        let mut inner = self.inner.write().unwrap();
        if inner.objects.contains_key(&identifier) {
            return Err(ObjectError::InvalidConfiguration(format!(
                "duplicate object {:?} instance {}",
                identifier.object_type, identifier.instance
            )));
        }
        inner.order.push(identifier);
        inner.objects.insert(identifier, object);
        Ok(())
    }

    /// Whether an object exists
    pub fn contains(&self, identifier: ObjectIdentifier) -> bool {
        self.inner.read().unwrap().objects.contains_key(&identifier)
    }

    /// Number of live objects
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().objects.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All identifiers in insertion order (bootstrap inserts in type order,
    /// so this is also the refresh application order)
    pub fn identifiers(&self) -> Vec<ObjectIdentifier> {
        self.inner.read().unwrap().order.clone()
    }

    /// Read a property of an object
    pub fn read_property(
        &self,
        identifier: ObjectIdentifier,
        property: PropertyIdentifier,
    ) -> Result<PropertyValue> {
        let inner = self.inner.read().unwrap();
        match inner.objects.get(&identifier) {
            Some(object) => object.read_property(property),
            None => Err(ObjectError::NotFound),
        }
    }

    /// Run a closure against an object under the read lock
    pub fn with_object<R>(
        &self,
        identifier: ObjectIdentifier,
        f: impl FnOnce(&BacnetObject) -> R,
    ) -> Result<R> {
        let inner = self.inner.read().unwrap();
        match inner.objects.get(&identifier) {
            Some(object) => Ok(f(object)),
            None => Err(ObjectError::NotFound),
        }
    }

    /// Run a closure against an object under the write lock. Used by the
    /// refresh pass so each object's property block updates atomically.
    pub fn with_object_mut<R>(
        &self,
        identifier: ObjectIdentifier,
        f: impl FnOnce(&mut BacnetObject) -> R,
    ) -> Result<R> {
        let mut inner = self.inner.write().unwrap();
        match inner.objects.get_mut(&identifier) {
            Some(object) => Ok(f(object)),
            None => Err(ObjectError::NotFound),
        }
    }

    /// Apply a client WriteProperty
    pub fn write_property(
        &self,
        identifier: ObjectIdentifier,
        property: PropertyIdentifier,
        value: PropertyValue,
    ) -> Result<Option<super::CovEvent>> {
        let mut inner = self.inner.write().unwrap();
        match inner.objects.get_mut(&identifier) {
            Some(object) => object.write_property(property, value),
            None => Err(ObjectError::NotFound),
        }
    }

    /// Snapshot the commanded present-value of every output object. The
    /// persistence task calls this once per cycle; the write lock blocks
    /// client writes only for the duration of the copy.
    pub fn snapshot_commanded(&self) -> Vec<(ObjectIdentifier, CommandedValue)> {
        let inner = self.inner.read().unwrap();
        inner
            .order
            .iter()
            .filter_map(|identifier| {
                inner.objects[identifier]
                    .commanded_value()
                    .map(|value| (*identifier, value))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::rows::{AnalogOutputRow, BinaryValueRow};
    use crate::object::{AnalogOutput, BinaryValue, ObjectType};

    fn analog_output(instance: u32) -> BacnetObject {
        BacnetObject::AnalogOutput(
            AnalogOutput::from_row(&AnalogOutputRow {
                id: 1,
                object_identifier: instance,
                object_name: format!("AO{}", instance),
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
        )
    }

    fn binary_value(instance: u32) -> BacnetObject {
        BacnetObject::BinaryValue(
            BinaryValue::from_row(&BinaryValueRow {
                id: 1,
                object_identifier: instance,
                object_name: format!("BV{}", instance),
                present_value: "active".to_string(),
                description: None,
                status_flags: "0000".to_string(),
                event_state: "normal".to_string(),
                out_of_service: false,
            })
            .unwrap(),
        )
    }

    #[test]
    fn test_duplicate_identifier_rejected() {
        let registry = ObjectRegistry::new();
        registry.insert(analog_output(2001)).unwrap();
        let err = registry.insert(analog_output(2001)).unwrap_err();
        assert!(matches!(err, ObjectError::InvalidConfiguration(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_same_instance_different_type_allowed() {
        let registry = ObjectRegistry::new();
        registry.insert(analog_output(5)).unwrap();
        registry.insert(binary_value(5)).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_commanded_snapshot_covers_outputs_only() {
        let registry = ObjectRegistry::new();
        registry.insert(analog_output(2001)).unwrap();
        registry.insert(binary_value(3001)).unwrap();

        let snapshot = registry.snapshot_commanded();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].0.object_type, ObjectType::AnalogOutput);
    }

    #[test]
    fn test_write_then_read() {
        let registry = ObjectRegistry::new();
        registry.insert(analog_output(2001)).unwrap();
        let id = ObjectIdentifier::new(ObjectType::AnalogOutput, 2001);

        registry
            .write_property(id, PropertyIdentifier::PresentValue, PropertyValue::Real(42.0))
            .unwrap();
        assert_eq!(
            registry.read_property(id, PropertyIdentifier::PresentValue).unwrap(),
            PropertyValue::Real(42.0)
        );
    }

    #[test]
    fn test_unknown_object() {
        let registry = ObjectRegistry::new();
        let id = ObjectIdentifier::new(ObjectType::BinaryValue, 9);
        assert_eq!(
            registry.read_property(id, PropertyIdentifier::PresentValue).unwrap_err(),
            ObjectError::NotFound
        );
    }
}
