//! Decoding of BlueZ property bags into [`Adapter`]s and [`Device`]s.
//!
//! Decoding is all-or-nothing per entity: a missing or mistyped property rejects the whole entity
//! with a [`DecodeError`]. Bulk decoding ([`decode_object`]) logs and skips rejected entities so
//! that one malformed object never hides its neighbours.

use core::fmt;

use zbus::zvariant::Value;

use crate::{
    address::Address,
    adapter::{Adapter, ADAPTER_INTERFACE},
    bus::{InterfaceMap, PropertyMap},
    device::{Device, DEVICE_INTERFACE},
};

/// An entity decoded from one interface of a BlueZ object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    Adapter(Adapter),
    Device(Device),
}

/// Decodes the properties of `interface` on the object at `path`.
///
/// Returns `Ok(None)` for interfaces other than `org.bluez.Adapter1` and `org.bluez.Device1`.
pub fn decode_entity(
    path: &str,
    interface: &str,
    properties: &PropertyMap,
) -> Result<Option<Entity>, DecodeError> {
    let props = Properties {
        path,
        interface,
        map: properties,
    };
    match interface {
        ADAPTER_INTERFACE => Ok(Some(Entity::Adapter(Adapter {
            path: path.to_string(),
            name: props.string("Name")?,
            alias: props.string("Alias")?,
            address: props.address("Address")?,
            discoverable: props.boolean("Discoverable")?,
            pairable: props.boolean("Pairable")?,
            powered: props.boolean("Powered")?,
            discovering: props.boolean("Discovering")?,
        }))),
        DEVICE_INTERFACE => Ok(Some(Entity::Device(Device {
            path: path.to_string(),
            name: props.string("Name")?,
            alias: props.string("Alias")?,
            address: props.address("Address")?,
            adapter: props.object_path("Adapter")?,
            paired: props.boolean("Paired")?,
            connected: props.boolean("Connected")?,
            trusted: props.boolean("Trusted")?,
            blocked: props.boolean("Blocked")?,
        }))),
        _ => Ok(None),
    }
}

/// Everything that could be decoded from a single object.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub adapters: Vec<Adapter>,
    pub devices: Vec<Device>,
}

/// Decodes every interface of the object at `path`, skipping entities that fail to decode.
pub fn decode_object(path: &str, interfaces: &InterfaceMap) -> Decoded {
    let mut decoded = Decoded::default();
    for (interface, properties) in interfaces {
        match decode_entity(path, interface, properties) {
            Ok(Some(Entity::Adapter(adapter))) => decoded.adapters.push(adapter),
            Ok(Some(Entity::Device(device))) => decoded.devices.push(device),
            Ok(None) => {}
            Err(e) => log::warn!("skipping {}: {}", path, e),
        }
    }
    decoded
}

/// Decodes only the devices of the object at `path`.
pub fn decode_devices(path: &str, interfaces: &InterfaceMap) -> Vec<Device> {
    decode_object(path, interfaces).devices
}

struct Properties<'a> {
    path: &'a str,
    interface: &'a str,
    map: &'a PropertyMap,
}

impl<'a> Properties<'a> {
    fn get(&self, name: &'static str) -> Result<&'a Value<'static>, DecodeError> {
        self.map
            .get(name)
            .map(|value| &**value)
            .ok_or_else(|| self.error(name, DecodeErrorKind::Missing))
    }

    fn string(&self, name: &'static str) -> Result<String, DecodeError> {
        match self.get(name)? {
            Value::Str(s) => Ok(s.as_str().to_string()),
            other => Err(self.mistyped(name, "s", other)),
        }
    }

    fn boolean(&self, name: &'static str) -> Result<bool, DecodeError> {
        match self.get(name)? {
            Value::Bool(b) => Ok(*b),
            other => Err(self.mistyped(name, "b", other)),
        }
    }

    fn object_path(&self, name: &'static str) -> Result<String, DecodeError> {
        match self.get(name)? {
            Value::ObjectPath(p) => Ok(p.as_str().to_string()),
            other => Err(self.mistyped(name, "o", other)),
        }
    }

    fn address(&self, name: &'static str) -> Result<Address, DecodeError> {
        let s = self.string(name)?;
        s.parse()
            .map_err(|_| self.error(name, DecodeErrorKind::InvalidAddress(s)))
    }

    fn mistyped(&self, name: &'static str, expected: &'static str, found: &Value<'_>) -> DecodeError {
        self.error(
            name,
            DecodeErrorKind::Mistyped {
                expected,
                found: found.value_signature().to_string(),
            },
        )
    }

    fn error(&self, property: &'static str, kind: DecodeErrorKind) -> DecodeError {
        DecodeError {
            path: self.path.to_string(),
            interface: self.interface.to_string(),
            property,
            kind,
        }
    }
}

/// A BlueZ object whose properties do not have the expected shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    path: String,
    interface: String,
    property: &'static str,
    kind: DecodeErrorKind,
}

impl DecodeError {
    /// Returns the object path of the rejected entity.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the name of the offending property.
    pub fn property(&self) -> &str {
        self.property
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DecodeErrorKind {
    Missing,
    Mistyped {
        expected: &'static str,
        found: String,
    },
    InvalidAddress(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}: ", self.interface, self.path)?;
        match &self.kind {
            DecodeErrorKind::Missing => write!(f, "missing property {}", self.property),
            DecodeErrorKind::Mistyped { expected, found } => write!(
                f,
                "property {} has type '{}', expected '{}'",
                self.property, found, expected
            ),
            DecodeErrorKind::InvalidAddress(s) => {
                write!(f, "property {} is not a device address: '{}'", self.property, s)
            }
        }
    }
}

impl std::error::Error for DecodeError {}
