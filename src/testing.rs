//! In-memory [`Bus`] and property bag builders for unit tests.

use std::collections::{HashMap, VecDeque};

use futures_util::{stream::BoxStream, StreamExt};
use parking_lot::Mutex;
use zbus::zvariant::{ObjectPath, OwnedValue, Value};

use crate::{
    adapter::{adapter_path, ADAPTER_INTERFACE},
    address::Address,
    bus::{Bus, InterfaceMap, Method, ManagedObjects, PropertyMap, Signal},
    device::{device_path, DEVICE_INTERFACE},
    Error, Result,
};

pub(crate) fn props(pairs: &[(&str, Value<'_>)]) -> PropertyMap {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), OwnedValue::from(value.clone())))
        .collect()
}

pub(crate) fn adapter_props(name: &str, address: &str) -> PropertyMap {
    props(&[
        ("Name", Value::from(name.to_string())),
        ("Alias", Value::from(name.to_string())),
        ("Address", Value::from(address.to_string())),
        ("Discoverable", Value::from(true)),
        ("Pairable", Value::from(true)),
        ("Powered", Value::from(true)),
        ("Discovering", Value::from(false)),
        ("Class", Value::from(0xc010cu32)),
    ])
}

pub(crate) fn device_props(adapter: &str, address: &str, name: &str) -> PropertyMap {
    let adapter = ObjectPath::try_from(adapter_path(adapter)).unwrap();
    props(&[
        ("Name", Value::from(name.to_string())),
        ("Alias", Value::from(name.to_string())),
        ("Address", Value::from(address.to_string())),
        ("Adapter", Value::from(adapter)),
        ("Paired", Value::from(true)),
        ("Connected", Value::from(false)),
        ("Trusted", Value::from(false)),
        ("Blocked", Value::from(false)),
        ("RSSI", Value::from(-36i16)),
    ])
}

/// The interfaces of a device object as BlueZ announces it.
pub(crate) fn device_object(adapter: &str, address: &str, name: &str) -> (String, InterfaceMap) {
    let path = device_path(adapter, &address.parse::<Address>().unwrap());
    let mut interfaces = InterfaceMap::new();
    interfaces.insert(
        DEVICE_INTERFACE.to_string(),
        device_props(adapter, address, name),
    );
    interfaces.insert("org.freedesktop.DBus.Properties".to_string(), PropertyMap::new());
    (path, interfaces)
}

pub(crate) fn adapter_object(adapter: &str, name: &str, address: &str) -> (String, InterfaceMap) {
    let mut interfaces = InterfaceMap::new();
    interfaces.insert(ADAPTER_INTERFACE.to_string(), adapter_props(name, address));
    (adapter_path(adapter), interfaces)
}

pub(crate) fn transport_error(message: &str) -> Error {
    Error::from(zbus::Error::Failure(message.to_string()))
}

/// A method call recorded by [`FakeBus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Call {
    pub path: String,
    pub interface: String,
    pub method: String,
    pub arg: Option<String>,
}

#[derive(Default)]
pub(crate) struct FakeBus {
    objects: Mutex<ManagedObjects>,
    unreachable: Mutex<bool>,
    outcomes: Mutex<HashMap<String, VecDeque<Result<()>>>>,
    calls: Mutex<Vec<Call>>,
    properties: Mutex<HashMap<(String, String), PropertyMap>>,
    signals: Mutex<Vec<Signal>>,
    subscriptions: Mutex<usize>,
}

impl FakeBus {
    pub fn with_objects(objects: impl IntoIterator<Item = (String, InterfaceMap)>) -> Self {
        let bus = Self::default();
        bus.set_objects(objects);
        bus
    }

    pub fn set_objects(&self, objects: impl IntoIterator<Item = (String, InterfaceMap)>) {
        *self.objects.lock() = objects.into_iter().collect();
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        *self.unreachable.lock() = unreachable;
    }

    /// Queues the outcome of the next call to `method`. Unscripted calls succeed.
    pub fn push_outcome(&self, method: &str, outcome: Result<()>) {
        self.outcomes
            .lock()
            .entry(method.to_string())
            .or_default()
            .push_back(outcome);
    }

    pub fn push_signal(&self, signal: Signal) {
        self.signals.lock().push(signal);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.method.clone()).collect()
    }

    pub fn subscriptions(&self) -> usize {
        *self.subscriptions.lock()
    }

    pub fn property(&self, path: &str, interface: &str, name: &str) -> Option<OwnedValue> {
        self.properties
            .lock()
            .get(&(path.to_string(), interface.to_string()))
            .and_then(|props| props.get(name).cloned())
    }

    fn record(&self, path: &str, interface: &str, method: &str, arg: Option<String>) -> Result<()> {
        self.calls.lock().push(Call {
            path: path.to_string(),
            interface: interface.to_string(),
            method: method.to_string(),
            arg,
        });
        if *self.unreachable.lock() {
            return Err(transport_error("bus unreachable"));
        }
        self.outcomes
            .lock()
            .get_mut(method)
            .and_then(|queue| queue.pop_front())
            .unwrap_or(Ok(()))
    }
}

impl Bus for FakeBus {
    async fn managed_objects(&self) -> Result<ManagedObjects> {
        if *self.unreachable.lock() {
            return Err(transport_error("bus unreachable"));
        }
        Ok(self.objects.lock().clone())
    }

    async fn call(&self, path: &str, method: Method<'_>) -> Result<()> {
        let arg = match method {
            Method::RemoveDevice(device) => Some(device.to_string()),
            _ => None,
        };
        self.record(path, method.interface(), method.name(), arg)
    }

    async fn get_all(&self, path: &str, interface: &str) -> Result<PropertyMap> {
        self.record(path, interface, "GetAll", None)?;
        self.objects
            .lock()
            .get(path)
            .and_then(|intfs| intfs.get(interface))
            .cloned()
            .ok_or_else(|| transport_error("no such object"))
    }

    async fn set(&self, path: &str, interface: &str, name: &str, value: OwnedValue) -> Result<()> {
        self.record(path, interface, "Set", Some(name.to_string()))?;
        self.properties
            .lock()
            .entry((path.to_string(), interface.to_string()))
            .or_default()
            .insert(name.to_string(), value);
        Ok(())
    }

    async fn watch_object_manager(&self) -> Result<BoxStream<'static, Signal>> {
        if *self.unreachable.lock() {
            return Err(transport_error("bus unreachable"));
        }
        *self.subscriptions.lock() += 1;
        let signals = std::mem::take(&mut *self.signals.lock());
        Ok(futures_util::stream::iter(signals).boxed())
    }
}
