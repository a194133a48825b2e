//! The bus seam between BlueZ and the rest of the crate.
//!
//! Everything above this module talks to BlueZ through the [`Bus`] trait, which only knows how to
//! call a method on an object, read or write properties, snapshot the managed object graph and
//! subscribe to object manager signals. [`Session`] implements it with `zbus` proxies for the BlueZ
//! interfaces.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use futures_util::{stream::BoxStream, StreamExt};
use zbus::{
    fdo::{InterfacesAdded, PropertiesProxy},
    names::InterfaceName,
    zvariant::{ObjectPath, OwnedValue, Value},
    Message,
};

use crate::{
    adapter::{AdapterProxy, ADAPTER_INTERFACE},
    device::{DeviceProxy, DEVICE_INTERFACE},
    Error, Result, Session,
};

/// Well-known bus name of the BlueZ daemon.
pub const SERVICE: &str = "org.bluez";

pub(crate) const OBJECT_MANAGER_INTERFACE: &str = "org.freedesktop.DBus.ObjectManager";
pub(crate) const INTERFACES_ADDED: &str = "InterfacesAdded";

/// Property name to dynamically-typed value, as carried by `a{sv}`.
pub type PropertyMap = HashMap<String, OwnedValue>;

/// Interface name to its properties, as carried by `a{sa{sv}}`.
pub type InterfaceMap = HashMap<String, PropertyMap>;

/// The result of `GetManagedObjects`, keyed (and therefore ordered) by object path.
pub type ManagedObjects = BTreeMap<String, InterfaceMap>;

/// A BlueZ method this crate calls on an adapter or device object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method<'a> {
    StartDiscovery,
    StopDiscovery,
    /// Removes the device at the given object path from the adapter.
    RemoveDevice(&'a str),
    Pair,
    Connect,
    Disconnect,
}

impl Method<'_> {
    /// The interface the method belongs to.
    pub fn interface(&self) -> &'static str {
        match self {
            Method::StartDiscovery | Method::StopDiscovery | Method::RemoveDevice(_) => {
                ADAPTER_INTERFACE
            }
            Method::Pair | Method::Connect | Method::Disconnect => DEVICE_INTERFACE,
        }
    }

    /// The D-Bus member name (eg. `StartDiscovery`).
    pub fn name(&self) -> &'static str {
        match self {
            Method::StartDiscovery => "StartDiscovery",
            Method::StopDiscovery => "StopDiscovery",
            Method::RemoveDevice(_) => "RemoveDevice",
            Method::Pair => "Pair",
            Method::Connect => "Connect",
            Method::Disconnect => "Disconnect",
        }
    }
}

/// One argument of a received signal body.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalArg {
    ObjectPath(String),
    Interfaces(InterfaceMap),
    /// An argument that could not be read as one of the above; holds its D-Bus signature.
    Other(String),
}

/// A signal received from the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub interface: String,
    pub member: String,
    pub body: Vec<SignalArg>,
}

impl Signal {
    /// Builds an `InterfacesAdded` signal for `path`.
    pub fn interfaces_added(path: impl Into<String>, interfaces: InterfaceMap) -> Self {
        Self {
            interface: OBJECT_MANAGER_INTERFACE.to_string(),
            member: INTERFACES_ADDED.to_string(),
            body: vec![
                SignalArg::ObjectPath(path.into()),
                SignalArg::Interfaces(interfaces),
            ],
        }
    }

    /// Returns whether this is an `org.freedesktop.DBus.ObjectManager.InterfacesAdded` signal.
    pub fn is_interfaces_added(&self) -> bool {
        self.interface == OBJECT_MANAGER_INTERFACE && self.member == INTERFACES_ADDED
    }

    /// Returns the fully qualified signal name (`interface.member`).
    pub fn name(&self) -> String {
        format!("{}.{}", self.interface, self.member)
    }

    fn from_message(message: Arc<Message>) -> Self {
        let interface = message
            .interface()
            .map(|i| i.to_string())
            .unwrap_or_default();
        let member = message.member().map(|m| m.to_string()).unwrap_or_default();

        let body = match InterfacesAdded::from_message(message.clone()) {
            Some(added) => match added.args() {
                Ok(args) => {
                    let interfaces = args
                        .interfaces_and_properties
                        .into_iter()
                        .map(|(name, props)| {
                            let props = props
                                .into_iter()
                                .map(|(prop, value)| (prop.to_string(), OwnedValue::from(value)))
                                .collect();
                            (name.to_string(), props)
                        })
                        .collect();
                    vec![
                        SignalArg::ObjectPath(args.object_path.to_string()),
                        SignalArg::Interfaces(interfaces),
                    ]
                }
                Err(e) => {
                    log::debug!("unreadable {} body: {}", INTERFACES_ADDED, e);
                    match message.body_signature() {
                        Ok(signature) => vec![SignalArg::Other(signature.to_string())],
                        Err(_) => Vec::new(),
                    }
                }
            },
            None => Vec::new(),
        };

        Self {
            interface,
            member,
            body,
        }
    }
}

/// Request/reply and publish/subscribe access to the BlueZ object graph.
#[allow(async_fn_in_trait)]
pub trait Bus {
    /// Calls `org.freedesktop.DBus.ObjectManager.GetManagedObjects` on the BlueZ root object.
    async fn managed_objects(&self) -> Result<ManagedObjects>;

    /// Calls `method` on the adapter or device object at `path`.
    async fn call(&self, path: &str, method: Method<'_>) -> Result<()>;

    /// Fetches every property of `interface` on the object at `path`.
    async fn get_all(&self, path: &str, interface: &str) -> Result<PropertyMap>;

    /// Writes one property of `interface` on the object at `path`.
    async fn set(&self, path: &str, interface: &str, name: &str, value: OwnedValue)
        -> Result<()>;

    /// Subscribes to object manager signals emitted by BlueZ on the root path.
    ///
    /// The match rule is registered before this returns, so no signal emitted afterwards is
    /// missed. Dropping the stream unsubscribes.
    async fn watch_object_manager(&self) -> Result<BoxStream<'static, Signal>>;
}

impl Bus for Session {
    async fn managed_objects(&self) -> Result<ManagedObjects> {
        let manager = self.object_manager().await?;
        let objects = manager.get_managed_objects().await.map_err(Error::from)?;
        Ok(objects
            .into_iter()
            .map(|(path, intfs)| {
                let intfs = intfs
                    .into_iter()
                    .map(|(name, props)| (name.as_str().to_string(), props))
                    .collect();
                (path.as_str().to_string(), intfs)
            })
            .collect())
    }

    async fn call(&self, path: &str, method: Method<'_>) -> Result<()> {
        log::debug!("calling {}.{} on {}", method.interface(), method.name(), path);
        let reply = match method {
            Method::StartDiscovery => self.adapter_proxy(path).await?.start_discovery().await,
            Method::StopDiscovery => self.adapter_proxy(path).await?.stop_discovery().await,
            Method::RemoveDevice(device) => {
                let device = ObjectPath::try_from(device)
                    .map_err(zbus::Error::from)
                    .map_err(Error::from)?;
                self.adapter_proxy(path)
                    .await?
                    .remove_device(&device)
                    .await
            }
            Method::Pair => self.device_proxy(path).await?.pair().await,
            Method::Connect => self.device_proxy(path).await?.connect().await,
            Method::Disconnect => self.device_proxy(path).await?.disconnect().await,
        };
        reply.map_err(Error::from)
    }

    async fn get_all(&self, path: &str, interface: &str) -> Result<PropertyMap> {
        let interface = InterfaceName::try_from(interface)
            .map_err(zbus::Error::from)
            .map_err(Error::from)?;
        self.properties_proxy(path)
            .await?
            .get_all(interface)
            .await
            .map_err(Error::from)
    }

    async fn set(
        &self,
        path: &str,
        interface: &str,
        name: &str,
        value: OwnedValue,
    ) -> Result<()> {
        log::debug!("setting {}.{} on {}", interface, name, path);
        let interface = InterfaceName::try_from(interface)
            .map_err(zbus::Error::from)
            .map_err(Error::from)?;
        let value: &Value<'_> = &value;
        self.properties_proxy(path)
            .await?
            .set(interface, name, value)
            .await
            .map_err(Error::from)
    }

    async fn watch_object_manager(&self) -> Result<BoxStream<'static, Signal>> {
        let manager = self.object_manager().await?;
        let signals = manager.receive_all_signals().await.map_err(Error::from)?;
        Ok(signals
            .map(Signal::from_message)
            .boxed())
    }
}

impl Session {
    async fn adapter_proxy<'p>(&self, path: &'p str) -> Result<AdapterProxy<'p>> {
        AdapterProxy::builder(&self.conn)
            .path(path)
            .map_err(Error::from)?
            .build()
            .await
            .map_err(Error::from)
    }

    async fn device_proxy<'p>(&self, path: &'p str) -> Result<DeviceProxy<'p>> {
        DeviceProxy::builder(&self.conn)
            .path(path)
            .map_err(Error::from)?
            .build()
            .await
            .map_err(Error::from)
    }

    async fn properties_proxy<'p>(&self, path: &'p str) -> Result<PropertiesProxy<'p>> {
        PropertiesProxy::builder(&self.conn)
            .destination(SERVICE)
            .map_err(Error::from)?
            .path(path)
            .map_err(Error::from)?
            .build()
            .await
            .map_err(Error::from)
    }
}
