//! BlueZ [`Device`] records.

use crate::{
    adapter::{adapter_id, adapter_path},
    address::Address,
};

pub(crate) const DEVICE_INTERFACE: &str = "org.bluez.Device1";

mod private {
    use zbus::dbus_proxy;

    #[dbus_proxy(
        interface = "org.bluez.Device1",
        default_service = "org.bluez",
        assume_defaults = false
    )]
    trait Device {
        async fn pair(&self) -> zbus::Result<()>;
        async fn connect(&self) -> zbus::Result<()>;
        async fn disconnect(&self) -> zbus::Result<()>;
    }
}

pub(crate) use private::DeviceProxy;

/// A remote Bluetooth device known to BlueZ, as seen in one snapshot of the object graph.
///
/// Devices are either known to the adapter (paired before) or currently visible because the
/// adapter is discovering. Mirrors the `org.bluez.Device1` interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Object path, eg. `/org/bluez/hci0/dev_2C_41_A1_49_37_CF`.
    pub path: String,
    pub name: String,
    pub alias: String,
    pub address: Address,
    /// Object path of the adapter this device belongs to. Only used for lookups.
    pub adapter: String,
    pub paired: bool,
    pub connected: bool,
    pub trusted: bool,
    pub blocked: bool,
}

impl Device {
    /// Returns the name of the owning adapter (eg. `hci0`).
    pub fn adapter_id(&self) -> Option<&str> {
        adapter_id(&self.adapter)
    }
}

/// Computes the object path BlueZ uses for the device `address` on the adapter named `adapter`.
///
/// `device_path("hci0", 2C:41:A1:49:37:CF)` is `/org/bluez/hci0/dev_2C_41_A1_49_37_CF`. This lets
/// callers address a device without asking the bus for it first.
pub fn device_path(adapter: &str, address: &Address) -> String {
    format!(
        "{}/dev_{}",
        adapter_path(adapter),
        address.path_component()
    )
}
