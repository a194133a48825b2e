use zbus::{dbus_proxy, zvariant::ObjectPath};

use crate::address::Address;

pub(crate) const ADAPTER_INTERFACE: &str = "org.bluez.Adapter1";

#[dbus_proxy(
    interface = "org.bluez.Adapter1",
    default_service = "org.bluez",
    assume_defaults = false
)]
trait Adapter {
    async fn start_discovery(&self) -> zbus::Result<()>;
    async fn stop_discovery(&self) -> zbus::Result<()>;
    async fn remove_device(&self, device: &ObjectPath<'_>) -> zbus::Result<()>;
}

/// Object path under which BlueZ publishes its adapters.
pub const PATH_PREFIX: &str = "/org/bluez/";

/// A BlueZ Bluetooth adapter, as seen in one snapshot of the object graph.
///
/// Mirrors the `org.bluez.Adapter1` interface. The mode flags reflect the radio state at the time
/// the snapshot was taken; they are not updated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adapter {
    /// Object path, eg. `/org/bluez/hci0`. Uniquely identifies the adapter.
    pub path: String,
    pub name: String,
    pub alias: String,
    pub address: Address,
    pub discoverable: bool,
    pub pairable: bool,
    pub powered: bool,
    pub discovering: bool,
}

impl Adapter {
    /// Returns the adapter's device name (eg. `hci0`), if its path follows the BlueZ convention.
    pub fn id(&self) -> Option<&str> {
        adapter_id(&self.path)
    }
}

/// Returns the object path of the adapter named `adapter` (eg. `hci0` → `/org/bluez/hci0`).
pub fn adapter_path(adapter: &str) -> String {
    format!("{}{}", PATH_PREFIX, adapter)
}

/// Extracts the adapter name from an adapter object path (`/org/bluez/hci0` → `hci0`).
pub fn adapter_id(path: &str) -> Option<&str> {
    path.strip_prefix(PATH_PREFIX)
        .filter(|name| !name.is_empty() && !name.contains('/'))
}
