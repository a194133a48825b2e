//! Point-in-time snapshots of the adapters and devices managed by BlueZ.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::{
    adapter::{adapter_id, Adapter},
    address::Address,
    bus::{Bus, ManagedObjects},
    decode::decode_object,
    device::Device,
    matcher::similar,
    Result,
};

/// The adapters and devices decoded from one `GetManagedObjects` call.
///
/// Both collections are ordered by object path, so iterating two snapshots of an unchanged object
/// graph yields the same sequence.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub adapters: Vec<Adapter>,
    pub devices: Vec<Device>,
}

impl Snapshot {
    /// Decodes a snapshot from the managed object graph. Malformed entities are skipped.
    pub fn from_objects(objects: &ManagedObjects) -> Self {
        let mut snapshot = Self::default();
        for (path, interfaces) in objects {
            let decoded = decode_object(path, interfaces);
            snapshot.adapters.extend(decoded.adapters);
            snapshot.devices.extend(decoded.devices);
        }
        snapshot
    }

    /// Looks up an adapter by name (`hci0`) or object path (`/org/bluez/hci0`).
    pub fn adapter(&self, adapter: &str) -> Option<&Adapter> {
        self.adapters
            .iter()
            .find(|a| a.path == adapter || a.id() == Some(adapter))
    }

    /// Looks up a device by address, on any adapter.
    pub fn device(&self, address: &Address) -> Option<&Device> {
        self.devices.iter().find(|d| d.address == *address)
    }

    /// Returns the devices belonging to the adapter named `adapter`.
    pub fn devices_on<'a>(&'a self, adapter: &'a str) -> impl Iterator<Item = &'a Device> + 'a {
        self.devices
            .iter()
            .filter(move |d| adapter_id(&d.adapter) == Some(adapter) || d.adapter == adapter)
    }

    /// Returns the first device whose name is [`similar`] to `fragment`.
    ///
    /// Name collisions are not detected: the first device in snapshot order wins.
    pub fn find_similar(&self, fragment: &str) -> Option<&Device> {
        self.devices.iter().find(|d| similar(fragment, &d.name))
    }
}

/// Holds the latest [`Snapshot`] of the BlueZ object graph.
///
/// [`TopologyCache::refresh`] replaces the snapshot wholesale; readers holding an earlier
/// [`Arc<Snapshot>`] keep seeing a complete, consistent view.
#[derive(Debug, Default)]
pub struct TopologyCache {
    current: RwLock<Arc<Snapshot>>,
}

impl TopologyCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache populated from `bus`.
    pub async fn load<B: Bus>(bus: &B) -> Result<Self> {
        let cache = Self::new();
        cache.refresh(bus).await?;
        Ok(cache)
    }

    /// Re-reads the managed object graph and swaps in the new snapshot.
    ///
    /// If the bus call fails, the previous snapshot is left in place.
    pub async fn refresh<B: Bus>(&self, bus: &B) -> Result<Arc<Snapshot>> {
        let objects = bus
            .managed_objects()
            .await
            .map_err(|e| e.context("list", "managed objects"))?;
        let snapshot = Arc::new(Snapshot::from_objects(&objects));
        log::debug!(
            "snapshot holds {} adapter(s) and {} device(s)",
            snapshot.adapters.len(),
            snapshot.devices.len()
        );
        *self.current.write() = snapshot.clone();
        Ok(snapshot)
    }

    /// Returns the current snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{adapter_object, device_object, FakeBus};

    fn bus() -> FakeBus {
        FakeBus::with_objects([
            adapter_object("hci0", "jonathan-Blade", "9C:B6:D0:1C:BB:B0"),
            device_object("hci0", "2C:41:A1:49:37:CF", "Bose QC35 II"),
            device_object("hci0", "AA:BB:CC:DD:EE:FF", "Pixel Buds"),
        ])
    }

    #[test]
    fn refresh_populates() {
        let bus = bus();
        let cache = TopologyCache::new();
        assert_eq!(*cache.snapshot(), Snapshot::default());

        pollster::block_on(cache.refresh(&bus)).unwrap();
        let snapshot = cache.snapshot();
        assert_eq!(snapshot.adapters.len(), 1);
        assert_eq!(snapshot.devices.len(), 2);
        assert_eq!(snapshot.adapter("hci0").unwrap().alias, "jonathan-Blade");
        assert!(snapshot.adapter("/org/bluez/hci0").is_some());
        assert_eq!(snapshot.devices_on("hci0").count(), 2);
        assert_eq!(snapshot.devices_on("hci1").count(), 0);
    }

    #[test]
    fn refresh_is_idempotent() {
        let bus = bus();
        let cache = TopologyCache::new();
        let first = pollster::block_on(cache.refresh(&bus)).unwrap();
        let second = pollster::block_on(cache.refresh(&bus)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn failed_refresh_keeps_previous_snapshot() {
        let bus = bus();
        let cache = pollster::block_on(TopologyCache::load(&bus)).unwrap();
        let before = cache.snapshot();

        bus.set_unreachable(true);
        let err = pollster::block_on(cache.refresh(&bus)).unwrap_err();
        assert!(err.is_transport());
        assert_eq!(cache.snapshot(), before);
    }

    #[test]
    fn refresh_replaces_rather_than_merges() {
        let bus = bus();
        let cache = pollster::block_on(TopologyCache::load(&bus)).unwrap();
        bus.set_objects([adapter_object("hci0", "jonathan-Blade", "9C:B6:D0:1C:BB:B0")]);
        pollster::block_on(cache.refresh(&bus)).unwrap();
        assert!(cache.snapshot().devices.is_empty());
    }

    #[test]
    fn malformed_device_is_skipped() {
        let (path, mut broken) = device_object("hci0", "11:22:33:44:55:66", "Broken");
        broken
            .get_mut("org.bluez.Device1")
            .unwrap()
            .remove("Connected");
        let bus = bus();
        let mut objects = pollster::block_on(bus.managed_objects()).unwrap();
        objects.insert(path, broken);
        bus.set_objects(objects);

        let cache = pollster::block_on(TopologyCache::load(&bus)).unwrap();
        let snapshot = cache.snapshot();
        assert_eq!(snapshot.devices.len(), 2);
        assert_eq!(snapshot.adapters.len(), 1);
    }

    #[test]
    fn first_similar_device_wins() {
        let bus = FakeBus::with_objects([
            device_object("hci0", "AA:BB:CC:DD:EE:01", "Bose QC35 II"),
            device_object("hci0", "AA:BB:CC:DD:EE:02", "Bose QC-35 II (kitchen)"),
        ]);
        let cache = pollster::block_on(TopologyCache::load(&bus)).unwrap();
        let snapshot = cache.snapshot();
        let found = snapshot.find_similar("qc35").unwrap();
        assert_eq!(found.address.to_string(), "AA:BB:CC:DD:EE:01");
        assert!(snapshot.find_similar("airpods").is_none());
    }
}
