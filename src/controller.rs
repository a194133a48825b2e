//! Pairing, connection and removal of devices.

use zbus::zvariant::{OwnedValue, Value};

use crate::{
    adapter::{adapter_path, ADAPTER_INTERFACE},
    address::Address,
    bus::{Bus, Method, PropertyMap},
    decode::{decode_entity, Entity},
    device::{device_path, Device, DEVICE_INTERFACE},
    discovery::DiscoverySession,
    matcher::DeviceRef,
    Error, Result,
};

/// How many times [`Controller::connect_with_retry`] calls `Connect` unless told otherwise.
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 2;

/// Issues BlueZ adapter and device commands.
///
/// Adapters are addressed by name (`hci0`), devices by their [`Address`] on that adapter. Object
/// paths are computed locally, so a device does not need to be in any snapshot to be addressed.
/// None of these operations update a [`TopologyCache`][crate::TopologyCache].
pub struct Controller<'b, B: Bus> {
    bus: &'b B,
}

impl<'b, B: Bus> Controller<'b, B> {
    pub fn new(bus: &'b B) -> Self {
        Self { bus }
    }

    async fn call_adapter(&self, adapter: &str, method: Method<'_>) -> Result<()> {
        self.bus.call(&adapter_path(adapter), method).await
    }

    async fn call_device(
        &self,
        adapter: &str,
        address: &Address,
        method: Method<'_>,
    ) -> Result<()> {
        self.bus.call(&device_path(adapter, address), method).await
    }

    /// Puts the adapter into discovery mode.
    pub async fn start_discovery(&self, adapter: &str) -> Result<()> {
        self.call_adapter(adapter, Method::StartDiscovery)
            .await
            .map_err(|e| e.context("start discovery on", adapter))
    }

    pub async fn stop_discovery(&self, adapter: &str) -> Result<()> {
        self.call_adapter(adapter, Method::StopDiscovery)
            .await
            .map_err(|e| e.context("stop discovery on", adapter))
    }

    /// Pairs with a device. The device has to be in pairing mode and visible to the adapter.
    pub async fn pair(&self, adapter: &str, address: &Address) -> Result<()> {
        log::debug!("pairing adapter={} device={}", adapter, address);
        self.call_device(adapter, address, Method::Pair)
            .await
            .map_err(|e| e.context("pair with device", address.to_string()))
    }

    /// Connects an already paired device.
    pub async fn connect(&self, adapter: &str, address: &Address) -> Result<()> {
        log::debug!("connecting adapter={} device={}", adapter, address);
        self.call_device(adapter, address, Method::Connect)
            .await
            .map_err(|e| e.context("connect to device", address.to_string()))
    }

    /// Calls [`Controller::connect`] until it succeeds, at most `attempts` times.
    ///
    /// Returns the number of calls made. "Already connected" is not told apart from "just
    /// connected"; if BlueZ reports the former as an error, it counts as a failed attempt.
    pub async fn connect_with_retry(
        &self,
        adapter: &str,
        address: &Address,
        attempts: u32,
    ) -> Result<u32> {
        let attempts = attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.connect(adapter, address).await {
                Ok(()) => return Ok(attempt),
                Err(e) if attempt < attempts => {
                    log::debug!("connect attempt {}/{} failed: {}", attempt, attempts, e);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Disconnects a device from the adapter. The device stays paired.
    pub async fn disconnect(&self, adapter: &str, address: &Address) -> Result<()> {
        log::debug!("disconnecting adapter={} device={}", adapter, address);
        self.call_device(adapter, address, Method::Disconnect)
            .await
            .map_err(|e| e.context("disconnect from device", address.to_string()))
    }

    /// Removes a device from the adapter, including its pairing.
    ///
    /// Once removed, the device has to be paired again before it can be connected.
    pub async fn remove_device(&self, adapter: &str, address: &Address) -> Result<()> {
        log::debug!("removing adapter={} device={}", adapter, address);
        let path = device_path(adapter, address);
        self.call_adapter(adapter, Method::RemoveDevice(&path))
            .await
            .map_err(|e| e.context("remove device", address.to_string()))
    }

    /// Reads every `org.bluez.Device1` property of a device.
    pub async fn device_properties(&self, adapter: &str, address: &Address) -> Result<PropertyMap> {
        self.bus
            .get_all(&device_path(adapter, address), DEVICE_INTERFACE)
            .await
            .map_err(|e| e.context("read properties of device", address.to_string()))
    }

    /// Fetches a single device straight from the bus, bypassing any snapshot.
    pub async fn device(&self, adapter: &str, address: &Address) -> Result<Device> {
        let path = device_path(adapter, address);
        let props = self.device_properties(adapter, address).await?;
        match decode_entity(&path, DEVICE_INTERFACE, &props) {
            Ok(Some(Entity::Device(device))) => Ok(device),
            Ok(_) => Err(Error::not_found(format!("device {}", address))),
            Err(e) => Err(Error::from(e).context("decode device", address.to_string())),
        }
    }

    /// Writes one `org.bluez.Device1` property (eg. `Trusted`, `Blocked`, `Alias`).
    pub async fn set_device_property(
        &self,
        adapter: &str,
        address: &Address,
        name: &str,
        value: Value<'_>,
    ) -> Result<()> {
        self.bus
            .set(
                &device_path(adapter, address),
                DEVICE_INTERFACE,
                name,
                OwnedValue::from(value),
            )
            .await
            .map_err(|e| e.context("set property of device", address.to_string()))
    }

    /// Reads every `org.bluez.Adapter1` property of an adapter.
    pub async fn adapter_properties(&self, adapter: &str) -> Result<PropertyMap> {
        self.bus
            .get_all(&adapter_path(adapter), ADAPTER_INTERFACE)
            .await
            .map_err(|e| e.context("read properties of adapter", adapter))
    }

    /// Writes one `org.bluez.Adapter1` property (eg. `Powered`, `Discoverable`).
    pub async fn set_adapter_property(
        &self,
        adapter: &str,
        name: &str,
        value: Value<'_>,
    ) -> Result<()> {
        self.bus
            .set(
                &adapter_path(adapter),
                ADAPTER_INTERFACE,
                name,
                OwnedValue::from(value),
            )
            .await
            .map_err(|e| e.context("set property of adapter", adapter))
    }

    pub async fn power_on(&self, adapter: &str) -> Result<()> {
        self.set_adapter_property(adapter, "Powered", Value::from(true))
            .await
    }

    /// Discovers devices on `adapter` and pairs with the first one `wanted` accepts.
    ///
    /// Returns `Ok(None)` if the signal stream ends before a matching device shows up.
    pub async fn discover_and_pair(
        &self,
        adapter: &str,
        wanted: &DeviceRef,
    ) -> Result<Option<Device>> {
        let mut session = DiscoverySession::new(self.bus, adapter);
        session.start().await?;

        let Some(device) = session.wait_for(|d| wanted.accepts(d)).await? else {
            return Ok(None);
        };
        self.pair(adapter, &device.address).await?;
        Ok(Some(device))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bus::Signal,
        testing::{device_object, transport_error, FakeBus},
    };

    fn address() -> Address {
        "2C:41:A1:49:37:CF".parse().unwrap()
    }

    #[test]
    fn device_verbs_target_device_path() {
        let bus = FakeBus::default();
        let controller = Controller::new(&bus);
        pollster::block_on(async {
            controller.pair("hci0", &address()).await?;
            controller.connect("hci0", &address()).await?;
            controller.disconnect("hci0", &address()).await
        })
        .unwrap();

        let calls = bus.calls();
        assert_eq!(bus.methods(), ["Pair", "Connect", "Disconnect"]);
        for call in &calls {
            assert_eq!(call.path, "/org/bluez/hci0/dev_2C_41_A1_49_37_CF");
            assert_eq!(call.interface, "org.bluez.Device1");
            assert_eq!(call.arg, None);
        }
    }

    #[test]
    fn remove_device_targets_adapter() {
        let bus = FakeBus::default();
        pollster::block_on(Controller::new(&bus).remove_device("hci0", &address())).unwrap();

        let calls = bus.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].path, "/org/bluez/hci0");
        assert_eq!(calls[0].interface, "org.bluez.Adapter1");
        assert_eq!(calls[0].method, "RemoveDevice");
        assert_eq!(
            calls[0].arg.as_deref(),
            Some("/org/bluez/hci0/dev_2C_41_A1_49_37_CF")
        );
    }

    #[test]
    fn failures_carry_context() {
        let bus = FakeBus::default();
        bus.push_outcome("Pair", Err(transport_error("Authentication Failed")));
        let err = pollster::block_on(Controller::new(&bus).pair("hci0", &address())).unwrap_err();
        assert!(err.is_transport());
        assert!(err
            .to_string()
            .starts_with("unable to pair with device 2C:41:A1:49:37:CF: "));
        assert_eq!(bus.methods(), ["Pair"]);
    }

    #[test]
    fn disconnect_is_not_retried() {
        let bus = FakeBus::default();
        bus.push_outcome("Disconnect", Err(transport_error("Not Connected")));
        assert!(pollster::block_on(Controller::new(&bus).disconnect("hci0", &address())).is_err());
        assert_eq!(bus.methods(), ["Disconnect"]);
    }

    #[test]
    fn connect_retry_recovers_after_one_failure() {
        let bus = FakeBus::default();
        bus.push_outcome("Connect", Err(transport_error("Operation already in progress")));
        let attempts = pollster::block_on(Controller::new(&bus).connect_with_retry(
            "hci0",
            &address(),
            DEFAULT_CONNECT_ATTEMPTS,
        ))
        .unwrap();
        assert_eq!(attempts, 2);
        assert_eq!(bus.methods(), ["Connect", "Connect"]);
    }

    #[test]
    fn connect_retry_gives_up_after_two_attempts() {
        let bus = FakeBus::default();
        for _ in 0..3 {
            bus.push_outcome("Connect", Err(transport_error("Page Timeout")));
        }
        let err = pollster::block_on(Controller::new(&bus).connect_with_retry(
            "hci0",
            &address(),
            DEFAULT_CONNECT_ATTEMPTS,
        ))
        .unwrap_err();
        assert!(err.is_transport());
        assert_eq!(bus.methods(), ["Connect", "Connect"]);
    }

    #[test]
    fn connect_retry_stops_at_first_success() {
        let bus = FakeBus::default();
        let attempts = pollster::block_on(Controller::new(&bus).connect_with_retry(
            "hci0",
            &address(),
            DEFAULT_CONNECT_ATTEMPTS,
        ))
        .unwrap();
        assert_eq!(attempts, 1);
        assert_eq!(bus.methods(), ["Connect"]);
    }

    #[test]
    fn power_on_sets_adapter_property() {
        let bus = FakeBus::default();
        pollster::block_on(Controller::new(&bus).power_on("hci0")).unwrap();
        let powered = bus
            .property("/org/bluez/hci0", "org.bluez.Adapter1", "Powered")
            .unwrap();
        assert_eq!(&*powered, &Value::from(true));
    }

    #[test]
    fn device_properties_round_trip() {
        let (path, interfaces) = device_object("hci0", "2C:41:A1:49:37:CF", "Bose QC35 II");
        let bus = FakeBus::with_objects([(path, interfaces)]);
        let controller = Controller::new(&bus);
        let props = pollster::block_on(controller.device_properties("hci0", &address())).unwrap();
        assert_eq!(&*props["Alias"], &Value::from("Bose QC35 II"));

        pollster::block_on(controller.set_device_property(
            "hci0",
            &address(),
            "Trusted",
            Value::from(true),
        ))
        .unwrap();
        assert!(bus
            .property(
                "/org/bluez/hci0/dev_2C_41_A1_49_37_CF",
                "org.bluez.Device1",
                "Trusted"
            )
            .is_some());
    }

    #[test]
    fn device_is_read_from_bus() {
        let (path, interfaces) = device_object("hci0", "2C:41:A1:49:37:CF", "Bose QC35 II");
        let bus = FakeBus::with_objects([(path.clone(), interfaces.clone())]);
        let device = pollster::block_on(Controller::new(&bus).device("hci0", &address())).unwrap();
        assert_eq!(device.path, path);
        assert_eq!(device.name, "Bose QC35 II");

        let mut broken = interfaces;
        broken.get_mut("org.bluez.Device1").unwrap().remove("Blocked");
        bus.set_objects([(path, broken)]);
        let err = pollster::block_on(Controller::new(&bus).device("hci0", &address())).unwrap_err();
        assert!(err.is_decode());
    }

    #[test]
    fn discover_and_pair_pairs_first_match() {
        let bus = FakeBus::default();
        let (path, interfaces) = device_object("hci0", "AA:BB:CC:DD:EE:FF", "Pixel Buds");
        bus.push_signal(Signal::interfaces_added(path, interfaces));
        let (path, interfaces) = device_object("hci0", "2C:41:A1:49:37:CF", "Bose QC35 II");
        bus.push_signal(Signal::interfaces_added(path, interfaces));

        let device = pollster::block_on(
            Controller::new(&bus).discover_and_pair("hci0", &DeviceRef::name("qc35")),
        )
        .unwrap()
        .unwrap();
        assert_eq!(device.address, address());

        let calls = bus.calls();
        assert_eq!(bus.methods(), ["StartDiscovery", "Pair"]);
        assert_eq!(calls[1].path, "/org/bluez/hci0/dev_2C_41_A1_49_37_CF");
    }

    #[test]
    fn discover_and_pair_without_match() {
        let bus = FakeBus::default();
        let paired = pollster::block_on(
            Controller::new(&bus).discover_and_pair("hci0", &DeviceRef::name("qc35")),
        )
        .unwrap();
        assert!(paired.is_none());
        assert_eq!(bus.methods(), ["StartDiscovery"]);
    }
}
