//! Device discovery driven by `InterfacesAdded` signals.

use std::collections::VecDeque;

use futures_util::{stream::BoxStream, StreamExt};

use crate::{
    adapter::adapter_path,
    bus::{Bus, Method, Signal, SignalArg},
    decode::decode_devices,
    device::Device,
    Error, Result,
};

/// Lifecycle of a [`DiscoverySession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Created, [`DiscoverySession::start`] not called yet.
    Idle,
    /// The adapter is discovering and signals are being consumed.
    Discovering,
    /// A device was accepted by the predicate passed to [`DiscoverySession::wait_for`].
    Matched,
    /// The signal stream ended (or was cancelled) without a match.
    Exhausted,
    /// Subscribing or starting discovery failed.
    Failed,
}

/// Puts an adapter into discovery mode and reports the devices BlueZ announces.
///
/// Devices seen by a session are kept in a list owned by the session; they are never added to a
/// [`TopologyCache`][crate::TopologyCache]. Refresh the cache to pick them up.
pub struct DiscoverySession<'b, B: Bus> {
    bus: &'b B,
    adapter: String,
    state: State,
    signals: Option<BoxStream<'static, Signal>>,
    pending: VecDeque<Device>,
    seen: Vec<Device>,
}

impl<'b, B: Bus> DiscoverySession<'b, B> {
    /// Creates an idle session for the adapter named `adapter` (eg. `hci0`).
    pub fn new(bus: &'b B, adapter: impl Into<String>) -> Self {
        Self {
            bus,
            adapter: adapter.into(),
            state: State::Idle,
            signals: None,
            pending: VecDeque::new(),
            seen: Vec::new(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn adapter(&self) -> &str {
        &self.adapter
    }

    /// Returns every device this session has decoded so far, in order of first arrival.
    ///
    /// A device announced again (BlueZ drops and re-adds temporary devices) replaces its earlier
    /// entry.
    pub fn devices(&self) -> &[Device] {
        &self.seen
    }

    /// Subscribes to object manager signals and asks the adapter to start discovering.
    ///
    /// The subscription is installed first, so devices announced right after discovery starts are
    /// not missed.
    pub async fn start(&mut self) -> Result<()> {
        if self.state != State::Idle {
            return Err(Error::from(format!(
                "discovery on {} already started",
                self.adapter
            )));
        }

        let signals = match self.bus.watch_object_manager().await {
            Ok(signals) => signals,
            Err(e) => {
                self.state = State::Failed;
                return Err(e.context("watch signals for", self.adapter.clone()));
            }
        };

        let path = adapter_path(&self.adapter);
        if let Err(e) = self
            .bus
            .call(&path, Method::StartDiscovery)
            .await
        {
            self.state = State::Failed;
            return Err(e.context("start discovery on", self.adapter.clone()));
        }

        log::debug!("discovery started on {}", self.adapter);
        self.signals = Some(signals);
        self.state = State::Discovering;
        Ok(())
    }

    /// Waits for the next device announced on this session's adapter.
    ///
    /// Returns `Ok(None)` once the signal stream has ended. There is no timeout.
    pub async fn next_device(&mut self) -> Result<Option<Device>> {
        match self.state {
            State::Idle => {
                return Err(Error::from(format!(
                    "discovery on {} not started",
                    self.adapter
                )))
            }
            State::Discovering => {}
            State::Matched | State::Exhausted | State::Failed => return Ok(None),
        }

        loop {
            if let Some(device) = self.pending.pop_front() {
                return Ok(Some(device));
            }

            let next = match self.signals.as_mut() {
                Some(signals) => signals.next().await,
                None => None,
            };
            let Some(signal) = next else {
                log::debug!("signal stream for {} ended", self.adapter);
                self.close(State::Exhausted);
                return Ok(None);
            };

            let adapter = adapter_path(&self.adapter);
            for device in devices_from_signal(&signal) {
                if device.adapter != adapter {
                    log::debug!("ignoring {} on another adapter", device.path);
                    continue;
                }
                match self.seen.iter_mut().find(|d| d.path == device.path) {
                    Some(known) => *known = device.clone(),
                    None => self.seen.push(device.clone()),
                }
                self.pending.push_back(device);
            }
        }
    }

    /// Consumes announced devices until `predicate` accepts one.
    ///
    /// Returns the accepted device, or `Ok(None)` if the signal stream ended first. Passing a
    /// predicate that never accepts turns this into "report everything until the stream ends".
    pub async fn wait_for<F>(&mut self, mut predicate: F) -> Result<Option<Device>>
    where
        F: FnMut(&Device) -> bool,
    {
        while let Some(device) = self.next_device().await? {
            if predicate(&device) {
                log::debug!("discovery matched {} ({})", device.address, device.name);
                self.close(State::Matched);
                return Ok(Some(device));
            }
        }
        Ok(None)
    }

    /// Stops consuming signals and drops the subscription. The adapter keeps discovering.
    pub fn cancel(&mut self) {
        if self.state == State::Discovering {
            self.close(State::Exhausted);
        }
    }

    /// Cancels the session and asks the adapter to stop discovering.
    pub async fn stop(&mut self) -> Result<()> {
        self.cancel();
        self.bus
            .call(&adapter_path(&self.adapter), Method::StopDiscovery)
            .await
            .map_err(|e| e.context("stop discovery on", self.adapter.clone()))
    }

    fn close(&mut self, state: State) {
        self.signals = None;
        self.pending.clear();
        self.state = state;
    }
}

/// Decodes the devices announced by an `InterfacesAdded` signal.
///
/// Other signals, and signals whose body is not exactly an object path followed by an
/// interfaces-and-properties map, yield nothing.
pub fn devices_from_signal(signal: &Signal) -> Vec<Device> {
    log::debug!(
        "received signal={} ({} args)",
        signal.name(),
        signal.body.len()
    );
    if !signal.is_interfaces_added() {
        return Vec::new();
    }

    match signal.body.as_slice() {
        [SignalArg::ObjectPath(path), SignalArg::Interfaces(interfaces)] => {
            decode_devices(path, interfaces)
        }
        body => {
            log::debug!("dropping malformed {} body: {:?}", signal.name(), body);
            Vec::new()
        }
    }
}
