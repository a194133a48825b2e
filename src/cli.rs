//! The `bluepair` command line.
//!
//! [`Args`] is the `clap` command tree. [`run`] executes one command against any [`Bus`], so the
//! workflows can be driven by an in-memory bus as well as by a [`Session`][crate::Session].

use std::{io::IsTerminal, path::PathBuf};

use clap::{Parser, Subcommand};
use dialoguer::Select;

use crate::{
    address::Address,
    bus::Bus,
    controller::Controller,
    matcher::{resolve_device, Chooser, DeviceRef},
    Adapter, Config, Device, DiscoverySession, Error, Result, Snapshot, TopologyCache,
};

/// Discover, pair, connect and disconnect Bluetooth devices through BlueZ.
#[derive(Debug, Parser)]
#[command(name = "bluepair", version)]
pub struct Args {
    /// Adapter to use (eg. hci0)
    #[arg(long, global = true, env = "BLUEPAIR_ADAPTER")]
    pub adapter: Option<String>,

    /// Device address (eg. 2C:41:A1:49:37:CF)
    #[arg(long, global = true, env = "BLUEPAIR_DEVICE")]
    pub device: Option<Address>,

    /// Device name, matched loosely against known device names
    #[arg(long = "device-name", global = true)]
    pub device_name: Option<String>,

    /// Print debug output
    #[arg(long, global = true)]
    pub debug: bool,

    /// Configuration file (defaults to bluepair/config.toml in the user config directory)
    #[arg(long, global = true, env = "BLUEPAIR_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// The current status of known adapters and devices
    Status,
    /// Watch for devices as they appear while the adapter discovers
    Discover,
    /// Pair a device to an adapter, requires the device to be in pairing mode
    Pair,
    /// Connect a paired device to an adapter
    Connect,
    /// Disconnect a device from an adapter
    Disconnect,
    /// Remove a device from an adapter
    Remove,
    /// Power the adapter on, pair the device if needed and connect it
    Auto,
}

struct Context<'c, B: Bus> {
    args: Args,
    config: Config,
    bus: &'c B,
    cache: TopologyCache,
    chooser: &'c mut dyn Chooser,
}

impl<B: Bus> Context<'_, B> {
    fn adapter(&self) -> Result<&str> {
        self.args
            .adapter
            .as_deref()
            .or(self.config.adapter.as_deref())
            .ok_or_else(|| Error::new("--adapter is required"))
    }

    /// The device named on the command line, or the configured default if none was named.
    fn device_ref(&self) -> DeviceRef {
        let reference = DeviceRef {
            address: self.args.device,
            name: self.args.device_name.clone(),
        };
        if reference.is_empty() {
            if let Some(address) = self.config.device {
                return DeviceRef::address(address);
            }
        }
        reference
    }

    /// Resolves the adapter and device the command should act on.
    fn target(&mut self) -> Result<(String, Address)> {
        let adapter = self.adapter()?.to_string();
        let reference = self.device_ref();
        let address = resolve_device(&self.cache.snapshot(), &reference, &mut *self.chooser)
            .map_err(|e| e.context("determine", "device"))?;
        Ok((adapter, address))
    }
}

/// Runs one command.
///
/// The topology is read from `bus` once up front. `chooser` is asked to pick a device when a
/// device name matches nothing in that snapshot.
pub async fn run<B: Bus>(
    args: Args,
    config: Config,
    bus: &B,
    chooser: &mut dyn Chooser,
) -> Result<()> {
    let cache = TopologyCache::load(bus).await?;
    let command = args.command;
    let mut cx = Context {
        args,
        config,
        bus,
        cache,
        chooser,
    };

    match command {
        Command::Status => {
            print_snapshot(&cx.cache.snapshot());
            Ok(())
        }
        Command::Discover => discover(&cx).await,
        Command::Pair => pair(&cx).await,
        Command::Connect => connect(&mut cx).await,
        Command::Disconnect => disconnect(&mut cx).await,
        Command::Remove => remove(&mut cx).await,
        Command::Auto => auto(&mut cx).await,
    }
}

async fn discover<B: Bus>(cx: &Context<'_, B>) -> Result<()> {
    let adapter = cx.adapter()?;
    let mut session = DiscoverySession::new(cx.bus, adapter);
    session.start().await?;

    print_snapshot(&cx.cache.snapshot());
    println!("watching for new bluetooth events, make sure to put device into pairing mode");
    session
        .wait_for(|device| {
            println!("{}", DeviceLine(device));
            false
        })
        .await?;
    Ok(())
}

async fn pair<B: Bus>(cx: &Context<'_, B>) -> Result<()> {
    let adapter = cx.adapter()?;
    let reference = cx.device_ref();
    let controller = Controller::new(cx.bus);

    // BlueZ does not announce devices it already knows again, so those are paired directly.
    let snapshot = cx.cache.snapshot();
    if !reference.is_empty() {
        let known = snapshot
            .devices_on(adapter)
            .filter(|d| reference.accepts(d))
            .collect::<Vec<_>>();
        if let Some(device) = known.iter().find(|d| d.paired) {
            println!("device {:?} is already paired", device.name);
            return Ok(());
        }
        if let Some(device) = known.first() {
            controller.pair(adapter, &device.address).await?;
            println!("successfully paired {:?} and {:?}", device.address.to_string(), adapter);
            return Ok(());
        }
    }

    log::debug!("trying to pair bluetooth devices to {:?}", adapter);
    println!("waiting for {}, make sure to put it into pairing mode", reference);
    match controller.discover_and_pair(adapter, &reference).await? {
        Some(device) => {
            println!("successfully paired {:?} and {:?}", device.address.to_string(), adapter);
            Ok(())
        }
        None => Err(Error::new(format!(
            "discovery on {} ended before {} showed up",
            adapter, reference
        ))),
    }
}

async fn connect<B: Bus>(cx: &mut Context<'_, B>) -> Result<()> {
    let (adapter, address) = cx.target()?;
    Controller::new(cx.bus).connect(&adapter, &address).await?;
    println!("successfully connected {:?} and {:?}", address.to_string(), adapter);
    Ok(())
}

async fn disconnect<B: Bus>(cx: &mut Context<'_, B>) -> Result<()> {
    let (adapter, address) = cx.target()?;
    Controller::new(cx.bus).disconnect(&adapter, &address).await?;
    println!("successfully disconnected {:?} and {:?}", address.to_string(), adapter);
    Ok(())
}

async fn remove<B: Bus>(cx: &mut Context<'_, B>) -> Result<()> {
    let (adapter, address) = cx.target()?;
    Controller::new(cx.bus).remove_device(&adapter, &address).await?;
    println!("successfully removed {:?} and {:?}", address.to_string(), adapter);
    Ok(())
}

async fn auto<B: Bus>(cx: &mut Context<'_, B>) -> Result<()> {
    let (adapter, address) = cx.target()?;
    let controller = Controller::new(cx.bus);
    controller.power_on(&adapter).await?;

    if let Some(device) = cx.cache.snapshot().device(&address) {
        if !device.paired {
            log::debug!("{} is not paired yet", address);
            controller.pair(&adapter, &address).await?;
        }
    }

    let attempts = controller
        .connect_with_retry(&adapter, &address, cx.config.connect_attempts)
        .await?;
    log::debug!("connected after {} attempt(s)", attempts);
    println!("successfully connected {:?} and {:?}", address.to_string(), adapter);
    Ok(())
}

fn print_snapshot(snapshot: &Snapshot) {
    print!("{}", Status(snapshot));
}

/// The `status` listing of a snapshot.
struct Status<'a>(&'a Snapshot);

impl std::fmt::Display for Status<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Adapters:")?;
        for (i, adapter) in self.0.adapters.iter().enumerate() {
            writeln!(f, "{}) {}", i + 1, AdapterLine(adapter))?;
        }
        writeln!(f, "Connected devices:")?;
        for (i, device) in self.0.devices.iter().enumerate() {
            writeln!(f, "{}) {}", i + 1, DeviceLine(device))?;
        }
        Ok(())
    }
}

struct AdapterLine<'a>(&'a Adapter);

impl std::fmt::Display for AdapterLine<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let a = self.0;
        write!(
            f,
            "name={:?} alias={:?} address={:?} discoverable={} pairable={} powered={} discovering={}",
            a.name,
            a.alias,
            a.address.to_string(),
            a.discoverable,
            a.pairable,
            a.powered,
            a.discovering,
        )
    }
}

struct DeviceLine<'a>(&'a Device);

impl std::fmt::Display for DeviceLine<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let d = self.0;
        write!(
            f,
            "name={:?} alias={:?} address={:?} adapter={:?} paired={} connected={} trusted={} blocked={}",
            d.name,
            d.alias,
            d.address.to_string(),
            d.adapter,
            d.paired,
            d.connected,
            d.trusted,
            d.blocked,
        )
    }
}

/// Asks on the terminal which device to use. Declines when stdin is not a terminal.
pub struct PromptChooser;

impl Chooser for PromptChooser {
    fn choose(&mut self, devices: &[Device]) -> Result<Option<usize>> {
        if !std::io::stdin().is_terminal() {
            return Ok(None);
        }
        let items = devices
            .iter()
            .map(|d| format!("{}, {}", d.name, d.address))
            .collect::<Vec<_>>();
        Select::new()
            .with_prompt("Choose a bluetooth device")
            .items(&items)
            .default(0)
            .interact_opt()
            .map_err(|e| Error::new(format!("prompt failed: {}", e)))
    }
}
