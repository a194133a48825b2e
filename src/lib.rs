//! Discover, pair, connect and disconnect Bluetooth devices through BlueZ.
//!
//! The crate snapshots the BlueZ object graph into [`Adapter`]s and [`Device`]s
//! ([`TopologyCache`]), watches `InterfacesAdded` signals while an adapter is discovering
//! ([`DiscoverySession`]), resolves loose device references ([`matcher`]) and issues device
//! commands ([`Controller`]). All bus traffic goes through the [`Bus`] trait, implemented for
//! [`Session`].

mod adapter;
pub mod address;
pub mod bus;
pub mod cli;
pub mod config;
pub mod controller;
pub mod decode;
mod device;
pub mod discovery;
mod error;
pub mod matcher;
pub mod topology;

#[cfg(test)]
mod testing;

pub use adapter::{adapter_id, adapter_path, Adapter};
pub use bus::Bus;
pub use config::Config;
pub use controller::Controller;
pub use device::{device_path, Device};
pub use discovery::DiscoverySession;
pub use error::{Error, Result};
pub use topology::{Snapshot, TopologyCache};

use zbus::{fdo::ObjectManagerProxy, Connection};

/// A cloneable handle to a D-Bus connection.
///
/// This is the production [`Bus`]: it talks to `org.bluez` on the system bus.
#[derive(Clone)]
pub struct Session {
    conn: Connection,
}

impl Session {
    /// Creates a new D-Bus connection.
    pub async fn new() -> Result<Self> {
        Ok(Self {
            conn: Connection::system().await.map_err(Error::from)?,
        })
    }

    /// Connects to the BlueZ D-Bus object manager.
    async fn object_manager(&self) -> Result<ObjectManagerProxy<'static>> {
        Ok(ObjectManagerProxy::builder(&self.conn)
            .destination(bus::SERVICE)
            .map_err(Error::from)?
            .path("/")
            .map_err(Error::from)?
            .build()
            .await
            .map_err(Error::from)?)
    }
}
