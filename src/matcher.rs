//! Matching loosely typed device references against known devices.

use crate::{address::Address, device::Device, topology::Snapshot, Error, Result};

/// Returns whether `fragment` loosely matches `candidate`.
///
/// Both strings are lower-cased and stripped of spaces, underscores, hyphens and slashes; the
/// fragment then has to occur somewhere in the candidate. `similar("qc35", "Bose QC-35 II")` holds.
///
/// An empty fragment matches every candidate.
pub fn similar(fragment: &str, candidate: &str) -> bool {
    let fragment = normalize(fragment);
    let candidate = normalize(candidate);

    candidate.starts_with(&fragment)
        || candidate.ends_with(&fragment)
        || candidate.contains(&fragment)
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-' | '/'))
        .collect::<String>()
        .to_lowercase()
}

/// A user's reference to a device: an exact address, a name fragment, both, or neither.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceRef {
    pub address: Option<Address>,
    pub name: Option<String>,
}

impl DeviceRef {
    pub fn address(address: Address) -> Self {
        Self {
            address: Some(address),
            name: None,
        }
    }

    pub fn name(name: impl Into<String>) -> Self {
        Self {
            address: None,
            name: Some(name.into()),
        }
    }

    /// Returns whether neither an address nor a name was given.
    pub fn is_empty(&self) -> bool {
        self.address.is_none() && self.name.is_none()
    }

    /// Returns whether `device` is the device this reference points at.
    ///
    /// An empty reference accepts any device.
    pub fn accepts(&self, device: &Device) -> bool {
        if self.is_empty() {
            return true;
        }
        self.address.map_or(false, |a| a == device.address)
            || self
                .name
                .as_deref()
                .map_or(false, |name| similar(name, &device.name))
    }
}

impl std::fmt::Display for DeviceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.address, &self.name) {
            (Some(address), Some(name)) => write!(f, "device {} ({:?})", address, name),
            (Some(address), None) => write!(f, "device {}", address),
            (None, Some(name)) => write!(f, "device {:?}", name),
            (None, None) => f.write_str("any device"),
        }
    }
}

/// Lets the user pick one device out of a list.
pub trait Chooser {
    /// Returns the index of the chosen device, or `None` if no choice can be made.
    fn choose(&mut self, devices: &[Device]) -> Result<Option<usize>>;
}

/// A [`Chooser`] that never chooses, for non-interactive use.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoChooser;

impl Chooser for NoChooser {
    fn choose(&mut self, _: &[Device]) -> Result<Option<usize>> {
        Ok(None)
    }
}

/// Resolves `reference` to a device address using the devices in `snapshot`.
///
/// A name fragment is tried first and wins over an explicit address. Without a usable reference
/// the `chooser` is asked to pick one of the known devices.
pub fn resolve_device(
    snapshot: &Snapshot,
    reference: &DeviceRef,
    chooser: &mut dyn Chooser,
) -> Result<Address> {
    if let (Some(address), None) = (reference.address, &reference.name) {
        return Ok(address);
    }

    if snapshot.devices.is_empty() {
        log::debug!("no bluetooth devices known");
        return match reference.address {
            Some(address) => Ok(address),
            None => Err(Error::not_found("bluetooth device")),
        };
    }

    if let Some(name) = &reference.name {
        if let Some(device) = snapshot.find_similar(name) {
            log::debug!("device name matches {:?}, using {}", device.name, device.address);
            return Ok(device.address);
        }
    }

    if let Some(address) = reference.address {
        return Ok(address);
    }

    match chooser.choose(&snapshot.devices)? {
        Some(i) => snapshot
            .devices
            .get(i)
            .map(|d| d.address)
            .ok_or_else(|| Error::from(format!("invalid device choice {}", i + 1))),
        None => Err(Error::not_found(reference.to_string())),
    }
}
