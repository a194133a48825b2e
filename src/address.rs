//! Bluetooth device addresses.
//!
//! Device addresses are a link-layer mechanism that allows devices to identify and exchange data
//! with each other.

use core::fmt;
use std::{fmt::Write, num::ParseIntError, str::FromStr};

/// A 6-Byte Bluetooth device address.
///
/// Always rendered as uppercase colon-separated hex (`2C:41:A1:49:37:CF`), which is the form BlueZ
/// reports in the `Address` property and the form used to build device object paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 6]);

impl Address {
    #[inline]
    pub fn from_bytes(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Returns the address with its colons replaced by underscores (`2C_41_A1_49_37_CF`).
    ///
    /// This is the suffix BlueZ appends to `dev_` when naming device objects.
    pub fn path_component(&self) -> String {
        self.to_string().replace(':', "_")
    }
}

impl From<[u8; 6]> for Address {
    #[inline]
    fn from(value: [u8; 6]) -> Self {
        Self(value)
    }
}

impl From<Address> for [u8; 6] {
    #[inline]
    fn from(value: Address) -> Self {
        value.0
    }
}

impl AsRef<[u8; 6]> for Address {
    fn as_ref(&self) -> &[u8; 6] {
        &self.0
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i != 0 {
                f.write_char(':')?;
            }

            write!(f, "{:02X}", byte)?;
        }

        Ok(())
    }
}

/// Parses a Bluetooth [`Address`] from a colon-separated hex string.
///
/// Example: `aa:ff:00:33:22:11`
impl FromStr for Address {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0; 6];
        for (i, s) in s.splitn(6, ':').enumerate() {
            if s.len() != 2 {
                return Err(ParseAddressError::other());
            }
            bytes[i] = u8::from_str_radix(s, 16).map_err(ParseAddressError::parse_int)?;
            if i == bytes.len() - 1 {
                return Ok(Address(bytes));
            }
        }

        Err(ParseAddressError::other())
    }
}

impl<'de> serde::Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The error type returned by the [`FromStr`] implementation of [`Address`].
#[derive(Debug)]
pub struct ParseAddressError(ParseAddressErrorKind);

impl fmt::Display for ParseAddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            ParseAddressErrorKind::ParseInt(e) => e.fmt(f),
            ParseAddressErrorKind::Other => f.write_str("invalid device address"),
        }
    }
}

impl std::error::Error for ParseAddressError {}

#[derive(Debug)]
enum ParseAddressErrorKind {
    ParseInt(ParseIntError),
    Other,
}

impl ParseAddressError {
    fn parse_int(e: ParseIntError) -> Self {
        Self(ParseAddressErrorKind::ParseInt(e))
    }

    fn other() -> Self {
        Self(ParseAddressErrorKind::Other)
    }
}
