// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Small value types shared by the machine model and the device builders.

use std::fmt::Display;
use std::io::{Error, ErrorKind};
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

const PCI_SLOTS_PER_BUS: u8 = 32;
const PCI_FUNCTIONS_PER_SLOT: u8 = 8;
const ETHERADDRL: usize = 6;

/// A PCI slot/function pair on bhyve's single host bus. Renders as
/// "slot:function", which is the leading field of every `-s` argument.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Deserialize,
    Serialize,
)]
#[serde(try_from = "PciAddressFields")]
pub struct PciAddress {
    slot: u8,
    function: u8,
}

/// Unchecked form of [`PciAddress`] as written in a machine file.
#[derive(Deserialize)]
struct PciAddressFields {
    slot: u8,
    #[serde(default)]
    function: u8,
}

impl TryFrom<PciAddressFields> for PciAddress {
    type Error = Error;
    fn try_from(fields: PciAddressFields) -> Result<Self, Self::Error> {
        Self::new(fields.slot, fields.function)
    }
}

impl PciAddress {
    pub fn new(slot: u8, function: u8) -> Result<Self, Error> {
        if slot >= PCI_SLOTS_PER_BUS {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!(
                    "PCI slot {} outside range of 0-{}",
                    slot,
                    PCI_SLOTS_PER_BUS - 1
                ),
            ));
        }
        if function >= PCI_FUNCTIONS_PER_SLOT {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!(
                    "PCI function {} outside range of 0-{}",
                    function,
                    PCI_FUNCTIONS_PER_SLOT - 1
                ),
            ));
        }
        Ok(Self { slot, function })
    }

    #[inline]
    pub fn slot(&self) -> u8 {
        self.slot
    }

    #[inline]
    pub fn function(&self) -> u8 {
        self.function
    }
}

impl FromStr for PciAddress {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (slot, function) = s.split_once(':').ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidInput,
                format!("Expected slot:function in PCI address {}", s),
            )
        })?;
        let parse = |f: &str| {
            u8::from_str(f).map_err(|e| {
                Error::new(
                    ErrorKind::InvalidInput,
                    format!("Failed to parse PCI address {}: {}", s, e),
                )
            })
        };
        Self::new(parse(slot)?, parse(function)?)
    }
}

impl Display for PciAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.slot, self.function)
    }
}

/// An Ethernet MAC address, rendered as lowercase colon-separated hex.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MacAddr([u8; ETHERADDRL]);

impl MacAddr {
    pub const fn new(bytes: [u8; ETHERADDRL]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> [u8; ETHERADDRL] {
        self.0
    }
}

impl FromStr for MacAddr {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<u8> = s
            .split(':')
            .map(|f| u8::from_str_radix(f, 16))
            .collect::<Result<_, _>>()
            .map_err(|e| {
                Error::new(
                    ErrorKind::InvalidInput,
                    format!("Failed to parse MAC address {}: {}", s, e),
                )
            })?;
        let bytes: [u8; ETHERADDRL] = fields.try_into().map_err(|_| {
            Error::new(
                ErrorKind::InvalidInput,
                format!("Expected {} octets in MAC address {}", ETHERADDRL, s),
            )
        })?;
        Ok(Self(bytes))
    }
}

impl Display for MacAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl Serialize for MacAddr {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'d> Deserialize<'d> for MacAddr {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'d>,
    {
        let s = String::deserialize(deserializer)?;
        FromStr::from_str(&s).map_err(de::Error::custom)
    }
}
