// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use serde_derive::{Deserialize, Serialize};
use thiserror::Error;

use bhyve_command::{BhyveCaps, Binaries, Capabilities, GrubCaps};

pub use bhyve_command::MachineConfig;

/// A machine file: the machine itself plus what is known about the host
/// binaries that will run it.
#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct Config {
    pub machine: MachineConfig,

    #[serde(default)]
    pub capabilities: CapabilityNames,

    #[serde(default)]
    pub binaries: Binaries,
}

/// Capability flags by name, e.g. `bhyve = ["NET_E1000", "FBUF"]`.
#[derive(Default, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct CapabilityNames {
    #[serde(default)]
    pub bhyve: Vec<String>,

    #[serde(default)]
    pub grub: Vec<String>,
}

impl CapabilityNames {
    pub fn resolve(&self) -> Result<Capabilities, ParseError> {
        let mut caps = Capabilities::default();
        for name in &self.bhyve {
            caps.bhyve |= BhyveCaps::from_name(name)
                .ok_or_else(|| ParseError::Capability(name.clone()))?;
        }
        for name in &self.grub {
            caps.grub |= GrubCaps::from_name(name)
                .ok_or_else(|| ParseError::Capability(name.clone()))?;
        }
        Ok(caps)
    }
}

/// Errors which may be returned when parsing a machine file.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Cannot parse toml: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown capability {0}")]
    Capability(String),
}

/// Parses a TOML file into a configuration object.
pub fn parse<P: AsRef<Path>>(path: P) -> Result<Config, ParseError> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let cfg = toml::from_str::<Config>(&contents)?;
    // Unknown capability names are rejected here, not at synthesis.
    cfg.capabilities.resolve()?;
    Ok(cfg)
}
