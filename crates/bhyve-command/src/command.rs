// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

pub const BHYVE: &str = "/usr/sbin/bhyve";
pub const BHYVECTL: &str = "/usr/sbin/bhyvectl";
pub const BHYVELOAD: &str = "/usr/sbin/bhyveload";

/// Locations of the binaries that synthesized commands invoke.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Binaries {
    #[serde(default = "Binaries::default_bhyve")]
    pub bhyve: String,
    #[serde(default = "Binaries::default_bhyvectl")]
    pub bhyvectl: String,
    #[serde(default = "Binaries::default_bhyveload")]
    pub bhyveload: String,
}

impl Binaries {
    fn default_bhyve() -> String {
        BHYVE.to_string()
    }
    fn default_bhyvectl() -> String {
        BHYVECTL.to_string()
    }
    fn default_bhyveload() -> String {
        BHYVELOAD.to_string()
    }
}

impl Default for Binaries {
    fn default() -> Self {
        Self {
            bhyve: Self::default_bhyve(),
            bhyvectl: Self::default_bhyvectl(),
            bhyveload: Self::default_bhyveload(),
        }
    }
}

/// One device argument: a flag (`-s` or `-l`) and its comma-separated value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceArg {
    pub flag: &'static str,
    pub value: String,
}

impl DeviceArg {
    /// A PCI slot device (`-s <value>`).
    pub fn slot(value: String) -> Self {
        Self { flag: "-s", value }
    }

    /// An LPC device (`-l <value>`).
    pub fn lpc(value: String) -> Self {
        Self { flag: "-l", value }
    }
}

/// A program and its argument list. Nothing here executes it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Command {
    program: String,
    args: Vec<String>,
}

impl Command {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), args: Vec::new() }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    pub fn args_from<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn device(&mut self, dev: DeviceArg) -> &mut Self {
        self.args.push(dev.flag.to_string());
        self.args.push(dev.value);
        self
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{}'", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}
