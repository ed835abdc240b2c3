// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::command::DeviceArg;
use crate::error::{Error, Result};
use crate::machine::{CharSource, SerialSpec};

/// LPC serial port names, indexed by target port.
const COM_PORTS: [&str; 2] = ["com1", "com2"];

/// Guest-side path of an nmdm(4) console, the only kind bhyve and
/// grub-bhyve can attach.
pub fn nmdm_path(spec: &SerialSpec) -> Result<&str> {
    match &spec.source {
        CharSource::Nmdm { master, .. } => Ok(master.as_str()),
        other => Err(Error::ConsoleType(other.type_name())),
    }
}

/// Serial console on one of the two LPC UARTs.
pub fn com(spec: &SerialSpec) -> Result<DeviceArg> {
    let path = nmdm_path(spec)?;
    let port = usize::try_from(spec.port)
        .ok()
        .and_then(|idx| COM_PORTS.get(idx))
        .ok_or(Error::SerialPort(spec.port))?;

    Ok(DeviceArg::lpc(format!("{port},{path}")))
}
