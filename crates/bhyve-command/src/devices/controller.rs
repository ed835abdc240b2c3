// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use slog::{debug, Logger};

use crate::caps::{BhyveCaps, CapabilitySource};
use crate::command::DeviceArg;
use crate::error::{Error, Result};
use crate::machine::{
    DiskBus, DiskDevice, DiskSpec, InputBus, InputKind, InputSpec, PciModel,
};
use crate::types::PciAddress;

use super::storage;

/// The PCI root is implied by the hostbridge bhyve always gets, so it only
/// needs to be the right model.
pub fn pci_root(model: PciModel) -> Result<()> {
    match model {
        PciModel::PciRoot => Ok(()),
        other => Err(Error::PciControllerModel(other)),
    }
}

/// One `ahci` device carrying every SATA disk bound to controller `index`,
/// in disk order.
pub fn ahci(
    caps: &dyn CapabilitySource,
    log: &Logger,
    index: u32,
    address: &PciAddress,
    disks: &[DiskSpec],
) -> Result<DeviceArg> {
    let slot32 = caps.has_bhyve(BhyveCaps::AHCI32SLOT);
    let mut ports = String::new();

    for (i, disk) in disks.iter().enumerate() {
        if disk.bus != DiskBus::Sata || disk.controller != index {
            continue;
        }
        debug!(log, "attaching disk to AHCI controller";
            "disk" => i, "controller" => index);

        let path = storage::source_path(disk)?;
        let kind = match disk.device {
            DiskDevice::Disk => "hd",
            DiskDevice::Cdrom => "cd",
            other => return Err(Error::DiskDevice(other)),
        };
        if slot32 {
            ports.push_str(&format!(",{kind}:{path}"));
        } else {
            ports.push_str(&format!("-{kind},{path}"));
        }
    }

    Ok(DeviceArg::slot(format!("{}:0,ahci{}", address.slot(), ports)))
}

/// `xhci` controller hosting the machine's single USB tablet. `nth` counts
/// USB controllers seen so far, this one included.
pub fn usb(
    nth: u32,
    address: &PciAddress,
    inputs: &[InputSpec],
) -> Result<DeviceArg> {
    if nth > 1 {
        return Err(Error::MultipleUsbControllers);
    }

    for input in inputs {
        if input.bus != InputBus::Usb {
            return Err(Error::InputBus(input.bus));
        }
        if input.kind != InputKind::Tablet {
            return Err(Error::InputKind(input.kind));
        }
    }
    if inputs.len() != 1 {
        return Err(Error::InputDeviceCount(inputs.len()));
    }

    Ok(DeviceArg::slot(format!("{address},xhci,tablet")))
}

/// `lpc` bridge. `nth` counts ISA controllers seen so far, this one
/// included.
pub fn isa(nth: u32, address: &PciAddress) -> Result<DeviceArg> {
    if nth > 1 {
        return Err(Error::MultipleIsaControllers);
    }
    Ok(DeviceArg::slot(format!("{}:0,lpc", address.slot())))
}
