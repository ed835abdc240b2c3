// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use slog::{info, Logger};

use super::bootdev::{self, BootDisk, GrubBoot};
use super::LoaderCommand;
use crate::caps::{CapabilitySource, GrubCaps};
use crate::command::Command;
use crate::devices::console;
use crate::error::Result;
use crate::machine::MachineConfig;

const ROOT_CD: &str = "cd";
const ROOT_HD: &str = "hd0,msdos1";

fn map_line(map: &mut String, bd: &BootDisk<'_>) {
    let dev = if bd.is_cdrom() { "(cd)" } else { "(hd0)" };
    map.push_str(&format!("{dev} {}\n", bd.path));
}

/// `grub-bhyve` invocation plus the device.map it reads.
pub(super) fn grub_command(
    log: &Logger,
    caps: &dyn CapabilitySource,
    config: &MachineConfig,
    program: &str,
    devmap_file: &str,
) -> Result<LoaderCommand> {
    let mut map = String::new();
    let root = match bootdev::select_grub(log, config)? {
        GrubBoot::Chosen(bd) => {
            map_line(&mut map, &bd);
            if bd.is_cdrom() {
                ROOT_CD
            } else {
                ROOT_HD
            }
        }
        GrubBoot::Fallback { hd, cd } => {
            for bd in [hd, cd].iter().flatten() {
                info!(log, "picking boot disk";
                    "path" => bd.path, "cdrom" => bd.is_cdrom());
                map_line(&mut map, bd);
            }
            if cd.is_some() {
                ROOT_CD
            } else {
                ROOT_HD
            }
        }
    };

    let mut cmd = Command::new(program);
    cmd.arg("--root").arg(root);
    cmd.arg("--device-map").arg(devmap_file);
    cmd.arg("--memory").arg(config.memory_mib().to_string());

    if caps.has_grub(GrubCaps::CONSDEV) {
        if let Some(serial) = config.serials.first() {
            cmd.arg("--cons-dev").arg(console::nmdm_path(serial)?);
        }
    }

    cmd.arg(&config.name);
    Ok(LoaderCommand { command: cmd, device_map: Some(map) })
}
