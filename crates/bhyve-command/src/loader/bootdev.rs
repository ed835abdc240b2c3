// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Boot device selection.
//!
//! bhyve has no notion of per-device boot order, so exactly one disk (or,
//! for grub-bhyve, one disk and one CD-ROM) has to be picked up front.

use slog::{debug, Logger};

use crate::error::{Error, Result};
use crate::machine::{BootDevice, DiskDevice, DiskSpec, MachineConfig};

/// A disk that a loader can open, along with its resolved path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BootDisk<'a> {
    pub disk: &'a DiskSpec,
    pub path: &'a str,
}

impl BootDisk<'_> {
    pub fn is_cdrom(&self) -> bool {
        self.disk.device == DiskDevice::Cdrom
    }
}

/// Outcome of selection for the grub-bhyve chainloader.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrubBoot<'a> {
    /// A single disk picked by class or by boot priority.
    Chosen(BootDisk<'a>),
    /// Nothing was requested explicitly: the first hard disk and the first
    /// CD-ROM, at least one of which is present.
    Fallback { hd: Option<BootDisk<'a>>, cd: Option<BootDisk<'a>> },
}

/// Returns the disk when a loader could boot from it.
fn usable(disk: &DiskSpec) -> Option<BootDisk<'_>> {
    if !matches!(disk.device, DiskDevice::Disk | DiskDevice::Cdrom) {
        return None;
    }
    if !disk.is_file_backed() {
        return None;
    }
    disk.source.path().map(|path| BootDisk { disk, path })
}

fn usable_disks<'a>(
    log: &Logger,
    config: &'a MachineConfig,
) -> Result<Vec<BootDisk<'a>>> {
    if config.disks.is_empty() {
        return Err(Error::NoDisks);
    }
    let mut found = Vec::with_capacity(config.disks.len());
    for (idx, disk) in config.disks.iter().enumerate() {
        match usable(disk) {
            Some(bd) => found.push(bd),
            None => debug!(log, "disk is not bootable";
                "index" => idx,
                "device" => %disk.device,
                "source" => disk.source.type_name()),
        }
    }
    Ok(found)
}

/// Disk class named by the boot device list, if there is one.
fn requested_class(config: &MachineConfig) -> Result<Option<DiskDevice>> {
    match config.os.boot.as_slice() {
        [] => Ok(None),
        [BootDevice::Hd] => Ok(Some(DiskDevice::Disk)),
        [BootDevice::Cdrom] => Ok(Some(DiskDevice::Cdrom)),
        [other] => Err(Error::BootDeviceClass(*other)),
        _ => Err(Error::MultipleBootDevices),
    }
}

fn first_of_class<'a>(
    disks: &[BootDisk<'a>],
    class: DiskDevice,
) -> Result<BootDisk<'a>> {
    disks.iter().find(|bd| bd.disk.device == class).copied().ok_or(
        Error::BootDeviceNotFound(match class {
            DiskDevice::Cdrom => BootDevice::Cdrom,
            _ => BootDevice::Hd,
        }),
    )
}

/// Selection for bhyveload, which can only boot hard disk images.
///
/// At most one disk may carry a boot priority. Without one, the first
/// usable disk is chosen.
pub fn select_native<'a>(
    log: &Logger,
    config: &'a MachineConfig,
) -> Result<BootDisk<'a>> {
    let disks: Vec<_> = usable_disks(log, config)?
        .into_iter()
        .filter(|bd| !bd.is_cdrom())
        .collect();

    if let Some(class) = requested_class(config)? {
        return first_of_class(&disks, class);
    }

    let mut prioritized =
        disks.iter().filter(|bd| bd.disk.boot_priority().is_some());
    match (prioritized.next(), prioritized.next()) {
        (Some(_), Some(_)) => Err(Error::MultipleBootDevices),
        (Some(bd), None) => Ok(*bd),
        (None, _) => disks.first().copied().ok_or(Error::NoUsableBootDisk),
    }
}

/// Selection for grub-bhyve.
///
/// Any number of disks may carry a boot priority; the lowest one wins.
pub fn select_grub<'a>(
    log: &Logger,
    config: &'a MachineConfig,
) -> Result<GrubBoot<'a>> {
    let disks = usable_disks(log, config)?;

    if let Some(class) = requested_class(config)? {
        return first_of_class(&disks, class).map(GrubBoot::Chosen);
    }

    let prioritized = disks
        .iter()
        .filter_map(|bd| bd.disk.boot_priority().map(|prio| (prio, bd)))
        .min_by_key(|(prio, _)| *prio);
    if let Some((_, bd)) = prioritized {
        return Ok(GrubBoot::Chosen(*bd));
    }

    let cd = disks.iter().find(|bd| bd.is_cdrom()).copied();
    let hd = disks.iter().find(|bd| !bd.is_cdrom()).copied();
    if cd.is_none() && hd.is_none() {
        return Err(Error::NoUsableBootDisk);
    }
    Ok(GrubBoot::Fallback { hd, cd })
}
