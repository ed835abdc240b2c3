// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::command::DeviceArg;
use crate::error::{Error, Result};
use crate::machine::{DiskBus, DiskDevice, DiskSpec};

/// Path bhyve should open for `disk`. Only file and (resolved) volume
/// backings qualify.
pub fn source_path(disk: &DiskSpec) -> Result<&str> {
    if !disk.is_file_backed() {
        return Err(Error::DiskType(disk.source.type_name()));
    }
    match (disk.source.path(), disk.device) {
        (Some(path), _) => Ok(path),
        (None, DiskDevice::Cdrom) => Err(Error::CdromWithoutSource),
        (None, _) => Err(Error::DiskWithoutSource),
    }
}

/// Argument for a disk that occupies its own slot. SATA disks yield nothing
/// here; their controller emits them.
pub fn disk(disk: &DiskSpec) -> Result<Option<DeviceArg>> {
    match disk.bus {
        DiskBus::Sata => Ok(None),
        DiskBus::Virtio => virtio_blk(disk).map(Some),
        other => Err(Error::DiskBus(other)),
    }
}

fn virtio_blk(disk: &DiskSpec) -> Result<DeviceArg> {
    if disk.device != DiskDevice::Disk {
        return Err(Error::DiskDevice(disk.device));
    }
    let path = source_path(disk)?;
    let address = disk.address.ok_or(Error::MissingAddress("virtio disk"))?;

    Ok(DeviceArg::slot(format!("{}:0,virtio-blk,{}", address.slot(), path)))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::devices::testutil::*;
    use crate::error::ErrorKind;
    use crate::machine::DiskSource;

    fn virtio(device: DiskDevice, path: &str, slot: u8) -> DiskSpec {
        DiskSpec {
            address: Some(addr(slot, 0)),
            ..file_disk(DiskBus::Virtio, device, path)
        }
    }

    #[test]
    fn virtio_disk_gets_own_slot() {
        let arg = disk(&virtio(DiskDevice::Disk, "/vm/root.img", 4)).unwrap();
        assert_eq!(
            arg,
            Some(DeviceArg::slot("4:0,virtio-blk,/vm/root.img".to_string()))
        );
    }

    #[test]
    fn volume_backing_uses_resolved_path() {
        let mut d = virtio(DiskDevice::Disk, "", 4);
        d.source = DiskSource::Volume {
            pool: "default".to_string(),
            volume: "root".to_string(),
            path: Some("/pool/root.img".to_string()),
        };
        assert_eq!(
            disk(&d).unwrap().unwrap().value,
            "4:0,virtio-blk,/pool/root.img"
        );
    }

    #[test]
    fn virtio_cdrom_unsupported() {
        let err = disk(&virtio(DiskDevice::Cdrom, "/vm/x.iso", 4)).unwrap_err();
        assert!(matches!(err, Error::DiskDevice(DiskDevice::Cdrom)));
    }

    #[test]
    fn sata_deferred_to_controller() {
        let d = file_disk(DiskBus::Sata, DiskDevice::Disk, "/vm/a.img");
        assert_eq!(disk(&d).unwrap(), None);
    }

    #[test]
    fn other_buses_unsupported() {
        let d = file_disk(DiskBus::Scsi, DiskDevice::Disk, "/vm/a.img");
        assert!(matches!(disk(&d), Err(Error::DiskBus(DiskBus::Scsi))));
    }

    #[test]
    fn virtio_without_address_is_internal() {
        let d = file_disk(DiskBus::Virtio, DiskDevice::Disk, "/vm/a.img");
        assert_eq!(disk(&d).unwrap_err().kind(), ErrorKind::Internal);
    }
}
