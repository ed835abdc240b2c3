// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Feature bits advertised by the installed bhyve and grub-bhyve binaries.
//!
//! Discovering these bits (probing `bhyve -h` output and the like) happens
//! elsewhere; synthesis only ever asks whether a bit is present.

bitflags::bitflags! {
    /// Optional features of the `bhyve` binary.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct BhyveCaps: u32 {
        /// `-u`: RTC keeps UTC.
        const RTC_UTC = 1 << 0;
        /// AHCI controllers accept up to 32 `hd:`/`cd:` ports.
        const AHCI32SLOT = 1 << 1;
        /// `-l bootrom,<path>`: UEFI firmware boot.
        const LPC_BOOTROM = 1 << 2;
        /// `fbuf` framebuffer device.
        const FBUF = 1 << 3;
        /// `cpus=,sockets=,cores=,threads=` syntax for `-c`.
        const CPUTOPOLOGY = 1 << 5;
        /// `e1000` NIC emulation.
        const NET_E1000 = 1 << 6;
        /// `hda` sound device.
        const SOUND_HDA = 1 << 7;
    }

    /// Optional features of the `grub-bhyve` chainloader.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct GrubCaps: u32 {
        /// `--cons-dev <path>` console passthrough.
        const CONSDEV = 1 << 0;
    }
}

/// Read-only query for the capabilities of the target binaries.
pub trait CapabilitySource {
    fn bhyve_caps(&self) -> BhyveCaps;
    fn grub_caps(&self) -> GrubCaps;

    fn has_bhyve(&self, cap: BhyveCaps) -> bool {
        self.bhyve_caps().contains(cap)
    }

    fn has_grub(&self, cap: GrubCaps) -> bool {
        self.grub_caps().contains(cap)
    }
}

/// A fixed capability set, as recorded after a previous probe or loaded
/// from a machine file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub bhyve: BhyveCaps,
    pub grub: GrubCaps,
}

impl Capabilities {
    pub const fn new(bhyve: BhyveCaps, grub: GrubCaps) -> Self {
        Self { bhyve, grub }
    }
}

impl CapabilitySource for Capabilities {
    fn bhyve_caps(&self) -> BhyveCaps {
        self.bhyve
    }

    fn grub_caps(&self) -> GrubCaps {
        self.grub
    }
}
