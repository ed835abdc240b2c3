// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The normalized machine description consumed by command synthesis.
//!
//! Records arrive already validated by whoever parsed them. Synthesis reads
//! them and writes back only two things: the resolved interface name of each
//! NIC and the resolved VNC port of each graphics device.

use serde::{Deserialize, Serialize};
use strum::Display;
use uuid::Uuid;

use crate::types::{MacAddr, PciAddress};

/// Interface-name prefix used for generated tap names.
pub const GENERATED_TAP_PREFIX: &str = "vnet";

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct MachineConfig {
    /// Passed to bhyve as the VM name and used as the teardown key.
    pub name: String,
    #[serde(default)]
    pub uuid: Uuid,
    pub vcpus: u32,
    #[serde(default)]
    pub topology: Option<CpuTopology>,
    /// Guest memory in bytes.
    pub memory: u64,
    /// Wire guest memory (`-S`).
    #[serde(default)]
    pub memory_locked: bool,
    #[serde(default)]
    pub features: Features,
    #[serde(default)]
    pub clock: ClockOffset,
    #[serde(default)]
    pub os: OsConfig,

    #[serde(default, rename = "controller")]
    pub controllers: Vec<ControllerSpec>,
    #[serde(default, rename = "disk")]
    pub disks: Vec<DiskSpec>,
    #[serde(default, rename = "net")]
    pub nets: Vec<NetworkSpec>,
    #[serde(default, rename = "input")]
    pub inputs: Vec<InputSpec>,
    #[serde(default)]
    pub graphics: Vec<GraphicsSpec>,
    #[serde(default, rename = "video")]
    pub videos: Vec<VideoSpec>,
    #[serde(default, rename = "sound")]
    pub sounds: Vec<SoundSpec>,
    #[serde(default, rename = "audio")]
    pub audios: Vec<AudioSpec>,
    #[serde(default, rename = "serial")]
    pub serials: Vec<SerialSpec>,

    /// Raw bhyve arguments appended without any validation.
    #[serde(default)]
    pub passthrough: Option<Passthrough>,
}

impl MachineConfig {
    /// Memory rounded up to whole MiB, as bhyve and its loaders expect.
    pub fn memory_mib(&self) -> u64 {
        self.memory.div_ceil(1024 * 1024)
    }

    /// The audio backend paired with `sound`: the one named by its
    /// `audio-id`, or the first configured backend when it names none.
    pub fn audio_for_sound(&self, sound: &SoundSpec) -> Option<&AudioSpec> {
        match sound.audio_id {
            Some(id) => self.audios.iter().find(|a| a.id == id),
            None => self.audios.first(),
        }
    }
}

/// Requested CPU topology. A topology with zero sockets is treated as if
/// none was requested at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct CpuTopology {
    pub sockets: u32,
    #[serde(default = "CpuTopology::default_dies")]
    pub dies: u32,
    pub cores: u32,
    pub threads: u32,
}

impl CpuTopology {
    fn default_dies() -> u32 {
        1
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Features {
    #[serde(default)]
    pub acpi: bool,
    #[serde(default)]
    pub apic: bool,
    #[serde(default)]
    pub msrs: Option<Msrs>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Msrs {
    pub unknown: UnknownMsrs,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownMsrs {
    Ignore,
    Fail,
}

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ClockOffset {
    #[default]
    Localtime,
    Utc,
    Variable,
    Timezone,
}

/// Boot configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct OsConfig {
    /// UEFI firmware image handed to bhyve via `-l bootrom,<path>`.
    #[serde(default)]
    pub loader: Option<String>,
    /// External loader binary (grub-bhyve or anything custom).
    #[serde(default)]
    pub bootloader: Option<String>,
    #[serde(default)]
    pub bootloader_args: Option<String>,
    /// Ordered boot device classes.
    #[serde(default)]
    pub boot: Vec<BootDevice>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BootDevice {
    Hd,
    Cdrom,
    Network,
    Fd,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControllerSpec {
    Pci {
        #[serde(default)]
        index: u32,
        model: PciModel,
    },
    Sata {
        #[serde(default)]
        index: u32,
        address: PciAddress,
    },
    Usb {
        #[serde(default)]
        index: u32,
        address: PciAddress,
    },
    Isa {
        #[serde(default)]
        index: u32,
        address: PciAddress,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum PciModel {
    PciRoot,
    PcieRoot,
    PciBridge,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DiskSpec {
    pub bus: DiskBus,
    #[serde(default)]
    pub device: DiskDevice,
    pub source: DiskSource,
    /// PCI address, used by buses that occupy their own slot.
    #[serde(default)]
    pub address: Option<PciAddress>,
    /// Index of the owning SATA controller.
    #[serde(default)]
    pub controller: u32,
    #[serde(default)]
    pub boot_index: Option<u32>,
}

impl DiskSpec {
    /// Whether the backing store is something bhyve can open as a path.
    pub fn is_file_backed(&self) -> bool {
        matches!(
            self.source,
            DiskSource::File { .. } | DiskSource::Volume { .. }
        )
    }

    /// Positive boot priority, if one was assigned.
    pub fn boot_priority(&self) -> Option<u32> {
        self.boot_index.filter(|&idx| idx > 0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DiskBus {
    Sata,
    Virtio,
    Ide,
    Scsi,
    Usb,
}

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DiskDevice {
    #[default]
    Disk,
    Cdrom,
    Floppy,
    Lun,
}

/// Where a disk's data lives. Volumes arrive with their pool lookup
/// already resolved into `path`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DiskSource {
    File {
        #[serde(default)]
        path: Option<String>,
    },
    Volume {
        pool: String,
        volume: String,
        #[serde(default)]
        path: Option<String>,
    },
    Block {
        path: String,
    },
    Network {
        protocol: String,
        name: String,
    },
}

impl DiskSource {
    pub fn path(&self) -> Option<&str> {
        match self {
            DiskSource::File { path } | DiskSource::Volume { path, .. } => {
                path.as_deref()
            }
            DiskSource::Block { path } => Some(path.as_str()),
            DiskSource::Network { .. } => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            DiskSource::File { .. } => "file",
            DiskSource::Volume { .. } => "volume",
            DiskSource::Block { .. } => "block",
            DiskSource::Network { .. } => "network",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct NetworkSpec {
    pub model: NicModel,
    pub connection: NetConnection,
    /// Host interface name. Rewritten during synthesis with the name of
    /// the tap device actually created.
    #[serde(default)]
    pub ifname: Option<String>,
    pub mac: MacAddr,
    pub address: PciAddress,
}

impl NetworkSpec {
    /// True when `ifname` is absent or is one synthesis itself generated
    /// (or a `%d` template), so a fresh templated name must be used.
    pub fn needs_generated_ifname(&self) -> bool {
        match self.ifname.as_deref() {
            None => true,
            Some(name) => {
                name.starts_with(GENERATED_TAP_PREFIX) || name.contains('%')
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NicModel {
    Virtio,
    E1000,
    Rtl8139,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum NetConnection {
    Bridge { bridge: String },
    Network { network: String },
    User,
    Direct { dev: String },
}

impl NetConnection {
    pub fn type_name(&self) -> &'static str {
        match self {
            NetConnection::Bridge { .. } => "bridge",
            NetConnection::Network { .. } => "network",
            NetConnection::User => "user",
            NetConnection::Direct { .. } => "direct",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct InputSpec {
    #[serde(rename = "type")]
    pub kind: InputKind,
    pub bus: InputBus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum InputKind {
    Tablet,
    Mouse,
    Keyboard,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum InputBus {
    Usb,
    Ps2,
    Virtio,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct GraphicsSpec {
    #[serde(rename = "type")]
    pub kind: GraphicsKind,
    /// VNC port. Rewritten during synthesis when `autoport` is set.
    #[serde(default)]
    pub port: u32,
    #[serde(default)]
    pub autoport: bool,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default, rename = "listen")]
    pub listens: Vec<ListenSpec>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GraphicsKind {
    Vnc,
    Spice,
    Sdl,
    Rdp,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ListenSpec {
    Address {
        #[serde(default)]
        address: Option<String>,
    },
    Network {
        network: String,
        #[serde(default)]
        address: Option<String>,
    },
    Socket {
        path: String,
    },
    None,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct VideoSpec {
    pub address: PciAddress,
    #[serde(default)]
    pub resolution: Option<Resolution>,
    #[serde(default)]
    pub vga: Option<VgaConf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Resolution {
    pub x: u32,
    pub y: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum VgaConf {
    Io,
    On,
    Off,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SoundSpec {
    pub model: SoundModel,
    pub address: PciAddress,
    #[serde(default)]
    pub audio_id: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SoundModel {
    Ich6,
    Ich7,
    Ich9,
    Ac97,
    Es1370,
    Sb16,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct AudioSpec {
    pub id: u32,
    pub backend: AudioBackend,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AudioBackend {
    Oss {
        #[serde(default, rename = "input-dev")]
        input_dev: Option<String>,
        #[serde(default, rename = "output-dev")]
        output_dev: Option<String>,
    },
    None,
    Sdl,
    Pulseaudio,
}

impl AudioBackend {
    pub fn type_name(&self) -> &'static str {
        match self {
            AudioBackend::Oss { .. } => "oss",
            AudioBackend::None => "none",
            AudioBackend::Sdl => "sdl",
            AudioBackend::Pulseaudio => "pulseaudio",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct SerialSpec {
    /// Target port index; 0 is com1, 1 is com2.
    #[serde(default)]
    pub port: u32,
    pub source: CharSource,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CharSource {
    /// nmdm(4) null-modem pair; the guest side is `master`.
    Nmdm { master: String, slave: String },
    Pty,
    File { path: String },
    Tcp { host: String, service: String },
    Stdio,
}

impl CharSource {
    pub fn type_name(&self) -> &'static str {
        match self {
            CharSource::Nmdm { .. } => "nmdm",
            CharSource::Pty => "pty",
            CharSource::File { .. } => "file",
            CharSource::Tcp { .. } => "tcp",
            CharSource::Stdio => "stdio",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Passthrough {
    pub args: Vec<String>,
}

#[cfg(test)]
mod test {
    use super::*;

    fn nic(ifname: Option<&str>) -> NetworkSpec {
        NetworkSpec {
            model: NicModel::Virtio,
            connection: NetConnection::Bridge { bridge: "bridge0".into() },
            ifname: ifname.map(str::to_string),
            mac: MacAddr::default(),
            address: PciAddress::default(),
        }
    }

    #[test]
    fn memory_rounds_up_to_mib() {
        let mut cfg = MachineConfig {
            memory: 256 * 1024 * 1024,
            ..Default::default()
        };
        assert_eq!(cfg.memory_mib(), 256);
        cfg.memory += 1;
        assert_eq!(cfg.memory_mib(), 257);
        cfg.memory = 0;
        assert_eq!(cfg.memory_mib(), 0);
    }

    #[test]
    fn generated_ifname_detection() {
        assert!(nic(None).needs_generated_ifname());
        assert!(nic(Some("vnet3")).needs_generated_ifname());
        assert!(nic(Some("guest%d")).needs_generated_ifname());
        assert!(!nic(Some("tap7")).needs_generated_ifname());
    }

    #[test]
    fn audio_lookup_by_id_or_first() {
        let cfg = MachineConfig {
            audios: vec![
                AudioSpec { id: 1, backend: AudioBackend::None },
                AudioSpec { id: 2, backend: AudioBackend::Sdl },
            ],
            ..Default::default()
        };
        let mut sound = SoundSpec {
            model: SoundModel::Ich7,
            address: PciAddress::default(),
            audio_id: Some(2),
        };
        assert_eq!(cfg.audio_for_sound(&sound).map(|a| a.id), Some(2));
        sound.audio_id = Some(9);
        assert!(cfg.audio_for_sound(&sound).is_none());
        sound.audio_id = None;
        assert_eq!(cfg.audio_for_sound(&sound).map(|a| a.id), Some(1));
    }

    #[test]
    fn boot_priority_ignores_zero() {
        let mut disk = DiskSpec {
            bus: DiskBus::Virtio,
            device: DiskDevice::Disk,
            source: DiskSource::File { path: Some("/a.img".into()) },
            address: None,
            controller: 0,
            boot_index: Some(0),
        };
        assert_eq!(disk.boot_priority(), None);
        disk.boot_index = Some(2);
        assert_eq!(disk.boot_priority(), Some(2));
    }
}
