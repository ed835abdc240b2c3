// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

use crate::machine::{
    BootDevice, ClockOffset, DiskBus, DiskDevice, GraphicsKind, InputBus,
    InputKind, NicModel, PciModel, SoundModel,
};

/// Coarse classification of a synthesis failure.
///
/// Every kind is terminal for the synthesis call that produced it; the kind
/// only tells the caller where to look.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The configuration cannot be expressed for bhyve at all.
    Unsupported,
    /// The configuration is valid but the installed binaries are too old.
    MissingCapability,
    /// A tap device or port could not be acquired.
    Resource,
    /// An upstream invariant on the configuration was violated.
    Internal,
}

/// Failure reported by a network or port allocator.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no free port in {0}..={1}")]
    PortsExhausted(u16, u16),

    #[error("port {0} is already in use")]
    PortInUse(u16),

    #[error("port {0} is outside {1}..={2}")]
    PortOutOfRange(u16, u16, u16),

    #[error("{0}")]
    Other(String),
}

/// Errors that can arise while synthesizing bhyve or loader command lines.
#[derive(Debug, Error)]
pub enum Error {
    #[error("machine name must not be empty")]
    EmptyName,

    #[error("only 1 die per socket is supported, got {0}")]
    DiesPerSocket(u32),

    #[error(
        "invalid CPU topology: {vcpus} vCPUs is not {sockets} sockets * \
         {cores} cores * {threads} threads"
    )]
    TopologyMismatch { vcpus: u32, sockets: u32, cores: u32, threads: u32 },

    #[error("unsupported clock offset '{0}'")]
    ClockOffset(ClockOffset),

    #[error("installed bhyve binary does not support {0}")]
    MissingCapability(&'static str),

    #[error("NIC model {0} is not supported")]
    NicModel(NicModel),

    #[error("network type {0} is not supported")]
    NetworkType(&'static str),

    #[error("unsupported disk bus {0}")]
    DiskBus(DiskBus),

    #[error("unsupported disk device {0}")]
    DiskDevice(DiskDevice),

    #[error("unsupported disk type {0}")]
    DiskType(&'static str),

    #[error("cdrom device without source path not supported")]
    CdromWithoutSource,

    #[error("disk device without source path not supported")]
    DiskWithoutSource,

    #[error("unsupported PCI controller model {0}: only PCI root supported")]
    PciControllerModel(PciModel),

    #[error("only single USB controller is supported")]
    MultipleUsbControllers,

    #[error("only single ISA controller is supported")]
    MultipleIsaControllers,

    #[error("only USB input devices are supported, got {0}")]
    InputBus(InputBus),

    #[error("only tablet input devices are supported, got {0}")]
    InputKind(InputKind),

    #[error("only single input device is supported, got {0}")]
    InputDeviceCount(usize),

    #[error(
        "multiple graphics devices are not supported \
         ({graphics} graphics, {videos} video)"
    )]
    MultipleGraphics { graphics: usize, videos: usize },

    #[error("graphics are only supported when booting using UEFI")]
    GraphicsRequiresUefi,

    #[error("only VNC graphics are supported, got {0}")]
    GraphicsKind(GraphicsKind),

    #[error("unsupported listen type {0}")]
    ListenType(&'static str),

    #[error("vnc port {0} must be in range [5900,65535]")]
    VncPortRange(u32),

    #[error("vnc password auth not supported")]
    VncPassword,

    #[error("sound device model {0} is not supported")]
    SoundModel(SoundModel),

    #[error("unsupported audio backend '{0}'")]
    AudioBackend(&'static str),

    #[error("only nmdm console types are supported, got {0}")]
    ConsoleType(&'static str),

    #[error("only two serial ports are supported, got port {0}")]
    SerialPort(u32),

    #[error("domain should have at least one disk defined")]
    NoDisks,

    #[error("only one boot device is supported")]
    MultipleBootDevices,

    #[error("cannot boot from device {0}")]
    BootDeviceClass(BootDevice),

    #[error("cannot find boot device of requested type {0}")]
    BootDeviceNotFound(BootDevice),

    #[error("no usable boot disk found")]
    NoUsableBootDisk,

    #[error("custom loader requires explicit bootloader_args configuration")]
    CustomLoaderArgs,

    #[error("failed to {what}")]
    Resource {
        what: String,
        #[source]
        source: ResourceError,
    },

    #[error("missing listen element for graphics device")]
    MissingListen,

    #[error("{0} has no PCI address")]
    MissingAddress(&'static str),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MissingCapability(_) => ErrorKind::MissingCapability,
            Error::Resource { .. } => ErrorKind::Resource,
            Error::MissingListen | Error::MissingAddress(_) => {
                ErrorKind::Internal
            }
            _ => ErrorKind::Unsupported,
        }
    }

    pub(crate) fn resource(
        what: impl Into<String>,
        source: ResourceError,
    ) -> Self {
        Error::Resource { what: what.into(), source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
