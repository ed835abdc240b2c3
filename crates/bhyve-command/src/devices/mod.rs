// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-device argument builders.
//!
//! Each builder turns one device record into at most one bhyve device
//! argument. [`DeviceBuilder::build`] is the single dispatch point; adding a
//! device kind means adding a [`Device`] variant and handling it there.

use slog::Logger;
use uuid::Uuid;

use crate::caps::CapabilitySource;
use crate::command::DeviceArg;
use crate::error::Result;
use crate::machine::{
    AudioSpec, ControllerSpec, DiskSpec, GraphicsSpec, InputSpec,
    NetworkSpec, OsConfig, SerialSpec, SoundSpec, VideoSpec,
};
use crate::resources::ResourceProvider;

pub mod console;
pub mod controller;
pub mod graphics;
pub mod net;
pub mod sound;
pub mod storage;

/// A device record paired with whatever else from the machine its builder
/// needs to see.
pub enum Device<'a> {
    Controller {
        spec: &'a ControllerSpec,
        /// All disks; SATA controllers aggregate the ones bound to them.
        disks: &'a [DiskSpec],
        /// All input devices; the USB controller hosts them.
        inputs: &'a [InputSpec],
    },
    Nic {
        spec: &'a mut NetworkSpec,
        vm: &'a Uuid,
    },
    Disk(&'a DiskSpec),
    Graphics {
        spec: &'a mut GraphicsSpec,
        video: &'a VideoSpec,
        os: &'a OsConfig,
    },
    Sound {
        spec: &'a SoundSpec,
        audio: Option<&'a AudioSpec>,
    },
    Console(&'a SerialSpec),
}

/// How many singleton controllers have been emitted so far.
#[derive(Clone, Copy, Debug, Default)]
pub struct ControllerCounts {
    pub usb: u32,
    pub isa: u32,
}

pub struct DeviceBuilder<'a> {
    caps: &'a dyn CapabilitySource,
    resources: &'a dyn ResourceProvider,
    log: &'a Logger,
    counts: ControllerCounts,
}

impl<'a> DeviceBuilder<'a> {
    pub fn new(
        caps: &'a dyn CapabilitySource,
        resources: &'a dyn ResourceProvider,
        log: &'a Logger,
    ) -> Self {
        Self { caps, resources, log, counts: ControllerCounts::default() }
    }

    pub fn build(&mut self, device: Device<'_>) -> Result<Option<DeviceArg>> {
        match device {
            Device::Controller { spec, disks, inputs } => match spec {
                ControllerSpec::Pci { model, .. } => {
                    controller::pci_root(*model).map(|()| None)
                }
                ControllerSpec::Sata { index, address } => {
                    let arg = controller::ahci(
                        self.caps, self.log, *index, address, disks,
                    )?;
                    Ok(Some(arg))
                }
                ControllerSpec::Usb { address, .. } => {
                    self.counts.usb += 1;
                    controller::usb(self.counts.usb, address, inputs).map(Some)
                }
                ControllerSpec::Isa { address, .. } => {
                    self.counts.isa += 1;
                    controller::isa(self.counts.isa, address).map(Some)
                }
            },
            Device::Nic { spec, vm } => {
                net::nic(self.caps, self.resources, self.log, spec, vm)
                    .map(Some)
            }
            Device::Disk(spec) => storage::disk(spec),
            Device::Graphics { spec, video, os } => graphics::framebuffer(
                self.caps,
                self.resources,
                self.log,
                spec,
                video,
                os,
            )
            .map(Some),
            Device::Sound { spec, audio } => {
                sound::hda(self.caps, spec, audio).map(Some)
            }
            Device::Console(spec) => console::com(spec).map(Some),
        }
    }
}


#[cfg(test)]
mod test {
    use super::testutil::*;
    use super::*;
    use crate::caps::BhyveCaps;
    use crate::error::Error;
    use crate::machine::{InputBus, InputKind, PciModel};
    use crate::resources::DryRun;

    #[test]
    fn pci_root_emits_nothing() {
        let caps = caps(BhyveCaps::empty());
        let log = log();
        let mut builder = DeviceBuilder::new(&caps, &DryRun, &log);
        let spec = ControllerSpec::Pci { index: 0, model: PciModel::PciRoot };
        let arg = builder
            .build(Device::Controller { spec: &spec, disks: &[], inputs: &[] })
            .unwrap();
        assert_eq!(arg, None);
    }

    #[test]
    fn second_usb_controller_rejected() {
        let caps = caps(BhyveCaps::empty());
        let log = log();
        let mut builder = DeviceBuilder::new(&caps, &DryRun, &log);
        let inputs =
            [InputSpec { kind: InputKind::Tablet, bus: InputBus::Usb }];
        let usb = ControllerSpec::Usb { index: 0, address: addr(30, 0) };

        let arg = builder
            .build(Device::Controller {
                spec: &usb,
                disks: &[],
                inputs: &inputs,
            })
            .unwrap();
        assert_eq!(arg, Some(DeviceArg::slot("30:0,xhci,tablet".to_string())));

        let err = builder
            .build(Device::Controller {
                spec: &usb,
                disks: &[],
                inputs: &inputs,
            })
            .unwrap_err();
        assert!(matches!(err, Error::MultipleUsbControllers));
    }

    #[test]
    fn second_isa_controller_rejected() {
        let caps = caps(BhyveCaps::empty());
        let log = log();
        let mut builder = DeviceBuilder::new(&caps, &DryRun, &log);
        let isa = ControllerSpec::Isa { index: 0, address: addr(31, 0) };
        let dev = || Device::Controller { spec: &isa, disks: &[], inputs: &[] };

        assert_eq!(
            builder.build(dev()).unwrap(),
            Some(DeviceArg::slot("31:0,lpc".to_string()))
        );
        assert!(matches!(
            builder.build(dev()).unwrap_err(),
            Error::MultipleIsaControllers
        ));
    }
}
