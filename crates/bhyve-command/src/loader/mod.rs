// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Boot loader invocations.
//!
//! Unless the guest boots straight from UEFI firmware, a loader has to run
//! before bhyve to place the guest kernel in memory. Which loader is chosen
//! depends only on the machine's [`OsConfig`]:
//!
//! - a firmware `loader` with no `bootloader` needs no loader at all,
//! - with explicit `bootloader-args`, the configured loader (or bhyveload
//!   when none is named) gets exactly those arguments,
//! - a loader whose path mentions `grub-bhyve` is driven by a generated
//!   device.map,
//! - with no loader named, bhyveload boots the selected disk image.

use slog::{debug, Logger};

use crate::caps::CapabilitySource;
use crate::command::{Binaries, Command};
use crate::error::{Error, Result};
use crate::machine::{MachineConfig, OsConfig};

mod bootdev;
mod grub;

pub use bootdev::{select_grub, select_native, BootDisk, GrubBoot};

const GRUB_MARKER: &str = "grub-bhyve";

/// A loader invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoaderCommand {
    pub command: Command,
    /// Contents grub-bhyve expects at the `--device-map` path. Only present
    /// for the grub-bhyve loader; writing it out is up to the caller.
    pub device_map: Option<String>,
}

impl From<Command> for LoaderCommand {
    fn from(command: Command) -> Self {
        Self { command, device_map: None }
    }
}

/// Which loader a machine boots through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Strategy<'a> {
    /// bhyve boots the firmware given with `-l bootrom`.
    Firmware,
    /// The named program with operator-supplied arguments.
    Custom { program: &'a str },
    Grub { program: &'a str },
    Native,
}

impl<'a> Strategy<'a> {
    fn select(os: &'a OsConfig, binaries: &'a Binaries) -> Self {
        match os.bootloader.as_deref() {
            None if os.loader.is_some() => Strategy::Firmware,
            None if os.bootloader_args.is_some() => {
                Strategy::Custom { program: binaries.bhyveload.as_str() }
            }
            None => Strategy::Native,
            Some(program) if os.bootloader_args.is_some() => {
                Strategy::Custom { program }
            }
            Some(program) if program.contains(GRUB_MARKER) => {
                Strategy::Grub { program }
            }
            Some(program) => Strategy::Custom { program },
        }
    }
}

/// Builds the loader invocation that must complete before
/// [`crate::bhyve_command`] is run, or `None` when the machine boots from
/// UEFI firmware and no loader runs.
///
/// `devmap_file` is the path handed to grub-bhyve; the returned
/// [`LoaderCommand::device_map`] holds what belongs in it.
pub fn load_command(
    log: &Logger,
    binaries: &Binaries,
    caps: &dyn CapabilitySource,
    config: &MachineConfig,
    devmap_file: &str,
) -> Result<Option<LoaderCommand>> {
    if config.name.is_empty() {
        return Err(Error::EmptyName);
    }

    let strategy = Strategy::select(&config.os, binaries);
    debug!(log, "selected boot loader"; "strategy" => ?strategy);

    let lc = match strategy {
        Strategy::Firmware => return Ok(None),
        Strategy::Custom { program } => {
            custom_command(program, &config.os)?.into()
        }
        Strategy::Grub { program } => {
            grub::grub_command(log, caps, config, program, devmap_file)?
        }
        Strategy::Native => {
            let disk = select_native(log, config)?;
            let mut cmd = Command::new(&binaries.bhyveload);
            cmd.arg("-m").arg(config.memory_mib().to_string());
            cmd.arg("-d").arg(disk.path);
            cmd.arg(&config.name);
            cmd.into()
        }
    };
    Ok(Some(lc))
}

fn custom_command(program: &str, os: &OsConfig) -> Result<Command> {
    let args = os.bootloader_args.as_deref().ok_or(Error::CustomLoaderArgs)?;
    let mut cmd = Command::new(program);
    // No quoting: arguments are split on whitespace only.
    cmd.args_from(args.split_whitespace());
    Ok(cmd)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::caps::{BhyveCaps, Capabilities, GrubCaps};
    use crate::devices::testutil::*;
    use crate::machine::{
        BootDevice, CharSource, DiskBus, DiskDevice, DiskSpec, SerialSpec,
    };

    const GRUB: &str = "/usr/local/sbin/grub-bhyve";
    const DEVMAP: &str = "/var/run/bhyve/vm0.devmap";

    fn machine(disks: Vec<DiskSpec>) -> MachineConfig {
        MachineConfig {
            name: "vm0".into(),
            vcpus: 1,
            memory: 512 * 1024 * 1024,
            disks,
            ..Default::default()
        }
    }

    fn grub(disks: Vec<DiskSpec>) -> MachineConfig {
        let mut config = machine(disks);
        config.os.bootloader = Some(GRUB.into());
        config
    }

    fn hd(path: &str) -> DiskSpec {
        file_disk(DiskBus::Virtio, DiskDevice::Disk, path)
    }

    fn cd(path: &str) -> DiskSpec {
        file_disk(DiskBus::Sata, DiskDevice::Cdrom, path)
    }

    fn load(caps: &Capabilities, config: &MachineConfig) -> LoaderCommand {
        load_command(&log(), &Binaries::default(), caps, config, DEVMAP)
            .unwrap()
            .expect("a loader runs")
    }

    #[test]
    fn bhyveload_default() {
        let config = machine(vec![cd("/iso"), hd("/vm/disk.img")]);
        let lc = load(&caps(BhyveCaps::empty()), &config);
        assert_eq!(lc.command.program(), "/usr/sbin/bhyveload");
        assert_eq!(
            lc.command.args(),
            ["-m", "512", "-d", "/vm/disk.img", "vm0"]
        );
        assert_eq!(lc.device_map, None);
    }

    #[test]
    fn firmware_boot_runs_no_loader() {
        // An install CD alone would leave bhyveload nothing to boot.
        let mut config = machine(vec![cd("/iso/install.iso")]);
        config.os.loader = Some("/fw/BHYVE_UEFI.fd".into());
        let lc = load_command(
            &log(),
            &Binaries::default(),
            &caps(BhyveCaps::empty()),
            &config,
            DEVMAP,
        )
        .unwrap();
        assert_eq!(lc, None);

        config.disks.push(hd("/vm/disk.img"));
        config.os.bootloader_args = Some("-m 512 vm0".into());
        assert_eq!(
            Strategy::select(&config.os, &Binaries::default()),
            Strategy::Firmware
        );

        // A named boot loader still runs, firmware or not.
        config.os.bootloader_args = None;
        config.os.bootloader = Some(GRUB.into());
        let lc = load(&caps(BhyveCaps::empty()), &config);
        assert_eq!(lc.command.program(), GRUB);
    }

    #[test]
    fn bhyveload_with_args_skips_disk_selection() {
        let mut config = machine(vec![]);
        config.os.bootloader_args =
            Some("-m 1024  -e  boot_verbose=1 vm0".into());
        let lc = load(&caps(BhyveCaps::empty()), &config);
        assert_eq!(lc.command.program(), "/usr/sbin/bhyveload");
        assert_eq!(
            lc.command.args(),
            ["-m", "1024", "-e", "boot_verbose=1", "vm0"]
        );
    }

    #[test]
    fn custom_loader_needs_args() {
        let mut config = machine(vec![hd("/vm/disk.img")]);
        config.os.bootloader = Some("/usr/local/bin/my-loader".into());
        let err = load_command(
            &log(),
            &Binaries::default(),
            &caps(BhyveCaps::empty()),
            &config,
            DEVMAP,
        )
        .unwrap_err();
        assert!(matches!(err, Error::CustomLoaderArgs));
        assert!(err.to_string().contains("bootloader_args"));

        config.os.bootloader_args = Some("--kernel /boot/vmlinuz".into());
        let lc = load(&caps(BhyveCaps::empty()), &config);
        assert_eq!(lc.command.program(), "/usr/local/bin/my-loader");
        assert_eq!(lc.command.args(), ["--kernel", "/boot/vmlinuz"]);
    }

    #[test]
    fn grub_with_args_is_custom() {
        let mut config = grub(vec![hd("/vm/disk.img")]);
        config.os.bootloader_args = Some("--root host".into());
        let lc = load(&caps(BhyveCaps::empty()), &config);
        assert_eq!(lc.command.program(), GRUB);
        assert_eq!(lc.command.args(), ["--root", "host"]);
        assert_eq!(lc.device_map, None);
    }

    #[test]
    fn grub_priority_disk_only() {
        let config = grub(vec![
            DiskSpec { boot_index: Some(1), ..hd("/vm/disk.img") },
            cd("/iso/install.iso"),
        ]);
        let lc = load(&caps(BhyveCaps::empty()), &config);
        assert_eq!(lc.device_map.as_deref(), Some("(hd0) /vm/disk.img\n"));
        assert_eq!(
            lc.command.args(),
            [
                "--root",
                "hd0,msdos1",
                "--device-map",
                DEVMAP,
                "--memory",
                "512",
                "vm0"
            ]
        );
    }

    #[test]
    fn grub_fallback_maps_both() {
        let config = grub(vec![cd("/iso/install.iso"), hd("/vm/disk.img")]);
        let lc = load(&caps(BhyveCaps::empty()), &config);
        assert_eq!(
            lc.device_map.as_deref(),
            Some("(hd0) /vm/disk.img\n(cd) /iso/install.iso\n")
        );
        assert_eq!(lc.command.args()[..2], ["--root", "cd"]);

        let config = grub(vec![hd("/vm/disk.img")]);
        let lc = load(&caps(BhyveCaps::empty()), &config);
        assert_eq!(lc.command.args()[..2], ["--root", "hd0,msdos1"]);
    }

    #[test]
    fn grub_boot_class_cdrom() {
        let mut config =
            grub(vec![hd("/vm/disk.img"), cd("/iso/install.iso")]);
        config.os.boot = vec![BootDevice::Cdrom];
        let lc = load(&caps(BhyveCaps::empty()), &config);
        assert_eq!(lc.device_map.as_deref(), Some("(cd) /iso/install.iso\n"));
        assert_eq!(lc.command.args()[..2], ["--root", "cd"]);
    }

    #[test]
    fn grub_console_device() {
        let nmdm = SerialSpec {
            port: 0,
            source: CharSource::Nmdm {
                master: "/dev/nmdm0A".into(),
                slave: "/dev/nmdm0B".into(),
            },
        };
        let mut config = grub(vec![hd("/vm/disk.img")]);
        config.serials.push(nmdm);
        let consdev = Capabilities::new(BhyveCaps::empty(), GrubCaps::CONSDEV);

        let lc = load(&consdev, &config);
        let args = lc.command.args();
        assert_eq!(
            &args[args.len() - 3..],
            ["--cons-dev", "/dev/nmdm0A", "vm0"]
        );

        // Without the capability the console is not passed at all.
        let lc = load(&caps(BhyveCaps::empty()), &config);
        assert!(!lc.command.args().iter().any(|a| a == "--cons-dev"));

        config.serials[0].source = CharSource::Stdio;
        let err = load_command(
            &log(),
            &Binaries::default(),
            &consdev,
            &config,
            DEVMAP,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ConsoleType("stdio")));
    }

    #[test]
    fn grub_output_is_stable() {
        let config = grub(vec![
            cd("/iso/install.iso"),
            DiskSpec { boot_index: Some(2), ..hd("/vm/a.img") },
            DiskSpec { boot_index: Some(3), ..hd("/vm/b.img") },
        ]);
        let first = load(&caps(BhyveCaps::empty()), &config);
        let second = load(&caps(BhyveCaps::empty()), &config);
        assert_eq!(first, second);
        assert_eq!(first.device_map.as_deref(), Some("(hd0) /vm/a.img\n"));
    }
}
