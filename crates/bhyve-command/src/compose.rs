// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use slog::{info, o, warn, Logger};

use crate::caps::{BhyveCaps, CapabilitySource};
use crate::command::{Binaries, Command, DeviceArg};
use crate::devices::{Device, DeviceBuilder};
use crate::error::{Error, Result};
use crate::machine::{ClockOffset, MachineConfig, Passthrough, UnknownMsrs};
use crate::resources::ResourceProvider;

/// Builds the full `bhyve` invocation for `config`.
///
/// Devices are emitted in a fixed order: controllers, NICs, disks, the
/// framebuffer, sound devices, then the console. The first device that
/// cannot be expressed aborts synthesis and no command is returned.
///
/// NIC interface names and VNC ports resolved along the way are written
/// back into `config`; the caller is expected to persist them.
pub fn bhyve_command(
    log: &Logger,
    binaries: &Binaries,
    caps: &dyn CapabilitySource,
    resources: &dyn ResourceProvider,
    config: &mut MachineConfig,
) -> Result<Command> {
    if config.name.is_empty() {
        return Err(Error::EmptyName);
    }
    let log = log.new(o!("vm" => config.name.clone()));

    let mut cmd = Command::new(&binaries.bhyve);
    cmd.arg("-c").arg(vcpu_arg(caps, config)?);
    cmd.arg("-m").arg(config.memory_mib().to_string());
    if config.memory_locked {
        cmd.arg("-S");
    }

    if config.features.acpi {
        cmd.arg("-A");
    }
    if config.features.apic {
        cmd.arg("-I");
    }
    let ignore_msrs = config.features.msrs.map(|m| m.unknown);
    if ignore_msrs == Some(UnknownMsrs::Ignore) {
        cmd.arg("-w");
    }

    match config.clock {
        ClockOffset::Localtime => {}
        ClockOffset::Utc if caps.has_bhyve(BhyveCaps::RTC_UTC) => {
            cmd.arg("-u");
        }
        ClockOffset::Utc => return Err(Error::MissingCapability("UTC clock")),
        other => return Err(Error::ClockOffset(other)),
    }

    // Exit on HLT and PAUSE so idle and spinning guests yield the host CPU.
    cmd.arg("-H").arg("-P");
    cmd.device(DeviceArg::slot("0:0,hostbridge".to_string()));

    if let (None, Some(loader)) = (&config.os.bootloader, &config.os.loader) {
        if !caps.has_bhyve(BhyveCaps::LPC_BOOTROM) {
            return Err(Error::MissingCapability("UEFI loader"));
        }
        cmd.device(DeviceArg::lpc(format!("bootrom,{loader}")));
    }

    let mut builder = DeviceBuilder::new(caps, resources, &log);

    for spec in &config.controllers {
        let dev = Device::Controller {
            spec,
            disks: &config.disks,
            inputs: &config.inputs,
        };
        emit(&mut builder, &mut cmd, dev)?;
    }

    let vm = config.uuid;
    for spec in config.nets.iter_mut() {
        emit(&mut builder, &mut cmd, Device::Nic { spec, vm: &vm })?;
    }

    for spec in &config.disks {
        emit(&mut builder, &mut cmd, Device::Disk(spec))?;
    }

    if !config.graphics.is_empty() && !config.videos.is_empty() {
        match (config.graphics.as_mut_slice(), config.videos.as_slice()) {
            ([spec], [video]) => {
                let dev = Device::Graphics { spec, video, os: &config.os };
                emit(&mut builder, &mut cmd, dev)?;
            }
            (graphics, videos) => {
                return Err(Error::MultipleGraphics {
                    graphics: graphics.len(),
                    videos: videos.len(),
                })
            }
        }
    }

    for spec in &config.sounds {
        let audio = config.audio_for_sound(spec);
        emit(&mut builder, &mut cmd, Device::Sound { spec, audio })?;
    }

    if let Some(serial) = config.serials.first() {
        emit(&mut builder, &mut cmd, Device::Console(serial))?;
    }

    if let Some(extra) = &config.passthrough {
        append_unchecked(&log, &mut cmd, extra);
    }

    cmd.arg(&config.name);
    info!(log, "synthesized bhyve command"; "args" => cmd.args().len());
    Ok(cmd)
}

fn emit(
    builder: &mut DeviceBuilder<'_>,
    cmd: &mut Command,
    dev: Device<'_>,
) -> Result<()> {
    if let Some(arg) = builder.build(dev)? {
        cmd.device(arg);
    }
    Ok(())
}

/// Argument to `-c`.
fn vcpu_arg(
    caps: &dyn CapabilitySource,
    config: &MachineConfig,
) -> Result<String> {
    let Some(topo) = config.topology.filter(|t| t.sockets != 0) else {
        return Ok(config.vcpus.to_string());
    };

    if topo.dies != 1 {
        return Err(Error::DiesPerSocket(topo.dies));
    }
    let product = u64::from(topo.sockets)
        * u64::from(topo.cores)
        * u64::from(topo.threads);
    if u64::from(config.vcpus) != product {
        return Err(Error::TopologyMismatch {
            vcpus: config.vcpus,
            sockets: topo.sockets,
            cores: topo.cores,
            threads: topo.threads,
        });
    }
    if !caps.has_bhyve(BhyveCaps::CPUTOPOLOGY) {
        return Err(Error::MissingCapability("defining CPU topology"));
    }

    Ok(format!(
        "cpus={},sockets={},cores={},threads={}",
        config.vcpus, topo.sockets, topo.cores, topo.threads
    ))
}

/// Appends raw operator-supplied arguments.
///
/// UNCHECKED: nothing here is validated against the rest of the command.
fn append_unchecked(log: &Logger, cmd: &mut Command, extra: &Passthrough) {
    warn!(log, "booting the guest using command line pass-through, \
        which could cause inconsistent state and upgrade issues";
        "args" => extra.args.len());
    cmd.args_from(extra.args.iter().cloned());
}
