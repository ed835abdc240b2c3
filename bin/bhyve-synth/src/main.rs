// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use slog::{info, o, Drain};

use bhyve_command::{
    bhyve_command, destroy_command, load_command, DryRun, Live,
    ResourceProvider,
};

mod host;

#[derive(clap::Parser)]
/// Print the bhyve, loader, and teardown invocations for a machine file.
struct Args {
    /// Machine configuration file (TOML).
    #[clap(value_name = "CONFIG", action)]
    config: PathBuf,

    /// Create tap devices and reserve VNC ports on this host instead of
    /// doing a dry run.
    #[clap(long, action)]
    live: bool,

    /// Path grub-bhyve reads its device map from.
    #[clap(long, value_name = "PATH")]
    device_map: Option<PathBuf>,

    /// Also write the generated device map to the --device-map path.
    #[clap(long, action, requires = "device_map")]
    write_device_map: bool,
}

fn build_log() -> (slog::Logger, slog_async::AsyncGuard) {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::CompactFormat::new(decorator).build().fuse();
    let (drain, guard) = slog_async::Async::new(drain).build_with_guard();
    (slog::Logger::root(drain.fuse(), o!()), guard)
}

fn main() -> anyhow::Result<()> {
    let Args { config, live, device_map, write_device_map } = Args::parse();

    let (log, _log_async_guard) = build_log();

    let cfg = bhyve_config_toml::parse(&config)
        .with_context(|| format!("loading {}", config.display()))?;
    let caps = cfg.capabilities.resolve()?;
    let mut machine = cfg.machine;

    let device_map = device_map.unwrap_or_else(|| {
        PathBuf::from(format!("/var/run/bhyve/{}.devmap", machine.name))
    });
    let devmap_file = device_map.to_string_lossy();

    let loader =
        load_command(&log, &cfg.binaries, &caps, &machine, &devmap_file)
            .context("building loader command")?;

    let net = host::IfconfigNet;
    let ports = host::PortPool::new();
    let live_resources = Live::new(&net, &ports);
    let resources: &dyn ResourceProvider =
        if live { &live_resources } else { &DryRun };

    let bhyve =
        bhyve_command(&log, &cfg.binaries, &caps, resources, &mut machine)
            .context("building bhyve command")?;
    let destroy = destroy_command(&cfg.binaries, &machine.name)?;

    for nic in &machine.nets {
        info!(log, "NIC"; "ifname" => ?nic.ifname, "mac" => %nic.mac);
    }
    for gfx in &machine.graphics {
        info!(log, "VNC"; "port" => gfx.port);
    }

    if let Some(loader) = &loader {
        if let Some(map) = &loader.device_map {
            if write_device_map {
                std::fs::write(&device_map, map).with_context(|| {
                    format!("writing device map {}", device_map.display())
                })?;
            }
            println!("# device map ({devmap_file})");
            print!("{map}");
        }
        println!("{}", loader.command);
    } else {
        info!(log, "booting from firmware, no loader needed");
    }
    println!("{bhyve}");
    println!("{destroy}");

    Ok(())
}
