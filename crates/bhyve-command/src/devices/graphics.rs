// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use slog::{warn, Logger};

use crate::caps::{BhyveCaps, CapabilitySource};
use crate::command::DeviceArg;
use crate::error::{Error, Result};
use crate::machine::{
    GraphicsKind, GraphicsSpec, ListenSpec, OsConfig, VideoSpec,
};
use crate::resources::{ResourceProvider, VNC_PORT_MAX, VNC_PORT_MIN};

/// `fbuf` framebuffer exported over VNC.
///
/// With `autoport` set outside of a dry run, the allocated port is written
/// back to `spec.port`.
pub fn framebuffer(
    caps: &dyn CapabilitySource,
    resources: &dyn ResourceProvider,
    log: &Logger,
    spec: &mut GraphicsSpec,
    video: &VideoSpec,
    os: &OsConfig,
) -> Result<DeviceArg> {
    if !caps.has_bhyve(BhyveCaps::LPC_BOOTROM)
        || os.bootloader.is_some()
        || os.loader.is_none()
    {
        return Err(Error::GraphicsRequiresUefi);
    }
    if !caps.has_bhyve(BhyveCaps::FBUF) {
        return Err(Error::MissingCapability("framebuffer"));
    }
    if spec.kind != GraphicsKind::Vnc {
        return Err(Error::GraphicsKind(spec.kind));
    }

    let listen = spec.listens.first().ok_or(Error::MissingListen)?;
    let address = match listen {
        ListenSpec::Address { address }
        | ListenSpec::Network { address, .. } => address.as_deref(),
        ListenSpec::Socket { .. } => return Err(Error::ListenType("socket")),
        ListenSpec::None => return Err(Error::ListenType("none")),
    };

    if !spec.autoport && !(VNC_PORT_MIN..=VNC_PORT_MAX).contains(&spec.port) {
        return Err(Error::VncPortRange(spec.port));
    }
    if spec.password.is_some() {
        return Err(Error::VncPassword);
    }
    warn!(log, "Security warning: VNC auth is not supported, \
        the framebuffer accepts unauthenticated sessions");

    let mut opt = format!("{},fbuf,tcp=", video.address);
    match address {
        Some(addr) if addr.contains(':') => opt.push_str(&format!("[{addr}]")),
        Some(addr) => opt.push_str(addr),
        None => {}
    }

    let port = resources.reserve_vnc_port(log, spec.autoport, spec.port)?;
    spec.port = port;
    opt.push_str(&format!(":{port}"));

    if let Some(res) = &video.resolution {
        opt.push_str(&format!(",w={},h={}", res.x, res.y));
    }
    if let Some(vga) = video.vga {
        opt.push_str(&format!(",vga={vga}"));
    }

    Ok(DeviceArg::slot(opt))
}
