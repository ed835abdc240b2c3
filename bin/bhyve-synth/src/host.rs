// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host resources backed by FreeBSD's ifconfig(8) and local TCP ports.

use std::collections::BTreeSet;
use std::net::{Ipv4Addr, TcpListener};
use std::process::{Command, Stdio};
use std::sync::Mutex;

use bhyve_command::resources::{
    NetAllocator, PortAllocator, VNC_PORT_MAX, VNC_PORT_MIN,
};
use bhyve_command::types::MacAddr;
use bhyve_command::ResourceError;
use uuid::Uuid;

const IFCONFIG: &str = "/sbin/ifconfig";

fn ifconfig(args: &[&str]) -> Result<String, ResourceError> {
    let output = Command::new(IFCONFIG)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()?;
    if !output.status.success() {
        return Err(ResourceError::Other(format!(
            "ifconfig {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Replaces the first `%d` in `template` with the lowest index not already
/// taken by an interface in `existing`.
fn expand_template(template: &str, existing: &[&str]) -> String {
    if !template.contains("%d") {
        return template.to_string();
    }
    (0u32..)
        .map(|idx| template.replacen("%d", &idx.to_string(), 1))
        .find(|name| !existing.contains(&name.as_str()))
        .unwrap_or_else(|| template.to_string())
}

/// Pulls the `drivername:` field out of `ifconfig -D` output.
fn parse_drivername(output: &str) -> Option<&str> {
    output.lines().find_map(|line| {
        line.trim().strip_prefix("drivername:").map(str::trim)
    })
}

/// Tap devices managed through ifconfig(8).
pub struct IfconfigNet;

impl NetAllocator for IfconfigNet {
    fn create_bridge_tap(
        &self,
        bridge: &str,
        template: &str,
        mac: &MacAddr,
        vm: &Uuid,
    ) -> Result<String, ResourceError> {
        let listing = ifconfig(&["-l"])?;
        let existing: Vec<&str> = listing.split_whitespace().collect();
        let ifname = expand_template(template, &existing);

        let created = ifconfig(&["tap", "create"])?;
        let tap = created.trim();
        let descr = format!("vm={vm} mac={mac}");
        let setup = || -> Result<(), ResourceError> {
            if tap != ifname {
                ifconfig(&[tap, "name", ifname.as_str()])?;
            }
            ifconfig(&[ifname.as_str(), "description", descr.as_str()])?;
            ifconfig(&[bridge, "addm", ifname.as_str()])?;
            ifconfig(&[ifname.as_str(), "up"])?;
            Ok(())
        };
        if let Err(e) = setup() {
            // Best effort; the device may already be half renamed.
            let _ = ifconfig(&[tap, "destroy"]);
            let _ = ifconfig(&[ifname.as_str(), "destroy"]);
            return Err(e);
        }
        Ok(ifname)
    }

    fn real_device_name(
        &self,
        ifname: &str,
    ) -> Result<String, ResourceError> {
        let output = ifconfig(&["-D", ifname])?;
        parse_drivername(&output).map(str::to_string).ok_or_else(|| {
            ResourceError::Other(format!("no drivername for {ifname}"))
        })
    }

    fn set_online(
        &self,
        ifname: &str,
        online: bool,
    ) -> Result<(), ResourceError> {
        ifconfig(&[ifname, if online { "up" } else { "down" }]).map(|_| ())
    }

    fn release(&self, ifname: &str) -> Result<(), ResourceError> {
        ifconfig(&[ifname, "destroy"]).map(|_| ())
    }
}

/// VNC ports handed out by this process, probed against the host's
/// listening sockets.
pub struct PortPool {
    used: Mutex<BTreeSet<u16>>,
    min: u16,
    max: u16,
}

impl PortPool {
    pub fn new() -> Self {
        Self::with_range(VNC_PORT_MIN as u16, VNC_PORT_MAX as u16)
    }

    pub fn with_range(min: u16, max: u16) -> Self {
        Self { used: Mutex::new(BTreeSet::new()), min, max }
    }

    fn is_free(port: u16) -> bool {
        TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).is_ok()
    }
}

impl PortAllocator for PortPool {
    fn acquire(&self) -> Result<u16, ResourceError> {
        let mut used = self.used.lock().unwrap();
        let port = (self.min..=self.max)
            .find(|p| !used.contains(p) && Self::is_free(*p))
            .ok_or(ResourceError::PortsExhausted(self.min, self.max))?;
        used.insert(port);
        Ok(port)
    }

    fn set_used(&self, port: u16) -> Result<(), ResourceError> {
        if !self.used.lock().unwrap().insert(port) {
            return Err(ResourceError::PortInUse(port));
        }
        Ok(())
    }
}
