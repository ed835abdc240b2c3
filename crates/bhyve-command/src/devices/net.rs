// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use slog::{debug, Logger};
use uuid::Uuid;

use crate::caps::{BhyveCaps, CapabilitySource};
use crate::command::DeviceArg;
use crate::error::{Error, Result};
use crate::machine::{
    NetConnection, NetworkSpec, NicModel, GENERATED_TAP_PREFIX,
};
use crate::resources::ResourceProvider;

/// Bridged NIC backed by a freshly created tap device.
///
/// On success `spec.ifname` holds the name of the created interface. If the
/// tap cannot be set up, `spec.ifname` is cleared.
pub fn nic(
    caps: &dyn CapabilitySource,
    resources: &dyn ResourceProvider,
    log: &Logger,
    spec: &mut NetworkSpec,
    vm: &Uuid,
) -> Result<DeviceArg> {
    let model = match spec.model {
        NicModel::Virtio => "virtio-net",
        NicModel::E1000 if caps.has_bhyve(BhyveCaps::NET_E1000) => "e1000",
        NicModel::E1000 => {
            return Err(Error::MissingCapability("e1000 NIC emulation"))
        }
        other => return Err(Error::NicModel(other)),
    };

    let bridge = match &spec.connection {
        NetConnection::Bridge { bridge } => bridge.as_str(),
        other => return Err(Error::NetworkType(other.type_name())),
    };

    if spec.needs_generated_ifname() {
        spec.ifname = Some(format!("{GENERATED_TAP_PREFIX}%d"));
    }
    let template = spec.ifname.as_deref().unwrap_or_default();

    let tap = match resources.attach_tap(log, bridge, template, &spec.mac, vm)
    {
        Ok(tap) => tap,
        Err(e) => {
            spec.ifname = None;
            return Err(e);
        }
    };
    debug!(log, "NIC attached";
        "ifname" => &tap.ifname, "real" => &tap.real_ifname);

    let arg = DeviceArg::slot(format!(
        "{}:0,{},{},mac={}",
        spec.address.slot(),
        model,
        tap.real_ifname,
        spec.mac
    ));
    spec.ifname = Some(tap.ifname);
    Ok(arg)
}
