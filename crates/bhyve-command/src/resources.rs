// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host resources that synthesis acquires as a side effect.
//!
//! Only two builders touch the host: the NIC builder (tap devices) and the
//! graphics builder (VNC ports). Both go through a [`ResourceProvider`],
//! which is either [`Live`], backed by real allocators, or [`DryRun`],
//! which acquires nothing and hands back placeholders so the same pipeline
//! can run for validation and preview.

use slog::{debug, error, Logger};
use uuid::Uuid;

use crate::error::{Error, ResourceError, Result};
use crate::types::MacAddr;

/// Real device name reported for every NIC under [`DryRun`].
pub const DRY_RUN_TAP: &str = "tap0";

/// Lowest port a VNC listener may use.
pub const VNC_PORT_MIN: u32 = 5900;
/// Highest port a VNC listener may use.
pub const VNC_PORT_MAX: u32 = 65535;

/// Creates and manages tap devices on the host.
#[cfg_attr(test, mockall::automock)]
pub trait NetAllocator {
    /// Creates a persistent tap device attached to `bridge` and brings it
    /// up. `template` may contain a `%d` placeholder which the allocator
    /// replaces with a free index. Returns the interface name assigned.
    fn create_bridge_tap(
        &self,
        bridge: &str,
        template: &str,
        mac: &MacAddr,
        vm: &Uuid,
    ) -> std::result::Result<String, ResourceError>;

    /// Name of the underlying tap device, which may differ from the
    /// (renamed) interface name.
    fn real_device_name(
        &self,
        ifname: &str,
    ) -> std::result::Result<String, ResourceError>;

    fn set_online(
        &self,
        ifname: &str,
        online: bool,
    ) -> std::result::Result<(), ResourceError>;

    fn release(&self, ifname: &str) -> std::result::Result<(), ResourceError>;
}

/// Hands out TCP ports from a pool shared between machines.
#[cfg_attr(test, mockall::automock)]
pub trait PortAllocator {
    fn acquire(&self) -> std::result::Result<u16, ResourceError>;

    /// Records an explicitly configured port as taken.
    fn set_used(&self, port: u16) -> std::result::Result<(), ResourceError>;
}

/// A tap device as seen by bhyve.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TapDevice {
    /// Interface name to record on the NIC.
    pub ifname: String,
    /// Device name to hand to bhyve.
    pub real_ifname: String,
}

/// Strategy for acquiring host resources during synthesis.
pub trait ResourceProvider {
    /// Creates the tap device backing a bridged NIC. If a later step fails
    /// after creation, the device is released before the error returns.
    fn attach_tap(
        &self,
        log: &Logger,
        bridge: &str,
        template: &str,
        mac: &MacAddr,
        vm: &Uuid,
    ) -> Result<TapDevice>;

    /// Settles the port a VNC listener will use. `configured` is already
    /// range-checked unless `autoport` is set.
    fn reserve_vnc_port(
        &self,
        log: &Logger,
        autoport: bool,
        configured: u32,
    ) -> Result<u32>;
}

/// Acquires real host resources.
pub struct Live<'a> {
    net: &'a dyn NetAllocator,
    ports: &'a dyn PortAllocator,
}

impl<'a> Live<'a> {
    pub fn new(
        net: &'a dyn NetAllocator,
        ports: &'a dyn PortAllocator,
    ) -> Self {
        Self { net, ports }
    }

    fn resolve_tap(&self, log: &Logger, ifname: &str) -> Result<String> {
        let real = self.net.real_device_name(ifname).map_err(|e| {
            Error::resource(format!("resolve device name of {ifname}"), e)
        })?;
        debug!(log, "resolved tap device"; "ifname" => ifname, "real" => &real);

        // The link has to be brought up again once the device was reopened
        // to look its name up.
        self.net.set_online(ifname, true).map_err(|e| {
            Error::resource(format!("bring up interface {ifname}"), e)
        })?;
        Ok(real)
    }
}

impl ResourceProvider for Live<'_> {
    fn attach_tap(
        &self,
        log: &Logger,
        bridge: &str,
        template: &str,
        mac: &MacAddr,
        vm: &Uuid,
    ) -> Result<TapDevice> {
        let ifname =
            self.net.create_bridge_tap(bridge, template, mac, vm).map_err(
                |e| Error::resource(format!("create tap device {template}"), e),
            )?;

        match self.resolve_tap(log, &ifname) {
            Ok(real_ifname) => Ok(TapDevice { ifname, real_ifname }),
            Err(e) => {
                if let Err(re) = self.net.release(&ifname) {
                    error!(log, "failed to release tap device";
                        "ifname" => &ifname, "error" => %re);
                }
                Err(e)
            }
        }
    }

    fn reserve_vnc_port(
        &self,
        log: &Logger,
        autoport: bool,
        configured: u32,
    ) -> Result<u32> {
        if !autoport {
            // Range-checked by the caller, so this cannot truncate.
            let port = configured as u16;
            self.ports.set_used(port).map_err(|e| {
                Error::resource(format!("mark VNC port {port} as used"), e)
            })?;
            return Ok(configured);
        }

        let port = u32::from(
            self.ports
                .acquire()
                .map_err(|e| Error::resource("acquire VNC port", e))?,
        );
        if !(VNC_PORT_MIN..=VNC_PORT_MAX).contains(&port) {
            // The pool keeps the reservation; there is nothing to hand back.
            return Err(Error::resource(
                "acquire VNC port",
                ResourceError::PortOutOfRange(
                    port as u16,
                    VNC_PORT_MIN as u16,
                    VNC_PORT_MAX as u16,
                ),
            ));
        }
        debug!(log, "allocated VNC port"; "port" => port);
        Ok(port)
    }
}

/// Acquires nothing. Taps are reported as [`DRY_RUN_TAP`] and VNC ports
/// are left as configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct DryRun;

impl ResourceProvider for DryRun {
    fn attach_tap(
        &self,
        _log: &Logger,
        _bridge: &str,
        template: &str,
        _mac: &MacAddr,
        _vm: &Uuid,
    ) -> Result<TapDevice> {
        Ok(TapDevice {
            ifname: template.to_string(),
            real_ifname: DRY_RUN_TAP.to_string(),
        })
    }

    fn reserve_vnc_port(
        &self,
        _log: &Logger,
        _autoport: bool,
        configured: u32,
    ) -> Result<u32> {
        Ok(configured)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::ErrorKind;
    use mockall::predicate::eq;

    fn test_log() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    #[test]
    fn live_tap_resolves_and_reups() {
        let mut net = MockNetAllocator::new();
        net.expect_create_bridge_tap()
            .withf(|bridge, template, _, _| {
                bridge == "bridge0" && template == "vnet%d"
            })
            .times(1)
            .returning(|_, _, _, _| Ok("vnet0".to_string()));
        net.expect_real_device_name()
            .with(eq("vnet0"))
            .returning(|_| Ok("tap3".to_string()));
        net.expect_set_online()
            .with(eq("vnet0"), eq(true))
            .times(1)
            .returning(|_, _| Ok(()));
        net.expect_release().never();
        let ports = MockPortAllocator::new();

        let live = Live::new(&net, &ports);
        let tap = live
            .attach_tap(
                &test_log(),
                "bridge0",
                "vnet%d",
                &MacAddr::default(),
                &Uuid::nil(),
            )
            .unwrap();
        assert_eq!(
            tap,
            TapDevice {
                ifname: "vnet0".to_string(),
                real_ifname: "tap3".to_string()
            }
        );
    }

    #[test]
    fn live_tap_released_when_resolution_fails() {
        let mut net = MockNetAllocator::new();
        net.expect_create_bridge_tap()
            .returning(|_, _, _, _| Ok("vnet1".to_string()));
        net.expect_real_device_name().returning(|_| {
            Err(ResourceError::Other("no such device".to_string()))
        });
        net.expect_set_online().never();
        net.expect_release()
            .with(eq("vnet1"))
            .times(1)
            .returning(|_| Ok(()));
        let ports = MockPortAllocator::new();

        let live = Live::new(&net, &ports);
        let err = live
            .attach_tap(
                &test_log(),
                "bridge0",
                "vnet%d",
                &MacAddr::default(),
                &Uuid::nil(),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resource);
    }

    #[test]
    fn live_tap_create_failure_releases_nothing() {
        let mut net = MockNetAllocator::new();
        net.expect_create_bridge_tap().returning(|_, _, _, _| {
            Err(ResourceError::Other("bridge missing".to_string()))
        });
        net.expect_release().never();
        let ports = MockPortAllocator::new();

        let live = Live::new(&net, &ports);
        assert!(live
            .attach_tap(
                &test_log(),
                "bridge9",
                "vnet%d",
                &MacAddr::default(),
                &Uuid::nil(),
            )
            .is_err());
    }

    #[test]
    fn live_autoport_acquires() {
        let net = MockNetAllocator::new();
        let mut ports = MockPortAllocator::new();
        ports.expect_acquire().times(1).returning(|| Ok(5901));
        ports.expect_set_used().never();

        let live = Live::new(&net, &ports);
        assert_eq!(live.reserve_vnc_port(&test_log(), true, 0).unwrap(), 5901);
    }

    #[test]
    fn live_autoport_below_vnc_range_fails() {
        let net = MockNetAllocator::new();
        let mut ports = MockPortAllocator::new();
        ports.expect_acquire().times(1).returning(|| Ok(5800));
        ports.expect_set_used().never();

        let live = Live::new(&net, &ports);
        let err = live.reserve_vnc_port(&test_log(), true, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resource);
        assert!(matches!(
            err,
            Error::Resource {
                source: ResourceError::PortOutOfRange(5800, 5900, 65535),
                ..
            }
        ));
    }

    #[test]
    fn live_fixed_port_marked_used() {
        let net = MockNetAllocator::new();
        let mut ports = MockPortAllocator::new();
        ports.expect_acquire().never();
        ports
            .expect_set_used()
            .with(eq(5910u16))
            .times(1)
            .returning(|_| Ok(()));

        let live = Live::new(&net, &ports);
        assert_eq!(
            live.reserve_vnc_port(&test_log(), false, 5910).unwrap(),
            5910
        );
    }

    #[test]
    fn live_fixed_port_conflict_fails() {
        let net = MockNetAllocator::new();
        let mut ports = MockPortAllocator::new();
        ports
            .expect_set_used()
            .returning(|p| Err(ResourceError::PortInUse(p)));

        let live = Live::new(&net, &ports);
        let err =
            live.reserve_vnc_port(&test_log(), false, 5910).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resource);
    }

    #[test]
    fn dry_run_is_inert() {
        let tap = DryRun
            .attach_tap(
                &test_log(),
                "bridge0",
                "vnet%d",
                &MacAddr::default(),
                &Uuid::nil(),
            )
            .unwrap();
        assert_eq!(tap.ifname, "vnet%d");
        assert_eq!(tap.real_ifname, DRY_RUN_TAP);
        assert_eq!(DryRun.reserve_vnc_port(&test_log(), true, 0).unwrap(), 0);
    }
}
