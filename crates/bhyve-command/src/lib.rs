// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Synthesis of bhyve(8) command lines from a machine description.
//!
//! Given a [`MachineConfig`], a [`CapabilitySource`] describing what the
//! installed binaries support, and a [`ResourceProvider`] that acquires (or
//! merely pretends to acquire) host resources, this crate produces the
//! argument vectors for:
//!
//! - `bhyve` itself ([`bhyve_command`]),
//! - the boot loader that must run first ([`load_command`]), one of
//!   `bhyveload`, `grub-bhyve`, or a custom binary,
//! - `bhyvectl` to tear the machine down ([`destroy_command`]).
//!
//! Nothing here spawns a process. The only side effects are the ones the
//! [`ResourceProvider`] performs: creating tap devices and reserving VNC
//! ports. The resolved interface names and ports are written back into the
//! caller's configuration.

pub mod caps;
pub mod command;
mod compose;
mod destroy;
pub mod devices;
pub mod error;
pub mod loader;
pub mod machine;
pub mod resources;
pub mod types;

pub use caps::{BhyveCaps, Capabilities, CapabilitySource, GrubCaps};
pub use command::{Binaries, Command};
pub use compose::bhyve_command;
pub use destroy::destroy_command;
pub use error::{Error, ErrorKind, ResourceError, Result};
pub use loader::{load_command, LoaderCommand};
pub use machine::MachineConfig;
pub use resources::{DryRun, Live, ResourceProvider};
