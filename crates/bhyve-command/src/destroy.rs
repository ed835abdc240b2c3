// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::command::{Binaries, Command};
use crate::error::{Error, Result};

/// `bhyvectl --destroy --vm=<name>`
pub fn destroy_command(binaries: &Binaries, name: &str) -> Result<Command> {
    if name.is_empty() {
        return Err(Error::EmptyName);
    }
    let mut cmd = Command::new(&binaries.bhyvectl);
    cmd.arg("--destroy").arg(format!("--vm={name}"));
    Ok(cmd)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn destroy_names_the_vm() {
        let cmd = destroy_command(&Binaries::default(), "vm0").unwrap();
        assert_eq!(cmd.program(), "/usr/sbin/bhyvectl");
        assert_eq!(cmd.args(), ["--destroy", "--vm=vm0"]);
    }

    #[test]
    fn destroy_needs_a_name() {
        assert!(matches!(
            destroy_command(&Binaries::default(), ""),
            Err(Error::EmptyName)
        ));
    }
}
