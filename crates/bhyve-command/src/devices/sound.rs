// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::caps::{BhyveCaps, CapabilitySource};
use crate::command::DeviceArg;
use crate::error::{Error, Result};
use crate::machine::{AudioBackend, AudioSpec, SoundModel, SoundSpec};

/// `hda` sound device, optionally wired to OSS devices on the host.
pub fn hda(
    caps: &dyn CapabilitySource,
    spec: &SoundSpec,
    audio: Option<&AudioSpec>,
) -> Result<DeviceArg> {
    // hda is the only sound device bhyve has.
    if !caps.has_bhyve(BhyveCaps::SOUND_HDA) {
        return Err(Error::MissingCapability("sound device emulation"));
    }
    if spec.model != SoundModel::Ich7 {
        return Err(Error::SoundModel(spec.model));
    }

    let mut params = String::new();
    match audio.map(|a| &a.backend) {
        None => {}
        Some(AudioBackend::Oss { input_dev, output_dev }) => {
            if let Some(dev) = input_dev {
                params.push_str(&format!(",play={dev}"));
            }
            if let Some(dev) = output_dev {
                params.push_str(&format!(",rec={dev}"));
            }
        }
        Some(other) => return Err(Error::AudioBackend(other.type_name())),
    }

    Ok(DeviceArg::slot(format!("{},hda{}", spec.address, params)))
}
