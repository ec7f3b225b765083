//! Output device enumeration
//!
//! Lists output devices across every cpal host compiled in, so a device
//! preference in [`FeederOptions`](super::FeederOptions) can name a device
//! on a non-default host (e.g. an ALSA device while PulseAudio is default).

use std::fmt;

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Host, HostId};

use super::config::{BackendKind, DeviceId};
use super::error::{FeederError, FeederResult};

/// Display name for a host
fn host_name(host_id: HostId) -> String {
    let name = format!("{:?}", host_id);
    match name.as_str() {
        "Alsa" => "ALSA".to_string(),
        "Jack" => "JACK".to_string(),
        "Wasapi" => "WASAPI".to_string(),
        _ => name,
    }
}

fn host_by_name(name: &str) -> Option<Host> {
    cpal::available_hosts()
        .into_iter()
        .find(|id| host_name(*id) == name)
        .and_then(|id| cpal::host_from_id(id).ok())
}

/// An output device and its default format
#[derive(Debug, Clone, PartialEq)]
pub struct OutputDevice {
    /// Identifier usable as a device preference
    pub id: DeviceId,
    pub name: String,
    /// Host backend name (e.g. "ALSA", "CoreAudio")
    pub host: String,
    /// Default device of its host
    pub is_default: bool,
    /// Default sample rate
    pub sample_rate: u32,
    /// Default channel count
    pub channels: u16,
}

impl fmt::Display for OutputDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({}Hz, {}ch){}",
            self.host,
            self.name,
            self.sample_rate,
            self.channels,
            if self.is_default { " *" } else { "" }
        )
    }
}

/// Every output device from every available host
///
/// Default devices come first, then by host and name. Hosts or devices that
/// fail to answer are skipped with a debug log.
pub fn get_output_devices() -> Vec<OutputDevice> {
    let mut devices = Vec::new();

    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(h) => h,
            Err(e) => {
                log::debug!("Could not initialize host {:?}: {}", host_id, e);
                continue;
            }
        };
        let host_label = host_name(host_id);

        let default_name = host
            .default_output_device()
            .and_then(|d: cpal::Device| d.name().ok());

        let outputs = match host.output_devices() {
            Ok(d) => d,
            Err(e) => {
                log::debug!("Could not enumerate devices for {:?}: {}", host_id, e);
                continue;
            }
        };

        for device in outputs {
            let Ok(name) = device.name() else {
                continue;
            };
            let Ok(config) = device.default_output_config() else {
                continue;
            };

            devices.push(OutputDevice {
                id: DeviceId::with_host(name.as_str(), host_label.as_str()),
                is_default: default_name.as_ref() == Some(&name),
                name,
                host: host_label.clone(),
                sample_rate: config.sample_rate().0,
                channels: config.channels(),
            });
        }
    }

    devices.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then_with(|| a.host.cmp(&b.host))
            .then_with(|| a.name.cmp(&b.name))
    });

    log::debug!(
        "Enumerated {} output devices from {} hosts",
        devices.len(),
        cpal::available_hosts().len()
    );

    devices
}

/// Look up a device by identifier
///
/// Searches the named host when the id carries one, otherwise every host.
pub fn find_device_by_id(id: &DeviceId) -> FeederResult<cpal::Device> {
    let not_found = || {
        FeederError::construction(
            BackendKind::Native,
            format!("output device not found: {}", id.display_label()),
        )
    };

    if let Some(host) = id.host.as_deref().and_then(host_by_name) {
        return host
            .output_devices()
            .map_err(|e| FeederError::construction(BackendKind::Native, e))?
            .find(|d: &cpal::Device| d.name().ok().as_deref() == Some(id.name.as_str()))
            .ok_or_else(not_found);
    }

    cpal::available_hosts()
        .into_iter()
        .filter_map(|host_id| cpal::host_from_id(host_id).ok())
        .filter_map(|host| host.output_devices().ok())
        .flatten()
        .find(|d: &cpal::Device| d.name().ok().as_deref() == Some(id.name.as_str()))
        .ok_or_else(not_found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_enumeration() {
        // Empty in CI; only checks that enumeration doesn't panic and sorts defaults first
        let devices = get_output_devices();
        if let Some(first_non_default) = devices.iter().position(|d| !d.is_default) {
            assert!(devices[first_non_default..].iter().all(|d| !d.is_default));
        }
    }

    #[test]
    fn test_unknown_device_is_construction_failure() {
        let id = DeviceId::with_host("definitely-not-a-device", "NoSuchHost");
        assert!(matches!(
            find_device_by_id(&id),
            Err(FeederError::BackendConstructionFailure { backend: BackendKind::Native, .. })
        ));
    }

    #[test]
    fn test_host_names() {
        assert!(!host_name(cpal::default_host().id()).is_empty());
    }
}
