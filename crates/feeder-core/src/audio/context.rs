//! Process-wide output context
//!
//! Probing the default host and device is slow on some platforms and some
//! hosts only tolerate a limited number of live contexts. The default output
//! is therefore resolved once per process and reused by every feeder.
//!
//! The context is never torn down; individual feeders only drop their own
//! streams.

use std::sync::OnceLock;

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::HostId;

/// The default output as seen when the context was first resolved
#[derive(Debug, Clone, PartialEq)]
pub struct SharedOutputContext {
    pub host_id: HostId,
    pub device_name: String,
    pub sample_rate: u32,
    pub channels: u16,
}

static SHARED: OnceLock<Option<SharedOutputContext>> = OnceLock::new();

/// The shared output context, resolving it on first use
///
/// `None` when the default host has no usable output device. The result of
/// the first probe is kept for the life of the process.
pub fn shared_context() -> Option<&'static SharedOutputContext> {
    SHARED.get_or_init(resolve_default_output).as_ref()
}

/// Resolve the shared context now; returns whether native output exists
pub fn init_shared_context() -> bool {
    shared_context().is_some()
}

fn resolve_default_output() -> Option<SharedOutputContext> {
    let host = cpal::default_host();
    let host_id = host.id();

    let Some(device) = host.default_output_device() else {
        log::info!("No default output device on host {:?}", host_id);
        return None;
    };

    let config = match device.default_output_config() {
        Ok(config) => config,
        Err(e) => {
            log::warn!("Default output device has no usable config: {}", e);
            return None;
        }
    };

    let context = SharedOutputContext {
        host_id,
        device_name: device.name().unwrap_or_else(|_| "Unknown".to_string()),
        sample_rate: config.sample_rate().0,
        channels: config.channels(),
    };

    log::info!(
        "Shared output context: [{:?}] {} ({}Hz, {} channels)",
        context.host_id,
        context.device_name,
        context.sample_rate,
        context.channels
    );

    Some(context)
}
