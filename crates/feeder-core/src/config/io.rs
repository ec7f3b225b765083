//! YAML load/save for any serde configuration type

use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Read and parse a YAML file, reporting why it failed
pub fn try_load_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    serde_yaml::from_str(&contents).with_context(|| format!("Failed to parse config: {:?}", path))
}

/// Load a configuration, falling back to defaults
///
/// A missing file is normal (first run) and logged at info; an unreadable
/// or malformed one is logged at warn. Either way the caller gets a usable
/// value.
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        log::info!("No config at {:?}, using defaults", path);
        return T::default();
    }

    match try_load_config(path) {
        Ok(config) => {
            log::info!("Loaded config from {:?}", path);
            config
        }
        Err(e) => {
            log::warn!("{:#}, using defaults", e);
            T::default()
        }
    }
}

/// Write a configuration as YAML, creating parent directories
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;
    std::fs::write(path, yaml).with_context(|| format!("Failed to write config file: {:?}", path))?;

    log::info!("Saved config to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{BackendKind, BufferSize, DeviceId, FeederOptions};

    #[test]
    fn test_missing_file_gives_defaults() {
        let options: FeederOptions = load_config(Path::new("/nonexistent/feeder/feeder.yaml"));
        assert_eq!(options, FeederOptions::default());
    }

    #[test]
    fn test_options_survive_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("feeder.yaml");

        let options = FeederOptions::default()
            .with_backends([BackendKind::Jack, BackendKind::Stub])
            .with_buffer_size(BufferSize::Fixed(1024))
            .with_device(DeviceId::with_host("hw:1,0", "ALSA"))
            .with_client_name("radio");

        save_config(&options, &path).unwrap();
        let loaded: FeederOptions = load_config(&path);
        assert_eq!(loaded, options);
    }

    #[test]
    fn test_malformed_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feeder.yaml");
        std::fs::write(&path, "backends: [Native, Hologram]\n").unwrap();

        assert!(try_load_config::<FeederOptions>(&path).is_err());
        let options: FeederOptions = load_config(&path);
        assert_eq!(options, FeederOptions::default());
    }
}
