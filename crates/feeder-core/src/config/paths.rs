//! Standard locations for feeder configuration

use std::path::PathBuf;

/// File name used when the embedding application doesn't pick one
pub const DEFAULT_CONFIG_FILE: &str = "feeder.yaml";

/// `~/.config/feeder` (or the platform equivalent), `./feeder` as a last resort
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("feeder")
}

/// `<config dir>/feeder/{filename}`
pub fn default_config_path(filename: &str) -> PathBuf {
    default_config_dir().join(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_layout() {
        let path = default_config_path(DEFAULT_CONFIG_FILE);
        assert!(path.ends_with("feeder/feeder.yaml"));
    }
}
