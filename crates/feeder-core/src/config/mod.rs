//! Persisted feeder options
//!
//! [`FeederOptions`](crate::audio::FeederOptions) are plain serde data and
//! can be kept in a YAML file next to the embedding application's own
//! settings.
//!
//! ```ignore
//! use feeder_core::config::{default_config_path, load_config, save_config};
//! use feeder_core::FeederOptions;
//!
//! let path = default_config_path("feeder.yaml");
//! let options: FeederOptions = load_config(&path);
//! save_config(&options, &path)?;
//! ```

mod io;
mod paths;

pub use io::{load_config, save_config, try_load_config};
pub use paths::{default_config_dir, default_config_path, DEFAULT_CONFIG_FILE};
