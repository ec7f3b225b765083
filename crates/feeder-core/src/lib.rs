//! Feeder Core - push audio in, let it drain out of the best available output

pub mod audio;
pub mod clock;
pub mod config;
pub mod feeder;
pub mod queue;
pub mod resample;
pub mod types;

pub use audio::{BackendKind, FeederError, FeederOptions, FeederResult};
pub use clock::PlaybackState;
pub use feeder::{Feeder, FeederState};
pub use types::*;
