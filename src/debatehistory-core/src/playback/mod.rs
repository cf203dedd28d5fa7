//! Sequential speech playback for transcript messages.

mod controller;
mod machine;

pub use controller::PlaybackController;
pub use machine::{Effect, PlaybackMachine, PlaybackState, SynthesisRequest};
