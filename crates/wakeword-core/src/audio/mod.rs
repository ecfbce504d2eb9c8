//! Audio processing module
//!
//! This module contains the audio-side stages of the pipeline:
//! - Log-mel feature extraction ([`features`])
//! - Frame assembly from arbitrary capture chunks ([`framer`])
//! - Energy scoring used by test mode ([`energy`])

pub mod energy;
pub mod features;
pub mod framer;
