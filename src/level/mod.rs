//! Fader level conversion between float, index, dB, and OSC string domains
//!
//! Models the non-linear fader taper of X Air / M Air console firmware:
//! coarse dB resolution near unity gain, fine resolution near the noise
//! floor.

mod fader;

pub use fader::{FaderLevel, ParseLevelError, XAirLevel, XAIR_FADER_STEPS};
