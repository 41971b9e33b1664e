//! Taper - fader level codec and live-console validation
//!
//! Converts X Air / M Air mixing-console fader positions among float,
//! step-index, dB, and OSC-string representations, reproducing the
//! console firmware's rounding digit for digit, and validates that
//! mapping against a live console over OSC.

pub mod config;
pub mod level;
pub mod mixer;
pub mod osc;
pub mod tester;

pub use config::TaperConfig;
pub use level::{FaderLevel, ParseLevelError, XAirLevel, XAIR_FADER_STEPS};
pub use mixer::{MixerInfo, MixerSession};
pub use tester::LevelTester;
