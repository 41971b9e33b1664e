//! Remote console session
//!
//! Request/reply exchanges with an X Air / M Air console over OSC:
//! discovery by broadcast, fader set/query by float, and node dB-string
//! queries.

mod session;

pub use session::{MixerInfo, MixerSession, XAIR_PORT};
