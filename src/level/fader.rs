//! Fixed-resolution fader level codec

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

use thiserror::Error;

/// Fader resolution of X Air / M Air console firmware.
pub const XAIR_FADER_STEPS: u32 = 1024;

/// A fader level at the X Air firmware resolution.
pub type XAirLevel = FaderLevel<XAIR_FADER_STEPS>;

/// Error returned when a string is not a valid fader dB value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid fader dB string {value:?}")]
pub struct ParseLevelError {
    value: String,
}

impl ParseLevelError {
    fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// The rejected input.
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// A fader position on an `N`-step console fader.
///
/// The canonical state is a single step index in `[0, N-1]`; the float
/// level in `[0, 1]`, the dB value, and the console's OSC dB string are
/// all derived from it, so the four representations can never disagree.
/// Conversions reproduce the console firmware's rounding exactly,
/// including its deliberate "add half a step, truncate" index rounding.
///
/// The index is stored atomically, so a level shared between a receive
/// handler and a main thread can be read while it is written without
/// ever observing a torn value.
///
/// ```
/// use taper::XAirLevel;
///
/// let level = XAirLevel::from_float(0.75);
/// assert_eq!(level.index(), 767);
/// assert_eq!(level.osc_string(), "0.0"); // unity gain at 3/4 travel
/// ```
///
/// Resolutions below two steps leave the arithmetic undefined and are
/// rejected at compile time:
///
/// ```compile_fail
/// let broken = taper::FaderLevel::<1>::new();
/// ```
#[derive(Debug)]
pub struct FaderLevel<const N: u32> {
    idx: AtomicU32,
}

impl<const N: u32> FaderLevel<N> {
    // Evaluated at monomorphization; N = 0 or 1 would divide by N - 1.
    const STEPS_OK: () = assert!(N > 1, "fader resolution N must be at least 2");

    /// Create a level at the bottom of the fader travel (silence).
    pub fn new() -> Self {
        Self::from_float(0.0)
    }

    /// Create a level from a float in `[0, 1]`; out-of-range input clips.
    pub fn from_float(level: f32) -> Self {
        let _ = Self::STEPS_OK;
        Self {
            idx: AtomicU32::new(Self::index_from_float(level)),
        }
    }

    /// Create a level from a console dB string such as `"-10.4"`, `"+2.0"`
    /// or `"-oo"`.
    pub fn from_osc_str(value: &str) -> Result<Self, ParseLevelError> {
        let level = Self::new();
        level.set_osc_string(value)?;
        Ok(level)
    }

    /// Number of discrete fader positions.
    pub const fn steps() -> u32 {
        N
    }

    /// Convert a float level in `[0, 1]` to a step index.
    ///
    /// Out-of-range input clips to the ends of the travel. The rounding is
    /// the firmware's own: scale by `N - 1 + 0.5` and truncate. This is
    /// not nearest-rounding and must stay that way; the console disagrees
    /// with `round(level * (N - 1))` at roughly a quarter of all levels.
    pub fn index_from_float(flevel: f32) -> u32 {
        let _ = Self::STEPS_OK;
        let flevel = if flevel > 1.0 {
            1.0
        } else if flevel <= 0.0 {
            0.0
        } else {
            flevel
        };

        let idx = (flevel * ((N - 1) as f32 + 0.5)) as u32;

        // Guards float overshoot at flevel = 1.0.
        idx.min(N - 1)
    }

    /// Convert a dB value to a step index, inverting the piecewise taper.
    ///
    /// Evaluated top band first with the segment boundaries recomputed
    /// from `N`, then rounded onto the grid exactly like
    /// [`index_from_float`](Self::index_from_float), so the result always
    /// lands in `[0, N-1]` even for out-of-range dB input.
    pub fn index_from_db(db: f32) -> u32 {
        let _ = Self::STEPS_OK;
        let level = if db >= (40.0 * N as f32) / (2 * (N - 1)) as f32 - 30.0 {
            (db + 30.0) / 40.0
        } else if db >= (80.0 * N as f32) / (4 * (N - 1)) as f32 - 50.0 {
            (db + 50.0) / 80.0
        } else if db >= (160.0 * N as f32) / (16 * (N - 1)) as f32 - 70.0 {
            (db + 70.0) / 160.0
        } else if db > -90.0 {
            (db + 90.0) / 480.0
        } else {
            // At or below -90 dB the fader is all the way down.
            0.0
        };

        Self::index_from_float(level)
    }

    /// Current step index.
    pub fn index(&self) -> u32 {
        self.idx.load(Ordering::SeqCst)
    }

    /// Set the level by step index; indices past the top clamp to `N - 1`.
    pub fn set_index(&self, index: u32) {
        self.idx.store(index.min(N - 1), Ordering::SeqCst);
    }

    /// Current level as a float in `[0, 1]`.
    pub fn float(&self) -> f32 {
        self.index() as f32 / (N - 1) as f32
    }

    /// Set the level by float value; out-of-range input clips.
    pub fn set_float(&self, level: f32) {
        self.idx.store(Self::index_from_float(level), Ordering::SeqCst);
    }

    /// Current level in dB.
    ///
    /// Piecewise-linear taper per Behringer: four bands of increasing
    /// resolution toward the bottom of the travel, `-144` dB standing in
    /// for -oo at index 0.
    pub fn db(&self) -> f32 {
        let idx = self.index();

        if idx >= N / 2 {
            (40.0 * idx as f32) / (N - 1) as f32 - 30.0
        } else if idx >= N / 4 {
            (80.0 * idx as f32) / (N - 1) as f32 - 50.0
        } else if idx >= N / 16 {
            (160.0 * idx as f32) / (N - 1) as f32 - 70.0
        } else if idx > 0 {
            (480.0 * idx as f32) / (N - 1) as f32 - 90.0
        } else {
            -144.0
        }
    }

    /// Set the level by dB value; values outside the taper's range clip.
    pub fn set_db(&self, db: f32) {
        self.idx.store(Self::index_from_db(db), Ordering::SeqCst);
    }

    /// The dB value in the console's OSC wire convention: `"-oo"` at the
    /// bottom of the travel, otherwise a signed value with one tenths
    /// digit, e.g. `"-10.4"` or `"+2.0"`.
    ///
    /// Tenths are rounded half-up by adding 0.05 dB worth and truncating,
    /// matching the firmware digit for digit. Exactly 0.0 dB carries no
    /// sign at all; the console makes no distinction between "+0.0" and
    /// "-0.0".
    pub fn osc_string(&self) -> String {
        let db = self.db();
        if db == -144.0 {
            return "-oo".to_string();
        }

        let mut sign = if db < 0.0 { "-" } else { "+" };
        let abs = if db < 0.0 { -db } else { db };

        let rounded = (10.0 * abs + 0.5) as i32 as f32 * 0.1;
        let whole = rounded as i32;
        let tenth = (10.0 * rounded - (10 * whole) as f32) as i32;

        if whole == 0 && tenth == 0 {
            sign = "";
        }

        format!("{sign}{whole}.{tenth}")
    }

    /// Set the level from a console dB string.
    ///
    /// `"-oo"` drops the fader to index 0; anything else must parse as a
    /// signed decibel number. A malformed string is a hard error, never a
    /// silent default.
    pub fn set_osc_string(&self, value: &str) -> Result<(), ParseLevelError> {
        if value == "-oo" {
            self.idx.store(0, Ordering::SeqCst);
            return Ok(());
        }

        let db: f32 = value
            .trim()
            .parse()
            .map_err(|_| ParseLevelError::new(value))?;
        self.set_db(db);
        Ok(())
    }
}

impl<const N: u32> Default for FaderLevel<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: u32> fmt::Display for FaderLevel<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.osc_string())
    }
}

impl<const N: u32> FromStr for FaderLevel<N> {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_osc_str(s)
    }
}
