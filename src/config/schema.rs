//! Configuration schema definitions

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Main configuration for taper
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaperConfig {
    /// Console connection settings
    #[serde(default)]
    pub mixer: MixerConfig,

    /// Level test settings
    #[serde(default)]
    pub test: TestConfig,
}

impl TaperConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.mixer.port == 0 {
            bail!("Mixer port must not be 0");
        }
        self.mixer.socket_addr()?;

        if !(1..=16).contains(&self.test.channel) {
            bail!("Test channel must be between 1 and 16");
        }
        if self.test.steps < 2 {
            bail!("Sweep needs at least 2 steps");
        }
        if self.test.settle_ms > 1000 {
            bail!("Settle delay must be at most 1000 ms");
        }
        if self.test.reply_timeout_ms == 0 || self.test.reply_timeout_ms > 60_000 {
            bail!("Reply timeout must be between 1 and 60000 ms");
        }

        Ok(())
    }
}

/// Console connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixerConfig {
    /// Console IP address (None = discover by broadcast)
    pub address: Option<String>,

    /// Console OSC port (default: 10024)
    #[serde(default = "default_port")]
    pub port: u16,
}

impl MixerConfig {
    /// The configured console address, if one is set.
    pub fn socket_addr(&self) -> Result<Option<SocketAddr>> {
        match &self.address {
            None => Ok(None),
            Some(address) => {
                let ip: IpAddr = address
                    .parse()
                    .with_context(|| format!("invalid mixer address {:?}", address))?;
                Ok(Some(SocketAddr::new(ip, self.port)))
            }
        }
    }
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            address: None,
            port: default_port(),
        }
    }
}

fn default_port() -> u16 {
    crate::mixer::XAIR_PORT
}

/// Level test configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfig {
    /// Console channel used for testing, 1-16 (default: 12)
    #[serde(default = "default_channel")]
    pub channel: u32,

    /// Number of equidistant sweep levels (default: 4096)
    #[serde(default = "default_steps")]
    pub steps: u32,

    /// Delay after every set message in ms (default: 10)
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Bounded wait for every query reply in ms (default: 1000)
    #[serde(default = "default_reply_timeout_ms")]
    pub reply_timeout_ms: u64,
}

impl TestConfig {
    /// Settle delay after set messages.
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Bounded wait for query replies.
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            steps: default_steps(),
            settle_ms: default_settle_ms(),
            reply_timeout_ms: default_reply_timeout_ms(),
        }
    }
}

fn default_channel() -> u32 {
    12
}
fn default_steps() -> u32 {
    4096
}
fn default_settle_ms() -> u64 {
    10
}
fn default_reply_timeout_ms() -> u64 {
    1000
}
