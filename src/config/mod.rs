//! Configuration loading and validation

mod schema;

pub use schema::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Example configuration written by `taper init`.
pub const EXAMPLE_CONFIG: &str = "\
# taper configuration

mixer:
  # Console IP address; remove to discover one by broadcast.
  # address: 192.168.1.35
  port: 10024

test:
  # Console channel used for testing. Its fader will move!
  channel: 12
  # Number of equidistant sweep levels for `taper verify`.
  steps: 4096
  # Delay after every set message so the console isn't overrun.
  settle_ms: 10
  # Bounded wait for every query reply.
  reply_timeout_ms: 1000
";

/// Load configuration from a YAML file
pub fn load_config(path: &Path) -> Result<TaperConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {:?}", path))?;
    let config: TaperConfig = serde_yaml::from_str(&contents)
        .with_context(|| format!("failed to parse config file {:?}", path))?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from a YAML file, falling back to defaults when
/// the file doesn't exist.
pub fn load_or_default(path: &Path) -> Result<TaperConfig> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(TaperConfig::default())
    }
}

/// Write the example configuration to `path`.
pub fn write_example(path: &Path) -> Result<()> {
    std::fs::write(path, EXAMPLE_CONFIG)
        .with_context(|| format!("failed to write config file {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(yaml: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_minimal_config() {
        let file = write_config(
            r#"
mixer:
  address: 192.168.1.35

test:
  channel: 3
"#,
        );

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.mixer.address.as_deref(), Some("192.168.1.35"));
        assert_eq!(config.mixer.port, 10024);
        assert_eq!(config.test.channel, 3);
        assert_eq!(config.test.steps, 4096);
        assert_eq!(config.test.settle_ms, 10);
        assert_eq!(config.test.reply_timeout_ms, 1000);

        let addr = config.mixer.socket_addr().unwrap().unwrap();
        assert_eq!(addr.to_string(), "192.168.1.35:10024");
    }

    #[test]
    fn test_empty_config_is_all_defaults() {
        let file = write_config("{}\n");
        let config = load_config(file.path()).unwrap();
        assert!(config.mixer.address.is_none());
        assert_eq!(config.test.channel, 12);
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        for yaml in [
            "test:\n  channel: 0\n",
            "test:\n  channel: 17\n",
            "test:\n  steps: 1\n",
            "test:\n  settle_ms: 5000\n",
            "test:\n  reply_timeout_ms: 0\n",
            "mixer:\n  address: not-an-address\n",
            "mixer:\n  port: 0\n",
        ] {
            let file = write_config(yaml);
            assert!(load_config(file.path()).is_err(), "accepted {:?}", yaml);
        }
    }

    #[test]
    fn test_load_or_default_without_a_file() {
        let config = load_or_default(Path::new("/nonexistent/taper.yaml")).unwrap();
        assert_eq!(config.test.channel, 12);
        assert!(config.mixer.address.is_none());
    }

    #[test]
    fn test_example_config_loads() {
        let file = write_config(EXAMPLE_CONFIG);
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.test.channel, 12);
        assert_eq!(config.test.steps, 4096);
    }
}
