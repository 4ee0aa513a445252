//! CLI configuration loaded from environment variables.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

/// File name of the persisted ledger inside the data directory.
pub const SNAPSHOT_FILE: &str = "ledger.vdrp";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CliConfig {
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Log output format ("text" or "json").
    pub log_format: String,
    /// Directory holding the persisted ledger snapshot.
    pub data_dir: PathBuf,
}

impl CliConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let log_level = lookup("VOLDRIP_LOG").unwrap_or_else(|| "info".to_string());

        let log_format = lookup("VOLDRIP_LOG_FORMAT").unwrap_or_else(|| "text".to_string());
        check_log_format(&log_format).context("invalid VOLDRIP_LOG_FORMAT")?;

        let data_dir = match lookup("VOLDRIP_DATA_DIR") {
            Some(dir) if dir.trim().is_empty() => bail!("VOLDRIP_DATA_DIR is set but empty"),
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_dir()
                .context("no platform data directory; set VOLDRIP_DATA_DIR")?
                .join("voldrip"),
        };

        Ok(CliConfig {
            log_level,
            log_format,
            data_dir,
        })
    }

    /// Apply command-line flags on top of the environment values.
    pub fn apply_overrides(
        &mut self,
        log_level: Option<String>,
        log_format: Option<String>,
        data_dir: Option<PathBuf>,
    ) -> Result<()> {
        if let Some(format) = log_format {
            check_log_format(&format).context("invalid --log-format")?;
            self.log_format = format;
        }
        if let Some(level) = log_level {
            self.log_level = level;
        }
        if let Some(dir) = data_dir {
            self.data_dir = dir;
        }
        Ok(())
    }

    /// Path of the persisted ledger snapshot.
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(SNAPSHOT_FILE)
    }
}

fn check_log_format(format: &str) -> Result<()> {
    if format != "text" && format != "json" {
        bail!("log format must be \"text\" or \"json\", got {format:?}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn explicit_values_are_used() {
        let cfg = CliConfig::from_lookup(lookup(&[
            ("VOLDRIP_LOG", "debug"),
            ("VOLDRIP_LOG_FORMAT", "json"),
            ("VOLDRIP_DATA_DIR", "/tmp/voldrip-test"),
        ]))
        .unwrap();
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.log_format, "json");
        assert_eq!(cfg.snapshot_path(), PathBuf::from("/tmp/voldrip-test/ledger.vdrp"));
    }

    #[test]
    fn defaults_apply() {
        let cfg = CliConfig::from_lookup(lookup(&[("VOLDRIP_DATA_DIR", "/data")])).unwrap();
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.log_format, "text");
    }

    #[test]
    fn unknown_log_format_rejected() {
        let err = CliConfig::from_lookup(lookup(&[
            ("VOLDRIP_LOG_FORMAT", "xml"),
            ("VOLDRIP_DATA_DIR", "/data"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("VOLDRIP_LOG_FORMAT"));
    }

    #[test]
    fn flag_overrides_are_checked() {
        let mut cfg = CliConfig::from_lookup(lookup(&[("VOLDRIP_DATA_DIR", "/data")])).unwrap();
        let err = cfg.apply_overrides(None, Some("yaml".into()), None).unwrap_err();
        assert!(err.to_string().contains("--log-format"));
        assert_eq!(cfg.log_format, "text");

        cfg.apply_overrides(Some("debug".into()), Some("json".into()), Some("/other".into()))
            .unwrap();
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.log_format, "json");
        assert_eq!(cfg.snapshot_path(), PathBuf::from("/other/ledger.vdrp"));
    }

    #[test]
    fn empty_data_dir_rejected() {
        assert!(CliConfig::from_lookup(lookup(&[("VOLDRIP_DATA_DIR", "  ")])).is_err());
    }
}
