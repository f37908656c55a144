use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Global configuration loaded from `~/.config/adm/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmConfig {
    /// Maximum number of transfers running at once; further items queue FIFO.
    pub max_concurrent: usize,
    /// Time-to-live for cached asset metadata, in seconds.
    pub cache_ttl_secs: u64,
    /// Maximum number of entries kept in the metadata cache.
    pub cache_max_entries: usize,
    /// Debounce window for durable snapshot writes, in milliseconds.
    pub save_debounce_ms: u64,
    /// Directory downloads are saved to (None = current directory at run time).
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
    /// Optional directory completed files are exported to (shared/gallery
    /// location). Export is a side effect; absence disables it.
    #[serde(default)]
    pub export_dir: Option<PathBuf>,
    /// Optional receive-rate cap in bytes per second (None = no cap).
    #[serde(default)]
    pub max_recv_speed: Option<u64>,
}

impl Default for AdmConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            cache_ttl_secs: 300,
            cache_max_entries: 50,
            save_debounce_ms: 1000,
            download_dir: None,
            export_dir: None,
            max_recv_speed: None,
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("adm")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<AdmConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = AdmConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: AdmConfig = toml::from_str(&data)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = AdmConfig::default();
        assert_eq!(cfg.max_concurrent, 2);
        assert_eq!(cfg.cache_ttl_secs, 300);
        assert_eq!(cfg.cache_max_entries, 50);
        assert_eq!(cfg.save_debounce_ms, 1000);
        assert!(cfg.download_dir.is_none());
        assert!(cfg.export_dir.is_none());
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = AdmConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: AdmConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.max_concurrent, cfg.max_concurrent);
        assert_eq!(parsed.cache_ttl_secs, cfg.cache_ttl_secs);
        assert_eq!(parsed.cache_max_entries, cfg.cache_max_entries);
        assert_eq!(parsed.save_debounce_ms, cfg.save_debounce_ms);
    }

    #[test]
    fn config_toml_custom_values() {
        let toml = r#"
            max_concurrent = 4
            cache_ttl_secs = 60
            cache_max_entries = 10
            save_debounce_ms = 250
            download_dir = "/srv/assets"
        "#;
        let cfg: AdmConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.max_concurrent, 4);
        assert_eq!(cfg.cache_ttl_secs, 60);
        assert_eq!(cfg.cache_max_entries, 10);
        assert_eq!(cfg.save_debounce_ms, 250);
        assert_eq!(cfg.download_dir.as_deref(), Some(std::path::Path::new("/srv/assets")));
        assert!(cfg.max_recv_speed.is_none());
    }

    #[test]
    fn config_toml_export_and_rate_cap() {
        let toml = r#"
            max_concurrent = 2
            cache_ttl_secs = 300
            cache_max_entries = 50
            save_debounce_ms = 1000
            export_dir = "/home/user/Public"
            max_recv_speed = 2_000_000
        "#;
        let cfg: AdmConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.export_dir.as_deref(), Some(std::path::Path::new("/home/user/Public")));
        assert_eq!(cfg.max_recv_speed, Some(2_000_000));
    }
}
