use anyhow::Result;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure that can be loaded from CLI, config file, or environment
///
/// Example configuration file content
/// # RTSP gateway configuration
///
/// listen_on_port = 5000
/// workspace = "./data"
///
/// # External tools
/// ffmpeg_bin = "/usr/bin/ffmpeg"
/// ffprobe_bin = "/usr/bin/ffprobe"
/// probe_timeout_secs = 15
/// stop_grace_secs = 5
///
/// # HLS output
/// hls_time = 2
/// hls_list_size = 3
///
/// # Drop streams whose transcoder exited on its own (0 = disabled)
/// liveness_interval_secs = 0
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(version, about, long_about = None)]
#[serde(default)]
pub struct Config {
    /// Port to listen on
    #[arg(short, long, default_value_t = 5000)]
    #[serde(default = "default_port")]
    pub listen_on_port: u16,

    /// Working directory for records and HLS output
    #[arg(short = 'w', long, default_value = ".")]
    #[serde(default = "default_workspace")]
    pub workspace: String,

    /// Configuration file path (overrides all other arguments)
    #[arg(short, long)]
    #[serde(skip)]
    pub config: Option<String>,

    /// ffmpeg executable used for transcoding
    #[arg(long, default_value = "ffmpeg")]
    #[serde(default = "default_ffmpeg_bin")]
    pub ffmpeg_bin: String,

    /// ffprobe executable used for stream validation
    #[arg(long, default_value = "ffprobe")]
    #[serde(default = "default_ffprobe_bin")]
    pub ffprobe_bin: String,

    /// Seconds to wait for ffprobe before giving up
    #[arg(long, default_value_t = 15)]
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Seconds to wait for a transcoder to quit before killing it
    #[arg(long, default_value_t = 5)]
    #[serde(default = "default_stop_grace_secs")]
    pub stop_grace_secs: u64,

    /// Target HLS segment duration in seconds
    #[arg(long, default_value_t = 2)]
    #[serde(default = "default_hls_time")]
    pub hls_time: u32,

    /// Number of segments kept in the rolling playlist
    #[arg(long, default_value_t = 3)]
    #[serde(default = "default_hls_list_size")]
    pub hls_list_size: u32,

    /// Interval of the exited-transcoder sweep (0 = disabled)
    #[arg(long, default_value_t = 0)]
    #[serde(default = "default_liveness_interval_secs")]
    pub liveness_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_on_port: default_port(),
            workspace: default_workspace(),
            config: None,
            ffmpeg_bin: default_ffmpeg_bin(),
            ffprobe_bin: default_ffprobe_bin(),
            probe_timeout_secs: default_probe_timeout_secs(),
            stop_grace_secs: default_stop_grace_secs(),
            hls_time: default_hls_time(),
            hls_list_size: default_hls_list_size(),
            liveness_interval_secs: default_liveness_interval_secs(),
        }
    }
}

impl Config {
    /// Load configuration from CLI args, optionally merging with a config file
    pub fn load() -> Result<Self> {
        let mut config = Config::parse();

        if let Some(config_path) = &config.config {
            let file_config = Self::from_file(Path::new(config_path))?;
            config = config.merge_with_file(file_config);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Merge with file config, CLI args take precedence
    fn merge_with_file(mut self, file_config: Config) -> Self {
        // If CLI value is default, use file value
        if self.listen_on_port == default_port() {
            self.listen_on_port = file_config.listen_on_port;
        }
        if self.workspace == default_workspace() {
            self.workspace = file_config.workspace;
        }
        if self.ffmpeg_bin == default_ffmpeg_bin() {
            self.ffmpeg_bin = file_config.ffmpeg_bin;
        }
        if self.ffprobe_bin == default_ffprobe_bin() {
            self.ffprobe_bin = file_config.ffprobe_bin;
        }
        if self.probe_timeout_secs == default_probe_timeout_secs() {
            self.probe_timeout_secs = file_config.probe_timeout_secs;
        }
        if self.stop_grace_secs == default_stop_grace_secs() {
            self.stop_grace_secs = file_config.stop_grace_secs;
        }
        if self.hls_time == default_hls_time() {
            self.hls_time = file_config.hls_time;
        }
        if self.hls_list_size == default_hls_list_size() {
            self.hls_list_size = file_config.hls_list_size;
        }
        if self.liveness_interval_secs == default_liveness_interval_secs() {
            self.liveness_interval_secs = file_config.liveness_interval_secs;
        }

        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.ffmpeg_bin.trim().is_empty() {
            return Err(anyhow::anyhow!("ffmpeg binary path cannot be empty"));
        }
        if self.ffprobe_bin.trim().is_empty() {
            return Err(anyhow::anyhow!("ffprobe binary path cannot be empty"));
        }
        if self.probe_timeout_secs == 0 {
            return Err(anyhow::anyhow!("probe timeout must be greater than 0"));
        }
        if self.stop_grace_secs == 0 {
            return Err(anyhow::anyhow!("stop grace period must be greater than 0"));
        }
        if self.hls_time == 0 || self.hls_list_size == 0 {
            return Err(anyhow::anyhow!(
                "hls_time and hls_list_size must be greater than 0"
            ));
        }

        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }

    pub fn liveness_interval(&self) -> Option<Duration> {
        (self.liveness_interval_secs > 0).then(|| Duration::from_secs(self.liveness_interval_secs))
    }
}

// Default value functions
fn default_port() -> u16 {
    5000
}

fn default_workspace() -> String {
    ".".to_string()
}

fn default_ffmpeg_bin() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe_bin() -> String {
    "ffprobe".to_string()
}

fn default_probe_timeout_secs() -> u64 {
    15
}

fn default_stop_grace_secs() -> u64 {
    5
}

fn default_hls_time() -> u32 {
    2
}

fn default_hls_list_size() -> u32 {
    3
}

fn default_liveness_interval_secs() -> u64 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_from_cli() {
        let cli_content = [
            "CLI",
            "--listen-on-port",
            "8080",
            "--workspace",
            "/tmp/test",
            "--ffprobe-bin",
            "/opt/ffprobe",
            "--stop-grace-secs",
            "2",
        ];

        let config = Config::try_parse_from(cli_content).unwrap();

        assert_eq!(config.listen_on_port, 8080);
        assert_eq!(config.workspace, "/tmp/test");
        assert_eq!(config.ffprobe_bin, "/opt/ffprobe");
        assert_eq!(config.ffmpeg_bin, "ffmpeg");
        assert_eq!(config.stop_grace(), Duration::from_secs(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_content = r#"
            listen_on_port = 8080
            workspace = "/tmp/test"
            hls_time = 4
            liveness_interval_secs = 10
        "#;

        let config: Config = toml::from_str(toml_content).unwrap();

        assert_eq!(config.listen_on_port, 8080);
        assert_eq!(config.hls_time, 4);
        // unspecified fields fall back to defaults
        assert_eq!(config.hls_list_size, 3);
        assert_eq!(config.probe_timeout_secs, 15);
        assert_eq!(config.liveness_interval(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_config_merge_with_file() {
        let file_config = Config {
            listen_on_port: 7000,
            workspace: "/srv/gateway".to_string(),
            ffmpeg_bin: "/usr/local/bin/ffmpeg".to_string(),
            ..Default::default()
        };

        let cli_config = Config {
            listen_on_port: 9000,
            ..Default::default()
        };

        let merged = cli_config.merge_with_file(file_config);

        assert_eq!(merged.listen_on_port, 9000); // CLI value takes precedence
        assert_eq!(merged.workspace, "/srv/gateway");
        assert_eq!(merged.ffmpeg_bin, "/usr/local/bin/ffmpeg");
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let config = Config {
            stop_grace_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            hls_list_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            ffprobe_bin: " ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_liveness_disabled_by_default() {
        assert_eq!(Config::default().liveness_interval(), None);
    }
}
