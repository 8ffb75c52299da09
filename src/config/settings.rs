use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

use codexbar_core::status::Thresholds;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Codex / Claude usage limits for Waybar")]
pub struct Config {
    /// Enable debug logging (stderr)
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand (defaults to `status`)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Install the poller into Waybar and merge its config and styles
    Install,
    /// Print one Waybar status payload and exit
    Status {
        /// Which provider(s) to report
        #[arg(short, long, value_enum)]
        provider: Option<ProviderChoice>,
    },
}

/// Provider selection for the status payload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProviderChoice {
    /// Codex only
    #[default]
    Codex,
    /// Claude only
    Claude,
    /// Codex and Claude side by side
    All,
}

impl Config {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Check if running the installer
    pub fn is_install_mode(&self) -> bool {
        matches!(self.command, Some(Command::Install))
    }
}

/// Application settings (from config file)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Provider(s) reported by `status`
    #[serde(default)]
    pub provider: ProviderChoice,

    /// Hard timeout for each HTTP request in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Refresh Codex tokens older than this many days
    #[serde(default = "default_refresh_interval_days")]
    pub refresh_interval_days: i64,

    /// Percent at which the module gets the `warn` class
    #[serde(default = "default_warn_percent")]
    pub warn_percent: f64,

    /// Percent at which the module gets the `critical` class
    #[serde(default = "default_critical_percent")]
    pub critical_percent: f64,

    /// Codex provider settings
    #[serde(default)]
    pub codex: CodexSettings,

    /// Claude provider settings
    #[serde(default)]
    pub claude: ClaudeSettings,

    /// Waybar module settings used by `install`
    #[serde(default)]
    pub waybar: WaybarSettings,
}

fn default_timeout() -> u64 {
    20
}

fn default_refresh_interval_days() -> i64 {
    codexbar_core::usage::codex::DEFAULT_REFRESH_INTERVAL_DAYS
}

fn default_warn_percent() -> f64 {
    70.0
}

fn default_critical_percent() -> f64 {
    90.0
}

/// Codex provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodexSettings {
    /// Include Codex in `provider = "all"` output
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Override for `auth.json` (default: `$CODEX_HOME/auth.json` or `~/.codex/auth.json`)
    #[serde(default)]
    pub auth_path: Option<PathBuf>,

    /// Usage endpoint (`CODEX_USAGE_URL` takes precedence)
    #[serde(default)]
    pub usage_url: Option<String>,

    /// OAuth token endpoint
    #[serde(default)]
    pub refresh_url: Option<String>,

    /// OAuth client id
    #[serde(default)]
    pub client_id: Option<String>,
}

/// Claude provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeSettings {
    /// Include Claude in `provider = "all"` output
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Override for `~/.claude/.credentials.json`
    #[serde(default)]
    pub credentials_path: Option<PathBuf>,

    /// Usage endpoint
    #[serde(default)]
    pub usage_url: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl Default for CodexSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            auth_path: None,
            usage_url: None,
            refresh_url: None,
            client_id: None,
        }
    }
}

impl Default for ClaudeSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            credentials_path: None,
            usage_url: None,
        }
    }
}

/// Waybar module settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaybarSettings {
    /// Seconds between Waybar runs of the poller
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

fn default_interval() -> u64 {
    300
}

impl Default for WaybarSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: ProviderChoice::default(),
            timeout_secs: default_timeout(),
            refresh_interval_days: default_refresh_interval_days(),
            warn_percent: default_warn_percent(),
            critical_percent: default_critical_percent(),
            codex: CodexSettings::default(),
            claude: ClaudeSettings::default(),
            waybar: WaybarSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from config file or use defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        // An explicit path must exist
        if let Some(p) = path {
            let content = std::fs::read_to_string(p)
                .with_context(|| format!("Failed to read config file: {:?}", p))?;
            return toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", p));
        }

        // Try default config locations
        let default_paths = [
            dirs::config_dir().map(|p| p.join("codexbar/config.toml")),
            dirs::home_dir().map(|p| p.join(".config/codexbar/config.toml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {:?}", path))?;
                return toml::from_str(&content)
                    .with_context(|| format!("Failed to parse config file: {:?}", path));
            }
        }

        // Return defaults if no config file found
        Ok(Self::default())
    }

    /// Load settings, falling back to defaults when the file is unreadable
    pub fn load_or_default(path: Option<&PathBuf>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            warn!("Using default settings: {:#}", e);
            Self::default()
        })
    }

    /// Merge CLI config into settings (CLI takes precedence)
    pub fn merge_cli(&mut self, cli: &Config) {
        if let Some(Command::Status {
            provider: Some(provider),
        }) = &cli.command
        {
            self.provider = *provider;
        }
    }

    /// Validate and normalize settings values
    pub fn validate(&mut self) {
        const MIN_TIMEOUT: u64 = 1;
        const MIN_INTERVAL: u64 = 1;
        const MAX_REFRESH_INTERVAL_DAYS: i64 = 3650;

        self.timeout_secs = self.timeout_secs.max(MIN_TIMEOUT);
        self.waybar.interval_secs = self.waybar.interval_secs.max(MIN_INTERVAL);
        self.refresh_interval_days = self
            .refresh_interval_days
            .clamp(0, MAX_REFRESH_INTERVAL_DAYS);

        // clamp panics on NaN bounds
        if !self.critical_percent.is_finite() {
            self.critical_percent = default_critical_percent();
        }
        if !self.warn_percent.is_finite() {
            self.warn_percent = default_warn_percent();
        }
        self.critical_percent = self.critical_percent.clamp(0.0, 100.0);
        self.warn_percent = self.warn_percent.clamp(0.0, self.critical_percent);
    }

    /// Class thresholds for status payloads
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            warn: self.warn_percent,
            critical: self.critical_percent,
        }
    }
}
