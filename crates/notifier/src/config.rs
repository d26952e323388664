use anyhow::anyhow;
use clap::Parser;
use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;
use notifier_core::{parse_seed_watch, validate_positive, Currency, SeedWatch};
use serde::{Deserialize, Serialize};
use std::{
    env,
    fs::{self, File},
    io::{Read, Write},
    path::PathBuf,
};
use time::{format_description::well_known::Iso8601, OffsetDateTime};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to Settings.toml file holding configuration options
    #[arg(short, long)]
    pub config: Option<String>,

    /// Log level to run with the service (default: info)
    #[arg(short, long)]
    pub level: Option<String>,

    /// Discord webhook url that balance change notifications are posted to
    #[arg(short, long, env = "DISCORD_WEBHOOK")]
    pub webhook: Option<String>,

    /// Base url of the btc-rpc-explorer instance to query
    #[arg(short, long, env = "BTC_API_ENDPOINT")]
    pub explorer_url: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Settings {
    pub config: Option<String>,
    pub level: Option<String>,
    pub db_settings: DBSettings,
    pub api_settings: APISettings,
    pub explorer_settings: ExplorerSettings,
    pub watch_settings: WatchSettings,
    pub notification_settings: NotificationSettings,
}

impl ConfigurableSettings for Settings {
    fn apply_cli_overrides(&mut self, cli_settings: &CliSettings) {
        if let Some(level) = &cli_settings.level {
            self.level = Some(level.clone());
        }
        if let Some(webhook) = &cli_settings.webhook {
            self.notification_settings.discord_webhook = webhook.clone();
        }
        if let Some(explorer_url) = &cli_settings.explorer_url {
            self.explorer_settings.base_url = explorer_url.clone();
        }
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("./config/local.toml")
    }
}

impl Settings {
    /// Rejects settings the watch engine cannot run with. Called before any
    /// watcher is started.
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.notification_settings.discord_webhook.trim().is_empty() {
            return Err(anyhow!(
                "notification_settings.discord_webhook is required (or set DISCORD_WEBHOOK)"
            ));
        }
        if self.explorer_settings.base_url.trim().is_empty() {
            return Err(anyhow!("explorer_settings.base_url must not be empty"));
        }

        let watch = &self.watch_settings;
        validate_positive("watch_settings.lookahead", watch.lookahead)?;
        validate_positive("watch_settings.page_size", watch.page_size)?;
        validate_positive("watch_settings.max_pages", watch.max_pages)?;
        validate_positive(
            "watch_settings.sleep_interval_secs",
            watch.sleep_interval_secs,
        )?;
        watch.seeds()?;

        #[cfg(not(any(feature = "e2e-testing", debug_assertions)))]
        if self.explorer_settings.mock_enabled {
            return Err(anyhow!(
                "Mock explorer requires e2e-testing feature or debug build"
            ));
        }

        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DBSettings {
    pub data_folder: String,
    pub read_max_connections: u32,
    pub read_min_connections: u32,
    pub write_max_connections: u32,
    pub write_min_connections: u32,
    pub idle_timeout_secs: u64,
    pub acquire_timeout_secs: u64,
    pub sqlite_config: SqliteConfigSerde,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SqliteConfigSerde {
    pub busy_timeout_ms: u32,
    pub journal_mode: String,
    pub synchronous: String,
    pub cache_size: i32,
}

impl Default for DBSettings {
    fn default() -> Self {
        DBSettings {
            data_folder: String::from("./data"),
            read_max_connections: 4,
            read_min_connections: 1,
            write_max_connections: 2,
            write_min_connections: 1,
            idle_timeout_secs: 600,   // 10 minutes
            acquire_timeout_secs: 15, // 15 seconds
            sqlite_config: SqliteConfigSerde::default(),
        }
    }
}

impl Default for SqliteConfigSerde {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5000,
            journal_mode: "WAL".to_string(),
            synchronous: "NORMAL".to_string(),
            cache_size: 10000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct APISettings {
    pub domain: String,
    pub port: String,
    pub origins: Vec<String>,
}

impl Default for APISettings {
    fn default() -> Self {
        APISettings {
            domain: String::from("127.0.0.1"),
            port: String::from("9900"),
            origins: vec![String::from("http://localhost:9900")],
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExplorerSettings {
    /// Url of the btc-rpc-explorer instance providing address and xpub data
    pub base_url: String,
    /// Per request timeout in seconds
    pub timeout_secs: u64,
    /// Retries for transient failures (connection errors, 5xx, 429)
    pub max_retries: u32,
    /// Serve balances from an in-memory explorer instead (debug builds only)
    #[serde(default)]
    pub mock_enabled: bool,
}

impl Default for ExplorerSettings {
    fn default() -> Self {
        ExplorerSettings {
            base_url: String::from("https://bitcoinexplorer.org"),
            timeout_secs: 30,
            max_retries: 3,
            mock_enabled: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WatchSettings {
    /// Currency new snapshots are created with
    pub currency: Currency,
    /// Seconds to wait between polls of one identifier
    pub sleep_interval_secs: u64,
    /// Gap limit, scanning stops after twice this many unchanged addresses
    pub lookahead: u64,
    /// Number of derived addresses requested per page
    pub page_size: u64,
    /// Hard ceiling on pages scanned per extended key
    pub max_pages: u64,
    /// Also scan the related encodings (xpub/ypub/zpub) of an extended key
    #[serde(default)]
    pub check_all_pubkey_types: bool,
    /// `nickname:identifier` entries watched at startup
    #[serde(default)]
    pub seed_watches: Vec<String>,
}

impl WatchSettings {
    pub fn seeds(&self) -> Result<Vec<SeedWatch>, notifier_core::CoreError> {
        self.seed_watches
            .iter()
            .map(|entry| parse_seed_watch(entry))
            .collect()
    }
}

impl Default for WatchSettings {
    fn default() -> Self {
        WatchSettings {
            currency: Currency::Usd,
            sleep_interval_secs: 300,
            lookahead: 20,
            page_size: 100,
            max_pages: 50,
            check_all_pubkey_types: false,
            seed_watches: vec![],
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct NotificationSettings {
    pub discord_webhook: String,
}

pub fn get_settings() -> Result<Settings, anyhow::Error> {
    get_settings_with_cli(Cli::parse().into())
}

#[derive(Default)]
pub struct CliSettings {
    pub config: Option<String>,
    pub level: Option<String>,
    pub webhook: Option<String>,
    pub explorer_url: Option<String>,
}

impl From<Cli> for CliSettings {
    fn from(cli: Cli) -> Self {
        Self {
            config: cli.config,
            level: cli.level,
            webhook: cli.webhook,
            explorer_url: cli.explorer_url,
        }
    }
}

pub trait ConfigurableSettings: Serialize + for<'de> Deserialize<'de> + Default {
    /// Apply CLI settings after loading from file
    fn apply_cli_overrides(&mut self, cli_settings: &CliSettings);

    /// Get the default config file path
    fn default_config_path() -> PathBuf {
        PathBuf::from("./config/settings.toml")
    }

    /// Get the config directory path
    fn config_directory() -> PathBuf {
        PathBuf::from("./config")
    }
}

pub fn get_settings_with_cli<T: ConfigurableSettings>(
    cli_settings: CliSettings,
) -> Result<T, anyhow::Error> {
    let mut settings = if let Some(config_path) = cli_settings.config.clone() {
        let path = PathBuf::from(config_path);

        let absolute_path = if path.is_absolute() {
            path
        } else {
            env::current_dir()?.join(path)
        };

        read_settings_file(absolute_path)?
    } else {
        let default_path = T::default_config_path();
        if default_path.exists() {
            read_settings_file(default_path)?
        } else {
            write_default_settings::<T>(&default_path)?
        }
    };

    settings.apply_cli_overrides(&cli_settings);

    Ok(settings)
}

fn read_settings_file<T: ConfigurableSettings>(path: PathBuf) -> Result<T, anyhow::Error> {
    let mut file = File::open(&path)
        .map_err(|e| anyhow!("Failed to find file {}: {}", path.display(), e))?;
    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| anyhow!("Failed to read config: {}", e))?;
    toml::from_str(&content).map_err(|e| anyhow!("Failed to map config to settings: {}", e))
}

fn write_default_settings<T: ConfigurableSettings>(
    default_path: &PathBuf,
) -> Result<T, anyhow::Error> {
    let default_settings = T::default();

    fs::create_dir_all(T::config_directory())
        .map_err(|e| anyhow!("Failed to create config directory: {}", e))?;

    let toml_content = toml::to_string(&default_settings)
        .map_err(|e| anyhow!("Failed to serialize default settings: {}", e))?;

    let mut file = fs::File::create(default_path)
        .map_err(|e| anyhow!("Failed to create config file: {}", e))?;
    file.write_all(toml_content.as_bytes())
        .map_err(|e| anyhow!("Failed to write default config: {}", e))?;

    Ok(default_settings)
}

pub fn setup_logger(
    level: Option<String>,
    filter_targets: Vec<String>,
) -> Result<(), fern::InitError> {
    let rust_log = get_log_level(level);
    let colors = ColoredLevelConfig::new()
        .trace(Color::White)
        .debug(Color::Cyan)
        .info(Color::Blue)
        .warn(Color::Yellow)
        .error(Color::Magenta);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            let timestamp = OffsetDateTime::now_utc()
                .format(&Iso8601::DEFAULT)
                .unwrap_or_default();
            out.finish(format_args!(
                "[{} {}] {}: {}",
                timestamp,
                colors.color(record.level()),
                record.target(),
                message
            ));
        })
        .level(rust_log)
        .filter(move |metadata| {
            !filter_targets
                .iter()
                .any(|filter| metadata.target().starts_with(filter))
        })
        .chain(std::io::stdout())
        .apply()?;
    Ok(())
}

pub fn get_log_level(level: Option<String>) -> LevelFilter {
    let level = level
        .or_else(|| env::var("RUST_LOG").ok())
        .unwrap_or_default();
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_settings() -> Settings {
        let mut settings = Settings::default();
        settings.notification_settings.discord_webhook =
            String::from("https://discord.com/api/webhooks/1/abc");
        settings
    }

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.explorer_settings.base_url, "https://bitcoinexplorer.org");
        assert_eq!(settings.watch_settings.currency, Currency::Usd);
        assert_eq!(settings.watch_settings.sleep_interval_secs, 300);
        assert_eq!(settings.watch_settings.lookahead, 20);
        assert_eq!(settings.watch_settings.page_size, 100);
        assert!(!settings.watch_settings.check_all_pubkey_types);
    }

    #[test]
    fn missing_webhook_is_fatal() {
        let settings = Settings::default();
        assert!(settings.validate().is_err());
        assert!(valid_settings().validate().is_ok());
    }

    #[test]
    fn zero_lookahead_and_page_size_are_rejected() {
        let mut settings = valid_settings();
        settings.watch_settings.lookahead = 0;
        assert!(settings.validate().is_err());

        let mut settings = valid_settings();
        settings.watch_settings.page_size = 0;
        assert!(settings.validate().is_err());

        let mut settings = valid_settings();
        settings.watch_settings.sleep_interval_secs = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn malformed_seed_watch_is_rejected() {
        let mut settings = valid_settings();
        settings.watch_settings.seed_watches = vec![String::from("missing-separator")];
        assert!(settings.validate().is_err());

        settings.watch_settings.seed_watches = vec![String::from("cold:xpub6CUGRUo")];
        assert!(settings.validate().is_ok());
        assert_eq!(settings.watch_settings.seeds().unwrap().len(), 1);
    }

    #[test]
    fn cli_overrides_file_values() {
        let mut settings = valid_settings();
        settings.apply_cli_overrides(&CliSettings {
            level: Some(String::from("debug")),
            webhook: Some(String::from("https://example.com/hook")),
            explorer_url: Some(String::from("http://localhost:3002")),
            ..Default::default()
        });
        assert_eq!(settings.level.as_deref(), Some("debug"));
        assert_eq!(
            settings.notification_settings.discord_webhook,
            "https://example.com/hook"
        );
        assert_eq!(settings.explorer_settings.base_url, "http://localhost:3002");
    }

    #[test]
    fn settings_parse_from_toml() {
        let settings: Settings = toml::from_str(
            r#"
            [db_settings]
            data_folder = "./data"
            read_max_connections = 4
            read_min_connections = 1
            write_max_connections = 2
            write_min_connections = 1
            idle_timeout_secs = 600
            acquire_timeout_secs = 15

            [db_settings.sqlite_config]
            busy_timeout_ms = 5000
            journal_mode = "WAL"
            synchronous = "NORMAL"
            cache_size = 10000

            [api_settings]
            domain = "0.0.0.0"
            port = "9900"
            origins = []

            [explorer_settings]
            base_url = "http://explorer.local"
            timeout_secs = 10
            max_retries = 1

            [watch_settings]
            currency = "eur"
            sleep_interval_secs = 60
            lookahead = 5
            page_size = 20
            max_pages = 10
            check_all_pubkey_types = true
            seed_watches = ["savings:bc1qsavings"]

            [notification_settings]
            discord_webhook = "https://discord.com/api/webhooks/1/abc"
            "#,
        )
        .unwrap();

        assert_eq!(settings.watch_settings.currency, Currency::Eur);
        assert!(settings.watch_settings.check_all_pubkey_types);
        assert!(!settings.explorer_settings.mock_enabled);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn unknown_log_level_falls_back_to_info() {
        assert_eq!(get_log_level(Some(String::from("verbose"))), LevelFilter::Info);
        assert_eq!(get_log_level(Some(String::from("WARN"))), LevelFilter::Warn);
    }
}
