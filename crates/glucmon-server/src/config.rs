use anyhow::{bail, Context};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Process configuration, read once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Fixed UTC offset used for every user-facing time, e.g. `+08:00`.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Upper bound for each step of a driver tick.
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,
    /// Connect/acquire timeout of the database pool.
    #[serde(default = "default_store_timeout_secs")]
    pub store_timeout_secs: u64,

    #[serde(default)]
    pub glucose: GlucoseConfig,
    #[serde(default)]
    pub alarm: AlarmConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    pub dexcom: DexcomConfig,
    /// 未配置时使用内存消息面（仅记录日志）
    #[serde(default)]
    pub discord: Option<DiscordConfig>,
    #[serde(default)]
    pub chart: Option<ChartConfig>,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Glucose thresholds in mmol/L.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlucoseConfig {
    #[serde(default = "default_low")]
    pub low: f64,
    #[serde(default = "default_target")]
    pub target: f64,
    #[serde(default = "default_high")]
    pub high: f64,
}

impl Default for GlucoseConfig {
    fn default() -> Self {
        Self {
            low: default_low(),
            target: default_target(),
            high: default_high(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmConfig {
    /// Suppression window for high and low glucose alerts.
    #[serde(default = "default_glucose_timeout_mins")]
    pub glucose_timeout_mins: u64,
    #[serde(default = "default_no_insulin_timeout_mins")]
    pub no_insulin_timeout_mins: u64,
    /// How far back a slow-acting dose counts as recent.
    #[serde(default = "default_slow_insulin_window_hours")]
    pub slow_insulin_window_hours: u64,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            glucose_timeout_mins: default_glucose_timeout_mins(),
            no_insulin_timeout_mins: default_no_insulin_timeout_mins(),
            slow_insulin_window_hours: default_slow_insulin_window_hours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: u64,
    /// Maximum activity lines in the live message.
    #[serde(default = "default_log_limit")]
    pub log_limit: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            lookback_hours: default_lookback_hours(),
            log_limit: default_log_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default = "default_display_channel")]
    pub display: String,
    #[serde(default = "default_alerts_channel")]
    pub alerts: String,
    #[serde(default = "default_reports_channel")]
    pub reports: String,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            display: default_display_channel(),
            alerts: default_alerts_channel(),
            reports: default_reports_channel(),
        }
    }
}

impl ChannelsConfig {
    pub fn names(&self) -> [&str; 3] {
        [&self.display, &self.alerts, &self.reports]
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct DexcomConfig {
    pub account: String,
    pub password: String,
    #[serde(default = "default_share_url")]
    pub share_url: String,
    #[serde(default = "default_remote_timeout_secs")]
    pub timeout_secs: u64,
}

impl std::fmt::Debug for DexcomConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DexcomConfig")
            .field("account", &self.account)
            .field("password", &"***")
            .field("share_url", &self.share_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub token: String,
    pub application_id: String,
    /// Hex-encoded Ed25519 key used to verify interaction requests.
    pub public_key: String,
    pub guild_id: String,
    #[serde(default = "default_remote_timeout_secs")]
    pub timeout_secs: u64,
}

impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("token", &"***")
            .field("application_id", &self.application_id)
            .field("public_key", &self.public_key)
            .field("guild_id", &self.guild_id)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartConfig {
    /// gRPC endpoint of the plotting service, e.g. `http://127.0.0.1:50051`.
    pub endpoint: String,
    #[serde(default = "default_remote_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: default_http_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_database_url() -> String {
    "sqlite://data/glucmon.db?mode=rwc".to_string()
}

fn default_timezone() -> String {
    "+00:00".to_string()
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_step_timeout_secs() -> u64 {
    30
}

fn default_store_timeout_secs() -> u64 {
    5
}

fn default_low() -> f64 {
    4.0
}

fn default_target() -> f64 {
    6.0
}

fn default_high() -> f64 {
    10.0
}

fn default_glucose_timeout_mins() -> u64 {
    60
}

fn default_no_insulin_timeout_mins() -> u64 {
    240
}

fn default_slow_insulin_window_hours() -> u64 {
    24
}

fn default_lookback_hours() -> u64 {
    12
}

fn default_log_limit() -> usize {
    7
}

fn default_display_channel() -> String {
    "glucose".to_string()
}

fn default_alerts_channel() -> String {
    "alerts".to_string()
}

fn default_reports_channel() -> String {
    "reports".to_string()
}

fn default_share_url() -> String {
    glucmon_source::dexcom::DEFAULT_SHARE_URL.to_string()
}

fn default_remote_timeout_secs() -> u64 {
    5
}

fn default_http_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{path}'"))?;
        Self::parse(&content).with_context(|| format!("Invalid config file '{path}'"))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let g = &self.glucose;
        if !(g.low < g.target && g.target < g.high) {
            bail!(
                "glucose thresholds must satisfy low < target < high (got {} / {} / {})",
                g.low,
                g.target,
                g.high
            );
        }
        if self.poll_interval_secs == 0 || self.step_timeout_secs == 0 {
            bail!("poll_interval_secs and step_timeout_secs must be positive");
        }
        if self.display.lookback_hours == 0 || self.alarm.slow_insulin_window_hours == 0 {
            bail!("lookback_hours and slow_insulin_window_hours must be positive");
        }
        self.offset()?;
        Ok(())
    }

    pub fn offset(&self) -> anyhow::Result<FixedOffset> {
        parse_offset(&self.timezone)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::hours(self.display.lookback_hours as i64)
    }
}

/// Parses `Z`, `UTC`, `+08:00`, `-0530` or `+8` into a fixed offset.
pub fn parse_offset(s: &str) -> anyhow::Result<FixedOffset> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("utc") || s == "Z" {
        return Ok(FixedOffset::east_opt(0).context("zero offset")?);
    }

    let (sign, rest) = match s.as_bytes().first() {
        Some(b'+') => (1, &s[1..]),
        Some(b'-') => (-1, &s[1..]),
        _ => bail!("timezone '{s}' must start with '+' or '-'"),
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None if rest.len() == 4 && rest.is_ascii() => rest.split_at(2),
        None => (rest, "0"),
    };
    let hours: i32 = hours
        .parse()
        .with_context(|| format!("invalid hours in timezone '{s}'"))?;
    let minutes: i32 = minutes
        .parse()
        .with_context(|| format!("invalid minutes in timezone '{s}'"))?;
    if hours > 14 || minutes > 59 {
        bail!("timezone '{s}' is out of range");
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .with_context(|| format!("timezone '{s}' is out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [dexcom]
        account = "a"
        password = "p"
    "#;

    #[test]
    fn defaults_fill_missing_sections() {
        let config = Config::parse(MINIMAL).unwrap();
        assert_eq!(config.poll_interval_secs, 60);
        assert_eq!(config.alarm.glucose_timeout_mins, 60);
        assert_eq!(config.alarm.no_insulin_timeout_mins, 240);
        assert_eq!(config.alarm.slow_insulin_window_hours, 24);
        assert_eq!(config.display.log_limit, 7);
        assert_eq!(config.channels.display, "glucose");
        assert!(config.discord.is_none());
        assert!(config.chart.is_none());
        assert_eq!(config.dexcom.share_url, glucmon_source::dexcom::DEFAULT_SHARE_URL);
    }

    #[test]
    fn thresholds_must_be_ordered() {
        let bad = format!("{MINIMAL}\n[glucose]\nlow = 8.0\ntarget = 6.0\nhigh = 10.0\n");
        let err = Config::parse(&bad).unwrap_err();
        assert!(format!("{err:#}").contains("low < target < high"));
    }

    #[test]
    fn offsets_parse_in_common_forms() {
        assert_eq!(parse_offset("+08:00").unwrap().local_minus_utc(), 8 * 3600);
        assert_eq!(parse_offset("-0530").unwrap().local_minus_utc(), -(5 * 3600 + 30 * 60));
        assert_eq!(parse_offset("+8").unwrap().local_minus_utc(), 8 * 3600);
        assert_eq!(parse_offset("UTC").unwrap().local_minus_utc(), 0);
        assert!(parse_offset("Asia/Singapore").is_err());
        assert!(parse_offset("+25:00").is_err());
    }

    #[test]
    fn secrets_are_redacted_in_debug_output() {
        let config = Config::parse(MINIMAL).unwrap();
        let rendered = format!("{:?}", config.dexcom);
        assert!(!rendered.contains("\"p\""));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn load_names_the_file_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("glucmon.toml");
        std::fs::write(&path, MINIMAL).unwrap();
        assert!(Config::load(path.to_str().unwrap()).is_ok());

        let missing = dir.path().join("missing.toml");
        let err = Config::load(missing.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("missing.toml"));
    }
}
