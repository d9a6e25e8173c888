use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::mirrors::MirrorEntry;
use crate::ConfigError;

/// Main configuration structure for the harvester
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub site: SiteConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub downloader: DownloaderConfig,
    #[serde(default)]
    pub rotation: RotationConfig,
    /// Mirror identifier table; the built-in table is used when empty
    #[serde(rename = "mirror", default)]
    pub mirrors: Vec<MirrorEntry>,
}

/// Location and shape of the content library
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Absolute site root, e.g. `https://winworldpc.com`
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Path of the index page listing every product
    #[serde(rename = "library-path", default = "default_library_path")]
    pub library_path: String,

    /// Path prefix that identifies product links on the index page
    #[serde(rename = "product-prefix", default = "default_product_prefix")]
    pub product_prefix: String,
}

impl SiteConfig {
    /// Returns the absolute URL of the library index page
    pub fn library_url(&self) -> Result<url::Url, url::ParseError> {
        url::Url::parse(&self.base_url)?.join(&self.library_path)
    }
}

/// Crawler pacing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Minimum pause between the end of one request and the start of the next
    #[serde(rename = "request-delay", default)]
    pub request_delay: RequestDelay,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            request_delay: RequestDelay::default(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// A pacing delay expressed as a rational number of seconds (`"5/9"`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct RequestDelay {
    pub numerator: u64,
    pub denominator: u64,
}

impl RequestDelay {
    pub fn new(numerator: u64, denominator: u64) -> Result<Self, ConfigError> {
        if denominator == 0 {
            return Err(ConfigError::InvalidDelay(format!(
                "{}/{} has a zero denominator",
                numerator, denominator
            )));
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    /// Converts the rational delay to a duration, rounded down to the nanosecond
    pub fn to_duration(&self) -> Duration {
        let nanos = (self.numerator as u128 * 1_000_000_000) / self.denominator as u128;
        Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
    }

    pub fn is_zero(&self) -> bool {
        self.numerator == 0
    }
}

impl Default for RequestDelay {
    fn default() -> Self {
        Self {
            numerator: 5,
            denominator: 9,
        }
    }
}

impl TryFrom<String> for RequestDelay {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let value = value.trim();
        let parse = |s: &str| {
            s.trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidDelay(format!("'{}' is not a fraction", value)))
        };

        match value.split_once('/') {
            Some((num, den)) => RequestDelay::new(parse(num)?, parse(den)?),
            None => RequestDelay::new(parse(value)?, 1),
        }
    }
}

impl fmt::Display for RequestDelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}s", self.numerator, self.denominator)
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,
}

impl UserAgentConfig {
    /// Renders the header value: `Name/Version (+ContactURL)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{})",
            self.crawler_name, self.crawler_version, self.contact_url
        )
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "winworld-harvester".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com".to_string(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path of the persisted metadata JSON
    #[serde(rename = "metadata-path", default = "default_metadata_path")]
    pub metadata_path: PathBuf,

    /// Persist the tree of a cancelled crawl as well
    #[serde(rename = "save-partial", default)]
    pub save_partial: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            metadata_path: default_metadata_path(),
            save_partial: false,
        }
    }
}

/// Download stage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DownloaderConfig {
    /// Root under which version directories are created
    #[serde(rename = "base-dir", default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Admission ceiling per mirror name
    #[serde(rename = "max-per-mirror", default = "default_max_per_mirror")]
    pub max_per_mirror: usize,

    /// Upper bound on launched transfers across all mirrors
    #[serde(
        rename = "max-concurrent-transfers",
        default = "default_max_concurrent_transfers"
    )]
    pub max_concurrent_transfers: usize,

    /// Number of completed transfers between identity rotations
    #[serde(rename = "rotation-interval", default = "default_rotation_interval")]
    pub rotation_interval: u64,

    /// Pause after a rotation before transfers resume (seconds)
    #[serde(
        rename = "stabilization-delay-secs",
        default = "default_stabilization_delay"
    )]
    pub stabilization_delay_secs: u64,

    /// Idle timeout while waiting for headers or the next body chunk (seconds)
    #[serde(rename = "transfer-timeout-secs", default = "default_transfer_timeout")]
    pub transfer_timeout_secs: u64,

    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl DownloaderConfig {
    pub fn stabilization_delay(&self) -> Duration {
        Duration::from_secs(self.stabilization_delay_secs)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            max_per_mirror: default_max_per_mirror(),
            max_concurrent_transfers: default_max_concurrent_transfers(),
            rotation_interval: default_rotation_interval(),
            stabilization_delay_secs: default_stabilization_delay(),
            transfer_timeout_secs: default_transfer_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// External network-identity rotation command
#[derive(Debug, Clone, Deserialize)]
pub struct RotationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_rotation_command")]
    pub command: String,

    /// Arguments placed before the generated identifier
    #[serde(default = "default_rotation_args")]
    pub args: Vec<String>,

    #[serde(rename = "min-id", default = "default_min_id")]
    pub min_id: u32,

    #[serde(rename = "max-id", default = "default_max_id")]
    pub max_id: u32,

    /// Longest a single rotation command may run (seconds)
    #[serde(rename = "timeout-secs", default = "default_rotation_timeout")]
    pub timeout_secs: u64,
}

impl RotationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: default_rotation_command(),
            args: default_rotation_args(),
            min_id: default_min_id(),
            max_id: default_max_id(),
            timeout_secs: default_rotation_timeout(),
        }
    }
}

fn default_library_path() -> String {
    "/library/operating-systems".to_string()
}

fn default_product_prefix() -> String {
    "/product/".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_metadata_path() -> PathBuf {
    PathBuf::from("winworld_os_metadata.json")
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_max_per_mirror() -> usize {
    3
}

fn default_max_concurrent_transfers() -> usize {
    6
}

fn default_rotation_interval() -> u64 {
    50
}

fn default_stabilization_delay() -> u64 {
    10
}

fn default_transfer_timeout() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_rotation_command() -> String {
    "nordvpn".to_string()
}

fn default_rotation_args() -> Vec<String> {
    vec!["-c".to_string()]
}

fn default_min_id() -> u32 {
    1
}

fn default_max_id() -> u32 {
    100
}

fn default_rotation_timeout() -> u64 {
    120
}
