//! Configuration management for the controller.

use std::env;
use std::fmt;
use std::str::FromStr;

use tandem_engine::SortOrder;

/// Characters the remote store forbids in a path segment.
const FORBIDDEN: &[char] = &['.', '#', '$', '[', ']'];

/// A remote location: `scheme://host/path/segments`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    scheme: String,
    host: String,
    segments: Vec<String>,
}

impl Location {
    /// Parse and validate a location URL.
    pub fn parse(url: &str) -> Result<Self, ConfigError> {
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| ConfigError::InvalidUrl(url.to_string()))?;
        if scheme.is_empty() {
            return Err(ConfigError::InvalidUrl(url.to_string()));
        }

        let (host, path) = rest.split_once('/').unwrap_or((rest, ""));
        if host.is_empty() {
            return Err(ConfigError::InvalidUrl(url.to_string()));
        }

        let path = path.trim_end_matches('/');
        if path.is_empty() {
            return Err(ConfigError::InvalidPath(format!(
                "{}: location must name a path below the root",
                url
            )));
        }

        let segments = path
            .split('/')
            .map(|segment| validate_key(segment).map(str::to_string))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            scheme: scheme.to_string(),
            host: host.to_string(),
            segments,
        })
    }

    /// The path below the host, with a leading `/`.
    pub fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }

    /// Path of a child of this location.
    pub fn child(&self, key: &str) -> String {
        format!("{}/{}", self.path(), key)
    }

    /// The host part.
    pub fn host(&self) -> &str {
        &self.host
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.host, self.path())
    }
}

impl FromStr for Location {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Check that a string is usable as a single path segment.
pub fn validate_key(key: &str) -> Result<&str, ConfigError> {
    if key.is_empty() {
        return Err(ConfigError::InvalidPath("empty path segment".to_string()));
    }
    if key.contains(FORBIDDEN) || key.contains('/') {
        return Err(ConfigError::InvalidPath(format!(
            "segment {:?} contains a forbidden character",
            key
        )));
    }
    Ok(key)
}

/// How the controller keeps up with the remote location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Subscribe and apply every remote change as it arrives
    #[default]
    Continuous,
    /// Read once at construction (and on `fetch`), never subscribe
    OneShot,
}

/// Controller configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Remote location mirrored by the controller
    pub location: Location,
    /// Operating mode
    pub mode: Mode,
    /// Local ordering of records
    pub order: SortOrder,
}

impl SyncConfig {
    /// Configuration for a location with default mode and ordering.
    pub fn new(url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            location: Location::parse(url)?,
            mode: Mode::default(),
            order: SortOrder::default(),
        })
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("TANDEM_URL").ok_or(ConfigError::MissingUrl)?;

        let mode = match lookup("TANDEM_AUTO_SYNC").as_deref() {
            None | Some("true") | Some("1") => Mode::Continuous,
            Some("false") | Some("0") => Mode::OneShot,
            Some(other) => return Err(ConfigError::InvalidAutoSync(other.to_string())),
        };

        let order = match lookup("TANDEM_ORDER").as_deref() {
            None | Some("id") => SortOrder::Id,
            Some("priority") => SortOrder::Priority,
            Some(other) => return Err(ConfigError::InvalidOrder(other.to_string())),
        };

        Ok(Self::new(&url)?.with_mode(mode).with_order(order))
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("TANDEM_URL environment variable is required")]
    MissingUrl,

    #[error("Invalid location URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid location path: {0}")]
    InvalidPath(String),

    #[error("Invalid TANDEM_AUTO_SYNC value: {0}")]
    InvalidAutoSync(String),

    #[error("Invalid TANDEM_ORDER value: {0}")]
    InvalidOrder(String),
}
