use serde::Deserialize;
use std::{path::Path, time::Duration};
use thiserror::Error;
use tokio::fs;

use super::{options::GatewayOptions, types::HandlerFaultPolicy};

// -----------------------------------------------------------------------------
// ----- GatewayFileConfig -----------------------------------------------------

/// The `[gateway]` table of the optional TOML file. Unset keys keep whatever
/// the options already hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayFileConfig {
    pub max_payload_length: Option<usize>,
    pub idle_timeout: Option<Duration>,
    pub drain_threshold: Option<usize>,
    pub handler_fault_policy: Option<HandlerFaultPolicy>,
}

// -----------------------------------------------------------------------------
// ----- GatewayFileConfig: Static ---------------------------------------------

impl GatewayFileConfig {
    pub async fn from_file_async(path: &Path) -> Result<GatewayFileConfig, ConfigError> {
        let raw = fs::read_to_string(path).await.map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<GatewayFileConfig, ConfigError> {
        let doc: GatewayFile = toml::from_str(raw).map_err(|e| ConfigError::Toml { source: e })?;
        let section = doc.gateway;

        validate(&section)?;

        Ok(GatewayFileConfig {
            max_payload_length: section.max_payload_length,
            idle_timeout: section.idle_timeout,
            drain_threshold: section.drain_threshold,
            handler_fault_policy: section.handler_fault_policy,
        })
    }
}

// -----------------------------------------------------------------------------
// ----- GatewayFileConfig: Public ---------------------------------------------

impl GatewayFileConfig {
    pub fn apply(&self, mut options: GatewayOptions) -> GatewayOptions {
        if let Some(v) = self.max_payload_length {
            options.max_payload_length = v;
        }

        if let Some(v) = self.idle_timeout {
            // 0s turns the idle check off
            options.idle_timeout = (!v.is_zero()).then_some(v);
        }

        if let Some(v) = self.drain_threshold {
            options.drain_threshold = v;
        }

        if let Some(v) = self.handler_fault_policy {
            options.handler_fault_policy = v;
        }

        options
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: On-disk format ----------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct GatewayFile {
    #[serde(default)]
    gateway: GatewaySection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct GatewaySection {
    #[serde(default)]
    max_payload_length: Option<usize>,

    #[serde(default, deserialize_with = "de_duration")]
    idle_timeout: Option<Duration>,

    #[serde(default)]
    drain_threshold: Option<usize>,

    #[serde(default)]
    handler_fault_policy: Option<HandlerFaultPolicy>,
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

fn validate(section: &GatewaySection) -> Result<(), ConfigError> {
    if section.max_payload_length == Some(0) {
        return Err(ConfigError::InvalidField("max_payload_length".into()));
    }
    Ok(())
}

fn de_duration<'de, D>(d: D) -> Result<Option<Duration>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{Error, Unexpected, Visitor};
    use std::fmt;

    struct DurationVisitor;

    impl<'de> Visitor<'de> for DurationVisitor {
        type Value = Option<Duration>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a duration like \"120s\" or integer seconds")
        }

        fn visit_u64<E: Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(Duration::from_secs(v)))
        }

        fn visit_i64<E: Error>(self, v: i64) -> Result<Self::Value, E> {
            if v < 0 {
                return Err(E::invalid_value(Unexpected::Signed(v), &self));
            }
            Ok(Some(Duration::from_secs(v as u64)))
        }

        fn visit_str<E: Error>(self, v: &str) -> Result<Self::Value, E> {
            humantime::parse_duration(v)
                .map(Some)
                .map_err(|_| E::invalid_value(Unexpected::Str(v), &self))
        }
    }

    d.deserialize_any(DurationVisitor)
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid or missing field '{0}'")]
    InvalidField(String),

    #[error("read error for {path:?}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("toml parse error: {source}")]
    Toml { source: toml::de::Error },
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
