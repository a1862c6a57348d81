//! Journal configuration, loaded from TOML.
//!
//! Every key is optional. The file selects the ledger path and persistence
//! strategy, tunes the HTTP transport, toggles providers and names the
//! environment variables holding their credentials, declares rescale rules,
//! and overrides field precision or chains.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::data::{
    eodhd, fred, yahoo, DisabledSource, EodhdSource, FredSource, HttpSettings, SourceError,
    SourceRegistry, YahooSource,
};
use crate::repair::RescaleRule;
use crate::schema::{ObservationSchema, SourceSpec};
use crate::store::PersistMode;

/// Looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "journal.toml";

pub const MAX_PRECISION: u32 = 8;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("field '{field}': precision {precision} outside 0..=8")]
    Precision { field: String, precision: u32 },

    #[error("field '{field}': chain step divisor must be finite and non-zero")]
    BadDivisor { field: String },

    #[error("rescale rule for '{field}': {reason}")]
    BadRescale { field: String, reason: String },

    #[error("field '{field}': chain step references unregistered {kind} source '{provider}'")]
    UnknownSource {
        field: String,
        kind: &'static str,
        provider: String,
    },

    #[error(transparent)]
    Source(#[from] SourceError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_ms: u64,
    pub breaker_cooldown_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        let s = HttpSettings::default();
        Self {
            timeout_secs: s.timeout.as_secs(),
            max_retries: s.max_retries,
            retry_base_ms: s.retry_base_delay.as_millis() as u64,
            breaker_cooldown_secs: s.breaker_cooldown.as_secs(),
        }
    }
}

impl HttpConfig {
    pub fn settings(&self) -> HttpSettings {
        HttpSettings {
            timeout: Duration::from_secs(self.timeout_secs),
            max_retries: self.max_retries,
            retry_base_delay: Duration::from_millis(self.retry_base_ms),
            breaker_cooldown: Duration::from_secs(self.breaker_cooldown_secs),
            ..HttpSettings::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    pub enabled: bool,
    /// Environment variable holding the credential. Provider default if unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key_env: None,
        }
    }
}

impl ProviderConfig {
    fn key_env<'a>(&'a self, default: &'a str) -> &'a str {
        self.api_key_env.as_deref().unwrap_or(default)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourcesConfig {
    pub yahoo: ProviderConfig,
    pub fred: ProviderConfig,
    pub eodhd: ProviderConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RescaleConfig {
    pub field: String,
    pub above: f64,
    pub below: f64,
    pub factor: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FieldOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain: Option<Vec<SourceSpec>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JournalConfig {
    pub ledger: PathBuf,
    pub persist: PersistMode,
    pub backup: bool,
    pub http: HttpConfig,
    pub sources: SourcesConfig,
    pub rescale: Vec<RescaleConfig>,
    pub fields: BTreeMap<String, FieldOverride>,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            ledger: PathBuf::from("data/etf_prices_log.csv"),
            persist: PersistMode::Rewrite,
            backup: true,
            http: HttpConfig::default(),
            sources: SourcesConfig::default(),
            rescale: vec![RescaleConfig {
                field: "US 10 YR (%)".into(),
                above: 0.0,
                below: 2.0,
                factor: 10.0,
            }],
            fields: BTreeMap::new(),
        }
    }
}

impl JournalConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// An explicit path must exist. Without one, `journal.toml` in the working
    /// directory is used if present, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// The market journal schema with configured overrides applied.
    pub fn schema(&self) -> Result<ObservationSchema, ConfigError> {
        let mut schema = ObservationSchema::market_journal();

        for (name, ov) in &self.fields {
            let id = schema
                .find(name)
                .ok_or_else(|| ConfigError::UnknownField(name.clone()))?;
            let field = schema.field_mut(id);
            if let Some(p) = ov.precision {
                if p > MAX_PRECISION {
                    return Err(ConfigError::Precision {
                        field: name.clone(),
                        precision: p,
                    });
                }
                field.precision = p;
            }
            if let Some(chain) = &ov.chain {
                field.chain = chain.clone();
            }
        }

        for f in schema.fields() {
            for step in &f.chain {
                if let Some(d) = step.divisor() {
                    if !d.is_finite() || d == 0.0 {
                        return Err(ConfigError::BadDivisor {
                            field: f.name.clone(),
                        });
                    }
                }
            }
        }

        Ok(schema)
    }

    pub fn rescale_rules(&self, schema: &ObservationSchema) -> Result<Vec<RescaleRule>, ConfigError> {
        self.rescale
            .iter()
            .map(|r| {
                let field = schema
                    .find(&r.field)
                    .ok_or_else(|| ConfigError::UnknownField(r.field.clone()))?;
                let bad = |reason: &str| ConfigError::BadRescale {
                    field: r.field.clone(),
                    reason: reason.to_string(),
                };
                if r.factor == 0.0 {
                    return Err(bad("factor must be non-zero"));
                }
                if r.above >= r.below {
                    return Err(bad("'above' must be less than 'below'"));
                }
                let dec = |v: f64| Decimal::from_f64(v).ok_or_else(|| bad("bound is not finite"));
                Ok(RescaleRule {
                    field,
                    above: dec(r.above)?,
                    below: dec(r.below)?,
                    factor: dec(r.factor)?,
                })
            })
            .collect()
    }

    /// Build every provider adapter. Disabled providers and `offline` runs
    /// register a [`DisabledSource`] under the same name, so chains still
    /// validate and simply yield nothing.
    pub fn build_registry(&self, offline: bool) -> Result<SourceRegistry, ConfigError> {
        let mut reg = SourceRegistry::new();
        let http = self.http.settings();
        let s = &self.sources;

        if offline || !s.yahoo.enabled {
            reg.register(Arc::new(DisabledSource::new(yahoo::SOURCE_NAME)));
        } else {
            reg.register_point(Arc::new(YahooSource::new(&http)?));
        }

        if offline || !s.fred.enabled {
            reg.register(Arc::new(DisabledSource::new(fred::SOURCE_NAME)));
        } else {
            let env = s.fred.key_env(fred::DEFAULT_KEY_ENV);
            let key = std::env::var(env).ok();
            reg.register_series(Arc::new(FredSource::new(&http, key, env)?));
        }

        if offline || !s.eodhd.enabled {
            reg.register(Arc::new(DisabledSource::new(eodhd::SOURCE_NAME)));
        } else {
            let env = s.eodhd.key_env(eodhd::DEFAULT_KEY_ENV);
            let key = std::env::var(env).ok();
            reg.register_point(Arc::new(EodhdSource::new(&http, key, env)?));
        }

        Ok(reg)
    }
}

/// Every chain step must name an adapter of the right kind.
pub fn validate_chains(
    schema: &ObservationSchema,
    registry: &SourceRegistry,
) -> Result<(), ConfigError> {
    for f in schema.fields() {
        for step in &f.chain {
            let (kind, ok) = match step {
                SourceSpec::Point { source, .. } => ("point", registry.point(source).is_some()),
                SourceSpec::Series { source, .. } => ("series", registry.series(source).is_some()),
            };
            if !ok {
                return Err(ConfigError::UnknownSource {
                    field: f.name.clone(),
                    kind,
                    provider: step.source().to_string(),
                });
            }
        }
    }
    Ok(())
}
