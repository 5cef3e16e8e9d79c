//! Process configuration, read once from environment variables by the binary and passed down
//! explicitly to every component.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use catalogflow_nats::{NatsAuth, NatsConfig};
use catalogflow_search::{BasicAuth, SearchClientConfig};

use crate::error::{Error, Result};

const ENV_QUEUE_SIZE: &str = "PARSER_QUEUE_SIZE";
const ENV_BATCH_SIZE: &str = "PARSER_BATCH_SIZE";
const ENV_ABORT_ON_ERROR: &str = "PARSER_ABORT_ON_ERROR";
const ENV_SEARCH_URL: &str = "SEARCH_URL";
const ENV_SEARCH_USERNAME: &str = "SEARCH_USERNAME";
const ENV_SEARCH_PASSWORD: &str = "SEARCH_PASSWORD";
const ENV_INDEX_EN: &str = "INDEX_EN";
const ENV_INDEX_JA: &str = "INDEX_JA";
const ENV_EXTRA_INDEX_PREFIX: &str = "CATALOG_INDEX_";
const ENV_NATS_URL: &str = "NATS_URL";
const ENV_NATS_STREAM: &str = "NATS_STREAM";
const ENV_NATS_ITEMS_SUBJECT: &str = "NATS_ITEMS_SUBJECT";
const ENV_NATS_FEED_SUBJECT: &str = "NATS_FEED_SUBJECT";
const ENV_NATS_CONSUMER: &str = "NATS_CONSUMER";
const ENV_NATS_USERNAME: &str = "NATS_USERNAME";
const ENV_NATS_PASSWORD: &str = "NATS_PASSWORD";
const ENV_SINK_MAX_RETRY_ATTEMPTS: &str = "SINK_MAX_RETRY_ATTEMPTS";
const ENV_SINK_INITIAL_RETRY_INTERVAL_MS: &str = "SINK_INITIAL_RETRY_INTERVAL_MS";
const ENV_FEED_DIR: &str = "FEED_DIR";

const DEFAULT_QUEUE_SIZE: usize = 1000;
const DEFAULT_BATCH_SIZE: usize = 100;
const DEFAULT_SEARCH_URL: &str = "http://localhost:9200";
const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_NATS_URL: &str = "localhost:4222";
const DEFAULT_NATS_STREAM: &str = "catalog";
const DEFAULT_ITEMS_SUBJECT: &str = "catalog.items";
const DEFAULT_FEED_SUBJECT: &str = "catalog.feeds";
const DEFAULT_CONSUMER: &str = "catalog-upsert";
const DEFAULT_MAX_RETRY_ATTEMPTS: u16 = 3;
const DEFAULT_INITIAL_RETRY_INTERVAL_MS: u32 = 100;
const DEFAULT_MAX_RETRY_INTERVAL_MS: u32 = 5000;
const DEFAULT_RETRY_FACTOR: f64 = 2.0;
const DEFAULT_RETRY_JITTER: f64 = 0.2;

/// What the producer does with a row that fails to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeErrorPolicy {
    /// Log, count and move on to the next row.
    #[default]
    Skip,
    /// Stop decoding and surface the error.
    Abort,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub queue_capacity: usize,
    pub batch_size: usize,
    pub decode_error_policy: DecodeErrorPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            decode_error_policy: DecodeErrorPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(Error::Config("queue capacity must be greater than 0".to_string()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch size must be greater than 0".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub max_retry_attempts: u16,
    pub initial_retry_interval_in_ms: u32,
    pub max_retry_interval_in_ms: u32,
    pub retry_factor: f64,
    pub retry_jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            initial_retry_interval_in_ms: DEFAULT_INITIAL_RETRY_INTERVAL_MS,
            max_retry_interval_in_ms: DEFAULT_MAX_RETRY_INTERVAL_MS,
            retry_factor: DEFAULT_RETRY_FACTOR,
            retry_jitter: DEFAULT_RETRY_JITTER,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchSettings {
    pub url: String,
    pub auth: Option<Credentials>,
    pub timeout: Duration,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_SEARCH_URL.to_string(),
            auth: None,
            timeout: DEFAULT_SEARCH_TIMEOUT,
        }
    }
}

impl From<&SearchSettings> for SearchClientConfig {
    fn from(settings: &SearchSettings) -> Self {
        SearchClientConfig {
            url: settings.url.clone(),
            auth: settings.auth.as_ref().map(|c| BasicAuth {
                username: c.username.clone(),
                password: c.password.clone(),
            }),
            timeout: settings.timeout,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NatsSettings {
    pub url: String,
    pub auth: Option<Credentials>,
    pub stream: String,
    pub items_subject: String,
    pub feed_subject: String,
    pub consumer: String,
}

impl Default for NatsSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_NATS_URL.to_string(),
            auth: None,
            stream: DEFAULT_NATS_STREAM.to_string(),
            items_subject: DEFAULT_ITEMS_SUBJECT.to_string(),
            feed_subject: DEFAULT_FEED_SUBJECT.to_string(),
            consumer: DEFAULT_CONSUMER.to_string(),
        }
    }
}

impl From<&NatsSettings> for NatsConfig {
    fn from(settings: &NatsSettings) -> Self {
        NatsConfig {
            addr: settings.url.clone(),
            auth: settings.auth.as_ref().map(|c| NatsAuth {
                username: c.username.clone(),
                password: c.password.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub pipeline: PipelineConfig,
    pub search: SearchSettings,
    /// Recognized locale code to the index its records are written to.
    pub indices: BTreeMap<String, String>,
    pub nats: NatsSettings,
    pub retry: RetryConfig,
    pub feed_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            search: SearchSettings::default(),
            indices: BTreeMap::from([
                ("en".to_string(), "item_index_en".to_string()),
                ("ja".to_string(), "item_index_ja".to_string()),
            ]),
            nats: NatsSettings::default(),
            retry: RetryConfig::default(),
            feed_dir: PathBuf::from("."),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        std::env::vars().collect::<HashMap<_, _>>().try_into()
    }

    /// Index name configured for `locale`.
    pub fn index_for(&self, locale: &str) -> Result<&str> {
        self.indices
            .get(&locale.to_lowercase())
            .map(String::as_str)
            .ok_or_else(|| {
                Error::Config(format!(
                    "no index configured for locale '{locale}', known locales: {:?}",
                    self.indices.keys().collect::<Vec<_>>()
                ))
            })
    }
}

fn index_name(key: &str, value: &str) -> Result<String> {
    match value.trim() {
        "" => Err(Error::Config(format!("{key} must name an index"))),
        index => Ok(index.to_owned()),
    }
}

fn parse_env<T>(env_vars: &HashMap<String, String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Debug,
{
    env_vars
        .get(key)
        .map(|value| {
            value.trim().parse::<T>().map_err(|e| {
                Error::Config(format!("Parsing {key}(set to '{value}'): {e:?}"))
            })
        })
        .transpose()
}

fn credentials(
    env_vars: &HashMap<String, String>,
    user_key: &str,
    password_key: &str,
) -> Result<Option<Credentials>> {
    match (env_vars.get(user_key), env_vars.get(password_key)) {
        (Some(username), Some(password)) => Ok(Some(Credentials {
            username: username.to_owned(),
            password: password.to_owned(),
        })),
        (None, None) => Ok(None),
        (Some(_), None) => Err(Error::Config(format!(
            "Env variable {user_key} is set, but {password_key} is not set"
        ))),
        (None, Some(_)) => Err(Error::Config(format!(
            "Env variable {password_key} is set, but {user_key} is not set"
        ))),
    }
}

impl TryFrom<HashMap<String, String>> for Settings {
    type Error = Error;

    fn try_from(env_vars: HashMap<String, String>) -> Result<Self> {
        let mut settings = Settings::default();

        if let Some(queue_size) = parse_env(&env_vars, ENV_QUEUE_SIZE)? {
            settings.pipeline.queue_capacity = queue_size;
        }
        if let Some(batch_size) = parse_env(&env_vars, ENV_BATCH_SIZE)? {
            settings.pipeline.batch_size = batch_size;
        }
        if let Some(true) = parse_env::<bool>(&env_vars, ENV_ABORT_ON_ERROR)? {
            settings.pipeline.decode_error_policy = DecodeErrorPolicy::Abort;
        }
        settings.pipeline.validate()?;

        if let Some(url) = env_vars.get(ENV_SEARCH_URL) {
            settings.search.url = url.to_owned();
        }
        settings.search.auth = credentials(&env_vars, ENV_SEARCH_USERNAME, ENV_SEARCH_PASSWORD)?;

        for (key, locale) in [(ENV_INDEX_EN, "en"), (ENV_INDEX_JA, "ja")] {
            if let Some(index) = env_vars.get(key) {
                settings.indices.insert(locale.to_string(), index_name(key, index)?);
            }
        }
        // CATALOG_INDEX_FR=item_index_fr registers locale "fr"
        for (key, index) in &env_vars {
            if let Some(locale) = key.strip_prefix(ENV_EXTRA_INDEX_PREFIX) {
                if locale.is_empty() {
                    return Err(Error::Config(format!("{key} must name a locale")));
                }
                settings
                    .indices
                    .insert(locale.to_lowercase(), index_name(key, index)?);
            }
        }

        if let Some(url) = env_vars.get(ENV_NATS_URL) {
            settings.nats.url = url.to_owned();
        }
        if let Some(stream) = env_vars.get(ENV_NATS_STREAM) {
            settings.nats.stream = stream.to_owned();
        }
        if let Some(subject) = env_vars.get(ENV_NATS_ITEMS_SUBJECT) {
            settings.nats.items_subject = subject.to_owned();
        }
        if let Some(subject) = env_vars.get(ENV_NATS_FEED_SUBJECT) {
            settings.nats.feed_subject = subject.to_owned();
        }
        if let Some(consumer) = env_vars.get(ENV_NATS_CONSUMER) {
            settings.nats.consumer = consumer.to_owned();
        }
        settings.nats.auth = credentials(&env_vars, ENV_NATS_USERNAME, ENV_NATS_PASSWORD)?;

        if let Some(attempts) = parse_env(&env_vars, ENV_SINK_MAX_RETRY_ATTEMPTS)? {
            settings.retry.max_retry_attempts = attempts;
        }
        if let Some(interval) = parse_env(&env_vars, ENV_SINK_INITIAL_RETRY_INTERVAL_MS)? {
            settings.retry.initial_retry_interval_in_ms = interval;
        }

        if let Some(dir) = env_vars.get(ENV_FEED_DIR) {
            settings.feed_dir = PathBuf::from(dir);
        }

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::try_from(HashMap::new()).unwrap();
        assert_eq!(settings.pipeline.queue_capacity, 1000);
        assert_eq!(settings.pipeline.batch_size, 100);
        assert_eq!(settings.pipeline.decode_error_policy, DecodeErrorPolicy::Skip);
        assert_eq!(settings.search.url, "http://localhost:9200");
        assert_eq!(settings.index_for("en").unwrap(), "item_index_en");
        assert_eq!(settings.index_for("JA").unwrap(), "item_index_ja");
        assert_eq!(settings.nats.items_subject, "catalog.items");
        assert_eq!(settings.retry.max_retry_attempts, 3);
        assert_eq!(settings.feed_dir, PathBuf::from("."));
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::try_from(env(&[
            ("PARSER_QUEUE_SIZE", "16"),
            ("PARSER_BATCH_SIZE", " 4 "),
            ("PARSER_ABORT_ON_ERROR", "true"),
            ("SEARCH_USERNAME", "elastic"),
            ("SEARCH_PASSWORD", "changeme"),
            ("INDEX_EN", "items_en_v2"),
            ("CATALOG_INDEX_FR", "items_fr"),
            ("INDEX_URL", "http://unrelated"),
            ("SINK_MAX_RETRY_ATTEMPTS", "5"),
            ("FEED_DIR", "/data/feeds"),
        ]))
        .unwrap();

        assert_eq!(settings.pipeline.queue_capacity, 16);
        assert_eq!(settings.pipeline.batch_size, 4);
        assert_eq!(settings.pipeline.decode_error_policy, DecodeErrorPolicy::Abort);
        assert_eq!(
            settings.search.auth,
            Some(Credentials {
                username: "elastic".to_string(),
                password: "changeme".to_string(),
            })
        );
        assert_eq!(settings.index_for("en").unwrap(), "items_en_v2");
        assert_eq!(settings.index_for("fr").unwrap(), "items_fr");
        assert_eq!(settings.indices.len(), 3);
        assert!(settings.index_for("url").is_err());
        assert_eq!(settings.retry.max_retry_attempts, 5);
        assert_eq!(settings.feed_dir, PathBuf::from("/data/feeds"));

        let client = SearchClientConfig::from(&settings.search);
        assert_eq!(client.url, "http://localhost:9200");
        assert_eq!(client.auth.map(|a| a.username).as_deref(), Some("elastic"));
        let nats = NatsConfig::from(&settings.nats);
        assert_eq!(nats.addr, "localhost:4222");
        assert!(nats.auth.is_none());
    }

    #[test]
    fn test_invalid_values() {
        let err = Settings::try_from(env(&[("PARSER_QUEUE_SIZE", "lots")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = Settings::try_from(env(&[("PARSER_QUEUE_SIZE", "0")])).unwrap_err();
        assert!(err.to_string().contains("queue capacity"));

        let err = Settings::try_from(env(&[("PARSER_BATCH_SIZE", "0")])).unwrap_err();
        assert!(err.to_string().contains("batch size"));

        let err = Settings::try_from(env(&[("INDEX_JA", "  ")])).unwrap_err();
        assert!(err.to_string().contains("INDEX_JA"));

        let err = Settings::try_from(env(&[("CATALOG_INDEX_", "items")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = Settings::try_from(env(&[("SEARCH_USERNAME", "elastic")])).unwrap_err();
        assert!(err.to_string().contains("SEARCH_PASSWORD"));
    }

    #[test]
    fn test_unknown_locale() {
        let settings = Settings::default();
        assert!(settings.index_for("de").is_err());
    }
}
