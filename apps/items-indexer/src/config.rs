//! Configuration for the items indexer

use core_config::{ConfigError, FromEnv};
use database::mongodb::MongoConfig;
use domain_items::RelayConfig;
use domain_search::MeiliConfig;

const APP_NAME: &str = "items-indexer";

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub mongo: MongoConfig,
    pub meili: MeiliConfig,
    pub relay: RelayConfig,
}

impl FromEnv for IndexerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let mut mongo = MongoConfig::from_env()?;
        if mongo.app_name.is_none() {
            mongo = mongo.with_app_name(APP_NAME);
        }

        Ok(Self {
            mongo,
            meili: MeiliConfig::from_env()?,
            relay: RelayConfig::from_env()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const VARS: [&str; 8] = [
        "MONGODB_URL",
        "MONGO_URL",
        "MONGODB_DATABASE",
        "MONGODB_APP_NAME",
        "MEILISEARCH_HOST",
        "MEILISEARCH_API_KEY",
        "OUTBOX_BATCH_SIZE",
        "OUTBOX_POLL_INTERVAL_MS",
    ];

    fn with_env<F: FnOnce()>(vars: &[(&str, &str)], test: F) {
        let all: Vec<(&str, Option<&str>)> = VARS
            .iter()
            .map(|key| {
                let value = vars.iter().find(|(k, _)| k == key).map(|(_, v)| *v);
                (*key, value)
            })
            .collect();
        temp_env::with_vars(all, test);
    }

    #[test]
    fn test_loads_all_sections() {
        with_env(
            &[
                ("MONGODB_URL", "mongodb://db:27017"),
                ("MONGODB_DATABASE", "shop"),
                ("MEILISEARCH_HOST", "http://search:7700"),
                ("MEILISEARCH_API_KEY", "masterKey"),
                ("OUTBOX_BATCH_SIZE", "25"),
                ("OUTBOX_POLL_INTERVAL_MS", "250"),
            ],
            || {
                let config = IndexerConfig::from_env().unwrap();
                assert_eq!(config.mongo.url(), "mongodb://db:27017");
                assert_eq!(config.mongo.database(), "shop");
                assert_eq!(config.mongo.app_name.as_deref(), Some(APP_NAME));
                assert_eq!(config.meili.host, "http://search:7700");
                assert_eq!(config.meili.api_key.as_deref(), Some("masterKey"));
                assert_eq!(config.relay.batch_size, 25);
                assert_eq!(config.relay.poll_interval, Duration::from_millis(250));
            },
        );
    }

    #[test]
    fn test_keeps_explicit_app_name() {
        with_env(
            &[
                ("MONGO_URL", "mongodb://db:27017"),
                ("MONGODB_APP_NAME", "indexer-eu"),
                ("MEILISEARCH_HOST", "http://search:7700"),
            ],
            || {
                let config = IndexerConfig::from_env().unwrap();
                assert_eq!(config.mongo.app_name.as_deref(), Some("indexer-eu"));
            },
        );
    }

    #[test]
    fn test_requires_search_host() {
        with_env(&[("MONGODB_URL", "mongodb://db:27017")], || {
            let err = IndexerConfig::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::MissingEnvVar(ref key) if key == "MEILISEARCH_HOST"));
        });
    }

    #[test]
    fn test_rejects_zero_batch_size() {
        with_env(
            &[
                ("MONGODB_URL", "mongodb://db:27017"),
                ("MEILISEARCH_HOST", "http://search:7700"),
                ("OUTBOX_BATCH_SIZE", "0"),
            ],
            || {
                let err = IndexerConfig::from_env().unwrap_err();
                assert!(matches!(err, ConfigError::InvalidValue { .. }));
            },
        );
    }
}
