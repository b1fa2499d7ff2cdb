//! Service configuration.
//!
//! Uses Figment to merge built-in defaults, a TOML file (`catalog.toml` unless
//! `--config` names another) and `CATALOG_*` environment variables, where `__`
//! separates nesting levels (`CATALOG_INDEX__BACKEND=memory`).

use crate::catalog::coordinator::CoordinatorSettings;
use crate::catalog::types::CreatePolicy;
use crate::search::client::Namespace;
use crate::search::sonic::SonicOptions;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "catalog.toml";
pub const ENV_PREFIX: &str = "CATALOG_";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    pub http: HttpSettings,
    pub catalog: CatalogSettings,
    pub index: IndexSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSettings {
    pub bind: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3333".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSettings {
    /// Singular entity name used in routes (`/car`, `/cars`).
    pub entity: String,
    pub collection: String,
    pub bucket: String,
    pub locale: Option<String>,
    pub default_limit: usize,
    pub max_limit: usize,
    pub suggest_limit: usize,
    pub max_suggest_limit: usize,
    pub create_policy: CreatePolicy,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            entity: "car".to_string(),
            collection: "vehicles".to_string(),
            bucket: "default".to_string(),
            locale: Some("por".to_string()),
            default_limit: 10,
            max_limit: 100,
            suggest_limit: 10,
            max_suggest_limit: 20,
            create_policy: CreatePolicy::Report,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    /// In-process engine, state is lost on restart.
    Memory,
    Sonic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSettings {
    pub backend: IndexBackend,
    pub host: String,
    pub port: u16,
    pub password: String,
    pub pool_size: usize,
    pub timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            backend: IndexBackend::Sonic,
            host: "localhost".to_string(),
            port: 1491,
            password: "SecretPassword".to_string(),
            pool_size: 4,
            timeout_ms: 3_000,
            connect_timeout_ms: 2_000,
        }
    }
}

impl Settings {
    /// Loads defaults, then the config file, then the environment.
    ///
    /// A missing default file is fine; a missing file that was asked for explicitly is not.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let file = match path {
            Some(p) => {
                if !p.exists() {
                    anyhow::bail!("config file {} does not exist", p.display());
                }
                p.to_path_buf()
            }
            None => DEFAULT_CONFIG_FILE.into(),
        };

        let figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::from_figment(figment)
    }

    pub fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        let settings: Settings = figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to read configuration: {}", e))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let entity = &self.catalog.entity;
        if entity.is_empty()
            || !entity
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            anyhow::bail!("catalog.entity must be a non-empty path segment, got '{}'", entity);
        }
        for (name, value) in [
            ("catalog.collection", &self.catalog.collection),
            ("catalog.bucket", &self.catalog.bucket),
        ] {
            if value.is_empty() || value.contains(char::is_whitespace) {
                anyhow::bail!("{} must be a single non-empty word", name);
            }
        }
        if let Some(locale) = &self.catalog.locale
            && (locale.is_empty() || locale.contains(char::is_whitespace))
        {
            anyhow::bail!("catalog.locale must be a single word when set");
        }
        if self.catalog.default_limit == 0
            || self.catalog.max_limit == 0
            || self.catalog.suggest_limit == 0
            || self.catalog.max_suggest_limit == 0
        {
            anyhow::bail!("catalog limits must be greater than zero");
        }
        if self.index.pool_size == 0 {
            anyhow::bail!("index.pool_size must be greater than zero");
        }
        if self.index.timeout_ms == 0 {
            anyhow::bail!("index.timeout_ms must be greater than zero");
        }
        Ok(())
    }

    pub fn namespace(&self) -> Namespace {
        let ns = Namespace::new(&self.catalog.collection, &self.catalog.bucket);
        match &self.catalog.locale {
            Some(locale) => ns.with_locale(locale),
            None => ns,
        }
    }

    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            default_limit: self.catalog.default_limit,
            max_limit: self.catalog.max_limit,
            suggest_limit: self.catalog.suggest_limit,
            max_suggest_limit: self.catalog.max_suggest_limit,
            index_timeout: Duration::from_millis(self.index.timeout_ms),
        }
    }

    pub fn sonic_options(&self) -> SonicOptions {
        SonicOptions {
            host: self.index.host.clone(),
            port: self.index.port,
            password: self.index.password.clone(),
            pool_size: self.index.pool_size,
            connect_timeout: Duration::from_millis(self.index.connect_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_target_local_sonic() {
        let settings = Settings::from_figment(Figment::from(Serialized::defaults(
            Settings::default(),
        )))
        .unwrap();

        assert_eq!(settings.catalog.entity, "car");
        assert_eq!(settings.index.backend, IndexBackend::Sonic);
        assert_eq!(settings.index.port, 1491);
        assert_eq!(settings.coordinator_settings().max_suggest_limit, 20);

        let ns = settings.namespace();
        assert_eq!(ns.collection, "vehicles");
        assert_eq!(ns.bucket, "default");
        assert_eq!(ns.locale.as_deref(), Some("por"));
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let figment = Figment::from(Serialized::defaults(Settings::default())).merge(
            Toml::string(
                r#"
                [catalog]
                entity = "product"
                collection = "products"
                create_policy = "compensate"

                [index]
                backend = "memory"
                timeout_ms = 500
                "#,
            ),
        );

        let settings = Settings::from_figment(figment).unwrap();

        assert_eq!(settings.catalog.entity, "product");
        assert_eq!(settings.catalog.collection, "products");
        assert_eq!(settings.catalog.bucket, "default");
        assert_eq!(settings.catalog.create_policy, CreatePolicy::Compensate);
        assert_eq!(settings.index.backend, IndexBackend::Memory);
        assert_eq!(
            settings.coordinator_settings().index_timeout,
            Duration::from_millis(500)
        );
    }

    #[test]
    fn test_rejects_bad_entity() {
        let figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::string("[catalog]\nentity = \"my cars\""));

        assert!(Settings::from_figment(figment).is_err());
    }

    #[test]
    fn test_rejects_multi_word_locale() {
        let figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::string("[catalog]\nlocale = \"por\\nFLUSHC x\""));

        assert!(Settings::from_figment(figment).is_err());
    }

    #[test]
    fn test_rejects_zero_limit() {
        let figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::string("[catalog]\nmax_limit = 0"));

        assert!(Settings::from_figment(figment).is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = Settings::load(Some(Path::new("/definitely/not/here/catalog.toml")));

        assert!(result.is_err());
    }
}
