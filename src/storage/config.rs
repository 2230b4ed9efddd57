//! Backend selection and settings
//!
//! [`StorageSettings`] is the persisted, user-facing choice; it resolves into
//! exactly one [`BackendConfig`], which the factory turns into an adapter.

use crate::error::{BackendKind, Error, Result, StorageError, StorageResult};
use crate::storage::storage_cloud::CloudConfig;
use crate::storage::storage_local::LocalConfig;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Environment variable selecting the backend (`local` or `cloud`)
pub const ENV_BACKEND: &str = "BIZ_STORAGE_BACKEND";
/// Environment variable overriding the local key prefix
pub const ENV_PREFIX: &str = "BIZ_STORAGE_PREFIX";
/// Environment variable holding the cloud project URL
pub const ENV_CLOUD_URL: &str = "BIZ_CLOUD_URL";
/// Environment variable holding the cloud API key
pub const ENV_CLOUD_KEY: &str = "BIZ_CLOUD_KEY";
/// Environment variable overriding the cloud table
pub const ENV_CLOUD_TABLE: &str = "BIZ_CLOUD_TABLE";

/// Which backend the user picked
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendChoice {
    /// Local medium
    #[default]
    Local,
    /// Remote table
    Cloud,
}

impl From<BackendChoice> for BackendKind {
    fn from(choice: BackendChoice) -> Self {
        match choice {
            BackendChoice::Local => BackendKind::Local,
            BackendChoice::Cloud => BackendKind::Cloud,
        }
    }
}

impl FromStr for BackendChoice {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "cloud" | "supabase" => Ok(Self::Cloud),
            other => Err(Error::Configuration {
                message: format!("unknown storage backend '{}'", other),
            }),
        }
    }
}

/// Fully resolved configuration of one backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    /// Local medium under a key prefix
    Local(LocalConfig),
    /// Remote table
    Cloud(CloudConfig),
}

impl BackendConfig {
    /// Backend this configuration targets
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Local(_) => BackendKind::Local,
            Self::Cloud(_) => BackendKind::Cloud,
        }
    }

    /// Parse a storage URL.
    ///
    /// - `local://` or `local://<prefix>` selects the local backend
    /// - `http(s)://host[/path][#table]` selects the cloud backend, the
    ///   fragment naming the table
    pub fn from_url(url: &str, api_key: Option<&str>) -> Result<Self> {
        if let Some(prefix) = url.strip_prefix("local://") {
            let config = if prefix.is_empty() {
                LocalConfig::default()
            } else {
                LocalConfig {
                    prefix: prefix.to_string(),
                }
            };
            return Ok(Self::Local(config));
        }

        if url.starts_with("https://") || url.starts_with("http://") {
            let (base, table) = match url.split_once('#') {
                Some((base, table)) if !table.is_empty() => (base, Some(table)),
                Some((base, _)) => (base, None),
                None => (url, None),
            };
            let mut config = CloudConfig {
                url: base.to_string(),
                api_key: api_key.unwrap_or_default().to_string(),
                ..Default::default()
            };
            if let Some(table) = table {
                config.table = table.to_string();
            }
            return Ok(Self::Cloud(config));
        }

        Err(Error::Configuration {
            message: format!("unsupported storage URL: {}", url),
        })
    }
}

/// Persisted storage settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Selected backend
    pub backend: BackendChoice,
    /// Local backend settings, always present
    pub local: LocalConfig,
    /// Cloud backend settings, absent until the user configured them
    pub cloud: Option<CloudConfig>,
}

impl StorageSettings {
    /// Local backend with the given prefix
    pub fn local(prefix: impl Into<String>) -> Self {
        Self {
            backend: BackendChoice::Local,
            local: LocalConfig {
                prefix: prefix.into(),
            },
            cloud: None,
        }
    }

    /// Cloud backend with the given settings
    pub fn cloud(cloud: CloudConfig) -> Self {
        Self {
            backend: BackendChoice::Cloud,
            local: LocalConfig::default(),
            cloud: Some(cloud),
        }
    }

    /// Read settings from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(backend) = lookup(ENV_BACKEND) {
            settings.backend = backend.parse()?;
        }
        if let Some(prefix) = lookup(ENV_PREFIX) {
            settings.local.prefix = prefix;
        }

        let url = lookup(ENV_CLOUD_URL);
        let api_key = lookup(ENV_CLOUD_KEY);
        let table = lookup(ENV_CLOUD_TABLE);
        if url.is_some() || api_key.is_some() || table.is_some() {
            let mut cloud = CloudConfig::default();
            if let Some(url) = url {
                cloud.url = url;
            }
            if let Some(api_key) = api_key {
                cloud.api_key = api_key;
            }
            if let Some(table) = table {
                cloud.table = table;
            }
            settings.cloud = Some(cloud);
        }

        Ok(settings)
    }

    /// Resolve the selected backend into its configuration
    pub fn resolve(&self) -> StorageResult<BackendConfig> {
        match self.backend {
            BackendChoice::Local => Ok(BackendConfig::Local(self.local.clone())),
            BackendChoice::Cloud => {
                let cloud = self.cloud.as_ref().ok_or_else(|| {
                    StorageError::not_configured(
                        BackendKind::Cloud,
                        "cloud backend selected without cloud settings",
                    )
                })?;
                if cloud.url.trim().is_empty() {
                    return Err(StorageError::not_configured(
                        BackendKind::Cloud,
                        "cloud URL is empty",
                    ));
                }
                Ok(BackendConfig::Cloud(cloud.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::constants::{DEFAULT_CLOUD_TABLE, DEFAULT_LOCAL_PREFIX};
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_backend_choice_parsing() {
        assert_eq!("local".parse::<BackendChoice>().unwrap(), BackendChoice::Local);
        assert_eq!(" Cloud ".parse::<BackendChoice>().unwrap(), BackendChoice::Cloud);
        assert_eq!("supabase".parse::<BackendChoice>().unwrap(), BackendChoice::Cloud);
        assert!("indexeddb".parse::<BackendChoice>().is_err());
    }

    #[test]
    fn test_default_settings_resolve_to_local() {
        let settings = StorageSettings::default();
        assert_eq!(
            settings.resolve().unwrap(),
            BackendConfig::Local(LocalConfig {
                prefix: DEFAULT_LOCAL_PREFIX.to_string()
            })
        );
    }

    #[test]
    fn test_cloud_without_settings_is_not_configured() {
        let settings = StorageSettings {
            backend: BackendChoice::Cloud,
            ..Default::default()
        };
        let err = settings.resolve().unwrap_err();
        assert_eq!(err.code(), "CLOUD_NOT_CONFIGURED");
    }

    #[test]
    fn test_from_lookup() {
        let settings = StorageSettings::from_lookup(lookup(&[
            (ENV_BACKEND, "cloud"),
            (ENV_CLOUD_URL, "https://demo.supabase.co"),
            (ENV_CLOUD_KEY, "anon"),
        ]))
        .unwrap();

        assert_eq!(settings.backend, BackendChoice::Cloud);
        let cloud = settings.cloud.clone().unwrap();
        assert_eq!(cloud.url, "https://demo.supabase.co");
        assert_eq!(cloud.table, DEFAULT_CLOUD_TABLE);
        assert_eq!(settings.resolve().unwrap().kind(), BackendKind::Cloud);

        assert!(StorageSettings::from_lookup(lookup(&[(ENV_BACKEND, "ftp")])).is_err());
    }

    #[test]
    fn test_settings_serde_roundtrip_keeps_choice() {
        let settings = StorageSettings::local("shop_");
        let text = serde_json::to_string(&settings).unwrap();
        assert!(text.contains("\"backend\":\"local\""));

        let restored: StorageSettings = serde_json::from_str(&text).unwrap();
        assert_eq!(restored, settings);

        let partial: StorageSettings = serde_json::from_str("{\"backend\":\"cloud\"}").unwrap();
        assert_eq!(partial.backend, BackendChoice::Cloud);
        assert!(partial.cloud.is_none());
    }

    #[test]
    fn test_from_url() {
        assert_eq!(
            BackendConfig::from_url("local://shop_", None).unwrap(),
            BackendConfig::Local(LocalConfig {
                prefix: "shop_".to_string()
            })
        );
        assert_eq!(
            BackendConfig::from_url("local://", None).unwrap(),
            BackendConfig::Local(LocalConfig::default())
        );

        match BackendConfig::from_url("https://demo.supabase.co#clients", Some("anon")).unwrap() {
            BackendConfig::Cloud(cloud) => {
                assert_eq!(cloud.url, "https://demo.supabase.co");
                assert_eq!(cloud.table, "clients");
                assert_eq!(cloud.api_key, "anon");
            }
            other => panic!("expected cloud config, got {:?}", other),
        }

        assert!(BackendConfig::from_url("s3://bucket", None).is_err());
    }
}
