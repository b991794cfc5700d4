use crate::error::{Error, Result};
use crate::fetcher::{CatalogEndpoint, FetcherConfig};
use crate::verification::ValidatorConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub proxy: ProxySettings,
    pub catalog: CatalogSettings,
    pub store: StoreSettings,
    #[serde(default)]
    pub run: RunSettings,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxySourceKind {
    #[default]
    File,
    Proxyscrape,
    FreeproxyWorld,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    pub enabled: bool,
    pub source: ProxySourceKind,
    pub list_path: Option<PathBuf>,
    pub sample_size: usize,
    pub checker_urls: Vec<String>,
    pub probe_timeout_secs: f64,
    pub rate_limit_cooldown_secs: f64,
    pub max_rate_limit_retries: Option<u32>,
    pub initial_backoff_secs: f64,
    pub pacing_min_secs: f64,
    pub pacing_max_secs: f64,
    pub max_concurrent_probes: usize,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            source: ProxySourceKind::File,
            list_path: None,
            sample_size: 50,
            checker_urls: Vec::new(),
            probe_timeout_secs: 30.0,
            rate_limit_cooldown_secs: 60.0,
            max_rate_limit_retries: None,
            initial_backoff_secs: 1.0,
            pacing_min_secs: 0.5,
            pacing_max_secs: 5.0,
            max_concurrent_probes: 100,
        }
    }
}

impl ProxySettings {
    pub fn validator_config(&self) -> ValidatorConfig {
        ValidatorConfig {
            probe_timeout: secs(self.probe_timeout_secs),
            rate_limit_cooldown: secs(self.rate_limit_cooldown_secs),
            max_rate_limit_retries: self.max_rate_limit_retries,
            initial_backoff: secs(self.initial_backoff_secs),
            pacing: (secs(self.pacing_min_secs), secs(self.pacing_max_secs)),
            max_concurrent_probes: self.max_concurrent_probes,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogSettings {
    pub base_url: String,
    pub category_id: Option<u64>,
    #[serde(default = "default_start_page")]
    pub start_page: u32,
    #[serde(default = "default_end_page")]
    pub end_page: u32,
    #[serde(default = "default_page_param")]
    pub page_param: String,
    #[serde(default = "default_category_param")]
    pub category_param: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: f64,
    #[serde(default = "default_max_concurrent_pages")]
    pub max_concurrent_pages: usize,
    #[serde(default = "default_true")]
    pub verify_tls: bool,
    pub user_agent: Option<String>,
}

impl CatalogSettings {
    pub fn endpoint(&self) -> CatalogEndpoint {
        CatalogEndpoint {
            base_url: self.base_url.clone(),
            category_id: self.category_id,
            page_param: self.page_param.clone(),
            category_param: self.category_param.clone(),
        }
    }

    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            request_timeout: secs(self.request_timeout_secs),
            max_concurrent_pages: self.max_concurrent_pages,
            verify_tls: self.verify_tls,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    pub database_path: PathBuf,
    #[serde(default = "default_table")]
    pub table: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Exit with a non-zero status when the run fails. Off by default: the
    /// error is logged and the process exits cleanly.
    pub fail_on_error: bool,
}

fn default_start_page() -> u32 {
    3
}

fn default_end_page() -> u32 {
    4
}

fn default_page_param() -> String {
    "page".to_string()
}

fn default_category_param() -> String {
    "category".to_string()
}

fn default_request_timeout() -> f64 {
    30.0
}

fn default_max_concurrent_pages() -> usize {
    16
}

fn default_true() -> bool {
    true
}

fn default_table() -> String {
    "motion_elements".to_string()
}

fn secs(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.0))
}

impl Settings {
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_data = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read {}: {}", path.display(), e),
            key: None,
        })?;
        Self::from_toml(&config_data)
    }

    pub fn from_toml(config_data: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(config_data)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks required settings before anything touches the network.
    pub fn validate(&self) -> Result<()> {
        if self.proxy.enabled {
            if self.proxy.source == ProxySourceKind::File && self.proxy.list_path.is_none() {
                return Err(Error::config(
                    "proxy list path is required when proxies are enabled",
                    "proxy.list_path",
                ));
            }
            if self.proxy.checker_urls.iter().all(|u| u.trim().is_empty()) {
                return Err(Error::config(
                    "no URL provided for proxy checking",
                    "proxy.checker_urls",
                ));
            }
            if self.proxy.sample_size == 0 {
                return Err(Error::config("sample size must be positive", "proxy.sample_size"));
            }
            if self.proxy.pacing_min_secs > self.proxy.pacing_max_secs {
                return Err(Error::config(
                    "pacing_min_secs exceeds pacing_max_secs",
                    "proxy.pacing_min_secs",
                ));
            }
        }

        if self.catalog.base_url.trim().is_empty() {
            return Err(Error::config("catalog URL is required", "catalog.base_url"));
        }
        self.catalog.endpoint().page_url(self.catalog.start_page)?;
        if self.catalog.start_page > self.catalog.end_page {
            return Err(Error::config(
                format!(
                    "start page {} is after end page {}",
                    self.catalog.start_page, self.catalog.end_page
                ),
                "catalog.start_page",
            ));
        }

        if self.store.database_path.as_os_str().is_empty() {
            return Err(Error::config("database path is required", "store.database_path"));
        }
        crate::store::validate_table_name(&self.store.table)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [catalog]
        base_url = "https://catalog.test/api/items"

        [store]
        database_path = "motions.db"
    "#;

    fn key_of(err: Error) -> Option<String> {
        match err {
            Error::Config { key, .. } => key,
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn minimal_config_uses_reference_defaults() {
        let settings = Settings::from_toml(MINIMAL).unwrap();

        assert!(!settings.proxy.enabled);
        assert_eq!((settings.catalog.start_page, settings.catalog.end_page), (3, 4));
        assert_eq!(settings.store.table, "motion_elements");
        assert!(!settings.run.fail_on_error);

        let validator = settings.proxy.validator_config();
        assert_eq!(validator.probe_timeout, Duration::from_secs(30));
        assert_eq!(validator.rate_limit_cooldown, Duration::from_secs(60));
        assert_eq!(validator.pacing, (Duration::from_millis(500), Duration::from_secs(5)));
        assert_eq!(validator.max_rate_limit_retries, None);
    }

    #[test]
    fn full_config_parses() {
        let settings = Settings::from_toml(
            r#"
            [proxy]
            enabled = true
            source = "file"
            list_path = "proxies.csv"
            sample_size = 10
            checker_urls = ["http://httpbin.org/ip"]
            max_rate_limit_retries = 3

            [catalog]
            base_url = "https://catalog.test/api/items"
            category_id = 38
            start_page = 1
            end_page = 9

            [store]
            database_path = "data/motions.db"
            table = "clips"

            [run]
            fail_on_error = true
            "#,
        )
        .unwrap();

        assert_eq!(settings.proxy.sample_size, 10);
        assert_eq!(settings.proxy.validator_config().max_rate_limit_retries, Some(3));
        assert_eq!(settings.catalog.endpoint().category_id, Some(38));
        assert_eq!(settings.store.table, "clips");
        assert!(settings.run.fail_on_error);
    }

    #[test]
    fn enabled_proxies_need_checker_urls() {
        let toml = format!(
            "{}\n[proxy]\nenabled = true\nlist_path = \"p.csv\"\nchecker_urls = []\n",
            MINIMAL
        );

        let err = Settings::from_toml(&toml).unwrap_err();

        assert_eq!(key_of(err).as_deref(), Some("proxy.checker_urls"));
    }

    #[test]
    fn enabled_file_source_needs_list_path() {
        let toml = format!(
            "{}\n[proxy]\nenabled = true\nchecker_urls = [\"http://c.test\"]\n",
            MINIMAL
        );

        let err = Settings::from_toml(&toml).unwrap_err();

        assert_eq!(key_of(err).as_deref(), Some("proxy.list_path"));
    }

    #[test]
    fn inverted_page_range_is_rejected() {
        let toml = r#"
            [catalog]
            base_url = "https://catalog.test/api/items"
            start_page = 5
            end_page = 2

            [store]
            database_path = "motions.db"
        "#;

        let err = Settings::from_toml(toml).unwrap_err();

        assert_eq!(key_of(err).as_deref(), Some("catalog.start_page"));
    }

    #[test]
    fn table_name_must_be_an_identifier() {
        let toml = MINIMAL.replace(
            "database_path = \"motions.db\"",
            "database_path = \"motions.db\"\ntable = \"clips; --\"",
        );

        let err = Settings::from_toml(&toml).unwrap_err();

        assert_eq!(key_of(err).as_deref(), Some("store.table"));
    }

    #[test]
    fn missing_store_section_is_a_parse_error() {
        let toml = r#"
            [catalog]
            base_url = "https://catalog.test/api/items"
        "#;

        assert!(matches!(Settings::from_toml(toml), Err(Error::Toml(_))));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = Settings::from_file(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(matches!(err, Error::Config { key: None, .. }));
    }
}
