//! Connector configuration
//!
//! The configuration file describes credentials, account ids, the date range
//! and which reports to extract. It is read from JSON, or from YAML when the
//! file extension is `.yaml` / `.yml`, and turned into the runtime pieces the
//! engine needs: report specs, transport settings, poll bounds and auth.

use crate::auth::{AuthContext, OAuth2RefreshTokenRefresher, DEFAULT_TOKEN_URL};
use crate::catalog::FieldCatalog;
use crate::engine::{SyncConfig, SyncEngine};
use crate::error::{Error, Result};
use crate::http::{HttpClient, HttpClientConfig, RateLimiterConfig};
use crate::report::{
    Endpoints, PollConfig, ReportController, DEFAULT_DISPLAY_BASE_URL, DEFAULT_SEARCH_BASE_URL,
};
use crate::types::{
    parse_date, yesterday_jst, AdProduct, BackoffType, DateRange, ReportSpec, ReportType,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Root
// ============================================================================

/// Root connector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// OAuth2 credentials
    pub credentials: CredentialsConfig,

    /// Account ids per ad product
    #[serde(default)]
    pub accounts: AccountsConfig,

    /// First day to extract (`YYYY-MM-DD` or `YYYYMMDD`)
    pub start_date: String,

    /// Last day to extract, defaults to yesterday in JST
    #[serde(default)]
    pub end_date: Option<String>,

    /// Reports to extract, defaults to every registered report
    #[serde(default)]
    pub reports: Option<Vec<ReportConfig>>,

    /// Platform endpoints
    #[serde(default)]
    pub endpoints: EndpointsConfig,

    /// Transport settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Job polling bounds
    #[serde(default)]
    pub poll: PollSettings,

    /// Maximum reports in flight
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_concurrency() -> usize {
    1
}

// ============================================================================
// Sections
// ============================================================================

/// OAuth2 refresh-token grant inputs
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Application client id
    pub client_id: String,
    /// Application client secret
    pub client_secret: String,
    /// Long-lived refresh token
    pub refresh_token: String,
    /// Access token to use before the first refresh
    #[serde(default)]
    pub access_token: Option<String>,
}

impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Account ids; either may be a string or a number in the file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountsConfig {
    /// Search ads account
    #[serde(default, deserialize_with = "deserialize_account_id")]
    pub search_account_id: Option<String>,
    /// Display ads account
    #[serde(default, deserialize_with = "deserialize_account_id")]
    pub display_account_id: Option<String>,
}

impl AccountsConfig {
    /// Account id configured for a product
    pub fn account_for(&self, ad_product: AdProduct) -> Option<&str> {
        let id = match ad_product {
            AdProduct::Search => self.search_account_id.as_deref(),
            AdProduct::Display => self.display_account_id.as_deref(),
        };
        id.map(str::trim).filter(|id| !id.is_empty())
    }
}

fn deserialize_account_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum AccountId {
        Text(String),
        Number(u64),
    }

    Ok(
        Option::<AccountId>::deserialize(deserializer)?.map(|id| match id {
            AccountId::Text(s) => s,
            AccountId::Number(n) => n.to_string(),
        }),
    )
}

/// One configured report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Advertising surface
    pub ad_product: AdProduct,
    /// Report shape
    pub report_type: ReportType,
    /// Requested fields, defaults to the catalog's full list
    #[serde(default)]
    pub fields: Option<Vec<String>>,
}

/// Platform endpoint overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointsConfig {
    /// Search ads API base URL
    #[serde(default = "default_search_base_url")]
    pub search_base_url: String,
    /// Display ads API base URL
    #[serde(default = "default_display_base_url")]
    pub display_base_url: String,
    /// OAuth2 token endpoint
    #[serde(default = "default_token_url")]
    pub token_url: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            search_base_url: default_search_base_url(),
            display_base_url: default_display_base_url(),
            token_url: default_token_url(),
        }
    }
}

fn default_search_base_url() -> String {
    DEFAULT_SEARCH_BASE_URL.to_string()
}

fn default_display_base_url() -> String {
    DEFAULT_DISPLAY_BASE_URL.to_string()
}

fn default_token_url() -> String {
    DEFAULT_TOKEN_URL.to_string()
}

/// HTTP transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Attempts per request, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First retry delay in seconds
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_secs: u64,

    /// Exponential growth factor of the retry delay
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: u32,

    /// Retry delay cap in seconds
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Connection pool size
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Client-side rate limit, 0 disables it
    #[serde(default = "default_rps")]
    pub requests_per_second: u32,

    /// Extra statuses to retry on
    #[serde(default)]
    pub retry_statuses: Vec<u16>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            max_attempts: default_max_attempts(),
            initial_backoff_secs: default_initial_backoff(),
            backoff_factor: default_backoff_factor(),
            max_backoff_secs: default_max_backoff(),
            pool_size: default_pool_size(),
            requests_per_second: default_rps(),
            retry_statuses: Vec::new(),
        }
    }
}

fn default_timeout() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff() -> u64 {
    5
}

fn default_backoff_factor() -> u32 {
    5
}

fn default_max_backoff() -> u64 {
    625
}

fn default_pool_size() -> usize {
    100
}

fn default_rps() -> u32 {
    10
}

/// Job polling bounds; `null` for an optional bound removes it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSettings {
    /// Delay after the first status check in seconds
    #[serde(default = "default_poll_initial")]
    pub initial_delay_secs: u64,

    /// Delay growth factor
    #[serde(default = "default_poll_multiplier")]
    pub multiplier: u32,

    /// Delay cap in seconds
    #[serde(default = "default_poll_max_delay")]
    pub max_delay_secs: Option<u64>,

    /// Total sleep budget per job in seconds
    #[serde(default = "default_poll_max_wait")]
    pub max_wait_secs: Option<u64>,

    /// Maximum status checks per job
    #[serde(default)]
    pub max_polls: Option<u32>,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            initial_delay_secs: default_poll_initial(),
            multiplier: default_poll_multiplier(),
            max_delay_secs: default_poll_max_delay(),
            max_wait_secs: default_poll_max_wait(),
            max_polls: None,
        }
    }
}

fn default_poll_initial() -> u64 {
    5
}

fn default_poll_multiplier() -> u32 {
    2
}

fn default_poll_max_delay() -> Option<u64> {
    Some(15 * 60)
}

fn default_poll_max_wait() -> Option<u64> {
    Some(3 * 60 * 60)
}

// ============================================================================
// Loading
// ============================================================================

impl ConnectorConfig {
    /// Load and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::FileNotFound {
                path: path.display().to_string(),
            },
            _ => Error::Io(e),
        })?;

        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

        if is_yaml {
            Self::from_yaml_str(&content)
        } else {
            Self::from_json_str(&content)
        }
    }

    /// Parse and validate a JSON config
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a YAML config
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check required values and cross-field constraints
    pub fn validate(&self) -> Result<()> {
        let credentials = [
            ("credentials.client_id", &self.credentials.client_id),
            ("credentials.client_secret", &self.credentials.client_secret),
            ("credentials.refresh_token", &self.credentials.refresh_token),
        ];
        for (field, value) in credentials {
            if value.trim().is_empty() {
                return Err(Error::missing_field(field));
            }
        }

        if AdProduct::ALL
            .iter()
            .all(|product| self.accounts.account_for(*product).is_none())
        {
            return Err(Error::missing_field(
                "accounts.search_account_id or accounts.display_account_id",
            ));
        }

        for report in self.reports.iter().flatten() {
            if self.accounts.account_for(report.ad_product).is_none() {
                return Err(Error::invalid_value(
                    "reports",
                    format!(
                        "{}/{} is configured but no {} account id is set",
                        report.ad_product,
                        report.report_type,
                        report.ad_product.as_str().to_ascii_lowercase()
                    ),
                ));
            }
        }

        if self.poll.multiplier == 0 {
            return Err(Error::invalid_value("poll.multiplier", "must be at least 1"));
        }

        self.date_range()?;
        Ok(())
    }

    // ========================================================================
    // Runtime pieces
    // ========================================================================

    /// Inclusive date range, with the end defaulting to yesterday in JST
    pub fn date_range(&self) -> Result<DateRange> {
        let start = parse_date("start_date", &self.start_date)?;
        let end = match &self.end_date {
            Some(end) => parse_date("end_date", end)?,
            None => yesterday_jst(),
        };
        DateRange::new(start, end)
    }

    /// Report specs for every configured product
    pub fn report_specs(&self, catalog: &FieldCatalog) -> Result<Vec<ReportSpec>> {
        let date_range = self.date_range()?;

        let reports = match &self.reports {
            Some(reports) => reports.clone(),
            None => catalog
                .registered()
                .filter(|(product, _)| self.accounts.account_for(*product).is_some())
                .map(|(ad_product, report_type)| ReportConfig {
                    ad_product,
                    report_type,
                    fields: None,
                })
                .collect(),
        };

        reports
            .into_iter()
            .map(|report| {
                let account_id = self.accounts.account_for(report.ad_product).ok_or_else(|| {
                    Error::missing_field(format!(
                        "accounts.{}_account_id",
                        report.ad_product.as_str().to_ascii_lowercase()
                    ))
                })?;
                let fields = match report.fields {
                    Some(fields) => fields,
                    None => catalog
                        .fields_for(report.ad_product, report.report_type)?
                        .into_iter()
                        .map(str::to_string)
                        .collect(),
                };
                Ok(ReportSpec::new(
                    report.ad_product,
                    report.report_type,
                    account_id,
                    date_range,
                    fields,
                ))
            })
            .collect()
    }

    /// Transport configuration
    pub fn http_client_config(&self) -> HttpClientConfig {
        let http = &self.http;
        let backoff_type = match http.backoff_factor {
            5 => BackoffType::Platform,
            factor => BackoffType::Exponential { factor },
        };

        let mut builder = HttpClientConfig::builder()
            .timeout(Duration::from_secs(http.timeout_secs))
            .max_attempts(http.max_attempts)
            .backoff(
                backoff_type,
                Duration::from_secs(http.initial_backoff_secs),
                Duration::from_secs(http.max_backoff_secs),
            )
            .pool_size(http.pool_size);

        builder = if http.requests_per_second == 0 {
            builder.no_rate_limit()
        } else {
            builder.rate_limit(RateLimiterConfig::new(
                http.requests_per_second,
                http.requests_per_second,
            ))
        };

        for status in &http.retry_statuses {
            builder = builder.retry_status(*status);
        }

        builder.build()
    }

    /// Poll bounds
    pub fn poll_config(&self) -> PollConfig {
        let poll = &self.poll;
        PollConfig {
            initial_delay: Duration::from_secs(poll.initial_delay_secs),
            multiplier: poll.multiplier,
            max_delay: poll.max_delay_secs.map(Duration::from_secs),
            max_wait: poll.max_wait_secs.map(Duration::from_secs),
            max_polls: poll.max_polls,
        }
    }

    /// Platform endpoints
    pub fn endpoints(&self) -> Endpoints {
        Endpoints {
            search_base_url: self.endpoints.search_base_url.clone(),
            display_base_url: self.endpoints.display_base_url.clone(),
        }
    }

    /// Auth context backed by the OAuth2 refresh-token grant
    pub fn auth_context(&self) -> AuthContext {
        let credentials = &self.credentials;
        let refresher = OAuth2RefreshTokenRefresher::new(
            self.endpoints.token_url.clone(),
            credentials.client_id.clone(),
            credentials.client_secret.clone(),
            credentials.refresh_token.clone(),
        );
        AuthContext::with_refresher(credentials.access_token.clone(), Arc::new(refresher))
    }

    /// Engine settings
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig::new().with_concurrency(self.concurrency)
    }

    /// Wire the transport, controller and engine together
    pub fn build_engine(&self) -> Result<SyncEngine> {
        let client = HttpClient::with_config(self.http_client_config())?.with_auth(self.auth_context());
        let controller =
            ReportController::new(client, self.endpoints()).with_poll_config(self.poll_config());
        Ok(SyncEngine::new(controller).with_config(self.sync_config()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use test_case::test_case;

    const YAML: &str = r#"
credentials:
  client_id: my-client
  client_secret: my-secret
  refresh_token: my-refresh
accounts:
  search_account_id: "1001"
start_date: "2024-01-01"
end_date: "2024-01-31"
"#;

    #[test]
    fn test_parse_minimal_yaml_with_defaults() {
        let config = ConnectorConfig::from_yaml_str(YAML).unwrap();

        assert_eq!(config.accounts.account_for(AdProduct::Search), Some("1001"));
        assert_eq!(config.accounts.account_for(AdProduct::Display), None);
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.http.max_attempts, 5);
        assert_eq!(config.http.max_backoff_secs, 625);
        assert_eq!(config.poll.max_delay_secs, Some(900));
        assert_eq!(config.poll.max_wait_secs, Some(10_800));
        assert_eq!(config.poll.max_polls, None);
        assert_eq!(config.endpoints.token_url, DEFAULT_TOKEN_URL);
    }

    #[test]
    fn test_numeric_account_id_in_json() {
        let json = r#"{
            "credentials": {"client_id": "a", "client_secret": "b", "refresh_token": "c"},
            "accounts": {"display_account_id": 5678},
            "start_date": "20240101",
            "end_date": "20240102"
        }"#;
        let config = ConnectorConfig::from_json_str(json).unwrap();
        assert_eq!(config.accounts.account_for(AdProduct::Display), Some("5678"));
    }

    #[test]
    fn test_default_reports_cover_configured_products() {
        let config = ConnectorConfig::from_yaml_str(YAML).unwrap();
        let catalog = FieldCatalog::standard();
        let specs = config.report_specs(&catalog).unwrap();

        let pairs: Vec<_> = specs.iter().map(|s| (s.ad_product, s.report_type)).collect();
        assert_eq!(
            pairs,
            vec![
                (AdProduct::Search, ReportType::Ad),
                (AdProduct::Search, ReportType::AdConversion),
                (AdProduct::Search, ReportType::Keywords),
            ]
        );

        let expected: Vec<String> = catalog
            .fields_for(AdProduct::Search, ReportType::Keywords)
            .unwrap()
            .into_iter()
            .map(str::to_string)
            .collect();
        assert_eq!(specs[2].fields, expected);
        assert_eq!(specs[2].account_id, "1001");
        assert_eq!(specs[2].date_range.platform_end(), "20240131");
    }

    #[test]
    fn test_explicit_reports_keep_fields() {
        let yaml = format!(
            "{YAML}reports:\n  - {{ ad_product: SEARCH, report_type: AD, fields: [DAY, COST] }}\n  - {{ ad_product: SEARCH, report_type: KEYWORDS, fields: [] }}\n"
        );
        let config = ConnectorConfig::from_yaml_str(&yaml).unwrap();
        let specs = config.report_specs(&FieldCatalog::standard()).unwrap();

        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].fields, vec!["DAY".to_string(), "COST".to_string()]);
        assert!(specs[1].fields.is_empty());
    }

    #[test]
    fn test_report_without_account_is_rejected() {
        let yaml = format!("{YAML}reports:\n  - {{ ad_product: DISPLAY, report_type: AD }}\n");
        assert!(matches!(
            ConnectorConfig::from_yaml_str(&yaml),
            Err(Error::InvalidConfigValue { .. })
        ));
    }

    #[test]
    fn test_missing_accounts_is_rejected() {
        let yaml = YAML.replace("  search_account_id: \"1001\"\n", "  search_account_id: \"\"\n");
        assert!(matches!(
            ConnectorConfig::from_yaml_str(&yaml),
            Err(Error::MissingConfigField { .. })
        ));
    }

    #[test_case("client_id: my-client", "client_id: \"\"", "credentials.client_id")]
    #[test_case("refresh_token: my-refresh", "refresh_token: \" \"", "credentials.refresh_token")]
    fn test_blank_credentials_are_rejected(from: &str, to: &str, expected: &str) {
        let yaml = YAML.replace(from, to);
        match ConnectorConfig::from_yaml_str(&yaml) {
            Err(Error::MissingConfigField { field }) => assert_eq!(field, expected),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test_case("\"2024-13-01\"" ; "invalid month")]
    #[test_case("\"2023-12-31\"" ; "end before start")]
    fn test_bad_end_date_is_rejected(end: &str) {
        let yaml = YAML.replace("\"2024-01-31\"", end);
        assert!(matches!(
            ConnectorConfig::from_yaml_str(&yaml),
            Err(Error::InvalidConfigValue { .. })
        ));
    }

    #[test]
    fn test_missing_end_date_defaults_to_yesterday() {
        let yaml = YAML.replace("end_date: \"2024-01-31\"\n", "");
        let config = ConnectorConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(config.date_range().unwrap().end, yesterday_jst());
    }

    #[test]
    fn test_http_client_config_mapping() {
        let yaml = format!(
            "{YAML}http:\n  max_attempts: 2\n  backoff_factor: 3\n  requests_per_second: 0\n  retry_statuses: [403]\n"
        );
        let config = ConnectorConfig::from_yaml_str(&yaml).unwrap();
        let http = config.http_client_config();

        assert_eq!(http.max_attempts, 2);
        assert_eq!(http.backoff_type, BackoffType::Exponential { factor: 3 });
        assert!(http.rate_limit.is_none());
        assert_eq!(http.retry_statuses, vec![403]);

        let defaults = ConnectorConfig::from_yaml_str(YAML).unwrap().http_client_config();
        assert_eq!(defaults.backoff_type, BackoffType::Platform);
        assert_eq!(defaults.timeout, Duration::from_secs(300));
        assert!(defaults.rate_limit.is_some());
    }

    #[test]
    fn test_poll_config_null_bounds() {
        let yaml = format!("{YAML}poll:\n  max_delay_secs: null\n  max_wait_secs: 60\n  max_polls: 4\n");
        let poll = ConnectorConfig::from_yaml_str(&yaml).unwrap().poll_config();

        assert_eq!(poll.initial_delay, Duration::from_secs(5));
        assert_eq!(poll.multiplier, 2);
        assert_eq!(poll.max_delay, None);
        assert_eq!(poll.max_wait, Some(Duration::from_secs(60)));
        assert_eq!(poll.max_polls, Some(4));
    }

    #[test]
    fn test_load_by_extension() {
        let mut yaml_file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        yaml_file.write_all(YAML.as_bytes()).unwrap();
        let config = ConnectorConfig::load(yaml_file.path()).unwrap();
        assert_eq!(config.credentials.client_id, "my-client");

        let mut json_file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        json_file
            .write_all(serde_json::to_string(&config).unwrap().as_bytes())
            .unwrap();
        let reloaded = ConnectorConfig::load(json_file.path()).unwrap();
        assert_eq!(reloaded.accounts.account_for(AdProduct::Search), Some("1001"));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ConnectorConfig::load(dir.path().join("absent.json")),
            Err(Error::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let config = ConnectorConfig::from_yaml_str(YAML).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("my-secret"));
        assert!(!debug.contains("my-refresh"));
    }

    #[test]
    fn test_build_engine_uses_settings() {
        let yaml = format!("{YAML}concurrency: 4\n");
        let config = ConnectorConfig::from_yaml_str(&yaml).unwrap();
        let engine = config.build_engine().unwrap();

        assert_eq!(engine.config().concurrency, 4);
        assert!(engine.controller().client().auth().unwrap().can_refresh());
        assert_eq!(engine.controller().poll_config().max_polls, None);
    }
}
