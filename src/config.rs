//! Runtime configuration.
//!
//! Settings are resolved once at startup: built-in defaults, then an optional
//! TOML file, then environment variables (a `.env` file is honoured). The
//! result is immutable for the life of the process.

use crate::domain::money::RateTable;
use crate::domain::provider::ProviderId;
use crate::error::{PaymentError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Static description of one provider account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    /// API key, or OAuth client id for PayPal.
    pub api_key: String,
    /// API secret, or OAuth client secret for PayPal.
    pub api_secret: String,
    pub callback_url: String,
    pub countries: Vec<String>,
    /// Currencies the provider accepts; empty means any.
    pub supported_currencies: Vec<String>,
    /// Currency to convert into when the requested one is unsupported.
    pub settlement_currency: Option<String>,
    /// Value of MTN's `X-Target-Environment` header.
    pub target_environment: Option<String>,
}

impl ProviderConfig {
    pub fn accepts_currency(&self, currency: &str) -> bool {
        self.supported_currencies.is_empty()
            || self
                .supported_currencies
                .iter()
                .any(|c| c.eq_ignore_ascii_case(currency))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Calling code prepended to national phone numbers.
    pub default_country_code: String,
    pub default_currency: String,
    pub provider_timeout_secs: u64,
    pub sweep_item_timeout_secs: u64,
    pub sweep_concurrency: usize,
    pub sweep_interval_secs: u64,
    pub sweep_older_than_hours: u64,
    pub rates: RateTable,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_country_code: "228".to_string(),
            default_currency: "XOF".to_string(),
            provider_timeout_secs: 15,
            sweep_item_timeout_secs: 30,
            sweep_concurrency: 8,
            sweep_interval_secs: 900,
            sweep_older_than_hours: 24,
            rates: RateTable::default(),
        }
    }
}

impl EngineSettings {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn sweep_item_timeout(&self) -> Duration {
        Duration::from_secs(self.sweep_item_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn sweep_older_than(&self) -> Duration {
        Duration::from_secs(self.sweep_older_than_hours.saturating_mul(SECS_PER_HOUR))
    }

    /// Rejects values the engine cannot turn into durations.
    pub fn validate(&self) -> Result<()> {
        hours_to_duration(self.sweep_older_than_hours).map(|_| ())
    }
}

const SECS_PER_HOUR: u64 = 3600;

/// Converts an hour count to a `Duration`, failing on overflow.
pub fn hours_to_duration(hours: u64) -> Result<Duration> {
    hours
        .checked_mul(SECS_PER_HOUR)
        .map(Duration::from_secs)
        .ok_or_else(|| PaymentError::ValidationError(format!("{hours} hours is out of range")))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Public base URL of the platform API, used to derive callback URLs.
    pub api_base_url: String,
    pub engine: EngineSettings,
    pub providers: BTreeMap<ProviderId, ProviderConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        let providers = ProviderId::ALL
            .into_iter()
            .map(|id| (id, default_provider_config(id)))
            .collect();
        Self {
            api_base_url: "http://localhost:8080".to_string(),
            engine: EngineSettings::default(),
            providers,
        }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn default_provider_config(id: ProviderId) -> ProviderConfig {
    let mut config = ProviderConfig::default();
    match id {
        ProviderId::Mtn => {
            config.countries = strings(&[
                "Togo",
                "Ghana",
                "Nigeria",
                "Côte d'Ivoire",
                "Cameroun",
                "Rwanda",
                "Afrique du Sud",
            ]);
            config.target_environment = Some("production".to_string());
        }
        ProviderId::Moov | ProviderId::Flooz => {
            config.countries = strings(&["Togo", "Bénin", "Côte d'Ivoire", "Niger", "Burkina Faso"]);
        }
        ProviderId::Orange => {
            config.countries = strings(&[
                "Sénégal",
                "Mali",
                "Madagascar",
                "Cameroun",
                "Côte d'Ivoire",
                "Guinée",
                "RDC",
            ]);
        }
        ProviderId::Wave => {
            config.countries = strings(&["Sénégal", "Côte d'Ivoire", "Mali", "Burkina Faso"]);
        }
        ProviderId::Paypal => {
            config.base_url = "https://api-m.paypal.com".to_string();
            config.supported_currencies = strings(&["USD"]);
            config.settlement_currency = Some("USD".to_string());
        }
        ProviderId::Stripe => {
            config.base_url = "https://api.stripe.com".to_string();
            config.supported_currencies = strings(&["USD", "EUR", "GBP", "CAD", "JPY"]);
            config.settlement_currency = Some("EUR".to_string());
        }
    }
    config
}

impl Settings {
    /// Loads settings from an optional TOML file and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // A missing .env file is the normal case.
        let _ = dotenvy::dotenv();

        let mut settings = match path {
            Some(path) => Self::from_toml(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok());
        settings.derive_callback_urls();
        settings.engine.validate()?;
        Ok(settings)
    }

    pub fn from_toml(source: &str) -> Result<Self> {
        let mut settings: Settings =
            toml::from_str(source).map_err(|e| PaymentError::Config(e.to_string()))?;
        // Providers absent from the file keep their defaults.
        for id in ProviderId::ALL {
            settings
                .providers
                .entry(id)
                .or_insert_with(|| default_provider_config(id));
        }
        Ok(settings)
    }

    /// Overlays values found through `lookup` (normally `std::env::var`).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("API_BASE_URL") {
            self.api_base_url = url;
        }
        if let Some(code) = lookup("CROWDPAY_DEFAULT_COUNTRY_CODE") {
            self.engine.default_country_code = code;
        }
        if let Some(currency) = lookup("CROWDPAY_DEFAULT_CURRENCY") {
            self.engine.default_currency = currency;
        }
        let numeric = |key: &str| lookup(key).and_then(|v| v.parse::<u64>().ok());
        if let Some(secs) = numeric("CROWDPAY_PROVIDER_TIMEOUT_SECS") {
            self.engine.provider_timeout_secs = secs;
        }
        if let Some(secs) = numeric("CROWDPAY_SWEEP_INTERVAL_SECS") {
            self.engine.sweep_interval_secs = secs;
        }
        if let Some(hours) = numeric("CROWDPAY_SWEEP_OLDER_THAN_HOURS") {
            self.engine.sweep_older_than_hours = hours;
        }

        for (id, config) in self.providers.iter_mut() {
            let prefix = id.as_str().to_ascii_uppercase();
            let (key_var, secret_var) = match id {
                ProviderId::Paypal => ("PAYPAL_CLIENT_ID".to_string(), "PAYPAL_CLIENT_SECRET".to_string()),
                _ => (format!("{prefix}_API_KEY"), format!("{prefix}_API_SECRET")),
            };
            if let Some(base_url) = lookup(&format!("{prefix}_API_BASE_URL")) {
                config.base_url = base_url;
            }
            if let Some(key) = lookup(&key_var) {
                config.api_key = key;
            }
            if let Some(secret) = lookup(&secret_var) {
                config.api_secret = secret;
            }
        }
    }

    /// Fills empty callback URLs from `api_base_url`.
    pub fn derive_callback_urls(&mut self) {
        let base = self.api_base_url.trim_end_matches('/').to_string();
        for (id, config) in self.providers.iter_mut() {
            if !config.callback_url.is_empty() {
                continue;
            }
            config.callback_url = if id.is_mobile_money() {
                format!("{base}/payments/mobile-money/callback/{id}")
            } else {
                format!("{base}/payments/callback/{id}")
            };
        }
    }
}
