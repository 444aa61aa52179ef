use std::cell::RefCell;
use std::collections::HashSet;
use std::env;
use std::str::FromStr;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::AppError;
use crate::models::location::GeoPoint;

pub const DEFAULT_API_BASE: &str = "https://api.chot.app/v1";

static WARNED: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct StoreLocation {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub address: String,
    pub phone: String,
}

impl StoreLocation {
    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            lat: self.lat,
            lng: self.lng,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PricingRules {
    pub base_fee: f64,
    pub per_km_rate: f64,
    pub per_kg_rate: f64,
    pub free_delivery_above: f64,
}

impl PricingRules {
    pub fn qualifies_for_free_delivery(&self, cart_total: f64) -> bool {
        cart_total > self.free_delivery_above
    }
}

/// Bounds (minutes) the courier advertises for pickup and drop-off.
#[derive(Debug, Clone)]
pub struct TimeEstimates {
    pub min_pickup: u32,
    pub max_pickup: u32,
    pub min_delivery: u32,
    pub max_delivery: u32,
}

impl TimeEstimates {
    /// Whether courier-promised pickup and delivery times fall inside the
    /// advertised bounds.
    pub fn covers(&self, pickup_minutes: u32, delivery_minutes: u32) -> bool {
        (self.min_pickup..=self.max_pickup).contains(&pickup_minutes)
            && (self.min_delivery..=self.max_delivery).contains(&delivery_minutes)
    }
}

#[derive(Debug, Clone)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct PollingSettings {
    pub interval: Duration,
    pub max_duration: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base: Option<String>,
    pub api_key: String,
    pub merchant_id: String,
    pub store: StoreLocation,
    pub max_delivery_radius_km: f64,
    pub fallback_fee: f64,
    pub pricing: PricingRules,
    pub time_estimates: TimeEstimates,
    pub retry: RetrySettings,
    pub polling: PollingSettings,
    pub debug: bool,
    pub http_port: u16,
    pub log_level: String,
    pub log_json: bool,
    pub cache_dir: String,
    pub warnings: Vec<ConfigWarning>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Blank values
    /// count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let debug = non_blank("DEBUG_DELIVERY").as_deref() == Some("true");
        let source = Source {
            lookup: non_blank,
            debug,
            warnings: RefCell::new(Vec::new()),
        };

        let mut config = Self {
            api_base: source.required("CHOT_API_BASE"),
            api_key: source.required("CHOT_API_KEY").unwrap_or_default(),
            merchant_id: source.required("CHOT_MERCHANT_ID").unwrap_or_default(),
            store: StoreLocation {
                name: source.string_or("STORE_NAME", "Hlthfy Store"),
                lat: source.parse_or_default("STORE_LAT", 28.6139),
                lng: source.parse_or_default("STORE_LNG", 77.2090),
                address: source.string_or("STORE_ADDRESS", "Your Store Address"),
                phone: source.string_or("STORE_PHONE", "+91-XXXXXXXXXX"),
            },
            max_delivery_radius_km: source.parse_or_default("MAX_DELIVERY_RADIUS", 25.0),
            fallback_fee: source.parse_or_default("FALLBACK_DELIVERY_FEE", 50.0),
            pricing: PricingRules {
                base_fee: source.parse_or_default("PRICING_BASE_FEE", 50.0),
                per_km_rate: source.parse_or_default("PRICING_PER_KM_RATE", 5.0),
                per_kg_rate: source.parse_or_default("PRICING_PER_KG_RATE", 10.0),
                free_delivery_above: source.parse_or_default("FREE_DELIVERY_ABOVE", 500.0),
            },
            time_estimates: TimeEstimates {
                min_pickup: source.parse_or_default("MIN_PICKUP_TIME", 15),
                max_pickup: source.parse_or_default("MAX_PICKUP_TIME", 45),
                min_delivery: source.parse_or_default("MIN_DELIVERY_TIME", 30),
                max_delivery: source.parse_or_default("MAX_DELIVERY_TIME", 120),
            },
            retry: RetrySettings {
                max_attempts: source.parse_or_default("RETRY_MAX_ATTEMPTS", 3u32).max(1),
                initial_delay: Duration::from_millis(
                    source.parse_or_default("RETRY_INITIAL_DELAY_MS", 1_000),
                ),
                backoff_multiplier: source.parse_or_default("RETRY_BACKOFF_MULTIPLIER", 2.0),
                max_delay: Duration::from_millis(
                    source.parse_or_default("RETRY_MAX_DELAY_MS", 10_000),
                ),
            },
            polling: PollingSettings {
                interval: Duration::from_millis(
                    source.parse_or_default("POLL_INTERVAL_MS", 30_000u64).max(1),
                ),
                max_duration: Duration::from_millis(
                    source.parse_or_default("POLL_MAX_DURATION_MS", 14_400_000),
                ),
            },
            debug: source.debug,
            http_port: source.parse_or_default("HTTP_PORT", 3000),
            log_level: source.string_or("LOG_LEVEL", "info"),
            log_json: source.get("LOG_FORMAT").as_deref() == Some("json"),
            cache_dir: source.string_or("CACHE_DIR", ".delivery-cache"),
            warnings: Vec::new(),
        };
        config.warnings = source.warnings.into_inner();

        Ok(config)
    }

    /// Base URL used for courier requests; falls back to the public endpoint
    /// when `CHOT_API_BASE` is unset.
    pub fn api_base_url(&self) -> &str {
        self.api_base.as_deref().unwrap_or(DEFAULT_API_BASE)
    }

    pub fn validate(&self) -> ConfigValidation {
        let mut errors = Vec::new();

        if self.api_base.as_deref().is_none_or(|v| v.trim().is_empty()) {
            errors.push("CHOT_API_BASE not configured".to_string());
        }
        if self.api_key.trim().is_empty() {
            errors.push("CHOT_API_KEY not configured".to_string());
        }
        if self.merchant_id.trim().is_empty() {
            errors.push("CHOT_MERCHANT_ID not configured".to_string());
        }

        ConfigValidation {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    /// Logs the warnings gathered while loading. Each key is reported at
    /// most once per process, however often this is called.
    pub fn log_warnings(&self) {
        let warned = WARNED.get_or_init(|| Mutex::new(HashSet::new()));
        self.log_warnings_once(warned);
    }

    fn log_warnings_once(&self, warned: &Mutex<HashSet<String>>) {
        for warning in &self.warnings {
            if !first_time(warned, warning.key()) {
                continue;
            }
            match warning {
                ConfigWarning::Unset { key } => warn!(key = %key, "environment variable not set"),
                ConfigWarning::Invalid {
                    key,
                    value,
                    error,
                    fallback,
                } => warn!(
                    key = %key,
                    value = %value,
                    error = %error,
                    fallback = %fallback,
                    "invalid config value"
                ),
                ConfigWarning::Defaulted { key, default } => {
                    debug!(key = %key, default = %default, "config value not set, using default")
                }
            }
        }
    }

    pub fn ensure_valid(&self) -> Result<(), AppError> {
        let validation = self.validate();
        if validation.is_valid {
            Ok(())
        } else {
            Err(AppError::Configuration(validation.errors.join(", ")))
        }
    }
}

/// Something worth telling the operator about the loaded configuration.
/// Collected while parsing and logged by [`Config::log_warnings`] once a
/// subscriber is installed.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigWarning {
    Unset {
        key: String,
    },
    Invalid {
        key: String,
        value: String,
        error: String,
        fallback: String,
    },
    Defaulted {
        key: String,
        default: String,
    },
}

impl ConfigWarning {
    fn key(&self) -> &str {
        match self {
            ConfigWarning::Unset { key }
            | ConfigWarning::Invalid { key, .. }
            | ConfigWarning::Defaulted { key, .. } => key,
        }
    }
}

struct Source<F> {
    lookup: F,
    debug: bool,
    warnings: RefCell<Vec<ConfigWarning>>,
}

impl<F> Source<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
    }

    fn required(&self, key: &str) -> Option<String> {
        let value = self.get(key);
        if value.is_none() {
            self.push(ConfigWarning::Unset {
                key: key.to_string(),
            });
        }
        value
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        match self.get(key) {
            Some(value) => value,
            None => {
                self.note_default(key, &default);
                default.to_string()
            }
        }
    }

    fn parse_or_default<T>(&self, key: &str, default: T) -> T
    where
        T: FromStr + std::fmt::Display,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(raw) => match raw.trim().parse::<T>() {
                Ok(value) => value,
                Err(err) => {
                    self.push(ConfigWarning::Invalid {
                        key: key.to_string(),
                        value: raw,
                        error: err.to_string(),
                        fallback: default.to_string(),
                    });
                    default
                }
            },
            None => {
                self.note_default(key, &default);
                default
            }
        }
    }

    fn note_default(&self, key: &str, default: &dyn std::fmt::Display) {
        if self.debug {
            self.push(ConfigWarning::Defaulted {
                key: key.to_string(),
                default: default.to_string(),
            });
        }
    }

    fn push(&self, warning: ConfigWarning) {
        self.warnings.borrow_mut().push(warning);
    }
}

fn first_time(warned: &Mutex<HashSet<String>>, key: &str) -> bool {
    match warned.lock() {
        Ok(mut set) => set.insert(key.to_string()),
        Err(poisoned) => poisoned.into_inner().insert(key.to_string()),
    }
}
