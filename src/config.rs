use {
    crate::{domain::money::Currency, services::payment_orchestrator::CheckoutSettings},
    std::{env, net::SocketAddr, time::Duration},
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend: LedgerBackend,
    pub database_url: Option<String>,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub checkout: CheckoutSettings,
    pub gateway_timeout: Duration,
    pub http_timeout: Duration,
    pub bind_addr: SocketAddr,
    pub outbox_max_attempts: i32,
    pub reconcile_after: Duration,
}

impl AppConfig {
    /// Load from the process environment (after `.env`, if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes `std::env::var`.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| get(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| var(key).ok_or(ConfigError::Missing(key));

        let backend = match var("LEDGER_BACKEND").as_deref() {
            None | Some("postgres") => LedgerBackend::Postgres,
            Some("memory") => LedgerBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "LEDGER_BACKEND",
                    reason: format!("expected postgres or memory, got {other}"),
                });
            }
        };
        let database_url = match backend {
            LedgerBackend::Postgres => Some(required("DATABASE_URL")?),
            LedgerBackend::Memory => var("DATABASE_URL"),
        };

        let currency_raw = var("CHECKOUT_CURRENCY").unwrap_or_else(|| "usd".to_string());
        let currency = Currency::try_from(currency_raw.as_str()).map_err(|e| ConfigError::Invalid {
            key: "CHECKOUT_CURRENCY",
            reason: e.to_string(),
        })?;

        let checkout = CheckoutSettings {
            success_url: var("CHECKOUT_SUCCESS_URL").unwrap_or_else(|| {
                "http://localhost:3000/payments/confirm-session?session_id={CHECKOUT_SESSION_ID}"
                    .to_string()
            }),
            cancel_url: var("CHECKOUT_CANCEL_URL")
                .unwrap_or_else(|| "http://localhost:3000/requests/{REQUEST_ID}".to_string()),
            currency,
        };

        let bind_raw = var("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_addr = bind_raw.parse::<SocketAddr>().map_err(|e| ConfigError::Invalid {
            key: "BIND_ADDR",
            reason: format!("{e}"),
        })?;

        let gateway_timeout = seconds(&var, "GATEWAY_TIMEOUT_SECS", 10)?;
        let http_timeout = seconds(&var, "HTTP_TIMEOUT_SECS", 30)?;
        if http_timeout <= gateway_timeout {
            return Err(ConfigError::Invalid {
                key: "HTTP_TIMEOUT_SECS",
                reason: format!(
                    "must exceed GATEWAY_TIMEOUT_SECS ({}s), got {}s",
                    gateway_timeout.as_secs(),
                    http_timeout.as_secs()
                ),
            });
        }

        Ok(Self {
            backend,
            database_url,
            stripe_secret_key: required("STRIPE_SECRET_KEY")?,
            stripe_webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
            checkout,
            gateway_timeout,
            http_timeout,
            bind_addr,
            outbox_max_attempts: positive(&var, "OUTBOX_MAX_ATTEMPTS", 5)?,
            reconcile_after: seconds(&var, "RECONCILE_AFTER_SECS", 600)?,
        })
    }
}

fn positive<T>(
    var: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let Some(raw) = var(key) else {
        return Ok(default);
    };
    let value: T = raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })?;
    if value <= T::default() {
        return Err(ConfigError::Invalid {
            key,
            reason: "must be greater than zero".into(),
        });
    }
    Ok(value)
}

fn seconds(
    var: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: u64,
) -> Result<Duration, ConfigError> {
    positive(var, key, default).map(Duration::from_secs)
}
