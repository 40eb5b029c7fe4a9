use std::{env, time::Duration};

pub const DEFAULT_GUEST_CART_DATABASE_URL: &str = "sqlite://guest_cart.db";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_url: String,
    pub guest_cart_database_url: String,
    pub session_token: Option<String>,
    pub request_timeout: Duration,
    pub timings: Timings,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let api_url = env::var("MARKETPLACE_API_URL")?;
        let guest_cart_database_url = guest_cart_database_url();
        let session_token = env::var("SESSION_TOKEN").ok().filter(|t| !t.trim().is_empty());
        let request_timeout = env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(15));
        Ok(Self {
            api_url,
            guest_cart_database_url,
            session_token,
            request_timeout,
            timings: Timings::default(),
        })
    }
}

pub fn guest_cart_database_url() -> String {
    env::var("GUEST_CART_DATABASE_URL")
        .unwrap_or_else(|_| DEFAULT_GUEST_CART_DATABASE_URL.to_string())
}

/// Fixed intervals driving the cooperative timers.
#[derive(Debug, Clone, Copy)]
pub struct Timings {
    pub reservation_tick: Duration,
    pub expiry_sweep: Duration,
    pub consistency_poll: Duration,
    pub input_debounce: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            reservation_tick: Duration::from_secs(1),
            expiry_sweep: Duration::from_secs(5),
            consistency_poll: Duration::from_secs(30),
            input_debounce: Duration::from_millis(400),
        }
    }
}
