use std::{env, fmt::Display, str::FromStr, time::Duration};

use tracing::{info, warn};

use crate::{rate_limit::RateLimitConfig, totp::TotpConfig};

pub struct Config {
    pub port: u16,
    pub redis_url: String,
    pub totp_period: u64,
    pub totp_digits: u32,
    pub totp_window: u64,
    pub secret_length: usize,
    pub rate_max_requests: u32,
    pub rate_window_seconds: u64,
    pub checkin_max_requests: u32,
    pub checkin_window_seconds: u64,
    pub tolerance_hours: i64,
}

impl Config {
    pub fn load() -> Self {
        Self {
            port: try_load("RUST_PORT", "3000"),
            redis_url: try_load("REDIS_URL", "redis://127.0.0.1:6379"),
            totp_period: try_load("TOTP_PERIOD_SECONDS", "30"),
            totp_digits: try_load("TOTP_DIGITS", "6"),
            totp_window: try_load("TOTP_VERIFY_WINDOW", "1"),
            secret_length: try_load("TOTP_SECRET_LENGTH", "32"),
            rate_max_requests: try_load("RATE_MAX_REQUESTS", "100"),
            rate_window_seconds: try_load("RATE_WINDOW_SECONDS", "60"),
            // Verification endpoints get a much stricter budget than the
            // general API surface.
            checkin_max_requests: try_load("CHECKIN_MAX_REQUESTS", "5"),
            checkin_window_seconds: try_load("CHECKIN_WINDOW_SECONDS", "60"),
            tolerance_hours: try_load("CHECKIN_TOLERANCE_HOURS", "2"),
        }
    }

    pub fn totp(&self) -> TotpConfig {
        TotpConfig {
            period: self.totp_period,
            digits: self.totp_digits,
            window: self.totp_window,
        }
    }

    pub fn general_rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_requests: self.rate_max_requests,
            time_window: Duration::from_secs(self.rate_window_seconds),
        }
    }

    pub fn checkin_rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_requests: self.checkin_max_requests,
            time_window: Duration::from_secs(self.checkin_window_seconds),
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}
