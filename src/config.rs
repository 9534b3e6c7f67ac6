use std::env;

use crate::crypto::MasterKey;

/// Per-IP request budgets for the public surface.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub standard_rpm: u32,
    pub relaxed_rpm: u32,
}

#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub master_key: MasterKey,
    pub rate_limit: RateLimitConfig,
    /// Seconds between expiry sweep passes (0 = disabled)
    pub sweep_interval_secs: u64,
    pub dev_mode: bool,
}

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("LICENSOR_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        // The master key protects encrypted fields at rest. In dev mode a
        // missing key falls back to an ephemeral one; in production it is
        // required.
        let master_key = match env::var("LICENSOR_MASTER_KEY") {
            Ok(encoded) => MasterKey::from_base64(&encoded)
                .expect("LICENSOR_MASTER_KEY is not a valid base64-encoded 32-byte key"),
            Err(_) if dev_mode => {
                tracing::warn!(
                    "LICENSOR_MASTER_KEY not set; using an ephemeral key (dev mode only). \
                     Encrypted fields will be unreadable after restart."
                );
                MasterKey::from_base64(&MasterKey::generate())
                    .expect("generated master key is valid")
            }
            Err(_) => panic!("LICENSOR_MASTER_KEY must be set (base64-encoded 32-byte key)"),
        };

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "licensor.db".to_string()),
            master_key,
            rate_limit: RateLimitConfig {
                standard_rpm: env_u32("RATE_LIMIT_STANDARD_RPM", 60),
                relaxed_rpm: env_u32("RATE_LIMIT_RELAXED_RPM", 120),
            },
            sweep_interval_secs: env::var("SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            dev_mode,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
