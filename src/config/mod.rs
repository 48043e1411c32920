use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

// Главная структура конфигурации - контейнер для всех настроек
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub reservation: ReservationConfig,
    pub sweeper: SweeperConfig,
}

// Настройки приложения
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
}

// Настройки базы данных. Без DATABASE_URL сервис работает на хранилище в памяти
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub pool_size: u32,
}

// Правила удержания и продажи мест
#[derive(Debug, Clone, Deserialize)]
pub struct ReservationConfig {
    pub hold_ttl_secs: u64,
    pub lock_timeout_ms: u64,
    pub convenience_fee_bps: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SweeperConfig {
    pub interval_secs: u64,
}

impl ReservationConfig {
    pub fn hold_ttl(&self) -> Duration {
        Duration::from_secs(self.hold_ttl_secs)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl SweeperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            hold_ttl_secs: 600,
            lock_timeout_ms: 250,
            convenience_fee_bps: 200,
        }
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self { interval_secs: 5 }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            app: AppConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
                environment: "development".to_string(),
                rust_log: "box_office=debug,tower_http=debug".to_string(),
            },
            database: DatabaseConfig {
                url: None,
                pool_size: 20,
            },
            reservation: ReservationConfig::default(),
            sweeper: SweeperConfig::default(),
        }
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parsed<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { key, value: raw }),
        Err(_) => Ok(default),
    }
}

// Нулевые значения для таймаутов и интервалов не имеют смысла
fn positive(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    let value = parsed(key, default)?;
    if value == 0 {
        return Err(ConfigError::Invalid { key, value: "0".to_string() });
    }
    Ok(value)
}

/// Сбор больше 100% считается ошибкой настройки.
pub const MAX_CONVENIENCE_FEE_BPS: u32 = 10_000;

fn fee_bps(value: u32) -> Result<u32, ConfigError> {
    if value > MAX_CONVENIENCE_FEE_BPS {
        return Err(ConfigError::Invalid {
            key: "CONVENIENCE_FEE_BPS",
            value: value.to_string(),
        });
    }
    Ok(value)
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        Ok(Config {
            app: AppConfig {
                host: var_or("HOST", &defaults.app.host),
                port: parsed("PORT", defaults.app.port)?,
                environment: var_or("ENVIRONMENT", &defaults.app.environment),
                rust_log: var_or("RUST_LOG", &defaults.app.rust_log),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").ok().filter(|u| !u.trim().is_empty()),
                pool_size: parsed("DB_POOL_SIZE", defaults.database.pool_size)?,
            },
            reservation: ReservationConfig {
                hold_ttl_secs: positive("HOLD_TTL_SECS", defaults.reservation.hold_ttl_secs)?,
                lock_timeout_ms: positive("LOCK_TIMEOUT_MS", defaults.reservation.lock_timeout_ms)?,
                convenience_fee_bps: fee_bps(parsed("CONVENIENCE_FEE_BPS", defaults.reservation.convenience_fee_bps)?)?,
            },
            sweeper: SweeperConfig {
                interval_secs: positive("SWEEP_INTERVAL_SECS", defaults.sweeper.interval_secs)?,
            },
        })
    }

    pub fn is_production(&self) -> bool {
        self.app.environment.eq_ignore_ascii_case("production")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_box_office_rules() {
        let config = Config::default();
        assert_eq!(config.reservation.hold_ttl(), Duration::from_secs(600));
        assert_eq!(config.reservation.lock_timeout(), Duration::from_millis(250));
        assert_eq!(config.reservation.convenience_fee_bps, 200);
        assert_eq!(config.sweeper.interval(), Duration::from_secs(5));
        assert!(config.database.url.is_none());
        assert!(!config.is_production());
    }

    #[test]
    fn fee_rate_is_capped_at_full_price() {
        assert_eq!(fee_bps(200).unwrap(), 200);
        assert_eq!(fee_bps(MAX_CONVENIENCE_FEE_BPS).unwrap(), MAX_CONVENIENCE_FEE_BPS);
        assert!(matches!(
            fee_bps(MAX_CONVENIENCE_FEE_BPS + 1),
            Err(ConfigError::Invalid { key: "CONVENIENCE_FEE_BPS", .. })
        ));
    }

    // Единственный тест, трогающий окружение, чтобы не гоняться с другими
    #[test]
    fn invalid_numbers_are_reported() {
        env::set_var("HOLD_TTL_SECS", "ten minutes");
        let err = Config::from_env().unwrap_err();
        env::remove_var("HOLD_TTL_SECS");

        match err {
            ConfigError::Invalid { key, value } => {
                assert_eq!(key, "HOLD_TTL_SECS");
                assert_eq!(value, "ten minutes");
            }
        }
    }
}
