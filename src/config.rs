use std::env;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

const DEFAULT_TIMEZONE: &str = "Asia/Taipei";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_name: String,
    pub environment: String,
    pub api_prefix: String,
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub rate_limit_enabled: bool,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst_size: u32,
    pub database_url: Option<String>,
    pub db_pool_max_connections: u32,
    pub db_pool_acquire_timeout_seconds: u64,
    pub pms_api_base_url: Option<String>,
    pub pms_timeout_seconds: u64,
    pub bot_data_dir: PathBuf,
    pub bot_store_cache_ttl_seconds: u64,
    pub walk_in_ledger_path: PathBuf,
    pub room_type_table_path: Option<PathBuf>,
    pub hotel_timezone: Tz,
    pub ack_reset_hour: u32,
    pub walk_in_purge_hour: u32,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            app_name: env_or("APP_NAME", "Front Desk API"),
            environment: env_or("ENVIRONMENT", "development"),
            api_prefix: normalize_prefix(&env_or("API_PREFIX", "/api")),
            host: env_or("HOST", "0.0.0.0"),
            port: env_parse_or("PORT", 3000),
            cors_origins: parse_csv(&env_or("CORS_ORIGINS", "http://localhost:5002")),
            rate_limit_enabled: env_parse_bool_or("RATE_LIMIT_ENABLED", true),
            rate_limit_per_second: env_parse_or("RATE_LIMIT_PER_SECOND", 10),
            rate_limit_burst_size: env_parse_or("RATE_LIMIT_BURST_SIZE", 100),
            database_url: env_opt("DATABASE_URL"),
            db_pool_max_connections: env_parse_or("DB_POOL_MAX_CONNECTIONS", 5),
            db_pool_acquire_timeout_seconds: env_parse_or("DB_POOL_ACQUIRE_TIMEOUT_SECONDS", 5),
            pms_api_base_url: env_opt("PMS_API_BASE_URL").map(|url| trim_base_url(&url)),
            pms_timeout_seconds: clamp_pms_timeout(env_parse_or("PMS_TIMEOUT_SECONDS", 5)),
            bot_data_dir: PathBuf::from(env_or("BOT_DATA_DIR", "data/chat_logs")),
            bot_store_cache_ttl_seconds: env_parse_or("BOT_STORE_CACHE_TTL_SECONDS", 5),
            walk_in_ledger_path: PathBuf::from(env_or(
                "WALK_IN_LEDGER_PATH",
                "data/same_day_bookings.json",
            )),
            room_type_table_path: env_opt("ROOM_TYPE_TABLE_PATH").map(PathBuf::from),
            hotel_timezone: parse_timezone(env_opt("HOTEL_TIMEZONE")),
            ack_reset_hour: env_parse_or("ACK_RESET_HOUR", 23u32).min(23),
            walk_in_purge_hour: env_parse_or("WALK_IN_PURGE_HOUR", 3u32).min(23),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.trim().eq_ignore_ascii_case("production")
    }

    pub fn guest_orders_path(&self) -> PathBuf {
        self.bot_data_dir.join("guest_orders.json")
    }

    pub fn user_profiles_path(&self) -> PathBuf {
        self.bot_data_dir.join("user_profiles.json")
    }

    /// Current wall-clock time at the hotel.
    pub fn local_now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.hotel_timezone)
    }

    /// The hotel's calendar day; check-in lists and purges key off this, not UTC.
    pub fn local_today(&self) -> NaiveDate {
        self.local_now().date_naive()
    }
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_parse_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    env_opt(key)
        .and_then(|raw| raw.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_parse_bool_or(key: &str, default: bool) -> bool {
    match env_opt(key).as_deref().map(str::to_ascii_lowercase) {
        Some(value) if value == "1" || value == "true" || value == "yes" || value == "on" => true,
        Some(value) if value == "0" || value == "false" || value == "no" || value == "off" => false,
        Some(_) => default,
        None => default,
    }
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn parse_timezone(raw: Option<String>) -> Tz {
    raw.as_deref()
        .and_then(|name| name.parse::<Tz>().ok())
        .unwrap_or_else(|| {
            DEFAULT_TIMEZONE
                .parse::<Tz>()
                .unwrap_or(chrono_tz::Asia::Taipei)
        })
}

/// PMS calls must stay bounded between 3 and 5 seconds.
fn clamp_pms_timeout(seconds: u64) -> u64 {
    seconds.clamp(3, 5)
}

fn trim_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn normalize_prefix(raw: &str) -> String {
    let mut prefix = raw.trim().to_string();
    if prefix.is_empty() {
        return "/api".to_string();
    }
    if !prefix.starts_with('/') {
        prefix.insert(0, '/');
    }
    while prefix.ends_with('/') && prefix.len() > 1 {
        prefix.pop();
    }
    prefix
}
