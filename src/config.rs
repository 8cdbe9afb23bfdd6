use std::env;

use anyhow::Context;
use chrono::FixedOffset;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub max_connections: u32,
    /// Offset of the store's local clock; slot hours are anchored to it.
    pub slot_offset: FixedOffset,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let max_connections = env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|n| n.parse::<u32>().ok())
            .unwrap_or(10);
        let offset_minutes = env::var("SLOT_UTC_OFFSET_MINUTES")
            .ok()
            .and_then(|m| m.parse::<i32>().ok())
            .unwrap_or(0);
        let slot_offset = FixedOffset::east_opt(offset_minutes * 60)
            .context("SLOT_UTC_OFFSET_MINUTES is out of range")?;
        Ok(Self {
            port,
            database_url,
            host,
            max_connections,
            slot_offset,
        })
    }
}
