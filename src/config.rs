use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;
use crate::models::user::UserId;

/// Only for local runs and tests; production must set `ENCRYPTION_KEY`.
const DEV_ENCRYPTION_KEY: &str = "dev-only-key-change-me-32-bytes!";

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub dispatch_queue_size: usize,
    pub event_buffer_size: usize,
    pub offer_fanout: usize,
    pub rebroadcast_after: Duration,
    pub max_rebroadcasts: u32,
    pub session_ttl: Duration,
    pub encryption_key: String,
    pub operator_ids: Vec<UserId>,
    pub tariffs_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            dispatch_queue_size: 1024,
            event_buffer_size: 1024,
            offer_fanout: 10,
            rebroadcast_after: Duration::from_secs(60),
            max_rebroadcasts: 3,
            session_ttl: Duration::from_secs(30 * 60),
            encryption_key: DEV_ENCRYPTION_KEY.to_string(),
            operator_ids: Vec::new(),
            tariffs_path: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            dispatch_queue_size: parse_or_default("DISPATCH_QUEUE_SIZE", 1024)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            offer_fanout: parse_or_default("OFFER_FANOUT", 10)?,
            rebroadcast_after: Duration::from_secs(parse_or_default("REBROADCAST_AFTER_SECS", 60)?),
            max_rebroadcasts: parse_or_default("MAX_REBROADCASTS", 3)?,
            session_ttl: Duration::from_secs(parse_or_default("SESSION_TTL_SECS", 1800)?),
            encryption_key: env::var("ENCRYPTION_KEY")
                .map_err(|_| AppError::Internal("ENCRYPTION_KEY is not set".to_string()))?,
            operator_ids: operator_ids_from_env()?,
            tariffs_path: env::var("TARIFFS_PATH").ok().map(PathBuf::from),
        })
    }
}

/// Re-read on every operator reload, so edits to `.env` are picked up too.
pub fn operator_ids_from_env() -> Result<Vec<UserId>, AppError> {
    let _ = dotenvy::dotenv();

    match env::var("OPERATOR_IDS") {
        Ok(raw) => parse_id_list(&raw),
        Err(_) => Ok(Vec::new()),
    }
}

fn parse_id_list(raw: &str) -> Result<Vec<UserId>, AppError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<UserId>()
                .map_err(|err| AppError::Internal(format!("invalid OPERATOR_IDS entry {part}: {err}")))
        })
        .collect()
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::parse_id_list;

    #[test]
    fn id_list_tolerates_spaces_and_trailing_commas() {
        assert_eq!(parse_id_list(" 1, 22 ,333,").unwrap(), vec![1, 22, 333]);
        assert!(parse_id_list("").unwrap().is_empty());
    }

    #[test]
    fn id_list_rejects_garbage() {
        assert!(parse_id_list("1,abc").is_err());
    }
}
