//! Runtime configuration read from the environment (and `.env` when present)
use super::logging::LogConfig;
use anyhow::Context;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_DB_PATH: &str = "bookswap.db";
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:4000";

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub listen_addr: SocketAddr,
    pub log: LogConfig,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        // a missing .env file is fine
        dotenvy::dotenv().ok();

        let db_path = env::var("BOOKSWAP_DB_PATH").unwrap_or_else(|_| DEFAULT_DB_PATH.into());
        let listen_addr = env::var("BOOKSWAP_LISTEN_ADDR")
            .unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.into());

        Ok(Self {
            db_path: PathBuf::from(db_path),
            listen_addr: listen_addr.parse().with_context(|| {
                format!("BOOKSWAP_LISTEN_ADDR is not a socket address: {listen_addr}")
            })?,
            log: LogConfig::from_env(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let addr: SocketAddr = DEFAULT_LISTEN_ADDR.parse().unwrap();
        assert_eq!(addr.port(), 4000);
    }
}
