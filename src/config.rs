//! Startup configuration, assembled from process environment and an
//! optional `.env` file. Validated once, before the HTTP listener binds.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_players")]
    pub players: u8,
    #[serde(default = "default_trading_duration_secs")]
    pub trading_duration_secs: u64,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_sink_path")]
    pub sink_path: String,
}

fn default_players() -> u8 {
    4
}

fn default_trading_duration_secs() -> u64 {
    120
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_sink_path() -> String {
    "figgie.sqlite3".to_string()
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let raw = config::Config::builder()
            .set_default("players", 4)?
            .set_default("trading_duration_secs", 120)?
            .set_default("bind_addr", "0.0.0.0")?
            .set_default("port", 8080)?
            .set_default("sink_path", "figgie.sqlite3")?
            .add_source(config::Environment::default())
            .build()?;

        let cfg: AppConfig = raw.try_deserialize()?;

        if cfg.players != 4 && cfg.players != 5 {
            anyhow::bail!("players must be 4 or 5, got {}", cfg.players);
        }
        if cfg.trading_duration_secs == 0 {
            anyhow::bail!("trading_duration_secs must be positive");
        }

        Ok(cfg)
    }
}
