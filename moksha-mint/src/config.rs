use std::{env, net::SocketAddr, path::PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct MintConfig {
    pub info: MintInfoConfig,
    pub build: BuildConfig,
    pub lightning_fee: LightningFeeConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub privatekey: String,
    pub derivation_path: Option<String>,
    /// Parts-per-thousand input fee applied to the mint's own keysets, ceiling-rounded per
    /// NUT-05 when charged against a set of inputs.
    pub input_fee_ppk: u64,
    /// Lifetime of a freshly created mint/melt quote, in seconds.
    pub quote_ttl: i64,
}

impl Default for MintConfig {
    fn default() -> Self {
        Self {
            info: MintInfoConfig::default(),
            build: BuildConfig::default(),
            lightning_fee: LightningFeeConfig::default(),
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            privatekey: String::new(),
            derivation_path: None,
            input_fee_ppk: 0,
            quote_ttl: 1800,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct DatabaseConfig {
    pub db_url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_url: String::new(),
            max_connections: 10,
        }
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            db_url: env::var("MINT_DB_URL").unwrap_or(default.db_url),
            max_connections: env_or_default("MINT_DB_MAX_CONNECTIONS", default.max_connections),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ServerConfig {
    pub host_port: SocketAddr,
    pub serve_wallet_path: Option<PathBuf>,
    pub api_prefix: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host_port: "[::]:3338".to_string().parse().expect("invalid host port"),
            serve_wallet_path: None,
            api_prefix: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let server_config_default = ServerConfig::default();

        ServerConfig {
            host_port: env_or_default("MINT_HOST_PORT", server_config_default.host_port),
            serve_wallet_path: env::var("MINT_SERVE_WALLET_PATH").ok().map(PathBuf::from),
            api_prefix: env::var("MINT_API_PREFIX").ok(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct MintInfoConfig {
    pub name: Option<String>,
    #[serde(default = "default_version")]
    pub version: bool,
    pub description: Option<String>,
    pub description_long: Option<String>,
    pub contact: Option<Vec<Vec<String>>>,
    pub motd: Option<String>,
}

fn default_version() -> bool {
    true
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct BuildConfig {
    pub commit_hash: Option<String>,
    pub build_time: Option<String>,
    pub cargo_pkg_version: Option<String>,
}

impl BuildConfig {
    pub fn from_env() -> Self {
        Self {
            commit_hash: env::var("COMMITHASH").ok(),
            build_time: env::var("BUILDTIME").ok(),
            cargo_pkg_version: Some(env!("CARGO_PKG_VERSION").to_owned()),
        }
    }

    pub fn full_version(&self) -> String {
        format!(
            "{}-{}",
            self.cargo_pkg_version
                .as_ref()
                .unwrap_or(&"unknown".to_string()),
            self.commit_hash.as_ref().unwrap_or(&"unknown".to_string())
        )
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LightningFeeConfig {
    pub fee_percent: f32,
    pub fee_reserve_min: u64,
}

impl LightningFeeConfig {
    pub fn new(fee_percent: f32, fee_reserve_min: u64) -> Self {
        Self {
            fee_percent,
            fee_reserve_min,
        }
    }

    pub fn from_env() -> Self {
        let fee_config_default = LightningFeeConfig::default();

        LightningFeeConfig {
            fee_percent: env_or_default("LIGHTNING_FEE_PERCENT", fee_config_default.fee_percent),
            fee_reserve_min: env_or_default(
                "LIGHTNING_RESERVE_FEE_MIN",
                fee_config_default.fee_reserve_min,
            ),
        }
    }
}

impl From<(f32, u64)> for LightningFeeConfig {
    fn from(tuple: (f32, u64)) -> Self {
        Self {
            fee_percent: tuple.0,
            fee_reserve_min: tuple.1,
        }
    }
}

impl Default for LightningFeeConfig {
    fn default() -> Self {
        Self {
            fee_percent: 1.0,
            fee_reserve_min: 4000,
        }
    }
}

fn env_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub fn input_fee_ppk_from_env() -> u64 {
    env_or_default("MINT_INPUT_FEE_PPK", 0)
}

pub fn quote_ttl_from_env() -> i64 {
    env_or_default("MINT_QUOTE_TTL", 1800)
}
