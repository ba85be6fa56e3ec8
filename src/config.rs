use figment::{
    providers::{Env, Format, Json, Toml},
    Figment,
};
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use thiserror::Error;

pub const ENV_PREFIX: &str = "LANBEACON_";

/// Upper bound for every interval setting: one day.
pub const MAX_INTERVAL_SECS: u64 = 86_400;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("`port` must be non-zero")]
    ZeroPort,
    #[error("`{0}` must be greater than zero")]
    NotPositive(&'static str),
    #[error("`{name}` ({value}s) exceeds the {max}s limit")]
    TooLarge {
        name: &'static str,
        value: u64,
        max: u64,
    },
    #[error("`min_interval` ({min}s) must be less than `max_interval` ({max}s)")]
    IntervalOrder { min: u64, max: u64 },
    #[error("`custom` must not be empty")]
    EmptyCustom,
    #[error("invalid `network` {value:?}: {reason}")]
    Network { value: String, reason: String },
}

/// Daemon settings.  Times are whole seconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub broadcast_addr: IpAddr,
    pub port: u16,
    pub min_interval: u64,
    pub max_interval: u64,
    pub avg_seconds: u64,
    #[serde(default = "default_sample_interval")]
    pub sample_interval: u64,
    #[serde(default = "default_peer_timeout")]
    pub peer_timeout: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: u64,
    pub custom: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// CIDR used to pick this node's own address for self-filtering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default = "default_listen_ip")]
    pub listen_ip: IpAddr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_bind: Option<SocketAddr>,
    #[serde(default = "default_warm_up")]
    pub warm_up: bool,
}

fn default_sample_interval() -> u64 {
    5
}

fn default_peer_timeout() -> u64 {
    120
}

fn default_sweep_interval() -> u64 {
    10
}

fn default_listen_ip() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_warm_up() -> bool {
    true
}

impl Config {
    /// Loads `lanbeacon.toml`, then `lanbeacon.json`, then `LANBEACON_*`
    /// environment variables, later sources overriding earlier ones, and
    /// validates the result.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment())
    }

    pub fn figment() -> Figment {
        Figment::new()
            .merge(Toml::file("lanbeacon.toml"))
            .merge(Json::file("lanbeacon.json"))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Config = figment.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::ZeroPort);
        }
        for (name, value) in [
            ("min_interval", self.min_interval),
            ("max_interval", self.max_interval),
            ("avg_seconds", self.avg_seconds),
            ("sample_interval", self.sample_interval),
            ("peer_timeout", self.peer_timeout),
            ("sweep_interval", self.sweep_interval),
        ] {
            if value == 0 {
                return Err(ConfigError::NotPositive(name));
            }
            if value > MAX_INTERVAL_SECS {
                return Err(ConfigError::TooLarge {
                    name,
                    value,
                    max: MAX_INTERVAL_SECS,
                });
            }
        }
        if self.min_interval >= self.max_interval {
            return Err(ConfigError::IntervalOrder {
                min: self.min_interval,
                max: self.max_interval,
            });
        }
        if self.custom.trim().is_empty() {
            return Err(ConfigError::EmptyCustom);
        }
        self.network()?;
        Ok(())
    }

    pub fn network(&self) -> Result<Option<IpNetwork>, ConfigError> {
        self.network
            .as_deref()
            .map(|value| {
                value.parse().map_err(|e: ipnetwork::IpNetworkError| ConfigError::Network {
                    value: value.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    pub fn broadcast_target(&self) -> SocketAddr {
        SocketAddr::new(self.broadcast_addr, self.port)
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_ip, self.port)
    }

    pub fn jitter_bounds(&self) -> (Duration, Duration) {
        (
            Duration::from_secs(self.min_interval),
            Duration::from_secs(self.max_interval),
        )
    }

    pub fn averaging_window(&self) -> Duration {
        Duration::from_secs(self.avg_seconds)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval)
    }

    pub fn peer_timeout(&self) -> Duration {
        Duration::from_secs(self.peer_timeout)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval)
    }
}
