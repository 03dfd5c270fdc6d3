//! Connection configuration for the wallet node.
//!
//! [`RpcConfig`] is the explicit value handed to [`crate::RpcClient`]; the
//! client never reads files or the environment itself. [`NodeConf`] reads the
//! node's own configuration file (`rpcuser`, `rpcpassword`, `rpcport`,
//! `rpcconnect`, `testnet`) so the tool shares the node's credentials
//! instead of inventing its own format.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use tracing::debug;

use crate::error::ConfigError;

/// Name of the node's cookie file inside the (network) data directory.
pub const COOKIE_FILE: &str = ".cookie";

/// Subdirectory of the data directory used by testnet.
pub const TESTNET_SUBDIR: &str = "testnet3";

pub const MAINNET_RPC_PORT: u16 = 8332;
pub const TESTNET_RPC_PORT: u16 = 18332;

/// Default per-call timeout.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Prefix for environment overrides, e.g. `SPENDFROM_RPCPASSWORD`.
pub const ENV_PREFIX: &str = "SPENDFROM";

/// Node software whose data directory and configuration file are used.
///
/// Both keep the Bitcoin RPC ports and cookie layout; only the file names
/// differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeFlavor {
    #[default]
    Truthcoin,
    Bitcoin,
}

impl NodeFlavor {
    /// Configuration file name inside the data directory.
    pub fn conf_file(self) -> &'static str {
        match self {
            Self::Truthcoin => "truthcoin.conf",
            Self::Bitcoin => "bitcoin.conf",
        }
    }

    /// Data directory name under the platform's application data location.
    fn app_dir(self) -> &'static str {
        match self {
            Self::Truthcoin => "Truthcoin",
            Self::Bitcoin => "Bitcoin",
        }
    }

    /// Data directory name under `$HOME` on Unix.
    fn dot_dir(self) -> &'static str {
        match self {
            Self::Truthcoin => ".truthcoin",
            Self::Bitcoin => ".bitcoin",
        }
    }
}

impl FromStr for NodeFlavor {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "truthcoin" => Ok(Self::Truthcoin),
            "bitcoin" => Ok(Self::Bitcoin),
            other => Err(ConfigError::InvalidValue {
                key: "node".into(),
                value: other.to_string(),
            }),
        }
    }
}

/// Which signing RPC the node exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignMethod {
    /// `signrawtransaction` (older nodes).
    #[default]
    Legacy,
    /// `signrawtransactionwithwallet` (newer nodes).
    WithWallet,
}

impl SignMethod {
    pub fn rpc_name(self) -> &'static str {
        match self {
            Self::Legacy => "signrawtransaction",
            Self::WithWallet => "signrawtransactionwithwallet",
        }
    }
}

/// Everything the transport needs to reach the node.
#[derive(Clone)]
pub struct RpcConfig {
    /// Endpoint URL, e.g. `http://127.0.0.1:8332`.
    pub url: String,
    pub user: String,
    pub password: String,
    pub timeout: Duration,
    pub sign_method: SignMethod,
}

impl RpcConfig {
    pub fn new(url: impl Into<String>, user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user: user.into(),
            password: password.into(),
            timeout: DEFAULT_RPC_TIMEOUT,
            sign_method: SignMethod::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_sign_method(mut self, sign_method: SignMethod) -> Self {
        self.sign_method = sign_method;
        self
    }
}

impl fmt::Debug for RpcConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcConfig")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("sign_method", &self.sign_method)
            .finish()
    }
}

/// Settings read from the node configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeConf {
    pub rpc_user: Option<String>,
    pub rpc_password: Option<String>,
    pub rpc_port: Option<u16>,
    pub rpc_connect: Option<String>,
    pub testnet: bool,
}

/// Command-line values that take precedence over the configuration file.
#[derive(Debug, Clone, Default)]
pub struct ConnectionOverrides {
    pub url: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub testnet: bool,
    pub timeout: Option<Duration>,
    pub sign_method: Option<SignMethod>,
}

impl NodeConf {
    /// Read a node configuration file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_sources(path, false)
    }

    /// Like [`NodeConf::load`], with `SPENDFROM_*` environment variables
    /// layered on top of the file.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        Self::load_sources(path, true)
    }

    fn load_sources(path: &Path, with_env: bool) -> Result<Self, ConfigError> {
        let read_err = |e: config::ConfigError| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        };

        let mut builder = config::Config::builder().add_source(
            config::File::from(path)
                .format(config::FileFormat::Ini)
                .required(false),
        );
        if with_env {
            builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX));
        }
        let settings = builder.build().map_err(read_err)?;

        let testnet = match settings.get_string("testnet").ok() {
            Some(v) => parse_flag("testnet", &v)?,
            None => false,
        };
        // Network sections such as `[test]` override top-level keys.
        let section = if testnet { "test" } else { "main" };
        let lookup = |key: &str| {
            settings
                .get_string(&format!("{section}.{key}"))
                .or_else(|_| settings.get_string(key))
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let rpc_port = match lookup("rpcport") {
            Some(p) => Some(p.parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                key: "rpcport".into(),
                value: p.clone(),
            })?),
            None => None,
        };

        let conf = Self {
            rpc_user: lookup("rpcuser"),
            rpc_password: lookup("rpcpassword"),
            rpc_port,
            rpc_connect: lookup("rpcconnect"),
            testnet,
        };
        debug!(
            path = %path.display(),
            testnet = conf.testnet,
            has_user = conf.rpc_user.is_some(),
            "loaded node configuration"
        );
        Ok(conf)
    }

    /// Combine file settings, overrides, and the cookie file into an [`RpcConfig`].
    ///
    /// Credential precedence: overrides, then `rpcuser`/`rpcpassword`, then
    /// the cookie file in the network data directory.
    pub fn resolve(
        &self,
        data_dir: &Path,
        conf_path: &Path,
        overrides: &ConnectionOverrides,
    ) -> Result<RpcConfig, ConfigError> {
        let testnet = overrides.testnet || self.testnet;
        let url = match &overrides.url {
            Some(u) => u.clone(),
            None => {
                let host = self.rpc_connect.as_deref().unwrap_or("127.0.0.1");
                let port = self.rpc_port.unwrap_or(if testnet {
                    TESTNET_RPC_PORT
                } else {
                    MAINNET_RPC_PORT
                });
                format!("http://{host}:{port}")
            }
        };

        let user = overrides.user.clone().or_else(|| self.rpc_user.clone());
        let password = overrides.password.clone().or_else(|| self.rpc_password.clone());
        let (user, password) = match (user, password) {
            (Some(u), Some(p)) => (u, p),
            _ => {
                let cookie = network_dir(data_dir, testnet).join(COOKIE_FILE);
                if !cookie.exists() {
                    return Err(ConfigError::NoCredentials {
                        conf_path: conf_path.display().to_string(),
                    });
                }
                read_cookie(&cookie)?
            }
        };

        let mut config = RpcConfig::new(url, user, password);
        if let Some(t) = overrides.timeout {
            config = config.with_timeout(t);
        }
        if let Some(m) = overrides.sign_method {
            config = config.with_sign_method(m);
        }
        Ok(config)
    }
}

/// The node's default data directory for this platform.
pub fn default_data_dir(flavor: NodeFlavor) -> Result<PathBuf, ConfigError> {
    if cfg!(target_os = "windows") {
        dirs::data_dir()
            .map(|d| d.join(flavor.app_dir()))
            .ok_or(ConfigError::NoDataDir)
    } else if cfg!(target_os = "macos") {
        dirs::home_dir()
            .map(|h| h.join("Library").join("Application Support").join(flavor.app_dir()))
            .ok_or(ConfigError::NoDataDir)
    } else {
        dirs::home_dir()
            .map(|h| h.join(flavor.dot_dir()))
            .ok_or(ConfigError::NoDataDir)
    }
}

/// Directory holding network-specific files such as the cookie.
pub fn network_dir(data_dir: &Path, testnet: bool) -> PathBuf {
    if testnet {
        data_dir.join(TESTNET_SUBDIR)
    } else {
        data_dir.to_path_buf()
    }
}

/// Read `user:password` from a cookie file.
pub fn read_cookie(path: &Path) -> Result<(String, String), ConfigError> {
    let cookie_err = |reason: String| ConfigError::Cookie {
        path: path.display().to_string(),
        reason,
    };
    let content = std::fs::read_to_string(path).map_err(|e| cookie_err(e.to_string()))?;
    let (user, password) = content
        .trim()
        .split_once(':')
        .ok_or_else(|| cookie_err("expected user:password".into()))?;
    Ok((user.to_string(), password.to_string()))
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim() {
        "1" | "true" => Ok(true),
        "0" | "false" | "" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: other.to_string(),
        }),
    }
}
