// SPDX-License-Identifier: AGPL-3.0-or-later

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment at startup. Core logic never
//! reads ambient process state: the environment name is resolved here once
//! and passed explicitly into flag resolution.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `GATE_ENV` | Current environment name (lowercased) | `dev` |
//! | `GATE_KEY_SECRET` | Secret handed to the key resolver | empty |
//! | `GATE_REGISTRY_PATH` | JSON registry snapshot to load at start | none |
//! | `GATE_PROVISION_PATH` | JSON provision table for the static resolver | none |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::env;
use std::path::PathBuf;

/// Environment variable name for the current environment.
pub const GATE_ENV: &str = "GATE_ENV";
/// Environment variable name for the resolver signing secret.
pub const GATE_KEY_SECRET_ENV: &str = "GATE_KEY_SECRET";
/// Environment variable name for the registry snapshot file.
pub const GATE_REGISTRY_PATH_ENV: &str = "GATE_REGISTRY_PATH";
/// Environment variable name for the static provision file.
pub const GATE_PROVISION_PATH_ENV: &str = "GATE_PROVISION_PATH";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Gateway process configuration.
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub key_secret: String,
    pub registry_path: Option<PathBuf>,
    pub provision_path: Option<PathBuf>,
    pub log_format: LogFormat,
}

impl GateConfig {
    pub fn from_env() -> Self {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);
        let environment = env::var(GATE_ENV)
            .unwrap_or_else(|_| "dev".to_string())
            .to_lowercase();
        let key_secret = env::var(GATE_KEY_SECRET_ENV).unwrap_or_default();
        let registry_path = env::var(GATE_REGISTRY_PATH_ENV).ok().map(PathBuf::from);
        let provision_path = env::var(GATE_PROVISION_PATH_ENV).ok().map(PathBuf::from);
        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Self {
            host,
            port,
            environment,
            key_secret,
            registry_path,
            provision_path,
            log_format,
        }
    }
}
