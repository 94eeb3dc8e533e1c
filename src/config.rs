use anyhow::Result;
use clap::Parser;
use serde::Deserialize;
use serde_yaml;
use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "booky")]
#[command(about = "Runs the booky admin api", long_about = None)]
pub struct Cli {
    #[arg(short = 'c', long = "config")]
    pub config_path: Option<String>,

    /// Overrides `app.port` from the config file
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,
}

pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".booky")
}

pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.yaml")
}

#[derive(Debug, Deserialize, Clone)]
pub struct App {
    database: String,
    port: u16,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub relative_url_root: String,
    #[serde(default)]
    pub turso_url: Option<String>,
    #[serde(default)]
    pub turso_auth_token: Option<String>,
    #[serde(default = "default_sync_interval")]
    pub sync_interval_seconds: u64,
}

fn default_sync_interval() -> u64 {
    60
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

impl App {
    pub fn get_db(&self) -> &str {
        &self.database
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }

    pub fn set_port(&mut self, port: u16) {
        self.port = port;
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Uploads {
    #[serde(default = "default_store_dir")]
    pub store_dir: String,
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    #[serde(default = "default_checksum_interval")]
    pub checksum_interval_seconds: u64,
    #[serde(default = "default_checksum_batch_size")]
    pub checksum_batch_size: u32,
}

fn default_store_dir() -> String {
    "uploads".to_string()
}

fn default_max_size() -> usize {
    // 256 MiB
    256 * 1024 * 1024
}

fn default_checksum_interval() -> u64 {
    60
}

fn default_checksum_batch_size() -> u32 {
    10
}

impl Default for Uploads {
    fn default() -> Self {
        Uploads {
            store_dir: default_store_dir(),
            max_size: default_max_size(),
            checksum_interval_seconds: default_checksum_interval(),
            checksum_batch_size: default_checksum_batch_size(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default = "default_max_limit")]
    pub max_limit: u32,
}

fn default_limit() -> u32 {
    25
}

fn default_max_limit() -> u32 {
    100
}

impl Default for Pagination {
    fn default() -> Self {
        Pagination {
            limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: App,
    #[serde(default)]
    pub uploads: Uploads,
    #[serde(default)]
    pub pagination: Pagination,
}

impl Config {
    pub fn new(path: &str) -> Result<Self> {
        let cfg = Config::load_config(path)?;
        Ok(cfg)
    }

    /// Builds a config without touching the filesystem, used by tests and
    /// embedders that wire the router themselves.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let yaml_with_env = Config::substitute_env_vars(yaml)?;
        Ok(serde_yaml::from_str(&yaml_with_env)?)
    }

    fn load_config(path: &str) -> Result<Config> {
        let yaml_str = fs::read_to_string(path)?;
        Config::from_yaml(&yaml_str)
    }

    fn substitute_env_vars(yaml_str: &str) -> Result<String> {
        let mut result = yaml_str.to_string();
        let mut offset = 0;

        while let Some(start) = result[offset..].find("${") {
            let actual_start = offset + start;
            if let Some(end) = result[actual_start..].find("}") {
                let var_name = &result[actual_start + 2..actual_start + end];

                // ${VAR:-default}
                let env_value = if let Some(default_start) = var_name.find(":-") {
                    let actual_var = &var_name[..default_start];
                    let default_val = &var_name[default_start + 2..];
                    env::var(actual_var).unwrap_or_else(|_| default_val.to_string())
                } else {
                    env::var(var_name).unwrap_or_else(|_| {
                        tracing::warn!(variable = %var_name, "environment variable not found");
                        String::new()
                    })
                };

                result.replace_range(actual_start..actual_start + end + 1, &env_value);
                offset = actual_start + env_value.len();
            } else {
                break;
            }
        }

        Ok(result)
    }
}
