// Copyright (c) 2026 Bilinear Labs
// SPDX-License-Identifier: MIT

//! Module that handles the configuration of the application.

use crate::{
    cli::SyncArgs, constants, engine::EngineSettings, error_codes, events::StreamCatalog,
    metrics::MetricsConfig,
};
use alloy::primitives::Address;
use anyhow::{Context, Result, bail};
use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::Path;

/// Configuration as parsed from a file. Fields are optional to allow partial configs.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct FileConfiguration {
    pub rpc_url: Option<SecretString>,
    pub legacy_exchange_address: Option<String>,
    pub legacy_exchange_start_block: Option<u64>,
    pub swap_address: Option<String>,
    pub swap_start_block: Option<u64>,
    #[serde(default)]
    pub tracked_wallets: Vec<String>,
    pub lookback_blocks: Option<u64>,
    pub tick_window: Option<u64>,
    pub poll_interval: Option<u64>,
    pub api_server_address: Option<String>,
    pub api_server_port: Option<u16>,
}

/// Fully resolved configuration with all defaults applied.
#[derive(Debug, Clone)]
pub struct SyncConfiguration {
    pub rpc_url: SecretString,
    pub catalog: StreamCatalog,
    pub tracked_wallets: Vec<Address>,
    pub engine: EngineSettings,
    pub poll_interval: u64,
    pub api_server_address: String,
    pub api_server_port: u16,
    pub verbosity: u8,
    pub metrics: MetricsConfig,
}

impl SyncConfiguration {
    /// Build the configuration from CLI arguments.
    ///
    /// If a config file is provided, it takes precedence for all file-based fields.
    /// CLI-only options (`verbosity` and the metrics flags) are always taken from the command line.
    ///
    /// # Panics
    ///
    /// This function will log an error and exit the process if the configuration file
    /// cannot be loaded or the resulting configuration is invalid.
    pub fn from_args(args: SyncArgs) -> Self {
        let file_config = if let Some(ref config_file) = args.config {
            if args.verbosity >= 2 {
                println!("Loading configuration from file: {config_file}");
                println!("CLI arguments for file-based fields will be ignored");
            }
            match FileConfiguration::load(config_file) {
                Ok(config) => config,
                Err(ConfigError::FileParse { ref uri, ref cause }) => {
                    eprintln!(
                        "\x1b[31merror:\x1b[0m Failed to parse configuration file: {}",
                        uri.as_deref().unwrap_or(config_file)
                    );
                    eprintln!("Parse error: {cause}");
                    std::process::exit(error_codes::ERROR_CODE_FAILED_TO_LOAD_CONFIGURATION_FROM_FILE);
                }
                Err(e) => {
                    eprintln!(
                        "\x1b[31merror:\x1b[0m Failed to load configuration from file '{config_file}': {e}"
                    );
                    std::process::exit(error_codes::ERROR_CODE_FAILED_TO_LOAD_CONFIGURATION_FROM_FILE);
                }
            }
        } else {
            FileConfiguration::from_args(&args)
        };

        match Self::resolve(file_config, &args) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("\x1b[31merror:\x1b[0m {e:#}");
                std::process::exit(error_codes::ERROR_CODE_WRONG_INPUT_ARGUMENTS);
            }
        }
    }

    /// Parse CLI arguments and build the configuration.
    ///
    /// # Panics
    ///
    /// Exits the process on the same conditions as [SyncConfiguration::from_args].
    pub fn parse() -> Self {
        Self::from_args(SyncArgs::parse())
    }

    /// Applies defaults and validates the addresses of a file based configuration.
    pub fn resolve(file_config: FileConfiguration, args: &SyncArgs) -> Result<Self> {
        let rpc_url = match file_config.rpc_url {
            Some(url) if !url.expose_secret().is_empty() => url,
            _ => bail!("An RPC URL is required (--rpc-url or `rpc_url` in the configuration file)"),
        };

        let catalog = StreamCatalog {
            legacy_exchange: parse_address(
                file_config
                    .legacy_exchange_address
                    .as_deref()
                    .unwrap_or(constants::DEFAULT_LEGACY_EXCHANGE_ADDRESS),
            )
            .context("Invalid legacy exchange address")?,
            swap: parse_address(
                file_config
                    .swap_address
                    .as_deref()
                    .unwrap_or(constants::DEFAULT_SWAP_ADDRESS),
            )
            .context("Invalid swap address")?,
            legacy_exchange_start_block: file_config.legacy_exchange_start_block.unwrap_or_default(),
            swap_start_block: file_config.swap_start_block.unwrap_or_default(),
        };

        let tracked_wallets = file_config
            .tracked_wallets
            .iter()
            .map(|wallet| parse_address(wallet).with_context(|| format!("Invalid tracked wallet {wallet}")))
            .collect::<Result<Vec<_>>>()?;

        let defaults = EngineSettings::default();

        Ok(Self {
            rpc_url,
            catalog,
            tracked_wallets,
            engine: EngineSettings {
                tick_window: file_config.tick_window.unwrap_or(defaults.tick_window),
                lookback_blocks: file_config.lookback_blocks.unwrap_or(defaults.lookback_blocks),
            },
            poll_interval: file_config
                .poll_interval
                .unwrap_or(constants::DEFAULT_POLL_INTERVAL)
                .max(1),
            api_server_address: file_config
                .api_server_address
                .unwrap_or_else(|| constants::DEFAULT_API_SERVER_ADDRESS.to_string()),
            api_server_port: file_config
                .api_server_port
                .unwrap_or(constants::DEFAULT_API_SERVER_PORT),
            verbosity: args.verbosity,
            metrics: MetricsConfig {
                enabled: args.metrics,
                address: args.metrics_address.clone(),
                port: args.metrics_port,
                allow_origin: args.metrics_allow_origin.clone(),
            },
        })
    }

    pub fn api_server(&self) -> String {
        format!("{}:{}", self.api_server_address, self.api_server_port)
    }
}

impl FileConfiguration {
    /// Build from CLI arguments (no config file).
    pub fn from_args(args: &SyncArgs) -> Self {
        Self {
            rpc_url: args.rpc_url.clone().map(SecretString::from),
            legacy_exchange_address: args.legacy_exchange.clone(),
            legacy_exchange_start_block: args.legacy_exchange_start_block,
            swap_address: args.swap_contract.clone(),
            swap_start_block: args.swap_start_block,
            tracked_wallets: args.track.clone().unwrap_or_default(),
            lookback_blocks: Some(args.lookback_blocks),
            tick_window: Some(args.tick_window),
            poll_interval: Some(args.poll_interval),
            api_server_address: args
                .api_server
                .as_ref()
                .and_then(|s| s.split(':').next())
                .map(|s| s.to_string()),
            api_server_port: args
                .api_server
                .as_ref()
                .and_then(|s| s.split(':').nth(1))
                .and_then(|p| p.parse().ok()),
        }
    }

    /// Load from a YAML/JSON file. Variables prefixed with `SANCHO_` override the file.
    pub fn load(config_file: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(Path::new(config_file)))
            .add_source(Environment::with_prefix("SANCHO"))
            .build()?
            .try_deserialize()
    }
}

fn parse_address(value: &str) -> Result<Address> {
    value
        .trim()
        .parse::<Address>()
        .with_context(|| format!("'{value}' is not a valid address"))
}
