// Command line arguments and layered application configuration
// Precedence, lowest first: config file, CFGSHIP_* environment variables, command line flags

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use config::{Config, Environment};

use cfgship_common::{DEFAULT_STORAGE_ENGINE, WORKING_CFG_FILE};

use crate::output::OutputFormat;

pub const DEFAULT_CONFIG_FILE: &str = "conf/cfgship.yml";

pub const STORAGE_ENGINE: &str = "storage.engine";
pub const STORAGE_DATA_DIR: &str = "storage.data_dir";
pub const STORAGE_BLOCK_CACHE_MB: &str = "storage.block_cache_mb";
pub const CLI_FORMAT: &str = "cli.format";
pub const CLI_WORKING_FILE: &str = "cli.working_file";
pub const LOGGING_LEVEL: &str = "logging.level";
pub const LOGGING_DIR: &str = "logging.dir";

/// Versioned key-value configuration store
#[derive(Debug, Parser)]
#[command(name = "cfgship", version, about)]
pub struct Cli {
    /// Configuration file (defaults to conf/cfgship.yml when present)
    #[arg(short = 'c', long = "config", env = "CFGSHIP_CONFIG", global = true)]
    pub config_file: Option<PathBuf>,

    /// Output format for responses (human|json|silent)
    #[arg(short = 'f', long = "format", global = true)]
    pub format: Option<String>,

    /// Storage engine to use
    #[arg(short = 's', long = "storage", global = true)]
    pub storage: Option<String>,

    /// Data directory of the embedded storage engine
    #[arg(long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the version number
    Version,

    /// Use a configuration for all following commands at this path
    Use { name: String },

    /// Show the configuration currently in use at this path
    Which,

    /// Manage configurations
    #[command(subcommand)]
    Cfg(CfgCommand),

    /// Set a key value: [cfg] <key> [value]
    Set(SetArgs),

    /// Get a key value: [cfg] <key>
    Get {
        #[arg(num_args = 1..=2, required = true)]
        args: Vec<String>,
    },

    /// Delete a key: [cfg] <key>
    Delete {
        #[arg(num_args = 1..=2, required = true)]
        args: Vec<String>,

        /// Only delete when the current value equals this
        #[arg(long)]
        condition: Option<String>,
    },

    /// Export an entire configuration
    Export { name: Option<String> },
}

#[derive(Debug, Args)]
pub struct SetArgs {
    #[arg(num_args = 1..=3, required = true)]
    pub args: Vec<String>,

    /// Time to live in seconds (0 is no TTL)
    #[arg(short = 't', long, default_value_t = 0)]
    pub ttl: i64,

    /// Only write when the current value equals this
    #[arg(long)]
    pub condition: Option<String>,

    /// Read the value from a file
    #[arg(short = 'd', long = "data-file")]
    pub data_file: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum CfgCommand {
    /// Create a configuration, optionally with engine settings as JSON
    Create { name: String, settings: Option<String> },

    /// Delete a configuration and all of its keys
    Delete { name: String },

    /// Adjust engine settings of a configuration
    Update { name: String, settings: String },

    /// Version, modification time and state of a configuration
    Info {
        name: Option<String>,

        /// Engine settings (JSON) to apply before reading
        #[arg(long)]
        settings: Option<String>,
    },
}

/// Application configuration loaded from the config file, environment and flags
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    pub fn new(cli: &Cli) -> anyhow::Result<Self> {
        let file = cli
            .config_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let mut builder = Config::builder()
            .add_source(config::File::from(file).required(cli.config_file.is_some()))
            .add_source(
                Environment::with_prefix("CFGSHIP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Some(v) = &cli.format {
            builder = builder.set_override(CLI_FORMAT, v.as_str())?;
        }
        if let Some(v) = &cli.storage {
            builder = builder.set_override(STORAGE_ENGINE, v.as_str())?;
        }
        if let Some(v) = &cli.data_dir {
            builder = builder.set_override(STORAGE_DATA_DIR, v.to_string_lossy().as_ref())?;
        }

        Ok(Configuration {
            config: builder.build()?,
        })
    }

    // ========================================================================
    // Storage Configuration
    // ========================================================================

    pub fn storage_engine(&self) -> String {
        self.config
            .get_string(STORAGE_ENGINE)
            .unwrap_or(DEFAULT_STORAGE_ENGINE.to_string())
    }

    pub fn data_dir(&self) -> PathBuf {
        self.config
            .get_string(STORAGE_DATA_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(format!("{}/.cfgship/data", home))
            })
    }

    pub fn block_cache_mb(&self) -> usize {
        self.config
            .get_int(STORAGE_BLOCK_CACHE_MB)
            .ok()
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(64)
    }

    // ========================================================================
    // CLI Configuration
    // ========================================================================

    pub fn output_format(&self) -> anyhow::Result<OutputFormat> {
        match self.config.get_string(CLI_FORMAT) {
            Ok(v) => v.parse(),
            Err(_) => Ok(OutputFormat::default()),
        }
    }

    pub fn working_file(&self) -> PathBuf {
        self.config
            .get_string(CLI_WORKING_FILE)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(WORKING_CFG_FILE))
    }

    // ========================================================================
    // Logging Configuration
    // ========================================================================

    pub fn logging_level(&self) -> String {
        self.config
            .get_string(LOGGING_LEVEL)
            .unwrap_or("warn".to_string())
    }

    pub fn logging_dir(&self) -> Option<PathBuf> {
        self.config.get_string(LOGGING_DIR).ok().map(PathBuf::from)
    }
}
