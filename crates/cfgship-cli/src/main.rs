//! cfgship command line entry point

use std::process::ExitCode;
use std::sync::Arc;

use bytes::Bytes;
use clap::Parser;
use tracing::debug;

use cfgship_common::{
    ACTION_CREATE, ACTION_DELETE, ACTION_DELETE_CFG, ACTION_EXPORT, ACTION_GET, ACTION_INFO,
    ACTION_SET, ACTION_UPDATE_CFG, ACTION_USE, ACTION_VERSION, ACTION_WHICH, CfgError,
};
use cfgship_core::{Commands, ResponseObject, WorkingConfigFile};
use cfgship_persistence::{Options, RocksDbOptions, Settings, ShipperRegistry};

mod config;
mod logging;
mod output;

use config::{CfgCommand, Cli, Command, Configuration, SetArgs};
use logging::{LoggingConfig, init_logging};
use output::render;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let configuration = Configuration::new(&cli)?;

    let _logging_guard = init_logging(&LoggingConfig {
        level: configuration.logging_level(),
        log_dir: configuration.logging_dir(),
    })?;
    cfgship_persistence::metrics::describe_metrics();

    let format = configuration.output_format()?;
    let registry = match &cli.command {
        Command::Version | Command::Use { .. } | Command::Which | Command::Export { .. } => {
            ShipperRegistry::new()
        }
        _ => open_storage(&configuration)?,
    };
    let commands = Commands::new(
        Arc::new(registry),
        WorkingConfigFile::new(configuration.working_file()),
    );

    let storage = configuration.storage_engine();
    let action = action_name(&cli.command);
    let resp = run(&commands, cli.command, &storage)
        .await
        .unwrap_or_else(|e| {
            debug!(action, error = %e, "Command failed");
            ResponseObject::from_error(action, &e)
        });

    if let Some(rendered) = render(&resp, format)? {
        if resp.is_success() || format == output::OutputFormat::Json {
            println!("{rendered}");
        } else {
            eprintln!("{rendered}");
        }
    }

    Ok(if resp.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn open_storage(configuration: &Configuration) -> anyhow::Result<ShipperRegistry> {
    let data_dir = configuration.data_dir();
    std::fs::create_dir_all(&data_dir)?;

    let options = RocksDbOptions {
        block_cache_mb: configuration.block_cache_mb(),
    };
    Ok(ShipperRegistry::with_builtin(&data_dir, &options)?)
}

fn action_name(command: &Command) -> &'static str {
    match command {
        Command::Version => ACTION_VERSION,
        Command::Use { .. } => ACTION_USE,
        Command::Which => ACTION_WHICH,
        Command::Cfg(CfgCommand::Create { .. }) => ACTION_CREATE,
        Command::Cfg(CfgCommand::Delete { .. }) => ACTION_DELETE_CFG,
        Command::Cfg(CfgCommand::Update { .. }) => ACTION_UPDATE_CFG,
        Command::Cfg(CfgCommand::Info { .. }) => ACTION_INFO,
        Command::Set(_) => ACTION_SET,
        Command::Get { .. } => ACTION_GET,
        Command::Delete { .. } => ACTION_DELETE,
        Command::Export { .. } => ACTION_EXPORT,
    }
}

async fn run(commands: &Commands, command: Command, storage: &str) -> Result<ResponseObject, CfgError> {
    let cfg = |name: String| Options::new(name).with_storage(storage);

    match command {
        Command::Version => {
            let mut resp = ResponseObject::new(ACTION_VERSION);
            resp.message = format!("cfgship version {}", env!("CARGO_PKG_VERSION"));
            Ok(resp)
        }
        Command::Use { name } => commands.use_cfg(&name).await,
        Command::Which => commands.which().await,
        Command::Cfg(CfgCommand::Create { name, settings }) => {
            let settings = parse_settings(settings.as_deref())?;
            commands.create_cfg(&cfg(name), &settings).await
        }
        Command::Cfg(CfgCommand::Delete { name }) => commands.delete_cfg(&cfg(name)).await,
        Command::Cfg(CfgCommand::Update { name, settings }) => {
            let settings = parse_settings(Some(&settings))?;
            commands.update_cfg(&cfg(name), &settings).await
        }
        Command::Cfg(CfgCommand::Info { name, settings }) => {
            let settings = settings.as_deref().map(|s| parse_settings(Some(s))).transpose()?;
            commands
                .info(&cfg(name.unwrap_or_default()), settings.as_ref())
                .await
        }
        Command::Set(args) => {
            let opts = set_options(args, storage).await?;
            commands.set_key(&opts).await
        }
        Command::Get { args } => {
            let (name, key) = split_key_args(&args)?;
            commands.get_key(&cfg(name).with_key(key)).await
        }
        Command::Delete { args, condition } => {
            let (name, key) = split_key_args(&args)?;
            let mut opts = cfg(name).with_key(key);
            opts.conditional_value = condition.map(Bytes::from);
            commands.delete_key(&opts).await
        }
        Command::Export { name } => commands.export(&cfg(name.unwrap_or_default())).await,
    }
}

fn parse_settings(raw: Option<&str>) -> Result<Settings, CfgError> {
    match raw {
        Some(raw) => serde_json::from_str(raw).map_err(|e| CfgError::InvalidSettings(e.to_string())),
        None => Ok(Settings::new()),
    }
}

/// Split `[cfg] <key>`; an omitted configuration falls back to the working one
fn split_key_args(args: &[String]) -> Result<(String, String), CfgError> {
    match args {
        [key] => Ok((String::new(), key.clone())),
        [name, key] => Ok((name.clone(), key.clone())),
        _ => Err(CfgError::MissingArguments),
    }
}

/// Build options for `set [cfg] <key> [value]`, reading the value from `--data-file` when given
async fn set_options(args: SetArgs, storage: &str) -> Result<Options, CfgError> {
    let (name, key, value) = match (args.args.as_slice(), &args.data_file) {
        ([key], Some(_)) => (String::new(), key.clone(), None),
        ([name, key], Some(_)) => (name.clone(), key.clone(), None),
        ([key], None) => (String::new(), key.clone(), None),
        ([key, value], None) => (String::new(), key.clone(), Some(value.clone())),
        ([name, key, value], None) => (name.clone(), key.clone(), Some(value.clone())),
        _ => return Err(CfgError::MissingArguments),
    };

    let mut opts = Options::new(name)
        .with_storage(storage)
        .with_key(key)
        .with_ttl(args.ttl);
    opts.value = match (&args.data_file, value) {
        (Some(path), _) => Some(Bytes::from(tokio::fs::read(path).await?)),
        (None, value) => value.map(Bytes::from),
    };
    opts.conditional_value = args.condition.map(Bytes::from);
    Ok(opts)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    fn set_args(args: &[&str], data_file: Option<PathBuf>) -> SetArgs {
        SetArgs {
            args: strings(args),
            ttl: 0,
            condition: None,
            data_file,
        }
    }

    #[test]
    fn test_split_key_args() {
        assert_eq!(
            split_key_args(&strings(&["k"])).unwrap(),
            (String::new(), "k".to_string())
        );
        assert_eq!(
            split_key_args(&strings(&["app", "k"])).unwrap(),
            ("app".to_string(), "k".to_string())
        );
        assert!(matches!(
            split_key_args(&strings(&[])),
            Err(CfgError::MissingArguments)
        ));
    }

    #[tokio::test]
    async fn test_set_options_from_args() {
        let opts = set_options(set_args(&["k", "v"], None), "memory").await.unwrap();
        assert_eq!(opts.cfg_name, "");
        assert_eq!(opts.key, "k");
        assert_eq!(opts.value, Some(Bytes::from_static(b"v")));
        assert_eq!(opts.storage_interface_name, "memory");

        let opts = set_options(set_args(&["app", "k", "v"], None), "rocksdb")
            .await
            .unwrap();
        assert_eq!(opts.cfg_name, "app");

        // Value is validated by the command layer, not here
        let opts = set_options(set_args(&["k"], None), "rocksdb").await.unwrap();
        assert!(opts.value.is_none());
    }

    #[tokio::test]
    async fn test_set_options_from_data_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("value.json");
        std::fs::write(&path, br#"{"replicas": 3}"#).unwrap();

        let opts = set_options(set_args(&["app", "deploy"], Some(path.clone())), "rocksdb")
            .await
            .unwrap();
        assert_eq!(opts.cfg_name, "app");
        assert_eq!(opts.key, "deploy");
        assert_eq!(opts.value, Some(Bytes::from_static(br#"{"replicas": 3}"#)));

        assert!(matches!(
            set_options(set_args(&["app", "k", "v"], Some(path)), "rocksdb").await,
            Err(CfgError::MissingArguments)
        ));
    }

    #[tokio::test]
    async fn test_version_needs_no_storage() {
        let dir = tempfile::TempDir::new().unwrap();
        let commands = Commands::new(
            Arc::new(ShipperRegistry::new()),
            WorkingConfigFile::in_dir(dir.path()),
        );

        let resp = run(&commands, Command::Version, "rocksdb").await.unwrap();
        assert_eq!(resp.action, ACTION_VERSION);
        assert_eq!(
            resp.message,
            format!("cfgship version {}", env!("CARGO_PKG_VERSION"))
        );
    }

    #[test]
    fn test_parse_settings() {
        let settings = parse_settings(Some(r#"{"write_buffer_size": 131072}"#)).unwrap();
        assert_eq!(settings["write_buffer_size"], 131072);
        assert!(parse_settings(None).unwrap().is_empty());
        assert!(matches!(
            parse_settings(Some("not json")),
            Err(CfgError::InvalidSettings(_))
        ));
    }
}
