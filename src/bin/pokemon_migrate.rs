use std::process::ExitCode;
use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pokemon_migrate::cache::{CacheBackend, FileCache, MemoryCache, NoCache};
use pokemon_migrate::config::{Config, ConfigLoader};
use pokemon_migrate::error::MigrateError;
use pokemon_migrate::http::HttpFetcher;
use pokemon_migrate::migrate::{LogSink, MigrationRun};
use pokemon_migrate::output::{CheckResult, JsonOutput};
use pokemon_migrate::pagination::ParamValue;
use pokemon_migrate::process::{SkipMethod, SkipOn404, is_external};
use pokemon_migrate::source::PokemonSource;

#[derive(Parser)]
#[command(name = "pokemon-migrate")]
#[command(about = "Flatten PokeAPI entities into cached, paginated migration rows")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch the list endpoint and enrich every row")]
    Run(RunArgs),
    #[command(about = "Show or change migration settings")]
    Settings(SettingsArgs),
    #[command(about = "Check whether a remote URL or local path exists")]
    Check(CheckArgs),
}

#[derive(Args)]
struct RunArgs {
    #[arg(long)]
    list_url: Option<String>,

    /// Keep fetched documents in memory only instead of the on-disk cache.
    #[arg(long, conflicts_with = "no_cache")]
    memory_cache: bool,

    /// Fetch every document from the network.
    #[arg(long)]
    no_cache: bool,
}

#[derive(Args)]
struct SettingsArgs {
    #[command(subcommand)]
    command: SettingsCommand,
}

#[derive(Subcommand)]
enum SettingsCommand {
    #[command(about = "Print current settings")]
    Show,
    #[command(about = "Update settings and save them")]
    Set(SetArgs),
}

#[derive(Args)]
struct SetArgs {
    #[arg(long)]
    limit: Option<String>,

    #[arg(long)]
    offset: Option<String>,

    #[arg(long, num_args = 1..)]
    promoted: Option<Vec<String>>,

    #[arg(long, conflicts_with = "promoted")]
    clear_promoted: bool,
}

#[derive(Args)]
struct CheckArgs {
    locator: String,

    #[arg(long, default_value_t = SkipMethod::Row)]
    method: SkipMethod,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<MigrateError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.command {
        Commands::Settings(SettingsArgs {
            command: SettingsCommand::Set(_),
        }) => ConfigLoader::resolve_or_default(cli.config.as_deref())?,
        _ => ConfigLoader::resolve(cli.config.as_deref())?,
    };

    match cli.command {
        Commands::Run(args) => run_migration(args, &config),
        Commands::Settings(args) => run_settings(args, config, cli.config.as_deref()),
        Commands::Check(args) => run_check(args, &config),
    }
}

fn run_migration(args: RunArgs, config: &Config) -> miette::Result<()> {
    let fetcher = Arc::new(HttpFetcher::new(&config.source, &config.settings.pagination())?);
    let cache: Box<dyn CacheBackend> = if args.no_cache {
        info!("response cache disabled");
        Box::new(NoCache)
    } else if args.memory_cache {
        Box::new(MemoryCache::new())
    } else {
        let root = match &config.source.cache_dir {
            Some(dir) => dir.clone(),
            None => FileCache::default_root()?,
        };
        info!(cache_dir = %root, "using on-disk response cache");
        Box::new(FileCache::new(root))
    };

    let source = PokemonSource::new(Arc::clone(&fetcher), cache);
    let migration = MigrationRun::new(fetcher, source);
    let list_url = args.list_url.as_deref().unwrap_or(&config.source.list_url);
    let report = migration.run(list_url, &LogSink)?;
    info!(
        imported = report.rows.len(),
        failed = report.failures.len(),
        "migration finished"
    );
    JsonOutput::print_report(&report).into_diagnostic()?;
    Ok(())
}

fn run_settings(args: SettingsArgs, mut config: Config, path: Option<&str>) -> miette::Result<()> {
    match args.command {
        SettingsCommand::Show => {
            JsonOutput::print_settings(&config.settings).into_diagnostic()?;
        }
        SettingsCommand::Set(set) => {
            if let Some(limit) = set.limit {
                config.settings.limit = Some(ParamValue::parse_setting("limit", &limit)?);
            }
            if let Some(offset) = set.offset {
                config.settings.offset = Some(ParamValue::parse_setting("offset", &offset)?);
            }
            if let Some(promoted) = set.promoted {
                config.settings.promoted = promoted;
            }
            if set.clear_promoted {
                config.settings.promoted.clear();
            }
            let config_path = Utf8PathBuf::from_path_buf(ConfigLoader::config_path(path))
                .map_err(|_| MigrateError::Filesystem("invalid config path".to_string()))?;
            ConfigLoader::save(&config, &config_path)?;
            info!(path = %config_path, "settings saved");
            JsonOutput::print_settings(&config.settings).into_diagnostic()?;
        }
    }
    Ok(())
}

fn run_check(args: CheckArgs, config: &Config) -> miette::Result<()> {
    let fetcher = HttpFetcher::new(&config.source, &config.settings.pagination())?;
    let gate = SkipOn404::new(fetcher, args.method);
    let outcome = gate.transform(&args.locator).map(str::to_string);
    let result = CheckResult {
        locator: args.locator.clone(),
        external: is_external(&args.locator),
        exists: outcome.is_ok(),
    };
    JsonOutput::print_check(&result).into_diagnostic()?;
    outcome.into_diagnostic()?;
    Ok(())
}

fn map_exit_code(error: &MigrateError) -> u8 {
    match error {
        MigrateError::ConfigRead(_)
        | MigrateError::ConfigParse(_)
        | MigrateError::InvalidSetting { .. } => 2,
        MigrateError::Network { .. }
        | MigrateError::EmptyResponse { .. }
        | MigrateError::InvalidJson { .. }
        | MigrateError::MissingData { .. } => 3,
        _ => 1,
    }
}
