//! Earthquake crawler CLI
//!
//! Runs the KMA and JMA pollers locally or inspects their state.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use quake_crawler::{
    config::Rules,
    error::{AppError, Result},
    models::{Config, Source},
    notify::{Alerter, MailgunAlerter, NoopAlerter},
    pipeline::Runtime,
    storage::StateStore,
    utils::http,
};

/// Earthquake bulletin crawler for KMA and JMA
#[derive(Parser, Debug)]
#[command(name = "quake-crawler", version, about = "Earthquake bulletin crawler")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "data/config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll until a fatal error occurs
    Run {
        /// Only poll this source (default: every enabled source)
        #[arg(long, value_enum)]
        source: Option<SourceArg>,
    },

    /// Run a single cycle for one source
    Once {
        #[arg(long, value_enum)]
        source: SourceArg,
    },

    /// Validate configuration and rule files
    Validate,

    /// Show the last processed id of each source
    Info,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SourceArg {
    Kma,
    Jma,
}

impl From<SourceArg> for Source {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Kma => Source::Kma,
            SourceArg::Jma => Source::Jma,
        }
    }
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn build_alerter(config: &Config) -> Result<Box<dyn Alerter>> {
    let Some(alert) = &config.alert else {
        return Ok(Box::new(NoopAlerter));
    };
    let client = http::create_async_client(&config.crawler)?;
    match MailgunAlerter::from_config(client, alert) {
        Ok(alerter) => Ok(Box::new(alerter)),
        Err(e) => {
            log::warn!("Alerting disabled: {e}");
            Ok(Box::new(NoopAlerter))
        }
    }
}

async fn run(config: Config, only: Option<Source>) -> Result<()> {
    let sources: Vec<Source> = match only {
        Some(source) => vec![source],
        None => [Source::Kma, Source::Jma]
            .into_iter()
            .filter(|source| config.enabled(*source))
            .collect(),
    };
    if sources.is_empty() {
        return Err(AppError::config("No source is enabled"));
    }

    let alerter = build_alerter(&config)?;
    let rules = Rules::load(&config.paths)?;
    let runtime = Runtime::build(config, rules).await?;

    let mut tasks = tokio::task::JoinSet::new();
    for source in sources {
        let mut poller = runtime.poller(source).await;
        tasks.spawn(async move { (source, poller.run().await) });
    }

    while let Some(joined) = tasks.join_next().await {
        let (source, result) = joined.map_err(|e| AppError::Io(std::io::Error::other(e)))?;
        if let Err(e) = result {
            let subject = format!("{} poller stopped", source.as_str().to_uppercase());
            if let Err(alert_err) = alerter.alert(&subject, &e.to_string()).await {
                log::error!("Could not send alert: {alert_err}");
            }
            return Err(e);
        }
    }
    Ok(())
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load_or_default(&cli.config);
    log::info!("Loaded configuration from {}", cli.config.display());

    match cli.command {
        Command::Run { source } => {
            config.validate()?;
            run(config, source.map(Source::from)).await?;
        }

        Command::Once { source } => {
            config.validate()?;
            let source = Source::from(source);
            let rules = Rules::load(&config.paths)?;
            let runtime = Runtime::build(config, rules).await?;
            let outcome = runtime.poller(source).await.run_cycle().await?;
            println!("{source}: {outcome}");
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {e}");
                return Err(e);
            }
            log::info!("✓ Config OK");

            let rules = Rules::load(&config.paths)?;
            log::info!(
                "✓ Rules OK ({} templates, {} dictionary entries)",
                rules.templates.tier_count(),
                rules.dictionary.len()
            );
            log::info!("All validations passed!");
        }

        Command::Info => {
            for source in [Source::Kma, Source::Jma] {
                let state = StateStore::new(config.state_file(source));
                match state.load().await {
                    Some(id) => log::info!("{source}: last processed {id}"),
                    None => log::info!("{source}: nothing processed yet"),
                }
            }
        }
    }

    Ok(())
}
