use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use harvestrs::provider::CandidateSource;
use harvestrs::providers::freeproxy_world::FreeProxyWorld;
use harvestrs::providers::proxyscrape::ProxyScrape;
use harvestrs::{LogObserver, Pipeline, ReqwestTransport, Settings, Transport};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "harvestrs", version, about = "Harvest catalog records through validated proxies")]
struct Cli {
    /// Path to the TOML configuration
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Validate proxies, fetch the page range and store new records (default)
    Run,
    /// Download a public proxy list, validate it and write the working entries
    RefreshProxies {
        #[arg(long, value_enum, default_value = "proxyscrape")]
        source: RemoteSource,
        #[arg(short, long)]
        output: PathBuf,
        /// Candidates requested from proxyscrape, or pages read from freeproxy.world
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum RemoteSource {
    Proxyscrape,
    FreeproxyWorld,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::builder()
        .filter_level(log::LevelFilter::Warn)
        .filter_module("harvestrs", log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let settings = match Settings::from_file(&cli.config) {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("Failed to load {}: {}", cli.config.display(), e);
            return ExitCode::FAILURE;
        }
    };
    let fail_on_error = settings.run.fail_on_error;

    match execute(cli.command.unwrap_or(Command::Run), settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            if fail_on_error {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
    }
}

async fn execute(command: Command, settings: Settings) -> anyhow::Result<()> {
    let mut transport = ReqwestTransport::new();
    if let Some(user_agent) = &settings.catalog.user_agent {
        transport = transport.with_user_agent(user_agent.clone());
    }
    let transport: Arc<dyn Transport> = Arc::new(transport);
    let pipeline = Pipeline::new(settings, transport.clone(), Arc::new(LogObserver));

    match command {
        Command::Run => {
            let report = pipeline.run().await.context("harvest run failed")?;
            if let Some(stop) = report.stopped_early {
                log::warn!(
                    "page {} had no items; {} later pages were not scraped",
                    stop.page,
                    stop.skipped_payloads
                );
            }
            log::info!(
                "{} pages, {} rows, {} new records ({} working proxies)",
                report.pages,
                report.rows,
                report.new_records,
                report.working_proxies
            );
        }
        Command::RefreshProxies {
            source,
            output,
            limit,
        } => {
            let mut source: Box<dyn CandidateSource> = match source {
                RemoteSource::Proxyscrape => {
                    Box::new(ProxyScrape::new(transport, limit.unwrap_or(2000)))
                }
                RemoteSource::FreeproxyWorld => {
                    Box::new(FreeProxyWorld::new(transport, limit.unwrap_or(10) as u32))
                }
            };
            let count = pipeline
                .refresh_proxy_list(source.as_mut(), &output)
                .await
                .with_context(|| format!("cannot refresh {}", output.display()))?;
            println!("{}", count);
        }
    }
    Ok(())
}
