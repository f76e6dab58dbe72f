//! Pump.fun A/B testing lab
//!
//! # WARNING
//! - Paper results do not include fees, failed transactions, or MEV
//!   competition; treat them as upper bounds.
//! - Most pump.fun tokens go to zero. The point of this tool is to
//!   measure which entry parameters lose least, not to promise profit.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use pumpfun_ab::ab::{analyser, report, AbTestRunner};
use pumpfun_ab::config::AppConfig;
use pumpfun_ab::detect::{DetectionSource, PumpPortalSource};
use pumpfun_ab::error::Error;
use pumpfun_ab::rpc::{RpcFacade, SolanaRpc};
use pumpfun_ab::store::StateStore;

/// A/B parameter testing for pump.fun entry pipelines
#[derive(Parser)]
#[command(name = "ablab")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one A/B session against the live detection stream
    Run {
        /// Override the configured session duration (minutes)
        #[arg(long)]
        duration_minutes: Option<u64>,

        /// Session description stored with the results
        #[arg(long)]
        description: Option<String>,
    },

    /// Cross-session parameter impact analysis
    Analyze,

    /// Suggest the next experiments to run
    Suggest,

    /// Re-render the report for a completed session
    Report {
        /// Session id (ab_...)
        session_id: String,
    },

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pumpfun_ab=info".parse().unwrap()),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    let config = match AppConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(2);
        }
    };

    let result = match cli.command {
        Commands::Run {
            duration_minutes,
            description,
        } => run_session(config, duration_minutes, description).await,
        Commands::Analyze => analyze(config),
        Commands::Suggest => suggest(config),
        Commands::Report { session_id } => show_report(config, &session_id),
        Commands::Config => show_config(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        let code = match e {
            Error::ConfigInvalid(_) | Error::Config(_) => 2,
            _ => 1,
        };
        std::process::exit(code);
    }
}

async fn run_session(
    mut config: AppConfig,
    duration_minutes: Option<u64>,
    description: Option<String>,
) -> Result<(), Error> {
    if let Some(minutes) = duration_minutes {
        config.session.duration_ms = minutes * 60_000;
    }
    if description.is_some() {
        config.session.description = description;
    }

    let store = Arc::new(StateStore::open(&config.db_path)?);
    let rpc: Arc<dyn RpcFacade> =
        Arc::new(SolanaRpc::new(&config.rpc.endpoint, config.rpc.timeout_ms));
    let source: Arc<dyn DetectionSource> =
        Arc::new(PumpPortalSource::new(config.stream.clone()));

    let runner = AbTestRunner::new(
        store,
        rpc,
        source,
        config.session.clone(),
        config.variant_a.clone(),
        config.variant_b.clone(),
    )?;

    info!(session = %runner.session_id(), "starting A/B session");
    let report = runner.run().await?;
    println!("{}", report.render());
    Ok(())
}

fn analyze(config: AppConfig) -> Result<(), Error> {
    let store = StateStore::open(&config.db_path)?;
    let analysis = analyser::analyze(&store)?;

    println!("Completed sessions: {}", analysis.total_sessions);
    println!(
        "Overall confidence: {}",
        serde_json::to_string(&analysis.best_config.overall_confidence)?
    );

    for impact in &analysis.impacts {
        println!(
            "\n{}: {} session(s), higher wins {}, lower wins {}",
            impact.param_name, impact.sessions_tested, impact.higher_wins, impact.lower_wins
        );
        println!(
            "  avg impact {:.6} SOL, max {:.6} SOL",
            impact.avg_pnl_impact, impact.max_pnl_impact
        );
        if let Some(best) = &impact.best_value {
            println!(
                "  best value {} (win rate {:.0}%)",
                best, impact.best_value_win_rate
            );
        }
    }

    if !analysis.best_config.parameters.is_empty() {
        println!("\nRecommended config:");
        for param in &analysis.best_config.parameters {
            println!(
                "  {} = {} ({} over {} session(s))",
                param.param_name,
                param.value,
                serde_json::to_string(&param.confidence)?,
                param.sessions_tested
            );
        }
    }

    Ok(())
}

fn suggest(config: AppConfig) -> Result<(), Error> {
    let store = StateStore::open(&config.db_path)?;
    let analysis = analyser::analyze(&store)?;

    if analysis.suggestions.is_empty() {
        println!("No suggestions; every known tunable is well tested.");
        return Ok(());
    }

    for suggestion in &analysis.suggestions {
        println!(
            "[{}] {}: A={} B={} ({})",
            serde_json::to_string(&suggestion.priority)?,
            suggestion.param_name,
            suggestion.value_a,
            suggestion.value_b,
            suggestion.rationale
        );
    }
    Ok(())
}

fn show_report(config: AppConfig, session_id: &str) -> Result<(), Error> {
    let store = StateStore::open(&config.db_path)?;
    let diffs = store
        .get_tested_parameters()?
        .iter()
        .flat_map(|param| {
            store
                .get_parameter_history(param)
                .unwrap_or_default()
                .into_iter()
                .filter(|row| row.session_id == session_id)
                .map(|row| row.diff)
        })
        .collect();

    let report = report::generate(&store, session_id, diffs)?;
    println!("{}", report.render());
    Ok(())
}

fn show_config(config: &AppConfig) -> Result<(), Error> {
    println!("rpc endpoint:    {}", config.rpc.endpoint);
    println!("stream ws url:   {}", config.stream.ws_url);
    println!("database:        {}", config.db_path);
    println!(
        "session:         {}ms{}",
        config.session.duration_ms,
        config
            .session
            .description
            .as_deref()
            .map(|d| format!(" ({})", d))
            .unwrap_or_default()
    );
    println!(
        "variant A:       {}",
        serde_json::to_string_pretty(&config.variant_a)?
    );
    println!(
        "variant B:       {}",
        serde_json::to_string_pretty(&config.variant_b)?
    );
    Ok(())
}
