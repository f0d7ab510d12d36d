//! `faultwatch` command line entry point
//!
//! Loads a run configuration, supervises the configured target until it
//! exits and exits with the target's status.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use orchestrator::{os_signals, Capability, Orchestrator, PluginRegistry, RunConfiguration, RunPhase};
use shared::{harness_debug, logging, Component};

/// Supervise a target process and report the faults its monitors detect
#[derive(Parser)]
#[command(name = "faultwatch")]
#[command(about = "Runs a target under fault monitors and records what they find")]
pub struct Args {
    /// Run configuration file (JSON)
    #[arg(long, required_unless_present = "list")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Print the registered plugin, monitor, listener and logger identifiers
    #[arg(long)]
    pub list: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    logging::parse_level(&args.log_level).context("invalid --log-level")?;
    logging::init_tracing_with_level(Some(&args.log_level));

    let registry = PluginRegistry::with_builtins();
    if args.list {
        print_identifiers(&registry);
        return Ok(());
    }

    let path = args.config.context("--config is required")?;
    let config = RunConfiguration::load(&path)
        .await
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    harness_debug!(
        Component::Orchestrator,
        "Loaded {} monitor(s) and {} logger(s) from {}",
        config.monitors.len(),
        config.loggers.len(),
        path.display()
    );

    logging::log_startup(
        &Component::Orchestrator,
        &format!("run of '{}'", config.plugin_identifier),
    );
    let orchestrator = Orchestrator::new(config, registry);

    let run = orchestrator.run();
    tokio::pin!(run);
    let result = tokio::select! {
        result = &mut run => result,
        signal = os_signals::wait_for_shutdown_signal() => {
            match signal {
                Ok(name) => {
                    logging::log_shutdown(&Component::Orchestrator, &format!("received {name}"));
                    let (result, ()) = tokio::join!(&mut run, stop_once_started(&orchestrator));
                    result
                }
                Err(e) => {
                    logging::log_error(&Component::Orchestrator, "Signal handling", &e);
                    run.await
                }
            }
        }
    };

    let status = result.context("run failed")?;
    logging::log_success(&Component::Orchestrator, &format!("Run finished, target {status}"));
    std::process::exit(os_signals::exit_code(status));
}

/// Stop the target once the plugin has started, or do nothing if the run ends first
async fn stop_once_started(orchestrator: &Orchestrator) {
    let mut phase = orchestrator.subscribe_phase();
    let reached = phase
        .wait_for(|phase| !matches!(phase, RunPhase::Idle | RunPhase::PluginResolved))
        .await;
    if reached.is_err() {
        return;
    }
    if let Err(e) = orchestrator.stop().await {
        logging::log_error(&Component::Orchestrator, "Stop", &e);
    }
}

fn print_identifiers(registry: &PluginRegistry) {
    let mut current: Option<Capability> = None;
    for (capability, identifier) in registry.identifiers() {
        if current != Some(capability) {
            println!("{capability}s:");
            current = Some(capability);
        }
        println!("  {identifier}");
    }
}
