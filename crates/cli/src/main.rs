mod cli;
mod terminal;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};

use commander_agent::{IncidentReport, ModelSettings, Orchestrator};
use commander_catalog::{Catalog, CatalogConfig};
use commander_llm::LlmProvider;
use commander_core::config::{load_dotenv, Config};
use commander_notify::{Dispatcher, TemplateRenderer};
use commander_store::{ElasticsearchStore, EventStore};

use crate::cli::{CliArgs, Command};
use crate::terminal::Terminal;

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();

    // Logs go to stderr so `ask --json` output stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();
    let terminal = Terminal::new();

    let config = match args.profile.as_deref() {
        Some(profile) => Config::for_profile(profile),
        None => Config::from_env(),
    };
    config.log_summary();

    let catalog = Catalog::new(CatalogConfig::from(&config.indices));

    match args.command {
        Command::Operations => {
            println!("{}", catalog.describe());
        }
        Command::Ask { text, json, notify } => {
            let app = App::build(&config, catalog)?;
            let question = text.join(" ");
            let report = if json {
                app.orchestrator.run(&question).await
            } else {
                let spinner = terminal.start_spinner("investigating")?;
                let report = app.orchestrator.run(&question).await;
                spinner.stop();
                report
            };

            if json {
                let out = serde_json::to_string_pretty(&report)
                    .context("failed to serialize report")?;
                println!("{out}");
            } else {
                terminal.print_report(&report)?;
            }

            if notify {
                app.notify(&report, &terminal, !json).await;
            }
        }
        Command::Repl { notify } => {
            let app = App::build(&config, catalog)?;
            terminal.print_banner(config.profile_label(), &config.llm.provider, &app.backend)?;
            loop {
                let input = match terminal.read_input()? {
                    Some(text) => text,
                    None => {
                        terminal.print_info("Goodbye.")?;
                        break;
                    }
                };
                if input.is_empty() {
                    continue;
                }
                if input == "operations" {
                    terminal.print_info(&app.orchestrator.catalog().describe())?;
                    continue;
                }

                let spinner = terminal.start_spinner("investigating")?;
                let report = app.orchestrator.run(&input).await;
                spinner.stop();
                terminal.print_report(&report)?;

                if notify {
                    app.notify(&report, &terminal, true).await;
                }
            }
        }
    }

    Ok(())
}

/// Process-wide handles, built once and shared by every request.
struct App {
    orchestrator: Orchestrator,
    dispatcher: Dispatcher,
    renderer: TemplateRenderer,
    backend: String,
}

impl App {
    fn build(config: &Config, catalog: Catalog) -> Result<Self> {
        config.validate().context("invalid configuration")?;

        let store = Arc::new(
            ElasticsearchStore::new(&config.elastic, config.indices.inventory.clone())
                .context("failed to create Elasticsearch client")?,
        );
        let backend = store.backend_name().to_string();

        let provider = commander_llm::create_provider(&config.llm)
            .with_context(|| format!("failed to create LLM provider '{}'", config.llm.provider))?;
        info!(provider = provider.name(), "LLM provider ready");

        let orchestrator = Orchestrator::new(
            catalog,
            store.clone(),
            store,
            provider,
            ModelSettings::from(&config.llm),
        );

        let dispatcher = Dispatcher::from_config(&config.notify)
            .context("failed to configure notification channels")?;
        if dispatcher.is_empty() {
            info!("no notification channels configured");
        } else {
            info!(channels = ?dispatcher.channel_names(), "notification channels ready");
        }

        Ok(Self {
            orchestrator,
            dispatcher,
            renderer: TemplateRenderer::new(),
            backend,
        })
    }

    /// Render and deliver a report. Nothing on the delivery side is fatal.
    async fn notify(&self, report: &IncidentReport, terminal: &Terminal, show: bool) {
        if self.dispatcher.is_empty() {
            warn!("--notify given but no notification channels are configured");
            return;
        }
        let results = self.dispatcher.dispatch_report(&self.renderer, report).await;
        if show {
            if let Err(e) = terminal.print_dispatch(&results) {
                warn!(error = %e, "failed to print delivery results");
            }
        }
    }
}
