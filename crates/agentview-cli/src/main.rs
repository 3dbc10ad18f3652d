//! `agentview` command-line client
//!
//! Starts analyses, follows them live (push channel, polling fallback) and
//! works with the resource collections.

mod render;

use agentview_client::{ApiClient, ResourceKind, Resources};
use agentview_core::{ClientConfig, SessionStatus, StartAnalysisRequest};
use agentview_query::{FetchOptions, MutationOptions, QueryContext};
use agentview_realtime::{SessionMonitor, SessionView, WebSocketTransport};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "agentview", version, about = "Follow multi-agent analysis sessions")]
struct Cli {
    /// REST base URL (defaults to AGENTVIEW_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Push channel base URL (defaults to AGENTVIEW_WS_URL)
    #[arg(long, global = true)]
    ws_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start an analysis for a company and follow it
    Start {
        /// Company to analyse
        company_id: String,
        /// Pipeline options as a JSON object
        #[arg(long)]
        options: Option<String>,
        /// Print the analysis id and exit
        #[arg(long)]
        no_follow: bool,
    },
    /// Follow a running analysis
    Watch {
        /// Analysis id
        analysis_id: String,
    },
    /// List a resource collection
    List {
        /// competitors, icps, leads, campaigns or insights
        resource: ResourceKind,
    },
    /// Show one resource item
    Get {
        /// competitors, icps, leads, campaigns or insights
        resource: ResourceKind,
        /// Item id
        id: String,
    },
    /// Delete one resource item
    Delete {
        /// competitors, icps, leads, campaigns or insights
        resource: ResourceKind,
        /// Item id
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env();
    if let Some(url) = cli.api_url {
        config = config.with_api_base_url(url);
    }
    if let Some(url) = cli.ws_url {
        config = config.with_ws_base_url(url);
    }
    config.validate().context("invalid configuration")?;

    let api = ApiClient::new(&config)?;

    match cli.command {
        Command::Start {
            company_id,
            options,
            no_follow,
        } => {
            let mut request = StartAnalysisRequest::new(company_id);
            if let Some(options) = options {
                let options: Value =
                    serde_json::from_str(&options).context("--options must be JSON")?;
                request = request.with_options(options);
            }
            let started = api.start_analysis(&request).await?;
            println!("{}", started.analysis_id);
            if !no_follow {
                watch(&config, api, &started.analysis_id).await?;
            }
        }
        Command::Watch { analysis_id } => {
            watch(&config, api, &analysis_id).await?;
        }
        Command::List { resource } => {
            let resources = Resources::new(api, QueryContext::from_config(&config));
            let list = resources.list::<Value>(resource, FetchOptions::new());
            list.refresh().await;
            let state = list.state();
            if let Some(err) = state.error {
                return Err(err).with_context(|| format!("listing {resource}"));
            }
            for item in state.data.unwrap_or_default() {
                println!("{item}");
            }
        }
        Command::Get { resource, id } => {
            let resources = Resources::new(api, QueryContext::from_config(&config));
            let item = resources.item::<Value>(resource, Some(&id), FetchOptions::new());
            item.refresh().await;
            let state = item.state();
            if let Some(err) = state.error {
                return Err(err).with_context(|| format!("fetching {resource}/{id}"));
            }
            if let Some(data) = state.data {
                println!("{}", serde_json::to_string_pretty(&data)?);
            }
        }
        Command::Delete { resource, id } => {
            let resources = Resources::new(api, QueryContext::from_config(&config));
            let delete = resources.delete(resource, MutationOptions::new());
            if delete.execute(id.clone()).await.is_none() {
                let reason = delete
                    .state()
                    .error
                    .map_or_else(|| "unknown error".to_string(), |e| e.to_string());
                bail!("deleting {resource}/{id}: {reason}");
            }
            println!("deleted {resource}/{id}");
        }
    }
    Ok(())
}

async fn watch(config: &ClientConfig, api: ApiClient, analysis_id: &str) -> Result<SessionView> {
    let monitor = SessionMonitor::start(
        analysis_id,
        Arc::new(WebSocketTransport::from_config(config)),
        Arc::new(api),
        config,
    );
    let mut rx = monitor.subscribe();
    let mut printed = 0;

    let finished = monitor.wait();
    tokio::pin!(finished);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let view = loop {
        tokio::select! {
            view = &mut finished => break view,
            changed = rx.changed() => {
                if changed.is_err() {
                    break monitor.view();
                }
                let (lines, count) = render::new_message_lines(&rx.borrow_and_update(), printed);
                lines.iter().for_each(|line| println!("{line}"));
                printed = count;
            }
            _ = &mut ctrl_c => {
                tracing::info!(analysis = analysis_id, "interrupted");
                monitor.stop();
                break monitor.view();
            }
        }
    };

    let (lines, _) = render::new_message_lines(&view, printed);
    lines.iter().for_each(|line| println!("{line}"));
    print!("{}", render::summary(&view));

    if view.session.status == SessionStatus::Failed {
        bail!(
            "analysis {analysis_id} failed: {}",
            view.session.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(view)
}
