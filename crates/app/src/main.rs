mod chat;
mod client;
mod config;
mod server;

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use client::{ApiClient, DEFAULT_API_URL};
use config::{build_service, BackendArgs};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "chatdoc=info,chatdoc_core=info,tower_http=info";

#[derive(Parser)]
#[command(name = "chatdoc", version, about = "Ask questions about your PDFs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct ClientArgs {
    /// Base URL of a running chatdoc server
    #[arg(long, env = "API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,
}

impl ClientArgs {
    fn client(&self) -> anyhow::Result<ApiClient> {
        ApiClient::new(&self.api_url).context("configuring api client")
    }
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API.
    Serve {
        #[command(flatten)]
        backend: BackendArgs,

        /// Address to listen on
        #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
        bind_addr: SocketAddr,

        /// Largest accepted upload in bytes
        #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = server::DEFAULT_MAX_UPLOAD_BYTES)]
        max_upload_bytes: usize,
    },
    /// Drop every indexed document.
    ResetIndex {
        #[command(flatten)]
        backend: BackendArgs,
    },
    /// Upload a PDF to the server.
    Upload {
        #[command(flatten)]
        client: ClientArgs,

        /// PDF file to upload
        file: PathBuf,
    },
    /// Ask one question about an uploaded document.
    Ask {
        #[command(flatten)]
        client: ClientArgs,

        #[arg(long)]
        document_id: String,

        question: String,
    },
    /// Chat about a document; uploads `--file` first when given.
    Chat {
        #[command(flatten)]
        client: ClientArgs,

        #[arg(long, required_unless_present = "file")]
        document_id: Option<String>,

        #[arg(long, conflicts_with = "document_id")]
        file: Option<PathBuf>,
    },
    /// Check that the server is up.
    Health {
        #[command(flatten)]
        client: ClientArgs,
    },
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Process environment has to be settled before the runtime spawns threads.
    if let Command::Serve { backend, .. } | Command::ResetIndex { backend } = &cli.command {
        backend.export_process_env();
    }

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?
        .block_on(run(cli))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve {
            backend,
            bind_addr,
            max_upload_bytes,
        } => {
            info!(
                version = env!("CARGO_PKG_VERSION"),
                started_at = %Utc::now().to_rfc3339(),
                "chatdoc boot"
            );
            let service = build_service(&backend).await?;
            server::serve(service, bind_addr, max_upload_bytes).await?;
        }
        Command::ResetIndex { backend } => {
            let service = build_service(&backend).await?;
            service.reset_index().await.context("resetting index")?;
            println!("index reset ({})", service.health().index_backend);
        }
        Command::Upload { client, file } => {
            let receipt = client.client()?.upload_pdf(&file).await?;
            println!("document_id: {}", receipt.document_id);
            println!(
                "{} chunk(s) from {} page(s) of {}",
                receipt.chunk_count, receipt.page_count, receipt.filename
            );
        }
        Command::Ask {
            client,
            document_id,
            question,
        } => {
            let answer = client.client()?.ask(&document_id, &question).await?;
            println!("{}", chat::render_answer(&answer));
        }
        Command::Chat {
            client,
            document_id,
            file,
        } => {
            let client = client.client()?;
            let document_id = match (document_id, file) {
                (Some(id), _) => id,
                (None, Some(path)) => {
                    let receipt = client.upload_pdf(&path).await?;
                    println!(
                        "uploaded {} as {} ({} chunks)",
                        receipt.filename, receipt.document_id, receipt.chunk_count
                    );
                    receipt.document_id
                }
                (None, None) => anyhow::bail!("either --document-id or --file is required"),
            };

            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            let history =
                chat::run_chat(&client, &document_id, stdin, &mut std::io::stdout()).await?;
            info!(turns = history.turns().len(), "chat ended");
        }
        Command::Health { client } => {
            let client = client.client()?;
            let report = client.health().await?;
            println!(
                "{} at {} (index: {}, version {})",
                report.status,
                client.base_url(),
                report.index_backend,
                report.version
            );
        }
    }

    Ok(())
}
