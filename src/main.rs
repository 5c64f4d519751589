use anyhow::{Context, Result};
use clap::Parser;
use std::{path::PathBuf, sync::Arc};
use tokio::sync::{oneshot, Mutex};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use bombabot::{
    chat, config::GatewayArgs, conversation, dataset, gateway::Gateway, gemini::GeminiClient,
    stats, web_server, Conversation, GatewaySettings,
};

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

// Define the available subcommands
#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the BOMBAbot web dashboard.
    Serve {
        #[arg(long, default_value_t = 9900, help = "Port for the web server.")]
        port: u16,
        #[arg(long, help = "Load templates from this directory and reload them on change.")]
        templates: Option<PathBuf>,
        #[arg(long, default_value = "static", help = "Directory served under /static.")]
        static_dir: PathBuf,
        #[command(flatten)]
        gateway: GatewayArgs,
    },
    /// Chat with BOMBAbot in the terminal.
    Chat {
        #[command(flatten)]
        gateway: GatewayArgs,
    },
    /// Ask a single question and print the reply.
    Ask {
        #[arg(help = "The question to ask.")]
        question: String,
        #[command(flatten)]
        gateway: GatewayArgs,
    },
    /// Print the dataset statistics that ground every answer.
    Stats {
        #[arg(long, help = "Print as JSON.")]
        json: bool,
        #[arg(long, default_value_t = 5, help = "Number of sample records to include.")]
        sample: usize,
    },
}

fn build_gateway(args: GatewayArgs) -> Result<Gateway> {
    let config = args.resolve().context("Invalid gateway configuration")?;
    info!(model = %config.model, temperature = config.temperature, "Gateway configured");
    let client = GeminiClient::new(&config);
    Ok(Gateway::new(Arc::new(client), GatewaySettings::from(&config)))
}

fn print_stats(stats: &stats::DatasetStats) {
    println!("Jumlah Besar Balai: {}", stats.station_count);
    println!(
        "Total Anggota Nasional: {} (L: {}, W: {})",
        stats.total_staff, stats.male_staff, stats.female_staff
    );
    println!("Ringkasan Per Negeri:");
    for (region, count) in &stats.region_counts {
        println!("  {:<20} {}", region, count);
    }
    if !stats.sample.is_empty() {
        println!("Sampel Data:");
        for sample in &stats.sample {
            println!("  {} ({}): {} anggota", sample.name, sample.region, sample.staff_total);
        }
    }
}

// The main entry point of the application, using tokio's async runtime
#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for environment variables like API keys)
    dotenvy::dotenv().ok();

    // Logs go to stderr so the terminal chat keeps stdout to itself.
    // RUST_LOG overrides the default filter (e.g., RUST_LOG=bombabot=debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("bombabot=info,tower_http=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse command-line arguments
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            templates,
            static_dir,
            gateway,
        } => {
            info!("Starting BOMBAbot dashboard on port {}...", port);
            let gateway = build_gateway(gateway)?;
            let conversation = Arc::new(Mutex::new(Conversation::loading()));
            let state = web_server::AppState::new(conversation, gateway, templates);

            // Parse the dataset after the server is up so the loading screen is visible
            let loader_state = state.clone();
            tokio::spawn(async move {
                match tokio::task::spawn_blocking(dataset::load_embedded).await {
                    Ok(records) => loader_state.finish_loading(records).await,
                    Err(e) => error!("Dataset loading task failed: {:?}", e),
                }
            });

            let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
            let mut web_server_handle = tokio::spawn(async move {
                let shutdown = async {
                    let _ = shutdown_rx.await;
                };
                web_server::start_web_server(port, state, static_dir, shutdown).await
            });

            let ctrl_c = tokio::signal::ctrl_c();
            // Pin the ctrl_c future to the stack so its address is stable
            tokio::pin!(ctrl_c);

            tokio::select! {
                // Wait for Ctrl-C signal for graceful shutdown
                _ = &mut ctrl_c => {
                    info!("Ctrl-C received, initiating shutdown...");
                    let _ = shutdown_tx.send(());
                }
                // Handle potential completion/failure of the web server task
                res = &mut web_server_handle => {
                    res.context("Web server task panicked")?
                        .context("Web server failed")?;
                    info!("Web server task completed unexpectedly.");
                    return Ok(());
                }
            }

            info!("Waiting for in-flight requests to finish...");
            match web_server_handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Web server failed during shutdown: {:?}", e),
                Err(e) => error!("Web server task failed during shutdown: {:?}", e),
            }
            info!("Shutdown complete.");
        }
        Commands::Chat { gateway } => {
            info!("Starting interactive chat session...");
            let gateway = build_gateway(gateway)?;
            let conversation = Mutex::new(Conversation::with_records(dataset::load_embedded()));
            chat::run_interactive_chat(&conversation, &gateway)
                .await
                .context("Chat session failed")?;
        }
        Commands::Ask { question, gateway } => {
            let gateway = build_gateway(gateway)?;
            let conversation = Mutex::new(Conversation::with_records(dataset::load_embedded()));
            let reply = conversation::submit(&conversation, &gateway, &question)
                .await
                .context("Question was not accepted")?;
            println!("{}", reply.content);
        }
        Commands::Stats { json, sample } => {
            let records = dataset::load_embedded();
            let stats = stats::summarize(&records, sample);
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&stats).context("Failed to serialize statistics")?
                );
            } else {
                print_stats(&stats);
            }
        }
    }

    Ok(())
}
