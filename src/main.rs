use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use market_aggregator::config::ConfigLoader;
use market_aggregator::metrics::MetricsSnapshot;
use market_aggregator::pipeline::PipelineEngine;
use market_aggregator::status::{self, StatusState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "market-aggregator")]
#[command(version = "0.1.0")]
#[command(about = "Rate-limited fetch pipeline with bounded buffering", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline from a config file
    Run {
        /// Path to the configuration file (JSON/YAML/TOML)
        #[arg(short, long)]
        config: PathBuf,

        /// Show progress bars (stderr)
        #[arg(short, long, default_value_t = true)]
        progress: bool,
    },
    /// Validate a configuration file
    Check {
        /// Path to the configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "info");
        }
    }
    let cli = Cli::parse();
    let logger = env_logger::Builder::from_default_env().build();
    let multi = Arc::new(indicatif::MultiProgress::new());

    match cli.command {
        Commands::Run { config, progress } => {
            if progress {
                let multi_clone = multi.clone();
                indicatif_log_bridge::LogWrapper::new((*multi_clone).clone(), logger)
                    .try_init()
                    .unwrap();
            } else {
                log::set_boxed_logger(Box::new(logger)).unwrap();
                log::set_max_level(log::LevelFilter::Info);
            }

            log::info!("Loading config from {:?}", config);
            let config_data = ConfigLoader::load(&config)?;
            log::info!(
                "Loaded pipeline '{}' with {} urls",
                config_data.name,
                config_data.urls.len()
            );

            let sink = ConfigLoader::build_sink(&config_data, Some(multi.clone())).await?;
            let status_addr = config_data.status_addr.clone();
            let url_count = config_data.urls.len() as u64;
            let engine = PipelineEngine::new(config_data, None);

            // The OS signal handler only sets the stop token; the coordinator
            // sequences the actual shutdown.
            let coordinator = engine.coordinator();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::info!("Shutting down...");
                    coordinator.request_stop();
                }
            });

            let mut status_task = None;
            if let Some(addr) = status_addr {
                let addr: SocketAddr = addr
                    .parse()
                    .map_err(|e| anyhow::anyhow!("Invalid status_addr: {}", e))?;
                let state = StatusState::new(engine.metrics(), status::install_prometheus()?);
                let coordinator = engine.coordinator();
                status_task = Some(tokio::spawn(async move {
                    if let Err(e) = status::serve(addr, state, coordinator).await {
                        log::error!("Status surface error: {}", e);
                    }
                }));
            }

            let mut progress_bar: Option<ProgressBar> = None;
            let mut _progress_task = None;
            if progress {
                let pb = multi.add(ProgressBar::new(url_count));
                pb.set_style(ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
                    .progress_chars("#>-"));

                let mut metrics_rx = engine.watch_metrics();
                let pb_clone = pb.clone();
                progress_bar = Some(pb);
                _progress_task = Some(tokio::spawn(async move {
                    while metrics_rx.changed().await.is_ok() {
                        let snapshot: MetricsSnapshot = metrics_rx.borrow().clone();
                        pb_clone.set_position(snapshot.success_count + snapshot.failure_count);
                        pb_clone.set_message(format!(
                            "OK: {} | Failed: {} | Queue: {} | Avg: {:.3}s",
                            snapshot.success_count,
                            snapshot.failure_count,
                            snapshot.queue_size,
                            snapshot.average_response_time
                        ));
                    }
                }));
            }

            log::info!("Starting pipeline...");
            let result = engine.run(sink).await;

            if progress {
                if let Some(task) = _progress_task {
                    task.abort();
                }
                if let Some(pb) = progress_bar {
                    let final_metrics = engine.get_metrics();
                    pb.finish_with_message(format!(
                        "OK: {} | Failed: {} | Avg: {:.3}s - Completed",
                        final_metrics.success_count,
                        final_metrics.failure_count,
                        final_metrics.average_response_time
                    ));
                }
            }

            if let Some(task) = status_task {
                let _ = task.await;
            }

            let final_metrics = engine.get_metrics();
            println!("\nPipeline completed:");
            println!("   Successes: {}", final_metrics.success_count);
            println!("   Failures: {}", final_metrics.failure_count);
            println!("   Timeouts: {}", final_metrics.timeout_count);
            println!(
                "   Average Response: {:.3}s",
                final_metrics.average_response_time
            );
            println!("   Total Time: {:.1}s", final_metrics.elapsed_seconds);

            if let Err(e) = result {
                eprintln!("Pipeline finished with a fetch failure: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Check { config } => match ConfigLoader::load(&config) {
            Ok(cfg) => {
                println!("Config is valid:");
                println!("   Name: {}", cfg.name);
                println!("   URLs: {}", cfg.urls.len());
                println!("   Queue capacity: {}", cfg.queue_capacity);
                println!("   Consumers: {}", cfg.consumers);
                println!(
                    "   Rate limit: {}/{}ms",
                    cfg.rate_limit.requests, cfg.rate_limit.window_ms
                );
            }
            Err(e) => {
                eprintln!("Config error: {}", e);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}
