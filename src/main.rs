use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use taxonorm::{run_correction, select_fields, AppConfig, RunMode, TaxonomyMode};
use taxonorm_api::{ApiState, RestApi};
use taxonorm_storage::MemoryStore;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Category normalization for review analysis records
#[derive(Parser, Debug)]
#[command(name = "taxonorm")]
#[command(
    about = "Normalize free-text review categories into canonical taxonomies",
    long_about = None
)]
struct Args {
    /// Log level, used when RUST_LOG is unset
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Propose taxonomies and write canonical categories back
    Correct {
        /// Path to the TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = RunMode::All)]
        mode: RunMode,

        /// Correct a single profile field
        #[arg(long)]
        field: Option<String>,

        #[arg(long)]
        project_code: Option<String>,

        #[arg(long)]
        solution: Option<String>,

        /// Category type of the product topic list
        #[arg(long)]
        product_type: Option<String>,

        /// Chat model used to propose taxonomies
        #[arg(long)]
        model: Option<String>,

        /// Propose new taxonomies instead of reusing pinned ones
        #[arg(long)]
        retaxonomize: bool,

        /// Write the run report here instead of the report directory
        #[arg(long)]
        token_report: Option<PathBuf>,
    },
    /// Serve run reports and records over a read-only HTTP API
    Serve {
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(long)]
        http_port: Option<u16>,
    },
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    info!("Starting taxonorm v{}", env!("CARGO_PKG_VERSION"));

    match args.command {
        Command::Correct {
            config,
            mode,
            field,
            project_code,
            solution,
            product_type,
            model,
            retaxonomize,
            token_report,
        } => {
            let mut config = AppConfig::load(config.as_deref())?;
            if project_code.is_some() {
                config.scope.project_code = project_code;
            }
            if solution.is_some() {
                config.scope.solution = solution;
            }
            if let Some(model) = model {
                config.llm.model = model;
            }
            if let (Some(product_type), Some(list)) = (product_type, config.fields.list.as_mut()) {
                list.category_type = product_type;
            }
            if retaxonomize {
                config.taxonomy.mode = TaxonomyMode::Fresh;
            }

            let fields = select_fields(&config.fields, mode, field.as_deref())?;
            let proposer = Arc::new(config.build_proposer()?);
            let embedder = config.build_embedder()?;

            let report_path = token_report.as_deref();
            let summary = run_correction(&config, &fields, proposer, embedder, report_path).await?;
            info!(
                run_id = %summary.report.run_id,
                report = %summary.report_path.display(),
                "Done"
            );
        }
        Command::Serve { config, http_port } => {
            let config = AppConfig::load(config.as_deref())?;
            let port = http_port.unwrap_or(config.api.http_port);

            let store = Arc::new(MemoryStore::open(&config.store.snapshot_path)?);
            let state = Arc::new(ApiState {
                store,
                collection: config.store.collection.clone(),
                report_dir: config.report.dir.clone(),
            });

            let http_handle = std::thread::spawn(move || {
                info!("Starting HTTP server on port {}", port);
                let sys = actix_web::rt::System::new();
                sys.block_on(async {
                    if let Err(e) = RestApi::start(state, port).await {
                        tracing::error!("HTTP server error: {}", e);
                    }
                })
            });
            info!("HTTP API: http://localhost:{}/", port);

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                }
                _ = tokio::task::spawn_blocking(move || {
                    http_handle.join().ok();
                }) => {
                    info!("HTTP server stopped");
                }
            }
            info!("Shutting down...");
        }
    }

    Ok(())
}
