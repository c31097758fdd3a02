use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sales_forecast::{
    api::{self, AppContext},
    config::{self, database},
    core::forecast::{ForecastService, RetrainRequest},
    errors::Result,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "sales-forecast", version, about = "Northwind sales analytics and forecasting API")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Train a model from the current database and save it
    Train {
        /// decision_tree, linear, knn or logistic
        #[arg(long)]
        model: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file, non-fatal since env vars can be set externally
    dotenv().ok();
    info!("Attempted to load .env file.");

    let cli = Cli::parse();

    // 3. Load the main application configuration
    let app_config = config::load_app_configuration()
        .inspect_err(|e| error!("Critical error loading application configuration: {}", e))?;

    // 4. Initialize database
    let db = database::create_connection(&app_config.database_url)
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db)
        .await
        .inspect(|_| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to create tables: {}", e))?;

    let forecaster = ForecastService::new(app_config.model_path.clone(), app_config.training.clone());

    match cli.command.unwrap_or(Command::Serve) {
        Command::Train { model } => {
            let request = RetrainRequest {
                model_type: model,
                ..RetrainRequest::default()
            };
            let metrics = forecaster
                .train(&db, request)
                .await
                .inspect_err(|e| error!("Training failed: {}", e))?;
            info!("Saved model to {:?}", forecaster.model_path());
            for line in metrics.report() {
                info!("{}", line);
            }
        }
        Command::Serve => {
            // 5. Warm the model cache; an untrained service still starts
            if let Err(e) = forecaster.current_model().await {
                warn!("No forecast model available at startup: {}", e);
            }

            let state = Arc::new(AppContext { db, forecaster });
            let app = api::router(state);

            // 6. Serve until Ctrl+C
            let address = app_config.bind_address();
            let listener = tokio::net::TcpListener::bind(&address)
                .await
                .inspect_err(|e| error!("Failed to bind {}: {}", address, e))?;
            info!("Listening on http://{}", address);
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
            info!("Server stopped");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}
