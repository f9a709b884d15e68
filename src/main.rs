use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;

use repositories::{memory::MemoryUserRepository, users::UserRepository, UserStore};
use settings::{Backend, Settings};

mod models;
mod repositories;
pub mod services;
pub mod settings;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    #[arg(short, long)]
    listen: Option<String>,
    #[arg(long, default_value = "log4rs.yaml")]
    log4rs: String,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    init_logging(&args.log4rs)?;

    let mut settings = Settings::new(&args.config).context("Could not load config file.")?;
    if let Some(listen) = args.listen {
        settings.server.listen = listen;
    }
    if let Err(e) = settings.validate() {
        log::error!("Refusing to start: {}", e);
        return Err(e).context("Invalid configuration.");
    }

    let store = connect_store(&settings).await?;

    log::info!("Starting services.");
    services::start_services(store, settings).await
}

async fn connect_store(settings: &Settings) -> Result<Arc<dyn UserStore>, anyhow::Error> {
    match settings.storage.backend {
        Backend::Postgres => {
            let conn = PgPoolOptions::new()
                .max_connections(settings.postgres.max_connections)
                .connect(&settings.postgres.url)
                .await
                .context("Could not connect to database.")?;
            log::info!("Connected to database.");

            let repository = UserRepository::new(conn);
            log::info!("Running migrations.");
            repository
                .migrate()
                .await
                .context("Could not run migrations.")?;

            Ok(Arc::new(repository))
        }
        Backend::Memory => {
            log::warn!("Using in-memory user store; data is lost on exit.");
            Ok(Arc::new(MemoryUserRepository::new()))
        }
    }
}

fn init_logging(path: &str) -> Result<(), anyhow::Error> {
    if !Path::new("logs").exists() {
        fs::create_dir("logs")?;
    }

    match log4rs::init_file(path, Default::default()) {
        Ok(_) => {
            println!("[*] Logging initialized successfully.");
            Ok(())
        }
        Err(e) => {
            println!("[ERROR] Failed to initialize logging: {}", e);
            Err(anyhow::anyhow!("Could not initialize logging: {}", e))
        }
    }
}
