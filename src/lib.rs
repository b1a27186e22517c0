#[macro_use]
extern crate rocket;

use std::sync::Arc;

use bson::doc;
use mongodb::Client;
use rocket::http::Method;
use rocket::{Build, Rocket};
use rocket_cors::{AllowedHeaders, AllowedOrigins};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::config::{Config, StoreKind};
use crate::data::memory::MemoryStore;
use crate::data::Db;
use crate::error::{BackendError, ConfigurationError};
use crate::payment::{Payments, StripeGateway};
use crate::resp::problem::problem_catcher;
use crate::route::mount_api;
use crate::security::Security;

pub mod config;
pub mod data;
pub mod error;
pub mod payment;
pub mod resp;
pub mod role;
pub mod route;
pub mod security;
pub mod util;

fn init_logging(level: Level) {
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();

    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Unable to set global logger: {}", err);
    };
    if let Err(err) = tracing_log::LogTracer::init() {
        eprintln!("Unable to forward log records: {}", err);
    }
}

fn load_config() -> Result<Config, ConfigurationError> {
    tracing::info!("Loading configuration...");
    match Config::load() {
        Ok(c) => {
            tracing::info!("Configuration loaded.");
            Ok(c)
        }
        Err(ConfigurationError::NotFound(dir)) => {
            tracing::info!("No configuration in '{}', using defaults.", dir.display());
            let c = Config::default();
            if c.save().is_err() {
                tracing::warn!("Unable to save generated configuration.");
            }
            Ok(c)
        }
        Err(other) => {
            tracing::error!("Configuration error: {}", other);
            Err(other)
        }
    }
}

async fn connect_mongodb(c: &Config) -> Result<Db, BackendError> {
    tracing::info!("Connecting to MongoDB...");
    let client = Client::with_uri_str(c.mongodb_uri.as_str()).await?;

    tracing::info!("Using MongoDB database: {}", c.mongodb_db);
    let db = client.database(c.mongodb_db.as_str());

    if let Err(e) = db.run_command(doc! { "ping": 1 }, None).await {
        tracing::error!("Unable to connect to MongoDB.");
        return Err(e.into());
    }

    Ok(Arc::new(db))
}

/// Reads the environment, configuration and signing secret, connects the
/// store and assembles the server.
pub async fn create(log_level: Option<Level>) -> Result<Rocket<Build>, BackendError> {
    if let Some(l) = log_level {
        init_logging(l);
    }

    tracing::info!("Reading .env file...");
    if dotenv::dotenv().is_err() {
        tracing::warn!("Unable to load .env file.");
    }

    let config = load_config()?;

    tracing::info!("Initializing token secret...");
    let security = Security::load()?;

    let db = match config.store {
        StoreKind::MongoDb => connect_mongodb(&config).await?,
        StoreKind::Memory => {
            tracing::warn!("Using in-memory store; data is lost on shutdown.");
            Arc::new(MemoryStore::default()) as Db
        }
    };

    let payments: Payments = Arc::new(StripeGateway::new(&config));

    build(config, security, db, payments)
}

/// Assembles the server from already constructed parts.
pub fn build(
    config: Config,
    security: Security,
    db: Db,
    payments: Payments,
) -> Result<Rocket<Build>, BackendError> {
    let figment = rocket::Config::figment()
        .merge(("address", config.address))
        .merge(("port", config.port));

    tracing::info!("Setting up CORS...");
    let cors = rocket_cors::CorsOptions {
        allowed_origins: AllowedOrigins::All,
        allowed_methods: vec![
            Method::Get,
            Method::Put,
            Method::Post,
            Method::Patch,
            Method::Delete,
            Method::Options,
        ]
        .into_iter()
        .map(From::from)
        .collect(),
        allowed_headers: AllowedHeaders::All,
        allow_credentials: true,
        ..Default::default()
    }
    .to_cors()?;

    let r = rocket::custom(figment)
        .manage(config)
        .manage(security)
        .manage(db)
        .manage(payments)
        .attach(cors)
        .register("/", catchers![problem_catcher]);

    Ok(mount_api(r))
}
