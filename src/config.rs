use crate::error::ConfigurationError;
use crate::util;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

fn default_mongodb_uri() -> String {
    if let Ok(uri) = env::var("MONGODB_URI") {
        return uri;
    }
    match (env::var("DB_USER"), env::var("DB_PASS"), env::var("DB_HOST")) {
        (Ok(user), Ok(pass), Ok(host)) => format!(
            "mongodb+srv://{}:{}@{}/?retryWrites=true&w=majority",
            user, pass, host
        ),
        _ => "mongodb://localhost:27017".to_string(),
    }
}

fn default_mongodb_db() -> String {
    env::var("MONGODB_DB_NAME").unwrap_or("sportZone".to_string())
}

fn default_address() -> IpAddr {
    env::var("ADDRESS")
        .ok()
        .and_then(|it| it.parse().ok())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

fn default_port() -> u16 {
    env::var("PORT")
        .ok()
        .and_then(|it| it.parse().ok())
        .unwrap_or(5000)
}

fn default_payment_api_base() -> String {
    env::var("PAYMENT_API_BASE").unwrap_or("https://api.stripe.com".to_string())
}

fn default_currency() -> String {
    "usd".to_string()
}

fn default_payment_secret_key() -> Option<String> {
    env::var("PAYMENT_SECRET_KEY").ok().filter(|it| !it.is_empty())
}

/// Which backend holds users, classes, bookings and payments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    #[serde(rename = "mongodb")]
    MongoDb,
    Memory,
}

impl Default for StoreKind {
    fn default() -> Self {
        StoreKind::MongoDb
    }
}

/// How a completed payment moves the class seat counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatAdjustment {
    /// Conditional decrement in a single store operation; a full class rejects
    /// the payment.
    Atomic,
    /// Read the class, then write `seats - 1` / `totalStudents + 1`. Concurrent
    /// completions can lose updates and seats can go negative.
    ReadModifyWrite,
}

impl Default for SeatAdjustment {
    fn default() -> Self {
        SeatAdjustment::Atomic
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip)]
    file_path: PathBuf,

    #[serde(default = "default_mongodb_uri")]
    pub mongodb_uri: String,
    #[serde(default = "default_mongodb_db")]
    pub mongodb_db: String,
    #[serde(default)]
    pub store: StoreKind,

    #[serde(default = "default_address")]
    pub address: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_payment_api_base")]
    pub payment_api_base: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_payment_secret_key", skip_serializing)]
    pub payment_secret_key: Option<String>,

    #[serde(default)]
    pub seat_adjustment: SeatAdjustment,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            file_path: config_dir().join("settings.yml"),
            mongodb_uri: default_mongodb_uri(),
            mongodb_db: default_mongodb_db(),
            store: StoreKind::default(),
            address: default_address(),
            port: default_port(),
            payment_api_base: default_payment_api_base(),
            currency: default_currency(),
            payment_secret_key: default_payment_secret_key(),
            seat_adjustment: SeatAdjustment::default(),
        }
    }
}

#[inline]
fn config_dir() -> PathBuf {
    PathBuf::from(env::var("CONFIG_DIR").unwrap_or("./config".to_string()))
}

impl Config {
    pub fn load() -> Result<Config, ConfigurationError> {
        let config_file = util::find_first_subpath(
            config_dir(),
            &["settings.yml", "settings.yaml"],
            Path::exists,
        )
        .ok_or_else(|| ConfigurationError::NotFound(config_dir()))?;

        let file = File::open(&config_file)?;
        let mut config: Config = serde_yaml::from_reader(BufReader::new(file))?;
        config.file_path = config_file;

        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigurationError> {
        if let Some(dir) = self.file_path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let file = File::create(&self.file_path)?;
        let mut out = BufWriter::new(file);
        serde_yaml::to_writer(&mut out, self)?;
        out.flush()?;
        Ok(())
    }
}
