use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use tinylink_core::OwnerId;
use tinylink_worker::DEFAULT_WORKERS;

pub const BASE_URL_ENV: &str = "BASE_URL";
pub const STORAGE_BACKEND_ENV: &str = "TINYLINK_STORAGE_BACKEND";
pub const FILE_STORAGE_PATH_ENV: &str = "FILE_STORAGE_PATH";
pub const DATABASE_DSN_ENV: &str = "DATABASE_DSN";
pub const WORKERS_ENV: &str = "TINYLINK_WORKERS";
pub const OWNER_ENV: &str = "TINYLINK_OWNER";
pub const LOG_FORMAT_ENV: &str = "TINYLINK_LOG_FORMAT";

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackendArg {
    #[value(name = "in-memory")]
    InMemory,
    #[value(name = "file")]
    File,
    #[value(name = "postgres")]
    Postgres,
}

impl Display for StorageBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackendArg::InMemory => write!(f, "in-memory"),
            StorageBackendArg::File => write!(f, "file"),
            StorageBackendArg::Postgres => write!(f, "postgres"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "tinylink", about = "Shorten, resolve and manage short URLs")]
pub struct CLI {
    #[arg(long, env = BASE_URL_ENV, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Defaults to postgres when a DSN is set, file when a path is set,
    /// in-memory otherwise.
    #[arg(long, env = STORAGE_BACKEND_ENV, value_enum)]
    pub storage: Option<StorageBackendArg>,

    #[arg(long, env = FILE_STORAGE_PATH_ENV, required_if_eq("storage", "file"))]
    pub file_storage_path: Option<PathBuf>,

    #[arg(long, env = DATABASE_DSN_ENV, required_if_eq("storage", "postgres"))]
    pub database_dsn: Option<String>,

    #[arg(long, env = WORKERS_ENV, default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,

    #[arg(long, env = LOG_FORMAT_ENV, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

impl CLI {
    /// The backend to run against, applying the DSN > path > memory fallback.
    pub fn storage_backend(&self) -> StorageBackendArg {
        match (self.storage, &self.database_dsn, &self.file_storage_path) {
            (Some(storage), _, _) => storage,
            (None, Some(_), _) => StorageBackendArg::Postgres,
            (None, None, Some(_)) => StorageBackendArg::File,
            (None, None, None) => StorageBackendArg::InMemory,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Shorten one URL. A fresh owner id is minted when none is given.
    Shorten {
        url: String,
        #[arg(long, env = OWNER_ENV)]
        owner: Option<OwnerId>,
        /// Run the save on the task pool.
        #[arg(long)]
        via_pool: bool,
    },
    /// Shorten a JSON array of `{correlation_id, original_url}` read from a
    /// file, or from stdin when the path is `-`.
    Batch {
        input: PathBuf,
        #[arg(long, env = OWNER_ENV)]
        owner: Option<OwnerId>,
    },
    /// Print the original URL for a code or short URL.
    Resolve { code: String },
    /// List the live URLs of an owner.
    List {
        #[arg(long, env = OWNER_ENV)]
        owner: OwnerId,
    },
    /// Soft-delete codes owned by an owner.
    Delete {
        #[arg(long, env = OWNER_ENV)]
        owner: OwnerId,
        #[arg(required = true)]
        codes: Vec<String>,
        /// Queue the delete and return without waiting for its result.
        #[arg(long)]
        detach: bool,
    },
    /// Check storage connectivity.
    Ping,
    /// Count live URLs and owners.
    Stats,
}
