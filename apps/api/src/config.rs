use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};

/// Document-analysis backend used to turn uploaded PDFs into text.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractorConfig {
    /// Azure Document Intelligence, prebuilt document model.
    Azure { endpoint: String, key: String },
    /// Local `pdf-extract` parsing. Development only.
    LocalPdf,
}

/// Document database holding the job and resume collections.
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseConfig {
    /// Azure Cosmos DB for MongoDB (vCore) with vector search.
    Cosmos {
        user: String,
        password: String,
        server: String,
        database_name: String,
    },
    /// Process-local store. Contents are lost on restart.
    Memory,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub endpoint: String,
    pub api_version: String,
    /// Azure deployment name of the embeddings model.
    pub embeddings_model: String,
}

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai: OpenAiConfig,
    pub extractor: ExtractorConfig,
    pub database: DatabaseConfig,
    pub jobs_collection: String,
    pub resumes_collection: String,
    pub embedding_dimensions: usize,
    pub default_top_k: usize,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    /// Whole-request timeout for the Azure clients. Defaults to 120s rather
    /// than reqwest's unbounded default, so a stalled call fails the request.
    pub http_timeout_secs: u64,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // An explicit env file wins over a .env in the working directory.
        match std::env::var("RESUMERANK_ENV_FILE") {
            Ok(path) => {
                dotenvy::from_path(&path)
                    .with_context(|| format!("Failed to load env file '{path}'"))?;
            }
            Err(_) => {
                dotenvy::dotenv().ok();
            }
        }

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);

        let openai = OpenAiConfig {
            api_key: env.require("OPENAI_API_KEY")?,
            endpoint: env.require("OPENAI_API_ENDPOINT")?,
            api_version: env.or("OPENAI_API_VERSION", "2023-05-15"),
            embeddings_model: env.require("OPENAI_EMBEDDINGS_MODEL")?,
        };

        let extractor = match env.or("EXTRACTOR_BACKEND", "azure").to_lowercase().as_str() {
            "azure" => ExtractorConfig::Azure {
                endpoint: env.require("DOC_INT_ENDPOINT")?,
                key: env.require("DOC_INT_KEY")?,
            },
            "local" => ExtractorConfig::LocalPdf,
            other => bail!("EXTRACTOR_BACKEND must be 'azure' or 'local', got '{other}'"),
        };

        let database = match env.or("DATABASE_BACKEND", "cosmos").to_lowercase().as_str() {
            "cosmos" => DatabaseConfig::Cosmos {
                user: env.require("COSMOS_DB_MONGO_USER")?,
                password: env.require("COSMOS_DB_MONGO_PWD")?,
                server: env.require("COSMOS_DB_MONGO_SERVER")?,
                database_name: env.or("DATABASE_NAME", "JobDatabase"),
            },
            "memory" => DatabaseConfig::Memory,
            other => bail!("DATABASE_BACKEND must be 'cosmos' or 'memory', got '{other}'"),
        };

        let embedding_dimensions: usize = env.parse("EMBEDDING_DIMENSIONS", 1536)?;
        if embedding_dimensions == 0 {
            bail!("EMBEDDING_DIMENSIONS must be greater than zero");
        }
        let default_top_k: usize = env.parse("RANKING_TOP_K", 1)?;
        if default_top_k == 0 {
            bail!("RANKING_TOP_K must be greater than zero");
        }

        Ok(Config {
            openai,
            extractor,
            database,
            jobs_collection: env.or("JOBS_COLLECTION", "jobs_collections"),
            resumes_collection: env.or("RESUMES_COLLECTION", "applicants_resumes"),
            embedding_dimensions,
            default_top_k,
            upload_dir: PathBuf::from(env.or("UPLOAD_DIR", "uploads")),
            max_upload_bytes: env.parse("MAX_UPLOAD_BYTES", 16 * 1024 * 1024)?,
            http_timeout_secs: env.parse("HTTP_TIMEOUT_SECS", 120)?,
            port: env.parse("PORT", 5111)?,
            rust_log: env.or("RUST_LOG", "info"),
        })
    }
}

impl DatabaseConfig {
    /// Connection string for the Cosmos vCore cluster. Credentials are attached
    /// separately on the client options so they never need URL-encoding.
    pub fn connection_uri(&self) -> Option<String> {
        match self {
            DatabaseConfig::Cosmos { server, .. } => Some(format!(
                "mongodb+srv://{server}/?tls=true&authMechanism=SCRAM-SHA-256&retrywrites=false&maxIdleTimeMS=120000"
            )),
            DatabaseConfig::Memory => None,
        }
    }
}

struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn require(&self, key: &str) -> Result<String> {
        self.get(key)
            .with_context(|| format!("Required environment variable '{key}' is not set"))
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .with_context(|| format!("{key} has an invalid value '{raw}'")),
            None => Ok(default),
        }
    }
}
