use mongodb::options::ClientOptions;

use super::error::{MongoDaoError, MongoResult};

const DEFAULT_URI: &str = "mongodb://localhost:27017";
const DEFAULT_DB: &str = "planning_poker";

/// Connection settings for the MongoDB session store.
#[derive(Clone)]
pub struct MongoConfig {
    /// Parsed driver options.
    pub options: ClientOptions,
    /// Database holding the sessions collection.
    pub database_name: String,
}

impl MongoConfig {
    /// Parse `uri`, defaulting the database to `planning_poker`.
    pub async fn from_uri(uri: &str, db_name: Option<&str>) -> MongoResult<Self> {
        let database_name = db_name.unwrap_or(DEFAULT_DB).to_owned();
        let options =
            ClientOptions::parse(uri)
                .await
                .map_err(|source| MongoDaoError::InvalidUri {
                    uri: uri.to_owned(),
                    source,
                })?;

        Ok(Self {
            options,
            database_name,
        })
    }

    /// Read `MONGO_URI` (defaulting to a local server) and `MONGO_DB`.
    pub async fn from_env() -> MongoResult<Self> {
        let uri = std::env::var("MONGO_URI").unwrap_or_else(|_| DEFAULT_URI.into());
        let db = std::env::var("MONGO_DB").ok();
        Self::from_uri(&uri, db.as_deref()).await
    }
}
