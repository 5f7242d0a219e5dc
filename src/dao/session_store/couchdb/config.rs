use super::error::{CouchDaoError, CouchResult};

const BASE_URL_VAR: &str = "COUCH_BASE_URL";
const DATABASE_VAR: &str = "COUCH_DB";
const USERNAME_VAR: &str = "COUCH_USERNAME";
const PASSWORD_VAR: &str = "COUCH_PASSWORD";
const DEFAULT_DATABASE: &str = "planning_poker";

/// Where planning-poker session documents live in CouchDB.
#[derive(Debug, Clone)]
pub struct CouchConfig {
    /// Server root, e.g. `http://localhost:5984`.
    pub base_url: String,
    /// Database holding one document per project session.
    pub database: String,
    /// Basic-auth username and password, sent with every request when set.
    pub credentials: Option<(String, String)>,
}

impl CouchConfig {
    /// Create an empty instance.
    pub fn new(base_url: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            database: database.into(),
            credentials: None,
        }
    }

    /// Send basic auth with every request.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Read `COUCH_BASE_URL` (required), `COUCH_DB` and the optional
    /// `COUCH_USERNAME`/`COUCH_PASSWORD` pair.
    pub fn from_env() -> CouchResult<Self> {
        let base_url = std::env::var(BASE_URL_VAR)
            .map_err(|_| CouchDaoError::MissingEnvVar { var: BASE_URL_VAR })?;
        let database = std::env::var(DATABASE_VAR).unwrap_or_else(|_| DEFAULT_DATABASE.into());
        let config = Self::new(base_url, database);

        Ok(
            match (std::env::var(USERNAME_VAR), std::env::var(PASSWORD_VAR)) {
                (Ok(username), Ok(password)) => config.with_credentials(username, password),
                _ => config,
            },
        )
    }
}
