use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::OnceCell;
use tracing::info;

use crate::dao::{models::SessionEntity, session_store::SessionStore, storage::StorageResult};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{CouchSessionDocument, RevisionOnly, session_doc_id},
};

/// CouchDB-backed [`SessionStore`] implementation.
#[derive(Clone)]
pub struct CouchSessionStore {
    client: Client,
    base_url: Arc<Url>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
    /// Set once the database has been created (or found) for this store.
    schema: Arc<OnceCell<()>>,
}

impl CouchSessionStore {
    /// Build a client for the configured server and check that it answers.
    ///
    /// The database itself is created lazily by the first document operation.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Url::parse(&config.base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| CouchDaoError::InvalidBaseUrl {
                url: config.base_url.clone(),
            })?;
        let auth = config
            .credentials
            .map(|(user, pass)| (Arc::<str>::from(user), Arc::<str>::from(pass)));

        let store = Self {
            client,
            base_url: Arc::new(base_url),
            database: Arc::<str>::from(config.database),
            auth,
            schema: Arc::new(OnceCell::new()),
        };

        store.ping().await?;
        Ok(store)
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = (*self.base_url).clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            path.extend(segments);
        }
        url
    }

    fn with_auth(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.auth {
            Some((ref user, ref pass)) => builder.basic_auth(user.as_ref(), Some(pass.as_ref())),
            None => builder,
        }
    }

    fn request(&self, method: Method, doc_id: &str) -> RequestBuilder {
        let url = self.url(&[self.database.as_ref(), doc_id]);
        self.with_auth(self.client.request(method, url))
    }

    async fn ping(&self) -> CouchResult<()> {
        let url = self.url(&[]);
        let target = url.to_string();
        let response = self
            .with_auth(self.client.get(url))
            .send()
            .await
            .map_err(|source| CouchDaoError::Unreachable {
                url: target.clone(),
                source,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(CouchDaoError::PingStatus {
                url: target,
                status: response.status(),
            })
        }
    }

    /// Create the database on first use; a failed attempt is retried next time.
    async fn ensure_schema(&self) -> CouchResult<()> {
        self.schema
            .get_or_try_init(|| self.ensure_database())
            .await
            .map(|_| ())
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = self.url(&[self.database.as_ref()]);

        let response = self
            .with_auth(self.client.get(url.clone()))
            .send()
            .await
            .map_err(|source| CouchDaoError::Database {
                database: database.clone(),
                action: "look up",
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .with_auth(self.client.put(url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::Database {
                        database: database.clone(),
                        action: "create",
                        source,
                    })?;
                // 412 means another process created it in the meantime.
                if create.status().is_success()
                    || create.status() == StatusCode::PRECONDITION_FAILED
                {
                    info!(database = %database, "created CouchDB database");
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::DocumentRequest {
                document: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CouchDaoError::DecodeDocument {
                        document: doc_id.to_string(),
                        source,
                    }
                })
            }
            other => Err(CouchDaoError::DocumentStatus {
                document: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<()>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::DocumentRequest {
                document: doc_id.to_string(),
                source,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(CouchDaoError::DocumentStatus {
                document: doc_id.to_string(),
                status: response.status(),
            })
        }
    }

    async fn delete_document(&self, doc_id: &str, rev: &str) -> CouchResult<bool> {
        let response = self
            .request(Method::DELETE, doc_id)
            .query(&[("rev", rev)])
            .send()
            .await
            .map_err(|source| CouchDaoError::DocumentRequest {
                document: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            other => Err(CouchDaoError::DocumentStatus {
                document: doc_id.to_string(),
                status: other,
            }),
        }
    }
}

impl SessionStore for CouchSessionStore {
    fn find_session(
        &self,
        project_id: &str,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        let doc_id = session_doc_id(project_id);
        Box::pin(async move {
            store.ensure_schema().await?;
            let maybe_doc = store.get_document::<CouchSessionDocument>(&doc_id).await?;
            Ok(maybe_doc.map(CouchSessionDocument::into_entity))
        })
    }

    fn upsert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_schema().await?;
            let doc_id = session_doc_id(&session.project_id);
            let rev = store
                .get_document::<RevisionOnly>(&doc_id)
                .await?
                .map(|existing| existing.rev);
            let doc = CouchSessionDocument::from_entity(session, rev);
            store.put_document(&doc_id, &doc).await.map_err(Into::into)
        })
    }

    fn delete_session(&self, project_id: &str) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let doc_id = session_doc_id(project_id);
        Box::pin(async move {
            store.ensure_schema().await?;
            let Some(existing) = store.get_document::<RevisionOnly>(&doc_id).await? else {
                return Ok(false);
            };
            store
                .delete_document(&doc_id, &existing.rev)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.ping().await?;
            store.ensure_schema().await.map_err(Into::into)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(base_url: &str) -> CouchSessionStore {
        CouchSessionStore {
            client: Client::new(),
            base_url: Arc::new(Url::parse(base_url).unwrap()),
            database: Arc::from("planning_poker"),
            auth: None,
            schema: Arc::new(OnceCell::new()),
        }
    }

    #[test]
    fn document_urls_escape_project_ids() {
        let store = store("http://localhost:5984/");
        let url = store.url(&["planning_poker", &session_doc_id("team/alpha")]);
        assert_eq!(
            url.as_str(),
            "http://localhost:5984/planning_poker/planning_poker:team%2Falpha"
        );
    }

    #[test]
    fn prefixed_base_urls_are_kept() {
        let store = store("http://couch.internal/db-proxy");
        let url = store.url(&["planning_poker"]);
        assert_eq!(url.as_str(), "http://couch.internal/db-proxy/planning_poker");
    }
}
