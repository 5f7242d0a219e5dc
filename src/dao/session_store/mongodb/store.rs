use std::sync::Arc;

use futures::future::BoxFuture;
use mongodb::{
    Collection, Database, IndexModel,
    bson::doc,
    options::{ClientOptions, IndexOptions},
};
use tokio::sync::{OnceCell, RwLock};
use tracing::info;

use crate::dao::{models::SessionEntity, session_store::SessionStore, storage::StorageResult};

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::MongoSessionDocument,
};

const SESSION_COLLECTION_NAME: &str = "planning_poker_sessions";

/// MongoDB-backed [`SessionStore`] implementation.
#[derive(Clone)]
pub struct MongoSessionStore {
    database: Arc<RwLock<Database>>,
    options: Arc<ClientOptions>,
    database_name: Arc<str>,
    indexes: Arc<OnceCell<()>>,
}

impl MongoSessionStore {
    /// Connect and ping; indexes are created on first use.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let database = establish_connection(&config.options, &config.database_name).await?;
        Ok(Self {
            database: Arc::new(RwLock::new(database)),
            options: Arc::new(config.options),
            database_name: Arc::from(config.database_name),
            indexes: Arc::new(OnceCell::new()),
        })
    }

    async fn collection(&self) -> MongoResult<Collection<MongoSessionDocument>> {
        let database = self.database.read().await.clone();
        self.indexes
            .get_or_try_init(|| ensure_indexes(&database))
            .await?;
        Ok(database.collection::<MongoSessionDocument>(SESSION_COLLECTION_NAME))
    }

    async fn find(&self, project_id: String) -> MongoResult<Option<SessionEntity>> {
        let collection = self.collection().await?;
        let document = collection
            .find_one(doc! {"_id": project_id.as_str()})
            .await
            .map_err(|source| MongoDaoError::LoadSession { project_id, source })?;
        Ok(document.map(Into::into))
    }

    async fn upsert(&self, session: SessionEntity) -> MongoResult<()> {
        let collection = self.collection().await?;
        let project_id = session.project_id.clone();
        let document: MongoSessionDocument = session.into();

        collection
            .replace_one(doc! {"_id": project_id.as_str()}, &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveSession { project_id, source })?;
        Ok(())
    }

    async fn delete(&self, project_id: String) -> MongoResult<bool> {
        let collection = self.collection().await?;
        let result = collection
            .delete_one(doc! {"_id": project_id.as_str()})
            .await
            .map_err(|source| MongoDaoError::DeleteSession { project_id, source })?;
        Ok(result.deleted_count > 0)
    }

    async fn ping(&self) -> MongoResult<()> {
        let database = self.database.read().await.clone();
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let database = establish_connection(&self.options, &self.database_name).await?;
        *self.database.write().await = database;
        info!("MongoDB connection re-established");
        Ok(())
    }
}

/// Index on `board_id` so sessions can be looked up per board.
async fn ensure_indexes(database: &Database) -> MongoResult<()> {
    let collection = database.collection::<mongodb::bson::Document>(SESSION_COLLECTION_NAME);
    let model = IndexModel::builder()
        .keys(doc! {"board_id": 1})
        .options(
            IndexOptions::builder()
                .name(Some("session_board_idx".to_string()))
                .build(),
        )
        .build();
    collection
        .create_index(model)
        .await
        .map_err(|source| MongoDaoError::EnsureIndex {
            collection: SESSION_COLLECTION_NAME,
            index: "board_id",
            source,
        })?;
    Ok(())
}

impl SessionStore for MongoSessionStore {
    fn find_session(
        &self,
        project_id: &str,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        let project_id = project_id.to_owned();
        Box::pin(async move { store.find(project_id).await.map_err(Into::into) })
    }

    fn upsert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.upsert(session).await.map_err(Into::into) })
    }

    fn delete_session(&self, project_id: &str) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let project_id = project_id.to_owned();
        Box::pin(async move { store.delete(project_id).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.reconnect().await.map_err(Into::into) })
    }
}
