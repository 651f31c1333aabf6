use surrealdb::{
    engine::any::{connect, Any},
    opt::auth::Root,
    Error, Surreal,
};

use crate::storage::types::StoredObject;

#[derive(Clone)]
pub struct SurrealDbClient {
    pub client: Surreal<Any>,
}

impl SurrealDbClient {
    pub async fn new(
        address: &str,
        username: &str,
        password: &str,
        namespace: &str,
        database: &str,
    ) -> Result<Self, Error> {
        let db = connect(address).await?;

        // Sign in to database
        db.signin(Root { username, password }).await?;

        // Set namespace
        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }

    /// In-memory instance, used by tests and local smoke runs.
    pub async fn memory(namespace: &str, database: &str) -> Result<Self, Error> {
        let db = connect("mem://").await?;
        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }

    /// Defines the vector and filter indexes the retriever depends on.
    /// Re-defining with a new dimension drops the previous HNSW index first.
    pub async fn ensure_indexes(&self, embedding_dimension: usize) -> Result<(), Error> {
        self.client
            .query(format!(
                "REMOVE INDEX IF EXISTS idx_embedding_document_chunk ON TABLE document_chunk;
                 DEFINE INDEX idx_embedding_document_chunk ON TABLE document_chunk FIELDS embedding HNSW DIMENSION {embedding_dimension};"
            ))
            .await?;
        self.client
            .query("DEFINE INDEX IF NOT EXISTS idx_chunk_department ON TABLE document_chunk FIELDS department")
            .await?;

        Ok(())
    }

    pub async fn store_item<T>(&self, item: T) -> Result<Option<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client
            .create((T::table_name(), item.get_id()))
            .content(item)
            .await
    }

    pub async fn get_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select((T::table_name(), id)).await
    }

    pub async fn query(
        &self,
        query: impl surrealdb::opt::IntoQuery,
    ) -> Result<surrealdb::Response, Error> {
        self.client.query(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn memory_instance_answers_queries() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb");

        let response = db.query("RETURN 1 + 1").await;
        assert!(response.is_ok());
    }

    #[tokio::test]
    async fn ensure_indexes_is_idempotent() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb");

        db.ensure_indexes(3).await.expect("first definition");
        db.ensure_indexes(3).await.expect("re-definition");
    }
}
