//! Throwaway MongoDB server for component tests

use std::time::Duration;

use mongodb::bson::{doc, Document};
use mongodb::{Client, Database};
use tempfile::TempDir;
use tracing::{debug, info};

use crate::config::MongoConfig;
use crate::error::{ComponentError, ComponentResult};
use crate::server::{find_free_port, ProcessConfig, ProcessHandle};
use crate::utils::random_database;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Documents removed from one database, per collection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletedDocuments {
    pub database: String,
    pub count: u64,
    pub collections: Vec<CollectionDeletedDocuments>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDeletedDocuments {
    pub name: String,
    pub count: u64,
}

/// A `mongod` process on a temporary data directory, plus a client bound to
/// one database
pub struct MongoFeature {
    // Field order matters: the server stops before its data directory goes.
    server: ProcessHandle,
    data_dir: TempDir,
    client: Client,
    database: Database,
    port: u16,
}

impl MongoFeature {
    pub async fn start() -> ComponentResult<Self> {
        Self::with_config(&MongoConfig::default()).await
    }

    pub async fn with_config(config: &MongoConfig) -> ComponentResult<Self> {
        let port = match config.port {
            Some(port) => port,
            None => find_free_port()?,
        };
        let data_dir = tempfile::Builder::new().prefix("mongod-").tempdir()?;

        let mut server = ProcessHandle::spawn(
            ProcessConfig::new("mongod", &config.binary_path)
                .arg("--dbpath")
                .arg(data_dir.path())
                .arg("--port")
                .arg(port.to_string())
                .arg("--bind_ip")
                .arg("127.0.0.1")
                .arg("--quiet"),
        )?;

        let client = Client::with_uri_str(connection_uri(port)).await?;
        let timeout = Duration::from_millis(config.startup_timeout_ms);
        server
            .wait_until_ready(timeout, POLL_INTERVAL, || ping_once(&client))
            .await?;

        let name = config.database.clone().unwrap_or_else(random_database);
        let database = client.database(&name);
        info!("MongoDB ready on 127.0.0.1:{} (database {})", port, name);

        Ok(Self {
            server,
            data_dir,
            client,
            database,
            port,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Connection URI for the service under test
    pub fn uri(&self) -> String {
        connection_uri(self.port)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn data_dir(&self) -> &std::path::Path {
        self.data_dir.path()
    }

    /// Drop the scenario database
    pub async fn reset(&mut self) -> ComponentResult<()> {
        debug!("Dropping database {}", self.database.name());
        self.database.drop().await?;
        Ok(())
    }

    /// Empty every collection of `database_name`
    pub async fn reset_database(&self, database_name: &str) -> ComponentResult<DeletedDocuments> {
        let names = self
            .client
            .database(database_name)
            .list_collection_names()
            .await?;
        self.reset_collections(database_name, &names).await
    }

    /// Empty each named collection, keeping the collections themselves
    pub async fn reset_collections(
        &self,
        database_name: &str,
        collection_names: &[String],
    ) -> ComponentResult<DeletedDocuments> {
        let database = self.client.database(database_name);
        let mut deleted = DeletedDocuments {
            database: database_name.to_string(),
            ..DeletedDocuments::default()
        };

        for name in collection_names {
            let result = database
                .collection::<Document>(name)
                .delete_many(doc! {})
                .await?;
            debug!("Deleted {} documents from {}.{}", result.deleted_count, database_name, name);

            deleted.count += result.deleted_count;
            deleted.collections.push(CollectionDeletedDocuments {
                name: name.clone(),
                count: result.deleted_count,
            });
        }

        Ok(deleted)
    }

    /// Empty the scenario database; fails when it held no documents
    pub async fn remove_all_documents(&self) -> ComponentResult<()> {
        let deleted = self.reset_database(self.database.name()).await?;
        if deleted.count == 0 {
            return Err(ComponentError::AssertionFailed(format!(
                "no documents were deleted in database: {}",
                deleted.database
            )));
        }
        Ok(())
    }

    /// Empty a comma separated list of collections; fails when any of them
    /// was already empty
    pub async fn remove_all_documents_in(&self, collection_names: &str) -> ComponentResult<()> {
        let names: Vec<String> = collection_names
            .replace(' ', "")
            .split(',')
            .map(str::to_string)
            .collect();

        let deleted = self.reset_collections(self.database.name(), &names).await?;
        if deleted.count == 0 {
            return Err(ComponentError::AssertionFailed(format!(
                "no documents were deleted in database: {}",
                deleted.database
            )));
        }
        if let Some(empty) = deleted.collections.iter().find(|c| c.count == 0) {
            return Err(ComponentError::AssertionFailed(format!(
                "no documents were deleted for collection: {} in database: {}",
                empty.name, deleted.database
            )));
        }
        Ok(())
    }

    /// Insert a JSON object into `collection`
    pub async fn document_exists_in(&self, collection: &str, json: &str) -> ComponentResult<()> {
        let object: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)?;
        let document = mongodb::bson::to_document(&object)?;
        self.database
            .collection::<Document>(collection)
            .insert_one(document)
            .await?;
        Ok(())
    }

    /// Assert no document in `collection` has string field `key` equal to `value`
    pub async fn document_does_not_exist(
        &self,
        key: &str,
        value: &str,
        collection: &str,
    ) -> ComponentResult<()> {
        let mut filter = Document::new();
        filter.insert(key, value);

        let found = self
            .database
            .collection::<Document>(collection)
            .find_one(filter)
            .await?;
        match found {
            None => Ok(()),
            Some(_) => Err(ComponentError::AssertionFailed(format!(
                "Document with property {key}: {value} was found in the collection"
            ))),
        }
    }

    pub async fn is_healthy(&self) -> ComponentResult<()> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await?;
        Ok(())
    }

    /// Kill the server mid-scenario to exercise failure paths
    pub fn stops_running(&mut self) -> ComponentResult<()> {
        self.server.stop()
    }

    pub fn close(&mut self) -> ComponentResult<()> {
        self.server.stop()
    }
}

impl std::fmt::Debug for MongoFeature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoFeature")
            .field("port", &self.port)
            .field("database", &self.database.name())
            .field("data_dir", &self.data_dir.path())
            .field("server", &self.server)
            .finish_non_exhaustive()
    }
}

// Short server selection so each readiness attempt fails fast.
fn connection_uri(port: u16) -> String {
    format!("mongodb://127.0.0.1:{port}/?directConnection=true&serverSelectionTimeoutMS=500")
}

async fn ping_once(client: &Client) -> bool {
    client
        .database("admin")
        .run_command(doc! { "ping": 1 })
        .await
        .is_ok()
}
