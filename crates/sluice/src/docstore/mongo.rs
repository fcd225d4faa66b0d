//! Live MongoDB collections.
//!
//! Each call opens its own client, reads the whole collection with an empty
//! filter and shuts the client down again. Documents are handed on as
//! relaxed extended JSON, the same shape `mongoexport` writes.

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::Client;
use mongodb::bson::{self, Bson, doc};
use snafu::prelude::*;
use tracing::debug;
use url::Url;

use super::traits::{Document, DocumentStore};
use crate::error::{DocumentStoreError, MongoConnectSnafu, MongoQuerySnafu, NotAnObjectSnafu};

/// URL schemes served by [`MongoDocumentStore`].
pub const MONGO_SCHEMES: [&str; 2] = ["mongodb", "mongodb+srv"];

/// Whether `url` points at a live MongoDB deployment.
pub fn is_mongo_url(url: &str) -> bool {
    url.split_once("://")
        .is_some_and(|(scheme, _)| MONGO_SCHEMES.contains(&scheme))
}

/// Document store reading straight from a MongoDB database.
#[derive(Clone)]
pub struct MongoDocumentStore {
    uri: String,
    database: String,
}

impl std::fmt::Debug for MongoDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MongoDocumentStore<{}>", self.describe())
    }
}

impl MongoDocumentStore {
    pub fn new(uri: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            database: database.into(),
        }
    }
}

#[async_trait]
impl DocumentStore for MongoDocumentStore {
    async fn fetch_all(&self, collection: &str) -> Result<Vec<Document>, DocumentStoreError> {
        let client = Client::with_uri_str(&self.uri)
            .await
            .context(MongoConnectSnafu {
                target: self.describe(),
            })?;

        let fetched = async {
            let cursor = client
                .database(&self.database)
                .collection::<bson::Document>(collection)
                .find(doc! {})
                .await?;
            cursor.try_collect::<Vec<_>>().await
        }
        .await;
        client.shutdown().await;

        let raw = fetched.context(MongoQuerySnafu { collection })?;
        debug!(collection, documents = raw.len(), "Fetched collection");

        raw.into_iter()
            .enumerate()
            .map(|(i, d)| bson_to_document(collection, i + 1, d))
            .collect()
    }

    fn describe(&self) -> String {
        let location = match Url::parse(&self.uri) {
            Ok(mut url) => {
                let _ = url.set_password(None);
                let _ = url.set_username("");
                url.set_query(None);
                url.to_string()
            }
            Err(_) => "mongodb://<unparseable>".to_string(),
        };
        format!("{}/{}", location.trim_end_matches('/'), self.database)
    }
}

/// Convert one BSON document to relaxed extended JSON.
pub(crate) fn bson_to_document(
    collection: &str,
    position: usize,
    document: bson::Document,
) -> Result<Document, DocumentStoreError> {
    match Bson::Document(document).into_relaxed_extjson() {
        serde_json::Value::Object(map) => Ok(map),
        _ => NotAnObjectSnafu {
            collection,
            line: position,
        }
        .fail(),
    }
}
