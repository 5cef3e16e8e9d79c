use catalogflow_search::SearchClient;
use serde_json::Value;
use tracing::info;

use crate::config::Settings;
use crate::error::Result;

/// Index existence checks and creation.
#[trait_variant::make(IndexAdmin: Send)]
#[allow(dead_code)]
pub trait LocalIndexAdmin {
    async fn index_exists(&self, index: &str) -> Result<bool>;

    async fn create_index(&self, index: &str, settings: Option<&Value>) -> Result<()>;
}

impl IndexAdmin for SearchClient {
    async fn index_exists(&self, index: &str) -> Result<bool> {
        Ok(SearchClient::index_exists(self, index).await?)
    }

    async fn create_index(&self, index: &str, settings: Option<&Value>) -> Result<()> {
        SearchClient::create_index(self, index, settings)
            .await?
            .into_result()?;
        Ok(())
    }
}

/// Creates every configured locale index that does not exist yet. Returns the names of the
/// indices that were created.
pub async fn provision_indices<A: IndexAdmin + Sync>(
    admin: &A,
    settings: &Settings,
    index_settings: Option<&Value>,
) -> Result<Vec<String>> {
    let mut created = Vec::new();
    for (locale, index) in &settings.indices {
        if admin.index_exists(index).await? {
            info!(locale, index, "Index already exists");
            continue;
        }
        admin.create_index(index, index_settings).await?;
        info!(locale, index, "Created index");
        created.push(index.clone());
    }
    Ok(created)
}
