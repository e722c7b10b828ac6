//! ConfigStore port - named header sets.
//!
//! Reference checks ("is a task still using this configuration?") belong to
//! the caller; the store only guarantees name uniqueness.

use async_trait::async_trait;

use super::task_store::StoreError;
use crate::domain::{ConfigId, ConfigPatch, Configuration, NewConfiguration};

#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// `StoreError::Conflict` when the name is taken.
    async fn create_configuration(
        &self,
        new: NewConfiguration,
    ) -> Result<Configuration, StoreError>;

    async fn load_configuration(&self, id: ConfigId)
    -> Result<Option<Configuration>, StoreError>;

    async fn list_configurations(&self) -> Result<Vec<Configuration>, StoreError>;

    async fn update_configuration(
        &self,
        id: ConfigId,
        patch: ConfigPatch,
    ) -> Result<Configuration, StoreError>;

    async fn delete_configuration(&self, id: ConfigId) -> Result<bool, StoreError>;
}
