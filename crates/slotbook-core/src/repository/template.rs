//! Slot template repository trait definition.

use slotbook_types::error::RepositoryError;
use slotbook_types::id::{StoreId, TemplateId};
use slotbook_types::template::Template;

/// Repository trait for slot template persistence.
///
/// Implementations live in slotbook-infra (e.g., SqliteTemplateRepository).
pub trait TemplateRepository: Send + Sync {
    /// Create a new template. Returns `Conflict` if the store already has one with that name.
    fn create(
        &self,
        template: &Template,
    ) -> impl std::future::Future<Output = Result<Template, RepositoryError>> + Send;

    fn get_by_id(
        &self,
        id: &TemplateId,
    ) -> impl std::future::Future<Output = Result<Option<Template>, RepositoryError>> + Send;

    /// All templates of a store, newest first.
    fn list_by_store(
        &self,
        store_id: &StoreId,
    ) -> impl std::future::Future<Output = Result<Vec<Template>, RepositoryError>> + Send;

    /// The store's active template, if any.
    fn get_active_by_store(
        &self,
        store_id: &StoreId,
    ) -> impl std::future::Future<Output = Result<Option<Template>, RepositoryError>> + Send;

    /// Overwrite name, status and rules. Returns `NotFound` if the row is gone
    /// and `Conflict` if the new name is taken within the store.
    fn update(
        &self,
        template: &Template,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Returns `NotFound` if there was nothing to delete.
    fn delete(
        &self,
        id: &TemplateId,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Activate a template and deactivate the store's others in one transaction.
    fn activate(
        &self,
        store_id: &StoreId,
        id: &TemplateId,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
