//! Store and staff directory traits.

use slotbook_types::error::RepositoryError;
use slotbook_types::id::{StaffId, StoreId};
use slotbook_types::store::{StaffMember, Store, StoreStatus, WorkStatus};

/// Read-side directory queried by the daily slot scheduler.
pub trait StoreDirectory: Send + Sync {
    /// Stores with status `operating`.
    fn list_operating_stores(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Store>, RepositoryError>> + Send;

    /// Technicians of the store whose work status is `working`.
    fn count_working_technicians(
        &self,
        store_id: &StoreId,
    ) -> impl std::future::Future<Output = Result<i32, RepositoryError>> + Send;
}

/// Administrative store and staff records.
pub trait StoreRepository: StoreDirectory {
    fn create_store(
        &self,
        store: &Store,
    ) -> impl std::future::Future<Output = Result<Store, RepositoryError>> + Send;

    fn get_store(
        &self,
        id: &StoreId,
    ) -> impl std::future::Future<Output = Result<Option<Store>, RepositoryError>> + Send;

    fn list_stores(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Store>, RepositoryError>> + Send;

    fn set_store_status(
        &self,
        id: &StoreId,
        status: StoreStatus,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn create_staff(
        &self,
        staff: &StaffMember,
    ) -> impl std::future::Future<Output = Result<StaffMember, RepositoryError>> + Send;

    fn get_staff(
        &self,
        id: &StaffId,
    ) -> impl std::future::Future<Output = Result<Option<StaffMember>, RepositoryError>> + Send;

    fn list_staff(
        &self,
        store_id: &StoreId,
    ) -> impl std::future::Future<Output = Result<Vec<StaffMember>, RepositoryError>> + Send;

    fn set_work_status(
        &self,
        id: &StaffId,
        status: WorkStatus,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
