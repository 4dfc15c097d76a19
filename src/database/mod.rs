pub mod cascade;
pub mod manager;
pub mod repository;
pub mod store;

pub use cascade::{CascadeMode, CascadeRegistry, CascadeRule};
pub use manager::{DatabaseError, PoolRegistry, PoolSettings};
pub use repository::{Page, Paginated, ResourceRepository};
pub use store::{DataStoreProvider, DataStoreTarget, PgDataStore, PgDataStoreProvider};
