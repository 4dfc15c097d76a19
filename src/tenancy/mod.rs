pub mod cache;
pub mod context;
pub mod error;
pub mod facts;
pub mod lookup;
pub mod resolver;
pub mod router;

pub use cache::{CacheError, MemoryTenantCache, TenantCache};
pub use context::TenantContext;
pub use error::TenancyError;
pub use facts::{ConnectionMode, ConnectionParams, TenantConnectionFacts, TenantKey, TenantRecord};
pub use lookup::{PgTenantLookup, TenantLookup};
pub use resolver::TenantResolver;
pub use router::ConnectionRouter;
