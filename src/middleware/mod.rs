pub mod response;
pub mod tenancy;

pub use response::{ApiResponse, ApiResult};
pub use tenancy::{service_tenancy_middleware, tenancy_middleware};
