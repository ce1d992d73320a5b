pub mod headers;
pub mod multipart;
pub mod requestbody;
pub mod response;
pub mod retry;
pub mod transaction;

// Re-exports for convenience
pub use headers::HeaderSet;
pub use requestbody::RequestBody;
pub use response::{ClientResponse, ResponseData};
pub use retry::RetryPolicy;
