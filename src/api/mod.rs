pub mod handlers;
pub mod request;
pub mod response;
pub mod routes;

pub use request::{ApiRequest, Caller, API_REQUEST_CONTENT_KEY, ROOT_NONCE_KEY};
pub use routes::{create_router, full_api_path};
