pub mod admin_auth;
pub mod requester;

pub use admin_auth::{require_internal_api_key, INTERNAL_API_KEY_HEADER};
pub use requester::{Requester, USER_ID_HEADER};
