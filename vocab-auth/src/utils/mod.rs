pub mod client;
pub mod cookies;
pub mod password;
pub mod session;
pub mod validation;

pub use client::ClientInfo;
pub use password::{hash_password, verify_password, Password};
pub use validation::{validate_username, ValidatedJson, ValidatedQuery};
