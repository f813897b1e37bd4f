//! API clients: authentication principals for C7.

pub mod jwt;
pub mod model;

pub use jwt::{Claims, JwtService};
pub use model::{hash_api_key, Client, ClientStatus, ClientStore, ClientStoreError, Scope};
