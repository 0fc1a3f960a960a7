pub mod credential;
pub mod error;
pub mod exchange;
pub mod manager;
pub mod store;

pub use error::CredentialError;
pub use exchange::TwitchTokenExchange;
pub use manager::{CredentialManager, ManagerOptions};
