//! Session-token lifecycle: storage, exchange and single-flight refresh.

pub mod exchange;
pub mod refresh;
pub mod token_store;

pub use exchange::{HttpTokenExchange, REFRESH_TOKEN_HEADER, TokenExchange, TokenPair};
pub use refresh::RefreshCoordinator;
pub use token_store::{FileTokenStore, MemoryTokenStore, TokenStore};
