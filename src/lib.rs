pub mod backend;
pub mod client;
pub mod clock;
pub mod config;
pub mod duration;
pub mod error;
pub mod lease;
pub mod paths;
pub mod settings;
pub mod storage;
pub mod tokens;
pub mod users;

pub use backend::Backend;
pub use error::{BrokerError, Result};
