pub mod config;
pub mod dialect;
pub mod error;
pub mod orm;
pub mod query_builder;
pub mod record;
pub mod render;
pub mod schema;
pub mod server;
pub mod table;

// Re-export them for easier access from main.rs
pub use config::*;
pub use dialect::*;
pub use error::*;
pub use orm::*;
pub use query_builder::*;
pub use record::*;
pub use schema::*;
pub use table::*;
