//! Browse and edit the tables of a SQL database whose schema is only known at
//! runtime.
//!
//! ```no_run
//! use tabledesk::{AppConfig, OrmStruct, Table, ListParams};
//!
//! # async fn demo() -> tabledesk::Result<()> {
//! let config = AppConfig::for_url("sqlite://app.db?mode=rwc");
//! let orm = OrmStruct::connect(&config).await?;
//! let users = Table::open(&orm, "users").await?;
//! let page = users
//!     .list(&ListParams { page: 1, per_page: 20, ..ListParams::default() })
//!     .await?;
//! println!("{} of {} rows", page.rows.len(), page.total);
//! # Ok(())
//! # }
//! ```

pub mod libs;

pub use libs::*;
