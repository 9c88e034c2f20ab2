/*
 * recbase - async client for a PocketBase-compatible record store
 *
 * SPDX-License-Identifier: Apache-2.0
 */
//! # Recbase Rust API Client
//!
//! Async client for the admin HTTP API of a PocketBase-compatible
//! multi-tenant record store.
//!
//! ## Features
//!
//! - admin password authentication with cached bearer token
//! - paginated record listing with optional filter expressions
//! - record create/read/update by identity
//! - file attachment download
//! - server-side full-database snapshot trigger/download/upload
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use recbase::prelude::*;
//! # async fn example() -> Result<(), RecbaseError> {
//! let config = ClientConfig::default();
//! let client = RecbaseClient::with_config(config)?;
//! client.login().await?;
//!
//! // fetch every record in a collection, following pagination
//! let fetched = client.fetch_all("owners", None).await;
//! for owner in &fetched.records {
//!     println!("{}", owner.id().unwrap_or("(no id)"));
//! }
//! # Ok(())
//! # }
//! ```
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![warn(clippy::default_trait_access)]
#![warn(clippy::doc_markdown)]
#![warn(clippy::explicit_iter_loop)]
#![warn(clippy::implicit_clone)]
#![warn(clippy::match_same_arms)]
#![warn(clippy::redundant_clone)]
#![warn(clippy::redundant_closure)]
#![warn(clippy::uninlined_format_args)]
#![warn(clippy::unnecessary_wraps)]
#![warn(clippy::unused_async)]

pub mod client;
pub mod error;
pub mod files;
pub mod record;
pub mod records;
pub mod snapshot;

/// Result type alias using `RecbaseError` as the default error.
pub type Result<T, E = crate::error::RecbaseError> = std::result::Result<T, E>;

/// Prelude module - import the common types with `use recbase::prelude::*;`
pub mod prelude {
    pub use crate::error::RecbaseError;
    pub use crate::{
        client::{ClientConfig, RecbaseClient},
        record::{Record, is_system_field},
        records::Fetched,
    };
}

/// Default base url for a locally hosted store
pub const RECBASE_LOCAL_URL: &str = "http://localhost:8090";

pub(crate) mod config {
    /// Environment variable for default endpoint URL
    pub const RECBASE_URL_ENV: &str = "RECBASE_URL";

    /// Records fetched per page when listing collections
    pub const DEFAULT_PAGE_SIZE: u32 = 200;

    /// Timeout for record listing and CRUD requests (seconds)
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;

    /// Timeout for the admin login request (seconds)
    pub const LOGIN_TIMEOUT_SECS: u64 = 15;

    /// Timeout for single attachment downloads (seconds)
    pub const FILE_TIMEOUT_SECS: u64 = 60;

    /// Timeout for triggering a server-side snapshot (seconds)
    pub const SNAPSHOT_TRIGGER_TIMEOUT_SECS: u64 = 120;

    /// Timeout for downloading a full snapshot (seconds)
    pub const SNAPSHOT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;
}
