//! Dropbox client for the transfer pipeline.
//!
//! Implements [`StorageService`](dropferry_transfer::StorageService) on top
//! of the Dropbox v2 upload endpoints (`files/upload` and the
//! `upload_session/*` family) and resolves the access token from a
//! credentials URL.

pub mod client;
pub mod credentials;
pub mod error;
pub mod types;

pub use client::{DropboxClient, MAX_REQUEST_BYTES};
pub use credentials::{fetch_access_token, parse_token_body};
pub use error::DropboxError;
pub use types::{Account, FileMetadata};
