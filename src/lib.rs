//! # sitegate
//!
//! Access control and configuration sync for the course-catalog front-end.
//!
//! - [`auth`]: route gates deciding loading / redirect-to-login / denied /
//!   allowed from the current-user query and a required role.
//! - [`site_config`]: stale-always cache over the remote key-value site
//!   configuration, with the exam-category fallback list.
//! - [`query`]: the keyed fetch cache both are built on (mount, focus and
//!   explicit revalidation, in-flight dedup, retry, unmount cancellation).
//! - [`net`]: wire types and the HTTP client for `/auth/me` and
//!   `/site-config`.

pub mod auth;
pub mod config;
pub mod net;
pub mod query;
pub mod site_config;
