//! The library code for the `blogsync` post synchronizer. The architecture
//! can be generally broken down into two distinct components:
//!
//! 1. Resolving post titles from the titles resource ([`crate::titles`])
//! 2. Synchronizing post source files with the database ([`crate::store`])
//!
//! Of the two, the second is the more involved. It owns the SQLite `posts`
//! table and performs the two synchronization sweeps:
//!
//! 1. [`crate::store::Store::check_new_posts`] discovers files in the
//!    visible-posts directory that have no row yet and ingests them
//! 2. [`crate::store::Store::refresh`] re-ingests rows whose source file has
//!    a newer modification time than the one recorded in the table
//!
//! Ingestion renders the source's markdown to HTML ([`crate::markdown`]),
//! resolves the post's title ([`crate::titles`]), and derives a URL-safe
//! slug and a formatted date. The slug and the first-observed timestamps are
//! frozen at creation; only the body, title, and modification time follow
//! the file afterwards. Both sweeps stage their writes in a single
//! transaction ([`crate::store::Batch`]) so a full directory scan commits
//! once rather than once per row.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod config;
pub mod markdown;
pub mod post;
pub mod store;
pub mod titles;
pub mod util;
