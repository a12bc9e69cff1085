//! URL handling module for Domain-Reach
//!
//! This module provides URL normalization and relative resolution, host and
//! registrable-domain extraction, and the static blacklist / extension filter.

mod domain;
mod filter;
mod normalize;

pub use domain::{extract_host, registrable_domain, url_registrable_domain};
pub use filter::LinkFilter;
pub use normalize::{normalize_url, resolve_url};
