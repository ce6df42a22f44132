mod batch;
pub mod cache;
pub mod identity;
pub mod provider;
mod resolver;
pub mod settings;
pub mod tracker;

use std::collections::HashMap;

pub use batch::{BATCH_SIZE, BatchResolver, SharedResolved};
pub use resolver::{JsonFetcher, LookupError, MirrorCursor, ReqwestFetcher, UrlResolver};

/// Normalized raw URL -> playable URL. `None` means resolution was attempted and failed.
pub type ResolvedUrls = HashMap<String, Option<String>>;
