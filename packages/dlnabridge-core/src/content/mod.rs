//! ContentDirectory: virtual containers and items over the upstream library.
//!
//! - [`ContentDirectory`]: Browse/Search with profile filtering and stable paging
//! - [`didl`]: DIDL-Lite writer and reader
//! - [`node`]: container/item model, UPnP classes, DLNA protocolInfo
//! - [`search`]: supported search and sort criteria

mod cache;
pub mod didl;
mod engine;
pub mod node;
pub mod search;

pub use cache::ChildrenCache;
pub use engine::{BrowseFlag, BrowseResult, ContentDirectory};
pub use node::{dlna_features, protocol_info, ContainerNode, ItemNode, Node};
