//! Implication descriptors and the collaborators that resolve them.
//!
//! - [`schema`]: the descriptor format
//! - [`registry`]: status → implication lookup and direct-transition cache
//! - [`loader`]: descriptor loading with an explicitly invalidated cache

pub mod loader;
pub mod registry;
pub mod schema;

pub use loader::{
    DescriptorCache, DirectoryLoader, ImplicationLoader, MemoryLoader, DESCRIPTOR_EXTENSIONS,
};
pub use registry::{DirectTransition, DiscoveryCache, MemoryRegistry, StateRegistry};
pub use schema::{
    basename, Implication, ImplicationId, Platform, SetupEntry, SetupMode, TransitionConfig,
};
