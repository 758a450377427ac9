//! Item catalogue: listings, availability, and search

mod memory;
mod model;
mod registry;
mod service;

pub use memory::InMemoryItemRegistry;
pub use model::{
    CreateItemRequest, Item, ItemChanges, ItemCondition, ItemFilter, ItemQuery, ItemSort,
    NewItem, UpdateItemRequest,
};
pub use registry::{ItemRegistry, PgItemRegistry};
pub use service::{ItemError, ItemService};

pub(crate) use registry::distinct_count;
