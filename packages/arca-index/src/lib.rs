pub mod index;
pub mod models;
pub mod snapshot;

mod error;

pub use error::{Error, Result};
pub use index::{MetadataIndex, SharedIndex};
