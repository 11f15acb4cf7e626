mod datastore;
mod disk;
mod http;
mod memory;

pub use datastore::{Datastore, FileHandle, FileStream, FileWriteOpts, StoreError};
pub use disk::DiskDatastore;
pub use http::HttpDatastore;
pub use memory::MemoryDatastore;
