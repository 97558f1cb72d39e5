mod file_store;

pub use file_store::{validate_name, FileStore, FileStoreError, InMemoryFileStore};
