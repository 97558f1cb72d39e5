//! Concrete storage for mkdedit: a redb-backed file store with values sealed at rest.
//! Uses AES-256-GCM with a key resolved by the secret manager in `key_provider`.

pub mod cipher;
pub mod config;
pub mod key_provider;
pub mod kv_file_store;
