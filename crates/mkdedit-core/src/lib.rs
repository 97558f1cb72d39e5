//! Core abstractions for mkdedit: the virtual file store contract and its error taxonomy.
//! Engine-specific implementations live in `mkdedit-storage`.

pub mod storage;
