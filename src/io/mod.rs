//! Input decoding and object-store plumbing around the engine.

pub mod compression;
pub mod store;
pub mod transfer;
