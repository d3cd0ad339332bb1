//! Infrastructure layer - storage, hashing and service implementations

pub mod id_generator;
pub mod logging;
pub mod storage;
pub mod user;
