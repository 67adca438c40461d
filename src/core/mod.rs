pub mod cache;
pub mod embedder;
pub mod image;
pub mod index;
pub mod query;
pub mod session;
