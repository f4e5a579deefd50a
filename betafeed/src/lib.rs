// Library interface for betafeed modules
// This allows tests and other binaries to import modules

pub mod caption;
pub mod categorize;
pub mod ingestion;
pub mod llm;
pub mod media;
pub mod normalize;
pub mod processing;
pub mod publisher;
pub mod scraping;
pub mod server;
pub mod sessions;
pub mod storage;
pub mod worker;
