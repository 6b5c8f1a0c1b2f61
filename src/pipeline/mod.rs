// Data processing pipeline: ingestion, processing, storage and run orchestration

pub mod ingestion;
pub mod ledger;
pub mod orchestrator;
pub mod processing;
pub mod single_flight;
pub mod storage;

pub use orchestrator::SyncOrchestrator;
