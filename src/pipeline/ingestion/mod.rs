// Pipeline ingestion: locating tenant sources and reading them in bounded chunks

pub mod reader;
pub mod source;

pub use reader::{ChunkedReader, RawBatch, RawEntry};
pub use source::{CsvSource, FsSourceLocator, InMemorySourceLocator, SourceLocator};
