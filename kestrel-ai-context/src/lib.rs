pub mod loader;
pub mod text;

// Re-export the main chunking and loading types for external use
pub use loader::{
    CsvLoader, Document, DocumentLoader, DocumentSource, FileSource, LoadError, LoaderRegistry,
    TextLoader,
};
pub use text::{ChunkError, PassageChunk, TextSplitter, get_delimiters_for_path};
