//! Document sources and format-specific loaders.
//!
//! A [`DocumentSource`] is any readable byte source with a name; the name's
//! extension decides which [`DocumentLoader`] turns the bytes into text. The
//! [`LoaderRegistry`] maps extensions to loaders and falls back to plain text
//! for anything it does not recognise.
//!
//! | extension | loader        | output                                  |
//! |-----------|---------------|-----------------------------------------|
//! | `.csv`    | [`CsvLoader`] | one document per row, `header: value`   |
//! | `.txt`    | [`TextLoader`]| the whole file                          |
//! | other     | [`TextLoader`]| the whole file (default)                |

use crate::text::{PassageChunk, SOURCE_KEY, TextSplitter};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Metadata key holding the 0-based data row of a CSV record.
pub const ROW_KEY: &str = "row";

/// Errors raised while reading or decoding a document.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {name}: {source}")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{name} is not valid UTF-8 text: {source}")]
    Decode {
        name: String,
        #[source]
        source: std::string::FromUtf8Error,
    },

    #[error("failed to parse CSV in {name}: {source}")]
    Csv {
        name: String,
        #[source]
        source: csv::Error,
    },
}

/// A readable document with a discoverable name.
///
/// The owner of a source is responsible for releasing it; dropping the value
/// releases any underlying handle.
pub trait DocumentSource: Send {
    /// Display name of the document, usually a file name or path.
    fn name(&self) -> &str;

    /// Read the full content of the document.
    fn read_bytes(&mut self) -> std::io::Result<Vec<u8>>;

    /// Lower-cased file extension of [`name`](Self::name), if any.
    fn extension(&self) -> Option<String> {
        Path::new(self.name())
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
    }
}

/// A document backed by an open file handle.
#[derive(Debug)]
pub struct FileSource {
    name: String,
    file: File,
}

impl FileSource {
    /// Opens the file at `path`. The handle stays open until the source is dropped.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| LoadError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());

        tracing::debug!("Opened document source {}", path.display());
        Ok(Self { name, file })
    }
}

impl DocumentSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_bytes(&mut self) -> std::io::Result<Vec<u8>> {
        // Always read from the start so repeated loads see the whole file.
        self.file.seek(SeekFrom::Start(0))?;
        let mut buffer = Vec::new();
        self.file.read_to_end(&mut buffer)?;
        Ok(buffer)
    }
}

/// Text produced by a loader, before chunking.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub content: String,
    pub metadata: BTreeMap<String, String>,
}

/// Turns raw bytes of one format into documents.
pub trait DocumentLoader: Send + Sync {
    /// Short format name used in logs.
    fn format(&self) -> &'static str;

    fn load(&self, name: &str, bytes: Vec<u8>) -> Result<Vec<Document>, LoadError>;
}

/// Loads the whole input as a single UTF-8 document.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextLoader;

impl DocumentLoader for TextLoader {
    fn format(&self) -> &'static str {
        "text"
    }

    fn load(&self, name: &str, bytes: Vec<u8>) -> Result<Vec<Document>, LoadError> {
        let content = String::from_utf8(bytes).map_err(|source| LoadError::Decode {
            name: name.to_string(),
            source,
        })?;

        let mut metadata = BTreeMap::new();
        metadata.insert(SOURCE_KEY.to_string(), name.to_string());
        Ok(vec![Document { content, metadata }])
    }
}

/// Loads a CSV file with a header row, one document per data row.
///
/// Each row becomes `header: value` lines in column order.
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvLoader;

impl DocumentLoader for CsvLoader {
    fn format(&self) -> &'static str {
        "csv"
    }

    fn load(&self, name: &str, bytes: Vec<u8>) -> Result<Vec<Document>, LoadError> {
        let csv_error = |source| LoadError::Csv {
            name: name.to_string(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new().from_reader(bytes.as_slice());
        let headers = reader.headers().map_err(csv_error)?.clone();

        let mut documents = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record.map_err(csv_error)?;
            let content = headers
                .iter()
                .zip(record.iter())
                .map(|(header, value)| format!("{header}: {value}"))
                .collect::<Vec<_>>()
                .join("\n");

            let mut metadata = BTreeMap::new();
            metadata.insert(SOURCE_KEY.to_string(), name.to_string());
            metadata.insert(ROW_KEY.to_string(), row.to_string());
            documents.push(Document { content, metadata });
        }

        Ok(documents)
    }
}

/// Maps file extensions to loaders, with a designated default.
#[derive(Clone)]
pub struct LoaderRegistry {
    loaders: HashMap<String, Arc<dyn DocumentLoader>>,
    default: Arc<dyn DocumentLoader>,
}

impl std::fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut extensions: Vec<&String> = self.loaders.keys().collect();
        extensions.sort();
        f.debug_struct("LoaderRegistry")
            .field("extensions", &extensions)
            .field("default", &self.default.format())
            .finish()
    }
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::new(Arc::new(TextLoader))
            .with_loader("txt", Arc::new(TextLoader))
            .with_loader("csv", Arc::new(CsvLoader))
    }
}

impl LoaderRegistry {
    /// Creates an empty registry that sends everything to `default`.
    pub fn new(default: Arc<dyn DocumentLoader>) -> Self {
        Self {
            loaders: HashMap::new(),
            default,
        }
    }

    /// Registers a loader for an extension (case-insensitive, without the dot).
    pub fn with_loader(mut self, extension: &str, loader: Arc<dyn DocumentLoader>) -> Self {
        self.loaders.insert(
            extension.trim_start_matches('.').to_ascii_lowercase(),
            loader,
        );
        self
    }

    /// Returns the loader for an extension, or the default.
    pub fn loader_for(&self, extension: Option<&str>) -> &dyn DocumentLoader {
        extension
            .and_then(|ext| self.loaders.get(ext))
            .unwrap_or(&self.default)
            .as_ref()
    }

    /// Reads the source and converts it to documents.
    pub fn load(&self, source: &mut dyn DocumentSource) -> Result<Vec<Document>, LoadError> {
        let name = source.name().to_string();
        let extension = source.extension();
        let loader = self.loader_for(extension.as_deref());

        let bytes = source.read_bytes().map_err(|source| LoadError::Read {
            name: name.clone(),
            source,
        })?;

        tracing::debug!(
            "Loading {} ({} bytes) with {} loader",
            name,
            bytes.len(),
            loader.format()
        );
        loader.load(&name, bytes)
    }

    /// Reads the source and returns its text, documents separated by blank lines.
    pub fn load_text(&self, source: &mut dyn DocumentSource) -> Result<String, LoadError> {
        let documents = self.load(source)?;
        Ok(documents
            .into_iter()
            .map(|document| document.content)
            .collect::<Vec<_>>()
            .join("\n\n"))
    }

    /// Reads the source and splits every document into passages.
    pub fn load_and_split(
        &self,
        source: &mut dyn DocumentSource,
        splitter: &TextSplitter,
    ) -> Result<Vec<PassageChunk>, LoadError> {
        let documents = self.load(source)?;
        Ok(documents
            .iter()
            .flat_map(|document| splitter.split_document(&document.content, &document.metadata))
            .collect())
    }
}
