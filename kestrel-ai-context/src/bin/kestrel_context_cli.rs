use clap::Parser;
use kestrel_ai_context::loader::{DocumentSource, FileSource, LoaderRegistry};
use kestrel_ai_context::text::{PassageChunk, TextSplitter};
use serde::Serialize;
use std::io::{self, Read};

/// A CLI tool to load a document and print its passages as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input document. If not provided, reads text from stdin.
    #[arg(short, long)]
    input: Option<String>,

    /// Maximum passage length in characters.
    #[arg(short = 's', long, default_value_t = 500)]
    chunk_size: usize,

    /// Characters shared between consecutive passages.
    #[arg(short, long, default_value_t = 50)]
    overlap: usize,

    /// Comma-separated list of regex patterns for delimiters.
    /// Defaults to delimiters chosen by the input's extension.
    #[arg(short, long, value_delimiter = ',')]
    delimiters: Option<Vec<String>>,
}

/// Stdin wrapped as a nameless text document.
struct StdinSource;

impl DocumentSource for StdinSource {
    fn name(&self) -> &str {
        "stdin"
    }

    fn read_bytes(&mut self) -> io::Result<Vec<u8>> {
        let mut buffer = Vec::new();
        io::stdin().read_to_end(&mut buffer)?;
        Ok(buffer)
    }
}

#[derive(Serialize)]
struct SerializablePassage<'a> {
    sequence: usize,
    text: &'a str,
    metadata: &'a std::collections::BTreeMap<String, String>,
    summary: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let splitter = match (&args.delimiters, &args.input) {
        (Some(patterns), _) => {
            let refs: Vec<&str> = patterns.iter().map(|s| s.as_str()).collect();
            TextSplitter::new(&refs, args.chunk_size, args.overlap)?
        }
        (None, Some(path)) => {
            TextSplitter::for_path(std::path::Path::new(path), args.chunk_size, args.overlap)?
        }
        (None, None) => TextSplitter::with_defaults(args.chunk_size, args.overlap)?,
    };

    let registry = LoaderRegistry::default();
    let chunks: Vec<PassageChunk> = match &args.input {
        Some(path) => {
            let mut source = FileSource::open(path)?;
            registry.load_and_split(&mut source, &splitter)?
        }
        None => registry.load_and_split(&mut StdinSource, &splitter)?,
    };

    let passages: Vec<SerializablePassage> = chunks
        .iter()
        .enumerate()
        .map(|(sequence, chunk)| SerializablePassage {
            sequence,
            text: &chunk.text,
            metadata: &chunk.metadata,
            summary: chunk.build(),
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&passages)?);
    Ok(())
}
