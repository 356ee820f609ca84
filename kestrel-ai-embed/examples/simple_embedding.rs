//! Embeds a few monitoring notes and prints their pairwise similarity.
//!
//! Uses a local fastembed model so no service needs to be running:
//! `cargo run -p kestrel-ai-embed --example simple_embedding`

use kestrel_ai_embed::{EmbedConfig, create_provider};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let temp_dir = tempfile::tempdir()?;
    let config = EmbedConfig::fastembed("all-minilm-l6-v2")
        .with_cache_dir(temp_dir.path())
        .with_batch_size(2);

    let provider = create_provider(&config).await?;
    println!(
        "Provider {} / {} (dimension {})",
        provider.provider_name(),
        provider.model_name(),
        provider.embedding_dimension()
    );

    let texts = vec![
        "db-1 CPU usage crossed 90% at 03:00".to_string(),
        "Database host CPU alert fired overnight".to_string(),
        "The web tier deploy finished without errors".to_string(),
    ];
    let result = provider.embed_texts(&texts).await?;

    for (i, a) in result.embeddings.iter().enumerate() {
        for (j, b) in result.embeddings.iter().enumerate().skip(i + 1) {
            let score: f32 = a.iter().zip(b).map(|(x, y)| x.to_f32() * y.to_f32()).sum();
            println!("{:.3}  \"{}\" <-> \"{}\"", score, texts[i], texts[j]);
        }
    }

    Ok(())
}
