//! CLI `search` command: retrieve an owner's related content from the terminal.

use anyhow::Result;

use sparkmind::config::SparkConfig;
use sparkmind::memory::search::RetrieveOptions;
use sparkmind::memory::types::ContentType;
use sparkmind::services::Services;

pub async fn search(
    config: SparkConfig,
    owner: &str,
    query: &str,
    top_k: Option<usize>,
    content_type: Option<&str>,
) -> Result<()> {
    let owner = super::parse_owner(owner)?;
    let types = match content_type {
        Some(t) => vec![t.parse::<ContentType>().map_err(anyhow::Error::msg)?],
        None => Vec::new(),
    };

    let services = Services::from_config(config)?;
    let retrieval = &services.config.retrieval;
    let top_k = top_k.unwrap_or(retrieval.default_top_k);
    let opts = RetrieveOptions::new(top_k, retrieval.context_min_score).with_types(&types);

    let results = services.retriever.retrieve(&owner, query, &opts).await?;
    if results.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!("Found {} result(s)\n", results.len());
    for (i, result) in results.iter().enumerate() {
        let preview: String = result.preview.chars().take(120).collect();
        let ellipsis = if result.preview.chars().count() > 120 { "..." } else { "" };
        println!(
            "  {}. [{}] #{} {} (score: {:.4})",
            i + 1,
            result.content_type,
            result.content_id,
            result.title,
            result.score,
        );
        println!("     {preview}{ellipsis}");
        println!();
    }

    Ok(())
}
