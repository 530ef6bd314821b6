use anyhow::Result;

use sparkmind::config::SparkConfig;
use sparkmind::services::Services;

/// Classify one thought and print the result.
pub async fn classify(config: SparkConfig, text: &str, json: bool) -> Result<()> {
    let services = Services::from_config(config)?;
    let result = services.classifier.classify(text, &[]).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("Type:        {}", result.content_type);
    println!("Confidence:  {:.2}", result.confidence);
    if result.needs_confirmation {
        println!("             (below the confidence gate, confirm with the user)");
    }
    println!("Reasoning:   {}", result.reasoning);
    if !result.suggested_fields.is_empty() {
        println!("Fields:");
        for (name, value) in &result.suggested_fields {
            println!("  {name:<12} {value}");
        }
    }
    if !result.alternatives.is_empty() {
        println!("Alternatives:");
        for alt in &result.alternatives {
            println!("  {:<12} {:.2}", alt.content_type.as_str(), alt.confidence);
        }
    }
    if !result.missing_information.is_empty() {
        println!("Missing:     {}", result.missing_information.join(", "));
    }
    Ok(())
}
