use anyhow::Result;

use sparkmind::config::SparkConfig;
use sparkmind::services::Services;

/// Compute and print an owner's profile. Always recomputes.
pub async fn profile(config: SparkConfig, owner: &str) -> Result<()> {
    let owner = super::parse_owner(owner)?;
    let services = Services::from_config(config)?;
    let profile = services.profiles.get_profile(&owner, true).await;
    println!("{}", serde_json::to_string_pretty(&profile)?);
    Ok(())
}
