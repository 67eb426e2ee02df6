//! `turnrelay policy`: Inspect the active policy.

use turnrelay_config::AppConfig;

pub async fn show(full: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let path = config.policy.active_path();
    let policy = config.load_policy()?;

    println!("Policy:   {}", policy.name);
    println!("Version:  {}", policy.version);
    if let Some(description) = &policy.description {
        println!("About:    {description}");
    }
    println!("File:     {}", path.display());
    println!("Length:   {} chars", policy.text.len());

    if full {
        println!("\n{}", policy.text.trim_end());
    }

    Ok(())
}
