//! `turnrelay doctor`: Diagnose configuration health.

use turnrelay_config::AppConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Warn,
    Fail,
}

#[derive(Debug)]
pub struct Check {
    pub status: Status,
    pub message: String,
}

impl Check {
    fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// Checks that need no network access.
pub fn diagnose(config: &AppConfig) -> Vec<Check> {
    let mut checks = Vec::new();

    if config.has_api_key() {
        checks.push(Check::new(Status::Ok, "Model API key configured"));
    } else {
        checks.push(Check::new(
            Status::Warn,
            "No model API key. Set ANTHROPIC_API_KEY; /chat fails until then",
        ));
    }

    match config.store.backend.as_str() {
        "rest" if config.has_store_credentials() => {
            checks.push(Check::new(Status::Ok, "REST store URL and key configured"));
        }
        "rest" => checks.push(Check::new(
            Status::Warn,
            "REST store URL or key missing. Set STORE_URL and STORE_KEY; history is disabled until then",
        )),
        "memory" => checks.push(Check::new(
            Status::Warn,
            "In-memory store: history is lost on restart",
        )),
        "none" => checks.push(Check::new(Status::Warn, "Store disabled: every session starts fresh")),
        backend => checks.push(Check::new(Status::Ok, format!("Store backend: {backend}"))),
    }

    match config.load_policy() {
        Ok(policy) => checks.push(Check::new(
            Status::Ok,
            format!("Policy {} loaded ({} chars)", policy.label(), policy.text.len()),
        )),
        Err(e) => checks.push(Check::new(Status::Fail, e.to_string())),
    }

    if !config.escalation.enabled {
        checks.push(Check::new(
            Status::Warn,
            "Escalation extraction disabled: markers reach users verbatim",
        ));
    }

    checks
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("turnrelay doctor");
    println!("================\n");

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  [ok]   Config valid");
            config
        }
        Err(e) => {
            println!("  [fail] Config invalid: {e}");
            return Err(e.into());
        }
    };

    let checks = diagnose(&config);
    for check in &checks {
        let tag = match check.status {
            Status::Ok => "[ok]  ",
            Status::Warn => "[warn]",
            Status::Fail => "[fail]",
        };
        println!("  {tag} {}", check.message);
    }

    println!("\nResolved configuration:\n{config:#?}");

    let issues = checks.iter().filter(|c| c.status != Status::Ok).count();
    println!();
    if issues == 0 {
        println!("  All checks passed!");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
