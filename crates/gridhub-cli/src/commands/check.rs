use std::path::Path;

use gridhub_core::HubConfig;

pub fn check(path: &str, format: &str) -> anyhow::Result<()> {
    let config = HubConfig::from_file(Path::new(path))?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        _ => {
            println!("{}", format_summary(&config));
        }
    }

    Ok(())
}

pub fn init(path: &str) -> anyhow::Result<()> {
    let output = Path::new(path).join("gridhub.toml");
    if output.exists() {
        anyhow::bail!("{} already exists", output.display());
    }
    std::fs::write(&output, HubConfig::scaffold().to_toml_string()?)?;
    println!("✓ Generated {}", output.display());
    Ok(())
}

fn format_summary(config: &HubConfig) -> String {
    let mut out = String::new();
    let mode = if config.hub.throw_on_capability_not_present {
        "strict"
    } else {
        "advisory"
    };
    out.push_str(&format!("✓ Config OK ({} mode, {} policy)\n", mode, config.hub.policy.label()));
    out.push_str(&format!("  Nodes: {}\n", config.nodes.len()));
    for node in &config.nodes {
        out.push_str(&format!("  - {} (max {} sessions)\n", node.id, node.max_sessions));
        for caps in &node.capabilities {
            out.push_str(&format!("      {caps}\n"));
        }
    }
    out
}
