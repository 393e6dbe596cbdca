use anyhow::Context;
use ingestq::ProvisioningRequest;
use std::io::Read;
use std::path::Path;

/// Loads the provisioning payload from a JSON file, or stdin when no path
/// is given.
pub fn load(path: Option<&Path>) -> anyhow::Result<ProvisioningRequest> {
    let raw = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read payload file {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read payload from stdin")?;
            buffer
        }
    };

    serde_json::from_str(&raw).context("payload is not a valid provisioning request")
}
