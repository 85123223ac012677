//! `config validate` and `config generate`

use anyhow::{anyhow, Context};
use bao_bench_config::{BenchConfig, ConfigLoader};
use bao_bench_core::{configure_all, TestRegistry};
use std::fs;
use std::path::Path;
use tracing::{error, info};

use super::CommandResult;

/// Parse and validate a configuration file, including every test
/// definition's typed config block. Never contacts the server.
pub fn config_validate_command(registry: &TestRegistry, config_file: &Path) -> CommandResult<String> {
    info!("Validating configuration file: {:?}", config_file);

    let config = ConfigLoader::new().from_file(config_file).inspect_err(|e| {
        error!("Configuration validation failed: {}", e);
    })?;
    let configured = configure_all(registry, &config.tests).inspect_err(|e| {
        error!("Test definition validation failed: {}", e);
    })?;

    let mut out = format!(
        "✅ Configuration file is valid: {} test definition(s)\n",
        configured.len()
    );
    for test in &configured {
        out.push_str(&format!(
            "  [{}] {} ({}), weight {}\n",
            test.index, test.name, test.test_type, test.weight
        ));
    }
    info!("Configuration validation passed");
    Ok(out)
}

/// Write a sample configuration to `output`
pub fn config_generate_command(output: &Path, force: bool) -> CommandResult<()> {
    info!("Generating sample configuration at: {:?}", output);

    if output.exists() && !force {
        return Err(anyhow!(
            "Output file already exists: {:?}. Use --force to overwrite.",
            output
        )
        .into());
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).context("Failed to create output directory")?;
    }

    fs::write(output, BenchConfig::generate_sample())
        .with_context(|| format!("Failed to write configuration to {:?}", output))?;
    Ok(())
}
