//! `recap config` — Configuration management commands.

use std::path::{Path, PathBuf};

use recap_config::AppConfig;

pub fn validate(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match AppConfig::load_with(config_path) {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let warnings = warnings(&config);
            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Provider:  {}", config.default_provider);
            println!("   Model:     {}", config.default_model);
            println!("   Fallbacks: {}", config.fallbacks.len());
            println!(
                "   Tree:      chunks of {} ({}), groups of {}, {} in flight",
                config.tree.max_chunk_size,
                config.tree.encoding,
                config.tree.group_size,
                config.tree.concurrency
            );
            println!(
                "   Retry:     {} attempts, {}–{} ms backoff, {}s timeout",
                config.retry.max_attempts,
                config.retry.base_delay_ms,
                config.retry.max_delay_ms,
                config.retry.timeout_secs
            );
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

/// Problems that do not stop a build but probably are mistakes.
fn warnings(config: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    let keyless = |name: &str| matches!(name, "ollama" | "vllm" | "llamacpp" | "llama.cpp");
    let keyed_backend = std::iter::once(config.default_provider.as_str())
        .chain(config.fallbacks.iter().map(|f| f.provider.as_str()))
        .any(|name| {
            !keyless(name)
                && config
                    .providers
                    .get(name)
                    .and_then(|p| p.api_key.as_ref())
                    .is_none()
        });
    if keyed_backend && config.api_key.is_none() {
        warnings.push(
            "No API key set (set RECAP_API_KEY, OPENAI_API_KEY or OPENROUTER_API_KEY)".to_string(),
        );
    }

    if config.tree.intermediate_threshold < config.tree.group_size {
        warnings.push(format!(
            "tree.intermediate_threshold ({}) is below tree.group_size ({}); most rounds will use the final prompt",
            config.tree.intermediate_threshold, config.tree.group_size
        ));
    }

    for fallback in &config.fallbacks {
        if fallback.provider == config.default_provider && fallback.model.is_none() {
            warnings.push(format!(
                "Fallback '{}' repeats the primary backend",
                fallback.provider
            ));
        }
    }

    warnings
}

pub fn show(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(config_path)?;
    redact(&mut config);
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

/// Mask every API key so `show` output can be pasted safely.
fn redact(config: &mut AppConfig) {
    let keys = std::iter::once(&mut config.api_key)
        .chain(config.providers.values_mut().map(|p| &mut p.api_key));
    for key in keys.flatten() {
        *key = "[REDACTED]".into();
    }
}

pub fn path(config_path: Option<&Path>) {
    println!("{}", resolve_path(config_path).display());
}

fn resolve_path(config_path: Option<&Path>) -> PathBuf {
    config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}
