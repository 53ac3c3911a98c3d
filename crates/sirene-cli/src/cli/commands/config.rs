//! `sirene config` – show what the configuration resolves to.

use anyhow::Result;
use sirene_core::config::Configuration;

pub fn run_config(cfg: &Configuration) -> Result<()> {
    match cfg.source() {
        Some(path) => println!("source: {}", path.display()),
        None => println!("source: <memory>"),
    }

    println!("download_urls:");
    for (key, url) in cfg.download_urls() {
        println!("  {}: {}", key, url);
    }

    println!("metadata:");
    for (key, value) in cfg.metadata() {
        let key = key.as_str().map(str::to_string).unwrap_or_else(|| format!("{:?}", key));
        let value = value.as_str().map(str::to_string).unwrap_or_else(|| format!("{:?}", value));
        println!("  {}: {}", key, value);
    }

    println!("paths:");
    let mut paths: Vec<_> = cfg.data_paths().into_iter().collect();
    paths.sort();
    for (tier, dir) in paths {
        println!("  {}: {}", tier, dir.display());
    }
    Ok(())
}
