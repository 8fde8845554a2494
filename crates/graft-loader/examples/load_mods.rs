//! Minimal host: load the mods in ./mods and run their "init" entrypoints.
//!
//! Run with `cargo run --example load_mods` from the graft-loader crate.

use std::path::Path;

use graft_core::types::{EnvType, Version};
use graft_entrypoint::AdapterRegistry;
use graft_loader::{FunctionAdapter, Loader, LoaderConfig, SearchPathSink};

struct PrintingSink;

impl SearchPathSink for PrintingSink {
    fn add_to_search_path(&mut self, id: &str, paths: &[&Path]) -> anyhow::Result<()> {
        for path in paths {
            println!("search path += {} ({})", path.display(), id);
        }
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = LoaderConfig::new(EnvType::Client, "host", Version::parse("1.0.0"))
        .mod_dir("mods")
        .cache_dir(".graft-cache");

    let adapters = AdapterRegistry::new().register(
        "default",
        FunctionAdapter::new().constructor("hello", || "hello world".to_string()),
    );

    let mut loader = Loader::new(config, adapters);
    let summary = loader.load(&mut PrintingSink)?;
    println!(
        "loaded {} mods ({} locations skipped)",
        summary.mods, summary.non_conforming
    );

    loader.invoke_entrypoints::<String, _>("init", |owner, text| {
        println!("{}: {}", owner, text);
        Ok(())
    })?;

    Ok(())
}
