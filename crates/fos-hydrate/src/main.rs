//! fOS Hydrate - Command Line Entry Point
//!
//! Hydrates a markup file and prints the resulting document.
//!
//! ```text
//! fos-hydrate page.html [config.json]
//! ```

use std::cell::RefCell;

use anyhow::Context;
use fos_hydrate::{Page, RuntimeConfig, hydrate_document};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let input = args
        .next()
        .context("usage: fos-hydrate <page.html> [config.json]")?;
    let config = match args.next() {
        Some(path) => RuntimeConfig::load(&path).with_context(|| format!("loading {path}"))?,
        None => RuntimeConfig::default(),
    };

    let markup = std::fs::read_to_string(&input).with_context(|| format!("reading {input}"))?;
    let page = RefCell::new(Page::from_html(&markup, config));
    let phase = smol::block_on(hydrate_document(&page))?;
    tracing::info!("{} reached {}", input, phase);

    let page = page.into_inner();
    println!(
        "{}",
        fos_html::outer_html(page.document.tree(), page.document.root())
    );
    Ok(())
}
