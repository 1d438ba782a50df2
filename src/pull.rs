use std::path::PathBuf;

use anyhow::Context as _;
use serde_json::Value;

use crate::cli::PullArgs;
use crate::store;
use crate::sync::{load_settings, open_store};

pub fn run(args: PullArgs) -> anyhow::Result<()> {
    let settings = load_settings(&args.store)?;
    let (backend, identifier) = open_store(&args.store, &settings)?;
    let location = backend.describe(&identifier);

    let document = backend
        .load(&identifier)
        .with_context(|| format!("load navigation config: {location}"))?
        .ok_or_else(|| anyhow::anyhow!("no navigation config at {location}"))?;

    let items = document
        .get("items")
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    let keys = document
        .as_object()
        .map(|map| map.keys().cloned().collect::<Vec<_>>().join(","))
        .unwrap_or_default();
    tracing::info!(%location, items, %keys, "pull: downloaded navigation config");

    match args.out {
        Some(out) => {
            let out_path = PathBuf::from(out);
            if out_path.exists() && !args.force {
                anyhow::bail!(
                    "output already exists: {} (use --force to overwrite)",
                    out_path.display()
                );
            }
            store::write_document(&out_path, &document)
                .with_context(|| format!("write navigation config: {}", out_path.display()))?;
        }
        None => {
            print!("{}", store::render_document(&document)?);
        }
    }

    Ok(())
}
