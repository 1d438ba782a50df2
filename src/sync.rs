use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde_json::Value;

use crate::cli::{StoreArgs, SyncArgs};
use crate::config::SiteSettings;
use crate::formats::NavigationItem;
use crate::import;
use crate::mapper::{self, Provenance};
use crate::store::{self, DocumentStore, FsStore, SharePointStore};

pub fn run(args: SyncArgs) -> anyhow::Result<()> {
    let spreadsheet = PathBuf::from(&args.spreadsheet);
    let settings = load_settings(&args.store)?;

    tracing::info!(spreadsheet = %spreadsheet.display(), "sync: read spreadsheet");
    let rows = import::read(&spreadsheet).context("import spreadsheet")?;

    let tenant = args
        .tenant_host
        .as_deref()
        .map(str::trim)
        .filter(|host| !host.is_empty())
        .map(str::to_owned)
        .or_else(|| settings.tenant_marker());
    if tenant.is_none() {
        tracing::warn!("no tenant host known; every absolute link is treated as external");
    }

    if args.dry_run {
        let items = convert(&rows, tenant.as_deref());
        let rendered = serde_json::to_string_pretty(&items).context("serialize items")?;
        println!("{rendered}");
        return Ok(());
    }

    let (backend, identifier) = open_store(&args.store, &settings)?;
    let location = backend.describe(&identifier);

    tracing::info!(%location, "sync: load navigation config");
    let existing = backend
        .load(&identifier)
        .with_context(|| format!("load navigation config: {location}"))?;
    if let Some(previous) = existing.as_ref().and_then(|doc| doc.get("items")) {
        tracing::info!(
            previous_items = previous.as_array().map_or(0, Vec::len),
            "sync: replacing items"
        );
    }

    let items = convert(&rows, tenant.as_deref());
    let provenance = Provenance::now(args.author.as_deref());
    let mut document = mapper::merge(existing, &items, &provenance).context("merge items")?;
    if args.stamp {
        mapper::stamp(&mut document, &provenance);
    }

    tracing::info!(%location, items = items.len(), "sync: save navigation config");
    if let Err(err) = backend.save(&identifier, &document) {
        if let Some(backup) = args.backup.as_deref() {
            write_backup(Path::new(backup), &document);
        }
        return Err(err).with_context(|| format!("save navigation config: {location}"));
    }

    tracing::info!(%location, "sync: navigation update completed");
    Ok(())
}

fn convert(rows: &[import::Row], tenant: Option<&str>) -> Vec<NavigationItem> {
    let items = mapper::to_items(rows, tenant);
    tracing::info!(
        rows = rows.len(),
        items = items.len(),
        external = items.iter().filter(|item| item.target.is_external()).count(),
        tenant = tenant.unwrap_or("-"),
        "sync: converted rows"
    );
    for warning in mapper::check_items(&items) {
        tracing::warn!(%warning, "sync: suspicious navigation item");
    }
    items
}

fn write_backup(path: &Path, document: &Value) {
    match store::write_document(path, document) {
        Ok(()) => tracing::warn!(
            path = %path.display(),
            "sync: upload failed; merged config written to backup"
        ),
        Err(err) => tracing::error!(
            path = %path.display(),
            error = %err,
            "sync: upload failed and backup could not be written"
        ),
    }
}

/// Settings file and environment, with `--file-path` applied on top.
pub fn load_settings(args: &StoreArgs) -> anyhow::Result<SiteSettings> {
    let mut settings = SiteSettings::load(args.settings.as_deref().map(Path::new))
        .context("load settings")?;
    if let Some(file_path) = args.file_path.as_deref() {
        settings.file_path = Some(file_path.to_owned());
    }
    Ok(settings)
}

/// Picks the local directory store when `--store-dir` is given, SharePoint otherwise.
pub fn open_store(
    args: &StoreArgs,
    settings: &SiteSettings,
) -> anyhow::Result<(Box<dyn DocumentStore>, String)> {
    if let Some(dir) = args.store_dir.as_deref() {
        return Ok((Box::new(FsStore::new(dir)), settings.file_path()));
    }

    let config = settings.resolve().context("resolve SharePoint settings")?;
    let store = SharePointStore::new(config).context("create SharePoint client")?;
    let identifier = store.default_identifier().to_owned();
    Ok((Box::new(store), identifier))
}
