use anyhow::{anyhow, Context};
use serde_json::json;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::db;

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/school.sqlite3";
pub const BUNDLE_FORMAT_V1: &str = "feebook-workspace-v1";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
}

pub fn export_workspace_bundle(
    workspace_path: &Path,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let db_path = workspace_path.join(db::DB_FILE);
    if !db_path.is_file() {
        return Err(anyhow!(
            "workspace database not found: {}",
            db_path.to_string_lossy()
        ));
    }

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let exported_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let manifest = json!({
        "format": BUNDLE_FORMAT_V1,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": exported_at,
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(DB_ENTRY, opts)
        .context("failed to start database entry")?;
    let mut db_file = File::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.to_string_lossy()))?;
    std::io::copy(&mut db_file, &mut zip).context("failed to write database entry")?;

    zip.finish().context("failed to finish bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: 2,
    })
}

/// Restore a bundle's database into `workspace_path`, replacing whatever
/// database is there. The caller is responsible for reopening connections.
pub fn import_workspace_bundle(
    bundle_path: &Path,
    workspace_path: &Path,
) -> anyhow::Result<ImportSummary> {
    let bundle_file = File::open(bundle_path).with_context(|| {
        format!("failed to open bundle {}", bundle_path.to_string_lossy())
    })?;
    let mut archive = ZipArchive::new(bundle_file).context("failed to read bundle archive")?;

    let bundle_format = {
        let mut manifest_entry = archive
            .by_name(MANIFEST_ENTRY)
            .context("bundle has no manifest.json")?;
        let mut manifest_text = String::new();
        manifest_entry
            .read_to_string(&mut manifest_text)
            .context("failed to read manifest")?;
        let manifest: serde_json::Value =
            serde_json::from_str(&manifest_text).context("manifest is not valid JSON")?;
        manifest
            .get("format")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("manifest has no format tag"))?
    };
    if bundle_format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", bundle_format));
    }

    std::fs::create_dir_all(workspace_path).with_context(|| {
        format!(
            "failed to create workspace {}",
            workspace_path.to_string_lossy()
        )
    })?;

    let mut db_entry = archive
        .by_name(DB_ENTRY)
        .context("bundle has no database entry")?;
    let db_path = workspace_path.join(db::DB_FILE);
    let mut out = File::create(&db_path)
        .with_context(|| format!("failed to create {}", db_path.to_string_lossy()))?;
    std::io::copy(&mut db_entry, &mut out).context("failed to restore database")?;

    Ok(ImportSummary {
        bundle_format_detected: bundle_format,
    })
}
