//! Unified open/save entry points.
//!
//! `open_grid` reads a file, detects (or honors a hinted) format, parses it
//! and runs post-import validation, returning the grid together with its
//! provenance record. `save_grid` is the mirror image. A zip archive that is
//! not a native pack archive but wraps exactly one recognizable payload is
//! extracted to a scoped temporary directory and re-dispatched; the
//! directory is removed on every exit path when it drops.
//!
//! Long parses are cooperatively cancellable: the [`CancelToken`] is checked
//! between the detection, parsing and validation phases, never inside a
//! parser.

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use gridex_core::{Diagnostics, Grid, GridError, GridResult};
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::format::{Confidence, Format};
use crate::formats;
use crate::validate::validate_grid;

/// Cooperative cancellation flag, checked between parsing phases.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. The current phase still runs to completion.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn checkpoint(&self) -> GridResult<()> {
        if self.is_cancelled() {
            Err(GridError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Where a grid came from and what the importer had to say about it.
#[derive(Debug)]
pub struct Provenance {
    pub source_format: Format,
    pub source_path: PathBuf,
    pub diagnostics: Diagnostics,
}

/// A successfully imported grid with its provenance.
#[derive(Debug)]
pub struct ParseOutcome {
    pub grid: Grid,
    pub provenance: Provenance,
}

/// Open a grid file, auto-detecting the format unless a hint is given.
pub fn open_grid(
    path: &Path,
    hint: Option<Format>,
    cancel: &CancelToken,
) -> Result<ParseOutcome> {
    cancel.checkpoint()?;
    let bytes = std::fs::read(path)
        .map_err(GridError::Io)
        .with_context(|| format!("reading '{}'", path.display()))?;

    let format = match hint {
        Some(format) => format,
        None => {
            let (format, confidence) = Format::detect(path, &bytes).ok_or_else(|| {
                GridError::UnrecognizedFormat(format!(
                    "no parser matches '{}'",
                    path.display()
                ))
            })?;
            if confidence == Confidence::Low {
                warn!(%format, ?confidence, "weak format match, attempting parse anyway");
            }
            format
        }
    };
    if !format.can_import() {
        return Err(GridError::UnrecognizedFormat(format!(
            "{format} is export-only"
        ))
        .into());
    }
    debug!(%format, path = %path.display(), "parsing");

    cancel.checkpoint()?;
    let (grid, mut diagnostics) = parse_bytes(format, path, &bytes, cancel)?;

    cancel.checkpoint()?;
    validate_grid(&grid, &mut diagnostics);
    if diagnostics.has_issues() {
        debug!(summary = %diagnostics.summary(), "import finished with findings");
    }

    Ok(ParseOutcome {
        grid,
        provenance: Provenance {
            source_format: format,
            source_path: path.to_path_buf(),
            diagnostics,
        },
    })
}

fn parse_bytes(
    format: Format,
    path: &Path,
    bytes: &[u8],
    cancel: &CancelToken,
) -> Result<(Grid, Diagnostics)> {
    let text = || {
        std::str::from_utf8(bytes)
            .map_err(|e| GridError::StructuralParse(format!("input is not UTF-8: {e}")))
    };
    match format {
        Format::Matpower => formats::matpower::parse(text()?),
        Format::Psse => formats::psse::parse(text()?),
        Format::Cim => formats::cim::parse(text()?),
        Format::Dgs => formats::dgs::parse(text()?),
        Format::Dpx => formats::dpx::parse(text()?),
        Format::Ipa => formats::ipa::parse(text()?),
        Format::Json => formats::json::parse(text()?),
        Format::Xlsx => formats::xlsx::parse(bytes),
        Format::Sqlite => formats::sqlite::load(path),
        Format::Binary => formats::binary::parse(bytes),
        Format::Archive => parse_archive(path, bytes, cancel),
        Format::Plexos => unreachable!("rejected by can_import"),
    }
}

/// Parse a zip file: native pack archives directly, otherwise unwrap a
/// single recognizable payload and dispatch on it.
fn parse_archive(path: &Path, bytes: &[u8], cancel: &CancelToken) -> Result<(Grid, Diagnostics)> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| GridError::StructuralParse(format!("not a zip archive: {e}")))?;

    if archive.by_name("meta.csv").is_ok() {
        return formats::archive::parse(bytes);
    }

    let names: Vec<String> = archive.file_names().map(|n| n.to_string()).collect();
    let payloads: Vec<&String> = names.iter().filter(|n| !n.ends_with('/')).collect();
    let [payload] = payloads.as_slice() else {
        return Err(GridError::StructuralParse(format!(
            "'{}' is not a grid pack archive and holds {} files, expected 1",
            path.display(),
            payloads.len()
        ))
        .into());
    };

    let mut inner_bytes = Vec::new();
    archive
        .by_name(payload)
        .map_err(|e| GridError::StructuralParse(format!("reading '{payload}': {e}")))?
        .read_to_end(&mut inner_bytes)
        .map_err(GridError::Io)?;

    // Bare name only; zip entries may carry directory components.
    let file_name = Path::new(payload)
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(payload.as_str()));
    let (inner_format, _) = Format::detect(&file_name, &inner_bytes).ok_or_else(|| {
        GridError::UnrecognizedFormat(format!("archived payload '{payload}' not recognized"))
    })?;
    if inner_format == Format::Archive {
        return Err(GridError::StructuralParse(format!(
            "archived payload '{payload}' is itself an archive"
        ))
        .into());
    }
    debug!(%inner_format, payload = %payload, "dispatching archived payload");

    // Extract to a scoped temp dir so path-based parsers work; Drop removes
    // it on success, error and cancellation alike.
    let dir = tempfile::tempdir().map_err(GridError::Io)?;
    let inner_path = dir.path().join(&file_name);
    std::fs::write(&inner_path, &inner_bytes).map_err(GridError::Io)?;

    cancel.checkpoint()?;
    parse_bytes(inner_format, &inner_path, &inner_bytes, cancel)
}

/// Save a grid, deriving the format from the hint or the file extension.
pub fn save_grid(grid: &Grid, path: &Path, hint: Option<Format>) -> Result<()> {
    let format = match hint {
        Some(format) => format,
        None => {
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default();
            *Format::ALL
                .iter()
                .find(|f| f.extensions().iter().any(|e| e.eq_ignore_ascii_case(ext)))
                .ok_or_else(|| {
                    GridError::UnrecognizedFormat(format!(
                        "no exporter matches '{}'",
                        path.display()
                    ))
                })?
        }
    };
    if !format.can_export() {
        return Err(GridError::UnrecognizedFormat(format!("{format} is import-only")).into());
    }
    debug!(%format, path = %path.display(), "exporting");

    match format {
        Format::Matpower => write_bytes(path, formats::matpower::export(grid).as_bytes()),
        Format::Psse => write_bytes(path, formats::psse::export(grid).as_bytes()),
        Format::Cim => write_bytes(path, formats::cim::export(grid).as_bytes()),
        Format::Json => write_bytes(path, formats::json::export(grid)?.as_bytes()),
        Format::Xlsx => write_bytes(path, &formats::xlsx::export(grid)?),
        Format::Sqlite => formats::sqlite::save(grid, path),
        Format::Binary => write_bytes(path, &formats::binary::export(grid)?),
        Format::Archive => write_bytes(path, &formats::archive::export(grid)?),
        Format::Plexos => {
            let mut diag = Diagnostics::new();
            let bytes = formats::plexos::export(grid, &mut diag)?;
            for issue in diag.warnings() {
                warn!(category = %issue.category, "{}", issue.message);
            }
            write_bytes(path, &bytes)
        }
        Format::Dgs | Format::Dpx | Format::Ipa => unreachable!("rejected by can_export"),
    }
}

fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes)
        .map_err(GridError::Io)
        .with_context(|| format!("writing '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridex_core::{Bus, BusId, Kilovolts};

    fn grid() -> Grid {
        let mut grid = Grid::new("handler test");
        grid.add_bus(Bus {
            id: BusId::new(1),
            name: "only".into(),
            base_kv: Kilovolts(110.0),
            ..Bus::default()
        })
        .unwrap();
        grid
    }

    #[test]
    fn save_then_open_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.json");
        save_grid(&grid(), &path, None).unwrap();
        let outcome = open_grid(&path, None, &CancelToken::new()).unwrap();
        assert_eq!(outcome.grid, grid());
        assert_eq!(outcome.provenance.source_format, Format::Json);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = open_grid(Path::new("/nonexistent/grid.json"), None, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GridError>(),
            Some(GridError::Io(_))
        ));
    }

    #[test]
    fn cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.json");
        save_grid(&grid(), &path, None).unwrap();
        let token = CancelToken::new();
        token.cancel();
        let err = open_grid(&path, None, &token).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GridError>(),
            Some(GridError::Cancelled)
        ));
    }

    #[test]
    fn export_only_hint_rejected_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.json");
        save_grid(&grid(), &path, None).unwrap();
        let err = open_grid(&path, Some(Format::Plexos), &CancelToken::new()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GridError>(),
            Some(GridError::UnrecognizedFormat(_))
        ));
    }

    #[test]
    fn import_only_hint_rejected_on_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.dgs");
        let err = save_grid(&grid(), &path, None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GridError>(),
            Some(GridError::UnrecognizedFormat(_))
        ));
    }
}
