//! # gridex-io: Grid Model Parsers, Codec & Handler
//!
//! Multi-format input/output for power grid network descriptions: import
//! from exchange formats (MATPOWER, PSS/E RAW, CIM RDF/XML, DGS, DPX, IPA),
//! lossless round-trips through the native pack containers (JSON, binary,
//! spreadsheet, SQLite, zip archive), and lossy export to PLEXOS.
//!
//! ## Design Philosophy
//!
//! **Codec backbone**: the native containers are thin transports over one
//! self-describing [`pack::PackedGrid`] representation; add a field to the
//! schema tables and every container picks it up.
//!
//! **Error recovery with hard edges**: row-level anomalies (missing optional
//! columns, out-of-range cells) are collected in `Diagnostics` and the parse
//! continues; missing mandatory sections and unresolvable bus references
//! abort the parse with a typed [`gridex_core::GridError`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gridex_io::{open_grid, save_grid, CancelToken};
//!
//! fn main() -> anyhow::Result<()> {
//!     let outcome = open_grid("case14.m".as_ref(), None, &CancelToken::new())?;
//!     println!("{}", outcome.provenance.diagnostics.summary());
//!     save_grid(&outcome.grid, "case14.json".as_ref(), None)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Formats
//!
//! | Format | Extensions | Direction | Notes |
//! |--------|------------|-----------|-------|
//! | MATPOWER | `.m`, `.mat` | in + out | versions 1 and 2 |
//! | PSS/E RAW | `.raw` | in + out | revisions 29-35, exports v33 |
//! | CIM RDF/XML | `.xml`, `.rdf` | in + out | CIM14 and CIM16 namespaces |
//! | DIgSILENT DGS | `.dgs` | in | sectioned text |
//! | DPX | `.dpx` | in | block text |
//! | IPA | `.ipa` | in | JSON dialect |
//! | PLEXOS | `.xlsx` | out | lossy, explicit |
//! | pack JSON | `.json` | in + out | lossless |
//! | pack spreadsheet | `.xlsx` | in + out | lossless |
//! | pack SQLite | `.sqlite`, `.db` | in + out | lossless |
//! | pack binary | `.gxb` | in + out | magic `GXB1` + bincode |
//! | pack archive | `.zip`, `.gmz` | in + out | per-table CSVs |

pub mod builder;
pub mod convert;
pub mod format;
pub mod formats;
pub mod handler;
pub mod pack;
pub mod validate;

pub use builder::GridBuilder;
pub use format::{Confidence, Format};
pub use handler::{open_grid, save_grid, CancelToken, ParseOutcome, Provenance};
pub use pack::{pack, unpack, PackedGrid, PackedTable};
