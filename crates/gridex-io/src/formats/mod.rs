//! One module per supported exchange format.
//!
//! Text formats take `&str`, binary containers take `&[u8]`, and the SQLite
//! adapter works on paths. Importers return `(Grid, Diagnostics)`; failures
//! that make the input unusable surface as [`gridex_core::GridError`] values
//! inside the `anyhow` chain.

pub mod archive;
pub mod binary;
pub mod cim;
pub mod dgs;
pub mod dpx;
pub mod ipa;
pub mod json;
pub mod matpower;
pub mod plexos;
pub mod psse;
pub mod sqlite;
pub mod xlsx;
