//! Binary container (.gxb): magic header plus bincode-encoded pack.
//!
//! Layout: the 4-byte magic `GXB1`, then the [`PackedGrid`] in bincode.
//! The `1` in the magic is the container framing generation, not the pack
//! format version; that still travels (and is gated) inside the pack itself.

use anyhow::{Context, Result};
use gridex_core::{Diagnostics, Grid, GridError};

use crate::pack::{pack, unpack, PackedGrid};

pub const MAGIC: &[u8; 4] = b"GXB1";

pub fn parse(bytes: &[u8]) -> Result<(Grid, Diagnostics)> {
    let payload = bytes.strip_prefix(MAGIC.as_slice()).ok_or_else(|| {
        GridError::StructuralParse("missing GXB1 magic; not a binary grid file".into())
    })?;
    let packed: PackedGrid = bincode::deserialize(payload)
        .map_err(|e| GridError::StructuralParse(format!("malformed binary grid: {}", e)))?;
    unpack(&packed)
}

pub fn export(grid: &Grid) -> Result<Vec<u8>> {
    let mut out = MAGIC.to_vec();
    let payload = bincode::serialize(&pack(grid)).context("encoding binary grid")?;
    out.extend_from_slice(&payload);
    Ok(out)
}
