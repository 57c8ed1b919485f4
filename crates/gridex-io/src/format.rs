//! Format detection and dispatch.
//!
//! `Format` names every supported exchange format. Detection is extension
//! first, then content sniffing for ambiguous extensions (XML, JSON, zip
//! containers), with a `Confidence` grade so callers can decide whether to
//! trust a weak match.

use std::path::Path;

use anyhow::Result;

/// Supported exchange formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// MATPOWER .m case files
    Matpower,
    /// PSS/E RAW files
    Psse,
    /// CIM RDF/XML files
    Cim,
    /// DIgSILENT DGS text files
    Dgs,
    /// DPX block text files
    Dpx,
    /// IPA JSON files
    Ipa,
    /// PLEXOS workbook (export only)
    Plexos,
    /// Native pack as JSON
    Json,
    /// Native pack as a spreadsheet workbook
    Xlsx,
    /// Native pack in a SQLite database
    Sqlite,
    /// Native pack as magic-prefixed bincode
    Binary,
    /// Native pack as a zip of per-table CSVs
    Archive,
}

/// Confidence level for format detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Confidence {
    /// Extension matches but content not verified
    Low,
    /// Extension and some content markers match
    Medium,
    /// Strong content markers confirm format
    High,
}

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const SQLITE_MAGIC: &[u8] = b"SQLite format 3\0";

impl Format {
    /// All supported formats, in detection order.
    pub const ALL: &'static [Format] = &[
        Format::Matpower,
        Format::Psse,
        Format::Cim,
        Format::Dgs,
        Format::Dpx,
        Format::Ipa,
        Format::Plexos,
        Format::Json,
        Format::Xlsx,
        Format::Sqlite,
        Format::Binary,
        Format::Archive,
    ];

    /// Expected file extensions for this format.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Format::Matpower => &["m", "mat"],
            Format::Psse => &["raw"],
            Format::Cim => &["xml", "rdf"],
            Format::Dgs => &["dgs"],
            Format::Dpx => &["dpx"],
            Format::Ipa => &["ipa"],
            Format::Plexos => &[],
            Format::Json => &["json"],
            Format::Xlsx => &["xlsx"],
            Format::Sqlite => &["sqlite", "db"],
            Format::Binary => &["gxb"],
            Format::Archive => &["zip", "gmz"],
        }
    }

    /// Human-readable format name.
    pub fn friendly_name(&self) -> &'static str {
        match self {
            Format::Matpower => "MATPOWER case",
            Format::Psse => "PSS/E RAW",
            Format::Cim => "CIM RDF/XML",
            Format::Dgs => "DIgSILENT DGS",
            Format::Dpx => "DPX",
            Format::Ipa => "IPA JSON",
            Format::Plexos => "PLEXOS workbook",
            Format::Json => "grid pack JSON",
            Format::Xlsx => "grid pack spreadsheet",
            Format::Sqlite => "grid pack database",
            Format::Binary => "grid pack binary",
            Format::Archive => "grid pack archive",
        }
    }

    /// Whether this format can be read.
    pub fn can_import(&self) -> bool {
        !matches!(self, Format::Plexos)
    }

    /// Whether this format can be written.
    pub fn can_export(&self) -> bool {
        !matches!(self, Format::Dgs | Format::Dpx | Format::Ipa)
    }

    /// Detect format from a file path and its leading bytes.
    ///
    /// Returns the detected format and confidence level, or None if no
    /// format matches.
    pub fn detect(path: &Path, content: &[u8]) -> Option<(Format, Confidence)> {
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            for format in Self::ALL {
                if format
                    .extensions()
                    .iter()
                    .any(|e| e.eq_ignore_ascii_case(ext))
                {
                    return Some((*format, format.sniff_content(content)));
                }
            }
        }
        // No usable extension; fall back to strong content markers only.
        Self::ALL
            .iter()
            .map(|f| (*f, f.sniff_content(content)))
            .find(|(_, confidence)| *confidence == Confidence::High)
    }

    /// Sniff leading content to verify the format.
    fn sniff_content(&self, content: &[u8]) -> Confidence {
        let text = || {
            String::from_utf8_lossy(&content[..content.len().min(4096)]).into_owned()
        };
        match self {
            Format::Matpower => {
                let text = text();
                if text.contains("function mpc") || text.contains("mpc.baseMVA") {
                    Confidence::High
                } else if text.contains("mpc.") || text.contains("function") {
                    Confidence::Medium
                } else {
                    Confidence::Low
                }
            }
            Format::Psse => {
                let text = text();
                // Header line is "IC, SBASE, REV, ..."; revision in field 3.
                let fields = text
                    .lines()
                    .next()
                    .unwrap_or("")
                    .split(',')
                    .take(3)
                    .filter(|f| f.trim().parse::<f64>().is_ok())
                    .count();
                if fields == 3 {
                    Confidence::High
                } else {
                    Confidence::Low
                }
            }
            Format::Cim => {
                let text = text();
                if text.contains("rdf:RDF") || text.contains("cim:") {
                    Confidence::High
                } else if text.contains("<?xml") {
                    Confidence::Low
                } else {
                    Confidence::Low
                }
            }
            Format::Dgs => {
                if text().lines().any(|l| l.starts_with("$$")) {
                    Confidence::High
                } else {
                    Confidence::Low
                }
            }
            Format::Dpx => {
                if text().lines().next().is_some_and(|l| l.trim() == "DPX") {
                    Confidence::High
                } else {
                    Confidence::Low
                }
            }
            Format::Ipa => {
                let text = text();
                if text.contains("\"buses\"") && text.contains("\"version\"") {
                    Confidence::High
                } else if text.trim_start().starts_with('{') {
                    Confidence::Low
                } else {
                    Confidence::Low
                }
            }
            Format::Plexos => Confidence::Low,
            Format::Json => {
                let text = text();
                if text.contains("\"format_version\"") && text.contains("\"tables\"") {
                    Confidence::High
                } else if text.trim_start().starts_with('{') {
                    Confidence::Medium
                } else {
                    Confidence::Low
                }
            }
            Format::Xlsx | Format::Archive => {
                if content.starts_with(ZIP_MAGIC) {
                    Confidence::Medium
                } else {
                    Confidence::Low
                }
            }
            Format::Sqlite => {
                if content.starts_with(SQLITE_MAGIC) {
                    Confidence::High
                } else {
                    Confidence::Low
                }
            }
            Format::Binary => {
                if content.starts_with(crate::formats::binary::MAGIC) {
                    Confidence::High
                } else {
                    Confidence::Low
                }
            }
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.friendly_name())
    }
}

impl std::str::FromStr for Format {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "matpower" | "m" => Ok(Format::Matpower),
            "psse" | "raw" => Ok(Format::Psse),
            "cim" | "rdf" | "cgmes" => Ok(Format::Cim),
            "dgs" | "digsilent" => Ok(Format::Dgs),
            "dpx" => Ok(Format::Dpx),
            "ipa" => Ok(Format::Ipa),
            "plexos" => Ok(Format::Plexos),
            "json" => Ok(Format::Json),
            "xlsx" | "excel" => Ok(Format::Xlsx),
            "sqlite" | "db" => Ok(Format::Sqlite),
            "binary" | "gxb" => Ok(Format::Binary),
            "archive" | "zip" | "gmz" => Ok(Format::Archive),
            _ => anyhow::bail!(
                "unknown format: {}. Supported: matpower, psse, cim, dgs, dpx, ipa, \
                 plexos, json, xlsx, sqlite, binary, archive",
                s
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_matpower_by_extension_and_content() {
        let (format, confidence) =
            Format::detect(Path::new("case14.m"), b"function mpc = case14\n").unwrap();
        assert_eq!(format, Format::Matpower);
        assert_eq!(confidence, Confidence::High);
    }

    #[test]
    fn detect_psse_header() {
        let (format, confidence) =
            Format::detect(Path::new("net.raw"), b"0, 100.00, 33, 0, 0, 60.0\n").unwrap();
        assert_eq!(format, Format::Psse);
        assert_eq!(confidence, Confidence::High);
    }

    #[test]
    fn json_extension_disambiguates_pack_from_ipa() {
        let pack = br#"{"format_version": "1.0.0", "tables": {}}"#;
        let (format, confidence) = Format::detect(Path::new("grid.json"), pack).unwrap();
        assert_eq!(format, Format::Json);
        assert_eq!(confidence, Confidence::High);

        let ipa = br#"{"version": 1, "buses": []}"#;
        let (format, confidence) = Format::detect(Path::new("grid.ipa"), ipa).unwrap();
        assert_eq!(format, Format::Ipa);
        assert_eq!(confidence, Confidence::High);
    }

    #[test]
    fn magic_bytes_without_extension() {
        let (format, confidence) =
            Format::detect(Path::new("payload"), b"GXB1rest-of-stream").unwrap();
        assert_eq!(format, Format::Binary);
        assert_eq!(confidence, Confidence::High);
    }

    #[test]
    fn unknown_extension_and_content_is_none() {
        assert!(Format::detect(Path::new("notes.txt"), b"hello").is_none());
    }

    #[test]
    fn from_str_round_trip() {
        assert_eq!("matpower".parse::<Format>().unwrap(), Format::Matpower);
        assert_eq!("plexos".parse::<Format>().unwrap(), Format::Plexos);
        assert_eq!("gmz".parse::<Format>().unwrap(), Format::Archive);
        assert!("vhdl".parse::<Format>().is_err());
    }

    #[test]
    fn import_export_capabilities() {
        assert!(!Format::Plexos.can_import());
        assert!(Format::Plexos.can_export());
        assert!(!Format::Dgs.can_export());
        assert!(Format::Json.can_import() && Format::Json.can_export());
    }
}
