// Copyright (c) 2025 nnsearch Contributors
// Licensed under the nnsearch License. See LICENSE file for details.

//! Index files.
//!
//! An index file stores the search structure only; the points are never
//! written and must be supplied again at load time.
//!
//! ```text
//! ┌───────┬─────────┬─────┬─────┬──────┬─────────────┬──────────────┬─────────┐
//! │ NNIX  │ version │ tag │ dim │ rows │ payload_len │ payload      │ CRC32   │
//! │ 4 B   │ u16 LE  │ u8  │ u64 │ u64  │ u64 LE      │ bincode      │ u32 LE  │
//! └───────┴─────────┴─────┴─────┴──────┴─────────────┴──────────────┴─────────┘
//! ```
//!
//! The payload holds the parameters, the structure and any autotuning
//! summary. Files are written to a sibling `.tmp` path and renamed into
//! place, so a crash never leaves a half-written index under the final name.

use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::Dataset;
use crate::error::{AnnError, Result};
use crate::index::{Index, Structure, TuningSummary};
use crate::params::{IndexFamily, IndexParams};

/// Magic bytes opening every index file.
const MAGIC: &[u8; 4] = b"NNIX";

/// Current index file format version.
pub const FORMAT_VERSION: u16 = 1;

const HEADER_LEN: usize = 4 + 2 + 1 + 8 + 8 + 8;
const FOOTER_LEN: usize = 4;

/// Fixed-size header of an index file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHeader {
    /// File format version.
    pub version: u16,
    /// Family of the stored structure.
    pub family: IndexFamily,
    /// Point dimension the index was built for.
    pub dim: usize,
    /// Number of points the index was built over.
    pub rows: usize,
    /// Length of the encoded payload in bytes.
    pub payload_len: u64,
}

#[derive(Serialize)]
struct PayloadRef<'a> {
    params: &'a IndexParams,
    structure: &'a Structure,
    tuning: Option<&'a TuningSummary>,
}

#[derive(Deserialize)]
struct Payload {
    params: IndexParams,
    structure: Structure,
    tuning: Option<TuningSummary>,
}

/// Write `index` to `path`, replacing any existing file atomically.
///
/// # Errors
///
/// [`AnnError::Io`] on any filesystem failure; no partial file is left at `path`.
pub fn save(index: &Index, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let payload = bincode::serialize(&PayloadRef {
        params: index.params(),
        structure: index.structure(),
        tuning: index.tuning(),
    })?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len() + FOOTER_LEN);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.push(index.family().tag());
    bytes.extend_from_slice(&(index.dim() as u64).to_le_bytes());
    bytes.extend_from_slice(&(index.rows() as u64).to_le_bytes());
    bytes.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&payload);
    bytes.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());

    write_atomic(path, &bytes)?;
    info!(
        path = %path.display(),
        family = %index.family(),
        bytes = bytes.len(),
        "index saved"
    );
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = tmp_path(path);
    let written = File::create(&tmp).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    let renamed = written.and_then(|()| fs::rename(&tmp, path));
    if let Err(e) = renamed {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// Read only the header of an index file.
pub fn inspect(path: impl AsRef<Path>) -> Result<IndexHeader> {
    let mut file = File::open(path.as_ref())?;
    let mut header = [0u8; HEADER_LEN];
    file.read_exact(&mut header).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => AnnError::CorruptIndexFile("truncated header".to_string()),
        _ => AnnError::Io(e),
    })?;
    parse_header(&header)
}

/// Load an index of any family over `dataset`.
///
/// `dataset` must be the data the index was built over: same dimension and
/// row count, rows in the same order.
///
/// # Errors
///
/// - [`AnnError::CorruptIndexFile`] for a malformed, truncated or inconsistent file
/// - [`AnnError::DimensionMismatch`] if `dataset.cols()` differs from the stored dimension
/// - [`AnnError::RowCountMismatch`] if `dataset.rows()` differs from the stored row count
/// - [`AnnError::Io`] on filesystem failure
pub fn load(path: impl AsRef<Path>, dataset: &Dataset) -> Result<Index> {
    load_checked(path.as_ref(), dataset, None)
}

/// Like [`load`], but fails with [`AnnError::FamilyMismatch`] unless the
/// file holds a `family` index.
pub fn load_as(path: impl AsRef<Path>, dataset: &Dataset, family: IndexFamily) -> Result<Index> {
    load_checked(path.as_ref(), dataset, Some(family))
}

fn load_checked(path: &Path, dataset: &Dataset, expected: Option<IndexFamily>) -> Result<Index> {
    let bytes = fs::read(path)?;
    let header = parse_header(&bytes)?;

    if let Some(expected) = expected {
        if header.family != expected {
            return Err(AnnError::FamilyMismatch {
                expected,
                found: header.family,
            });
        }
    }

    let payload_len = usize::try_from(header.payload_len)
        .map_err(|_| AnnError::CorruptIndexFile("payload length overflows".to_string()))?;
    let body = &bytes[HEADER_LEN..];
    let expected_len = payload_len
        .checked_add(FOOTER_LEN)
        .ok_or_else(|| AnnError::CorruptIndexFile("payload length overflows".to_string()))?;
    if body.len() < expected_len {
        return Err(AnnError::CorruptIndexFile(format!(
            "truncated: {} payload bytes expected, {} present",
            expected_len,
            body.len()
        )));
    }
    if body.len() > expected_len {
        return Err(AnnError::CorruptIndexFile(format!(
            "{} trailing bytes after footer",
            body.len() - expected_len
        )));
    }

    let (payload, footer) = body.split_at(payload_len);
    let stored_crc = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]);
    if crc32fast::hash(payload) != stored_crc {
        return Err(AnnError::CorruptIndexFile("checksum mismatch".to_string()));
    }

    if header.dim != dataset.cols() {
        return Err(AnnError::DimensionMismatch {
            expected: header.dim,
            got: dataset.cols(),
        });
    }
    if header.rows != dataset.rows() {
        return Err(AnnError::RowCountMismatch {
            expected: header.rows,
            got: dataset.rows(),
        });
    }

    let payload: Payload = bincode::deserialize(payload)
        .map_err(|e| AnnError::CorruptIndexFile(format!("undecodable payload: {}", e)))?;
    if payload.structure.family() != header.family || payload.params.family() != header.family {
        return Err(AnnError::CorruptIndexFile(format!(
            "header says {}, payload holds {} built with {} parameters",
            header.family,
            payload.structure.family(),
            payload.params.family()
        )));
    }
    payload.params.validate().map_err(|e| {
        AnnError::CorruptIndexFile(format!("stored parameters are invalid: {}", e))
    })?;
    payload.structure.validate(dataset.rows(), dataset.cols())?;

    info!(
        path = %path.display(),
        family = %header.family,
        rows = header.rows,
        dim = header.dim,
        "index loaded"
    );
    Ok(Index::from_parts(
        dataset.clone(),
        payload.params,
        payload.structure,
        payload.tuning,
    ))
}

fn parse_header(bytes: &[u8]) -> Result<IndexHeader> {
    if bytes.len() < HEADER_LEN {
        return Err(AnnError::CorruptIndexFile(format!(
            "truncated header: {} of {} bytes",
            bytes.len(),
            HEADER_LEN
        )));
    }
    if &bytes[0..4] != MAGIC {
        return Err(AnnError::CorruptIndexFile(
            "invalid magic bytes - not an index file".to_string(),
        ));
    }

    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != FORMAT_VERSION {
        return Err(AnnError::CorruptIndexFile(format!(
            "unsupported version: {} (expected {})",
            version, FORMAT_VERSION
        )));
    }

    let family = match IndexFamily::from_tag(bytes[6]) {
        Some(IndexFamily::Autotuned) | None => {
            return Err(AnnError::CorruptIndexFile(format!(
                "invalid family tag: {}",
                bytes[6]
            )))
        }
        Some(family) => family,
    };

    let read_u64 = |at: usize| {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes[at..at + 8]);
        u64::from_le_bytes(raw)
    };
    let to_usize = |v: u64| {
        usize::try_from(v).map_err(|_| AnnError::CorruptIndexFile(format!("{} overflows usize", v)))
    };

    Ok(IndexHeader {
        version,
        family,
        dim: to_usize(read_u64(7))?,
        rows: to_usize(read_u64(15))?,
        payload_len: read_u64(23),
    })
}
