//! Index files: one JSON header line, then one quad per line in key order.
//!
//! ```text
//! {"schema":1,"permutation":"spoc","count":2,"digest":"<sha256 of records>"}
//! {"s":{...},"p":{...},"o":{...},"c":{...}}
//! {"s":{...},"p":{...},"o":{...}}
//! ```
//!
//! The header count is what the store reports as its size. It is not
//! checked against the records at load time; a disagreement is exactly what
//! a consistency probe looks for.

use crate::error::StoreError;
use crate::ordering::{IndexKey, Permutation};
use crate::quad::Quad;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub const INDEX_SCHEMA: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexHeader {
    pub schema: u32,
    pub permutation: String,
    pub count: u64,
    pub digest: String,
}

/// One index loaded into memory.
#[derive(Debug, Clone)]
pub struct LoadedIndex {
    pub permutation: Permutation,
    pub recorded_count: u64,
    pub entries: BTreeMap<IndexKey, Quad>,
}

impl LoadedIndex {
    pub fn empty(permutation: Permutation) -> Self {
        Self {
            permutation,
            recorded_count: 0,
            entries: BTreeMap::new(),
        }
    }
}

/// Read and validate one index file.
pub fn read_index(path: impl AsRef<Path>, permutation: Permutation) -> Result<LoadedIndex, StoreError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| StoreError::io(path, e))?;
    validate_substrate_bytes(path, &bytes)?;
    let text = std::str::from_utf8(&bytes).map_err(|e| StoreError::corrupt(path, e.to_string()))?;

    let mut lines = text
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty());

    let (_, header_line) = lines
        .next()
        .ok_or_else(|| StoreError::corrupt(path, "missing index header"))?;
    let header: IndexHeader = serde_json::from_str(header_line.trim())
        .map_err(|e| StoreError::corrupt(path, format!("line 1: header parse error: {e}")))?;
    if header.schema != INDEX_SCHEMA {
        return Err(StoreError::corrupt(
            path,
            format!("unsupported index schema {}", header.schema),
        ));
    }
    if header.permutation != permutation.to_string() {
        return Err(StoreError::corrupt(
            path,
            format!(
                "header names permutation {} but {permutation} was expected",
                header.permutation
            ),
        ));
    }

    let mut hasher = Sha256::new();
    let mut entries = BTreeMap::new();
    let mut previous: Option<IndexKey> = None;
    for (line_no, line) in lines {
        let trimmed = line.trim();
        hasher.update(trimmed.as_bytes());
        hasher.update(b"\n");
        let quad: Quad = serde_json::from_str(trimmed).map_err(|e| {
            StoreError::corrupt(path, format!("line {}: parse error: {e}", line_no + 1))
        })?;
        let key = permutation.key(&quad);
        if previous.as_ref().is_some_and(|prev| *prev >= key) {
            return Err(StoreError::corrupt(
                path,
                format!("line {}: record out of order", line_no + 1),
            ));
        }
        previous = Some(key.clone());
        entries.insert(key, quad);
    }

    let digest = format!("{:x}", hasher.finalize());
    if digest != header.digest {
        return Err(StoreError::corrupt(path, "record digest mismatch"));
    }

    Ok(LoadedIndex {
        permutation,
        recorded_count: header.count,
        entries,
    })
}

/// Write `quads` as the index file for `permutation`, replacing it atomically.
///
/// Records are sorted and deduplicated by the permutation key; the header
/// count is the number of records written.
pub fn write_index<'a>(
    path: impl AsRef<Path>,
    permutation: Permutation,
    quads: impl IntoIterator<Item = &'a Quad>,
) -> Result<u64, StoreError> {
    let path = path.as_ref();
    let sorted: BTreeMap<IndexKey, &Quad> = quads
        .into_iter()
        .map(|quad| (permutation.key(quad), quad))
        .collect();

    let mut hasher = Sha256::new();
    let mut records = Vec::with_capacity(sorted.len());
    for quad in sorted.values() {
        let line = serde_json::to_string(quad)
            .map_err(|e| StoreError::Io(format!("serialization error: {e}")))?;
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
        records.push(line);
    }
    let header = IndexHeader {
        schema: INDEX_SCHEMA,
        permutation: permutation.to_string(),
        count: records.len() as u64,
        digest: format!("{:x}", hasher.finalize()),
    };
    let header_line = serde_json::to_string(&header)
        .map_err(|e| StoreError::Io(format!("serialization error: {e}")))?;

    write_atomically(path, |writer| {
        writeln!(writer, "{header_line}")?;
        for line in &records {
            writeln!(writer, "{line}")?;
        }
        Ok(())
    })?;
    Ok(header.count)
}

pub(crate) fn write_atomically(
    path: &Path,
    write: impl FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
) -> Result<(), StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }

    let tmp_path = tmp_write_path(path);
    let write_result = (|| -> Result<(), StoreError> {
        let file = File::create(&tmp_path).map_err(|e| StoreError::io(&tmp_path, e))?;
        let mut writer = BufWriter::new(file);
        write(&mut writer).map_err(|e| StoreError::io(&tmp_path, e))?;
        writer.flush().map_err(|e| StoreError::io(&tmp_path, e))?;
        let file = writer
            .into_inner()
            .map_err(|e| StoreError::io(&tmp_path, e))?;
        file.sync_all().map_err(|e| StoreError::io(&tmp_path, e))?;
        Ok(())
    })();

    if let Err(error) = write_result {
        let _ = fs::remove_file(&tmp_path);
        return Err(error);
    }

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        StoreError::Io(format!(
            "{} -> {}: {e}",
            tmp_path.display(),
            path.display()
        ))
    })?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        let dir = File::open(parent).map_err(|e| StoreError::io(parent, e))?;
        dir.sync_all().map_err(|e| StoreError::io(parent, e))?;
    }

    Ok(())
}

fn tmp_write_path(path: &Path) -> PathBuf {
    let unique = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let mut tmp: OsString = path.as_os_str().to_os_string();
    tmp.push(format!(".tmp.{}.{}", std::process::id(), unique));
    PathBuf::from(tmp)
}

fn validate_substrate_bytes(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if bytes.contains(&0) {
        return Err(StoreError::corrupt(path, "contains NUL byte(s)"));
    }
    if std::str::from_utf8(bytes).is_err() {
        return Err(StoreError::corrupt(
            path,
            "contains non-UTF-8 byte sequence(s)",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quad::Term;

    fn temp_path(prefix: &str) -> PathBuf {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "quadfix-index-{prefix}-{}-{unique}.dat",
            std::process::id()
        ))
    }

    fn quad(s: &str, p: &str, c: Option<&str>) -> Quad {
        Quad::new(
            Term::iri(s),
            Term::iri(p),
            Term::literal(format!("{s}-{p}")),
            c.map(Term::iri),
        )
    }

    fn spoc() -> Permutation {
        "spoc".parse().expect("permutation should parse")
    }

    #[test]
    fn write_then_read_keeps_records_sorted_and_counted() {
        let path = temp_path("roundtrip");
        let quads = vec![
            quad("urn:b", "urn:p", Some("urn:g")),
            quad("urn:a", "urn:p", None),
            quad("urn:a", "urn:p", None),
        ];
        let written = write_index(&path, spoc(), &quads).expect("index should write");
        assert_eq!(written, 2);

        let loaded = read_index(&path, spoc()).expect("index should load");
        assert_eq!(loaded.recorded_count, 2);
        let subjects: Vec<&str> = loaded
            .entries
            .values()
            .map(|q| q.subject.value())
            .collect();
        assert_eq!(subjects, vec!["urn:a", "urn:b"]);

        let _ = fs::remove_file(path);
    }

    #[test]
    fn read_index_rejects_nul_payload() {
        let path = temp_path("nul");
        fs::write(&path, b"{\"schema\":1}\n\0garbage").expect("fixture should write");

        match read_index(&path, spoc()) {
            Err(StoreError::Corrupt { message, .. }) => assert!(message.contains("NUL")),
            other => panic!("expected corrupt index error, got {other:?}"),
        }

        let _ = fs::remove_file(path);
    }

    #[test]
    fn read_index_rejects_tampered_records() {
        let path = temp_path("digest");
        write_index(&path, spoc(), &[quad("urn:a", "urn:p", None)]).expect("index should write");
        let text = fs::read_to_string(&path).expect("index should exist");
        fs::write(&path, text.replace("urn:a-urn:p", "urn:a-urn:q")).expect("tamper should write");

        match read_index(&path, spoc()) {
            Err(StoreError::Corrupt { message, .. }) => assert!(message.contains("digest")),
            other => panic!("expected digest mismatch, got {other:?}"),
        }

        let _ = fs::remove_file(path);
    }

    #[test]
    fn read_index_rejects_foreign_permutation() {
        let path = temp_path("perm");
        write_index(&path, spoc(), &[quad("urn:a", "urn:p", None)]).expect("index should write");
        let psoc: Permutation = "psoc".parse().expect("permutation should parse");

        match read_index(&path, psoc) {
            Err(StoreError::Corrupt { message, .. }) => assert!(message.contains("spoc")),
            other => panic!("expected permutation mismatch, got {other:?}"),
        }

        let _ = fs::remove_file(path);
    }
}
