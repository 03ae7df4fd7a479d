//! Named-entry archive used to persist engines and chunking layers.
//!
//! An archive is a gzip-compressed tar file. Each component writes one or
//! more entries named `<owner>/<field>`; an entry body is a short header
//! (magic + format version) followed by a bincode payload.
//!
//! Writers buffer entries in memory and commit them with a temp file and
//! rename, so a failed save never leaves a half-written archive behind.
//! Readers load every entry up front; a load that fails on any entry leaves
//! the caller's state untouched because decoding happens before mutation.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use bincode::{Decode, Encode};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::error::{SearchError, SearchResult};

const ENTRY_MAGIC: &[u8; 4] = b"RGSA";
const ENTRY_VERSION: u32 = 1;
const HEADER_LEN: usize = 8;

/// Name of the entry `field` written by component `owner`.
pub fn entry_name(owner: &str, field: &str) -> String {
    format!("{owner}/{field}")
}

/// Collects named entries and commits them to disk in one step.
#[derive(Debug, Default)]
pub struct ArchiveWriter {
    entries: BTreeMap<String, Vec<u8>>,
}

impl ArchiveWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save_entry<T: Encode>(&mut self, name: impl Into<String>, value: &T) -> SearchResult<()> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(SearchError::invalid_argument(format!(
                "archive entry '{name}' written twice"
            )));
        }

        let payload = bincode::encode_to_vec(value, bincode::config::standard())
            .map_err(|e| SearchError::corrupt_entry(&name, e))?;
        let mut body = Vec::with_capacity(HEADER_LEN + payload.len());
        body.extend_from_slice(ENTRY_MAGIC);
        body.extend_from_slice(&ENTRY_VERSION.to_le_bytes());
        body.extend_from_slice(&payload);
        self.entries.insert(name, body);
        Ok(())
    }

    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Writes all entries to `path`, replacing any existing file atomically.
    pub fn commit(self, path: &Path) -> SearchResult<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(|e| SearchError::io(dir, e))?;

        let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(|e| SearchError::io(dir, e))?;
        self.write_tar(temp.as_file_mut())
            .map_err(|e| SearchError::io(temp.path(), e))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| SearchError::io(temp.path(), e))?;
        temp.persist(path)
            .map_err(|e| SearchError::io(path, e.error))?;

        tracing::debug!(
            target: "ragsearch::archive",
            "committed {} entries to {}",
            self.entries.len(),
            path.display()
        );
        Ok(())
    }

    fn write_tar<W: Write>(&self, sink: W) -> std::io::Result<()> {
        let encoder = GzEncoder::new(sink, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, body) in &self.entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            builder.append_data(&mut header, name, body.as_slice())?;
        }
        builder.into_inner()?.finish()?;
        Ok(())
    }
}

/// Read side of an archive; all entries are held in memory.
#[derive(Debug, Default)]
pub struct ArchiveReader {
    entries: HashMap<String, Vec<u8>>,
}

impl ArchiveReader {
    pub fn open(path: &Path) -> SearchResult<Self> {
        let file = File::open(path).map_err(|e| SearchError::io(path, e))?;
        let mut archive = tar::Archive::new(GzDecoder::new(file));
        let unreadable = |e: std::io::Error| SearchError::corrupt_entry(path.display().to_string(), e);

        let mut entries = HashMap::new();
        for entry in archive.entries().map_err(unreadable)? {
            let mut entry = entry.map_err(unreadable)?;
            let name = entry
                .path()
                .map_err(unreadable)?
                .to_string_lossy()
                .into_owned();
            let mut body = Vec::new();
            entry
                .read_to_end(&mut body)
                .map_err(|e| SearchError::corrupt_entry(&name, e))?;
            entries.insert(name, body);
        }

        tracing::debug!(
            target: "ragsearch::archive",
            "opened {} with {} entries",
            path.display(),
            entries.len()
        );
        Ok(Self { entries })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Decodes entry `name`. Missing or malformed entries are
    /// [`SearchError::CorruptArchiveEntry`].
    pub fn load_entry<T: Decode<()>>(&self, name: &str) -> SearchResult<T> {
        let body = self
            .entries
            .get(name)
            .ok_or_else(|| SearchError::corrupt_entry(name, "entry not present in archive"))?;

        if body.len() < HEADER_LEN || &body[..4] != ENTRY_MAGIC {
            return Err(SearchError::corrupt_entry(name, "bad entry header"));
        }
        let mut version = [0u8; 4];
        version.copy_from_slice(&body[4..HEADER_LEN]);
        let version = u32::from_le_bytes(version);
        if version != ENTRY_VERSION {
            return Err(SearchError::corrupt_entry(
                name,
                format!("unsupported entry version {version}, expected {ENTRY_VERSION}"),
            ));
        }

        let payload = &body[HEADER_LEN..];
        let (value, read) = bincode::decode_from_slice(payload, bincode::config::standard())
            .map_err(|e| SearchError::corrupt_entry(name, e))?;
        if read != payload.len() {
            return Err(SearchError::corrupt_entry(
                name,
                format!("{} trailing bytes after payload", payload.len() - read),
            ));
        }
        Ok(value)
    }
}

impl From<ArchiveWriter> for ArchiveReader {
    fn from(writer: ArchiveWriter) -> Self {
        Self {
            entries: writer.entries.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[test]
    fn test_entries_survive_commit_and_open() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("store.tar.gz");

        let mut texts = BTreeMap::new();
        texts.insert(3u64, "hello world".to_string());
        texts.insert(9u64, "grüße".to_string());

        let mut writer = ArchiveWriter::new();
        writer
            .save_entry(entry_name("BruteForceSearch", "entries"), &texts)
            .unwrap();
        writer
            .save_entry(entry_name("BruteForceSearch", "counters"), &(10u64, 2u64))
            .unwrap();
        writer.commit(&path).unwrap();

        let reader = ArchiveReader::open(&path).unwrap();
        assert!(reader.contains("BruteForceSearch/entries"));
        let loaded: BTreeMap<u64, String> = reader.load_entry("BruteForceSearch/entries").unwrap();
        assert_eq!(loaded, texts);
        let counters: (u64, u64) = reader.load_entry("BruteForceSearch/counters").unwrap();
        assert_eq!(counters, (10, 2));
    }

    #[test]
    fn test_duplicate_entry_name_rejected() {
        let mut writer = ArchiveWriter::new();
        writer.save_entry("a/b", &1u32).unwrap();
        assert!(matches!(
            writer.save_entry("a/b", &2u32),
            Err(SearchError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_missing_and_mistyped_entries_are_corrupt() {
        let mut writer = ArchiveWriter::new();
        writer.save_entry("x/text", &"short".to_string()).unwrap();
        let reader = ArchiveReader::from(writer);

        assert!(matches!(
            reader.load_entry::<u64>("x/absent"),
            Err(SearchError::CorruptArchiveEntry { ref name, .. }) if name == "x/absent"
        ));
        // A string payload does not decode as a map of vectors
        assert!(matches!(
            reader.load_entry::<BTreeMap<u64, Vec<f32>>>("x/text"),
            Err(SearchError::CorruptArchiveEntry { .. })
        ));
    }

    #[test]
    fn test_garbage_file_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("garbage.tar.gz");
        std::fs::write(&path, b"definitely not gzip").unwrap();
        assert!(matches!(
            ArchiveReader::open(&path),
            Err(SearchError::CorruptArchiveEntry { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        assert!(matches!(
            ArchiveReader::open(&temp_dir.path().join("absent.tar.gz")),
            Err(SearchError::Io { .. })
        ));
    }
}
