//! Store file persistence
//!
//! The cache table is persisted as a small XML document:
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <items version="2">
//!     <item jar="/libs/a.jar" revision="23.0.1" sha1="..." jumboMode="false">
//!         <dex dex="/build/pre-dexed/a.jar"/>
//!     </item>
//! </items>
//! ```
//!
//! Files with another root element or version are treated as empty. There
//! is no migration between versions.

use crate::cache::entry::StoredItem;
use crate::cache::hash::{hash_file, SourceHash};
use crate::cache::key::{Attributes, Revision};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Format version written to and required from the root element
pub const STORE_VERSION: &str = "2";

const NODE_ITEMS: &str = "items";
const NODE_ITEM: &str = "item";
const NODE_DEX: &str = "dex";
const ATTR_VERSION: &str = "version";
const ATTR_JAR: &str = "jar";
const ATTR_DEX: &str = "dex";
const ATTR_SHA1: &str = "sha1";
const ATTR_REVISION: &str = "revision";

/// Errors reading or writing the store file
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store file could not be read or written.
    #[error("cache store I/O error at {path}: {source}")]
    Io {
        /// The store path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The document is not well-formed or a value could not be parsed.
    #[error("malformed cache store: {0}")]
    Parse(String),

    /// An `item` element lacks a required attribute.
    #[error("cache store item is missing the '{0}' attribute")]
    MissingAttribute(&'static str),

    /// The document could not be rendered.
    #[error("failed to render cache store: {0}")]
    Render(String),
}

impl StoreError {
    fn parse(err: impl fmt::Display) -> Self {
        Self::Parse(err.to_string())
    }

    fn render(err: impl fmt::Display) -> Self {
        Self::Render(err.to_string())
    }

    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// One persisted `item` element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Source library (`jar`)
    pub source_file: PathBuf,
    /// Tool revision (`revision`)
    pub revision: Revision,
    /// Source hash when the record was written (`sha1`)
    pub sha1: SourceHash,
    /// Specialization attributes, such as `jumboMode`
    pub attributes: Attributes,
    /// Output files (`dex` children), in order
    pub outputs: Vec<PathBuf>,
}

/// Whether a persisted record can still be reused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    /// Source unchanged and all outputs present
    Valid,
    /// Source library no longer exists
    SourceMissing,
    /// At least one output file is gone, or there are none
    OutputsMissing,
    /// Source library content changed since the record was written
    Stale,
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid => write!(f, "valid"),
            Self::SourceMissing => write!(f, "source-missing"),
            Self::OutputsMissing => write!(f, "outputs-missing"),
            Self::Stale => write!(f, "stale"),
        }
    }
}

impl Record {
    /// Check the record against the file system
    pub fn status(&self) -> RecordStatus {
        if !self.source_file.is_file() {
            return RecordStatus::SourceMissing;
        }
        if self.outputs.is_empty() || !self.outputs.iter().all(|f| f.is_file()) {
            return RecordStatus::OutputsMissing;
        }
        match hash_file(&self.source_file) {
            Ok(hash) if hash == self.sha1 => RecordStatus::Valid,
            _ => RecordStatus::Stale,
        }
    }

    /// The stored entry this record describes
    pub fn to_stored_item(&self) -> StoredItem {
        StoredItem::new(self.source_file.clone(), self.outputs.clone(), self.sha1)
    }
}

/// Read all records from a store file
///
/// A missing file, a foreign root element or a version mismatch all give an
/// empty list. Malformed content is an error.
pub fn read_store(path: &Path) -> Result<Vec<Record>, StoreError> {
    if !path.is_file() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    parse_store(&content)
}

/// Parse store file content
pub fn parse_store(content: &str) -> Result<Vec<Record>, StoreError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut records = Vec::new();
    let mut root_seen = false;
    let mut current: Option<Record> = None;

    loop {
        let (element, is_empty) = match reader.read_event().map_err(StoreError::parse)? {
            Event::Start(e) => (e, false),
            Event::Empty(e) => (e, true),
            Event::End(e) => {
                if e.local_name().as_ref() == NODE_ITEM.as_bytes() {
                    if let Some(record) = current.take() {
                        records.push(record);
                    }
                }
                continue;
            }
            Event::Eof => break,
            _ => continue,
        };

        if !root_seen {
            root_seen = true;
            if element.local_name().as_ref() != NODE_ITEMS.as_bytes() {
                return Ok(Vec::new());
            }
            let version = attributes(&element)?.remove(ATTR_VERSION);
            if version.as_deref() != Some(STORE_VERSION) {
                return Ok(Vec::new());
            }
            if is_empty {
                break;
            }
            continue;
        }

        match (element.local_name().as_ref(), current.as_mut()) {
            (b"item", None) => {
                let record = start_record(&element)?;
                if is_empty {
                    records.push(record);
                } else {
                    current = Some(record);
                }
            }
            (b"dex", Some(record)) => {
                let dex = attributes(&element)?
                    .remove(ATTR_DEX)
                    .ok_or(StoreError::MissingAttribute(ATTR_DEX))?;
                record.outputs.push(PathBuf::from(dex));
            }
            _ => {}
        }
    }

    if current.is_some() {
        return Err(StoreError::Parse("unterminated item element".to_string()));
    }

    Ok(records)
}

fn attributes(element: &BytesStart<'_>) -> Result<Attributes, StoreError> {
    let mut map = Attributes::new();
    for attr in element.attributes() {
        let attr = attr.map_err(StoreError::parse)?;
        let name = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value().map_err(StoreError::parse)?.into_owned();
        map.insert(name, value);
    }
    Ok(map)
}

fn start_record(element: &BytesStart<'_>) -> Result<Record, StoreError> {
    let mut attrs = attributes(element)?;
    let mut take = |name: &'static str| attrs.remove(name).ok_or(StoreError::MissingAttribute(name));

    let source_file = PathBuf::from(take(ATTR_JAR)?);
    let revision: Revision = take(ATTR_REVISION)?.parse().map_err(StoreError::parse)?;
    let sha1: SourceHash = take(ATTR_SHA1)?.parse().map_err(StoreError::parse)?;

    Ok(Record {
        source_file,
        revision,
        sha1,
        attributes: attrs,
        outputs: Vec::new(),
    })
}

/// Write records to a store file, creating parent directories
pub fn write_store(path: &Path, records: &[Record]) -> Result<(), StoreError> {
    let content = render_store(records)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    fs::write(path, content).map_err(|e| StoreError::io(path, e))
}

/// Render records as an indented store document
pub fn render_store(records: &[Record]) -> Result<Vec<u8>, StoreError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 4);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(StoreError::render)?;

    let mut root = BytesStart::new(NODE_ITEMS);
    root.push_attribute((ATTR_VERSION, STORE_VERSION));
    writer
        .write_event(Event::Start(root))
        .map_err(StoreError::render)?;

    for record in records {
        let jar = record.source_file.to_string_lossy();
        let revision = record.revision.to_string();
        let sha1 = record.sha1.to_string();

        let mut item = BytesStart::new(NODE_ITEM);
        item.push_attribute((ATTR_JAR, jar.as_ref()));
        item.push_attribute((ATTR_REVISION, revision.as_str()));
        item.push_attribute((ATTR_SHA1, sha1.as_str()));
        for (name, value) in &record.attributes {
            item.push_attribute((name.as_str(), value.as_str()));
        }

        if record.outputs.is_empty() {
            writer
                .write_event(Event::Empty(item))
                .map_err(StoreError::render)?;
            continue;
        }

        writer
            .write_event(Event::Start(item))
            .map_err(StoreError::render)?;
        for output in &record.outputs {
            let dex_path = output.to_string_lossy();
            let mut dex = BytesStart::new(NODE_DEX);
            dex.push_attribute((ATTR_DEX, dex_path.as_ref()));
            writer
                .write_event(Event::Empty(dex))
                .map_err(StoreError::render)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(NODE_ITEM)))
            .map_err(StoreError::render)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new(NODE_ITEMS)))
        .map_err(StoreError::render)?;

    let mut content = writer.into_inner();
    content.push(b'\n');
    Ok(content)
}
