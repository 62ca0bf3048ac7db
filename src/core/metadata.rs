//! Purpose: Model the ordered metadata table attached to a log at creation.
//! Exports: `Metadata`, `MetadataEntry`, well-known `MD_*` ids.
//! Role: Client-side view of creation metadata and its wire encoding.
//! Invariants: Entries keep insertion order; duplicate ids are allowed.
//! Invariants: Lookup by id returns the first match; lookup by index is positional.
//! Invariants: Wire form is a run of (u32 id, u32 length, bytes) triples, big-endian.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::core::error::{Error, ErrorKind};

pub type MetadataId = u32;

// System-defined ids are three ASCII characters packed into a u32.
pub const MD_XID: MetadataId = 0x0058_4944;
pub const MD_PUBKEY: MetadataId = 0x0050_5542;
pub const MD_CTIME: MetadataId = 0x0043_544D;
pub const MD_EXPIRE: MetadataId = 0x0058_544D;
pub const MD_CID: MetadataId = 0x0043_4944;
pub const MD_SYNTAX: MetadataId = 0x0053_594E;
pub const MD_LOCATION: MetadataId = 0x004C_4F43;
pub const MD_UUID: MetadataId = 0x0055_4944;

const TRIPLE_HEADER_LEN: usize = 8;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MetadataEntry {
    pub id: MetadataId,
    pub value: Bytes,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Metadata {
    entries: Vec<MetadataEntry>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: MetadataId, value: impl Into<Bytes>) -> Self {
        self.push(id, value);
        self
    }

    pub fn push(&mut self, id: MetadataId, value: impl Into<Bytes>) {
        self.entries.push(MetadataEntry {
            id,
            value: value.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&MetadataEntry> {
        self.entries.get(index)
    }

    pub fn find(&self, id: MetadataId) -> Option<&Bytes> {
        self.entries
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| &entry.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetadataEntry> {
        self.entries.iter()
    }

    pub fn encode(&self) -> Result<Bytes, Error> {
        let total = self
            .entries
            .iter()
            .map(|entry| TRIPLE_HEADER_LEN + entry.value.len())
            .sum();
        let mut buf = BytesMut::with_capacity(total);
        for entry in &self.entries {
            let len = u32::try_from(entry.value.len()).map_err(|_| {
                Error::new(ErrorKind::InvalidArgument)
                    .with_message(format!("metadata value for id {:#010x} is too large", entry.id))
            })?;
            buf.put_u32(entry.id);
            buf.put_u32(len);
            buf.put_slice(&entry.value);
        }
        Ok(buf.freeze())
    }

    pub fn decode(wire: &[u8]) -> Result<Self, Error> {
        let mut input = Bytes::copy_from_slice(wire);
        let mut metadata = Metadata::new();
        while input.has_remaining() {
            if input.remaining() < TRIPLE_HEADER_LEN {
                return Err(truncated(metadata.len()));
            }
            let id = input.get_u32();
            let len = input.get_u32() as usize;
            if input.remaining() < len {
                return Err(truncated(metadata.len()));
            }
            let value = input.split_to(len);
            metadata.push(id, value);
        }
        Ok(metadata)
    }
}

impl<V: Into<Bytes>> FromIterator<(MetadataId, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (MetadataId, V)>>(iter: I) -> Self {
        let mut metadata = Metadata::new();
        for (id, value) in iter {
            metadata.push(id, value);
        }
        metadata
    }
}

impl<'a> IntoIterator for &'a Metadata {
    type Item = &'a MetadataEntry;
    type IntoIter = std::slice::Iter<'a, MetadataEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

fn truncated(entry: usize) -> Error {
    Error::new(ErrorKind::InvalidArgument)
        .with_message(format!("metadata truncated at entry {entry}"))
}
