//! RAR4/RAR5 header and assembled-file shapes (spec §3, §4.7).

/// Stored-only compression method value used by both RAR4 and RAR5 for
/// uncompressed entries. RAR5 reuses the same numeric value.
pub const METHOD_STORE: u8 = 0;
/// RAR5's own "store" method constant, distinct from `METHOD_STORE` because
/// the two formats encode `compressionInfo` differently even though the
/// stored bytes end up identical.
pub const METHOD_STORE_RAR5: u8 = 0x30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RarFormat {
    Rar4,
    Rar5,
}

/// One file entry inside a single RAR volume.
#[derive(Debug, Clone)]
pub struct RarFileEntry {
    pub name: String,
    pub size: u64,
    pub compressed_size: u64,
    /// Offset of the entry's data within the containing NZB file's decoded
    /// byte stream, i.e. just past this entry's header.
    pub data_offset: u64,
    pub method: u8,
    pub is_encrypted: bool,
    pub crc32: Option<u32>,
    pub attributes: Option<u64>,
    pub mtime: Option<u32>,
    /// True if the RAR4 `CONTINUED_TO_NEXT` flag (or the RAR5 equivalent —
    /// the volume ending without a terminal END block) was set on this
    /// entry, meaning the same-named file carries on in the next volume.
    pub continues_to_next: bool,
}

impl RarFileEntry {
    pub fn is_stored(&self) -> bool {
        self.method == METHOD_STORE || self.method == METHOD_STORE_RAR5
    }
}

/// Parsed header information for one RAR volume (one NZB file).
#[derive(Debug, Clone)]
pub struct RarArchiveInfo {
    pub format: RarFormat,
    pub is_multi_volume: bool,
    pub is_encrypted: bool,
    pub has_encrypted_headers: bool,
    pub is_solid: bool,
    pub files: Vec<RarFileEntry>,
    pub header_end_offset: u64,
}

impl RarArchiveInfo {
    /// `canStreamRar` (spec §4.7): headers must be readable in the clear,
    /// the archive must not use solid compression, and every entry must be
    /// stored rather than compressed.
    pub fn can_stream(&self) -> bool {
        !self.has_encrypted_headers
            && !self.is_solid
            && self.files.iter().all(|f| f.is_stored())
    }
}

/// One volume in an ordered multi-volume set, tied back to the NZB file it
/// came from.
#[derive(Debug, Clone)]
pub struct RarVolumeInfo {
    pub volume_index: usize,
    pub nzb_file_index: usize,
    pub info: RarArchiveInfo,
}

/// One contiguous byte run of an [`AssembledRarFile`] living inside a single
/// volume's decoded NZB byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssembledSpan {
    pub volume_index: usize,
    pub volume_offset: u64,
    pub file_offset: u64,
    pub size: u64,
}

/// A file reassembled across one or more RAR volumes, as it would appear to
/// a consumer seeking over it by logical byte offset.
#[derive(Debug, Clone)]
pub struct AssembledRarFile {
    pub name: String,
    pub size: u64,
    pub is_encrypted: bool,
    pub method: u8,
    pub spans: Vec<AssembledSpan>,
}

impl AssembledRarFile {
    pub fn is_stored(&self) -> bool {
        self.method == METHOD_STORE || self.method == METHOD_STORE_RAR5
    }
}
