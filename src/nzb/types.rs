//! NZB data model (spec §3).

use chrono::{DateTime, Utc};

/// One article reference inside a `<file>` block. Immutable after parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NzbSegment {
    pub message_id: String,
    pub number: u32,
    pub bytes: u64,
}

impl NzbSegment {
    pub fn new(message_id: String, number: u32, bytes: u64) -> Self {
        Self {
            message_id,
            number,
            bytes,
        }
    }
}

/// One `<file>` entry. `name` is extracted from `subject` (spec §4.5);
/// `size` is the wire-declared sum of segment sizes, not the decoded size.
#[derive(Debug, Clone)]
pub struct NzbFile {
    pub index: usize,
    pub name: String,
    pub poster: String,
    pub date: DateTime<Utc>,
    pub subject: String,
    pub groups: Vec<String>,
    pub segments: Vec<NzbSegment>,
    pub size: u64,
    pub is_rar: bool,
    pub rar_part_number: Option<u32>,
}

impl NzbFile {
    pub fn extension(&self) -> Option<&str> {
        self.name.rsplit('.').next()
    }

    pub fn sort_segments(&mut self) {
        self.segments.sort_by_key(|s| s.number);
    }
}

/// The parsed, validated result of [`crate::nzb::parser::NzbParser::parse`].
#[derive(Debug, Clone)]
pub struct ParsedNzb {
    pub hash: String,
    pub files: Vec<NzbFile>,
    /// Indices into `files`: media files and RAR parts, non-RAR first
    /// (by name), then RAR parts ordered by `rar_part_number`.
    pub media_file_indices: Vec<usize>,
    pub total_size: u64,
    pub groups: Vec<String>,
}

impl ParsedNzb {
    pub fn media_files(&self) -> impl Iterator<Item = &NzbFile> {
        self.media_file_indices.iter().map(move |&i| &self.files[i])
    }

    pub fn find_file(&self, name: &str) -> Option<&NzbFile> {
        self.files.iter().find(|f| f.name == name)
    }
}

const VIDEO_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "mov", "wmv", "flv", "webm", "m4v", "mpg", "mpeg", "ts", "m2ts", "vob",
];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "aac", "ogg", "wav", "m4a", "wma"];

pub fn is_video_file(name: &str) -> bool {
    extension_of(name)
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

pub fn is_audio_file(name: &str) -> bool {
    extension_of(name)
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

pub fn is_media_file(name: &str) -> bool {
    is_video_file(name) || is_audio_file(name)
}

fn extension_of(name: &str) -> Option<String> {
    name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_video_and_audio() {
        assert!(is_video_file("Movie.mkv"));
        assert!(is_audio_file("Track.FLAC"));
        assert!(is_media_file("Movie.MP4"));
        assert!(!is_media_file("archive.rar"));
    }
}
