//! Seekable reader over an [`AssembledRarFile`] spanning one or more NZB
//! files (spec §4.7 RarVirtualFile).

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures::Stream;
use tracing::warn;

use crate::nntp::manager::NntpClientManager;
use crate::nzb::interpolator::SegmentInterpolator;
use crate::nzb::types::NzbFile;
use crate::prefetch::PrefetchBuffer;
use crate::rar::error::RarError;
use crate::rar::types::{AssembledRarFile, AssembledSpan, RarVolumeInfo};
use crate::yenc::YencCodec;

struct VolumeReader {
    interpolator: Arc<tokio::sync::Mutex<SegmentInterpolator>>,
    prefetch: Arc<PrefetchBuffer>,
}

pub struct RarVirtualFile {
    name: String,
    spans: Vec<AssembledSpan>,
    readers: HashMap<usize, VolumeReader>,
    pub total_size: u64,
    pub start_byte: u64,
    pub end_byte: u64,
}

impl RarVirtualFile {
    /// `range` is an inclusive `[start, end]` in the assembled file's
    /// logical byte space; `None` serves the whole file.
    pub fn new(
        file: &AssembledRarFile,
        volumes: &[RarVolumeInfo],
        nzb_files: &[NzbFile],
        client_manager: Arc<NntpClientManager>,
        prefetch_count: Option<usize>,
    ) -> Result<Self, RarError> {
        let total_size = file.size;

        let mut readers = HashMap::new();
        for span in &file.spans {
            if readers.contains_key(&span.volume_index) {
                continue;
            }
            let volume = volumes
                .iter()
                .find(|v| v.volume_index == span.volume_index)
                .ok_or(RarError::EmptyVolume(span.volume_index))?;
            let nzb_file = nzb_files
                .get(volume.nzb_file_index)
                .ok_or(RarError::EmptyVolume(span.volume_index))?;

            let interpolator = Arc::new(tokio::sync::Mutex::new(SegmentInterpolator::new(
                &nzb_file.segments,
            )));
            let prefetch = build_prefetch(nzb_file, Arc::clone(&client_manager), Arc::clone(&interpolator), prefetch_count);
            readers.insert(span.volume_index, VolumeReader { interpolator, prefetch });
        }

        Ok(Self {
            name: file.name.clone(),
            spans: file.spans.clone(),
            readers,
            total_size,
            start_byte: 0,
            end_byte: total_size.saturating_sub(1),
        })
    }

    /// Restricts the read to an inclusive logical byte range.
    pub fn with_range(mut self, start: u64, end: i64) -> Result<Self, RarError> {
        let end_byte = if end < 0 {
            self.total_size.saturating_sub(1)
        } else {
            (end as u64).min(self.total_size.saturating_sub(1))
        };
        if start >= self.total_size {
            return Err(RarError::InvalidRange);
        }
        self.start_byte = start;
        self.end_byte = end_byte;
        Ok(self)
    }

    pub fn content_length(&self) -> u64 {
        self.end_byte.saturating_sub(self.start_byte) + 1
    }

    fn span_for_offset(&self, file_offset: u64) -> Option<&AssembledSpan> {
        self.spans
            .iter()
            .find(|s| file_offset >= s.file_offset && file_offset < s.file_offset + s.size)
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, RarError>> {
        async_stream::try_stream! {
            let mut current_pos = self.start_byte;

            while current_pos <= self.end_byte {
                let span = self
                    .span_for_offset(current_pos)
                    .ok_or(RarError::InvalidRange)?;
                let position_in_span = current_pos - span.file_offset;
                let nzb_offset = span.volume_offset + position_in_span;

                let reader = self
                    .readers
                    .get(&span.volume_index)
                    .ok_or(RarError::InvalidRange)?;

                let location = {
                    let interpolator = reader.interpolator.lock().await;
                    interpolator
                        .find_segment_for_offset(nzb_offset as i64)
                        .ok_or(RarError::InvalidRange)?
                };

                let segment_bytes = reader.prefetch.get_segment(location.segment_index).await
                    .map_err(|e| map_stream_error(e, &self.name))?;

                let remaining_in_segment =
                    (segment_bytes.len() as u64).saturating_sub(location.offset_in_segment);
                let remaining_in_span = span.size - position_in_span;
                let remaining_in_range = self.end_byte - current_pos + 1;
                let to_read = remaining_in_segment.min(remaining_in_span).min(remaining_in_range);

                if to_read == 0 {
                    warn!(file = %self.name, "empty read at offset {current_pos}, advancing");
                    current_pos += 1;
                    continue;
                }

                let start = location.offset_in_segment as usize;
                let end = start + to_read as usize;
                yield segment_bytes.slice(start..end);

                current_pos += to_read;
            }
        }
    }
}

fn map_stream_error(error: crate::stream::error::StreamError, file: &str) -> RarError {
    use crate::stream::error::StreamError;
    match error {
        StreamError::ArticleMissing { source, .. } => RarError::ArticleMissing {
            file: file.to_string(),
            source,
        },
        StreamError::MalformedYenc { source, .. } => RarError::MalformedYenc {
            file: file.to_string(),
            source,
        },
        StreamError::InvalidRange => RarError::InvalidRange,
    }
}

type FetchFuture = Pin<Box<dyn std::future::Future<Output = Result<Bytes, crate::stream::error::StreamError>> + Send>>;

fn build_prefetch(
    nzb_file: &NzbFile,
    client_manager: Arc<NntpClientManager>,
    interpolator: Arc<tokio::sync::Mutex<SegmentInterpolator>>,
    prefetch_count: Option<usize>,
) -> Arc<PrefetchBuffer> {
    let segments = nzb_file.segments.clone();
    let file_name = nzb_file.name.clone();
    let fetch = move |index: usize| -> FetchFuture {
        let client_manager = Arc::clone(&client_manager);
        let segments = segments.clone();
        let interpolator = Arc::clone(&interpolator);
        let file_name = file_name.clone();
        Box::pin(async move {
            let segment = segments
                .get(index)
                .ok_or(crate::stream::error::StreamError::InvalidRange)?;
            let raw = client_manager.get_article(&segment.message_id).await.map_err(|e| {
                crate::stream::error::StreamError::ArticleMissing {
                    file: file_name.clone(),
                    segment_index: index,
                    source: e,
                }
            })?;
            let decoded = YencCodec::decode(&raw).map_err(|e| crate::stream::error::StreamError::MalformedYenc {
                file: file_name.clone(),
                segment_index: index,
                source: e,
            })?;
            interpolator
                .lock()
                .await
                .update_decoded_size(index, decoded.data.len() as u64);
            Ok(Bytes::from(decoded.data))
        })
    };
    Arc::new(PrefetchBuffer::with_limits(Arc::new(fetch), prefetch_count.unwrap_or(5), 20))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nntp::config::NntpServerConfig;
    use crate::nzb::types::NzbSegment;
    use crate::rar::types::{RarArchiveInfo, RarFileEntry, RarFormat};
    use chrono::Utc;

    fn nzb_file(index: usize, name: &str) -> NzbFile {
        NzbFile {
            index,
            name: name.into(),
            poster: "poster@example.com".into(),
            date: Utc::now(),
            subject: name.into(),
            groups: vec!["alt.bin".into()],
            segments: vec![NzbSegment::new("a@x".into(), 1, 1_000_000)],
            size: 1_000_000,
            is_rar: true,
            rar_part_number: Some(1),
        }
    }

    fn volume(volume_index: usize, nzb_file_index: usize, size: u64, continues: bool) -> RarVolumeInfo {
        RarVolumeInfo {
            volume_index,
            nzb_file_index,
            info: RarArchiveInfo {
                format: RarFormat::Rar5,
                is_multi_volume: true,
                is_encrypted: false,
                has_encrypted_headers: false,
                is_solid: false,
                files: vec![RarFileEntry {
                    name: "movie.mkv".into(),
                    size,
                    compressed_size: size,
                    data_offset: 64,
                    method: 0x30,
                    is_encrypted: false,
                    crc32: None,
                    attributes: None,
                    mtime: None,
                    continues_to_next: continues,
                }],
                header_end_offset: 64,
            },
        }
    }

    #[test]
    fn spans_the_full_assembled_size_by_default() {
        let volumes = vec![volume(0, 0, 1_000_000, true), volume(1, 1, 500_000, false)];
        let nzb_files = vec![nzb_file(0, "movie.part1.rar"), nzb_file(1, "movie.part2.rar")];
        let assembled = crate::rar::assembler::MultiPartAssembler::assemble(&volumes);
        let file = &assembled[0];

        let manager = Arc::new(NntpClientManager::new(vec![NntpServerConfig::new(
            "p".into(),
            "news.example.com".into(),
            563,
            true,
            None,
            None,
            5,
            0,
        )]));
        let vfile = RarVirtualFile::new(file, &volumes, &nzb_files, manager, None).unwrap();
        assert_eq!(vfile.total_size, 1_500_000);
        assert_eq!(vfile.content_length(), 1_500_000);
    }
}
