//! Cross-volume file reassembly (spec §4.7 MultiPartAssembler).

use super::types::{AssembledRarFile, AssembledSpan, RarVolumeInfo};

pub struct MultiPartAssembler;

impl MultiPartAssembler {
    /// `volumes` must already be sorted by `rarPartNumber` (the order
    /// established by [`crate::nzb::parser::rar_part_number`]).
    pub fn assemble(volumes: &[RarVolumeInfo]) -> Vec<AssembledRarFile> {
        let mut out: Vec<AssembledRarFile> = Vec::new();

        let mut volume_idx = 0;
        while volume_idx < volumes.len() {
            let volume = &volumes[volume_idx];
            let Some(entry) = volume.info.files.first() else {
                volume_idx += 1;
                continue;
            };

            let mut spans = vec![AssembledSpan {
                volume_index: volume.volume_index,
                volume_offset: entry.data_offset,
                file_offset: 0,
                size: entry.compressed_size,
            }];
            let mut running_total = entry.compressed_size;
            let name = entry.name.clone();
            let is_encrypted = entry.is_encrypted;
            let method = entry.method;
            let mut continues = entry.continues_to_next;

            let mut next_idx = volume_idx + 1;
            while continues {
                let Some(next_volume) = volumes.get(next_idx) else {
                    break;
                };
                let Some(next_entry) = next_volume.info.files.first() else {
                    break;
                };
                if next_entry.name != name {
                    break;
                }
                spans.push(AssembledSpan {
                    volume_index: next_volume.volume_index,
                    volume_offset: next_entry.data_offset,
                    file_offset: running_total,
                    size: next_entry.compressed_size,
                });
                running_total += next_entry.compressed_size;
                continues = next_entry.continues_to_next;
                next_idx += 1;
            }

            out.push(AssembledRarFile {
                name,
                size: running_total,
                is_encrypted,
                method,
                spans,
            });

            volume_idx = next_idx;
        }

        out
    }

    /// Spans overlapping the inclusive logical range `[start, end]`, in
    /// ascending `fileOffset` order.
    pub fn find_spans_for_range(file: &AssembledRarFile, start: u64, end: u64) -> Vec<AssembledSpan> {
        file.spans
            .iter()
            .filter(|span| {
                let span_end = span.file_offset + span.size.saturating_sub(1);
                span.file_offset <= end && span_end >= start
            })
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rar::types::{RarArchiveInfo, RarFileEntry, RarFormat};

    fn volume(index: usize, name: &str, size: u64, continues: bool) -> RarVolumeInfo {
        RarVolumeInfo {
            volume_index: index,
            nzb_file_index: index,
            info: RarArchiveInfo {
                format: RarFormat::Rar5,
                is_multi_volume: true,
                is_encrypted: false,
                has_encrypted_headers: false,
                is_solid: false,
                files: vec![RarFileEntry {
                    name: name.to_string(),
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
    fn assembles_three_volumes_into_one_file_with_ascending_spans() {
        let volumes = vec![
            volume(0, "movie.mkv", 1_000_000, true),
            volume(1, "movie.mkv", 1_000_000, true),
            volume(2, "movie.mkv", 500_000, false),
        ];

        let assembled = MultiPartAssembler::assemble(&volumes);
        assert_eq!(assembled.len(), 1);
        let file = &assembled[0];
        assert_eq!(file.size, 2_500_000);
        assert_eq!(file.spans.len(), 3);
        assert_eq!(file.spans[0].file_offset, 0);
        assert_eq!(file.spans[1].file_offset, 1_000_000);
        assert_eq!(file.spans[2].file_offset, 2_000_000);
    }

    #[test]
    fn range_lookup_crosses_span_boundary() {
        let volumes = vec![
            volume(0, "movie.mkv", 1_000_000, true),
            volume(1, "movie.mkv", 1_000_000, false),
        ];
        let assembled = MultiPartAssembler::assemble(&volumes);
        let spans = MultiPartAssembler::find_spans_for_range(&assembled[0], 999_000, 1_001_999);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].volume_index, 0);
        assert_eq!(spans[1].volume_index, 1);
    }

    #[test]
    fn single_volume_file_has_one_span() {
        let volumes = vec![volume(0, "sample.mkv", 500, false)];
        let assembled = MultiPartAssembler::assemble(&volumes);
        assert_eq!(assembled.len(), 1);
        assert_eq!(assembled[0].spans.len(), 1);
    }
}
