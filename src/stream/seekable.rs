//! Readable byte stream with HTTP-Range semantics over a single NZB file
//! (spec §4.6).

use std::sync::Arc;

use bytes::Bytes;
use futures::Stream;
use tracing::warn;

use crate::nntp::manager::NntpClientManager;
use crate::nzb::interpolator::SegmentInterpolator;
use crate::nzb::types::NzbFile;
use crate::prefetch::PrefetchBuffer;
use crate::stream::error::StreamError;
use crate::yenc::YencCodec;

pub struct NzbSeekableStream {
    file_name: String,
    interpolator: Arc<tokio::sync::Mutex<SegmentInterpolator>>,
    prefetch: Arc<PrefetchBuffer>,
    pub total_size: u64,
    pub start_byte: u64,
    pub end_byte: u64,
}

impl NzbSeekableStream {
    /// `range` is an inclusive `[start, end]` in the file's logical byte
    /// space; `None` serves the whole file.
    pub fn new(
        file: &NzbFile,
        client_manager: Arc<NntpClientManager>,
        range: Option<(u64, i64)>,
        prefetch_count: Option<usize>,
    ) -> Result<Self, StreamError> {
        let interpolator = SegmentInterpolator::new(&file.segments);
        let total_size = interpolator.total_size();

        let (start_byte, end_byte) = match range {
            Some((start, end)) => {
                let end_byte = if end < 0 {
                    total_size.saturating_sub(1)
                } else {
                    (end as u64).min(total_size.saturating_sub(1))
                };
                (start, end_byte)
            }
            None => (0, total_size.saturating_sub(1)),
        };

        let interpolator = Arc::new(tokio::sync::Mutex::new(interpolator));
        {
            let guard = interpolator
                .try_lock()
                .expect("interpolator is freshly created and uncontended");
            if guard.find_segment_for_offset(start_byte as i64).is_none() {
                return Err(StreamError::InvalidRange);
            }
        }

        let segments = file.segments.clone();
        let file_name = file.name.clone();
        let fetch_file_name = file_name.clone();
        let fetch_interpolator = Arc::clone(&interpolator);
        let fetch = move |index: usize| {
            let client_manager = Arc::clone(&client_manager);
            let segments = segments.clone();
            let interpolator = Arc::clone(&fetch_interpolator);
            let file_name = fetch_file_name.clone();
            Box::pin(async move {
                let segment = segments.get(index).ok_or(StreamError::InvalidRange)?;
                let raw = client_manager.get_article(&segment.message_id).await.map_err(|e| {
                    StreamError::ArticleMissing {
                        file: file_name.clone(),
                        segment_index: index,
                        source: e,
                    }
                })?;
                let decoded = YencCodec::decode(&raw).map_err(|e| StreamError::MalformedYenc {
                    file: file_name.clone(),
                    segment_index: index,
                    source: e,
                })?;
                interpolator
                    .lock()
                    .await
                    .update_decoded_size(index, decoded.data.len() as u64);
                Ok(Bytes::from(decoded.data))
            }) as std::pin::Pin<Box<dyn std::future::Future<Output = Result<Bytes, StreamError>> + Send>>
        };

        let prefetch = Arc::new(PrefetchBuffer::with_limits(
            Arc::new(fetch),
            prefetch_count.unwrap_or(5),
            20,
        ));

        Ok(Self {
            file_name,
            interpolator,
            prefetch,
            total_size,
            start_byte,
            end_byte,
        })
    }

    pub fn content_length(&self) -> u64 {
        self.end_byte.saturating_sub(self.start_byte) + 1
    }

    /// Yields decoded chunks covering `[start_byte, end_byte]` in order.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, StreamError>> {
        async_stream::try_stream! {
            let mut current_pos = self.start_byte;

            while current_pos <= self.end_byte {
                let location = {
                    let interpolator = self.interpolator.lock().await;
                    interpolator
                        .find_segment_for_offset(current_pos as i64)
                        .ok_or(StreamError::InvalidRange)?
                };

                let segment_bytes = self.prefetch.get_segment(location.segment_index).await?;

                let remaining_in_segment =
                    (segment_bytes.len() as u64).saturating_sub(location.offset_in_segment);
                let to_read = remaining_in_segment.min(self.end_byte - current_pos + 1);

                if to_read == 0 {
                    warn!(
                        file = %self.file_name,
                        segment = location.segment_index,
                        "empty read at offset {current_pos}, advancing"
                    );
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nntp::config::NntpServerConfig;
    use crate::nzb::types::NzbSegment;
    use chrono::Utc;

    fn sample_file() -> NzbFile {
        NzbFile {
            index: 0,
            name: "movie.mkv".into(),
            poster: "poster@example.com".into(),
            date: Utc::now(),
            subject: "movie.mkv".into(),
            groups: vec!["alt.bin".into()],
            segments: vec![
                NzbSegment::new("a@x".into(), 1, 100),
                NzbSegment::new("b@x".into(), 2, 100),
            ],
            size: 200,
            is_rar: false,
            rar_part_number: None,
        }
    }

    #[test]
    fn rejects_out_of_range_start() {
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
        let result = NzbSeekableStream::new(&sample_file(), manager, Some((9999, -1)), None);
        assert!(matches!(result, Err(StreamError::InvalidRange)));
    }
}
