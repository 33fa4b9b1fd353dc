//! yEnc codec (spec §4.1, §6.4).
//!
//! yEnc is an 8-bit binary-to-text encoding used to carry binary article
//! bodies over the (nominally 7-bit) NNTP text protocol: every byte is
//! shifted by a fixed offset, and the handful of byte values that would
//! collide with protocol control characters (`\0`, CR, LF, `.` at line
//! start, and the escape character itself) are escaped.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum YencError {
    #[error("no =ybegin line found in first 10 lines of article body")]
    MissingBegin,

    #[error("no =yend line found in last 5 lines of article body")]
    MissingEnd,

    #[error("malformed yEnc header line: {0}")]
    MalformedHeader(String),
}

const ESCAPE_BYTE: u8 = b'=';
const YENC_OFFSET: u8 = 42;
const ESCAPE_SHIFT: u8 = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YencHeader {
    pub line: u32,
    pub size: u64,
    pub part: Option<u32>,
    pub total: Option<u32>,
    pub name: String,
    pub begin: Option<u64>,
    pub end: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YencTrailer {
    pub size: u64,
    pub part: Option<u32>,
    pub crc32: Option<u32>,
    pub pcrc32: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct DecodedArticle {
    pub header: YencHeader,
    pub trailer: YencTrailer,
    pub data: Vec<u8>,
}

pub struct YencCodec;

impl YencCodec {
    /// Decodes a full article body per spec §4.1.
    ///
    /// `=ybegin` must appear within the first 10 lines, and `=yend` within
    /// the last 5, searching from either end rather than requiring the
    /// whole body be scanned linearly for both markers.
    pub fn decode(body: &[u8]) -> Result<DecodedArticle, YencError> {
        let lines: Vec<&[u8]> = split_lines(body);

        let begin_idx = lines
            .iter()
            .take(10)
            .position(|l| l.starts_with(b"=ybegin"))
            .ok_or(YencError::MissingBegin)?;

        let begin_line = std::str::from_utf8(lines[begin_idx])
            .map_err(|_| YencError::MalformedHeader("non-utf8 =ybegin line".into()))?;
        let mut header = parse_ybegin(begin_line)?;

        let mut data_start = begin_idx + 1;
        if header.part.is_some() {
            let part_line = lines
                .get(data_start)
                .ok_or_else(|| YencError::MalformedHeader("missing =ypart line".into()))?;
            let part_line = std::str::from_utf8(part_line)
                .map_err(|_| YencError::MalformedHeader("non-utf8 =ypart line".into()))?;
            if !part_line.starts_with("=ypart") {
                return Err(YencError::MalformedHeader(
                    "expected =ypart after multipart =ybegin".into(),
                ));
            }
            let (begin, end) = parse_ypart(part_line)?;
            header.begin = Some(begin);
            header.end = Some(end);
            data_start += 1;
        }

        let tail_window = lines.len().saturating_sub(5);
        let end_rel_idx = lines
            .iter()
            .skip(tail_window)
            .position(|l| l.starts_with(b"=yend"))
            .ok_or(YencError::MissingEnd)?;
        let end_idx = tail_window + end_rel_idx;

        let end_line = std::str::from_utf8(lines[end_idx])
            .map_err(|_| YencError::MalformedHeader("non-utf8 =yend line".into()))?;
        let trailer = parse_yend(end_line)?;

        let mut data = Vec::with_capacity(header.size as usize);
        for line in &lines[data_start..end_idx] {
            decode_line(line, &mut data);
        }

        Ok(DecodedArticle {
            header,
            trailer,
            data,
        })
    }

    /// Scans only the first 1 KiB of the body for a `=ybegin` header,
    /// for cheap diagnostics without decoding the full article.
    pub fn extract_header(body: &[u8]) -> Option<YencHeader> {
        let window = &body[..body.len().min(1024)];
        let lines = split_lines(window);
        let line = lines.iter().find(|l| l.starts_with(b"=ybegin"))?;
        let line = std::str::from_utf8(line).ok()?;
        parse_ybegin(line).ok()
    }
}

fn split_lines(body: &[u8]) -> Vec<&[u8]> {
    body.split(|&b| b == b'\n')
        .map(|l| l.strip_suffix(b"\r").unwrap_or(l))
        .filter(|l| !l.is_empty())
        .collect()
}

fn parse_ybegin(line: &str) -> Result<YencHeader, YencError> {
    if !line.starts_with("=ybegin") {
        return Err(YencError::MalformedHeader(line.to_string()));
    }

    let mut header = YencHeader {
        line: 128,
        size: 0,
        part: None,
        total: None,
        name: String::new(),
        begin: None,
        end: None,
    };

    // `name` runs to the end of the line and may contain spaces, so it
    // can't be parsed with the same whitespace-split loop as the rest of
    // the key=value pairs: once `name=` is seen, everything after it is
    // the filename.
    let rest = line.trim_start_matches("=ybegin").trim_start();
    let name_marker = " name=";
    if let Some(name_pos) = rest.find(name_marker) {
        let (kv_part, name_part) = rest.split_at(name_pos);
        header.name = name_part[name_marker.len()..].to_string();
        parse_kv_pairs(kv_part, &mut header);
    } else {
        parse_kv_pairs(rest, &mut header);
    }

    Ok(header)
}

fn parse_kv_pairs(segment: &str, header: &mut YencHeader) {
    for token in segment.split_whitespace() {
        if let Some((key, value)) = token.split_once('=') {
            match key {
                "line" => header.line = value.parse().unwrap_or(128),
                "size" => header.size = value.parse().unwrap_or(0),
                "part" => header.part = value.parse().ok(),
                "total" => header.total = value.parse().ok(),
                _ => {}
            }
        }
    }
}

fn parse_ypart(line: &str) -> Result<(u64, u64), YencError> {
    let mut begin = None;
    let mut end = None;
    for token in line.split_whitespace().skip(1) {
        if let Some((key, value)) = token.split_once('=') {
            match key {
                "begin" => begin = value.parse().ok(),
                "end" => end = value.parse().ok(),
                _ => {}
            }
        }
    }
    match (begin, end) {
        (Some(b), Some(e)) => Ok((b, e)),
        _ => Err(YencError::MalformedHeader(line.to_string())),
    }
}

fn parse_yend(line: &str) -> Result<YencTrailer, YencError> {
    let mut trailer = YencTrailer {
        size: 0,
        part: None,
        crc32: None,
        pcrc32: None,
    };

    for token in line.split_whitespace().skip(1) {
        if let Some((key, value)) = token.split_once('=') {
            match key {
                "size" => trailer.size = value.parse().unwrap_or(0),
                "part" => trailer.part = value.parse().ok(),
                "crc32" => trailer.crc32 = u32::from_str_radix(value, 16).ok(),
                "pcrc32" => trailer.pcrc32 = u32::from_str_radix(value, 16).ok(),
                _ => {}
            }
        }
    }

    Ok(trailer)
}

/// Decodes a single data line per spec §4.1 step 5: escape byte `=`
/// consumes the following byte and subtracts an extra 64 before the usual
/// 42-offset un-shift; everything else just un-shifts by 42 modulo 256.
fn decode_line(line: &[u8], out: &mut Vec<u8>) {
    let mut iter = line.iter().copied();
    while let Some(byte) = iter.next() {
        if byte == ESCAPE_BYTE {
            if let Some(next) = iter.next() {
                out.push(next.wrapping_sub(ESCAPE_SHIFT).wrapping_sub(YENC_OFFSET));
            }
        } else {
            out.push(byte.wrapping_sub(YENC_OFFSET));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        for &b in data {
            let shifted = b.wrapping_add(YENC_OFFSET);
            match shifted {
                0x00 | 0x0A | 0x0D | 0x3D => {
                    out.push(ESCAPE_BYTE);
                    out.push(shifted.wrapping_add(ESCAPE_SHIFT));
                }
                _ => out.push(shifted),
            }
        }
        out
    }

    #[test]
    fn round_trip_single_part() {
        let payload: Vec<u8> = (0..=255u8).collect();
        let encoded = encode(&payload);

        let mut body = Vec::new();
        body.extend_from_slice(
            format!("=ybegin line=128 size={} name=test.bin\r\n", payload.len()).as_bytes(),
        );
        body.extend_from_slice(&encoded);
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(format!("=yend size={}\r\n", payload.len()).as_bytes());

        let decoded = YencCodec::decode(&body).unwrap();
        assert_eq!(decoded.data, payload);
        assert_eq!(decoded.header.name, "test.bin");
        assert_eq!(decoded.trailer.size, payload.len() as u64);
    }

    #[test]
    fn multipart_header_has_begin_end() {
        let payload = b"hello world".to_vec();
        let encoded = encode(&payload);

        let mut body = Vec::new();
        body.extend_from_slice(
            b"=ybegin part=1 total=2 line=128 size=22 name=movie part file.mkv\r\n",
        );
        body.extend_from_slice(b"=ypart begin=1 end=11\r\n");
        body.extend_from_slice(&encoded);
        body.extend_from_slice(b"\r\n=yend size=11 part=1 pcrc32=deadbeef\r\n");

        let decoded = YencCodec::decode(&body).unwrap();
        assert_eq!(decoded.data, payload);
        assert_eq!(decoded.header.begin, Some(1));
        assert_eq!(decoded.header.end, Some(11));
        assert_eq!(decoded.header.name, "movie part file.mkv");
        assert_eq!(decoded.trailer.pcrc32, Some(0xdeadbeef));
    }

    #[test]
    fn missing_begin_is_malformed() {
        let body = b"just some text\r\n=yend size=0\r\n";
        assert!(matches!(YencCodec::decode(body), Err(YencError::MissingBegin)));
    }

    #[test]
    fn missing_end_is_malformed() {
        let body = b"=ybegin line=128 size=1 name=a\r\n*\r\n";
        assert!(matches!(YencCodec::decode(body), Err(YencError::MissingEnd)));
    }

    #[test]
    fn extract_header_only_scans_first_kib() {
        let mut body = vec![b'x'; 2048];
        body.extend_from_slice(b"\n=ybegin line=128 size=5 name=late.bin\n");
        assert!(YencCodec::extract_header(&body).is_none());

        let mut body2 = b"=ybegin line=128 size=5 name=early.bin\n".to_vec();
        body2.extend(vec![b'x'; 2048]);
        let header = YencCodec::extract_header(&body2).unwrap();
        assert_eq!(header.name, "early.bin");
    }
}
