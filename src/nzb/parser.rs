//! NZB XML parsing (spec §4.5).

use std::io::Cursor;
use std::str;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::QName;
use quick_xml::Reader;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::nzb::error::NzbError;
use crate::nzb::types::{is_media_file, NzbFile, NzbSegment, ParsedNzb};

pub struct NzbParser;

impl NzbParser {
    /// Parses NZB XML bytes into a [`ParsedNzb`]. `hash` is the SHA-256 of
    /// the raw input, used as the NZB cache key (spec §4.8).
    pub fn parse(xml: &[u8]) -> Result<ParsedNzb, NzbError> {
        let hash = hex::encode(Sha256::digest(xml));

        let mut reader = Reader::from_reader(Cursor::new(xml));
        reader.config_mut().trim_text = true;

        let mut files = Vec::new();
        let mut current_file: Option<NzbFile> = None;
        let mut current_segment: Option<NzbSegment> = None;
        let mut current_groups: Vec<String> = Vec::new();
        let mut in_group = false;
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => match e.name() {
                    QName(b"file") => {
                        current_file = Some(parse_file_start(e, files.len())?);
                        current_groups.clear();
                    }
                    QName(b"group") => in_group = true,
                    QName(b"segment") => {
                        current_segment = Some(parse_segment_start(e)?);
                    }
                    _ => {}
                },
                Ok(Event::End(ref e)) => match e.name() {
                    QName(b"file") => {
                        if let Some(mut file) = current_file.take() {
                            file.groups = current_groups.clone();
                            file.sort_segments();
                            file.size = file.segments.iter().map(|s| s.bytes).sum();
                            files.push(file);
                        }
                    }
                    QName(b"segment") => {
                        if let (Some(segment), Some(file)) =
                            (current_segment.take(), current_file.as_mut())
                        {
                            file.segments.push(segment);
                        }
                    }
                    _ => {}
                },
                Ok(Event::Text(e)) => {
                    let text = e.unescape()?.trim().to_string();
                    if let Some(segment) = current_segment.as_mut() {
                        segment.message_id = text;
                    } else if in_group && !text.is_empty() {
                        current_groups.push(text);
                        in_group = false;
                    }
                }
                Ok(Event::Eof) => break,
                Err(err) => return Err(NzbError::Xml(err)),
                _ => {}
            }
            buf.clear();
        }

        if files.is_empty() {
            return Err(NzbError::Empty);
        }

        for file in &mut files {
            file.is_rar = is_rar_name(&file.name);
            file.rar_part_number = if file.is_rar {
                rar_part_number(&file.name)
            } else {
                None
            };
            for segment in &file.segments {
                if segment.message_id.is_empty() {
                    return Err(NzbError::Malformed(format!(
                        "empty message-id in file {}",
                        file.name
                    )));
                }
                if segment.bytes == 0 {
                    warn!(file = %file.name, "zero-byte segment in NZB");
                }
            }
        }

        // Sort files case-sensitively ascending by name, then re-index.
        files.sort_by(|a, b| a.name.cmp(&b.name));
        for (i, file) in files.iter_mut().enumerate() {
            file.index = i;
        }

        let total_size = files.iter().map(|f| f.size).sum();

        let mut groups: Vec<String> = files.iter().flat_map(|f| f.groups.clone()).collect();
        groups.sort();
        groups.dedup();

        let media_file_indices = media_file_order(&files);

        debug!(files = files.len(), hash = %hash, "parsed NZB");

        Ok(ParsedNzb {
            hash,
            files,
            media_file_indices,
            total_size,
            groups,
        })
    }
}

/// non-RAR media files first (already name-ordered), then RAR parts
/// ordered by `rar_part_number`.
fn media_file_order(files: &[NzbFile]) -> Vec<usize> {
    let mut non_rar: Vec<usize> = files
        .iter()
        .enumerate()
        .filter(|(_, f)| !f.is_rar && is_media_file(&f.name))
        .map(|(i, _)| i)
        .collect();

    let mut rar: Vec<usize> = files
        .iter()
        .enumerate()
        .filter(|(_, f)| f.is_rar)
        .map(|(i, _)| i)
        .collect();
    rar.sort_by_key(|&i| files[i].rar_part_number.unwrap_or(u32::MAX));

    non_rar.append(&mut rar);
    non_rar
}

fn parse_file_start(element: &BytesStart, index: usize) -> Result<NzbFile, NzbError> {
    let mut poster = String::new();
    let mut date = Utc::now();
    let mut subject = String::new();

    for attr in element.attributes() {
        let attr = attr.map_err(|e| NzbError::Malformed(e.to_string()))?;
        let key = str::from_utf8(attr.key.as_ref())?;
        let value = attr.unescape_value().map_err(|e| NzbError::Malformed(e.to_string()))?;
        match key {
            "poster" => poster = value.to_string(),
            "date" => date = parse_date(&value)?,
            "subject" => subject = value.to_string(),
            _ => {}
        }
    }

    let name = extract_filename_from_subject(&subject);

    Ok(NzbFile {
        index,
        name,
        poster,
        date,
        subject,
        groups: Vec::new(),
        segments: Vec::new(),
        size: 0,
        is_rar: false,
        rar_part_number: None,
    })
}

fn parse_segment_start(element: &BytesStart) -> Result<NzbSegment, NzbError> {
    let mut bytes = 0u64;
    let mut number = 0u32;

    for attr in element.attributes() {
        let attr = attr.map_err(|e| NzbError::Malformed(e.to_string()))?;
        let key = str::from_utf8(attr.key.as_ref())?;
        let value = attr.unescape_value().map_err(|e| NzbError::Malformed(e.to_string()))?;
        match key {
            "bytes" => {
                bytes = value
                    .parse()
                    .map_err(|_| NzbError::Malformed(format!("invalid segment bytes: {value}")))?;
            }
            "number" => {
                number = value
                    .parse()
                    .map_err(|_| NzbError::Malformed(format!("invalid segment number: {value}")))?;
            }
            _ => {}
        }
    }

    Ok(NzbSegment::new(String::new(), number, bytes))
}

fn parse_date(date_str: &str) -> Result<DateTime<Utc>, NzbError> {
    if let Ok(timestamp) = date_str.parse::<i64>() {
        return DateTime::from_timestamp(timestamp, 0)
            .ok_or_else(|| NzbError::InvalidDate(date_str.to_string()));
    }
    DateTime::parse_from_rfc3339(date_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| NzbError::InvalidDate(date_str.to_string()))
}

fn quoted_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""([^"]+)""#).unwrap())
}

fn yenc_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"yEnc\s*\(\d+/\d+\)\s*(.+?)(?:\s*\[|$)").unwrap())
}

fn extension_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^\s/\\]+\.[a-z0-9]{2,4}$").unwrap())
}

/// Filename extraction per spec §4.5: first quoted substring, then the
/// yEnc-part pattern, then the last whitespace-delimited token that looks
/// like a filename, then (as a last resort) the first 100 characters of
/// the subject verbatim.
fn extract_filename_from_subject(subject: &str) -> String {
    if let Some(caps) = quoted_regex().captures(subject) {
        return caps[1].to_string();
    }
    if let Some(caps) = yenc_regex().captures(subject) {
        return caps[1].trim().to_string();
    }
    if let Some(token) = subject
        .split_whitespace()
        .rev()
        .find(|t| extension_token_regex().is_match(t))
    {
        return token.to_string();
    }
    subject.chars().take(100).collect()
}

fn rar_signature_regexes() -> &'static [Regex; 4] {
    static RES: OnceLock<[Regex; 4]> = OnceLock::new();
    RES.get_or_init(|| {
        [
            Regex::new(r"(?i)\.rar$").unwrap(),
            Regex::new(r"(?i)\.r\d{2}$").unwrap(),
            Regex::new(r"(?i)\.part\d+\.rar$").unwrap(),
            Regex::new(r"\.\d{3}$").unwrap(),
        ]
    })
}

pub fn is_rar_name(name: &str) -> bool {
    rar_signature_regexes().iter().any(|re| re.is_match(name))
}

/// Derives the part number used to order RAR volumes (spec §3 invariants):
/// `.part<N>.rar -> N`; `.r<NN> -> NN+1`; `.<NNN> -> NNN`; bare `.rar -> 1`.
pub fn rar_part_number(name: &str) -> Option<u32> {
    static PART_RE: OnceLock<Regex> = OnceLock::new();
    static R_RE: OnceLock<Regex> = OnceLock::new();
    static NUMERIC_RE: OnceLock<Regex> = OnceLock::new();

    let part_re = PART_RE.get_or_init(|| Regex::new(r"(?i)\.part(\d+)\.rar$").unwrap());
    if let Some(caps) = part_re.captures(name) {
        return caps[1].parse().ok();
    }

    let r_re = R_RE.get_or_init(|| Regex::new(r"(?i)\.r(\d{2})$").unwrap());
    if let Some(caps) = r_re.captures(name) {
        let n: u32 = caps[1].parse().ok()?;
        return Some(n + 1);
    }

    let numeric_re = NUMERIC_RE.get_or_init(|| Regex::new(r"\.(\d{3})$").unwrap());
    if let Some(caps) = numeric_re.captures(name) {
        return caps[1].parse().ok();
    }

    if name.to_ascii_lowercase().ends_with(".rar") {
        return Some(1);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_nzb(subject: &str) -> Vec<u8> {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<nzb xmlns="http://www.newzbin.com/DTD/2003/nzb">
  <file poster="poster@example.com" date="1700000000" subject="{subject}">
    <groups><group>alt.binaries.test</group></groups>
    <segments>
      <segment bytes="1000" number="1">seg1@example.com</segment>
      <segment bytes="1000" number="2">seg2@example.com</segment>
    </segments>
  </file>
</nzb>"#
        )
        .into_bytes()
    }

    #[test]
    fn parses_single_file_nzb() {
        let xml = sample_nzb(r#""movie.mkv" yEnc (1/2)"#);
        let parsed = NzbParser::parse(&xml).unwrap();
        assert_eq!(parsed.files.len(), 1);
        assert_eq!(parsed.files[0].name, "movie.mkv");
        assert_eq!(parsed.files[0].size, 2000);
        assert_eq!(parsed.total_size, 2000);
        assert_eq!(parsed.groups, vec!["alt.binaries.test".to_string()]);
        assert_eq!(parsed.hash.len(), 64);
    }

    #[test]
    fn extracts_filename_without_quotes_via_yenc_pattern() {
        let name = extract_filename_from_subject("yEnc (1/20) Some.Show.S01E01.mkv [1/1]");
        assert_eq!(name, "Some.Show.S01E01.mkv");
    }

    #[test]
    fn classifies_rar_and_part_numbers() {
        assert!(is_rar_name("archive.rar"));
        assert!(is_rar_name("archive.r00"));
        assert!(is_rar_name("archive.part03.rar"));
        assert!(is_rar_name("archive.007"));
        assert!(!is_rar_name("movie.mkv"));

        assert_eq!(rar_part_number("archive.rar"), Some(1));
        assert_eq!(rar_part_number("archive.r00"), Some(1));
        assert_eq!(rar_part_number("archive.r01"), Some(2));
        assert_eq!(rar_part_number("archive.part03.rar"), Some(3));
        assert_eq!(rar_part_number("archive.007"), Some(7));
    }

    #[test]
    fn empty_nzb_is_rejected() {
        let xml = b"<?xml version=\"1.0\"?><nzb></nzb>";
        assert!(matches!(NzbParser::parse(xml), Err(NzbError::Empty)));
    }
}
