//! RAR4/RAR5 header parsing (spec §4.7).
//!
//! Parses an already-downloaded-and-decoded buffer (the head of one NZB
//! file's byte stream), extracting every field needed to drive
//! [`super::assembler`].

use super::error::RarError;
use super::types::{RarArchiveInfo, RarFileEntry, RarFormat};

const RAR4_SIGNATURE: [u8; 7] = [0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, 0x00];
const RAR5_SIGNATURE: [u8; 8] = [0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, 0x01, 0x00];

const RAR4_MAIN_HEAD: u8 = 0x73;
const RAR4_FILE_HEAD: u8 = 0x74;
const RAR4_ENDARC_HEAD: u8 = 0x7B;

const RAR4_MHD_VOLUME: u16 = 0x0001;
const RAR4_MHD_SOLID: u16 = 0x0008;
const RAR4_MHD_PASSWORD: u16 = 0x0080;

const RAR4_LHD_SPLIT_AFTER: u16 = 0x0002;
const RAR4_LHD_PASSWORD: u16 = 0x0004;
const RAR4_LHD_LARGE: u16 = 0x0100;
const RAR4_LONG_BLOCK: u16 = 0x8000;

const RAR5_MAIN: u64 = 1;
const RAR5_FILE: u64 = 2;
const RAR5_ENCRYPTION: u64 = 4;
const RAR5_END: u64 = 5;

const RAR5_FLAG_EXTRA_AREA: u64 = 0x01;
const RAR5_FLAG_DATA_AREA: u64 = 0x02;

const RAR5_FILE_FLAG_UNIX_TIME: u64 = 0x0002;
const RAR5_FILE_FLAG_CRC32: u64 = 0x0004;

pub struct RarHeaderParser;

impl RarHeaderParser {
    pub fn parse(buf: &[u8]) -> Result<RarArchiveInfo, RarError> {
        if buf.starts_with(&RAR5_SIGNATURE) {
            parse_rar5(&buf[RAR5_SIGNATURE.len()..], RAR5_SIGNATURE.len() as u64)
        } else if buf.starts_with(&RAR4_SIGNATURE) {
            parse_rar4(&buf[RAR4_SIGNATURE.len()..], RAR4_SIGNATURE.len() as u64)
        } else {
            Err(RarError::UnknownSignature)
        }
    }
}

fn need(buf: &[u8], pos: usize, len: usize) -> Result<(), RarError> {
    if pos + len > buf.len() {
        Err(RarError::TruncatedHeader(pos as u64))
    } else {
        Ok(())
    }
}

fn read_u8(buf: &[u8], pos: &mut usize) -> Result<u8, RarError> {
    need(buf, *pos, 1)?;
    let v = buf[*pos];
    *pos += 1;
    Ok(v)
}

fn read_u16_le(buf: &[u8], pos: &mut usize) -> Result<u16, RarError> {
    need(buf, *pos, 2)?;
    let v = u16::from_le_bytes([buf[*pos], buf[*pos + 1]]);
    *pos += 2;
    Ok(v)
}

fn read_u32_le(buf: &[u8], pos: &mut usize) -> Result<u32, RarError> {
    need(buf, *pos, 4)?;
    let v = u32::from_le_bytes([buf[*pos], buf[*pos + 1], buf[*pos + 2], buf[*pos + 3]]);
    *pos += 4;
    Ok(v)
}

fn read_bytes<'a>(buf: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8], RarError> {
    need(buf, *pos, len)?;
    let slice = &buf[*pos..*pos + len];
    *pos += len;
    Ok(slice)
}

/// Little-endian base-128 varint: 7 data bits per byte, high bit set means
/// "more bytes follow".
fn read_vint(buf: &[u8], pos: &mut usize) -> Result<u64, RarError> {
    let mut result: u64 = 0;
    let mut shift = 0;
    loop {
        let byte = read_u8(buf, pos)?;
        result |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
        if shift >= 64 {
            return Err(RarError::InvalidVint);
        }
    }
}

fn parse_rar4(buf: &[u8], sig_len: u64) -> Result<RarArchiveInfo, RarError> {
    let mut pos = 0usize;
    let mut is_multi_volume = false;
    let mut has_encrypted_headers = false;
    let mut is_solid = false;
    let mut files = Vec::new();
    let mut header_end_offset = sig_len;

    while pos < buf.len() {
        let block_start = pos;
        let _crc = read_u16_le(buf, &mut pos)?;
        let block_type = read_u8(buf, &mut pos)?;
        let flags = read_u16_le(buf, &mut pos)?;
        let size = read_u16_le(buf, &mut pos)? as usize;
        let add_size = if flags & RAR4_LONG_BLOCK != 0 {
            Some(read_u32_le(buf, &mut pos)? as u64)
        } else {
            None
        };
        let header_bytes_so_far = pos - block_start;
        let body_len = size.saturating_sub(header_bytes_so_far);

        match block_type {
            RAR4_MAIN_HEAD => {
                is_multi_volume = flags & RAR4_MHD_VOLUME != 0;
                is_solid = flags & RAR4_MHD_SOLID != 0;
                has_encrypted_headers = flags & RAR4_MHD_PASSWORD != 0;
                pos = block_start + size;
                header_end_offset = (sig_len as usize + pos) as u64;
            }
            RAR4_FILE_HEAD => {
                let file_body_start = pos;
                let compressed_size = read_u32_le(buf, &mut pos)? as u64;
                let uncompressed_size = read_u32_le(buf, &mut pos)? as u64;
                let crc32 = read_u32_le(buf, &mut pos)?;
                let mtime = read_u32_le(buf, &mut pos)?;
                let method = read_u8(buf, &mut pos)?;
                let name_size = read_u16_le(buf, &mut pos)? as usize;
                let attributes = read_u32_le(buf, &mut pos)? as u64;

                let (high_pack, high_unpack) = if flags & RAR4_LHD_LARGE != 0 {
                    let hp = read_u32_le(buf, &mut pos)? as u64;
                    let hu = read_u32_le(buf, &mut pos)? as u64;
                    (hp, hu)
                } else {
                    (0, 0)
                };

                let name_bytes = read_bytes(buf, &mut pos, name_size)?;
                let name = String::from_utf8_lossy(name_bytes).into_owned();

                let _ = file_body_start;
                let compressed_size = compressed_size | (high_pack << 32);
                let uncompressed_size = uncompressed_size | (high_unpack << 32);
                let data_offset = sig_len + pos as u64;

                files.push(RarFileEntry {
                    name,
                    size: uncompressed_size,
                    compressed_size,
                    data_offset,
                    method,
                    is_encrypted: flags & RAR4_LHD_PASSWORD != 0,
                    crc32: Some(crc32),
                    attributes: Some(attributes),
                    mtime: Some(mtime),
                    continues_to_next: flags & RAR4_LHD_SPLIT_AFTER != 0,
                });

                header_end_offset = data_offset;
                pos += add_size.unwrap_or(compressed_size) as usize;
                break;
            }
            RAR4_ENDARC_HEAD => break,
            _ => {
                pos = block_start + size;
            }
        }

        if body_len == 0 && block_type != RAR4_MAIN_HEAD {
            pos = block_start + size;
        }
    }

    Ok(RarArchiveInfo {
        format: RarFormat::Rar4,
        is_multi_volume,
        is_encrypted: files.iter().any(|f| f.is_encrypted),
        has_encrypted_headers,
        is_solid,
        files,
        header_end_offset,
    })
}

fn parse_rar5(buf: &[u8], sig_len: u64) -> Result<RarArchiveInfo, RarError> {
    let mut pos = 0usize;
    let mut is_multi_volume = false;
    let mut has_encrypted_headers = false;
    let is_solid = false;
    let mut files = Vec::new();
    let mut header_end_offset = sig_len;

    while pos < buf.len() {
        let _header_crc = read_u32_le(buf, &mut pos)?;
        let header_size_start = pos;
        let header_size = read_vint(buf, &mut pos)?;
        let body_start = pos;
        let header_type = read_vint(buf, &mut pos)?;
        let header_flags = read_vint(buf, &mut pos)?;

        let extra_size = if header_flags & RAR5_FLAG_EXTRA_AREA != 0 {
            read_vint(buf, &mut pos)?
        } else {
            0
        };
        let data_size = if header_flags & RAR5_FLAG_DATA_AREA != 0 {
            read_vint(buf, &mut pos)?
        } else {
            0
        };

        match header_type {
            RAR5_MAIN => {
                let archive_flags = read_vint(buf, &mut pos)?;
                is_multi_volume = archive_flags & 0x01 != 0;
            }
            RAR5_FILE => {
                let file_flags = read_vint(buf, &mut pos)?;
                let unpacked_size = read_vint(buf, &mut pos)?;
                let attributes = read_vint(buf, &mut pos)?;
                let mtime = if file_flags & RAR5_FILE_FLAG_UNIX_TIME != 0 {
                    Some(read_u32_le(buf, &mut pos)?)
                } else {
                    None
                };
                let crc32 = if file_flags & RAR5_FILE_FLAG_CRC32 != 0 {
                    Some(read_u32_le(buf, &mut pos)?)
                } else {
                    None
                };
                let compression_info = read_vint(buf, &mut pos)?;
                let _host_os = read_vint(buf, &mut pos)?;
                let name_length = read_vint(buf, &mut pos)? as usize;
                let name_bytes = read_bytes(buf, &mut pos, name_length)?;
                let name = String::from_utf8_lossy(name_bytes).into_owned();
                let method = (compression_info & 0x3F) as u8;

                let header_end = body_start + header_size as usize;
                let data_offset = sig_len + header_end as u64;

                files.push(RarFileEntry {
                    name,
                    size: unpacked_size,
                    compressed_size: data_size,
                    data_offset,
                    method,
                    is_encrypted: false,
                    crc32,
                    attributes: Some(attributes),
                    mtime,
                    continues_to_next: false,
                });

                header_end_offset = data_offset;
                pos = header_end + data_size as usize;
                continue;
            }
            RAR5_ENCRYPTION => {
                has_encrypted_headers = true;
            }
            RAR5_END => break,
            _ => {}
        }

        let _ = extra_size;
        pos = header_size_start + read_back_header_size(buf, header_size_start)? as usize + data_size as usize;
    }

    Ok(RarArchiveInfo {
        format: RarFormat::Rar5,
        is_multi_volume,
        is_encrypted: false,
        has_encrypted_headers,
        is_solid,
        files,
        header_end_offset,
    })
}

/// Re-reads the vint at `pos` purely to learn how many bytes it and the
/// following header body occupy, so the cursor can skip non-FILE headers
/// without re-deriving every field.
fn read_back_header_size(buf: &[u8], pos: usize) -> Result<u64, RarError> {
    let mut cursor = pos;
    let size = read_vint(buf, &mut cursor)?;
    Ok((cursor - pos) as u64 + size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rar4_block(block_type: u8, flags: u16, body: &[u8]) -> Vec<u8> {
        let size = 7 + body.len();
        let mut out = Vec::new();
        out.extend_from_slice(&0u16.to_le_bytes());
        out.push(block_type);
        out.extend_from_slice(&flags.to_le_bytes());
        out.extend_from_slice(&(size as u16).to_le_bytes());
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn parses_rar4_single_stored_file() {
        let mut buf = RAR4_SIGNATURE.to_vec();
        buf.extend(rar4_block(RAR4_MAIN_HEAD, 0, &[]));

        let name = b"movie.mkv";
        let mut file_body = Vec::new();
        file_body.extend_from_slice(&100u32.to_le_bytes()); // compressed
        file_body.extend_from_slice(&100u32.to_le_bytes()); // uncompressed
        file_body.extend_from_slice(&0u32.to_le_bytes()); // crc
        file_body.extend_from_slice(&0u32.to_le_bytes()); // mtime
        file_body.push(0); // method = store
        file_body.extend_from_slice(&(name.len() as u16).to_le_bytes());
        file_body.extend_from_slice(&0u32.to_le_bytes()); // attributes
        file_body.extend_from_slice(name);
        buf.extend(rar4_block(RAR4_FILE_HEAD, 0, &file_body));
        buf.extend(vec![0u8; 100]); // file data

        let info = RarHeaderParser::parse(&buf).unwrap();
        assert_eq!(info.format, RarFormat::Rar4);
        assert_eq!(info.files.len(), 1);
        assert_eq!(info.files[0].name, "movie.mkv");
        assert_eq!(info.files[0].method, 0);
        assert!(info.can_stream());
    }

    #[test]
    fn unknown_signature_is_rejected() {
        assert!(matches!(
            RarHeaderParser::parse(b"not a rar file"),
            Err(RarError::UnknownSignature)
        ));
    }

    #[test]
    fn vint_round_trips_multi_byte_values() {
        let mut buf = Vec::new();
        buf.push(0xE5); // 0x65 | continuation
        buf.push(0x8E);
        buf.push(0x26);
        let mut pos = 0;
        let value = read_vint(&buf, &mut pos).unwrap();
        assert_eq!(value, 624485);
        assert_eq!(pos, 3);
    }
}
