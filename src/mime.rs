//! Media MIME table (spec §6.5).

/// Maps a file extension (case-insensitive, no leading dot) to the
/// content-type the HTTP streaming layer should advertise.
pub fn mime_for_extension(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "mkv" => "video/x-matroska",
        "mp4" => "video/mp4",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "wmv" => "video/x-ms-wmv",
        "flv" => "video/x-flv",
        "webm" => "video/webm",
        "m4v" => "video/x-m4v",
        "mpg" | "mpeg" => "video/mpeg",
        "ts" | "m2ts" => "video/mp2t",
        "vob" => "video/dvd",
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "aac" => "audio/aac",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "m4a" => "audio/x-m4a",
        "wma" => "audio/x-ms-wma",
        _ => "application/octet-stream",
    }
}

/// Convenience wrapper over [`mime_for_extension`] that pulls the extension
/// off a filename/path.
pub fn mime_for_filename(name: &str) -> &'static str {
    match name.rsplit_once('.') {
        Some((_, ext)) => mime_for_extension(ext),
        None => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_extensions() {
        assert_eq!(mime_for_filename("movie.mkv"), "video/x-matroska");
        assert_eq!(mime_for_filename("movie.MP4"), "video/mp4");
        assert_eq!(mime_for_filename("song.flac"), "audio/flac");
    }

    #[test]
    fn unknown_extension_defaults_to_octet_stream() {
        assert_eq!(mime_for_filename("archive.rar"), "application/octet-stream");
        assert_eq!(mime_for_filename("noext"), "application/octet-stream");
    }
}
