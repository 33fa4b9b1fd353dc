use usenet_streamer::nzb::parser::{is_rar_name, NzbParser};
use usenet_streamer::nzb::types::{is_media_file, is_video_file};

const SIMPLE_NZB: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<nzb xmlns="http://www.newzbin.com/DTD/2003/nzb">
  <file poster="poster@example.com" date="1700000000" subject="Test Movie [01/02] - &quot;Test Movie.mp4&quot; yEnc (1/2)">
    <groups><group>alt.binaries.test</group></groups>
    <segments>
      <segment bytes="100000" number="1">msg1@server.com</segment>
      <segment bytes="50000" number="2">msg2@server.com</segment>
    </segments>
  </file>
  <file poster="poster@example.com" date="1700000001" subject="Test Movie [02/02] - &quot;Test Movie.part01.rar&quot; yEnc (1/1)">
    <groups><group>alt.binaries.test</group></groups>
    <segments>
      <segment bytes="200000" number="1">msg3@server.com</segment>
    </segments>
  </file>
</nzb>"#;

#[test]
fn parses_files_segments_and_sizes() {
    let parsed = NzbParser::parse(SIMPLE_NZB.as_bytes()).unwrap();

    assert_eq!(parsed.files.len(), 2);
    assert_eq!(parsed.total_size, 350_000);

    let movie = parsed.find_file("Test Movie.mp4").expect("mp4 file present");
    assert_eq!(movie.segments.len(), 2);
    assert_eq!(movie.size, 150_000);
    assert_eq!(movie.segments[0].number, 1);
    assert_eq!(movie.segments[1].number, 2);
    assert_eq!(movie.segments[0].message_id, "msg1@server.com");
    assert!(!movie.is_rar);

    let rar = parsed.find_file("Test Movie.part01.rar").expect("rar part present");
    assert!(rar.is_rar);
    assert_eq!(rar.size, 200_000);

    assert!(!parsed.media_file_indices.is_empty());
}

#[test]
fn classifies_video_and_rar_names() {
    assert!(is_video_file("movie.mp4"));
    assert!(is_video_file("MOVIE.MP4"));
    assert!(is_video_file("video.mkv"));
    assert!(is_video_file("film.avi"));
    assert!(!is_video_file("archive.rar"));
    assert!(!is_media_file("document.txt"));

    assert!(is_rar_name("archive.rar"));
    assert!(is_rar_name("archive.part01.rar"));
    assert!(is_rar_name("archive.r00"));
    assert!(!is_rar_name("video.mp4"));
}

#[test]
fn empty_nzb_is_rejected() {
    let empty = r#"<?xml version="1.0" encoding="utf-8" ?>
<nzb xmlns="http://www.newzbin.com/DTD/2003/nzb">
</nzb>"#;
    assert!(NzbParser::parse(empty.as_bytes()).is_err());
}

#[test]
fn invalid_xml_is_rejected() {
    assert!(NzbParser::parse(b"this is not xml").is_err());
}
