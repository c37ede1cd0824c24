//! Best-effort audio format detection for uploaded files.
//!
//! Mobile and browser recorders routinely mislabel their output, so the
//! result here is advisory: the orchestrator logs it for diagnostics and
//! the conversion strategies do their own container probing regardless.

/// Bytes of the upload inspected for magic signatures.
const SNIFF_WINDOW: usize = 4096;

/// Infers the audio container format from content, filename, and declared
/// content type, in that order of confidence.
pub fn sniff_format(
    bytes: &[u8],
    filename: Option<&str>,
    content_type: Option<&str>,
) -> Option<String> {
    let window = &bytes[..bytes.len().min(SNIFF_WINDOW)];

    detect_signature(window)
        .map(ToOwned::to_owned)
        .or_else(|| filename.and_then(extension_of))
        .or_else(|| content_type.and_then(subtype_of))
}

/// Maps well-known magic bytes to an audio subtype.
fn detect_signature(window: &[u8]) -> Option<&'static str> {
    if window.len() >= 12 && &window[..4] == b"RIFF" && &window[8..12] == b"WAVE" {
        return Some("wav");
    }
    if window.starts_with(b"ID3") {
        return Some("mp3");
    }
    if window.len() >= 2 && window[0] == 0xFF && matches!(window[1], 0xFB | 0xF3 | 0xF2) {
        return Some("mp3");
    }
    if window.starts_with(b"OggS") {
        return Some("ogg");
    }
    if window.starts_with(b"fLaC") {
        return Some("flac");
    }
    if window.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        return Some("webm");
    }
    if window.starts_with(b"caff") {
        return Some("caf");
    }
    if window.len() >= 12 && &window[4..8] == b"ftyp" {
        // Audio-only MP4 family containers: treat all of them as m4a.
        return Some("m4a");
    }
    None
}

fn extension_of(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.trim().to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

/// Subtype of a declared MIME type, normalizing the common browser quirk
/// of labeling audio-only MP4/M4A uploads as `audio/mp4` or `video/mp4`.
fn subtype_of(content_type: &str) -> Option<String> {
    let subtype = content_type.rsplit_once('/')?.1.trim().to_ascii_lowercase();
    if subtype.is_empty() {
        return None;
    }
    if subtype == "mp4" {
        return Some("m4a".to_string());
    }
    Some(subtype)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_signature_wins_over_hints() {
        let mut bytes = b"RIFF____WAVEfmt ".to_vec();
        bytes.resize(64, 0);
        assert_eq!(
            sniff_format(&bytes, Some("clip.mp3"), Some("audio/mpeg")).as_deref(),
            Some("wav")
        );
    }

    #[test]
    fn ftyp_container_detected_as_m4a() {
        let bytes = b"\x00\x00\x00\x20ftypM4A \x00\x00\x00\x00".to_vec();
        assert_eq!(sniff_format(&bytes, None, None).as_deref(), Some("m4a"));
    }

    #[test]
    fn falls_back_to_extension() {
        assert_eq!(
            sniff_format(b"junk", Some("recording.WEBM"), None).as_deref(),
            Some("webm")
        );
    }

    #[test]
    fn declared_mp4_normalized_to_m4a() {
        assert_eq!(
            sniff_format(b"junk", None, Some("audio/mp4")).as_deref(),
            Some("m4a")
        );
    }

    #[test]
    fn inconclusive_input_yields_none() {
        assert_eq!(sniff_format(b"junk", Some("noext"), None), None);
        assert_eq!(sniff_format(&[], None, None), None);
    }
}
