pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Sniffs MIME types from leading file bytes.
pub struct ContentTypeDetector;

impl ContentTypeDetector {
    pub fn detect(data: &[u8]) -> String {
        match infer::get(data) {
            Some(kind) => kind.mime_type().to_string(),
            None if !data.is_empty() && looks_like_utf8(data) => "text/plain".to_string(),
            None => DEFAULT_CONTENT_TYPE.to_string(),
        }
    }
}

/// Valid UTF-8, allowing a multibyte character cut off at the end of the sample.
fn looks_like_utf8(data: &[u8]) -> bool {
    match std::str::from_utf8(data) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none() && e.valid_up_to() > 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_png_signature() {
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];
        assert_eq!(ContentTypeDetector::detect(&png), "image/png");
    }

    #[test]
    fn falls_back_for_binary_and_text() {
        assert_eq!(ContentTypeDetector::detect(&[0xff, 0x00, 0xfe]), DEFAULT_CONTENT_TYPE);
        assert_eq!(ContentTypeDetector::detect(b"hello"), "text/plain");
        assert_eq!(ContentTypeDetector::detect(b""), DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn text_cut_inside_a_character_is_still_text() {
        let text = "déjà vu".as_bytes();
        // ends on the first byte of the two-byte "à"
        assert_eq!(ContentTypeDetector::detect(&text[..5]), "text/plain");
        assert_eq!(ContentTypeDetector::detect(&[0xc3]), DEFAULT_CONTENT_TYPE);
        assert_eq!(ContentTypeDetector::detect(&[b'a', 0xff, b'b']), DEFAULT_CONTENT_TYPE);
    }
}
