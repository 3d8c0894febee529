/// Image formats recognised for cover artifacts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CoverFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
    Bmp,
    Svg,
    /// Anything else; stored as opaque bytes.
    #[default]
    Unknown,
}

const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];
const GIF_MAGIC: [u8; 4] = *b"GIF8";
const RIFF_MAGIC: [u8; 4] = *b"RIFF";
const WEBP_MAGIC: [u8; 4] = *b"WEBP";
const BMP_MAGIC: [u8; 2] = *b"BM";

impl CoverFormat {
    /// Detect the image format from its leading bytes.
    #[must_use]
    pub fn from_magic_bytes(bytes: &[u8]) -> Self {
        if bytes.starts_with(&PNG_MAGIC) {
            return Self::Png;
        }
        if bytes.starts_with(&JPEG_MAGIC) {
            return Self::Jpeg;
        }
        if bytes.starts_with(&GIF_MAGIC) {
            return Self::Gif;
        }
        // RIFF container: "RIFF" <u32 size> "WEBP"
        if bytes.starts_with(&RIFF_MAGIC) && bytes.get(8..12) == Some(&WEBP_MAGIC[..]) {
            return Self::Webp;
        }
        if bytes.starts_with(&BMP_MAGIC) {
            return Self::Bmp;
        }
        // SVG is text; look for the root element near the start of the document.
        let head = &bytes[..bytes.len().min(256)];
        if String::from_utf8_lossy(head).contains("<svg") {
            return Self::Svg;
        }
        Self::Unknown
    }

    /// Extension written after the `cover_` prefix.
    #[inline]
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Gif => "gif",
            Self::Webp => "webp",
            Self::Bmp => "bmp",
            Self::Svg => "svg",
            Self::Unknown => "bin",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(b"\x89PNG\r\n\x1a\n\0\0", CoverFormat::Png)]
    #[case(b"\xff\xd8\xff\xe0", CoverFormat::Jpeg)]
    #[case(b"GIF89a", CoverFormat::Gif)]
    #[case(b"RIFF\x10\0\0\0WEBPVP8 ", CoverFormat::Webp)]
    #[case(b"RIFF\x10\0\0\0WAVEfmt ", CoverFormat::Unknown)]
    #[case(b"BM\0\0", CoverFormat::Bmp)]
    #[case(b"<?xml version=\"1.0\"?><svg xmlns=\"\">", CoverFormat::Svg)]
    #[case(b"", CoverFormat::Unknown)]
    fn test_from_magic_bytes(#[case] bytes: &[u8], #[case] expected: CoverFormat) {
        assert_eq!(CoverFormat::from_magic_bytes(bytes), expected);
    }
}
