use crate::report::format::{FormatResolver, ReportFormat};
use flate2::read::GzDecoder;
use std::io::{Cursor, Read};

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Unsupported attachment format (mime type: {mime_type}, filename: {filename})")]
    UnsupportedAttachmentFormat { mime_type: String, filename: String },
    #[error("Decompression error: {0}")]
    DecompressionError(String),
    #[error("Zip archive contains no entries")]
    ArchiveEmpty,
    #[error("Zip archive has no .xml entry (entries: {})", .0.join(", "))]
    NoXmlEntry(Vec<String>),
}

pub struct Decoder;

impl Decoder {
    /// Resolve the container format of an attachment and decode it to XML text.
    pub fn decode_attachment(
        mime_type: Option<&str>,
        filename: Option<&str>,
        content: &[u8],
    ) -> Result<String, DecodeError> {
        match FormatResolver::resolve(mime_type, filename) {
            ReportFormat::Unsupported => Err(DecodeError::UnsupportedAttachmentFormat {
                mime_type: mime_type.unwrap_or("none").to_string(),
                filename: filename.unwrap_or("none").to_string(),
            }),
            format => Self::decode(content, format),
        }
    }

    /// Turn attachment bytes into XML text using the given strategy.
    pub fn decode(content: &[u8], format: ReportFormat) -> Result<String, DecodeError> {
        match format {
            ReportFormat::PlainXml => Ok(String::from_utf8_lossy(content).into_owned()),
            ReportFormat::Gzip => Self::gunzip(content),
            ReportFormat::Zip => Self::unzip_first_xml(content),
            ReportFormat::Unsupported => Err(DecodeError::UnsupportedAttachmentFormat {
                mime_type: "none".to_string(),
                filename: "none".to_string(),
            }),
        }
    }

    fn gunzip(content: &[u8]) -> Result<String, DecodeError> {
        let mut decoder = GzDecoder::new(content);
        let mut buf = Vec::new();
        decoder
            .read_to_end(&mut buf)
            .map_err(|e| DecodeError::DecompressionError(e.to_string()))?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn unzip_first_xml(content: &[u8]) -> Result<String, DecodeError> {
        let mut archive = zip::ZipArchive::new(Cursor::new(content))
            .map_err(|e| DecodeError::DecompressionError(e.to_string()))?;

        if archive.len() == 0 {
            return Err(DecodeError::ArchiveEmpty);
        }

        // Central directory order; the first .xml entry wins.
        let mut names = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let mut entry = archive
                .by_index(index)
                .map_err(|e| DecodeError::DecompressionError(e.to_string()))?;
            let name = entry.name().to_string();

            if name.to_lowercase().ends_with(".xml") {
                log::debug!("Selected zip entry {name}");
                let mut buf = Vec::new();
                entry
                    .read_to_end(&mut buf)
                    .map_err(|e| DecodeError::DecompressionError(e.to_string()))?;
                return Ok(String::from_utf8_lossy(&buf).into_owned());
            }
            names.push(name);
        }

        Err(DecodeError::NoXmlEntry(names))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use zip::write::FileOptions;

    pub(crate) fn gzip_bytes(data: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    pub(crate) fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(data.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_plain_passthrough() {
        let xml = "<feedback/>";
        assert_eq!(Decoder::decode(xml.as_bytes(), ReportFormat::PlainXml).unwrap(), xml);
    }

    #[test]
    fn test_gzip() {
        let bytes = gzip_bytes("<feedback>gz</feedback>");
        assert_eq!(
            Decoder::decode(&bytes, ReportFormat::Gzip).unwrap(),
            "<feedback>gz</feedback>"
        );
    }

    #[test]
    fn test_corrupt_gzip() {
        let result = Decoder::decode(b"definitely not gzip", ReportFormat::Gzip);
        assert!(matches!(result, Err(DecodeError::DecompressionError(_))));
    }

    #[test]
    fn test_zip_case_insensitive_entry() {
        let bytes = zip_bytes(&[("report.txt", "not xml"), ("REPORT.XML", "<feedback/>")]);
        assert_eq!(Decoder::decode(&bytes, ReportFormat::Zip).unwrap(), "<feedback/>");
    }

    #[test]
    fn test_zip_first_match_wins() {
        let bytes = zip_bytes(&[("a.xml", "<first/>"), ("b.xml", "<second/>")]);
        assert_eq!(Decoder::decode(&bytes, ReportFormat::Zip).unwrap(), "<first/>");
    }

    #[test]
    fn test_zip_without_xml() {
        let bytes = zip_bytes(&[("readme.txt", "hello")]);
        match Decoder::decode(&bytes, ReportFormat::Zip) {
            Err(DecodeError::NoXmlEntry(names)) => assert_eq!(names, vec!["readme.txt"]),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_attachment_names_both() {
        let err = Decoder::decode_attachment(Some("image/png"), Some("logo.png"), b"")
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("image/png"));
        assert!(message.contains("logo.png"));
    }

    #[test]
    fn test_empty_zip() {
        let bytes = zip_bytes(&[]);
        assert!(matches!(
            Decoder::decode(&bytes, ReportFormat::Zip),
            Err(DecodeError::ArchiveEmpty)
        ));
    }
}
