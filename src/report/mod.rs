//! DMARC aggregate report handling: container detection, decoding and
//! normalization into flat rows.

pub mod decoder;
pub mod format;
pub mod mapper;
pub mod types;
pub mod xml_tree;

pub use decoder::{DecodeError, Decoder};
pub use format::{FormatResolver, ReportFormat};
pub use mapper::{ReportError, ReportMapper};
pub use types::{
    Alignment, Disposition, EvaluationResult, NormalizedRecordRow, OverrideReason,
};

/// Any reason an attachment could not be read as a DMARC report.
#[derive(Debug, thiserror::Error)]
pub enum AttachmentError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Report(#[from] ReportError),
}

/// Resolve, decode and map one attachment.
pub fn extract_rows(
    mime_type: Option<&str>,
    filename: Option<&str>,
    content: &[u8],
) -> Result<Vec<NormalizedRecordRow>, AttachmentError> {
    let xml = Decoder::decode_attachment(mime_type, filename, content)?;
    Ok(ReportMapper::map_xml(&xml)?)
}

#[cfg(test)]
mod tests {
    use super::decoder::tests::{gzip_bytes, zip_bytes};
    use super::mapper::tests::{report, RECORD_A, RECORD_B};
    use super::*;

    #[test]
    fn test_containers_produce_identical_rows() {
        let xml = report(&format!("{RECORD_A}{RECORD_B}"));

        let plain = extract_rows(Some("text/xml"), Some("report.xml"), xml.as_bytes()).unwrap();
        let gzip = extract_rows(
            Some("application/gzip"),
            Some("report.xml.gz"),
            &gzip_bytes(&xml),
        )
        .unwrap();
        let zip = extract_rows(
            Some("application/zip"),
            Some("report.zip"),
            &zip_bytes(&[("report.xml", xml.as_str())]),
        )
        .unwrap();

        assert_eq!(plain.len(), 2);
        assert_eq!(plain, gzip);
        assert_eq!(plain, zip);
        assert_eq!(
            serde_json::to_vec(&plain).unwrap(),
            serde_json::to_vec(&zip).unwrap()
        );
    }

    #[test]
    fn test_structure_error_surfaces() {
        let xml = report(RECORD_A).replace("report_metadata", "metadata");
        let result = extract_rows(None, Some("report.xml"), xml.as_bytes());
        assert!(matches!(
            result,
            Err(AttachmentError::Report(ReportError::InvalidReportStructure(_)))
        ));
    }
}
