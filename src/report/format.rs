/// Container formats a DMARC aggregate report arrives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    PlainXml,
    Gzip,
    Zip,
    Unsupported,
}

// Declared MIME type -> file extension. Only gz, zip and xml select a decoder.
const MIME_EXTENSIONS: &[(&str, &str)] = &[
    ("application/gzip", "gz"),
    ("application/x-gzip", "gz"),
    ("application/x-gunzip", "gz"),
    ("application/gzip-compressed", "gz"),
    ("application/x-gzip-compressed", "gz"),
    ("application/zip", "zip"),
    ("application/x-zip", "zip"),
    ("application/x-zip-compressed", "zip"),
    ("application/zip-compressed", "zip"),
    ("application/xml", "xml"),
    ("text/xml", "xml"),
    ("application/octet-stream", "bin"),
    ("text/plain", "txt"),
];

pub struct FormatResolver;

impl FormatResolver {
    /// Pick a decode strategy from the declared MIME type, falling back to
    /// the filename suffix when the MIME type is absent or unhelpful.
    pub fn resolve(mime_type: Option<&str>, filename: Option<&str>) -> ReportFormat {
        if let Some(format) = mime_type
            .and_then(Self::extension_for_mime)
            .and_then(Self::format_for_extension)
        {
            return format;
        }

        let Some(name) = filename else {
            return ReportFormat::Unsupported;
        };
        let name = name.trim().to_lowercase();
        if name.ends_with(".xml") {
            ReportFormat::PlainXml
        } else if name.ends_with(".zip") {
            ReportFormat::Zip
        } else if name.ends_with(".gz") {
            ReportFormat::Gzip
        } else {
            ReportFormat::Unsupported
        }
    }

    /// Look up the extension implied by a MIME type, ignoring parameters.
    pub fn extension_for_mime(mime_type: &str) -> Option<&'static str> {
        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();

        MIME_EXTENSIONS
            .iter()
            .find(|(mime, _)| *mime == essence)
            .map(|(_, ext)| *ext)
    }

    fn format_for_extension(extension: &str) -> Option<ReportFormat> {
        match extension {
            "gz" => Some(ReportFormat::Gzip),
            "zip" => Some(ReportFormat::Zip),
            "xml" => Some(ReportFormat::PlainXml),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_type_wins() {
        assert_eq!(
            FormatResolver::resolve(Some("application/gzip"), Some("report.zip")),
            ReportFormat::Gzip
        );
        assert_eq!(
            FormatResolver::resolve(Some("application/zip; name=\"r.zip\""), None),
            ReportFormat::Zip
        );
        assert_eq!(
            FormatResolver::resolve(Some("TEXT/XML"), None),
            ReportFormat::PlainXml
        );
    }

    #[test]
    fn test_filename_fallback() {
        assert_eq!(
            FormatResolver::resolve(Some("application/octet-stream"), Some("google.com!example.com!1.xml.GZ")),
            ReportFormat::Gzip
        );
        assert_eq!(
            FormatResolver::resolve(None, Some("Report.ZIP")),
            ReportFormat::Zip
        );
        assert_eq!(
            FormatResolver::resolve(Some("application/x-unknown"), Some("report.xml")),
            ReportFormat::PlainXml
        );
    }

    #[test]
    fn test_unsupported() {
        assert_eq!(
            FormatResolver::resolve(Some("image/png"), Some("logo.png")),
            ReportFormat::Unsupported
        );
        assert_eq!(FormatResolver::resolve(None, None), ReportFormat::Unsupported);
    }
}
