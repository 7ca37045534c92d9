use crate::report::types::{
    Alignment, Disposition, EvaluationResult, FromToken, NormalizedRecordRow, OverrideReason,
};
use crate::report::xml_tree::XmlNode;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("XML parse error: {0}")]
    XmlParse(String),
    #[error("Invalid report structure: missing {0}")]
    InvalidReportStructure(&'static str),
}

/// Best-effort integer parsing; never fails, falls back to `default`.
pub fn parse_int(raw: Option<&str>, default: i64) -> i64 {
    let Some(raw) = raw.map(str::trim) else {
        return default;
    };
    raw.parse::<i64>()
        .ok()
        .or_else(|| {
            raw.parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(|f| f as i64)
        })
        .unwrap_or(default)
}

/// Report-level fields shared by every row of one report.
struct ReportContext<'a> {
    report_id: String,
    org_name: &'a str,
    begin: i64,
    end: i64,
    error: Option<String>,
    domain: &'a str,
    adkim: Alignment,
    aspf: Alignment,
    p: Disposition,
    sp: Disposition,
    pct: i64,
}

pub struct ReportMapper;

impl ReportMapper {
    /// Parse DMARC aggregate report XML into normalized rows.
    pub fn map_xml(xml: &str) -> Result<Vec<NormalizedRecordRow>, ReportError> {
        let document = XmlNode::parse(xml).map_err(ReportError::XmlParse)?;
        Self::map_document(&document)
    }

    pub fn map_document(document: &XmlNode) -> Result<Vec<NormalizedRecordRow>, ReportError> {
        let feedback = document
            .child("feedback")
            .ok_or(ReportError::InvalidReportStructure("feedback"))?;
        let metadata = feedback
            .child("report_metadata")
            .ok_or(ReportError::InvalidReportStructure("report_metadata"))?;
        let policy = feedback
            .child("policy_published")
            .ok_or(ReportError::InvalidReportStructure("policy_published"))?;
        if feedback.child("record").is_none() {
            return Err(ReportError::InvalidReportStructure("record"));
        }

        let context = Self::report_context(metadata, policy);

        let mut rows = Vec::new();
        for (index, record) in feedback.children_named("record").enumerate() {
            match Self::map_record(&context, record) {
                Ok(row) => rows.push(row),
                Err(missing) => {
                    log::warn!(
                        "Skipping record {index} of report {}: missing {missing}",
                        context.report_id
                    );
                }
            }
        }

        log::debug!(
            "Mapped report {} from {}: {} rows",
            context.report_id,
            context.org_name,
            rows.len()
        );
        Ok(rows)
    }

    fn report_context<'a>(metadata: &'a XmlNode, policy: &'a XmlNode) -> ReportContext<'a> {
        let errors: Vec<&str> = metadata
            .children_named("error")
            .map(|e| e.text.trim())
            .filter(|t| !t.is_empty())
            .collect();
        let error = if errors.is_empty() {
            None
        } else {
            serde_json::to_string(&errors).ok()
        };

        ReportContext {
            report_id: metadata
                .text_at(&["report_id"])
                .unwrap_or_default()
                .replace('-', "_"),
            org_name: metadata.text_at(&["org_name"]).unwrap_or_default(),
            begin: parse_int(metadata.text_at(&["date_range", "begin"]), 0),
            end: parse_int(metadata.text_at(&["date_range", "end"]), 0),
            error,
            domain: policy.text_at(&["domain"]).unwrap_or_default(),
            adkim: Alignment::from_token(policy.text_at(&["adkim"])),
            aspf: Alignment::from_token(policy.text_at(&["aspf"])),
            p: Disposition::from_token(policy.text_at(&["p"])),
            sp: Disposition::from_token(policy.text_at(&["sp"])),
            pct: parse_int(policy.text_at(&["pct"]), 100),
        }
    }

    fn map_record(
        context: &ReportContext<'_>,
        record: &XmlNode,
    ) -> Result<NormalizedRecordRow, &'static str> {
        let row = record.child("row").ok_or("row")?;
        let identifiers = record.child("identifiers").ok_or("identifiers")?;
        let evaluated = row.child("policy_evaluated").ok_or("row.policy_evaluated")?;

        Ok(NormalizedRecordRow {
            report_id: context.report_id.clone(),
            org_name: context.org_name.to_string(),
            date_range_begin: context.begin,
            date_range_end: context.end,
            error: context.error.clone(),
            domain: context.domain.to_string(),
            adkim: context.adkim,
            aspf: context.aspf,
            p: context.p,
            sp: context.sp,
            pct: context.pct,
            source_ip: row.text_at(&["source_ip"]).unwrap_or_default().to_string(),
            count: parse_int(row.text_at(&["count"]), 0),
            dkim_result: EvaluationResult::from_token(evaluated.text_at(&["dkim"])),
            spf_result: EvaluationResult::from_token(evaluated.text_at(&["spf"])),
            disposition: Disposition::from_token(evaluated.text_at(&["disposition"])),
            reason_type: OverrideReason::from_token(evaluated.text_at(&["reason", "type"])),
            envelope_to: identifiers.text_at(&["envelope_to"]).map(str::to_string),
            header_from: identifiers
                .text_at(&["header_from"])
                .unwrap_or_default()
                .to_string(),
        })
    }
}
