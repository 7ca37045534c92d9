use serde::{Deserialize, Serialize};

/// DKIM/SPF identifier alignment mode published in a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    #[default]
    Relaxed,
    Strict,
}

/// Requested or applied policy action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    #[default]
    None,
    Quarantine,
    Reject,
}

/// DMARC-aligned DKIM/SPF verdict from `policy_evaluated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationResult {
    Pass,
    #[default]
    Fail,
}

/// Why a receiver did not apply the published policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideReason {
    Forwarded,
    SampledOut,
    TrustedForwarder,
    MailingList,
    LocalPolicy,
    #[default]
    Other,
}

/// Map a source token to a closed enumeration, falling back to the
/// type's default for anything unrecognized.
pub trait FromToken: Sized + Default {
    fn from_known_token(token: &str) -> Option<Self>;

    fn from_token(token: Option<&str>) -> Self {
        token
            .map(|t| t.trim().to_lowercase())
            .and_then(|t| Self::from_known_token(&t))
            .unwrap_or_default()
    }
}

impl FromToken for Alignment {
    fn from_known_token(token: &str) -> Option<Self> {
        match token {
            "r" | "relaxed" => Some(Alignment::Relaxed),
            "s" | "strict" => Some(Alignment::Strict),
            _ => None,
        }
    }
}

impl FromToken for Disposition {
    fn from_known_token(token: &str) -> Option<Self> {
        match token {
            "none" => Some(Disposition::None),
            "quarantine" => Some(Disposition::Quarantine),
            "reject" => Some(Disposition::Reject),
            _ => None,
        }
    }
}

impl FromToken for EvaluationResult {
    fn from_known_token(token: &str) -> Option<Self> {
        match token {
            "pass" => Some(EvaluationResult::Pass),
            "fail" => Some(EvaluationResult::Fail),
            _ => None,
        }
    }
}

impl FromToken for OverrideReason {
    fn from_known_token(token: &str) -> Option<Self> {
        match token {
            "forwarded" => Some(OverrideReason::Forwarded),
            "sampled_out" => Some(OverrideReason::SampledOut),
            "trusted_forwarder" => Some(OverrideReason::TrustedForwarder),
            "mailing_list" => Some(OverrideReason::MailingList),
            "local_policy" => Some(OverrideReason::LocalPolicy),
            "other" => Some(OverrideReason::Other),
            _ => None,
        }
    }
}

/// One storage-ready row: report metadata, published policy and a single
/// per-source-IP record flattened together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRecordRow {
    pub report_id: String,
    pub org_name: String,
    pub date_range_begin: i64,
    pub date_range_end: i64,
    pub error: Option<String>,
    pub domain: String,
    pub adkim: Alignment,
    pub aspf: Alignment,
    pub p: Disposition,
    pub sp: Disposition,
    pub pct: i64,
    pub source_ip: String,
    pub count: i64,
    pub dkim_result: EvaluationResult,
    pub spf_result: EvaluationResult,
    pub disposition: Disposition,
    pub reason_type: OverrideReason,
    pub envelope_to: Option<String>,
    pub header_from: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_tokens_use_defaults() {
        assert_eq!(Alignment::from_token(Some("maybe")), Alignment::Relaxed);
        assert_eq!(Alignment::from_token(Some(" S ")), Alignment::Strict);
        assert_eq!(Disposition::from_token(None), Disposition::None);
        assert_eq!(Disposition::from_token(Some("Reject")), Disposition::Reject);
        assert_eq!(EvaluationResult::from_token(Some("softfail")), EvaluationResult::Fail);
        assert_eq!(OverrideReason::from_token(Some("mailing_list")), OverrideReason::MailingList);
        assert_eq!(OverrideReason::from_token(Some("because")), OverrideReason::Other);
    }

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(serde_json::to_string(&OverrideReason::SampledOut).unwrap(), "\"sampled_out\"");
        assert_eq!(serde_json::to_string(&Alignment::Relaxed).unwrap(), "\"relaxed\"");
        assert_eq!(serde_json::to_string(&Disposition::Quarantine).unwrap(), "\"quarantine\"");
    }
}
