//! Investigation report

use chrono::{DateTime, Utc};
use evidence::RawText;
use serde::{Deserialize, Serialize};

/// Aggregated evidence for one polling cycle.
///
/// A report with every field empty is valid and means "no evidence".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationReport {
    /// Authoritative status, absent if the status page could not be read
    pub official_status: Option<RawText>,
    /// Recent social posts, newest first
    pub social_mentions: Vec<RawText>,
    /// Web search results, only collected during a deep dive
    pub web_snippets: Vec<RawText>,
    /// Body of the top ranked page, only collected during a deep dive
    pub deep_dive_content: Option<RawText>,
    pub collected_at: DateTime<Utc>,
}

impl InvestigationReport {
    /// Report with no evidence at all
    pub fn empty(collected_at: DateTime<Utc>) -> Self {
        Self {
            official_status: None,
            social_mentions: Vec::new(),
            web_snippets: Vec::new(),
            deep_dive_content: None,
            collected_at,
        }
    }

    /// True when no provider contributed anything
    pub fn is_empty(&self) -> bool {
        self.official_status.as_ref().map_or(true, RawText::is_blank)
            && self.social_mentions.iter().all(RawText::is_blank)
            && self.web_snippets.iter().all(RawText::is_blank)
            && self.deep_dive_content.as_ref().map_or(true, RawText::is_blank)
    }

    pub fn has_deep_dive(&self) -> bool {
        self.deep_dive_content.is_some()
    }

    /// Fabricated evidence of a major outage, used by drills
    pub fn synthetic_outage(service: &str, collected_at: DateTime<Utc>) -> Self {
        Self {
            official_status: Some(RawText::new(format!(
                "Official status: major - {} reports a Major Outage",
                service
            ))),
            social_mentions: vec![
                RawText::new(format!("@drill_user1 (just now): {} is down, can't log in", service)),
                RawText::new(format!("@drill_user2 (just now): {} keeps disconnecting", service)),
                RawText::new(format!("@drill_user3 (just now): anyone else unable to connect to {}?", service)),
            ],
            web_snippets: vec![RawText::new(format!(
                "Title: {} outage\nURL: https://status.example.invalid/incident\nSnippet: Widespread login failures",
                service
            ))],
            deep_dive_content: Some(RawText::new(format!(
                "A large-scale outage is affecting all {} services. Waiting for the official recovery is recommended.",
                service
            ))),
            collected_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_report() {
        let mut report = InvestigationReport::empty(Utc::now());
        assert!(report.is_empty());

        report.social_mentions.push(RawText::new("   "));
        assert!(report.is_empty());

        report.official_status = Some(RawText::new("Official status: none - All Systems Operational"));
        assert!(!report.is_empty());
    }

    #[test]
    fn test_synthetic_outage_has_every_field() {
        let report = InvestigationReport::synthetic_outage("VRChat", Utc::now());
        assert!(!report.is_empty());
        assert!(report.has_deep_dive());
        assert_eq!(report.social_mentions.len(), 3);
        assert!(report.official_status.unwrap().as_str().contains("major"));
    }
}
