//! Analyzer Implementation

use crate::reasoner::ReasoningService;
use crate::verdict::{Severity, Verdict};
use crate::ReasoningError;
use investigation::InvestigationReport;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const INSTRUCTIONS: &str = "Judge whether the service is currently experiencing an outage using only \
the evidence provided. Reply with a JSON object with exactly these fields: \
severity (\"normal\", \"suspected\" or \"confirmed\"), confidence (number between 0 and 1), \
notify (boolean), summary (short factual rationale; do not speculate about causes). \
An official outage report supports \"confirmed\"; many independent user reports without an \
official report support \"suspected\". Missing evidence is not evidence of an outage.";

/// Analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Name of the monitored service, included in the payload
    pub service_name: String,
    /// Upper bound on the serialized payload (characters)
    pub max_payload_chars: usize,
    /// Upper bound on any single evidence item (characters)
    pub max_item_chars: usize,
    /// Timeout for one reasoning round trip (milliseconds)
    pub reasoning_timeout_ms: u64,
    /// Total attempts before falling back (first call plus one retry)
    pub max_attempts: u8,
    /// A confirmed verdict needs at least this confidence
    pub confirmed_floor: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            service_name: "VRChat".to_string(),
            max_payload_chars: 16_000,
            max_item_chars: 1_000,
            reasoning_timeout_ms: 60_000,
            max_attempts: 2,
            confirmed_floor: 0.7,
        }
    }
}

/// Exact shape the reasoning reply must have
#[derive(Debug, Deserialize)]
struct VerdictReply {
    severity: Severity,
    confidence: f64,
    notify: bool,
    summary: String,
}

/// Produces one verdict per cycle
pub struct Analyzer {
    service: Arc<dyn ReasoningService>,
    config: AnalysisConfig,
}

impl Analyzer {
    /// Create a new analyzer over a reasoning service
    pub fn new(service: Arc<dyn ReasoningService>, config: AnalysisConfig) -> Self {
        info!(
            "Creating analyzer (payload <= {} chars, {} attempts, timeout {}ms)",
            config.max_payload_chars, config.max_attempts, config.reasoning_timeout_ms
        );
        Self { service, config }
    }

    /// Judge a report. Never fails: uninterpretable results become the
    /// conservative default.
    pub async fn analyze(&self, report: &InvestigationReport) -> Verdict {
        if report.is_empty() {
            debug!("Report carries no evidence, skipping reasoning service");
            return Verdict::no_evidence();
        }

        let payload = self.build_payload(report);
        let attempts = self.config.max_attempts.max(1);

        for attempt in 1..=attempts {
            match self.round_trip(&payload).await {
                Ok(verdict) => {
                    info!(
                        "Verdict: severity={}, confidence={:.2}, notify={}",
                        verdict.severity, verdict.confidence, verdict.notify
                    );
                    return verdict;
                }
                Err(e) => warn!("Analysis attempt {}/{} failed: {}", attempt, attempts, e),
            }
        }

        warn!("Reasoning service unusable, falling back to conservative verdict");
        metrics::counter!("sentinel_analysis_fallbacks_total").increment(1);
        Verdict::conservative_default()
    }

    async fn round_trip(&self, payload: &str) -> Result<Verdict, ReasoningError> {
        let timeout_ms = self.config.reasoning_timeout_ms;
        let reply = tokio::time::timeout(Duration::from_millis(timeout_ms), self.service.classify(payload))
            .await
            .map_err(|_| ReasoningError::Timeout(timeout_ms))??;
        self.parse_reply(&reply)
    }

    /// Validate a raw reply into a verdict.
    ///
    /// Confirmed verdicts below the calibration floor are downgraded to
    /// suspected.
    pub fn parse_reply(&self, reply: &str) -> Result<Verdict, ReasoningError> {
        let parsed: VerdictReply = serde_json::from_str(strip_code_fence(reply))
            .map_err(|e| ReasoningError::Malformed(e.to_string()))?;

        if !parsed.confidence.is_finite() || !(0.0..=1.0).contains(&parsed.confidence) {
            return Err(ReasoningError::Malformed(format!(
                "confidence {} outside [0, 1]",
                parsed.confidence
            )));
        }

        let mut severity = parsed.severity;
        if severity == Severity::Confirmed && parsed.confidence < self.config.confirmed_floor {
            debug!(
                "Confirmed verdict at confidence {:.2} below floor {:.2}, downgrading",
                parsed.confidence, self.config.confirmed_floor
            );
            severity = Severity::Suspected;
        }

        Ok(Verdict::reasoned(
            severity,
            parsed.confidence,
            parsed.notify,
            parsed.summary.trim(),
        ))
    }

    /// Serialize the report into a payload no longer than
    /// `max_payload_chars`, dropping the least recent evidence first.
    pub(crate) fn build_payload(&self, report: &InvestigationReport) -> String {
        let item = self.config.max_item_chars;
        let official = report.official_status.as_ref().map(|t| t.truncated(item).into_inner());
        let mut social: Vec<String> = report
            .social_mentions
            .iter()
            .map(|t| t.truncated(item).into_inner())
            .collect();
        let mut web: Vec<String> = report
            .web_snippets
            .iter()
            .map(|t| t.truncated(item).into_inner())
            .collect();
        let mut deep_dive = report
            .deep_dive_content
            .as_ref()
            .map(|t| t.truncated(item * 3).into_inner());

        loop {
            let payload = json!({
                "service": self.config.service_name,
                "instructions": INSTRUCTIONS,
                "collected_at": report.collected_at.to_rfc3339(),
                "evidence": {
                    "official_status": official,
                    "social_mentions": social,
                    "web_snippets": web,
                    "deep_dive_content": deep_dive,
                },
            })
            .to_string();

            if payload.chars().count() <= self.config.max_payload_chars {
                return payload;
            }
            if social.pop().is_some() || web.pop().is_some() || deep_dive.take().is_some() {
                continue;
            }
            warn!("Payload still exceeds bound with minimal evidence");
            return payload;
        }
    }
}

fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().trim_end_matches("```").trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoner::ConservativeReasoner;
    use crate::verdict::VerdictOrigin;
    use async_trait::async_trait;
    use chrono::Utc;
    use evidence::RawText;
    use proptest::prelude::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Reasoner replaying canned replies
    struct ScriptedReasoner {
        replies: Mutex<VecDeque<Result<String, ReasoningError>>>,
        calls: AtomicUsize,
        delay_ms: u64,
    }

    impl ScriptedReasoner {
        fn new(replies: Vec<Result<String, ReasoningError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
                delay_ms: 0,
            }
        }
    }

    #[async_trait]
    impl ReasoningService for ScriptedReasoner {
        async fn classify(&self, _payload: &str) -> Result<String, ReasoningError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ReasoningError::Unavailable("script exhausted".to_string())))
        }
    }

    fn report() -> InvestigationReport {
        let mut report = InvestigationReport::empty(Utc::now());
        report.official_status = Some(RawText::new("Official status: major - Major Outage"));
        report
    }

    fn analyzer(reasoner: Arc<ScriptedReasoner>) -> Analyzer {
        Analyzer::new(reasoner, AnalysisConfig::default())
    }

    fn ok(reply: &str) -> Result<String, ReasoningError> {
        Ok(reply.to_string())
    }

    #[tokio::test]
    async fn test_valid_reply_becomes_verdict() {
        let reasoner = Arc::new(ScriptedReasoner::new(vec![ok(
            "```json\n{\"severity\":\"confirmed\",\"confidence\":0.92,\"notify\":true,\"summary\":\" Official outage \"}\n```",
        )]));

        let verdict = analyzer(reasoner.clone()).analyze(&report()).await;
        assert_eq!(verdict.severity, Severity::Confirmed);
        assert_eq!(verdict.confidence, 0.92);
        assert!(verdict.notify);
        assert_eq!(verdict.summary, "Official outage");
        assert_eq!(verdict.origin, VerdictOrigin::Reasoned);
        assert_eq!(reasoner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_two_malformed_replies_fall_back() {
        let reasoner = Arc::new(ScriptedReasoner::new(vec![
            ok("{severity: confirmed,"),
            ok("not json at all"),
        ]));

        let verdict = analyzer(reasoner.clone()).analyze(&report()).await;
        assert_eq!(verdict, Verdict::conservative_default());
        assert!(!verdict.notify);
        assert_eq!(reasoner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_malformed_then_valid_reply_is_retried() {
        let reasoner = Arc::new(ScriptedReasoner::new(vec![
            ok("{\"severity\":\"catastrophic\",\"confidence\":0.9,\"notify\":true,\"summary\":\"x\"}"),
            ok("{\"severity\":\"suspected\",\"confidence\":0.6,\"notify\":false,\"summary\":\"reports\"}"),
        ]));

        let verdict = analyzer(reasoner.clone()).analyze(&report()).await;
        assert_eq!(verdict.severity, Severity::Suspected);
        assert_eq!(reasoner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_report_skips_service() {
        let reasoner = Arc::new(ScriptedReasoner::new(vec![ok(
            "{\"severity\":\"confirmed\",\"confidence\":1.0,\"notify\":true,\"summary\":\"x\"}",
        )]));

        let verdict = analyzer(reasoner.clone())
            .analyze(&InvestigationReport::empty(Utc::now()))
            .await;
        assert_eq!(verdict.severity, Severity::Normal);
        assert_eq!(verdict.origin, VerdictOrigin::NoEvidence);
        assert_eq!(reasoner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_fall_back() {
        let mut reasoner = ScriptedReasoner::new(vec![
            ok("{\"severity\":\"confirmed\",\"confidence\":1.0,\"notify\":true,\"summary\":\"x\"}"),
            ok("{\"severity\":\"confirmed\",\"confidence\":1.0,\"notify\":true,\"summary\":\"x\"}"),
        ]);
        reasoner.delay_ms = 120_000;
        let reasoner = Arc::new(reasoner);

        let verdict = analyzer(reasoner.clone()).analyze(&report()).await;
        assert_eq!(verdict.origin, VerdictOrigin::Fallback);
        assert_eq!(reasoner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_conservative_reasoner_yields_default() {
        let analyzer = Analyzer::new(Arc::new(ConservativeReasoner), AnalysisConfig::default());
        let verdict = analyzer.analyze(&report()).await;
        assert_eq!(verdict, Verdict::conservative_default());
    }

    #[test]
    fn test_reply_validation() {
        let analyzer = Analyzer::new(Arc::new(ConservativeReasoner), AnalysisConfig::default());

        // Missing field
        assert!(analyzer
            .parse_reply("{\"severity\":\"normal\",\"confidence\":0.1,\"notify\":false}")
            .is_err());
        // Out of range
        assert!(analyzer
            .parse_reply("{\"severity\":\"normal\",\"confidence\":1.5,\"notify\":false,\"summary\":\"\"}")
            .is_err());
        // Confidence must be numeric
        assert!(analyzer
            .parse_reply("{\"severity\":\"normal\",\"confidence\":\"high\",\"notify\":false,\"summary\":\"\"}")
            .is_err());
        // Capitalized variants are accepted
        let verdict = analyzer
            .parse_reply("{\"severity\":\"Normal\",\"confidence\":0.9,\"notify\":false,\"summary\":\"fine\"}")
            .unwrap();
        assert_eq!(verdict.severity, Severity::Normal);
    }

    #[test]
    fn test_low_confidence_confirmed_is_downgraded() {
        let analyzer = Analyzer::new(Arc::new(ConservativeReasoner), AnalysisConfig::default());
        let verdict = analyzer
            .parse_reply("{\"severity\":\"confirmed\",\"confidence\":0.4,\"notify\":true,\"summary\":\"x\"}")
            .unwrap();
        assert_eq!(verdict.severity, Severity::Suspected);
    }

    #[test]
    fn test_payload_is_bounded() {
        let config = AnalysisConfig {
            max_payload_chars: 6_000,
            ..Default::default()
        };
        let analyzer = Analyzer::new(Arc::new(ConservativeReasoner), config);

        let mut report = report();
        report.social_mentions = (0..200).map(|i| RawText::new(format!("post {} {}", i, "y".repeat(300)))).collect();
        report.deep_dive_content = Some(RawText::new("z".repeat(50_000)));

        let payload = analyzer.build_payload(&report);
        assert!(payload.chars().count() <= 6_000);
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert!(value["evidence"]["official_status"].as_str().unwrap().contains("Major Outage"));
        assert!(value["evidence"]["social_mentions"][0].as_str().unwrap().starts_with("post 0 "));
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{\"a\":1}```"), "{\"a\":1}");
    }

    proptest! {
        #[test]
        fn prop_confirmed_replies_respect_floor(
            severity in prop::sample::select(vec!["normal", "suspected", "confirmed", "Confirmed", "bogus"]),
            confidence in -1.0f64..2.0,
            notify in any::<bool>(),
        ) {
            let analyzer = Analyzer::new(Arc::new(ConservativeReasoner), AnalysisConfig::default());
            let reply = json!({
                "severity": severity,
                "confidence": confidence,
                "notify": notify,
                "summary": "generated",
            })
            .to_string();

            if let Ok(verdict) = analyzer.parse_reply(&reply) {
                prop_assert!((0.0..=1.0).contains(&verdict.confidence));
                if verdict.severity == Severity::Confirmed {
                    prop_assert!(verdict.confidence >= 0.7);
                }
            }
        }
    }
}
