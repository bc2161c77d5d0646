//! Investigator Implementation

use crate::report::InvestigationReport;
use crate::window::SlidingWindow;
use chrono::{DateTime, Utc};
use evidence::{EvidenceError, EvidenceProvider, RawText};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Status page indicators that mean the service is not fully operational
const DISRUPTED_INDICATORS: &[&str] = &["minor", "major", "critical", "maintenance"];

/// Words that mark disruption when the status text is not in indicator form
const DISRUPTION_WORDS: &[&str] = &["outage", "degraded", "disruption", "incident", "investigating"];

/// Investigation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InvestigationConfig {
    /// Social search query
    pub social_query: String,
    /// Web search query used during a deep dive
    pub web_query: String,
    /// A post containing any of these (case-insensitive) counts as a complaint
    pub complaint_keywords: Vec<String>,
    /// Minimum complaint posts in one cycle before a spike is considered
    pub min_spike_mentions: usize,
    /// Complaint rate must reach baseline mean times this factor
    pub spike_factor: f64,
    /// Number of past cycles in the complaint baseline
    pub baseline_window: usize,
    /// Shortest time span a search result is taken to cover (seconds)
    pub rate_span_floor_secs: u64,
    /// Span assumed when no post carries a timestamp (seconds)
    pub undated_span_secs: u64,
    /// Deep-dive page content bound (characters)
    pub deep_dive_max_chars: usize,
    /// Timeout applied to each provider call (milliseconds)
    pub provider_timeout_ms: u64,
}

impl Default for InvestigationConfig {
    fn default() -> Self {
        Self {
            social_query: "VRChat (落ちた OR 重い OR 入れない OR down OR outage)".to_string(),
            web_query: "VRChat server status outage".to_string(),
            complaint_keywords: [
                "down",
                "outage",
                "can't connect",
                "cannot connect",
                "can't log in",
                "not working",
                "落ちた",
                "落ちて",
                "重い",
                "入れない",
                "繋がらない",
                "障害",
            ]
            .iter()
            .map(|k| k.to_string())
            .collect(),
            min_spike_mentions: 3,
            spike_factor: 2.0,
            baseline_window: 6,
            rate_span_floor_secs: 60,
            undated_span_secs: 600,
            deep_dive_max_chars: 5000,
            provider_timeout_ms: 15_000,
        }
    }
}

/// Why the investigator decided to dig deeper
#[derive(Debug, Clone, PartialEq)]
pub enum DeepDiveTrigger {
    /// Official status reports a disruption
    OfficialDisruption,
    /// Complaint rate jumped above the rolling baseline
    SocialSpike {
        complaints: usize,
        per_hour: f64,
        baseline: Option<f64>,
    },
}

/// Orchestrates the evidence providers for one cycle
pub struct Investigator {
    provider: Arc<dyn EvidenceProvider>,
    config: InvestigationConfig,
    baseline: Mutex<SlidingWindow>,
}

impl Investigator {
    /// Create a new investigator over a provider
    pub fn new(provider: Arc<dyn EvidenceProvider>, config: InvestigationConfig) -> Self {
        info!(
            "Creating investigator (spike >= {} posts, x{} baseline rate over {} cycles)",
            config.min_spike_mentions, config.spike_factor, config.baseline_window
        );
        Self {
            provider,
            baseline: Mutex::new(SlidingWindow::new(config.baseline_window)),
            config,
        }
    }

    /// Collect evidence for one cycle. Never fails.
    pub async fn investigate(&self) -> InvestigationReport {
        let (official, social) = tokio::join!(
            self.guarded("status-page", self.provider.fetch_official_status()),
            self.guarded("social-search", self.provider.search_social(&self.config.social_query)),
        );
        let official_status = official.flatten();

        let now = Utc::now();
        let trigger = self.assess(official_status.as_ref(), social.as_deref(), now);
        if let Some(mentions) = social.as_deref() {
            self.record_baseline(self.complaint_rate(mentions, now));
        }

        let mut report = InvestigationReport::empty(Utc::now());
        report.official_status = official_status;
        report.social_mentions = social.unwrap_or_default();

        if let Some(trigger) = trigger {
            info!("Deep dive triggered: {:?}", trigger);
            self.deep_dive(&mut report).await;
        } else {
            debug!("Cheap signals unambiguous, skipping deep dive");
        }

        report.collected_at = Utc::now();
        debug!(
            "Investigation complete: official={}, social={}, web={}, deep_dive={}",
            report.official_status.is_some(),
            report.social_mentions.len(),
            report.web_snippets.len(),
            report.has_deep_dive()
        );
        report
    }

    /// Decide whether the cheap signals warrant a deep dive.
    ///
    /// `social` is `None` when the social provider failed; its absence
    /// neither triggers nor suppresses the official-status rule.
    pub fn assess(
        &self,
        official: Option<&RawText>,
        social: Option<&[RawText]>,
        now: DateTime<Utc>,
    ) -> Option<DeepDiveTrigger> {
        if official.map_or(false, signals_disruption) {
            return Some(DeepDiveTrigger::OfficialDisruption);
        }

        let mentions = social?;
        let complaints = self.count_complaints(mentions);
        let per_hour = self.complaint_rate(mentions, now);
        let baseline = self.baseline_mean();
        let above_baseline = baseline.map_or(true, |mean| per_hour >= mean * self.config.spike_factor);

        if complaints >= self.config.min_spike_mentions && above_baseline {
            Some(DeepDiveTrigger::SocialSpike {
                complaints,
                per_hour,
                baseline,
            })
        } else {
            None
        }
    }

    /// Complaint posts per hour over the span the search result covers.
    ///
    /// Searches return a capped page of the latest posts, so a burst shows up
    /// as the same number of posts over a shorter span rather than as more
    /// posts.
    pub fn complaint_rate(&self, mentions: &[RawText], now: DateTime<Utc>) -> f64 {
        let complaints = self.count_complaints(mentions);
        if complaints == 0 {
            return 0.0;
        }

        let span_secs = match mentions.iter().filter_map(RawText::posted_at).min() {
            Some(oldest) => (now - oldest).num_seconds().max(0) as u64,
            None => self.config.undated_span_secs,
        };
        let span_secs = span_secs.max(self.config.rate_span_floor_secs).max(1);
        complaints as f64 * 3600.0 / span_secs as f64
    }

    /// Number of posts that contain a complaint keyword
    pub fn count_complaints(&self, mentions: &[RawText]) -> usize {
        mentions
            .iter()
            .filter(|post| {
                let lower = post.as_str().to_lowercase();
                self.config
                    .complaint_keywords
                    .iter()
                    .any(|keyword| lower.contains(&keyword.to_lowercase()))
            })
            .count()
    }

    async fn deep_dive(&self, report: &mut InvestigationReport) {
        report.web_snippets = self
            .guarded("web-search", self.provider.search_web(&self.config.web_query))
            .await
            .unwrap_or_default();

        let Some(url) = report.web_snippets.iter().find_map(RawText::first_url) else {
            debug!("Web search produced no page to fetch");
            return;
        };

        report.deep_dive_content = self
            .guarded("page-fetch", self.provider.fetch_page(url))
            .await
            .flatten()
            .map(|page| page.truncated(self.config.deep_dive_max_chars));
    }

    /// Run one provider call with a timeout, converting any failure into
    /// absent data.
    async fn guarded<T, F>(&self, source: &'static str, call: F) -> Option<T>
    where
        F: Future<Output = Result<T, EvidenceError>>,
    {
        let timeout_ms = self.config.provider_timeout_ms;
        match tokio::time::timeout(Duration::from_millis(timeout_ms), call).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!("Evidence provider {} unavailable: {}", e.source_name(), e);
                None
            }
            Err(_) => {
                warn!("Evidence provider {} timed out after {}ms", source, timeout_ms);
                None
            }
        }
    }

    fn baseline_mean(&self) -> Option<f64> {
        self.baseline
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .mean()
    }

    fn record_baseline(&self, per_hour: f64) {
        self.baseline
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(per_hour);
    }
}

/// Whether official status text reports anything other than full operation
pub fn signals_disruption(official: &RawText) -> bool {
    let lower = official.as_str().to_lowercase();

    if let Some(rest) = lower.strip_prefix("official status:") {
        let indicator = rest.split_whitespace().next().unwrap_or("");
        if indicator == "none" {
            return false;
        }
        if DISRUPTED_INDICATORS.contains(&indicator) {
            return true;
        }
    }

    DISRUPTION_WORDS.iter().any(|word| lower.contains(word))
}
