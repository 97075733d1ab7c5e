//! Rule-based trust scoring for scanned product URLs.
//!
//! A run starts from a neutral 50 and walks a fixed sequence of checks,
//! each adding a reason and a delta: shortener resolution, domain trust,
//! suspicious wording, marketplace identifier, reachability. Deltas are
//! applied unclamped; the total is clamped to 0..=100 at the end and mapped
//! to a [`Verdict`].

use std::sync::Arc;

use super::marketplace::{FlipkartId, Marketplace, extract_amazon_asin, extract_flipkart_id};
use super::probe::{HttpTransport, Resolution, probe_reachability, resolve_shortened};
use super::trust::{TrustTables, domain_of};
use super::types::{ScoreResult, Verdict};

const NEUTRAL_SCORE: i32 = 50;
const MISSING_SCHEME_PENALTY: i32 = 30;
const TRUSTED_DOMAIN_BONUS: i32 = 20;
const UNTRUSTED_DOMAIN_PENALTY: i32 = 25;
const SUSPICIOUS_WORD_PENALTY: i32 = 30;
const AMAZON_ASIN_BONUS: i32 = 15;
const AMAZON_ASIN_MISSING_PENALTY: i32 = 8;
const FLIPKART_ID_BONUS: i32 = 12;
const FLIPKART_ID_MISSING_PENALTY: i32 = 6;
const REACHABLE_BONUS: i32 = 10;
const UNREACHABLE_PENALTY: i32 = 10;

#[derive(Clone)]
pub struct Scorer {
    tables: Arc<TrustTables>,
    transport: Arc<dyn HttpTransport>,
}

impl Scorer {
    pub fn new(tables: Arc<TrustTables>, transport: Arc<dyn HttpTransport>) -> Self {
        Self { tables, transport }
    }

    /// Score a decoded QR payload. Never fails: network trouble only shows
    /// up as a lower score and an explanatory reason.
    pub async fn score_url(&self, raw: &str) -> ScoreResult {
        let original = raw.trim();
        let mut tally = Tally::new();

        if !(original.starts_with("http://") || original.starts_with("https://")) {
            tally.adjust(-MISSING_SCHEME_PENALTY, "URL missing http/https scheme.");
            return tally.finish(original.to_string());
        }

        let resolution = resolve_shortened(self.transport.as_ref(), &self.tables, original).await;
        let resolved = resolution.effective_url(original).to_string();
        if let Resolution::Resolved(target) = &resolution {
            tally.note(format!("Short link resolved to: {target}"));
        }

        let domain = domain_of(&resolved);
        if self.tables.is_trusted(&domain) {
            tally.adjust(
                TRUSTED_DOMAIN_BONUS,
                format!("Trusted domain detected: {domain}"),
            );
        } else {
            let shown = if domain.is_empty() { "N/A" } else { domain.as_str() };
            tally.adjust(
                -UNTRUSTED_DOMAIN_PENALTY,
                format!("Untrusted domain: {shown}"),
            );
        }

        let hits = self.tables.suspicious_words_in(&resolved);
        if hits.is_empty() {
            tally.note("No suspicious keywords in URL.");
        } else {
            tracing::debug!(url = %resolved, words = ?hits, "suspicious wording");
            tally.adjust(-SUSPICIOUS_WORD_PENALTY, "Suspicious keywords found in URL.");
        }

        match Marketplace::for_domain(&domain) {
            Some(Marketplace::Amazon) => match extract_amazon_asin(&resolved) {
                Some(asin) => {
                    tally.adjust(AMAZON_ASIN_BONUS, format!("Amazon ASIN found: {asin}"))
                }
                None => tally.adjust(
                    -AMAZON_ASIN_MISSING_PENALTY,
                    "No valid Amazon ASIN pattern found.",
                ),
            },
            Some(Marketplace::Flipkart) => match extract_flipkart_id(&resolved) {
                Some(id) => {
                    if let FlipkartId::Pid(pid) = &id {
                        tracing::debug!(pid = %pid, "flipkart pid");
                    }
                    tally.adjust(
                        FLIPKART_ID_BONUS,
                        "Flipkart product identifier pattern detected.",
                    )
                }
                None => tally.adjust(
                    -FLIPKART_ID_MISSING_PENALTY,
                    "No Flipkart product identifier found.",
                ),
            },
            None => {}
        }

        let reachability = probe_reachability(self.transport.as_ref(), &resolved).await;
        if reachability.is_reachable() {
            tally.adjust(REACHABLE_BONUS, "URL is reachable (HTTP 2xx/3xx).");
        } else {
            tracing::debug!(url = %resolved, outcome = ?reachability, "unreachable");
            tally.adjust(
                -UNREACHABLE_PENALTY,
                "URL not reachable (blocked/404/timeout).",
            );
        }

        tally.finish(resolved)
    }
}

struct Tally {
    score: i32,
    reasons: Vec<String>,
}

impl Tally {
    fn new() -> Self {
        Self {
            score: NEUTRAL_SCORE,
            reasons: Vec::new(),
        }
    }

    fn adjust(&mut self, delta: i32, reason: impl Into<String>) {
        self.score += delta;
        self.reasons.push(reason.into());
    }

    fn note(&mut self, reason: impl Into<String>) {
        self.adjust(0, reason);
    }

    fn finish(self, resolved_url: String) -> ScoreResult {
        let score = self.score.clamp(0, 100) as u8;
        ScoreResult {
            label: Verdict::from_score(score),
            score,
            reasons: self.reasons,
            resolved_url,
        }
    }
}
