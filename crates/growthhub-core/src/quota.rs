//! Usage quota gate in front of the text generator.
//!
//! Each call performs at most one quota read, one generation and one log
//! append, in that order. Concurrent calls for one user are not coordinated:
//! several may pass the check before any of them appends its log row.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rand::Rng;
use tracing::{debug, error, info, warn};

use crate::fallback::{
    is_fallback_text, with_notice, CannedResponses, FallbackLookup, FALLBACK_NOTICE,
    SAMPLE_NOTICE,
};
use crate::generation::{GenerationResult, ResponseSource, TextGenerator};
use crate::usage::{
    evaluate_usage, ApiType, PlanTier, UsageCheck, UsageCounts, UsageLog, UsageLogStore,
    UsageSummary, UsageWindows, CHECK_FAILURE_MESSAGE, STORE_FAILURE_MESSAGE,
};

const DEFAULT_DENIAL_MESSAGE: &str = "利用制限に達しました";

/// Share of allowed requests forwarded to the downstream generator.
///
/// Requests that are sampled out are answered from the canned table when a
/// match exists; without a match they still go downstream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingPolicy {
    rate: f64,
}

impl SamplingPolicy {
    pub fn new(rate: f64) -> Self {
        let rate = if rate.is_nan() { 1.0 } else { rate.clamp(0.0, 1.0) };
        Self { rate }
    }

    pub fn always() -> Self {
        Self { rate: 1.0 }
    }

    pub fn never() -> Self {
        Self { rate: 0.0 }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn should_call_downstream(&self) -> bool {
        if self.rate >= 1.0 {
            return true;
        }
        if self.rate <= 0.0 {
            return false;
        }
        rand::thread_rng().gen_bool(self.rate)
    }
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        Self::always()
    }
}

pub struct UsageQuotaGate {
    store: Arc<dyn UsageLogStore>,
    generator: Arc<dyn TextGenerator>,
    fallbacks: Arc<dyn FallbackLookup>,
    sampling: SamplingPolicy,
    timezone: Tz,
}

impl UsageQuotaGate {
    pub fn new(
        store: Arc<dyn UsageLogStore>,
        generator: Arc<dyn TextGenerator>,
        timezone: Tz,
    ) -> Self {
        Self {
            store,
            generator,
            fallbacks: Arc::new(CannedResponses::default()),
            sampling: SamplingPolicy::default(),
            timezone,
        }
    }

    pub fn with_fallbacks(mut self, fallbacks: Arc<dyn FallbackLookup>) -> Self {
        self.fallbacks = fallbacks;
        self
    }

    pub fn with_sampling(mut self, sampling: SamplingPolicy) -> Self {
        self.sampling = sampling;
        self
    }

    pub async fn check_usage_limit(&self, user_id: &str, plan: PlanTier) -> UsageCheck {
        self.check_usage_limit_at(user_id, plan, Utc::now()).await
    }

    /// Quota check against the windows containing `now`. Fails closed on any
    /// store error.
    pub async fn check_usage_limit_at(
        &self,
        user_id: &str,
        plan: PlanTier,
        now: DateTime<Utc>,
    ) -> UsageCheck {
        let limits = plan.limits();
        let Some(windows) = UsageWindows::at(now, self.timezone) else {
            error!(user_id, timezone = %self.timezone, "usage window start is not representable");
            return UsageCheck::fail_closed(PlanTier::Free.limits(), CHECK_FAILURE_MESSAGE);
        };

        let daily = match self.store.count_usage_since(user_id, windows.day_start).await {
            Ok(count) => count,
            Err(err) => {
                error!(user_id, error = %err, "daily usage check failed");
                return UsageCheck::fail_closed(limits, STORE_FAILURE_MESSAGE);
            }
        };
        let monthly = match self.store.count_usage_since(user_id, windows.month_start).await {
            Ok(count) => count,
            Err(err) => {
                error!(user_id, error = %err, "monthly usage check failed");
                return UsageCheck::fail_closed(limits, STORE_FAILURE_MESSAGE);
            }
        };

        let check = evaluate_usage(limits, UsageCounts { daily, monthly });
        debug!(
            user_id,
            plan = plan.as_str(),
            daily,
            monthly,
            can_use = check.can_use,
            "usage checked"
        );
        check
    }

    pub async fn log_usage(
        &self,
        user_id: &str,
        plan: PlanTier,
        api_type: ApiType,
        tokens_used: Option<i64>,
    ) -> anyhow::Result<()> {
        let entry = UsageLog::new(user_id, plan, api_type, tokens_used, Utc::now());
        self.store.append_usage_log(&entry).await
    }

    pub async fn get_user_usage(&self, user_id: &str, plan: PlanTier) -> UsageSummary {
        UsageSummary::from_check(plan, self.check_usage_limit(user_id, plan).await)
    }

    /// Quota-checked generation with canned fallbacks.
    ///
    /// Denied requests never reach the generator. Only real generations are
    /// logged; canned answers are free.
    pub async fn generate_text_with_limit(
        &self,
        user_id: &str,
        prompt: &str,
        plan: PlanTier,
    ) -> GenerationResult {
        let check = self.check_usage_limit(user_id, plan).await;
        if !check.can_use {
            info!(user_id, plan = plan.as_str(), "generation denied by quota");
            return GenerationResult::denied(
                check
                    .message
                    .unwrap_or_else(|| DEFAULT_DENIAL_MESSAGE.to_string()),
            );
        }
        let remaining = check.remaining;

        if !self.sampling.should_call_downstream() {
            if let Some(canned) = self.fallbacks.lookup(prompt) {
                debug!(user_id, "request sampled out, serving canned response");
                return GenerationResult::produced(
                    with_notice(canned, SAMPLE_NOTICE),
                    remaining,
                    ResponseSource::Sample,
                );
            }
        }

        match self.generator.generate(prompt).await {
            Ok(text) => {
                if !text.is_empty() && !is_fallback_text(&text) {
                    if let Err(err) = self
                        .log_usage(user_id, plan, ApiType::Gemini, None)
                        .await
                    {
                        warn!(user_id, error = %err, "usage log append failed");
                    }
                }
                GenerationResult::produced(text, remaining, ResponseSource::Generated)
            }
            Err(err) => {
                warn!(user_id, error = %err, "text generation failed");
                match self.fallbacks.lookup(prompt) {
                    Some(canned) => GenerationResult::produced(
                        with_notice(canned, FALLBACK_NOTICE),
                        remaining,
                        ResponseSource::Fallback,
                    ),
                    None => GenerationResult::denied(err.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::generation::GenerationError;
    use crate::usage::Remaining;

    #[derive(Default)]
    struct MemoryStore {
        logs: Mutex<Vec<UsageLog>>,
        fail_reads: bool,
    }

    impl MemoryStore {
        fn with_entries(user_id: &str, count: usize, at: DateTime<Utc>) -> Self {
            let logs = (0..count)
                .map(|_| UsageLog::new(user_id, PlanTier::Free, ApiType::Gemini, None, at))
                .collect();
            Self {
                logs: Mutex::new(logs),
                fail_reads: false,
            }
        }

        fn len(&self) -> usize {
            self.logs.lock().expect("lock").len()
        }
    }

    #[async_trait]
    impl UsageLogStore for MemoryStore {
        async fn count_usage_since(
            &self,
            user_id: &str,
            since: DateTime<Utc>,
        ) -> anyhow::Result<u64> {
            if self.fail_reads {
                anyhow::bail!("store unavailable");
            }
            let logs = self.logs.lock().expect("lock");
            Ok(logs
                .iter()
                .filter(|l| l.user_id == user_id && l.created_at >= since)
                .count() as u64)
        }

        async fn append_usage_log(&self, log: &UsageLog) -> anyhow::Result<()> {
            self.logs.lock().expect("lock").push(log.clone());
            Ok(())
        }
    }

    struct StubGenerator {
        reply: Result<String, GenerationError>,
        calls: AtomicUsize,
    }

    impl StubGenerator {
        fn replying(reply: Result<String, GenerationError>) -> Self {
            Self {
                reply,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TextGenerator for StubGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone()
        }
    }

    fn gate(store: Arc<MemoryStore>, generator: Arc<StubGenerator>) -> UsageQuotaGate {
        UsageQuotaGate::new(store, generator, chrono_tz::UTC)
    }

    #[tokio::test]
    async fn free_plan_denied_after_five_calls_today() {
        let store = Arc::new(MemoryStore::with_entries("demo-user", 5, Utc::now()));
        let generator = Arc::new(StubGenerator::replying(Ok("ok".to_string())));
        let gate = gate(store, generator);

        let check = gate.check_usage_limit("demo-user", PlanTier::Free).await;
        assert!(!check.can_use);
        assert_eq!(check.remaining.daily, 0);
        assert!(check.message.expect("message").contains("（5回）"));
    }

    #[tokio::test]
    async fn windows_use_injected_clock() {
        let now = DateTime::parse_from_rfc3339("2026-07-15T10:00:00Z")
            .expect("ts")
            .with_timezone(&Utc);
        let yesterday = now - chrono::Duration::days(1);
        let store = Arc::new(MemoryStore::with_entries("u", 5, yesterday));
        let gate = gate(
            store,
            Arc::new(StubGenerator::replying(Ok("ok".to_string()))),
        );

        let check = gate.check_usage_limit_at("u", PlanTier::Free, now).await;
        assert!(check.can_use);
        assert_eq!(check.remaining, Remaining { daily: 5, monthly: 45 });
    }

    #[tokio::test]
    async fn store_failure_fails_closed() {
        let store = Arc::new(MemoryStore {
            fail_reads: true,
            ..MemoryStore::default()
        });
        let generator = Arc::new(StubGenerator::replying(Ok("ok".to_string())));
        let gate = gate(store, generator.clone());

        let check = gate.check_usage_limit("u", PlanTier::Business).await;
        assert!(!check.can_use);
        assert_eq!(check.remaining, Remaining::default());
        assert_eq!(check.limits, PlanTier::Business.limits());
        assert_eq!(check.message.as_deref(), Some(STORE_FAILURE_MESSAGE));

        let result = gate.generate_text_with_limit("u", "こんにちは", PlanTier::Business).await;
        assert!(!result.success);
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn denial_never_calls_generator() {
        let store = Arc::new(MemoryStore::with_entries("u", 5, Utc::now()));
        let generator = Arc::new(StubGenerator::replying(Ok("ok".to_string())));
        let gate = gate(store.clone(), generator.clone());

        let result = gate.generate_text_with_limit("u", "売上分析", PlanTier::Free).await;
        assert!(!result.success);
        assert!(result.text.is_empty());
        assert!(result.message.expect("message").contains("本日の利用制限"));
        assert_eq!(generator.calls(), 0);
        assert_eq!(store.len(), 5);
    }

    #[tokio::test]
    async fn successful_generation_is_logged_once() {
        let store = Arc::new(MemoryStore::default());
        let generator = Arc::new(StubGenerator::replying(Ok("分析結果です".to_string())));
        let gate = gate(store.clone(), generator.clone());

        let result = gate.generate_text_with_limit("u", "売上分析", PlanTier::Free).await;
        assert!(result.success);
        assert_eq!(result.text, "分析結果です");
        assert_eq!(result.source, ResponseSource::Generated);
        assert_eq!(result.remaining, Some(Remaining { daily: 5, monthly: 50 }));
        assert_eq!(store.len(), 1);

        let after = gate.check_usage_limit("u", PlanTier::Free).await;
        assert_eq!(after.remaining.daily, 4);
    }

    #[tokio::test]
    async fn degraded_or_empty_text_is_not_billed() {
        let store = Arc::new(MemoryStore::default());
        let degraded = with_notice("サンプル", FALLBACK_NOTICE);
        let gate_degraded = gate(
            store.clone(),
            Arc::new(StubGenerator::replying(Ok(degraded.clone()))),
        );
        let result = gate_degraded
            .generate_text_with_limit("u", "x", PlanTier::Free)
            .await;
        assert!(result.success);
        assert_eq!(result.text, degraded);

        let gate_empty = gate(
            store.clone(),
            Arc::new(StubGenerator::replying(Ok(String::new()))),
        );
        let result = gate_empty.generate_text_with_limit("u", "x", PlanTier::Free).await;
        assert!(result.success);
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn generator_error_with_return_prompt_uses_canned_reply() {
        let store = Arc::new(MemoryStore::default());
        let generator = Arc::new(StubGenerator::replying(Err(GenerationError::Network(
            "connection reset".to_string(),
        ))));
        let gate = gate(store.clone(), generator.clone());

        let result = gate
            .generate_text_with_limit("u", "返品の方法を教えてください", PlanTier::Free)
            .await;
        assert!(result.success);
        assert!(result.text.starts_with("商品の返品は"));
        assert!(result.text.ends_with(FALLBACK_NOTICE));
        assert_eq!(result.source, ResponseSource::Fallback);
        assert_eq!(generator.calls(), 1);
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn generator_error_without_match_is_surfaced() {
        let store = Arc::new(MemoryStore::default());
        let gate = gate(
            store.clone(),
            Arc::new(StubGenerator::replying(Err(GenerationError::RateLimited))),
        );

        let result = gate.generate_text_with_limit("u", "売上予測", PlanTier::Free).await;
        assert!(!result.success);
        assert!(result.text.is_empty());
        assert_eq!(result.message.as_deref(), Some("rate limit exceeded"));
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn sampled_out_requests_use_canned_reply_when_available() {
        let store = Arc::new(MemoryStore::default());
        let generator = Arc::new(StubGenerator::replying(Ok("real".to_string())));
        let gate = gate(store.clone(), generator.clone()).with_sampling(SamplingPolicy::never());

        let canned = gate.generate_text_with_limit("u", "配送状況", PlanTier::Free).await;
        assert!(canned.success);
        assert_eq!(canned.source, ResponseSource::Sample);
        assert!(canned.text.ends_with(SAMPLE_NOTICE));
        assert_eq!(generator.calls(), 0);

        let forwarded = gate.generate_text_with_limit("u", "売上予測", PlanTier::Free).await;
        assert_eq!(forwarded.source, ResponseSource::Generated);
        assert_eq!(generator.calls(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn sampling_rate_is_clamped() {
        assert_eq!(SamplingPolicy::new(3.0).rate(), 1.0);
        assert_eq!(SamplingPolicy::new(-1.0).rate(), 0.0);
        assert_eq!(SamplingPolicy::new(f64::NAN).rate(), 1.0);
        assert!(SamplingPolicy::always().should_call_downstream());
        assert!(!SamplingPolicy::never().should_call_downstream());
    }

    #[tokio::test]
    async fn usage_summary_reports_consumed_calls() {
        let store = Arc::new(MemoryStore::with_entries("u", 2, Utc::now()));
        let gate = gate(
            store,
            Arc::new(StubGenerator::replying(Ok("ok".to_string()))),
        );
        let summary = gate.get_user_usage("u", PlanTier::Personal).await;
        assert_eq!(summary.usage, UsageCounts { daily: 2, monthly: 2 });
        assert_eq!(summary.remaining, Remaining { daily: 98, monthly: 2998 });
        assert!(summary.can_use);
    }
}
