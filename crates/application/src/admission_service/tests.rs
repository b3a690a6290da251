use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use storefront_core::{AppError, AppResult};
use storefront_domain::{AdmissionDecision, ClientOrigin, IdentityKey, Policy, default_policies};

use crate::{AdmissionEngine, AdmissionService, Clock, CounterStore, CounterTick, PolicyRegistry};

struct ManualClock {
    epoch_ms: AtomicI64,
}

impl ManualClock {
    fn new() -> Self {
        Self {
            epoch_ms: AtomicI64::new(1_700_000_000_000),
        }
    }

    fn advance_ms(&self, milliseconds: i64) {
        self.epoch_ms.fetch_add(milliseconds, Ordering::SeqCst);
    }

    fn advance_seconds(&self, seconds: i64) {
        self.advance_ms(seconds * 1000);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.epoch_ms.load(Ordering::SeqCst)).unwrap_or_default()
    }
}

#[derive(Default)]
struct FakeState {
    counters: HashMap<String, (u64, DateTime<Utc>)>,
    blocks: HashMap<String, DateTime<Utc>>,
}

struct FakeCounterStore {
    clock: Arc<ManualClock>,
    state: Mutex<FakeState>,
}

impl FakeCounterStore {
    fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            state: Mutex::new(FakeState::default()),
        }
    }
}

#[async_trait]
impl CounterStore for FakeCounterStore {
    async fn get_block(&self, key: &str) -> AppResult<Option<DateTime<Utc>>> {
        let now = self.clock.now();
        Ok(self
            .state
            .lock()
            .await
            .blocks
            .get(key)
            .copied()
            .filter(|blocked_until| *blocked_until > now))
    }

    async fn increment_with_expiry(
        &self,
        key: &str,
        window_seconds: u32,
    ) -> AppResult<CounterTick> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let entry = state.counters.entry(key.to_owned()).or_insert((0, now));

        if entry.1 <= now {
            *entry = (0, now + Duration::seconds(i64::from(window_seconds)));
        }
        entry.0 += 1;

        Ok(CounterTick {
            count: entry.0,
            window_remaining_ms: u64::try_from((entry.1 - now).num_milliseconds()).unwrap_or(0),
        })
    }

    async fn set_block(&self, key: &str, penalty_seconds: u32) -> AppResult<DateTime<Utc>> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        if let Some(existing) = state.blocks.get(key).copied().filter(|until| *until > now) {
            return Ok(existing);
        }

        let blocked_until = now + Duration::seconds(i64::from(penalty_seconds));
        state.blocks.insert(key.to_owned(), blocked_until);
        if let Some(counter) = state.counters.get_mut(key) {
            counter.1 = blocked_until;
        }

        Ok(blocked_until)
    }
}

struct UnavailableCounterStore;

#[async_trait]
impl CounterStore for UnavailableCounterStore {
    async fn get_block(&self, _key: &str) -> AppResult<Option<DateTime<Utc>>> {
        Err(AppError::StoreUnavailable("connection refused".to_owned()))
    }

    async fn increment_with_expiry(
        &self,
        _key: &str,
        _window_seconds: u32,
    ) -> AppResult<CounterTick> {
        Err(AppError::StoreUnavailable("connection refused".to_owned()))
    }

    async fn set_block(&self, _key: &str, _penalty_seconds: u32) -> AppResult<DateTime<Utc>> {
        Err(AppError::StoreUnavailable("connection refused".to_owned()))
    }
}

struct CorruptCounterStore;

#[async_trait]
impl CounterStore for CorruptCounterStore {
    async fn get_block(&self, _key: &str) -> AppResult<Option<DateTime<Utc>>> {
        Ok(None)
    }

    async fn increment_with_expiry(
        &self,
        _key: &str,
        _window_seconds: u32,
    ) -> AppResult<CounterTick> {
        Err(AppError::Internal("unexpected counter reply".to_owned()))
    }

    async fn set_block(&self, _key: &str, _penalty_seconds: u32) -> AppResult<DateTime<Utc>> {
        Err(AppError::Internal("unexpected counter reply".to_owned()))
    }
}

/// Replica whose clock runs ahead: every caller is past quota and the
/// penalty it reports has already lapsed locally.
struct SkewedCounterStore {
    clock: Arc<ManualClock>,
}

#[async_trait]
impl CounterStore for SkewedCounterStore {
    async fn get_block(&self, _key: &str) -> AppResult<Option<DateTime<Utc>>> {
        Ok(None)
    }

    async fn increment_with_expiry(
        &self,
        _key: &str,
        window_seconds: u32,
    ) -> AppResult<CounterTick> {
        Ok(CounterTick {
            count: 7,
            window_remaining_ms: u64::from(window_seconds) * 1000,
        })
    }

    async fn set_block(&self, _key: &str, _penalty_seconds: u32) -> AppResult<DateTime<Utc>> {
        Ok(self.clock.now() - Duration::seconds(5))
    }
}

fn registry_with(extra: Vec<Policy>) -> Arc<PolicyRegistry> {
    let mut policies = default_policies().unwrap_or_default();
    policies.extend(extra);
    match PolicyRegistry::new(policies) {
        Ok(registry) => Arc::new(registry),
        Err(error) => panic!("test registry must build: {error}"),
    }
}

fn policy(name: &str, quota: u32, window_seconds: u32, penalty_seconds: u32) -> Policy {
    match Policy::new(name, quota, window_seconds, penalty_seconds) {
        Ok(policy) => policy,
        Err(error) => panic!("test policy must build: {error}"),
    }
}

fn service_with_clock(extra: Vec<Policy>) -> (AdmissionService, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(FakeCounterStore::new(clock.clone()));
    let engine = AdmissionEngine::new(store, clock.clone());
    (AdmissionService::new(registry_with(extra), engine), clock)
}

fn key(value: &str) -> IdentityKey {
    IdentityKey::resolve(&ClientOrigin::default(), Some(value))
}

async fn check(
    service: &AdmissionService,
    policy_name: &str,
    key: &IdentityKey,
) -> AdmissionDecision {
    match service.check(policy_name, key).await {
        Ok(decision) => decision,
        Err(error) => panic!("admission check failed: {error}"),
    }
}

#[tokio::test]
async fn quota_calls_allowed_with_decreasing_remaining_then_denied() {
    let (service, _clock) = service_with_clock(vec![policy("burst", 5, 60, 60)]);
    let caller = key("198.51.100.4");

    for expected_remaining in (0..5).rev() {
        let decision = check(&service, "burst", &caller).await;
        assert!(decision.allowed);
        assert!(!decision.degraded);
        assert_eq!(decision.remaining_quota, expected_remaining);
    }

    let denied = check(&service, "burst", &caller).await;
    assert!(!denied.allowed);
    assert_eq!(denied.reset_after_ms, 60_000);
}

#[tokio::test]
async fn penalty_outlasts_window_and_is_not_extended_by_retries() {
    let (service, clock) = service_with_clock(vec![policy("burst", 3, 10, 30)]);
    let caller = key("198.51.100.5");

    for _ in 0..3 {
        assert!(check(&service, "burst", &caller).await.allowed);
    }
    assert!(!check(&service, "burst", &caller).await.allowed);

    clock.advance_seconds(11);
    let retry = check(&service, "burst", &caller).await;
    assert!(!retry.allowed);
    assert_eq!(retry.reset_after_ms, 19_000);

    clock.advance_seconds(18);
    clock.advance_ms(999);
    let last_retry = check(&service, "burst", &caller).await;
    assert!(!last_retry.allowed);
    assert_eq!(last_retry.reset_after_ms, 1);

    clock.advance_ms(1);
    let after_penalty = check(&service, "burst", &caller).await;
    assert!(after_penalty.allowed);
    assert_eq!(after_penalty.remaining_quota, 2);
}

#[tokio::test]
async fn exactly_quota_calls_succeed_after_penalty() {
    let (service, clock) = service_with_clock(vec![policy("burst", 4, 60, 60)]);
    let caller = key("198.51.100.6");

    for cycle in 0..2 {
        for _ in 0..4 {
            assert!(check(&service, "burst", &caller).await.allowed, "cycle {cycle}");
        }
        assert!(!check(&service, "burst", &caller).await.allowed, "cycle {cycle}");
        clock.advance_seconds(60);
    }
}

#[tokio::test]
async fn penalty_shorter_than_window_starts_fresh_window() {
    let (service, clock) = service_with_clock(Vec::new());
    let caller = key("198.51.100.7");

    for _ in 0..60 {
        assert!(check(&service, "cart", &caller).await.allowed);
    }
    let denied = check(&service, "cart", &caller).await;
    assert!(!denied.allowed);
    assert_eq!(denied.reset_after_ms, 30_000);

    clock.advance_seconds(30);
    let fresh = check(&service, "cart", &caller).await;
    assert!(fresh.allowed);
    assert_eq!(fresh.remaining_quota, 59);
    assert_eq!(fresh.reset_after_ms, 60_000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simultaneous_calls_admit_exactly_quota() {
    let (service, _clock) = service_with_clock(vec![policy("burst", 25, 60, 60)]);
    let caller = key("203.0.113.50");

    let mut tasks = JoinSet::new();
    for _ in 0..50 {
        let service = service.clone();
        let caller = caller.clone();
        tasks.spawn(async move { service.check("burst", &caller).await });
    }

    let mut allowed = 0;
    let mut denied = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(decision)) if decision.allowed => allowed += 1,
            Ok(Ok(_)) => denied += 1,
            Ok(Err(error)) => panic!("admission check failed: {error}"),
            Err(error) => panic!("admission task panicked: {error}"),
        }
    }

    assert_eq!(allowed, 25);
    assert_eq!(denied, 25);
}

#[tokio::test]
async fn unreachable_store_fails_open_as_degraded() {
    let engine = AdmissionEngine::new(
        Arc::new(UnavailableCounterStore),
        Arc::new(ManualClock::new()),
    );
    let service = AdmissionService::new(registry_with(Vec::new()), engine);

    for index in 0..50 {
        let caller = key(&format!("203.0.113.{index}"));
        let decision = check(&service, "phoneVerify", &caller).await;
        assert!(decision.allowed);
        assert!(decision.degraded);
    }

    let snapshot = service.stats().snapshot();
    assert_eq!(snapshot.degraded, 50);
    assert_eq!(snapshot.allowed, 0);
}

#[tokio::test]
async fn unexpected_store_error_also_fails_open() {
    let engine = AdmissionEngine::new(
        Arc::new(CorruptCounterStore),
        Arc::new(ManualClock::new()),
    );
    let service = AdmissionService::new(registry_with(Vec::new()), engine);

    let decision = check(&service, "auth", &key("203.0.113.9")).await;
    assert!(decision.allowed && decision.degraded);
}

#[tokio::test]
async fn unknown_policy_is_an_error() {
    let (service, _clock) = service_with_clock(Vec::new());
    let result = service.check("loyalty", &key("203.0.113.9")).await;
    assert!(matches!(result, Err(AppError::PolicyNotFound(name)) if name == "loyalty"));
}

#[tokio::test]
async fn override_key_follows_resource_not_origin() {
    let (service, _clock) = service_with_clock(vec![policy("burst", 2, 60, 60)]);
    let first_origin = ClientOrigin {
        forwarded_for: Some("203.0.113.1".to_owned()),
        ..ClientOrigin::default()
    };
    let second_origin = ClientOrigin {
        forwarded_for: Some("203.0.113.2".to_owned()),
        ..ClientOrigin::default()
    };

    let shared_first = IdentityKey::resolve(&first_origin, Some("account-42"));
    let shared_second = IdentityKey::resolve(&second_origin, Some("account-42"));
    assert_eq!(check(&service, "burst", &shared_first).await.remaining_quota, 1);
    assert_eq!(check(&service, "burst", &shared_second).await.remaining_quota, 0);

    let other_first = IdentityKey::resolve(&first_origin, Some("account-7"));
    let other_second = IdentityKey::resolve(&first_origin, Some("account-8"));
    assert_eq!(check(&service, "burst", &other_first).await.remaining_quota, 1);
    assert_eq!(check(&service, "burst", &other_second).await.remaining_quota, 1);
}

#[tokio::test]
async fn policies_keep_independent_counters_for_same_key() {
    let (service, _clock) = service_with_clock(vec![policy("burst", 1, 60, 60)]);
    let caller = key("203.0.113.10");

    assert!(check(&service, "burst", &caller).await.allowed);
    assert!(!check(&service, "burst", &caller).await.allowed);
    assert!(check(&service, "auth", &caller).await.allowed);
}

#[tokio::test]
async fn auth_scenario_blocks_for_a_minute() {
    let (service, clock) = service_with_clock(Vec::new());
    let caller = IdentityKey::resolve(
        &ClientOrigin {
            peer_address: Some(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7))),
            ..ClientOrigin::default()
        },
        None,
    );
    assert_eq!(caller.as_str(), "203.0.113.7");

    let mut last = AdmissionDecision::denied(0);
    for _ in 0..20 {
        last = check(&service, "auth", &caller).await;
        assert!(last.allowed);
        clock.advance_ms(500);
    }
    assert_eq!(last.remaining_quota, 0);

    let denied = check(&service, "auth", &caller).await;
    assert!(!denied.allowed);
    assert_eq!(denied.reset_after_ms, 60_000);
    assert_eq!(denied.retry_after_seconds(), 60);

    clock.advance_seconds(61);
    let after = check(&service, "auth", &caller).await;
    assert!(after.allowed);
    assert_eq!(after.remaining_quota, 19);
}

#[tokio::test]
async fn phone_verify_scenario_ignores_origin() {
    let (service, clock) = service_with_clock(Vec::new());
    let phone = "+355691234567";

    for octet in 1..=5 {
        let origin = ClientOrigin {
            forwarded_for: Some(format!("198.51.100.{octet}")),
            ..ClientOrigin::default()
        };
        let caller = IdentityKey::resolve(&origin, Some(phone));
        let decision = check(&service, "phoneVerify", &caller).await;
        assert!(decision.allowed);
        clock.advance_ms(100);
    }

    let sixth_origin = ClientOrigin {
        forwarded_for: Some("198.51.100.6".to_owned()),
        ..ClientOrigin::default()
    };
    let denied = check(
        &service,
        "phoneVerify",
        &IdentityKey::resolve(&sixth_origin, Some(phone)),
    )
    .await;
    assert!(!denied.allowed);
    assert_eq!(denied.retry_after_seconds(), 600);
}

#[tokio::test]
async fn stats_separate_allowed_and_denied() {
    let (service, _clock) = service_with_clock(vec![policy("burst", 2, 60, 60)]);
    let caller = key("203.0.113.11");

    for _ in 0..5 {
        check(&service, "burst", &caller).await;
    }

    let snapshot = service.stats().snapshot();
    assert_eq!(snapshot.allowed, 2);
    assert_eq!(snapshot.denied, 3);
    assert_eq!(snapshot.degraded, 0);
}

#[tokio::test]
async fn late_caller_under_clock_skew_still_waits() {
    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(SkewedCounterStore {
        clock: clock.clone(),
    });
    let engine = AdmissionEngine::new(store, clock);
    let burst = policy("burst", 5, 60, 60);

    let decision = match engine.decide(&burst, &key("198.51.100.9")).await {
        Ok(decision) => decision,
        Err(error) => panic!("skewed store must still decide: {error}"),
    };

    assert!(!decision.allowed);
    assert_eq!(decision.reset_after_ms, 1);
    assert_eq!(decision.retry_after_seconds(), 1);
}
