//! Benchmarks for the orchestrator's hot pure paths.

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use prefetch_orchestrator::behavior::profile::{BehaviorAction, BehaviorProfile, Difficulty};
use prefetch_orchestrator::cache::evictor::StaleSelector;
use prefetch_orchestrator::cache::key::{KeyPattern, ResourceKey, ResourceKind};
use prefetch_orchestrator::cache::routes::{RouteParams, RouteTable};
use prefetch_orchestrator::identity::UserId;
use prefetch_orchestrator::network::monitor::{
    classify, ConnectionQuality, EffectiveType, LinkInfo, NetworkStatus,
};
use prefetch_orchestrator::pagination::SessionState;

fn bench_classification(c: &mut Criterion) {
    let statuses: Vec<NetworkStatus> = [
        EffectiveType::Slow2g,
        EffectiveType::TwoG,
        EffectiveType::ThreeG,
        EffectiveType::FourG,
    ]
    .into_iter()
    .flat_map(|t| [0.1, 1.0, 3.0, 20.0].map(|d| NetworkStatus::online(Some(LinkInfo::new(t, d)))))
    .collect();

    c.bench_function("classify_16_statuses", |b| {
        b.iter(|| {
            for status in &statuses {
                black_box(classify(black_box(status), ConnectionQuality::Slow));
            }
        })
    });
}

fn bench_profile_apply(c: &mut Criterion) {
    let actions: Vec<BehaviorAction> = (0..100)
        .map(|i| match i % 3 {
            0 => BehaviorAction::SubjectView {
                subject_id: format!("subject-{}", i % 11),
            },
            1 => BehaviorAction::TopicView {
                topic_id: format!("topic-{}", i % 17),
            },
            _ => BehaviorAction::QuizComplete {
                score: (i % 100) as f64,
                difficulty: Difficulty::Medium,
            },
        })
        .collect();

    c.bench_function("profile_apply_100_actions", |b| {
        b.iter(|| {
            let mut profile = BehaviorProfile::default();
            for action in &actions {
                profile.apply(black_box(action));
            }
            black_box(profile);
        })
    });
}

fn bench_route_resolve(c: &mut Criterion) {
    let table = RouteTable::default();
    let user = UserId::new("bench-user");
    let params = RouteParams::new();

    c.bench_function("resolve_dashboard", |b| {
        b.iter(|| black_box(table.resolve(black_box("/dashboard"), Some(&user), &params)))
    });
    c.bench_function("resolve_topic_path", |b| {
        b.iter(|| black_box(table.resolve(black_box("/subjects/42/topics/7?tab=quiz"), None, &params)))
    });
}

fn bench_stale_selection(c: &mut Criterion) {
    let selector = StaleSelector::new(Duration::from_secs(1800));
    let entries: Vec<(ResourceKey, Duration)> = (0..10_000u64)
        .map(|i| {
            (
                ResourceKey::new(ResourceKind::Topic).with("topicId", i.to_string()),
                Duration::from_secs(i % 3600),
            )
        })
        .collect();

    c.bench_function("stale_select_from_10k", |b| {
        b.iter(|| black_box(selector.select_victims(black_box(entries.iter()))))
    });
}

fn bench_pattern_match(c: &mut Criterion) {
    let user = UserId::new("alice");
    let pattern = KeyPattern::User(user.clone());
    let keys: Vec<ResourceKey> = (0..1000)
        .map(|i| {
            let owner = UserId::new(format!("user-{}", i % 10));
            ResourceKey::for_user(ResourceKind::UserStats, &owner).with("page", i.to_string())
        })
        .collect();

    c.bench_function("user_pattern_match_1k", |b| {
        b.iter(|| keys.iter().filter(|k| pattern.matches(black_box(k))).count())
    });
}

fn bench_pagination(c: &mut Criterion) {
    c.bench_function("session_100_pages", |b| {
        b.iter(|| {
            let mut session: SessionState<u32> = SessionState::new(20, 5);
            for page in 0..100u32 {
                if let Some(request) = session.begin_load() {
                    session.complete(request, Ok((page * 20..page * 20 + 20).collect()));
                }
            }
            black_box(session.items().len())
        })
    });
}

criterion_group!(
    benches,
    bench_classification,
    bench_profile_apply,
    bench_route_resolve,
    bench_stale_selection,
    bench_pattern_match,
    bench_pagination
);
criterion_main!(benches);
