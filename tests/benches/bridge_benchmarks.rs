//! # Event Bus Bridge Benchmarks
//!
//! Every inbound frame and every outbound push is matched against a rule
//! list, so matching sits on the hot path of the bridge.
//!
//! | Operation | Target |
//! |-----------|--------|
//! | First-match over 100 literal rules | < 10µs |
//! | Regex rule with a warm pattern cache | < 1µs |
//! | Structural match, nested predicate | < 1µs |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use eventbus_bridge::permission::{evaluate_rules, structure_matches, PatternCache};
use eventbus_bridge::PermittedOptions;
use serde_json::json;

// ============================================================================
// Rule list evaluation
// ============================================================================

fn bench_rule_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("permission-rules");
    let patterns = PatternCache::new();
    let body = json!({"kind": "quote"});

    for size in [1usize, 10, 100] {
        let rules: Vec<PermittedOptions> = (0..size)
            .map(|i| PermittedOptions::new().address(format!("service.{i}")))
            .collect();
        // Worst case: the only match is the last rule
        let last = format!("service.{}", size - 1);

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("literal_last_match", size), &rules, |b, rules| {
            b.iter(|| black_box(evaluate_rules(rules, &patterns, &last, Some(&body))))
        });
    }

    let regex_rules = vec![PermittedOptions::new().address_regex("news\\.[a-z]{2}\\..+")];
    group.bench_function("regex_warm_cache", |b| {
        b.iter(|| {
            black_box(evaluate_rules(
                &regex_rules,
                &patterns,
                "news.uk.politics",
                Some(&body),
            ))
        })
    });

    group.finish();
}

// ============================================================================
// Structural match
// ============================================================================

fn bench_structure_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("structure-match");

    let predicate = json!({"order": {"side": "buy", "venue": {"region": "eu"}}});
    let body = json!({
        "order": {
            "id": 991,
            "side": "buy",
            "qty": 50,
            "venue": {"region": "eu", "name": "xetra"}
        },
        "trace": [1, 2, 3]
    });

    group.bench_function("nested_predicate", |b| {
        b.iter(|| black_box(structure_matches(Some(&predicate), Some(&body))))
    });

    let empty = json!({});
    group.bench_function("empty_predicate", |b| {
        b.iter(|| black_box(structure_matches(Some(&empty), Some(&body))))
    });

    group.finish();
}

criterion_group!(benches, bench_rule_evaluation, bench_structure_match);
criterion_main!(benches);
