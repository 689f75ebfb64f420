use criterion::{black_box, criterion_group, criterion_main, Criterion};

use gradeforge_core::records::{Assignment, Question};
use gradeforge_core::rubric::build_rubric;
use gradeforge_core::statistics::{compare, fairness};

fn scores(n: usize) -> Vec<f64> {
    (0..n).map(|i| 40.0 + (i * 37 % 61) as f64).collect()
}

fn bench_fairness(c: &mut Criterion) {
    let mut group = c.benchmark_group("fairness");

    for n in [10usize, 100, 1000] {
        let batch = scores(n);
        group.bench_function(format!("n={n}"), |b| b.iter(|| fairness(black_box(&batch))));
    }

    group.finish();
}

fn bench_compare(c: &mut Criterion) {
    let mut group = c.benchmark_group("compare");

    for n in [10usize, 100, 500] {
        let batch: Vec<(String, f64)> = scores(n)
            .into_iter()
            .enumerate()
            .map(|(i, s)| (format!("sub-{i}"), s))
            .collect();
        group.bench_function(format!("n={n}"), |b| b.iter(|| compare(black_box(&batch))));
    }

    group.finish();
}

fn bench_build_rubric(c: &mut Criterion) {
    let assignment = Assignment::new(
        "Bench",
        (0..40)
            .map(|i| {
                Question::from_text(format!(
                    "Explain the consequences of design decision {i} in detail"
                ))
            })
            .collect(),
    );

    c.bench_function("build_rubric_40_questions", |b| {
        b.iter(|| build_rubric(black_box(&assignment)))
    });
}

criterion_group!(benches, bench_fairness, bench_compare, bench_build_rubric);
criterion_main!(benches);
