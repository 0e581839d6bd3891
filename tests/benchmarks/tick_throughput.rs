// Benchmark of a scheduler pass over a ledger full of due requests.
use std::sync::Arc;

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use timelock::{
    Clock, ExecutionCall, ExecutionError, ExecutionProcessor, ExecutionReceipt, ExecutorAdapter,
    InMemoryLedger, ManualClock, PayloadCall,
};

struct InstantRelayer;

#[async_trait]
impl ExecutorAdapter for InstantRelayer {
    async fn execute(&self, call: &ExecutionCall) -> Result<ExecutionReceipt, ExecutionError> {
        Ok(ExecutionReceipt::new(call.idempotency_key.clone()))
    }
}

async fn seeded(count: usize) -> ExecutionProcessor {
    let clock = ManualClock::default();
    let processor = ExecutionProcessor::builder(
        Arc::new(InMemoryLedger::new()),
        Arc::new(InstantRelayer),
    )
    .clock(Arc::new(clock.clone()))
    .build();

    let now = clock.now();
    for index in 0..count {
        processor
            .enqueue(
                &format!("proposal-{index}"),
                now - chrono::Duration::seconds(index as i64),
                vec![PayloadCall::new("0xgovernor", "0", "0x")],
            )
            .await
            .expect("enqueue");
    }
    processor
}

fn tick_benchmarks(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("run_tick");

    for count in [10usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter_batched(
                || runtime.block_on(seeded(count)),
                |processor| {
                    runtime.block_on(async {
                        let report = processor.run_tick().await.expect("tick");
                        black_box(report);
                    })
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, tick_benchmarks);
criterion_main!(benches);
