use criterion::{Criterion, black_box, criterion_group, criterion_main};
use hearth::lifecycle::DestructionRegistry;
use hearth::message_loop::MessageLoop;

/// Registering and running a shutdown's worth of destruction callbacks
fn benchmark_destruction_registry(c: &mut Criterion) {
    let mut group = c.benchmark_group("destruction_registry");

    for count in [16usize, 256] {
        group.bench_function(format!("run_all_{}", count), |b| {
            b.iter(|| {
                let registry = DestructionRegistry::new();
                let mut tokens = Vec::with_capacity(count);
                for i in 0..count {
                    tokens.push(registry.register(move || {
                        black_box(i);
                    }));
                }
                // Every fourth callback is cancelled before the run.
                for token in tokens.iter().step_by(4) {
                    token.unregister();
                }
                black_box(registry.run_all())
            })
        });
    }

    group.finish();
}

/// Posting tasks and draining them through the message loop
fn benchmark_loop_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("message_loop");

    group.bench_function("post_and_drain_1000", |b| {
        let mut message_loop: MessageLoop<u64> = MessageLoop::new();
        let mut counter = 0u64;
        b.iter(|| {
            for _ in 0..1000 {
                message_loop.post_task(|n: &mut u64| *n += 1);
            }
            black_box(message_loop.run_until_idle(&mut counter))
        })
    });

    group.bench_function("remote_post_and_drain_1000", |b| {
        let mut message_loop: MessageLoop<u64> = MessageLoop::new();
        let poster = message_loop.remote_poster();
        let mut counter = 0u64;
        b.iter(|| {
            for _ in 0..1000 {
                poster.post_task(|n: &mut u64| *n += 1);
            }
            black_box(message_loop.run_until_idle(&mut counter))
        })
    });

    group.finish();
}

criterion_group!(benches, benchmark_destruction_registry, benchmark_loop_dispatch);
criterion_main!(benches);
