use criterion::{
    black_box, criterion_group, criterion_main, AxisScale, Criterion, PlotConfiguration,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use junction_control::monitoring::count_sink::MemoryCountSink;
use junction_control::shared_data::{parse_observed_at, CountBatch, Direction};
use junction_control::TrafficLightController;

fn create_controller() -> Arc<TrafficLightController> {
    Arc::new(TrafficLightController::new(Arc::new(MemoryCountSink::new())))
}

fn bench_commands(c: &mut Criterion) {
    let mut group = c.benchmark_group("controller_commands");
    group.sample_size(100);
    group.measurement_time(Duration::from_secs(5));
    group.warm_up_time(Duration::from_secs(2));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Linear));

    group.bench_function("advance_full_cycle", |b| {
        let controller = create_controller();
        let _ = controller.start_timer();
        b.iter(|| {
            for d in Direction::ALL {
                black_box(controller.advance_to(d).ok());
            }
        });
    });

    group.bench_function("submit_counts", |b| {
        let controller = create_controller();
        let observed_at = parse_observed_at("2024-07-01 08:00:00").ok();
        let batch: CountBatch = Direction::ALL
            .iter()
            .enumerate()
            .map(|(i, d)| (*d, i as i64 * 3))
            .collect();
        b.iter(|| {
            if let Some(at) = observed_at {
                black_box(controller.submit_counts(&batch, at).ok());
            }
        });
    });

    group.bench_function("get_state", |b| {
        let controller = create_controller();
        let _ = controller.manual_set(Direction::East);
        b.iter(|| black_box(controller.get_state()));
    });
    group.finish();
}

fn bench_contended_commands(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_commands");
    group.sample_size(20);
    group.measurement_time(Duration::from_secs(8));
    group.warm_up_time(Duration::from_secs(2));

    // Worker threads issuing manual overrides against one controller.
    for &threads in [2usize, 4, 8].iter() {
        group.bench_function(format!("threads_{}", threads), |b| {
            let controller = create_controller();
            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|t| {
                        let controller = Arc::clone(&controller);
                        thread::spawn(move || {
                            for i in 0..100 {
                                let d = Direction::ALL[(t + i) % 4];
                                black_box(controller.manual_set(d).ok());
                                black_box(controller.get_state());
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    let _ = handle.join();
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_commands, bench_contended_commands);
criterion_main!(benches);
