// Benchmarks for the per-frame hot paths: advancing a busy population and
// churning tenants through the buildings.

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};

use skyline_protocol::message::{
    BuildingEvent, BuildingRecord, BuildingsPayload, EmploymentFlag, InboundMessage, PersonRecord,
    SetupPayload, TenantRecord,
};
use skyline_sim::types::{BuildingId, PersonId, TenantId};
use skyline_sim::{EventReconciler, MirrorConfig, NullSurface};

fn bootstrapped(population: u64) -> EventReconciler<NullSurface> {
    let config = MirrorConfig {
        rows: 12,
        cols: 12,
        ..MirrorConfig::default()
    };
    let sites = u64::from(config.rows * config.cols);
    let mut mirror = EventReconciler::new(config, NullSurface);
    mirror.apply(InboundMessage::Setup(SetupPayload {
        population: (0..population)
            .map(|i| PersonRecord {
                id: PersonId::from(i),
                race: (i % 4) as u32,
                employed: EmploymentFlag::Flag(i % 3 != 0),
                firm_owner: false,
            })
            .collect(),
        buildings: (0..sites)
            .map(|i| BuildingRecord {
                id: BuildingId::from(i),
            })
            .collect(),
    }));
    // Everyone is on screen once the jitter window has passed.
    mirror.advance_to(5_000);
    mirror
}

fn bench_frames(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_tick");
    for population in [100u64, 1_000, 5_000] {
        group.bench_function(format!("pop{population}_30_frames"), |b| {
            b.iter_batched(
                || bootstrapped(population),
                |mut mirror| {
                    let target = mirror.now_ms() + 1_000;
                    mirror.advance_to(target)
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_tenant_churn(c: &mut Criterion) {
    let message = |building: u64, tenant: u64, event: BuildingEvent| {
        InboundMessage::Buildings(BuildingsPayload {
            id: BuildingId::from(building),
            event,
            tenant: TenantRecord {
                id: TenantId::from(tenant),
                type_name: Some("ConsumerGoodFirm".to_owned()),
            },
        })
    };
    c.bench_function("tenant_churn_full_stacks", |b| {
        b.iter_batched(
            || {
                let mut mirror = bootstrapped(0);
                for building in 0..144 {
                    for tenant in 0..10 {
                        mirror.apply(message(building, tenant, BuildingEvent::AddedTenant));
                    }
                }
                mirror
            },
            |mut mirror| {
                // Remove from the bottom so every removal rebuilds a full stack.
                for building in 0..144 {
                    mirror.apply(message(building, 0, BuildingEvent::RemovedTenant));
                    mirror.apply(message(building, 0, BuildingEvent::AddedTenant));
                }
                mirror
            },
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(benches, bench_frames, bench_tenant_churn);
criterion_main!(benches);
