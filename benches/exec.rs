use cindr::commands::{dispatch, Ctx};
use cindr::config::Config;
use cindr::server::Server;
use cindr::session::Session;
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

fn argv(parts: &[&str]) -> Vec<Vec<u8>> {
    parts.iter().map(|p| p.as_bytes().to_vec()).collect()
}

fn bench_exec_set_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("exec");
    group.bench_function("set_get", |b| {
        b.iter_batched(
            || {
                let server = Server::new(Config::new());
                let session = Session::new(1, "bench".into(), false, 0);
                (server, session)
            },
            |(server, mut session)| {
                for i in 0..1000u32 {
                    let k = format!("k{}", i);
                    let v = format!("v{}", i);
                    let mut ctx = Ctx::new(&server, &mut session);
                    let _ = dispatch(&mut ctx, &argv(&["set", &k, &v]));
                    let mut ctx = Ctx::new(&server, &mut session);
                    let _ = dispatch(&mut ctx, &argv(&["get", &k]));
                }
                black_box(session.id)
            },
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

criterion_group!(benches, bench_exec_set_get);
criterion_main!(benches);
