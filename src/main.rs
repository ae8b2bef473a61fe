use elastic_pool::TaskPoolInner;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::{Duration, Instant};
use tokio::runtime::Builder;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let rt = Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .enable_all()
        .build()
        .unwrap();

    rt.block_on(async {
        let now = Instant::now();
        let pool = TaskPoolInner::new(100, 200);
        let done = Arc::new(AtomicU64::new(0));

        let total = 1_000_000u64;
        for _ in 0..total {
            let done = done.clone();
            pool.submit(move || {
                done.fetch_add(1, Ordering::Relaxed);
            })
            .await;
        }

        while done.load(Ordering::Relaxed) < total {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        pool.close();

        println!("elapsed: {:?}", now.elapsed());
        println!("metrics: {:?}", pool.metrics());
    });
}
