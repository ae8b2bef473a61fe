#[cfg(test)]
mod tests {
    use elastic_pool::pool::{Config, TaskPoolInner};
    use std::{
        future::Future,
        sync::{
            atomic::{AtomicU64, Ordering},
            Arc,
        },
        time::{Duration, Instant},
    };

    async fn measure<F, Fut, T>(name: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let start = Instant::now();
        let result = f().await;
        let elapsed = start.elapsed();
        println!("✓ {}: {:?}", name, elapsed);
        result
    }

    async fn wait_until(deadline: Duration, cond: impl Fn() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        cond()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 16)]
    async fn load_test_1_small_fast_tasks() {
        println!("\n=== LOAD TEST 1: 10k быстрых задач ===");
        let pool = TaskPoolInner::new(8, 32);
        let counter = Arc::new(AtomicU64::new(0));

        measure("10k submit", || async {
            for _ in 0..10_000u64 {
                let counter = counter.clone();
                pool.submit(move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                })
                .await;
            }
        })
        .await;

        assert!(
            wait_until(Duration::from_secs(10), || counter.load(Ordering::Relaxed) == 10_000)
                .await,
            "исполнено только {}",
            counter.load(Ordering::Relaxed)
        );

        let metrics = pool.metrics();
        println!("  Воркеров создано: {}", metrics.workers_created);
        println!("  Утилизация: {:.1}%", metrics.utilization() * 100.0);
        pool.close();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 32)]
    async fn load_test_2_blocking_burst() {
        println!("\n=== LOAD TEST 2: 500 блокирующих задач, рост до max ===");
        let pool = TaskPoolInner::new(2, 16);
        let running = Arc::new(AtomicU64::new(0));
        let peak = Arc::new(AtomicU64::new(0));
        let done = Arc::new(AtomicU64::new(0));

        measure("500 blocking tasks", || async {
            for _ in 0..500 {
                let running = running.clone();
                let peak = peak.clone();
                let done = done.clone();
                pool.submit(move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(2));
                    running.fetch_sub(1, Ordering::SeqCst);
                    done.fetch_add(1, Ordering::SeqCst);
                })
                .await;
            }
            wait_until(Duration::from_secs(15), || done.load(Ordering::SeqCst) == 500).await
        })
        .await;

        assert_eq!(done.load(Ordering::SeqCst), 500);
        let observed = peak.load(Ordering::SeqCst);
        println!("  Пиковая параллельность: {}/16", observed);
        assert!(observed <= 16, "пик {} превысил max_limit", observed);

        // кольцо после бури не разрастается
        let idle = pool.metrics().idle_workers;
        assert!(idle <= 2, "в кольце {} воркеров", idle);
        pool.close();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 16)]
    async fn load_test_3_panic_storm() {
        println!("\n=== LOAD TEST 3: 1k задач, 10% паникуют ===");
        std::panic::set_hook(Box::new(|_| {}));

        let pool = TaskPoolInner::new(4, 8);
        let ok = Arc::new(AtomicU64::new(0));

        measure("1k tasks (10% panic)", || async {
            for i in 0..1_000u64 {
                let ok = ok.clone();
                pool.submit(move || {
                    if i % 10 == 0 {
                        panic!("intentional panic at {}", i);
                    }
                    ok.fetch_add(1, Ordering::Relaxed);
                })
                .await;
            }
        })
        .await;

        assert!(
            wait_until(Duration::from_secs(10), || {
                let m = pool.metrics();
                m.completed_tasks + m.failed_tasks == 1_000
            })
            .await,
            "дошло только {} задач",
            pool.metrics().completed_tasks + pool.metrics().failed_tasks
        );

        let metrics = pool.metrics();
        println!("  Успешно: {}", metrics.completed_tasks);
        println!("  Паник перехвачено: {}", metrics.failed_tasks);
        println!("  Success rate: {:.1}%", metrics.success_rate() * 100.0);
        assert_eq!(ok.load(Ordering::Relaxed), 900);
        assert_eq!(metrics.failed_tasks, 100);

        let _ = std::panic::take_hook();
        pool.close();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 16)]
    async fn load_test_4_concurrent_submitters() {
        println!("\n=== LOAD TEST 4: 50 конкурентных отправителей ===");
        let pool = TaskPoolInner::new(4, 16);
        let counter = Arc::new(AtomicU64::new(0));

        measure("50 x 200 submits", || async {
            let submitters: Vec<_> = (0..50)
                .map(|_| {
                    let pool = pool.clone();
                    let counter = counter.clone();
                    tokio::spawn(async move {
                        for _ in 0..200 {
                            let counter = counter.clone();
                            pool.submit(move || {
                                counter.fetch_add(1, Ordering::Relaxed);
                            })
                            .await;
                        }
                    })
                })
                .collect();
            futures::future::join_all(submitters).await
        })
        .await;

        assert!(
            wait_until(Duration::from_secs(15), || counter.load(Ordering::Relaxed) == 10_000)
                .await,
            "исполнено только {}",
            counter.load(Ordering::Relaxed)
        );
        println!("  ✓ 10000/10000 при конкурентной отправке");
        pool.close();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 32)]
    async fn load_test_5_close_under_load() {
        println!("\n=== LOAD TEST 5: close() посреди потока задач ===");
        let pool = TaskPoolInner::with_config(Config {
            min_limit: 2,
            max_limit: 8,
            func_limit: 1 << 17,
            close_grace: Duration::from_millis(200),
        });
        let counter = Arc::new(AtomicU64::new(0));

        for i in 0..2_000u64 {
            let counter = counter.clone();
            pool.submit(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            })
            .await;
            if i == 500 {
                pool.close();
            }
        }

        // дренаж дожимает всё: часть воркерами, часть напрямую
        assert!(
            wait_until(Duration::from_secs(10), || counter.load(Ordering::Relaxed) == 2_000)
                .await,
            "после close исполнено только {}",
            counter.load(Ordering::Relaxed)
        );
        assert!(
            wait_until(Duration::from_secs(5), || pool.pending_count() == 0).await,
            "pending_count не дошёл до нуля"
        );

        let metrics = pool.metrics();
        println!("  Напрямую исполнено: {}", metrics.unpooled_tasks);
        println!("  ✓ 2000/2000 задач пережили закрытие");
    }
}
