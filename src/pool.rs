use super::{
    errors::TaskError,
    model::PoolMetrics,
    worker::{Task, Worker},
};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use crossbeam::queue::ArrayQueue;
use tokio::{
    sync::{mpsc, Mutex, Notify, OwnedMutexGuard},
    time::Duration,
};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, trace, warn};

/// Конфигурация пула задач
#[derive(Debug, Clone)]
pub struct Config {
    /// Размер постоянного ядра: столько воркеров переиспользуются бессрочно
    pub min_limit: u64,
    /// Потолок одновременно живых воркеров (клэмпится вверх до min_limit)
    pub max_limit: u64,
    /// Ёмкость очереди отправки
    pub func_limit: usize,
    /// Сколько ждать после close() перед принудительным дренажем очереди
    pub close_grace: Duration,
}

impl Default for Config {
    fn default() -> Self {
        let num_cpus = num_cpus::get() as u64;
        Self {
            min_limit: num_cpus,
            max_limit: num_cpus * 2,
            func_limit: 1 << 17,
            close_grace: Duration::from_secs(5),
        }
    }
}

impl Config {
    fn normalized(mut self) -> Self {
        // max_limit < min_limit — не ошибка, молча поднимаем до min_limit
        if self.max_limit < self.min_limit {
            self.max_limit = self.min_limit;
        }
        self
    }
}

pub type TaskPool = Arc<TaskPoolInner>;

/// Эластичный пул: мультиплексирует поток задач на небольшой набор
/// переиспользуемых воркеров, растёт до max_limit под нагрузкой и после
/// закрытия деградирует до прямого запуска задач.
pub struct TaskPoolInner {
    min_limit: u64,
    max_limit: u64,
    queue_tx: mpsc::Sender<Task>,
    // приёмник очереди и есть лидерство диспетчера: кто взял try-lock,
    // тот и разгребает очередь
    leader: Arc<Mutex<mpsc::Receiver<Task>>>,
    // кольцо простаивающих воркеров ядра
    ring: ArrayQueue<Worker>,
    ring_notify: Notify,
    cancel: CancellationToken,
    active_count: AtomicU64,
    next_worker_id: AtomicU64,
    pending_count: AtomicU64,
    completed_tasks: AtomicU64,
    failed_tasks: AtomicU64,
    unpooled_tasks: AtomicU64,
    closed: AtomicBool,
    unpooled: AtomicBool,
    close_grace: Duration,
}

impl TaskPoolInner {
    pub fn new(min_limit: u64, max_limit: u64) -> TaskPool {
        Self::with_queue_limit(min_limit, max_limit, 1 << 17)
    }

    pub fn with_queue_limit(min_limit: u64, max_limit: u64, func_limit: usize) -> TaskPool {
        Self::with_config(Config {
            min_limit,
            max_limit,
            func_limit,
            ..Default::default()
        })
    }

    pub fn with_config(config: Config) -> TaskPool {
        let config = config.normalized();
        let (queue_tx, queue_rx) = mpsc::channel(config.func_limit.max(1));
        Arc::new(TaskPoolInner {
            min_limit: config.min_limit,
            max_limit: config.max_limit,
            queue_tx,
            leader: Arc::new(Mutex::new(queue_rx)),
            // при min_limit = 0 кольцо не используется вовсе
            ring: ArrayQueue::new(config.min_limit.max(1) as usize),
            ring_notify: Notify::new(),
            cancel: CancellationToken::new(),
            active_count: AtomicU64::new(0),
            next_worker_id: AtomicU64::new(0),
            pending_count: AtomicU64::new(0),
            completed_tasks: AtomicU64::new(0),
            failed_tasks: AtomicU64::new(0),
            unpooled_tasks: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            unpooled: AtomicBool::new(false),
            close_grace: config.close_grace,
        })
    }

    /// Ставит задачу в очередь и при необходимости избирает диспетчера.
    ///
    /// Подвисает только на переполненной очереди (backpressure). После
    /// close() задача запускается напрямую, минуя учёт пула.
    pub async fn submit<F>(self: &Arc<Self>, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_closed() {
            self.spawn_unpooled(Box::new(f));
            return;
        }
        match self.queue_tx.reserve().await {
            Ok(permit) => {
                // инкремент строго до send: диспетчер декрементирует
                // только после фактического приёма задачи
                self.pending_count.fetch_add(1, Ordering::AcqRel);
                permit.send(Box::new(f));
                if let Ok(queue_rx) = self.leader.clone().try_lock_owned() {
                    let pool = self.clone();
                    tokio::spawn(async move { pool.dispatch(queue_rx).await });
                }
                // try-lock не взялся — лидер уже работает и подберёт задачу
            }
            Err(_) => {
                // очередь уже демонтирована дренажем закрытия
                trace!(fault = ?TaskError::QueueClosed, "late submit, direct spawn");
                self.spawn_unpooled(Box::new(f));
            }
        }
    }

    /// Сколько задач отправлено, но ещё не подобрано воркерами (advisory).
    #[inline]
    pub fn pending_count(&self) -> u64 {
        self.pending_count.load(Ordering::Acquire)
    }

    /// Принудительный прямой запуск всех последующих задач без воркеров.
    /// Удобно для слива нагрузки без полного закрытия.
    #[inline]
    pub fn set_unpooled(&self, flag: bool) {
        self.unpooled.store(flag, Ordering::Release);
    }

    /// Идемпотентное закрытие: будит ждущих воркеров, после паузы
    /// close_grace дожимает очередь прямыми запусками и разбирает кольцо.
    pub fn close(self: &Arc<Self>) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        debug!("closing task pool");
        self.cancel.cancel();
        let pool = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(pool.close_grace).await;
            pool.drain().await;
        });
    }

    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            active_workers: self.active_count.load(Ordering::Relaxed),
            idle_workers: self.ring.len() as u64,
            pending_tasks: self.pending_count.load(Ordering::Relaxed),
            workers_created: self.next_worker_id.load(Ordering::Relaxed),
            completed_tasks: self.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: self.failed_tasks.load(Ordering::Relaxed),
            unpooled_tasks: self.unpooled_tasks.load(Ordering::Relaxed),
        }
    }

    // Цикл диспетчера. Живёт, пока pending_count не дойдёт до нуля,
    // затем отпускает лидерство; следующий submit изберёт нового лидера.
    async fn dispatch(self: Arc<Self>, mut queue_rx: OwnedMutexGuard<mpsc::Receiver<Task>>) {
        while let Some(task) = queue_rx.recv().await {
            self.route(task).await;
            if self.pending_count.fetch_sub(1, Ordering::AcqRel) <= 1 {
                // лидерство сдаётся только при доказуемо пустой очереди:
                // submit мог проскочить между нашим декрементом и
                // отпусканием замка
                while let Ok(task) = queue_rx.try_recv() {
                    self.route(task).await;
                    self.pending_count.fetch_sub(1, Ordering::AcqRel);
                }
                break;
            }
        }
    }

    async fn route(self: &Arc<Self>, task: Task) {
        if self.is_closed() || self.unpooled.load(Ordering::Acquire) {
            self.spawn_unpooled(task);
        } else {
            match self.admit().await {
                Some(worker) => worker.assign(self, task),
                // пул закрылся, пока ждали свободного воркера
                None => self.spawn_unpooled(task),
            }
        }
    }

    // Политика допуска, строго по порядку:
    //   1) есть запас до max_limit — чистый рост, новый overflow-воркер;
    //   2) аллокатор id уже перевалил за min_limit — только заём из кольца;
    //   3) ядро ещё не добрано — новый воркер ядра;
    //   4) иначе заём из кольца.
    // Overflow-воркеры никогда не переиспользуются: рост всегда создаёт
    // свежий воркер, в кольцо возвращается только ядро.
    async fn admit(&self) -> Option<Worker> {
        let count = self.active_count.fetch_add(1, Ordering::AcqRel) + 1;
        let worker = if count > self.min_limit && count <= self.max_limit {
            Some(self.spawn_worker())
        } else if self.next_worker_id.load(Ordering::Acquire) > self.min_limit {
            self.borrow_idle().await
        } else {
            let id = self.next_worker_id.fetch_add(1, Ordering::AcqRel) + 1;
            if id <= self.min_limit {
                Some(Worker::new(id))
            } else {
                // id сгорел: пул навсегда переходит в режим займа
                self.borrow_idle().await
            }
        };
        if worker.is_none() {
            // заём сорвался на закрытии — возвращаем учёт
            self.active_count.fetch_sub(1, Ordering::AcqRel);
        }
        worker
    }

    fn spawn_worker(&self) -> Worker {
        let id = self.next_worker_id.fetch_add(1, Ordering::AcqRel) + 1;
        trace!(id, "worker created");
        Worker::new(id)
    }

    // Заём воркера ядра; подвисает на пустом кольце до возврата
    // какого-нибудь воркера либо до сигнала закрытия.
    async fn borrow_idle(&self) -> Option<Worker> {
        loop {
            if let Some(worker) = self.ring.pop() {
                return Some(worker);
            }
            if self.is_closed() {
                return None;
            }
            tokio::select! {
                _ = self.ring_notify.notified() => {}
                _ = self.cancel.cancelled() => return None,
            }
        }
    }

    /// Самовозврат воркера. Успех — только для воркера ядра в открытом
    /// пуле; во всех остальных случаях воркеру пора умирать.
    pub(crate) fn put(&self, worker: Worker) -> bool {
        self.active_count.fetch_sub(1, Ordering::AcqRel);
        if worker.id() <= self.min_limit && !self.is_closed() && self.ring.push(worker).is_ok() {
            self.ring_notify.notify_one();
            return true;
        }
        false
    }

    // Прямой запуск вне пула: отдельная tokio-задача, без воркеров и
    // без допуска, но с той же изоляцией паник.
    pub(crate) fn spawn_unpooled(self: &Arc<Self>, task: Task) {
        self.unpooled_tasks.fetch_add(1, Ordering::Relaxed);
        let pool = self.clone();
        tokio::spawn(async move {
            pool.execute_contained(task);
        });
    }

    /// Запускает задачу, удерживая панику на границе исполнения.
    pub(crate) fn execute_contained(&self, task: Task) {
        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(task)) {
            Ok(()) => {
                self.completed_tasks.fetch_add(1, Ordering::Relaxed);
            }
            Err(payload) => {
                self.failed_tasks.fetch_add(1, Ordering::Relaxed);
                warn!(fault = ?TaskError::from_panic(payload), "task panicked");
            }
        }
    }

    #[inline]
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    // Финал закрытия: забираем лидерство блокирующе (это путь
    // завершения, не submit), демонтируем очередь, остаток задач
    // дожимаем прямыми запусками и разбираем кольцо.
    async fn drain(self: Arc<Self>) {
        let mut queue_rx = self.leader.clone().lock_owned().await;
        queue_rx.close();
        let mut leftover = 0u64;
        while let Some(task) = queue_rx.recv().await {
            self.pending_count.fetch_sub(1, Ordering::AcqRel);
            self.spawn_unpooled(task);
            leftover += 1;
        }
        while self.ring.pop().is_some() {}
        debug!(leftover, "task pool drained");
    }
}
