use super::pool::TaskPool;
use tokio::sync::mpsc;
use tracing::trace;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Воркер: один переиспользуемый контекст исполнения со слотом на одну задачу.
///
/// id <= min_limit — воркер ядра, живёт в кольце простаивающих и
/// переиспользуется неограниченно; id > min_limit — overflow-воркер,
/// умирает после первой же задачи.
pub(crate) struct Worker {
    id: u64,
    slot: mpsc::Sender<Task>,
    // приёмная половина слота; забирается при первом запуске run-цикла
    slot_rx: Option<mpsc::Receiver<Task>>,
}

impl Worker {
    pub(crate) fn new(id: u64) -> Self {
        let (slot, slot_rx) = mpsc::channel(1);
        Worker {
            id,
            slot,
            slot_rx: Some(slot_rx),
        }
    }

    #[inline]
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    // копия для возврата в кольцо: run-цикл оставляет приёмник себе
    fn reusable(&self) -> Worker {
        Worker {
            id: self.id,
            slot: self.slot.clone(),
            slot_rx: None,
        }
    }

    /// Передаёт задачу воркеру; при первом назначении запускает run-цикл.
    pub(crate) fn assign(mut self, pool: &TaskPool, task: Task) {
        // слот ёмкостью 1 пуст, пока воркер числится простаивающим
        if let Err(rejected) = self.slot.try_send(task) {
            // воркер умер на гонке с закрытием, задача уходит напрямую
            pool.spawn_unpooled(rejected.into_inner());
            return;
        }
        if let Some(slot_rx) = self.slot_rx.take() {
            let pool = pool.clone();
            tokio::spawn(async move { self.run(pool, slot_rx).await });
        }
    }

    async fn run(self, pool: TaskPool, mut slot_rx: mpsc::Receiver<Task>) {
        trace!(id = self.id, "worker started");
        loop {
            tokio::select! {
                received = slot_rx.recv() => {
                    match received {
                        Some(task) => pool.execute_contained(task),
                        None => break,
                    }
                }
                _ = pool.cancelled() => {
                    // задача, уже положенная в слот, не должна потеряться
                    if let Ok(task) = slot_rx.try_recv() {
                        pool.spawn_unpooled(task);
                    }
                    break;
                }
            }
            // паника и нормальное завершение идут одним путём:
            // вернулись в кольцо — ждём следующую задачу, нет — умираем
            if !pool.put(self.reusable()) {
                break;
            }
        }
        trace!(id = self.id, "worker retired");
    }
}
