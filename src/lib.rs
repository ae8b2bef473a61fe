//! Эластичный пул исполнения задач поверх tokio
//!
//! # Features
//! - Два яруса воркеров: постоянное ядро и одноразовые overflow-воркеры
//! - Единственный диспетчер-лидер, избираемый через try-lock
//! - Backpressure через ограниченную очередь отправки
//! - Идемпотентное закрытие с дренажем очереди и прямым запуском остатка
//! - Изоляция паник на границе воркера
//! - Метрики пула

pub mod errors;
pub mod model;
pub mod pool;
pub mod worker;

pub use pool::{Config, TaskPool, TaskPoolInner};
