#[derive(Debug, Clone)]
pub struct PoolMetrics {
    pub active_workers: u64,
    pub idle_workers: u64,
    pub pending_tasks: u64,
    pub workers_created: u64,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    pub unpooled_tasks: u64,
}

impl PoolMetrics {
    pub fn utilization(&self) -> f64 {
        if self.active_workers + self.idle_workers == 0 {
            return 0.0;
        }
        self.active_workers as f64 / (self.active_workers + self.idle_workers) as f64
    }

    pub fn queue_pressure(&self) -> f64 {
        self.pending_tasks as f64
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.completed_tasks + self.failed_tasks;
        if total == 0 {
            return 1.0;
        }
        self.completed_tasks as f64 / total as f64
    }
}
