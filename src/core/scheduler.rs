// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Task scheduler for timed operations

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

type TaskFn = Box<dyn Fn() + Send + Sync + 'static>;

const DEFAULT_RESOLUTION: Duration = Duration::from_millis(100);

struct ScheduledTask {
    name: String,
    interval: Duration,
    task: TaskFn,
    enabled: bool,
    last_run: Option<Instant>,
    runs: u64,
}

/// Named periodic tasks polled at a fixed resolution until shutdown
pub struct Scheduler {
    tasks: Arc<RwLock<HashMap<String, ScheduledTask>>>,
    resolution: Duration,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::with_resolution(DEFAULT_RESOLUTION)
    }

    pub fn with_resolution(resolution: Duration) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            resolution,
        }
    }

    pub async fn add_task<F>(&self, name: &str, interval: Duration, task: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut tasks = self.tasks.write().await;
        tasks.insert(
            name.to_string(),
            ScheduledTask {
                name: name.to_string(),
                interval,
                task: Box::new(task),
                enabled: true,
                last_run: None,
                runs: 0,
            },
        );
        debug!("Scheduled task '{}' with interval {:?}", name, interval);
    }

    pub async fn remove_task(&self, name: &str) {
        let mut tasks = self.tasks.write().await;
        tasks.remove(name);
    }

    pub async fn enable_task(&self, name: &str, enabled: bool) {
        let mut tasks = self.tasks.write().await;
        if let Some(task) = tasks.get_mut(name) {
            task.enabled = enabled;
        }
    }

    /// How many times a task has run
    pub async fn runs(&self, name: &str) -> Option<u64> {
        self.tasks.read().await.get(name).map(|t| t.runs)
    }

    pub async fn task_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tasks.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Run due tasks until `shutdown` fires
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!("Scheduler started with {} tasks", self.tasks.read().await.len());
        let mut ticker = tokio::time::interval(self.resolution);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_due(Instant::now()).await;
                }
                _ = shutdown.recv() => {
                    info!("Scheduler shutting down...");
                    break;
                }
            }
        }
    }

    async fn run_due(&self, now: Instant) -> usize {
        let mut tasks = self.tasks.write().await;
        let mut ran = 0;

        for task in tasks.values_mut() {
            if !task.enabled {
                continue;
            }
            let due = task
                .last_run
                .map_or(true, |last| now.duration_since(last) >= task.interval);
            if due {
                trace!("Running task '{}'", task.name);
                (task.task)();
                task.last_run = Some(now);
                task.runs += 1;
                ran += 1;
            }
        }

        ran
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_tasks_run_until_shutdown() {
        let scheduler = Arc::new(Scheduler::with_resolution(Duration::from_millis(5)));
        let hits = Arc::new(AtomicUsize::new(0));
        let muted = Arc::new(AtomicUsize::new(0));

        let h = hits.clone();
        scheduler
            .add_task("tick", Duration::from_millis(10), move || {
                h.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        let m = muted.clone();
        scheduler
            .add_task("muted", Duration::from_millis(10), move || {
                m.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        scheduler.enable_task("muted", false).await;

        let (tx, rx) = broadcast::channel(1);
        let runner = scheduler.clone();
        let handle = tokio::spawn(async move { runner.run(rx).await });

        tokio::time::sleep(Duration::from_millis(80)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();

        assert!(hits.load(Ordering::SeqCst) >= 2);
        assert_eq!(muted.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.runs("muted").await, Some(0));
    }

    #[tokio::test]
    async fn test_run_due_respects_interval() {
        let scheduler = Scheduler::new();
        scheduler.add_task("slow", Duration::from_secs(60), || {}).await;
        scheduler.add_task("other", Duration::from_secs(60), || {}).await;

        let start = Instant::now();
        assert_eq!(scheduler.run_due(start).await, 2);
        assert_eq!(scheduler.run_due(start + Duration::from_secs(1)).await, 0);
        assert_eq!(scheduler.run_due(start + Duration::from_secs(61)).await, 2);

        scheduler.remove_task("other").await;
        assert_eq!(scheduler.task_names().await, vec!["slow".to_string()]);
    }
}
