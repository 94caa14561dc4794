//! Rate-limited progress reporting.
//!
//! Stages push raw [`ProgressTick`]s through a [`ProgressSender`]; a worker
//! task coalesces them through a watch channel and, at most once per
//! interval, persists the overall percentage, broadcasts a progress event
//! and edits the status message. The status sink is best-effort: failures
//! are logged and dropped.

use std::sync::Arc;
use std::time::Duration;

use mf_core::events::{EventBus, EventCategory, EventPayload};
use mf_core::{Stage, TaskId, TaskStore};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::context::{ProgressSender, ProgressTick, ProgressUnit};
use crate::endpoint::{MessagingEndpoint, StatusRef};

const BAR_CELLS: usize = 10;

#[derive(Debug, Clone)]
struct Snapshot {
    stage: Stage,
    label: String,
    tick: ProgressTick,
    /// Which of `parts` equal slices of the stage this tick belongs to.
    part: usize,
    parts: usize,
    stage_started: Instant,
}

impl Snapshot {
    /// Completed fraction of the whole stage.
    fn stage_fraction(&self) -> f64 {
        let parts = self.parts.max(1) as f64;
        let within = self.tick.fraction().unwrap_or(0.0);
        ((self.part as f64 + within) / parts).clamp(0.0, 1.0)
    }
}

/// Where progress ends up.
struct Target {
    task_id: TaskId,
    tasks: Arc<dyn TaskStore>,
    events: Arc<EventBus>,
    sink: Arc<dyn MessagingEndpoint>,
    status: Option<StatusRef>,
}

impl Target {
    async fn emit(&self, snapshot: &Snapshot) {
        let (start, end) = snapshot.stage.progress_band();
        let overall = start + (end - start) * snapshot.stage_fraction() as f32;

        if let Err(e) = self.tasks.update_progress(self.task_id, overall) {
            tracing::warn!(task_id = %self.task_id, "failed to persist progress: {e}");
        }
        self.events.broadcast(
            EventCategory::User,
            EventPayload::TaskProgress {
                task_id: self.task_id,
                stage: snapshot.stage,
                progress: overall,
            },
        );

        let text = render_status(
            &snapshot.label,
            &snapshot.tick,
            snapshot.stage_started.elapsed(),
        );
        self.update_status(&text).await;
    }

    async fn update_status(&self, text: &str) {
        let Some(ref status) = self.status else {
            return;
        };
        if let Err(e) = self.sink.update_status(status, text).await {
            tracing::warn!(task_id = %self.task_id, "status update failed: {e}");
        }
    }
}

/// Per-task progress reporter.
pub struct ProgressReporter {
    tx: Arc<watch::Sender<Option<Snapshot>>>,
    worker: JoinHandle<()>,
    target: Arc<Target>,
}

impl ProgressReporter {
    /// Spawn the reporter worker. Must be called inside a tokio runtime.
    pub fn start(
        task_id: TaskId,
        tasks: Arc<dyn TaskStore>,
        events: Arc<EventBus>,
        sink: Arc<dyn MessagingEndpoint>,
        status: Option<StatusRef>,
        interval: Duration,
    ) -> Self {
        let (tx, rx) = watch::channel(None);
        let target = Arc::new(Target {
            task_id,
            tasks,
            events,
            sink,
            status,
        });
        let worker = tokio::spawn(run_worker(rx, target.clone(), interval));
        Self {
            tx: Arc::new(tx),
            worker,
            target,
        }
    }

    /// A sender for one stage. `label` heads every status update it causes.
    pub fn sender(&self, stage: Stage, label: impl Into<String>) -> ProgressSender {
        self.part_sender(stage, label, 0, 1)
    }

    /// A sender for slice `part` of `parts` equal slices of a stage, so that
    /// several sequential transfers add up to one stage without the overall
    /// percentage going backwards.
    pub fn part_sender(
        &self,
        stage: Stage,
        label: impl Into<String>,
        part: usize,
        parts: usize,
    ) -> ProgressSender {
        let tx = self.tx.clone();
        let label = label.into();
        let stage_started = Instant::now();
        ProgressSender::new(move |tick| {
            tx.send_replace(Some(Snapshot {
                stage,
                label: label.clone(),
                tick,
                part,
                parts,
                stage_started,
            }));
        })
    }

    /// Edit the status message right away, outside the rate limit.
    pub async fn announce(&self, text: &str) {
        self.target.update_status(text).await;
    }

    /// Stop the worker and write `text` as the final status. Always emitted.
    pub async fn finish(self, text: &str) {
        self.worker.abort();
        self.target.update_status(text).await;
    }
}

async fn run_worker(
    mut rx: watch::Receiver<Option<Snapshot>>,
    target: Arc<Target>,
    interval: Duration,
) {
    let mut last_emit: Option<Instant> = None;
    while rx.changed().await.is_ok() {
        if let Some(last) = last_emit {
            tokio::time::sleep_until(last + interval).await;
        }
        let snapshot = rx.borrow_and_update().clone();
        if let Some(snapshot) = snapshot {
            target.emit(&snapshot).await;
            last_emit = Some(Instant::now());
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Human-readable size with two decimals (`1.50 MB`).
pub fn format_size(bytes: f64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes.max(0.0);
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

/// Compact duration: `45s`, `3m 20s`, `2h 5m`.
pub fn format_time(secs: f64) -> String {
    let total = if secs.is_finite() { secs.max(0.0) as u64 } else { 0 };
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}h {m}m")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}

/// Ten-cell bar for a 0.0 to 1.0 fraction.
pub fn progress_bar(fraction: f64) -> String {
    let filled = ((fraction.clamp(0.0, 1.0) * BAR_CELLS as f64).floor()) as usize;
    format!("{}{}", "█".repeat(filled), "░".repeat(BAR_CELLS - filled))
}

/// Status text for one snapshot.
pub fn render_status(label: &str, tick: &ProgressTick, elapsed: Duration) -> String {
    let elapsed_secs = elapsed.as_secs_f64();
    let rate = if elapsed_secs > 0.0 {
        tick.done / elapsed_secs
    } else {
        0.0
    };

    let (done, total, speed) = match tick.unit {
        ProgressUnit::Bytes => (
            format_size(tick.done),
            tick.total.map(format_size),
            format!("{}/s", format_size(rate)),
        ),
        ProgressUnit::Seconds => (
            format_time(tick.done),
            tick.total.map(format_time),
            format!("{rate:.2}x"),
        ),
    };

    let Some(fraction) = tick.fraction() else {
        return format!("{label}\n{done} processed | Speed: {speed}");
    };

    let eta = match tick.total {
        Some(total) if rate > 0.0 => format_time((total - tick.done).max(0.0) / rate),
        _ => "-".to_string(),
    };

    format!(
        "{label}\n[{}] {:.1}%\n{done} / {}\nSpeed: {speed} | ETA: {eta}",
        progress_bar(fraction),
        fraction * 100.0,
        total.unwrap_or_default(),
    )
}
