//! Running one submitted URL as a tracked task.

use std::sync::Arc;

use crate::pipeline::DownloadBackend;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::registry::{TaskId, TaskRegistry, TaskUpdate};

/// Routes a worker's progress events to its registry record.
#[derive(Clone)]
pub struct TaskContext {
    pub id: TaskId,
    pub registry: Arc<TaskRegistry>,
}

impl TaskContext {
    pub fn new(id: TaskId, registry: Arc<TaskRegistry>) -> Self {
        Self { id, registry }
    }
}

impl ProgressSink for TaskContext {
    fn on_progress(&self, event: &ProgressEvent) {
        tracing::trace!(
            task_id = %self.id,
            percent = event.percent(),
            speed = event.speed_or_unknown(),
            eta = event.eta_or_unknown(),
            "progress"
        );
        self.registry
            .update(&self.id, TaskUpdate::Progress(event.clone()));
    }
}

/// Runs `url` through `backend` and records the terminal state. Blocking.
pub fn execute(backend: &dyn DownloadBackend, ctx: &TaskContext, url: &str) {
    let span = tracing::info_span!("task", task_id = %ctx.id, backend = backend.name());
    let _guard = span.enter();
    tracing::info!(url, "task started");
    match backend.run(url, ctx) {
        Ok(summary) => {
            tracing::info!(
                outputs = summary.outputs.len(),
                failures = summary.failures,
                "task finished"
            );
            ctx.registry.update(&ctx.id, TaskUpdate::Finished);
        }
        Err(e) => {
            tracing::error!(error = %e, "task failed");
            ctx.registry.update(&ctx.id, TaskUpdate::Failed(e.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::CandidateScanner;
    use crate::encoder::Encoder;
    use crate::fetch::testing::MockFetcher;
    use crate::fetch::Fetcher;
    use crate::orchestrator::testing::{FailingEncoder, FakeEncoder};
    use crate::orchestrator::{DownloadOrchestrator, SCRATCH_PREFIX};
    use crate::pipeline::Pipeline;
    use crate::registry::{task_id_for, TaskStatus};
    use crate::resolver::StreamResolver;
    use std::path::Path;

    const PAGE: &str = "https://site.example/watch/42";

    fn pipeline(fetcher: MockFetcher, encoder: Arc<dyn Encoder>, dir: &Path) -> Pipeline {
        let fetcher: Arc<dyn Fetcher> = Arc::new(fetcher);
        let resolver = StreamResolver::with_default_order(fetcher.clone());
        let orchestrator = DownloadOrchestrator::new(fetcher.clone(), resolver, encoder, None, None);
        Pipeline::new(fetcher, CandidateScanner::default(), orchestrator, dir.to_path_buf())
    }

    fn submit(registry: &Arc<TaskRegistry>, url: &str) -> TaskContext {
        let id = task_id_for(url);
        registry.create(&id);
        TaskContext::new(id, Arc::clone(registry))
    }

    #[test]
    fn successful_run_finishes_at_100_with_file_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = MockFetcher::new().with(
            PAGE,
            r#"<iframe src="https://player.example/e?src=https://cdn.example/s.m3u8&t=Episode 42"></iframe>"#,
        );
        let p = pipeline(fetcher, Arc::new(FakeEncoder::default()), dir.path());
        let registry = Arc::new(TaskRegistry::new());
        let ctx = submit(&registry, PAGE);

        assert_eq!(registry.get(&ctx.id).status, TaskStatus::Pending);
        execute(&p, &ctx, PAGE);

        let task = registry.get(&ctx.id);
        assert_eq!(task.status, TaskStatus::Finished);
        assert_eq!(task.progress, 100.0);
        assert!(dir.path().join("Episode 42.mp4").is_file());
    }

    #[test]
    fn failing_encoder_ends_in_error_without_scratch() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = MockFetcher::new().with(PAGE, r#"<video src="/hls/master.m3u8"></video>"#);
        let p = pipeline(fetcher, Arc::new(FailingEncoder), dir.path());
        let registry = Arc::new(TaskRegistry::new());
        let ctx = submit(&registry, PAGE);

        execute(&p, &ctx, PAGE);

        let task = registry.get(&ctx.id);
        assert_eq!(task.status, TaskStatus::Error);
        assert!(!task.error.unwrap_or_default().is_empty());
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(SCRATCH_PREFIX))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn scheme_relative_video_is_downloaded_by_path_name() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = MockFetcher::new()
            .with(PAGE, r#"<video src="//cdn.example/v.mp4"></video>"#)
            .with("https://cdn.example/v.mp4", "mp4 bytes");
        let p = pipeline(fetcher, Arc::new(FakeEncoder::default()), dir.path());
        let registry = Arc::new(TaskRegistry::new());
        let ctx = submit(&registry, PAGE);

        execute(&p, &ctx, PAGE);

        assert_eq!(registry.get(&ctx.id).status, TaskStatus::Finished);
        assert_eq!(std::fs::read(dir.path().join("v.mp4")).unwrap(), b"mp4 bytes");
    }

    #[test]
    fn page_without_media_reports_extraction_miss() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = MockFetcher::new().with(PAGE, "<p>text only</p>");
        let p = pipeline(fetcher, Arc::new(FakeEncoder::default()), dir.path());
        let registry = Arc::new(TaskRegistry::new());
        let ctx = submit(&registry, PAGE);

        execute(&p, &ctx, PAGE);

        let task = registry.get(&ctx.id);
        assert_eq!(task.status, TaskStatus::Error);
        assert_eq!(task.error.as_deref(), Some("no media candidates found"));
    }

    #[test]
    fn resubmission_maps_to_the_same_task() {
        let registry = Arc::new(TaskRegistry::new());
        let a = submit(&registry, PAGE);
        registry.update(&a.id, TaskUpdate::Failed("old".into()));
        let b = submit(&registry, PAGE);
        assert_eq!(a.id, b.id);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&b.id).status, TaskStatus::Pending);
    }
}
