//! The engine facade. Jobs are submitted from async callers, registered
//! against the concurrency ceiling, then run to completion on blocking
//! worker threads. Per job, subscribers observe started, zero or more
//! progress events, then exactly one terminal event.

use std::path::PathBuf;
use std::sync::Arc;

use crossbeam::channel::Receiver;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::events::{EngineEvent, EventBus};
use crate::ops::{OperationContext, OperationHandle, OperationRegistry};
use crate::options::ConversionOptions;
use crate::pipeline::{self, MediaSelection};
use crate::probe::{self, MediaFileInfo};

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Submissions beyond this many live jobs fail with `AllocationFailed`.
    pub max_concurrent_operations: usize,
    /// Emit a progress event every this many encoded video frames.
    pub progress_interval_frames: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_operations: 4,
            progress_interval_frames: 25,
        }
    }
}

pub struct MediaEngine {
    registry: Arc<OperationRegistry>,
    events: Arc<EventBus>,
    config: EngineConfig,
}

impl MediaEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            registry: Arc::new(OperationRegistry::new(config.max_concurrent_operations)),
            events: Arc::new(EventBus::new()),
            config,
        }
    }

    /// Every subscriber sees every event from every job.
    pub fn subscribe(&self) -> Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Probe a file without registering a job; analysis is quick and not
    /// cancellable.
    pub async fn analyze(&self, input: impl Into<PathBuf>) -> Result<MediaFileInfo> {
        let input = input.into();
        run_blocking(move || probe::analyze(&input)).await
    }

    pub async fn convert(
        &self,
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        options: ConversionOptions,
    ) -> Result<PathBuf> {
        self.transcode_job("convert", input.into(), output.into(), options, MediaSelection::All)
            .await
    }

    /// Re-encode the first audio stream only; any video is dropped.
    pub async fn extract_audio(
        &self,
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        options: ConversionOptions,
    ) -> Result<PathBuf> {
        self.transcode_job(
            "extract-audio",
            input.into(),
            output.into(),
            options,
            MediaSelection::AudioOnly,
        )
        .await
    }

    /// A convert with a filter expression spliced into the video path.
    pub async fn apply_filters(
        &self,
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        filter_spec: impl Into<String>,
        mut options: ConversionOptions,
    ) -> Result<PathBuf> {
        options.filters = Some(filter_spec.into());
        self.transcode_job(
            "apply-filters",
            input.into(),
            output.into(),
            options,
            MediaSelection::All,
        )
        .await
    }

    pub async fn generate_thumbnail(
        &self,
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        time_seconds: f64,
        width: Option<u32>,
        height: Option<u32>,
    ) -> Result<PathBuf> {
        let input = input.into();
        let output = output.into();
        let id = Uuid::new_v4();
        let handle = Arc::new(OperationHandle::new(id, "thumbnail"));
        let registration = self.registry.register(Arc::clone(&handle))?;
        self.events.publish(EngineEvent::Started {
            id,
            input: input.clone(),
        });
        let result = run_blocking(move || {
            let _registration = registration;
            pipeline::generate_thumbnail(
                &input,
                &output,
                time_seconds,
                width,
                height,
                &handle.cancel_flag(),
            )
        })
        .await;
        self.publish_terminal(id, result)
    }

    pub async fn extract_frames(
        &self,
        input: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        interval_seconds: f64,
        format: impl Into<String>,
    ) -> Result<Vec<PathBuf>> {
        let input = input.into();
        let output_dir = output_dir.into();
        let format = format.into();
        let id = Uuid::new_v4();
        let handle = Arc::new(OperationHandle::new(id, "extract-frames"));
        let registration = self.registry.register(Arc::clone(&handle))?;
        self.events.publish(EngineEvent::Started {
            id,
            input: input.clone(),
        });
        let result = run_blocking(move || {
            let _registration = registration;
            pipeline::extract_frames(
                &input,
                &output_dir,
                interval_seconds,
                &format,
                &handle.cancel_flag(),
            )
        })
        .await;
        self.publish_terminal_paths(id, result)
    }

    /// Request cancellation; the job observes the flag at its next
    /// packet-loop check and emits the terminal cancelled event itself.
    pub fn cancel_operation(&self, id: Uuid) -> bool {
        self.registry.cancel(id)
    }

    pub fn cancel_all_operations(&self) {
        self.registry.cancel_all();
    }

    pub fn active_operations(&self) -> Vec<Uuid> {
        self.registry.active()
    }

    /// Drain the registry; used at shutdown after `cancel_all_operations`.
    pub async fn wait_for_all(&self) {
        self.registry.wait_for_all_async().await;
    }

    async fn transcode_job(
        &self,
        label: &'static str,
        input: PathBuf,
        output: PathBuf,
        options: ConversionOptions,
        selection: MediaSelection,
    ) -> Result<PathBuf> {
        let id = Uuid::new_v4();
        let handle = Arc::new(OperationHandle::new(id, label));
        let registration = self.registry.register(Arc::clone(&handle))?;
        let ctx = OperationContext::new(
            id,
            input.clone(),
            output,
            options,
            handle.cancel_flag(),
        );
        let events = Arc::clone(&self.events);
        let interval = self.config.progress_interval_frames;
        self.events.publish(EngineEvent::Started { id, input });
        let result = run_blocking(move || {
            let _registration = registration;
            pipeline::run_transcode(&ctx, &events, selection, interval)
        })
        .await;
        self.publish_terminal(id, result)
    }

    fn publish_terminal(&self, id: Uuid, result: Result<PathBuf>) -> Result<PathBuf> {
        match &result {
            Ok(output) => self.events.publish(EngineEvent::Completed {
                id,
                output: output.clone(),
            }),
            Err(EngineError::Cancelled) => {
                self.events.publish(EngineEvent::Cancelled { id })
            }
            Err(err) => self.events.publish(EngineEvent::Failed {
                id,
                error: err.clone(),
                message: err.to_string(),
            }),
        }
        result
    }

    fn publish_terminal_paths(&self, id: Uuid, result: Result<Vec<PathBuf>>) -> Result<Vec<PathBuf>> {
        match &result {
            Ok(paths) => self.events.publish(EngineEvent::Completed {
                id,
                // The directory's first written frame stands in for the
                // single-path event payload; the full list is the return
                // value.
                output: paths.first().cloned().unwrap_or_default(),
            }),
            Err(EngineError::Cancelled) => {
                self.events.publish(EngineEvent::Cancelled { id })
            }
            Err(err) => self.events.publish(EngineEvent::Failed {
                id,
                error: err.clone(),
                message: err.to_string(),
            }),
        }
        result
    }
}

impl Default for MediaEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

async fn run_blocking<T, F>(job: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(job).await {
        Ok(result) => result,
        Err(err) => Err(EngineError::Unknown(format!("worker thread panicked: {err}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn analyze_missing_file_fails_fast() {
        let engine = MediaEngine::default();
        let err = engine.analyze("/no/such/file.mp4").await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidFile(_)));
    }

    #[tokio::test]
    async fn convert_rejects_bad_options_without_touching_disk() {
        let engine = MediaEngine::default();
        let options = ConversionOptions {
            crf: Some(99),
            ..Default::default()
        };
        let err = engine
            .convert("/no/such/in.mp4", "/tmp/out.mp4", options)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameters(_)));
    }

    #[tokio::test]
    async fn capacity_is_enforced_per_registry() {
        let engine = MediaEngine::new(EngineConfig {
            max_concurrent_operations: 1,
            ..Default::default()
        });
        // Hold a registration slot open manually, then submit.
        let handle = Arc::new(OperationHandle::new(Uuid::new_v4(), "held"));
        let _slot = engine.registry.register(handle).unwrap();
        let err = engine
            .convert("/no/such/in.mp4", "/tmp/out.mp4", ConversionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::AllocationFailed(_)));
    }

    #[tokio::test]
    async fn terminal_event_follows_started() {
        let engine = MediaEngine::default();
        let rx = engine.subscribe();
        let _ = engine.analyze("/no/such/file.mp4").await;
        // analyze registers no job; a failing convert emits both events.
        let _ = engine
            .convert("/no/such/in.mp4", "/tmp/out.mp4", ConversionOptions::default())
            .await;
        let first = rx.try_recv().expect("started event");
        let second = rx.try_recv().expect("terminal event");
        assert!(matches!(first, EngineEvent::Started { .. }));
        assert!(matches!(second, EngineEvent::Failed { .. }));
        assert_eq!(first.job_id(), second.job_id());
    }
}
