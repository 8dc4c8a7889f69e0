use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::common::{FrameSource, SourceState};
use crate::config::Configuration;
use crate::error::AppError;
use crate::pipeline::context::FrameAnalysis;
use crate::pipeline::orchestration::AnalysisSession;
use crate::pipeline::services::inference::ModelLoader;

/// Drives the analysis session from a frame source on a fixed cadence.
///
/// Each tick captures at most one frame and runs it through the session.
/// Results go to a bounded channel; when the consumer lags, newer results
/// are dropped rather than stalling the loop.
pub struct Coordinator {
    analysis_task: Option<JoinHandle<AnalysisSession>>,
    cancel_token: CancellationToken,
    results: Option<Receiver<Arc<FrameAnalysis>>>,
}

impl Coordinator {
    /// Spawn the analysis loop. Must be called inside a tokio runtime.
    pub fn start(
        source: Box<dyn FrameSource>,
        session: AnalysisSession,
        configuration: &Configuration,
    ) -> Self {
        let cancel_token = CancellationToken::new();
        let (result_tx, result_rx) = mpsc::channel(configuration.analysis.frame_buffer_size.max(1));
        let analysis_task = Self::start_analysis_task(
            configuration.frame_interval(),
            source,
            session,
            result_tx,
            cancel_token.clone(),
        );

        Self {
            analysis_task: Some(analysis_task),
            cancel_token,
            results: Some(result_rx),
        }
    }

    fn start_analysis_task(
        frame_interval: Duration,
        mut source: Box<dyn FrameSource>,
        mut session: AnalysisSession,
        result_tx: Sender<Arc<FrameAnalysis>>,
        cancel_token: CancellationToken,
    ) -> JoinHandle<AnalysisSession> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(frame_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;

                    _ = cancel_token.cancelled() => {
                        debug!("Analysis loop cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        if !Self::step(source.as_mut(), &mut session, &result_tx, &cancel_token) {
                            info!("Frame source ended after {} frames", session.frames_processed());
                            break;
                        }
                    }
                }
            }
            session
        })
    }

    /// One tick of the loop. Returns false once the source has ended.
    fn step(
        source: &mut dyn FrameSource,
        session: &mut AnalysisSession,
        result_tx: &Sender<Arc<FrameAnalysis>>,
        cancel_token: &CancellationToken,
    ) -> bool {
        match source.state() {
            SourceState::Ended => return false,
            SourceState::Loading | SourceState::Paused => return true,
            SourceState::Ready => {}
        }

        let Some(frame) = source.capture() else {
            return true;
        };
        let Some(analysis) = session.process(&frame) else {
            return true;
        };
        if cancel_token.is_cancelled() {
            debug!("Stopped while analysing, discarding frame at {:?}", analysis.timestamp);
            return true;
        }

        match result_tx.try_send(analysis) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!("Result consumer is lagging, dropping analysis"),
            Err(TrySendError::Closed(_)) => {}
        }
        true
    }

    /// Take the receiving end of the per-frame results. Only the first call gets it.
    pub fn take_results(&mut self) -> Option<Receiver<Arc<FrameAnalysis>>> {
        self.results.take()
    }

    pub fn is_finished(&self) -> bool {
        self.analysis_task
            .as_ref()
            .map(|task| task.is_finished())
            .unwrap_or(true)
    }

    /// Token that stops the loop when cancelled, usable from other tasks.
    pub fn stop_handle(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn stop(&self) {
        self.cancel_token.cancel();
    }

    /// Wait for the loop to end on its own, then release the model.
    pub async fn join(mut self) -> Result<AnalysisSession, AppError> {
        let task = self.analysis_task.take().ok_or(AppError::Cancelled)?;
        let session = task.await?;
        session.release_model();
        Ok(session)
    }

    /// Stop the loop, release the model and hand back the session.
    pub async fn shutdown(self) -> Result<AnalysisSession, AppError> {
        self.stop();
        self.join().await
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

pub struct CoordinatorBuilder {
    configuration: Configuration,
    source: Option<Box<dyn FrameSource>>,
    session: Option<AnalysisSession>,
    model_loader: Option<Arc<dyn ModelLoader>>,
}

impl CoordinatorBuilder {
    pub fn new(configuration: Configuration) -> Self {
        Self {
            configuration,
            source: None,
            session: None,
            model_loader: None,
        }
    }

    // Sets the target fps, this will override the default configuration.
    pub fn target_fps(mut self, target_fps: u32) -> Self {
        self.configuration.analysis.target_fps = target_fps;
        self
    }

    // Adjusts the result buffer size, this will override the default configuration.
    pub fn frame_buffer_size(mut self, frame_buffer_size: usize) -> Self {
        self.configuration.analysis.frame_buffer_size = frame_buffer_size;
        self
    }

    pub fn source(mut self, source: Box<dyn FrameSource>) -> Self {
        self.source = Some(source);
        self
    }

    // Sets a prepared session, otherwise one is built from the configuration.
    pub fn session(mut self, session: AnalysisSession) -> Self {
        self.session = Some(session);
        self
    }

    pub fn model_loader(mut self, loader: Arc<dyn ModelLoader>) -> Self {
        self.model_loader = Some(loader);
        self
    }

    pub fn build(self) -> Result<Coordinator, AppError> {
        self.configuration.validate()?;
        let source = self
            .source
            .ok_or(AppError::Pipeline("Frame source not set".to_string()))?;
        let session = self
            .session
            .unwrap_or_else(|| AnalysisSession::builder(self.configuration.clone()).build());

        match (session.model(), self.model_loader) {
            (Some(model), Some(loader)) => {
                model.begin_load(loader, self.configuration.load_timeout());
            }
            (Some(_), None) => warn!("Model configured but no loader available, using fallback tiers"),
            _ => {}
        }

        Ok(Coordinator::start(source, session, &self.configuration))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use image::{Rgb, RgbImage};

    use super::*;
    use crate::common::Frame;
    use crate::error::InferenceError;
    use crate::pipeline::services::inference::{InferenceSession, ModelHandle, ModelStatus};

    /// Source that reports `Loading` for a few polls, then replays its frames.
    struct ScriptedSource {
        frames: VecDeque<Frame>,
        loading_polls: Cell<usize>,
        paused: bool,
    }

    impl ScriptedSource {
        fn new(count: u64, loading_polls: usize) -> Self {
            let frames = (0..count)
                .map(|i| {
                    Frame::new(
                        RgbImage::from_pixel(64, 48, Rgb([30, 40, 90])),
                        Duration::from_millis(i * 40),
                    )
                })
                .collect();
            Self {
                frames,
                loading_polls: Cell::new(loading_polls),
                paused: false,
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn dimensions(&self) -> (u32, u32) {
            (64, 48)
        }

        fn current_time(&self) -> Duration {
            Duration::ZERO
        }

        fn duration(&self) -> Option<Duration> {
            None
        }

        fn state(&self) -> SourceState {
            if self.loading_polls.get() > 0 {
                self.loading_polls.set(self.loading_polls.get() - 1);
                SourceState::Loading
            } else if self.frames.is_empty() {
                SourceState::Ended
            } else if self.paused {
                SourceState::Paused
            } else {
                SourceState::Ready
            }
        }

        fn capture(&mut self) -> Option<Frame> {
            self.frames.pop_front()
        }

        fn play(&mut self) {
            self.paused = false;
        }

        fn pause(&mut self) {
            self.paused = true;
        }

        fn seek(&mut self, _position: Duration) {}
    }

    struct NeverLoads;

    #[async_trait]
    impl ModelLoader for NeverLoads {
        async fn load(
            &self,
            _path: &std::path::Path,
        ) -> Result<Arc<dyn InferenceSession>, InferenceError> {
            std::future::pending().await
        }
    }

    fn fast_configuration() -> Configuration {
        let mut configuration = Configuration::default();
        configuration.analysis.target_fps = 200;
        configuration
    }

    #[tokio::test]
    async fn runs_until_source_ends() {
        let mut coordinator = CoordinatorBuilder::new(fast_configuration())
            .source(Box::new(ScriptedSource::new(5, 0)))
            .build()
            .expect("Failed to build coordinator");
        let mut results = coordinator.take_results().expect("results receiver");
        assert!(coordinator.take_results().is_none());

        let session = coordinator.join().await.expect("loop should finish");
        assert_eq!(session.frames_processed(), 5);

        let mut received = 0;
        while results.recv().await.is_some() {
            received += 1;
        }
        assert_eq!(received, 5);
    }

    #[tokio::test]
    async fn loading_ticks_are_skipped() {
        let coordinator = CoordinatorBuilder::new(fast_configuration())
            .source(Box::new(ScriptedSource::new(2, 3)))
            .build()
            .expect("Failed to build coordinator");
        let session = coordinator.join().await.expect("loop should finish");
        assert_eq!(session.frames_processed(), 2);
    }

    #[tokio::test]
    async fn lagging_consumer_does_not_stall_the_loop() {
        let mut coordinator = CoordinatorBuilder::new(fast_configuration())
            .frame_buffer_size(1)
            .source(Box::new(ScriptedSource::new(4, 0)))
            .build()
            .expect("Failed to build coordinator");
        let mut results = coordinator.take_results().expect("results receiver");

        let session = coordinator.join().await.expect("loop should finish");
        assert_eq!(session.frames_processed(), 4);
        assert!(results.recv().await.is_some());
        assert!(results.recv().await.is_none());
    }

    #[tokio::test]
    async fn shutdown_releases_model_once() {
        let mut configuration = fast_configuration();
        configuration.analysis.target_fps = 1;
        let model = ModelHandle::new("models/serve.onnx", 416, 2);
        let session = AnalysisSession::builder(configuration.clone())
            .model(model.clone())
            .build();

        let coordinator = CoordinatorBuilder::new(configuration)
            .source(Box::new(ScriptedSource::new(100, 0)))
            .session(session)
            .model_loader(Arc::new(NeverLoads))
            .build()
            .expect("Failed to build coordinator");
        assert_eq!(model.status(), ModelStatus::Loading);

        let session = coordinator.shutdown().await.expect("shutdown");
        assert_eq!(model.status(), ModelStatus::Released);
        assert!(!session.release_model());
    }

    #[tokio::test]
    async fn stop_before_first_tick_processes_nothing() {
        let mut coordinator = CoordinatorBuilder::new(fast_configuration())
            .source(Box::new(ScriptedSource::new(5, 0)))
            .build()
            .expect("Failed to build coordinator");
        let mut results = coordinator.take_results().expect("results receiver");

        let session = coordinator.shutdown().await.expect("shutdown");
        assert_eq!(session.frames_processed(), 0);
        assert!(results.recv().await.is_none());
    }

    #[test]
    fn analysis_finished_after_stop_is_not_sent() {
        let configuration = fast_configuration();
        let mut source = ScriptedSource::new(2, 0);
        let mut session = AnalysisSession::builder(configuration).build();
        let (result_tx, mut result_rx) = mpsc::channel(4);
        let cancel_token = CancellationToken::new();

        assert!(Coordinator::step(&mut source, &mut session, &result_tx, &cancel_token));
        assert!(result_rx.try_recv().is_ok());

        cancel_token.cancel();
        Coordinator::step(&mut source, &mut session, &result_tx, &cancel_token);
        assert_eq!(session.frames_processed(), 2);
        assert!(result_rx.try_recv().is_err());
    }

    #[test]
    fn build_requires_source() {
        let result = CoordinatorBuilder::new(Configuration::default()).build();
        assert!(matches!(result, Err(AppError::Pipeline(_))));
    }
}
