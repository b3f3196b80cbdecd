//! Streaming Helper (spec.md §4.6): couples a source stream to a
//! [`ResamplingHelper`], background-ingesting samples and forwarding ticks
//! to a sink.

use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::domain::{Sample, SourceProperties};

use super::helper::ResamplingHelper;

pub type Source = Pin<Box<dyn Stream<Item = Sample> + Send>>;
pub type Sink = Arc<dyn Fn(Sample) -> futures_util::future::BoxFuture<'static, Result<(), SinkError>> + Send + Sync>;

#[derive(Debug, Error, Clone, PartialEq)]
#[error("sink rejected resampled sample: {0}")]
pub struct SinkError(pub String);

/// Raised by [`StreamingHelper::resample`] when the source's background
/// ingestion task has already finished without ever raising an error.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("timeseries stopped producing samples")]
pub struct SourceStoppedError;

/// Raised when the source's background ingestion task panicked, carrying
/// the panic payload (downcast to a string where possible).
#[derive(Debug, Error, Clone, PartialEq)]
#[error("timeseries ingestion task panicked: {0}")]
pub struct SourcePanickedError(pub String);

/// Anything that can go wrong servicing one tick of a streaming helper.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StreamingError {
    #[error(transparent)]
    SourceStopped(#[from] SourceStoppedError),
    #[error(transparent)]
    SourcePanicked(#[from] SourcePanickedError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// The terminal state of a finished ingestion task, cached after the first
/// observation so repeated `resample()` calls don't need to re-join it.
#[derive(Debug, Clone)]
enum Terminal {
    Stopped,
    Panicked(String),
}

impl From<Terminal> for StreamingError {
    fn from(terminal: Terminal) -> Self {
        match terminal {
            Terminal::Stopped => SourceStoppedError.into(),
            Terminal::Panicked(payload) => SourcePanickedError(payload).into(),
        }
    }
}

enum TaskState {
    Running(JoinHandle<()>),
    Finished(Terminal),
}

/// Background-ingests a source stream into a [`ResamplingHelper`] and, on
/// each tick, computes and forwards one resampled sample to a sink.
pub struct StreamingHelper {
    helper: Arc<Mutex<ResamplingHelper>>,
    sink: Sink,
    receiving_task: Mutex<TaskState>,
}

impl StreamingHelper {
    pub fn new(helper: ResamplingHelper, mut source: Source, sink: Sink) -> Self {
        let shared = Arc::new(Mutex::new(helper));

        let task_shared = shared.clone();
        let receiving_task = tokio::spawn(async move {
            while let Some(sample) = source.next().await {
                if matches!(sample.value, Some(v) if !v.is_nan()) {
                    task_shared.lock().add_sample(sample);
                }
            }
        });

        Self {
            helper: shared,
            sink,
            receiving_task: Mutex::new(TaskState::Running(receiving_task)),
        }
    }

    pub fn source_properties(&self) -> SourceProperties {
        self.helper.lock().source_properties()
    }

    pub async fn stop(&mut self) {
        let state = std::mem::replace(&mut *self.receiving_task.lock(), TaskState::Finished(Terminal::Stopped));
        if let TaskState::Running(mut handle) = state {
            handle.abort();
            let _ = (&mut handle).await;
        }
    }

    /// If the background task has already finished with a panic, re-raise
    /// that panic. Else if it finished without one, raise `SourceStopped`.
    /// Else it's still running, and this returns `None`.
    async fn terminal_state(&self) -> Option<Terminal> {
        let handle_if_finished = {
            let mut guard = self.receiving_task.lock();
            match &mut *guard {
                TaskState::Finished(terminal) => return Some(terminal.clone()),
                TaskState::Running(handle) if handle.is_finished() => {
                    match std::mem::replace(&mut *guard, TaskState::Finished(Terminal::Stopped)) {
                        TaskState::Running(handle) => Some(handle),
                        TaskState::Finished(_) => unreachable!(),
                    }
                }
                TaskState::Running(_) => None,
            }
        };

        let handle = handle_if_finished?;
        let terminal = match handle.await {
            Ok(()) => Terminal::Stopped,
            Err(join_error) if join_error.is_panic() => {
                let payload = join_error.into_panic();
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                Terminal::Panicked(message)
            }
            Err(_) => Terminal::Stopped,
        };
        *self.receiving_task.lock() = TaskState::Finished(terminal.clone());
        Some(terminal)
    }

    /// Compute a new sample for `timestamp` and forward it to the sink
    /// (spec.md §4.6 "resample").
    pub async fn resample(&self, timestamp: DateTime<Utc>) -> Result<(), StreamingError> {
        if let Some(terminal) = self.terminal_state().await {
            return Err(terminal.into());
        }

        let sample = self.helper.lock().resample(timestamp);
        (self.sink)(sample).await.map_err(StreamingError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex as AsyncMutex;

    fn config() -> super::super::ResamplerConfig {
        super::super::ResamplerConfig::new(1.0).unwrap()
    }

    #[tokio::test]
    async fn forwards_resampled_value_to_sink() {
        let now = Utc::now();
        let samples = vec![Sample::new(now, Some(42.0))];
        let source: Source = Box::pin(stream::iter(samples));
        let helper = ResamplingHelper::new("test", config());

        let received = Arc::new(AsyncMutex::new(Vec::new()));
        let sink_received = received.clone();
        let sink: Sink = Arc::new(move |sample: Sample| {
            let received = sink_received.clone();
            Box::pin(async move {
                received.lock().await.push(sample);
                Ok(())
            })
        });

        let mut streaming = StreamingHelper::new(helper, source, sink);
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        streaming.resample(now + chrono::Duration::seconds(1)).await.unwrap();

        let got = received.lock().await;
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].value, Some(42.0));
        streaming.stop().await;
    }

    #[tokio::test]
    async fn finished_source_reports_stopped() {
        let source: Source = Box::pin(stream::empty());
        let helper = ResamplingHelper::new("test", config());
        let calls = Arc::new(AtomicUsize::new(0));
        let sink_calls = calls.clone();
        let sink: Sink = Arc::new(move |sample: Sample| {
            sink_calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                let _ = sample;
                Ok(())
            })
        });

        let mut streaming = StreamingHelper::new(helper, source, sink);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let result = streaming.resample(Utc::now()).await;
        assert!(matches!(result, Err(StreamingError::SourceStopped(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        streaming.stop().await;
    }

    #[tokio::test]
    async fn panicking_source_reports_panic_not_stopped() {
        let source: Source = Box::pin(stream::poll_fn(|_cx| -> std::task::Poll<Option<Sample>> {
            panic!("ingestion exploded")
        }));
        let helper = ResamplingHelper::new("test", config());
        let sink: Sink = Arc::new(|_| Box::pin(async { Ok(()) }));

        let mut streaming = StreamingHelper::new(helper, source, sink);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let result = streaming.resample(Utc::now()).await;
        assert!(matches!(result, Err(StreamingError::SourcePanicked(_))));

        // Cached terminal state, no need to re-join the task.
        let result = streaming.resample(Utc::now()).await;
        assert!(matches!(result, Err(StreamingError::SourcePanicked(_))));
        streaming.stop().await;
    }
}
