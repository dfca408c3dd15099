//! Lightweight timing instrumentation for the response pipeline.
//!
//! Callers open a named span and the elapsed time is reported to a sink
//! when the span guard goes out of scope. Reporting happens on every exit
//! path, panics included, and a disabled stopwatch turns the whole thing
//! into a no-op so calling code never branches on whether timing is wanted.

use log::debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Receives completed span timings. Implementations are fire-and-forget:
/// they must not fail and should not block.
pub trait TimingSink: Send + Sync {
    fn record(&self, span: &'static str, elapsed: Duration);
}

/// Sink that reports spans to the log at debug level.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogTimingSink;

impl TimingSink for LogTimingSink {
    fn record(&self, span: &'static str, elapsed: Duration) {
        debug!("{span} took {elapsed:?}");
    }
}

/// Handle for opening timing spans. Cloning is cheap; clones share the sink.
#[derive(Clone)]
pub struct Stopwatch {
    sink: Option<Arc<dyn TimingSink>>,
}

impl Stopwatch {
    pub fn new(sink: Arc<dyn TimingSink>) -> Self {
        Self { sink: Some(sink) }
    }

    /// A stopwatch that measures nothing and reports nothing.
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    /// Opens a span that is reported when the returned guard drops.
    pub fn start(&self, span: &'static str) -> StopwatchGuard<'_> {
        StopwatchGuard {
            sink: self.sink.as_deref(),
            span,
            started_at: Instant::now(),
        }
    }
}

/// Scoped span handle. Reports to the sink on drop, unconditionally, which
/// is what keeps spans closed even when the measured code panics.
pub struct StopwatchGuard<'a> {
    sink: Option<&'a dyn TimingSink>,
    span: &'static str,
    started_at: Instant,
}

impl Drop for StopwatchGuard<'_> {
    fn drop(&mut self) {
        if let Some(sink) = self.sink {
            sink.record(self.span, self.started_at.elapsed());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        spans: Mutex<Vec<(&'static str, Duration)>>,
    }

    impl RecordingSink {
        fn recorded_names(&self) -> Vec<&'static str> {
            self.spans
                .lock()
                .unwrap()
                .iter()
                .map(|(span, _)| *span)
                .collect()
        }
    }

    impl TimingSink for RecordingSink {
        fn record(&self, span: &'static str, elapsed: Duration) {
            self.spans.lock().unwrap().push((span, elapsed));
        }
    }

    #[test]
    fn test_span_is_recorded_on_normal_exit() {
        let sink = Arc::new(RecordingSink::default());
        let stopwatch = Stopwatch::new(sink.clone());

        {
            let _guard = stopwatch.start("unit_of_work");
        }

        assert_eq!(sink.recorded_names(), vec!["unit_of_work"]);
    }

    #[test]
    fn test_span_is_recorded_when_the_measured_code_panics() {
        let sink = Arc::new(RecordingSink::default());
        let stopwatch = Stopwatch::new(sink.clone());

        let result = catch_unwind(AssertUnwindSafe(|| {
            let _guard = stopwatch.start("panicking_work");
            panic!("boom");
        }));

        assert!(result.is_err());
        assert_eq!(sink.recorded_names(), vec!["panicking_work"]);
    }

    #[test]
    fn test_sequential_spans_are_all_recorded() {
        let sink = Arc::new(RecordingSink::default());
        let stopwatch = Stopwatch::new(sink.clone());

        {
            let _guard = stopwatch.start("first");
        }
        {
            let _guard = stopwatch.start("second");
        }

        assert_eq!(sink.recorded_names(), vec!["first", "second"]);
    }

    #[test]
    fn test_disabled_stopwatch_is_a_quiet_no_op() {
        let stopwatch = Stopwatch::disabled();
        let _guard = stopwatch.start("ignored");
    }
}
