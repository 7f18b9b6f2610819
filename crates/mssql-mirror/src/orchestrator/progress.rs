//! Progress event sinks.

use tracing::info;

/// Receives one human-readable message per progress event.
///
/// Called synchronously on the migration's own flow, in emission order.
pub trait ProgressSink: Send {
    fn report(&mut self, message: &str);
}

impl<F> ProgressSink for F
where
    F: FnMut(&str) + Send,
{
    fn report(&mut self, message: &str) {
        self(message)
    }
}

/// Forwards progress events to the `tracing` log at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&mut self, message: &str) {
        info!(target: "mssql_mirror::progress", "{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_sink_collects_in_order() {
        let mut seen = Vec::new();
        {
            let mut sink = |m: &str| seen.push(m.to_string());
            sink.report("first");
            sink.report("second");
        }
        assert_eq!(seen, vec!["first", "second"]);
    }

    #[test]
    fn test_log_sink_is_object_safe() {
        let mut sink = LogProgress;
        let dyn_sink: &mut dyn ProgressSink = &mut sink;
        dyn_sink.report("logged");
    }
}
