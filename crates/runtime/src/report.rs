// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! The host-facing exception handshake: host code hands the runtime an
//! empty [`vellum_value::Sink`], evaluates, then inspects it through
//! [`ExceptionReport::from_sink`] rather than reaching into `vellum-value`
//! and `vellum-exceptions` types directly.

use vellum_exceptions::CallFrame;
use vellum_value::{Sink, Value};

/// One frame of a reported call-stack snapshot, in the `(function, file,
/// line)` shape spec §6 names for the sink-to-host conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFrame {
    pub function: String,
    pub file: Option<String>,
    pub line: u32,
}

impl From<&CallFrame> for ReportFrame {
    fn from(frame: &CallFrame) -> Self {
        Self {
            function: frame.function.clone(),
            file: frame.file.clone(),
            line: frame.line,
        }
    }
}

/// The `(error_code, description, file, line, call_stack)` tuple spec §6
/// says host code gets back after inspecting a sink that came out of
/// evaluation in the error state.
///
/// `error_code` is `None` for a user `throw` (it carries an arbitrary
/// [`Value`] in `arg` instead of a stable identifier); `file`/`line` are the
/// exception's recorded source location, if any.
#[derive(Debug, Clone)]
pub struct ExceptionReport {
    pub error_code: Option<&'static str>,
    pub description: String,
    pub file: Option<String>,
    pub line: u32,
    pub call_stack: Vec<ReportFrame>,
    pub arg: Option<Value>,
}

impl ExceptionReport {
    /// Reads the pending exception out of `sink` without consuming it. A
    /// thread-exit-only sink (no exception, flag set) has nothing to report
    /// here — see [`Sink::is_thread_exit`] for that case separately.
    #[must_use]
    pub fn from_sink(sink: &Sink) -> Option<Self> {
        let exc = sink.peek()?;
        let location = exc.source_location();
        Some(Self {
            error_code: exc.error_code(),
            description: exc.description().to_string(),
            file: location.and_then(|f| f.file.clone()),
            line: location.map_or(0, |f| f.line),
            call_stack: exc.call_stack().iter().map(ReportFrame::from).collect(),
            arg: exc.arg().cloned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use vellum_exceptions::ErrorKind;

    use super::*;

    #[test]
    fn test_from_sink_none_when_empty() {
        let sink = Sink::new();
        assert!(ExceptionReport::from_sink(&sink).is_none());
    }

    #[test]
    fn test_from_sink_reports_system_exception() {
        let mut sink = Sink::new();
        sink.raise_system(ErrorKind::ThreadDeadlock, "cycle detected");
        let report = ExceptionReport::from_sink(&sink).unwrap();
        assert_eq!(report.error_code, Some("THREAD-DEADLOCK"));
        assert_eq!(report.description, "cycle detected");
        assert!(report.arg.is_none());
    }

    #[test]
    fn test_from_sink_reports_user_exception_arg() {
        let mut sink = Sink::new();
        sink.raise_user(Value::string("boom"), "user threw");
        let report = ExceptionReport::from_sink(&sink).unwrap();
        assert!(report.error_code.is_none());
        assert!(matches!(report.arg, Some(Value::String(_))));
    }
}
