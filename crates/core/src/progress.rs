//! Progress reporting to an external logging sink.

/// Receives single-line, human-readable progress messages.
pub trait LogSink {
    /// Record one progress line.
    fn line(&mut self, message: &str);
}

impl<F> LogSink for F
where
    F: FnMut(&str),
{
    fn line(&mut self, message: &str) {
        self(message)
    }
}

/// A sink that discards every line.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LogSink for NullSink {
    fn line(&mut self, _message: &str) {}
}

/// A sink that keeps every line, mostly useful in tests.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub lines: Vec<String>,
}

impl LogSink for MemorySink {
    fn line(&mut self, message: &str) {
        self.lines.push(message.to_string());
    }
}

/// Send a line to both the `log` facade and the sink.
pub fn emit(sink: &mut dyn LogSink, message: &str) {
    log::info!("{}", message);
    sink.line(message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_sink() {
        let mut seen = Vec::new();
        {
            let mut sink = |line: &str| seen.push(line.to_uppercase());
            emit(&mut sink, "hello");
        }
        assert_eq!(seen, vec!["HELLO"]);
    }

    #[test]
    fn test_memory_sink() {
        let mut sink = MemorySink::default();
        emit(&mut sink, "a");
        emit(&mut sink, "b");
        assert_eq!(sink.lines, vec!["a", "b"]);
    }
}
