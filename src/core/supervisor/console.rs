use std::io::Write;

/// Which child stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    pub fn prefix(self) -> &'static str {
        match self {
            StreamKind::Stdout => "[out]",
            StreamKind::Stderr => "[err]",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleLine {
    pub stream: StreamKind,
    pub text: String,
}

/// Operator-facing destination for relayed child output.
///
/// Lines of one stream arrive in the order the child wrote them; the two
/// streams are not ordered relative to each other.
pub trait OutputSink: Send + 'static {
    fn emit(&mut self, line: ConsoleLine);
}

/// Writes every line to the host's stdout, prefixed by its stream.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl OutputSink for ConsoleSink {
    fn emit(&mut self, line: ConsoleLine) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{} {}", line.stream.prefix(), line.text);
        let _ = out.flush();
    }
}

impl OutputSink for tokio::sync::mpsc::UnboundedSender<ConsoleLine> {
    fn emit(&mut self, line: ConsoleLine) {
        let _ = self.send(line);
    }
}
