mod console;
mod process;
mod signals;

pub use console::{ConsoleLine, ConsoleSink, OutputSink, StreamKind};
pub use process::{ExitOutcome, ExitReport, LaunchSpec, ProcessState, ServerProcess};
pub use signals::interrupt_signal;
