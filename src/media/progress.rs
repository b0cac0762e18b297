use std::io::{self, Write};

/// Receives discrete progress events from a run. Rendering is up to the sink.
pub trait ProgressSink {
    fn start(&mut self, total: usize);
    fn advance(&mut self, done: usize, label: &str);
    fn finish(&mut self) {}
}

#[derive(Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn start(&mut self, _total: usize) {}
    fn advance(&mut self, _done: usize, _label: &str) {}
}

fn percent(done: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    done.min(total) as f64 / total as f64 * 100.0
}

/// Plain line renderer: `Progress: [NN.NN%] label`.
pub struct TerminalProgress<W: Write> {
    out: W,
    total: usize,
}

impl TerminalProgress<io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write> TerminalProgress<W> {
    pub fn new(out: W) -> Self {
        Self { out, total: 0 }
    }

    fn line(&mut self, done: usize, label: &str) {
        let _ = writeln!(
            self.out,
            "Progress: [{:.2}%] {}",
            percent(done, self.total),
            label
        );
    }
}

impl<W: Write> ProgressSink for TerminalProgress<W> {
    fn start(&mut self, total: usize) {
        self.total = total;
        self.line(0, &format!("{total} new file(s)"));
    }

    fn advance(&mut self, done: usize, label: &str) {
        self.line(done, label);
    }

    fn finish(&mut self) {
        let _ = self.out.flush();
    }
}
