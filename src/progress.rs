use colored::Colorize;
use std::io::Write;
use tracing::{debug, info};

/// Receives one notification per batch.
pub trait ProgressReporter {
    fn batch_started(&mut self, _batch: usize) {}
    fn batch_finished(&mut self, batch: usize, n_survivors: usize, cumulative: u64);
}

/// Reports progress through `tracing` only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn batch_finished(&mut self, batch: usize, n_survivors: usize, cumulative: u64) {
        info!(batch, survivors = n_survivors, cumulative, "batch finished");
    }
}

/// Human-readable progress lines:
///
/// ```text
/// **********Batch 0**********
/// 87 trips generated.
/// ```
pub struct ConsoleProgress<W: Write> {
    out: W,
    color: bool,
}

impl<W: Write> ConsoleProgress<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self { out, color }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Progress is best effort: a failed write is logged and the run goes on.
    fn line(&mut self, text: String) {
        if let Err(e) = writeln!(self.out, "{}", text) {
            debug!(error = %e, "progress line dropped");
        }
    }
}

impl ConsoleProgress<std::io::Stdout> {
    pub fn stdout(color: bool) -> Self {
        Self::new(std::io::stdout(), color)
    }
}

fn batch_banner(batch: usize) -> String {
    let stars = "*".repeat(10);
    format!("{stars}Batch {batch}{stars}")
}

impl<W: Write> ProgressReporter for ConsoleProgress<W> {
    fn batch_started(&mut self, batch: usize) {
        let banner = batch_banner(batch);
        let banner = if self.color {
            banner.bold().cyan().to_string()
        } else {
            banner
        };
        self.line(banner);
    }

    fn batch_finished(&mut self, batch: usize, n_survivors: usize, cumulative: u64) {
        info!(batch, survivors = n_survivors, cumulative, "batch finished");
        let count = if self.color {
            cumulative.to_string().green().to_string()
        } else {
            cumulative.to_string()
        };
        self.line(format!("{} trips generated.", count));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_progress_lines() {
        let mut progress = ConsoleProgress::new(Vec::new(), false);
        progress.batch_started(0);
        progress.batch_finished(0, 12, 12);
        progress.batch_started(1);
        progress.batch_finished(1, 9, 21);

        let text = String::from_utf8(progress.into_inner()).unwrap();
        assert_eq!(
            text,
            "**********Batch 0**********\n12 trips generated.\n\
             **********Batch 1**********\n21 trips generated.\n"
        );
    }

    /// Refuses every write, counting the attempts.
    struct ClosedPipe {
        attempts: usize,
    }

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            self.attempts += 1;
            Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_failures_do_not_stop_reporting() {
        let mut progress = ConsoleProgress::new(ClosedPipe { attempts: 0 }, false);
        progress.batch_started(0);
        progress.batch_finished(0, 5, 5);
        progress.batch_started(1);
        assert_eq!(progress.into_inner().attempts, 3);
    }

    #[test]
    fn test_colored_progress_keeps_text() {
        colored::control::set_override(true);
        let mut progress = ConsoleProgress::new(Vec::new(), true);
        progress.batch_finished(3, 4, 40);
        let text = String::from_utf8(progress.into_inner()).unwrap();
        assert!(text.contains("40"));
        assert!(text.ends_with(" trips generated.\n"));
    }
}
