use std::io::{self, Write};
use std::sync::OnceLock;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing_subscriber::fmt::MakeWriter;

use crate::recompress::PhaseProgress;

/// The process-wide bar set. Log output routed through [`IndicatifWriter`]
/// suspends these bars while it writes.
pub fn global_multi_progress() -> MultiProgress {
    static GLOBAL_MP: OnceLock<MultiProgress> = OnceLock::new();
    GLOBAL_MP
        .get_or_init(|| MultiProgress::with_draw_target(ProgressDrawTarget::stderr_with_hz(20)))
        .clone()
}

/// Writes to stderr with the bars of a [`MultiProgress`] cleared, so log
/// lines never land inside a bar.
#[derive(Clone)]
pub struct IndicatifWriter {
    progress_bars: MultiProgress,
}

impl IndicatifWriter {
    pub fn new(progress_bars: MultiProgress) -> Self {
        Self { progress_bars }
    }
}

impl Write for IndicatifWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.progress_bars.suspend(|| io::stderr().write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.progress_bars.suspend(|| io::stderr().flush())
    }
}

impl<'a> MakeWriter<'a> for IndicatifWriter {
    type Writer = IndicatifWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Progress bars for one pipeline run, one per phase.
pub struct RunProgress {
    multi: MultiProgress,
    enabled: bool,
}

impl RunProgress {
    /// Bars join [`global_multi_progress`] when `enabled`.
    pub fn new(enabled: bool) -> Self {
        let multi = if enabled {
            global_multi_progress()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };
        Self { multi, enabled }
    }

    /// A bar counting finished jobs, labelled with `prefix`.
    pub fn phase(&self, prefix: &'static str) -> ProgressBar {
        if !self.enabled {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(ProgressBar::new(0));
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{prefix:>12.cyan.bold} [{bar:30.cyan/dim}] {pos}/{len}")
        {
            pb.set_style(style.progress_chars("━╸━"));
        }
        pb.set_prefix(prefix);
        pb
    }

    pub fn extract_and_recompress(&self) -> PhaseProgress {
        PhaseProgress {
            extract: self.phase("extracting"),
            recompress: self.phase("compressing"),
        }
    }
}
