use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::form::ConfirmationRecord;
use crate::overlay::{OverlayRenderer, ACCENT_POSITIVE};
use crate::presenter::Presenter;

#[derive(Clone, Copy, Debug)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        Self { mode, is_tty }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty)
    }

    fn use_pretty(&self) -> bool {
        self.is_tty && !matches!(self.mode, UiMode::Plain)
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.use_pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
    failed: bool,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
            failed: false,
        }
    }

    /// Finish the stage with a failure mark instead of a check.
    pub fn fail(mut self) {
        self.failed = true;
    }

    fn summary(&self) -> String {
        let mark = if self.failed { "✘" } else { "✔" };
        format!(
            "{mark} {} ({})",
            self.name,
            format_duration(self.start.elapsed())
        )
    }

    /// Print above the spinner without tearing it.
    fn println(&self, line: &str) {
        match &self.spinner {
            Some(spinner) => spinner.suspend(|| eprintln!("{line}")),
            None => eprintln!("{line}"),
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let message = self.summary();
        match &self.spinner {
            Some(spinner) if self.failed => spinner.abandon_with_message(message),
            Some(spinner) => spinner.finish_with_message(message),
            None => eprintln!("{message}"),
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

/// Line-oriented presenter for a terminal kiosk.
pub struct TerminalPresenter {
    ui: Ui,
    stage: Option<StageGuard>,
    overlay_path: Option<PathBuf>,
    stations: Vec<String>,
    last_overlay: Vec<String>,
}

impl TerminalPresenter {
    pub fn new(ui: Ui, overlay_path: Option<PathBuf>, stations: Vec<String>) -> Self {
        Self {
            ui,
            stage: None,
            overlay_path,
            stations,
            last_overlay: Vec::new(),
        }
    }

    fn println(&self, line: &str) {
        match &self.stage {
            Some(stage) => stage.println(line),
            None => eprintln!("{line}"),
        }
    }

    fn print_form(&self, record: &ConfirmationRecord) {
        self.println("┌ confirm rental");
        self.println(&format!("│ NIM : {}", record.nim));
        self.println(&format!("│ Name: {}", record.name));
        self.println(&format!("│ Lab : {}", record.lab));
        self.println(&format!("│ PC  : {}", record.computer_no));
        if !self.stations.is_empty() {
            self.println(&format!("│ labs: {}", self.stations.join(", ")));
        }
        self.println("└ edit with `nim|name|lab|pc <value>`, then `submit` or `cancel`");
    }
}

impl Presenter for TerminalPresenter {
    fn alert(&mut self, message: &str) {
        self.println(&format!("!! {message}"));
    }

    fn scanning_changed(&mut self, scanning: bool) {
        let label = if scanning {
            "auto-scan ON  (type `scan` to stop)"
        } else {
            "auto-scan OFF (type `scan` to start)"
        };
        self.println(label);
    }

    fn overlay_updated(&mut self, overlay: &OverlayRenderer) {
        let lines: Vec<String> = overlay
            .scene()
            .texts()
            .map(|(text, color)| {
                let mark = if color == ACCENT_POSITIVE { "+" } else { " " };
                format!("{mark}{text}")
            })
            .collect();
        if lines != self.last_overlay && !lines.is_empty() {
            self.println(&format!("[overlay] {}", lines.join(" | ")));
        }
        self.last_overlay = lines;

        if let Some(path) = &self.overlay_path {
            if let Err(err) = overlay.save_png(path) {
                log::warn!("{:#}", err);
            }
        }
    }

    fn confirmation_opened(&mut self, record: &ConfirmationRecord) {
        self.print_form(record);
    }

    fn confirmation_updated(&mut self, record: &ConfirmationRecord) {
        self.print_form(record);
    }

    fn confirmation_closed(&mut self) {
        self.println("confirmation closed");
    }

    fn busy(&mut self, activity: &str) {
        // Dropping the previous guard finishes its spinner line.
        self.stage = Some(self.ui.stage(activity));
    }

    fn idle(&mut self, succeeded: bool) {
        if let Some(stage) = self.stage.take() {
            if !succeeded {
                stage.fail();
            }
        }
    }
}
