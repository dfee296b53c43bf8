use anyhow::Result;
use commander_agent::{IncidentReport, OperationResult};
use commander_core::Severity;
use commander_notify::DispatchResult;
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use serde_json::Value;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Rows shown per operation before eliding.
const PREVIEW_ROWS: usize = 5;

/// Color scheme for terminal output.
struct Colors;

impl Colors {
    const USER_PROMPT: Color = Color::Green;
    const SUMMARY: Color = Color::Cyan;
    const OK: Color = Color::DarkGreen;
    const ERROR: Color = Color::Red;
    const DIM: Color = Color::DarkGrey;
    const HEADER: Color = Color::Magenta;
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Critical => Color::Red,
        Severity::Warning => Color::Yellow,
        Severity::Info => Color::Green,
    }
}

/// Terminal I/O for one-shot and interactive use.
pub struct Terminal;

impl Terminal {
    pub fn new() -> Self {
        Self
    }

    /// Print the startup banner.
    pub fn print_banner(&self, profile: &str, provider: &str, backend: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::HEADER),
            Print("commander"),
            ResetColor,
            Print(" - Incident Commander\n"),
            SetForegroundColor(Colors::DIM),
            Print(format!("Profile: {} | Model: {} | Store: {}\n", profile, provider, backend)),
            Print("Type 'exit' or 'quit' to end, 'operations' to list what can be run.\n"),
            Print("---\n"),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Read a line of user input with prompt.
    /// Returns None on exit or end of input.
    pub fn read_input(&self) -> Result<Option<String>> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            Print("\n"),
            SetForegroundColor(Colors::USER_PROMPT),
            Print("ask> "),
            ResetColor,
        )?;
        stdout.flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            return Ok(None);
        }
        let trimmed = input.trim().to_string();

        if is_exit(&trimmed) {
            return Ok(None);
        }

        Ok(Some(trimmed))
    }

    /// Render a report: severity header, per-operation outcome, summary.
    pub fn print_report(&self, report: &IncidentReport) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            Print("\n"),
            SetForegroundColor(severity_color(report.severity)),
            Print(format!("{} {}", report.severity.emoji(), report.severity)),
            ResetColor,
            SetForegroundColor(Colors::DIM),
            Print(format!("  report {}\n", report.id)),
            ResetColor,
        )?;

        if !report.decision.rationale.is_empty() {
            execute!(
                stdout,
                SetForegroundColor(Colors::DIM),
                Print(format!("why: {}\n", report.decision.rationale)),
                ResetColor,
            )?;
        }

        if report.results.is_empty() {
            execute!(
                stdout,
                SetForegroundColor(Colors::DIM),
                Print("no operations run\n"),
                ResetColor,
            )?;
        }

        for (name, result) in &report.results {
            self.print_operation(name, result)?;
        }

        execute!(
            stdout,
            Print("\n"),
            SetForegroundColor(Colors::SUMMARY),
            Print(format!("{}\n", report.summary)),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    fn print_operation(&self, name: &str, result: &OperationResult) -> Result<()> {
        let mut stdout = io::stdout();
        if !result.success {
            execute!(
                stdout,
                SetForegroundColor(Colors::ERROR),
                Print(format!("✗ {}: {}\n", name, result.error.as_deref().unwrap_or("failed"))),
                ResetColor,
            )?;
            return Ok(());
        }

        execute!(
            stdout,
            SetForegroundColor(Colors::OK),
            Print(format!("✓ {} ({} rows)\n", name, result.row_count())),
            ResetColor,
        )?;
        for line in preview_lines(result) {
            execute!(
                stdout,
                SetForegroundColor(Colors::DIM),
                Print(format!("    {}\n", line)),
                ResetColor,
            )?;
        }
        Ok(())
    }

    /// Print per-channel delivery outcomes.
    pub fn print_dispatch(&self, results: &[DispatchResult]) -> Result<()> {
        for r in results {
            match &r.error {
                None => self.print_info(&format!("notified {} ({}ms)", r.channel, r.duration_ms))?,
                Some(e) => self.print_error(&format!("notify {} failed: {}", r.channel, e))?,
            }
        }
        Ok(())
    }

    /// Print an error message.
    pub fn print_error(&self, msg: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::ERROR),
            Print(format!("Error: {}\n", msg)),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Print an info message.
    pub fn print_info(&self, msg: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::DIM),
            Print(format!("{}\n", msg)),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Show a spinner while a report is being produced. Returns a handle to stop it.
    pub fn start_spinner(&self, message: &str) -> Result<SpinnerHandle> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::DIM),
            Print(format!("{} ", message)),
            ResetColor,
        )?;
        stdout.flush()?;

        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();

        let handle = std::thread::spawn(move || {
            let frames = ['|', '/', '-', '\\'];
            let mut i = 0;
            while running_clone.load(Ordering::SeqCst) {
                let mut stdout = io::stdout();
                execute!(
                    stdout,
                    SetForegroundColor(Colors::DIM),
                    Print(format!("\r{} ", frames[i % frames.len()])),
                    ResetColor,
                )
                .ok();
                stdout.flush().ok();
                i += 1;
                std::thread::sleep(std::time::Duration::from_millis(100));
            }
            let mut stdout = io::stdout();
            execute!(stdout, Print("\r  \r")).ok();
            stdout.flush().ok();
        });

        Ok(SpinnerHandle {
            running,
            thread: Some(handle),
        })
    }
}

fn is_exit(input: &str) -> bool {
    matches!(input, "exit" | "quit" | "/exit" | "/quit")
}

/// Compact one-line renderings of the first rows of a result.
fn preview_lines(result: &OperationResult) -> Vec<String> {
    let Some(rows) = result.data.as_ref().and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut lines: Vec<String> = rows
        .iter()
        .take(PREVIEW_ROWS)
        .map(|row| match (row, &result.columns) {
            (Value::Array(cells), Some(columns)) => columns
                .iter()
                .zip(cells)
                .filter(|(_, v)| !v.is_null())
                .map(|(c, v)| format!("{}={}", c, cell(v)))
                .collect::<Vec<_>>()
                .join(" "),
            (Value::Object(fields), _) => fields
                .iter()
                .map(|(k, v)| format!("{}={}", k, cell(v)))
                .collect::<Vec<_>>()
                .join(" "),
            (other, _) => other.to_string(),
        })
        .collect();

    if rows.len() > PREVIEW_ROWS {
        lines.push(format!("… {} more", rows.len() - PREVIEW_ROWS));
    }
    lines
}

fn cell(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Handle to a running spinner. Drop or call stop() to terminate it.
pub struct SpinnerHandle {
    running: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl SpinnerHandle {
    /// Stop the spinner and wait for the line to be cleared.
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            handle.join().ok();
        }
    }
}

impl Drop for SpinnerHandle {
    fn drop(&mut self) {
        self.halt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn exit_words() {
        assert!(is_exit("quit"));
        assert!(is_exit("/exit"));
        assert!(!is_exit("exit criteria for payments?"));
    }

    #[test]
    fn table_preview_skips_nulls_and_elides() {
        let rows: Vec<Value> = (0..7).map(|i| json!([i, "svc", null])).collect();
        let result = OperationResult {
            success: true,
            columns: Some(vec!["error_count".into(), "service_name".into(), "error".into()]),
            data: Some(Value::Array(rows)),
            error: None,
        };
        let lines = preview_lines(&result);
        assert_eq!(lines.len(), PREVIEW_ROWS + 1);
        assert_eq!(lines[0], "error_count=0 service_name=svc");
        assert_eq!(lines[PREVIEW_ROWS], "… 2 more");
    }

    #[test]
    fn record_preview() {
        let result = OperationResult {
            success: true,
            columns: None,
            data: Some(json!([{ "title": "DB timeouts", "score": 4.5 }])),
            error: None,
        };
        let lines = preview_lines(&result);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("title=DB timeouts"));
    }

    #[test]
    fn failure_has_no_preview() {
        assert!(preview_lines(&OperationResult::failure("boom")).is_empty());
    }
}
