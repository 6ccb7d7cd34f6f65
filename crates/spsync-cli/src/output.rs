use spsync_sync::orchestrator::{FileStatus, ProgressReporter};

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Trait for formatting CLI output
pub trait OutputFormatter: Send + Sync {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
    fn warn(&self, message: &str);
    fn info(&self, message: &str);
    fn print_json(&self, value: &serde_json::Value);
    /// One compact machine-readable line, e.g. a per-file event.
    fn record(&self, value: &serde_json::Value);
}

/// Human-readable output formatter with checkmarks and indentation
pub struct HumanFormatter;

impl OutputFormatter for HumanFormatter {
    fn success(&self, message: &str) {
        println!("\u{2713} {}", message);
    }
    fn error(&self, message: &str) {
        eprintln!("\u{2717} Error: {}", message);
    }
    fn warn(&self, message: &str) {
        eprintln!("\u{26a0} Warning: {}", message);
    }
    fn info(&self, message: &str) {
        println!("  {}", message);
    }
    fn print_json(&self, _value: &serde_json::Value) {}
    fn record(&self, _value: &serde_json::Value) {}
}

/// JSON output formatter
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn success(&self, message: &str) {
        println!(
            "{}",
            serde_json::json!({"success": true, "message": message})
        );
    }
    fn error(&self, message: &str) {
        eprintln!(
            "{}",
            serde_json::json!({"success": false, "error": message})
        );
    }
    fn warn(&self, message: &str) {
        eprintln!(
            "{}",
            serde_json::json!({"level": "warning", "message": message})
        );
    }
    fn info(&self, _message: &str) {}
    fn print_json(&self, value: &serde_json::Value) {
        println!(
            "{}",
            serde_json::to_string_pretty(value).unwrap_or_default()
        );
    }
    fn record(&self, value: &serde_json::Value) {
        println!("{}", value);
    }
}

pub fn get_formatter(json: bool) -> Box<dyn OutputFormatter> {
    if json {
        Box::new(JsonFormatter)
    } else {
        Box::new(HumanFormatter)
    }
}

/// Prints one status line per finished file.
pub struct ConsoleProgress {
    formatter: Box<dyn OutputFormatter>,
    json: bool,
    show_skipped: bool,
}

impl ConsoleProgress {
    pub fn new(format: OutputFormat, show_skipped: bool) -> Self {
        let json = matches!(format, OutputFormat::Json);
        Self {
            formatter: get_formatter(json),
            json,
            show_skipped,
        }
    }
}

/// Stable lowercase label used in JSON output.
pub fn status_label(status: &FileStatus) -> &'static str {
    match status {
        FileStatus::New => "new",
        FileStatus::Replaced => "replaced",
        FileStatus::Skipped => "skipped",
        FileStatus::Failed(_) => "failed",
    }
}

impl ProgressReporter for ConsoleProgress {
    fn file_finished(&self, path: &str, status: &FileStatus) {
        if self.json {
            let error = match status {
                FileStatus::Failed(message) => Some(message.as_str()),
                _ => None,
            };
            self.formatter.record(&serde_json::json!({
                "file": path,
                "status": status_label(status),
                "error": error,
            }));
            return;
        }

        match status {
            FileStatus::New => self.formatter.success(&format!("Uploaded  {path}")),
            FileStatus::Replaced => self.formatter.success(&format!("Updated   {path}")),
            FileStatus::Skipped if self.show_skipped => {
                self.formatter.info(&format!("Unchanged {path}"))
            }
            FileStatus::Skipped => {}
            FileStatus::Failed(message) => self.formatter.error(&format!("{path}: {message}")),
        }
    }
}
