//! Logging setup on top of flexi_logger
//!
//! Three output formats are supported: `text` (message plus source location),
//! `ext` (same with colour-dimmed location) and `json` (one object per line).
//! The logger handle lives for the rest of the process so file output keeps
//! flushing.

static LOGGER_HANDLE: std::sync::OnceLock<std::sync::Mutex<flexi_logger::LoggerHandle>> =
    std::sync::OnceLock::new();

const LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

/// Initialise the global logger
pub fn init_logging(
    log_level: Option<&str>,
    log_format: Option<&str>,
    log_file: Option<&str>,
    color_enabled: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    use flexi_logger::{FileSpec, Logger};

    let level_str = log_level.unwrap_or("info");
    let mut logger = Logger::try_with_str(level_str)?;

    logger = match (log_format.unwrap_or("text"), color_enabled) {
        ("json", _) => logger.format(json_format),
        ("ext", true) => logger.format(extended_color_format),
        ("ext", false) => logger.format(extended_format),
        (_, true) => logger.format(simple_color_format),
        (_, false) => logger.format(simple_format),
    };

    if let Some(file_path) = log_file {
        let file_spec = FileSpec::try_from(std::path::Path::new(file_path))?;
        logger = logger.log_to_file(file_spec);
    }

    let handle = logger.start()?;
    let _ = LOGGER_HANDLE.set(std::sync::Mutex::new(handle));

    Ok(())
}

/// Resolve the effective level from a base level and a -v/-q balance
///
/// Each step of positive verbosity moves one level towards `trace`, each
/// negative step one level towards `off`.
pub fn level_for_verbosity(base: &str, verbosity: i8) -> &'static str {
    let base_idx = LEVELS
        .iter()
        .position(|l| l.eq_ignore_ascii_case(base))
        .unwrap_or(3) as i16;
    let idx = (base_idx + verbosity as i16).clamp(0, LEVELS.len() as i16 - 1);
    LEVELS[idx as usize]
}

fn level_abbr(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "ERR",
        log::Level::Warn => "WRN",
        log::Level::Info => "INF",
        log::Level::Debug => "DBG",
        log::Level::Trace => "TRC",
    }
}

fn level_colored(level: log::Level) -> colored::ColoredString {
    use colored::*;

    match level {
        log::Level::Error => "ERR".red().bold(),
        log::Level::Warn => "WRN".yellow(),
        log::Level::Info => "INF".green(),
        log::Level::Debug => "DBG".blue(),
        log::Level::Trace => "TRC".magenta(),
    }
}

// "YYYY-MM-DD HH:mm:ss.fff INF message (scanner/batch.rs:42)"
fn simple_format(
    w: &mut dyn std::io::Write,
    now: &mut flexi_logger::DeferredNow,
    record: &log::Record,
) -> Result<(), std::io::Error> {
    write!(
        w,
        "{} {} {}",
        now.format("%Y-%m-%d %H:%M:%S%.3f"),
        level_abbr(record.level()),
        record.args()
    )
}

fn simple_color_format(
    w: &mut dyn std::io::Write,
    now: &mut flexi_logger::DeferredNow,
    record: &log::Record,
) -> Result<(), std::io::Error> {
    use colored::*;

    write!(
        w,
        "{} {} {}",
        now.format("%Y-%m-%d %H:%M:%S%.3f").to_string().dimmed(),
        level_colored(record.level()),
        record.args()
    )
}

fn extended_format(
    w: &mut dyn std::io::Write,
    now: &mut flexi_logger::DeferredNow,
    record: &log::Record,
) -> Result<(), std::io::Error> {
    let target_formatted = format_target_as_path(record.target(), record.line());

    write!(
        w,
        "{} {} {} ({})",
        now.format("%Y-%m-%d %H:%M:%S%.3f"),
        level_abbr(record.level()),
        record.args(),
        target_formatted
    )
}

fn extended_color_format(
    w: &mut dyn std::io::Write,
    now: &mut flexi_logger::DeferredNow,
    record: &log::Record,
) -> Result<(), std::io::Error> {
    use colored::*;

    let target_formatted = format_target_as_path(record.target(), record.line());

    write!(
        w,
        "{} {} {} ({})",
        now.format("%Y-%m-%d %H:%M:%S%.3f").to_string().dimmed(),
        level_colored(record.level()),
        record.args(),
        target_formatted.dimmed()
    )
}

fn json_format(
    w: &mut dyn std::io::Write,
    now: &mut flexi_logger::DeferredNow,
    record: &log::Record,
) -> Result<(), std::io::Error> {
    use serde_json::{json, to_string};

    let json_obj = json!({
        "timestamp": now.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        "level": level_abbr(record.level()),
        "message": record.args().to_string(),
        "target": format_target_as_path(record.target(), record.line())
    });

    match to_string(&json_obj) {
        Ok(json_string) => w.write_all(json_string.as_bytes()),
        Err(_) => w.write_all(b"{\"error\":\"Failed to serialize log message\"}"),
    }
}

// imagegate::scanner::batch -> scanner/batch.rs:42
fn format_target_as_path(target: &str, line: Option<u32>) -> String {
    let path_like = if let Some(without_prefix) = target.strip_prefix("imagegate::") {
        without_prefix.replace("::", "/") + ".rs"
    } else {
        target.replace("::", "/")
    };

    if let Some(line_num) = line {
        format!("{}:{}", path_like, line_num)
    } else {
        path_like
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for_verbosity() {
        assert_eq!(level_for_verbosity("info", 0), "info");
        assert_eq!(level_for_verbosity("info", 1), "debug");
        assert_eq!(level_for_verbosity("info", 2), "trace");
        assert_eq!(level_for_verbosity("info", 9), "trace");
        assert_eq!(level_for_verbosity("info", -1), "warn");
        assert_eq!(level_for_verbosity("info", -9), "off");
        assert_eq!(level_for_verbosity("WARN", 1), "info");
        // Unknown base falls back to info
        assert_eq!(level_for_verbosity("chatty", 0), "info");
    }

    #[test]
    fn test_format_target_as_path() {
        assert_eq!(
            format_target_as_path("imagegate::scanner::batch", Some(42)),
            "scanner/batch.rs:42"
        );
        assert_eq!(
            format_target_as_path("reqwest::connect", None),
            "reqwest/connect"
        );
    }

    #[test]
    fn test_extended_format_layout() {
        use flexi_logger::DeferredNow;

        let mut buffer = Vec::new();
        let mut now = DeferredNow::new();
        let record = log::Record::builder()
            .level(log::Level::Info)
            .target("imagegate::scanner::step")
            .line(Some(7))
            .args(format_args!("Image scanned"))
            .build();

        extended_format(&mut buffer, &mut now, &record).expect("format succeeds");
        let output = String::from_utf8(buffer).expect("valid UTF-8");

        assert!(output.contains("INF Image scanned"), "got: {}", output);
        assert!(output.ends_with("(scanner/step.rs:7)"), "got: {}", output);
    }

    #[test]
    fn test_json_format_fields() {
        use flexi_logger::DeferredNow;

        let mut buffer = Vec::new();
        let mut now = DeferredNow::new();
        let record = log::Record::builder()
            .level(log::Level::Error)
            .target("imagegate::scanner::batch")
            .args(format_args!("scan failed"))
            .build();

        json_format(&mut buffer, &mut now, &record).expect("format succeeds");
        let value: serde_json::Value =
            serde_json::from_slice(&buffer).expect("output is a JSON object");

        assert_eq!(value["level"], "ERR");
        assert_eq!(value["message"], "scan failed");
        assert_eq!(value["target"], "scanner/batch.rs");
    }
}
