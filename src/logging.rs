use std::fmt::{self, Write as _};
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use color_eyre::eyre::{Result, WrapErr};
use serde_json::json;
use tracing::field::{Field, Visit};
use tracing::{span, Event, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::{Context, Layer, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter,
};

pub const LOG_FILE_PREFIX: &str = "homework_bot";

/// Polling cycle number stored in the extensions of a `cycle` span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cycle(u64);

/// Records the `cycle` field of new spans so formatters can read it back
/// without parsing rendered field text.
pub struct CycleLayer;

impl<S> Layer<S> for CycleLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let mut visitor = CycleVisitor::default();
        attrs.record(&mut visitor);
        if let (Some(cycle), Some(span)) = (visitor.0, ctx.span(id)) {
            span.extensions_mut().insert(cycle);
        }
    }
}

#[derive(Default)]
struct CycleVisitor(Option<Cycle>);

impl Visit for CycleVisitor {
    fn record_u64(&mut self, field: &Field, value: u64) {
        if field.name() == "cycle" {
            self.0 = Some(Cycle(value));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        if let Ok(value) = u64::try_from(value) {
            self.record_u64(field, value);
        }
    }

    fn record_debug(&mut self, _field: &Field, _value: &dyn fmt::Debug) {}
}

/// One JSON object per line: local and UTC timestamps, level, target, the
/// event fields, and the polling cycle number when logged inside a cycle span.
pub struct CycleJsonFormatter;

impl<S, N> FormatEvent<S, N> for CycleJsonFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();

        let mut cycle = None;
        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                if let Some(&Cycle(n)) = span.extensions().get::<Cycle>() {
                    cycle = Some(n);
                }
            }
        }

        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);

        let mut entry = json!({
            "timestamp": Local::now().to_rfc3339(),
            "timestamp_utc": chrono::Utc::now().to_rfc3339(),
            "level": metadata.level().to_string(),
            "target": metadata.target(),
            "fields": visitor.fields,
        });
        if let Some(cycle) = cycle {
            entry["cycle"] = json!(cycle);
        }

        writeln!(writer, "{}", entry)
    }
}

#[derive(Default)]
struct JsonVisitor {
    fields: serde_json::Map<String, serde_json::Value>,
}

impl tracing::field::Visit for JsonVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        self.fields
            .insert(field.name().to_string(), json!(format!("{:?}", value)));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.fields.insert(field.name().to_string(), json!(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.fields.insert(field.name().to_string(), json!(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.fields.insert(field.name().to_string(), json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.fields.insert(field.name().to_string(), json!(value));
    }
}

/// File writer that starts a new `<prefix>.<YYYY-MM-DD>.log` when the local date changes.
pub struct DailyFileAppender {
    directory: PathBuf,
    prefix: String,
    current: Option<(NaiveDate, std::fs::File)>,
}

impl DailyFileAppender {
    pub fn new<P: AsRef<Path>>(directory: P, prefix: &str) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        std::fs::create_dir_all(&directory)
            .wrap_err_with(|| format!("Failed to create log directory {:?}", directory))?;

        Ok(Self {
            directory,
            prefix: prefix.to_string(),
            current: None,
        })
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.directory
            .join(format!("{}.{}.log", self.prefix, date.format("%Y-%m-%d")))
    }

    fn file_for_today(&mut self) -> io::Result<&mut std::fs::File> {
        let today = Local::now().date_naive();
        let stale = !matches!(&self.current, Some((date, _)) if *date == today);

        if stale {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.path_for(today))?;
            self.current = Some((today, file));
        }

        match &mut self.current {
            Some((_, file)) => Ok(file),
            None => Err(io::Error::other("log file not open")),
        }
    }
}

impl io::Write for DailyFileAppender {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file_for_today()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.current {
            Some((_, file)) => file.flush(),
            None => Ok(()),
        }
    }
}

/// Installs the JSON file sink and the compact stdout sink.
///
/// The returned guard flushes the file writer on drop; keep it alive for the
/// whole process.
pub fn init(log_dir: &str) -> Result<WorkerGuard> {
    let appender = DailyFileAppender::new(log_dir, LOG_FILE_PREFIX)
        .wrap_err("Failed to create log file appender")?;
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    let filter = match std::env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => EnvFilter::new("homework_bot=debug"),
    };

    tracing_subscriber::registry()
        .with(CycleLayer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking)
                .event_format(CycleJsonFormatter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stdout)
                .compact(),
        )
        .with(filter)
        .try_init()
        .wrap_err("Failed to install tracing subscriber")?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tracing::info_span;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl io::Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Runs `emit` under the same layer stack `init` installs, ANSI stdout
    /// layer included, and returns the JSON lines the file sink received.
    fn capture_json_lines(emit: impl FnOnce()) -> Vec<serde_json::Value> {
        let buf = SharedBuf::default();
        let writer = buf.clone();
        let subscriber = tracing_subscriber::registry()
            .with(CycleLayer)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(move || writer.clone())
                    .event_format(CycleJsonFormatter),
            )
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(true)
                    .with_writer(io::sink)
                    .compact(),
            );

        tracing::subscriber::with_default(subscriber, emit);

        let output = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_json_line_carries_cycle() {
        let lines = capture_json_lines(|| {
            let _span = info_span!("cycle", cycle = 7u64).entered();
            tracing::error!(kind = "HttpStatus", "Polling cycle failed");
        });

        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert_eq!(line["level"], "ERROR");
        assert_eq!(line["cycle"], 7);
        assert_eq!(line["fields"]["message"], "Polling cycle failed");
        assert_eq!(line["fields"]["kind"], "HttpStatus");
        assert!(line["timestamp"].is_string());
    }

    #[test]
    fn test_cycle_only_inside_cycle_span() {
        let lines = capture_json_lines(|| {
            tracing::info!("Homework status polling started");
            let _cycle = info_span!("cycle", cycle = 3).entered();
            let _request = info_span!("request", endpoint = "x").entered();
            tracing::debug!("Homework statuses fetched");
        });

        assert_eq!(lines.len(), 2);
        assert!(lines[0].get("cycle").is_none());
        assert_eq!(lines[1]["cycle"], 3);
    }

    #[test]
    fn test_appender_writes_dated_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut appender = DailyFileAppender::new(dir.path().join("logs"), "bot").unwrap();

        appender.write_all(b"first\n").unwrap();
        appender.write_all(b"second\n").unwrap();
        appender.flush().unwrap();

        let path = appender.path_for(Local::now().date_naive());
        assert!(path.file_name().unwrap().to_str().unwrap().starts_with("bot."));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "first\nsecond\n");
    }
}
