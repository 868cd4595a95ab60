use std::fmt;
use std::io::IsTerminal;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

use crate::config::types::{LogFormat, LoggingConfig};

/// Outcome tag shown in front of session admission and authentication lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionTag {
    Allow,
    Deny,
}

impl SessionTag {
    fn label(self) -> &'static str {
        match self {
            SessionTag::Allow => "[ALLOW]",
            SessionTag::Deny => "[DENY]",
        }
    }

    fn color(self) -> &'static str {
        match self {
            SessionTag::Allow => "34",
            SessionTag::Deny => "31",
        }
    }
}

/// Lower-cased message fragments, checked in order. Deny wins.
const DENY_PATTERNS: &[&str] = &[
    "denied",
    "rejected",
    "overload",
    "authentication failed",
    "maximum session duration reached",
];
const ALLOW_PATTERNS: &[&str] = &["client authenticated", "channels connected"];

fn classify(message: &str) -> Option<SessionTag> {
    let message = message.to_lowercase();
    if DENY_PATTERNS.iter().any(|p| message.contains(p)) {
        Some(SessionTag::Deny)
    } else if ALLOW_PATTERNS.iter().any(|p| message.contains(p)) {
        Some(SessionTag::Allow)
    } else {
        None
    }
}

/// Field name to ANSI color.
const FIELD_COLORS: &[(&str, &str)] = &[
    ("client", "36"),
    ("owner", "36"),
    ("channel", "33"),
    ("protocol", "33"),
    ("route_type", "33"),
    ("ip", "35"),
    ("host_ip", "35"),
    ("conn_id", "2"),
    ("duration", "32"),
    ("max_duration_secs", "32"),
    ("error", "31"),
    ("reason", "31"),
];

/// Color the `name=` part of every known field, word by word.
fn colorize_fields(line: &str) -> String {
    line.split(' ')
        .map(|word| {
            let colored = word.split_once('=').and_then(|(name, value)| {
                FIELD_COLORS
                    .iter()
                    .find(|(field, _)| *field == name)
                    .map(|(_, color)| format!("\x1b[{color}m{name}=\x1b[0m{value}"))
            });
            colored.unwrap_or_else(|| word.to_string())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Pretty formatter that tags admission and authentication outcomes and, on
/// a terminal, colors the host's structured fields.
pub struct HostEventFormatter<E> {
    inner: E,
    ansi: bool,
}

impl<E> HostEventFormatter<E> {
    pub fn new(inner: E, ansi: bool) -> Self {
        Self { inner, ansi }
    }
}

impl<S, N, E> FormatEvent<S, N> for HostEventFormatter<E>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
    E: FormatEvent<S, N>,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut message = MessageText::default();
        event.record(&mut message);

        if let Some(tag) = classify(&message.0) {
            if self.ansi {
                write!(writer, "\x1b[{}m{}\x1b[0m ", tag.color(), tag.label())?;
            } else {
                write!(writer, "{} ", tag.label())?;
            }
        }

        if !self.ansi {
            return self.inner.format_event(ctx, writer, event);
        }
        let mut line = String::new();
        self.inner.format_event(ctx, Writer::new(&mut line), event)?;
        write!(writer, "{}", colorize_fields(&line))
    }
}

/// The `message` field of an event. `message` always arrives as
/// `fmt::Arguments`, which is recorded through `record_debug`.
#[derive(Default)]
struct MessageText(String);

impl Visit for MessageText {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

/// Install the global subscriber. `level_override` (from the command line)
/// takes precedence over the configured level; an unparsable directive falls
/// back to `info`.
pub fn setup_logging(config: &LoggingConfig, level_override: Option<&str>) {
    let level = level_override
        .map(str::to_string)
        .unwrap_or_else(|| config.level.to_string());
    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));

    match config.format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        LogFormat::Pretty => {
            let ansi = std::io::stdout().is_terminal();
            tracing_subscriber::fmt()
                .event_format(HostEventFormatter::new(
                    tracing_subscriber::fmt::format::Format::default(),
                    ansi,
                ))
                .with_env_filter(filter)
                .init();
        }
    }
}
