use std::io::{self, IsTerminal};

use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Fallback filter when `RUST_LOG` is unset: quiet dependencies, our crates at info.
const DEFAULT_FILTER: &str = "warn,adaptive_rag=info,rag_orchestrator=info,rag_store=info,ai_llm_service=info";

/// RFC3339 UTC timer implemented via `chrono`.
/// Example output: `2025-09-12T10:20:30Z`
#[derive(Clone, Debug, Default)]
struct ChronoRfc3339Utc;

impl FormatTime for ChronoRfc3339Utc {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = chrono::Utc::now();
        let s = now.to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        w.write_str(&s)
    }
}

/// Installs the global subscriber.
///
/// - `EnvFilter` from `RUST_LOG`, falling back to [`DEFAULT_FILTER`]
/// - compact single-line events with `file:line`
/// - span close events (durations of instrumented stages)
/// - ANSI colors only when stderr is a terminal
///
/// Logs go to stderr so the streamed answer on stdout stays clean.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let ansi = io::stderr().is_terminal();
    let format = fmt::format()
        .compact()
        .with_timer(ChronoRfc3339Utc)
        .with_level(true)
        .with_target(true)
        .with_source_location(true);

    let layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(ansi)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .event_format(format);

    if let Err(e) = tracing_subscriber::registry().with(filter).with(layer).try_init() {
        eprintln!("tracing subscriber already installed: {e}");
    }
}
