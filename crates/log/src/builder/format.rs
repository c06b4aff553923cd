//! Format layer creation
//!
//! The fmt builder changes type with every formatter choice, so each
//! format gets its own expansion of the shared display settings.

use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::{FormatTime, SystemTime};

/// Timestamp writer that can be switched off without changing the layer type
#[derive(Debug, Clone, Copy)]
pub(crate) struct Timer {
    pub(crate) enabled: bool,
}

impl FormatTime for Timer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        if self.enabled {
            SystemTime.format_time(w)
        } else {
            Ok(())
        }
    }
}

/// Apply [`DisplayConfig`](crate::DisplayConfig) to a text layer.
macro_rules! create_fmt_layer {
    ($style:ident, $display:expr) => {{
        let display = $display;
        tracing_subscriber::fmt::layer()
            .$style()
            .with_writer(std::io::stderr)
            .with_timer($crate::builder::format::Timer { enabled: display.time })
            .with_ansi(display.colors)
            .with_target(display.target)
            .with_thread_ids(display.thread_ids)
            .with_file(display.source)
            .with_line_number(display.source)
    }};
}

/// Apply [`DisplayConfig`](crate::DisplayConfig) to a JSON layer.
macro_rules! create_json_layer {
    ($display:expr) => {{
        let display = $display;
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(display.flatten)
            .with_writer(std::io::stderr)
            .with_timer($crate::builder::format::Timer { enabled: display.time })
            .with_target(display.target)
            .with_thread_ids(display.thread_ids)
            .with_file(display.source)
            .with_line_number(display.source)
    }};
}
