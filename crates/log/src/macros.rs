//! Convenience macros for structured logging

/// Log an error and return it
#[macro_export]
macro_rules! log_error {
    ($err:expr) => {{
        let e = $err;
        $crate::error!(error = %e);
        e
    }};
    ($err:expr, $($arg:tt)*) => {{
        let e = $err;
        $crate::error!(error = %e, $($arg)*);
        e
    }};
}

/// Run a future inside an info span and log how long it took
#[macro_export]
macro_rules! measure {
    ($name:expr, $future:expr) => {{
        use $crate::Instrument as _;
        let __start = std::time::Instant::now();
        let result = $future.instrument($crate::info_span!($name)).await;
        $crate::info!(name = %$name, elapsed_ms = __start.elapsed().as_millis(), "operation completed");
        result
    }};
}
