//! Internal logging helpers for structured quiver events.

/// Single logging target for quiver.
pub(crate) const LOG_TARGET: &str = "quiver";

macro_rules! quiver_log {
    ($level:expr, $event:expr, $fmt:expr $(, $args:expr)* $(,)?) => {{
        if log::log_enabled!(target: crate::logging::LOG_TARGET, $level) {
            log::log!(
                target: crate::logging::LOG_TARGET,
                $level,
                "event={} {}",
                $event,
                format_args!($fmt $(, $args)*)
            );
        }
    }};
}

pub(crate) use quiver_log;
