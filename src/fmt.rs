//! # Logging Macros
//!
//! Crate-internal logging front end. The backend is chosen with a Cargo feature:
//!
//! - `log`: forwards to the [`log`](https://docs.rs/log) facade.
//! - `defmt`: forwards to [`defmt`](https://defmt.ferrous-systems.com/).
//! - `esp32-log`: prints through `esp-println` with a level prefix.
//!
//! With no backend enabled every macro expands to a no-op that still borrows its
//! arguments, so call sites never trigger unused-variable warnings.
//!
//! Arguments must be printable by every enabled backend. In practice that means
//! primitives, `&str`, and the crate's own types, which derive both `Debug` and
//! `defmt::Format`.

#![macro_use]
#![allow(unused_macros)]

macro_rules! log_dispatch {
    ($level:ident, $prefix:literal, $s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "log")]
            ::log::$level!($s $(, $x)*);
            #[cfg(feature = "defmt")]
            ::defmt::$level!($s $(, $x)*);
            #[cfg(feature = "esp32-log")]
            ::esp_println::println!(concat!($prefix, " - ", $s) $(, $x)*);
            #[cfg(not(any(feature = "log", feature = "defmt", feature = "esp32-log")))]
            let _ = ($( &$x, )*);
        }
    };
}

macro_rules! trace {
    ($($arg:tt)*) => { log_dispatch!(trace, "TRACE", $($arg)*) };
}

macro_rules! debug {
    ($($arg:tt)*) => { log_dispatch!(debug, "DEBUG", $($arg)*) };
}

macro_rules! info {
    ($($arg:tt)*) => { log_dispatch!(info, "INFO", $($arg)*) };
}

macro_rules! warn {
    ($($arg:tt)*) => { log_dispatch!(warn, "WARN", $($arg)*) };
}

macro_rules! error {
    ($($arg:tt)*) => { log_dispatch!(error, "ERROR", $($arg)*) };
}

/// Logs a value through its `Debug` impl on every backend, including
/// `defmt`, which otherwise needs `defmt::Format`.
pub(crate) struct DebugFmt<'a, T: core::fmt::Debug>(pub &'a T);

impl<T: core::fmt::Debug> core::fmt::Debug for DebugFmt<'_, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(feature = "defmt")]
impl<T: core::fmt::Debug> defmt::Format for DebugFmt<'_, T> {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{}", defmt::Debug2Format(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::DebugFmt;

    #[derive(Debug)]
    enum BusError {
        Nack(u8),
    }

    #[test]
    fn debug_fmt_forwards_to_debug() {
        assert_eq!(format!("{:?}", DebugFmt(&BusError::Nack(0x62))), "Nack(98)");
    }
}
