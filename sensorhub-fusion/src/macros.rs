//! Optional logging macros, compiled out without the `log` feature

#[cfg(feature = "log")]
macro_rules! fusion_debug {
    ($($arg:tt)*) => { log::debug!($($arg)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! fusion_debug {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "log")]
macro_rules! fusion_warn {
    ($($arg:tt)*) => { log::warn!($($arg)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! fusion_warn {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "log")]
macro_rules! fusion_error {
    ($($arg:tt)*) => { log::error!($($arg)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! fusion_error {
    ($($arg:tt)*) => {};
}

pub(crate) use fusion_debug;
pub(crate) use fusion_error;
pub(crate) use fusion_warn;
