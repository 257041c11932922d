//! Optional logging macros
//!
//! Forward to the `log` crate when the `log` feature is enabled and compile
//! to nothing otherwise, so embedded builds carry no formatting code.

#[cfg(feature = "log")]
macro_rules! hub_debug {
    ($($arg:tt)*) => { log::debug!($($arg)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! hub_debug {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "log")]
macro_rules! hub_info {
    ($($arg:tt)*) => { log::info!($($arg)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! hub_info {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "log")]
macro_rules! hub_warn {
    ($($arg:tt)*) => { log::warn!($($arg)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! hub_warn {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "log")]
macro_rules! hub_error {
    ($($arg:tt)*) => { log::error!($($arg)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! hub_error {
    ($($arg:tt)*) => {};
}

pub(crate) use hub_debug;
pub(crate) use hub_error;
pub(crate) use hub_info;
pub(crate) use hub_warn;
