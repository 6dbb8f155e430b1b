// Forwards to the `log` facade when the `log` feature is enabled and compiles
// the arguments away otherwise.

#[cfg(feature = "log")]
macro_rules! debug {
    ($($arg:tt)+) => { ::log::debug!($($arg)+) };
}

#[cfg(not(feature = "log"))]
macro_rules! debug {
    ($($arg:tt)+) => {{ let _ = format_args!($($arg)+); }};
}

#[cfg(feature = "log")]
macro_rules! info {
    ($($arg:tt)+) => { ::log::info!($($arg)+) };
}

#[cfg(not(feature = "log"))]
macro_rules! info {
    ($($arg:tt)+) => {{ let _ = format_args!($($arg)+); }};
}

#[cfg(feature = "log")]
macro_rules! warn {
    ($($arg:tt)+) => { ::log::warn!($($arg)+) };
}

#[cfg(not(feature = "log"))]
macro_rules! warn {
    ($($arg:tt)+) => {{ let _ = format_args!($($arg)+); }};
}
