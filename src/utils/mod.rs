mod futures;
mod mutex_cell;

pub use futures::OptionFuture;
pub use mutex_cell::MutexCell;

#[macro_export]
macro_rules! ensure {
    ($cond:expr) => {
        if !($cond) {
            return None;
        }
    };
    ($cond:expr, $err:expr) => {
        if !($cond) {
            return Err($err.into());
        }
    };
    ($cond:expr, $err:expr, $($arg:tt)+) => {
        if !($cond) {
            tracing::warn!($($arg)+);
            return Err($err.into());
        }
    };
}

#[macro_export]
macro_rules! log_assert {
    ($cond:expr) => {
        if !($cond) {
            tracing::warn!("Assertion failed: {}", stringify!($cond));
        }
    };
}
