//! Crash reports written from the panic hook.

mod report;
mod sanitize;

pub use report::write_crash_report;
pub use sanitize::sanitize_secrets;
