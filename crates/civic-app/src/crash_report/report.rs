use std::backtrace::Backtrace;
use std::panic::PanicHookInfo;
use std::path::PathBuf;

use super::sanitize::sanitize_secrets;
use crate::paths::crash_report_dir;

/// Write a JSON crash report for a panic. Returns the report path, or `None`
/// if anything failed; never panics itself.
///
/// On Unix the file is readable by the owner only.
pub fn write_crash_report(info: &PanicHookInfo) -> Option<PathBuf> {
    let now = chrono::Utc::now();
    let dir = crash_report_dir();
    std::fs::create_dir_all(&dir).ok()?;
    let path = dir.join(format!("crash_{}.json", now.format("%Y%m%d_%H%M%S")));

    let message = if let Some(s) = info.payload().downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = info.payload().downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    };

    let location = info.location().map(|loc| {
        serde_json::json!({
            "file": loc.file(),
            "line": loc.line(),
            "column": loc.column(),
        })
    });

    let report = serde_json::json!({
        "timestamp": now.to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "os": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
        "thread": std::thread::current().name().unwrap_or("unnamed"),
        "panic_message": sanitize_secrets(&message),
        "location": location,
        "backtrace": sanitize_secrets(&Backtrace::force_capture().to_string()),
    });

    std::fs::write(&path, serde_json::to_string_pretty(&report).ok()?).ok()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600));
    }

    Some(path)
}
