//! Terminal-backed splash and main window.

mod dashboard;
mod splash;
mod window;

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

pub use dashboard::DashboardViewModel;
pub use splash::ConsoleSplash;
pub use window::ConsoleWindow;

type Sink = Box<dyn Write + Send>;

/// Shared line-oriented output. Write errors are ignored.
#[derive(Clone)]
pub struct Console {
    sink: Arc<Mutex<Sink>>,
}

impl Console {
    pub fn stdout() -> Self {
        Self::from_writer(io::stdout())
    }

    pub fn stderr() -> Self {
        Self::from_writer(io::stderr())
    }

    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn line(&self, text: impl AsRef<str>) {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = writeln!(sink, "{}", text.as_ref());
        let _ = sink.flush();
    }
}

/// In-memory console for tests.
#[cfg(test)]
pub(crate) fn captured() -> (Console, Arc<Mutex<Vec<u8>>>) {
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    let buffer = Arc::new(Mutex::new(Vec::new()));
    (Console::from_writer(Shared(buffer.clone())), buffer)
}

#[cfg(test)]
pub(crate) fn text(buffer: &Arc<Mutex<Vec<u8>>>) -> String {
    String::from_utf8_lossy(&buffer.lock().unwrap()).into_owned()
}
