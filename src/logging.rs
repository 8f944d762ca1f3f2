use tokio::sync::broadcast;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::MakeWriter;

/// Capacity of the in-process log feed served at `/api/logs`.
pub(crate) const LOG_FEED_CAPACITY: usize = 500;

/// Tees every formatted log line into the log feed and, unless
/// suppressed, to stdout.
#[derive(Clone)]
pub(crate) struct LogFeedMakeWriter {
    pub sender: broadcast::Sender<String>,
    pub suppress_stdout: bool,
}

impl<'a> MakeWriter<'a> for LogFeedMakeWriter {
    type Writer = LogFeedWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogFeedWriter {
            sender: self.sender.clone(),
            suppress_stdout: self.suppress_stdout,
        }
    }
}

pub(crate) struct LogFeedWriter {
    sender: broadcast::Sender<String>,
    suppress_stdout: bool,
}

impl std::io::Write for LogFeedWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let msg = String::from_utf8_lossy(buf).to_string();
        let _ = self.sender.send(msg); // Ignored if no receivers
        if !self.suppress_stdout {
            std::io::stdout().write_all(buf)?;
        }
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        if !self.suppress_stdout {
            std::io::stdout().flush()?;
        }
        Ok(())
    }
}

/// Unknown names fall back to `info`.
pub(crate) fn parse_level(name: &str) -> Level {
    name.trim().parse().unwrap_or(Level::INFO)
}

/// Installs the global subscriber. A second call is a no-op.
pub(crate) fn init_tracing(level: &str, sender: broadcast::Sender<String>) {
    let make_writer = LogFeedMakeWriter {
        sender,
        suppress_stdout: false,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_level(level))
        .with_writer(make_writer)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}
