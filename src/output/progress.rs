//! Crawl progress channel
//!
//! The coordinator reports status lines and two percentages (outer tier over
//! products, inner tier over the current product's versions). Events are
//! plain data for a host to display or ignore; a dropped receiver never
//! affects the crawl.

use tokio::sync::mpsc::UnboundedSender;

/// One progress update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlEvent {
    /// Human-readable status line
    Status(String),

    /// Outer-tier percentage (products)
    Overall(u8),

    /// Inner-tier percentage (versions of the current product)
    Inner(u8),
}

/// Integer percentage of `done` over `total`, capped at 100
pub fn percent(done: usize, total: usize) -> u8 {
    let pct = done.saturating_mul(100) / total.max(1);
    pct.min(100) as u8
}

/// Emits progress events, keeping each tier monotonically non-decreasing
#[derive(Debug, Default)]
pub struct ProgressReporter {
    sender: Option<UnboundedSender<CrawlEvent>>,
    overall: Option<u8>,
    inner: Option<u8>,
}

impl ProgressReporter {
    pub fn new(sender: Option<UnboundedSender<CrawlEvent>>) -> Self {
        Self {
            sender,
            overall: None,
            inner: None,
        }
    }

    /// Logs a status line and forwards it to the host
    pub fn status(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{}", message);
        self.send(CrawlEvent::Status(message));
    }

    /// Reports outer-tier progress; values below the last report are ignored
    pub fn overall(&mut self, pct: u8) {
        if let Some(pct) = advance(&mut self.overall, pct) {
            self.send(CrawlEvent::Overall(pct));
        }
    }

    /// Reports inner-tier progress; values below the last report are ignored
    pub fn inner(&mut self, pct: u8) {
        if let Some(pct) = advance(&mut self.inner, pct) {
            self.send(CrawlEvent::Inner(pct));
        }
    }

    /// Starts a new inner tier at 0 (called once per product)
    pub fn reset_inner(&mut self) {
        self.inner = Some(0);
        self.send(CrawlEvent::Inner(0));
    }

    pub fn last_overall(&self) -> Option<u8> {
        self.overall
    }

    fn send(&self, event: CrawlEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }
}

fn advance(last: &mut Option<u8>, pct: u8) -> Option<u8> {
    let pct = pct.min(100);
    match *last {
        Some(prev) if pct <= prev => None,
        _ => {
            *last = Some(pct);
            Some(pct)
        }
    }
}
