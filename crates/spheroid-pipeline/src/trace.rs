//! Trace sinks: observers for labelled intermediate buffers.
//!
//! Every pipeline stage hands its output buffer to a [`TraceSink`]
//! together with a short human-readable label. The pipeline never reads
//! anything back from the sink, so tracing cannot change results.
//!
//! Sinks are passed explicitly; images processed concurrently each own
//! one.

use image::GrayImage;

/// Receiver of labelled intermediate buffers.
pub trait TraceSink {
    /// Record one intermediate buffer.
    fn record(&mut self, label: &str, image: &GrayImage);

    /// Whether recorded buffers are used at all.
    ///
    /// Stages skip rendering trace-only buffers when this is `false`.
    fn enabled(&self) -> bool {
        true
    }
}

/// A sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTrace;

impl TraceSink for NoopTrace {
    fn record(&mut self, _label: &str, _image: &GrayImage) {}

    fn enabled(&self) -> bool {
        false
    }
}

/// A sink that keeps every buffer in memory, in recording order.
#[derive(Debug, Clone, Default)]
pub struct MemoryTrace {
    entries: Vec<(String, GrayImage)>,
}

impl MemoryTrace {
    /// Create an empty trace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded labels, in order.
    #[must_use]
    pub fn labels(&self) -> Vec<&str> {
        self.entries.iter().map(|(label, _)| label.as_str()).collect()
    }

    /// The first buffer recorded under `label`.
    #[must_use]
    pub fn get(&self, label: &str) -> Option<&GrayImage> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, image)| image)
    }

    /// Number of recorded buffers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consume the trace and return its entries.
    #[must_use]
    pub fn into_entries(self) -> Vec<(String, GrayImage)> {
        self.entries
    }
}

impl TraceSink for MemoryTrace {
    fn record(&mut self, label: &str, image: &GrayImage) {
        self.entries.push((label.to_owned(), image.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_trace_keeps_order_and_buffers() {
        let mut trace = MemoryTrace::new();
        trace.record("input", &GrayImage::new(3, 2));
        trace.record("thresholding", &GrayImage::from_pixel(1, 1, image::Luma([9])));
        assert_eq!(trace.labels(), vec!["input", "thresholding"]);
        assert_eq!(trace.len(), 2);
        assert_eq!(trace.get("input").map(GrayImage::dimensions), Some((3, 2)));
        assert_eq!(trace.get("thresholding").map(|i| i.get_pixel(0, 0).0[0]), Some(9));
        assert!(trace.get("missing").is_none());
    }

    #[test]
    fn noop_trace_is_disabled() {
        let mut trace = NoopTrace;
        trace.record("input", &GrayImage::new(1, 1));
        assert!(!trace.enabled());
        assert!(MemoryTrace::new().enabled());
    }
}
