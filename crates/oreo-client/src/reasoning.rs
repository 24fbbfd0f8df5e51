//! Reasoning block filtering
//!
//! Reasoning models wrap their deliberation in a marker pair
//! (`<think>...</think>` by default). The filter always runs over the whole
//! text accumulated so far, so a marker split across two stream records is
//! still recognised once both halves have arrived.

use crate::config::ReasoningMarkers;

/// Strips marker-delimited reasoning blocks from accumulated text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasoningFilter {
    open: String,
    close: String,
}

impl Default for ReasoningFilter {
    fn default() -> Self {
        Self::from_markers(&ReasoningMarkers::default())
    }
}

impl ReasoningFilter {
    /// Create a filter for a custom marker pair
    pub fn new(open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            open: open.into(),
            close: close.into(),
        }
    }

    pub fn from_markers(markers: &ReasoningMarkers) -> Self {
        Self::new(markers.open.clone(), markers.close.clone())
    }

    /// Return the visible part of `text`.
    ///
    /// Closed blocks are removed together with their markers. An opening
    /// marker with no closing marker yet hides everything after it.
    pub fn filter(&self, text: &str) -> String {
        if self.open.is_empty() {
            return text.to_string();
        }

        let mut visible = String::with_capacity(text.len());
        let mut remaining = text;
        while let Some(start) = remaining.find(&self.open) {
            visible.push_str(&remaining[..start]);
            let after_open = &remaining[start + self.open.len()..];
            match after_open.find(&self.close) {
                Some(end) => remaining = &after_open[end + self.close.len()..],
                // Still open: provisionally hidden
                None => return visible,
            }
        }
        visible.push_str(remaining);
        visible
    }

    /// Length of the longest suffix of `text` that is a proper prefix of the
    /// opening marker, i.e. text that may still turn into a marker.
    fn partial_open_len(&self, text: &str) -> usize {
        (1..self.open.len())
            .rev()
            .filter(|&k| self.open.is_char_boundary(k))
            .find(|&k| text.ends_with(&self.open[..k]))
            .unwrap_or(0)
    }
}

/// Turns cumulative raw text into visible deltas.
///
/// Each pushed fragment is appended to the raw buffer, the whole buffer is
/// re-filtered, and only the new visible suffix is returned. A trailing
/// fragment that could still become an opening marker is held back until the
/// next push or `finish`.
#[derive(Debug, Clone, Default)]
pub struct DeltaTracker {
    filter: ReasoningFilter,
    raw: String,
    emitted: String,
}

impl DeltaTracker {
    pub fn new(filter: ReasoningFilter) -> Self {
        Self {
            filter,
            raw: String::new(),
            emitted: String::new(),
        }
    }

    /// Append a raw fragment and return the newly visible text, if any
    pub fn push(&mut self, fragment: &str) -> Option<String> {
        self.raw.push_str(fragment);
        let visible = self.filter.filter(&self.raw);
        let stable = visible.len() - self.filter.partial_open_len(&visible);
        self.advance(&visible[..stable])
    }

    /// Flush any held-back text once the stream has ended
    pub fn finish(&mut self) -> Option<String> {
        let visible = self.filter.filter(&self.raw);
        self.advance(&visible)
    }

    /// Visible text emitted so far
    pub fn visible(&self) -> &str {
        &self.emitted
    }

    /// Raw text received so far, reasoning included
    pub fn raw(&self) -> &str {
        &self.raw
    }

    fn advance(&mut self, visible: &str) -> Option<String> {
        match visible.strip_prefix(self.emitted.as_str()) {
            Some("") => None,
            Some(suffix) => {
                let delta = suffix.to_string();
                self.emitted.push_str(&delta);
                Some(delta)
            }
            None => {
                // Not an extension of what was shown: restart from here
                tracing::debug!(
                    previous = self.emitted.len(),
                    current = visible.len(),
                    "visible text diverged, re-emitting"
                );
                self.emitted = visible.to_string();
                if visible.is_empty() {
                    None
                } else {
                    Some(visible.to_string())
                }
            }
        }
    }
}
