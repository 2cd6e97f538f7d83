use crate::ImageRef;

/// Focused-image selection for the full-size viewer.
///
/// Indices are absolute positions in the feed sequence. Every operation takes
/// the current sequence length so the selection stays addressable even after
/// realtime prepends shifted it; the shift itself is not corrected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Lightbox {
    focused: usize,
    open: bool,
}

impl Lightbox {
    pub fn open_at(&mut self, index: usize, len: usize) {
        if len == 0 {
            return;
        }
        self.focused = index.min(len - 1);
        self.open = true;
    }

    pub fn close(&mut self) {
        self.open = false;
        self.focused = 0;
    }

    pub fn prev(&mut self, len: usize) {
        if !self.open || len == 0 {
            return;
        }
        self.focused = self.focused.min(len - 1).saturating_sub(1);
    }

    pub fn next(&mut self, len: usize) {
        if !self.open || len == 0 {
            return;
        }
        self.focused = (self.focused + 1).min(len - 1);
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Focused index clamped to the current length, `None` when closed or
    /// nothing is left to show.
    pub fn focused(&self, len: usize) -> Option<usize> {
        if !self.open || len == 0 {
            return None;
        }
        Some(self.focused.min(len - 1))
    }

    pub fn current<'a>(&self, sequence: &'a [ImageRef]) -> Option<&'a ImageRef> {
        self.focused(sequence.len()).and_then(|i| sequence.get(i))
    }
}
