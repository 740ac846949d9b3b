use std::borrow::Cow;
use std::fmt;

use super::core::Buffer;

/// Zero-copy window `[start, end)` over a parent [`Buffer`]'s storage.
///
/// Indices are absolute storage offsets, so they stay meaningful after the
/// parent's cursors move. The borrow keeps the parent alive and unmodified.
#[derive(Clone, Copy)]
pub struct View<'a> {
    buffer: &'a Buffer,
    start: usize,
    end: usize,
    terminated: bool,
}

impl<'a> View<'a> {
    pub(crate) fn new(buffer: &'a Buffer, start: usize, end: usize, terminated: bool) -> Self {
        Self {
            buffer,
            start,
            end,
            terminated,
        }
    }

    #[must_use]
    pub fn start(&self) -> usize {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> usize {
        self.end
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether this segment was closed by a delimiter (always `false` for slices)
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    #[must_use]
    pub fn as_bytes(&self) -> &'a [u8] {
        &self.buffer.storage()[self.start..self.end]
    }

    /// Text of the window, borrowed when it is valid UTF-8
    #[must_use]
    pub fn as_str(&self) -> Cow<'a, str> {
        String::from_utf8_lossy(self.as_bytes())
    }

    /// Copy the window into its own buffer, flipped and ready to read.
    #[must_use]
    pub fn get(&self) -> Buffer {
        let mut buf = Buffer::wrap(self.as_bytes());
        buf.flip();
        buf
    }
}

impl fmt::Debug for View<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("start", &self.start)
            .field("end", &self.end)
            .field("terminated", &self.terminated)
            .field("text", &self.as_str())
            .finish()
    }
}

impl PartialEq<&str> for View<'_> {
    fn eq(&self, other: &&str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

/// Iterator returned by [`Buffer::split`]. Single pass; not restartable.
pub struct Split<'a> {
    buffer: &'a Buffer,
    delimiter: u8,
    include_delimiter: bool,
    cursor: usize,
    end: usize,
}

impl<'a> Split<'a> {
    pub(crate) fn new(
        buffer: &'a Buffer,
        delimiter: u8,
        include_delimiter: bool,
        start: usize,
        end: usize,
    ) -> Self {
        Self {
            buffer,
            delimiter,
            include_delimiter,
            cursor: start,
            end,
        }
    }

    /// Absolute offset of the first byte not yet yielded
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

impl<'a> Iterator for Split<'a> {
    type Item = View<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.end {
            return None;
        }
        let start = self.cursor;
        let haystack = &self.buffer.storage()[start..self.end];
        match haystack.iter().position(|&b| b == self.delimiter) {
            Some(offset) => {
                let at = start + offset;
                let stop = if self.include_delimiter { at + 1 } else { at };
                self.cursor = at + 1;
                Some(View::new(self.buffer, start, stop, true))
            }
            None => {
                self.cursor = self.end;
                Some(View::new(self.buffer, start, self.end, false))
            }
        }
    }
}

/// Iterator returned by [`Buffer::frames`]: complete segments only.
pub struct Frames<'a> {
    inner: Split<'a>,
    remainder: Option<View<'a>>,
}

impl<'a> Frames<'a> {
    pub(crate) fn new(inner: Split<'a>) -> Self {
        Self {
            inner,
            remainder: None,
        }
    }

    /// Trailing bytes after the last delimiter, known once iteration has finished
    #[must_use]
    pub fn remainder(&self) -> Option<View<'a>> {
        self.remainder
    }
}

impl<'a> Iterator for Frames<'a> {
    type Item = View<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let view = self.inner.next()?;
        if view.is_terminated() {
            Some(view)
        } else {
            self.remainder = Some(view);
            None
        }
    }
}
