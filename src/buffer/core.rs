use crate::error::{ReactorError, Result};
use std::fmt;

use super::view::{Frames, Split, View};

/// Default capacity used by codecs that allocate scratch buffers
pub const SMALL_BUFFER_SIZE: usize = 16 * 1024;

/// Hard ceiling for geometric growth of a growable buffer
pub const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Smallest allocation made when a buffer grows from empty
const MIN_GROWTH: usize = 64;

/// Growable byte container with a write cursor (`position`) and a readable bound (`limit`).
///
/// See the [module documentation](super) for the cursor model.
#[derive(Clone)]
pub struct Buffer {
    storage: Vec<u8>,
    position: usize,
    limit: usize,
    fixed: bool,
    reading: bool,
    mark: Option<(usize, usize, bool)>,
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("position", &self.position)
            .field("limit", &self.limit)
            .field("capacity", &self.capacity())
            .field("fixed", &self.fixed)
            .field("reading", &self.reading)
            .finish()
    }
}

impl Buffer {
    /// Create an empty growable buffer. Storage is allocated on first write.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0, false)
    }

    /// Create a buffer with the given capacity.
    ///
    /// A `fixed` buffer never grows: writes past its capacity fail with
    /// [`ReactorError::Overflow`] and leave the content untouched.
    #[must_use]
    pub fn with_capacity(capacity: usize, fixed: bool) -> Self {
        Self {
            storage: vec![0; capacity],
            position: 0,
            limit: capacity,
            fixed,
            reading: false,
            mark: None,
        }
    }

    /// Wrap the given bytes in a fixed-length buffer of exactly their size.
    ///
    /// The buffer is left in write mode with `position` at the end, so
    /// `Buffer::wrap(s).flip()` reads back `s`.
    #[must_use]
    pub fn wrap(bytes: impl AsRef<[u8]>) -> Self {
        let bytes = bytes.as_ref();
        Self {
            storage: bytes.to_vec(),
            position: bytes.len(),
            limit: bytes.len(),
            fixed: true,
            reading: false,
            mark: None,
        }
    }

    /// Total size of the backing storage
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    #[inline]
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    #[inline]
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Bytes between `position` and `limit`
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.limit - self.position
    }

    /// Bytes a read can consume: `limit - position` in read mode, none in write mode
    #[inline]
    #[must_use]
    pub fn readable(&self) -> usize {
        if self.reading {
            self.limit - self.position
        } else {
            0
        }
    }

    #[inline]
    #[must_use]
    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    /// Whether the buffer has been flipped into read mode
    #[inline]
    #[must_use]
    pub fn is_reading(&self) -> bool {
        self.reading
    }

    /// Number of content bytes (see [`Buffer::as_bytes`])
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        let (start, end) = self.content_bounds();
        end - start
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Move the cursor. Fails if `position` would pass the limit.
    pub fn set_position(&mut self, position: usize) -> Result<&mut Self> {
        if position > self.limit {
            return Err(ReactorError::Underflow {
                requested: position,
                remaining: self.limit,
            });
        }
        self.position = position;
        Ok(self)
    }

    /// Move the limit. Fails past the capacity; clamps `position` down to the new limit.
    pub fn set_limit(&mut self, limit: usize) -> Result<&mut Self> {
        if limit > self.capacity() {
            return Err(ReactorError::Overflow {
                requested: limit,
                available: self.capacity(),
            });
        }
        self.limit = limit;
        self.position = self.position.min(limit);
        Ok(self)
    }

    /// Switch from write mode to read mode: `limit = position`, `position = 0`.
    pub fn flip(&mut self) -> &mut Self {
        self.limit = self.position;
        self.position = 0;
        self.reading = true;
        self
    }

    /// Reset to an empty write-mode buffer, keeping the capacity.
    pub fn clear(&mut self) -> &mut Self {
        self.position = 0;
        self.limit = self.capacity();
        self.reading = false;
        self.mark = None;
        self
    }

    /// Save `(position, limit)` so a speculative parse can be rolled back with [`Buffer::reset`].
    pub fn snapshot(&mut self) -> &mut Self {
        self.mark = Some((self.position, self.limit, self.reading));
        self
    }

    /// Restore the cursors saved by the last [`Buffer::snapshot`]. No-op without one.
    pub fn reset(&mut self) -> &mut Self {
        if let Some((position, limit, reading)) = self.mark {
            self.position = position;
            self.limit = limit;
            self.reading = reading;
        }
        self
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Append raw bytes (or any `AsRef<[u8]>`, such as `&str`) after the content.
    pub fn append(&mut self, bytes: impl AsRef<[u8]>) -> Result<&mut Self> {
        let bytes = bytes.as_ref();
        let at = self.write_index();
        self.ensure_room(at, bytes.len())?;
        self.storage[at..at + bytes.len()].copy_from_slice(bytes);
        self.advance_write(bytes.len());
        Ok(self)
    }

    pub fn append_byte(&mut self, b: u8) -> Result<&mut Self> {
        self.append([b])
    }

    /// Append the UTF-8 encoding of `c`
    pub fn append_char(&mut self, c: char) -> Result<&mut Self> {
        let mut utf8 = [0u8; 4];
        let encoded = c.encode_utf8(&mut utf8);
        self.append(encoded.as_bytes())
    }

    /// Append a 4-byte integer in native byte order
    pub fn append_int(&mut self, i: i32) -> Result<&mut Self> {
        self.append(i.to_ne_bytes())
    }

    /// Append an 8-byte integer in native byte order
    pub fn append_long(&mut self, l: i64) -> Result<&mut Self> {
        self.append(l.to_ne_bytes())
    }

    /// Append the content of another buffer without consuming it
    pub fn append_buffer(&mut self, other: &Buffer) -> Result<&mut Self> {
        self.append(other.as_bytes())
    }

    /// Insert bytes ahead of the content, shifting the existing content forward.
    pub fn prepend(&mut self, bytes: impl AsRef<[u8]>) -> Result<&mut Self> {
        let bytes = bytes.as_ref();
        let n = bytes.len();
        if n == 0 {
            return Ok(self);
        }
        let (start, end) = self.content_bounds();
        self.ensure_room(end, n)?;
        self.storage.copy_within(start..end, start + n);
        self.storage[start..start + n].copy_from_slice(bytes);
        self.advance_write(n);
        Ok(self)
    }

    pub fn prepend_byte(&mut self, b: u8) -> Result<&mut Self> {
        self.prepend([b])
    }

    pub fn prepend_char(&mut self, c: char) -> Result<&mut Self> {
        let mut utf8 = [0u8; 4];
        let encoded = c.encode_utf8(&mut utf8);
        self.prepend(encoded.as_bytes())
    }

    pub fn prepend_int(&mut self, i: i32) -> Result<&mut Self> {
        self.prepend(i.to_ne_bytes())
    }

    pub fn prepend_long(&mut self, l: i64) -> Result<&mut Self> {
        self.prepend(l.to_ne_bytes())
    }

    pub fn prepend_buffer(&mut self, other: &Buffer) -> Result<&mut Self> {
        self.prepend(other.as_bytes())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Consume one byte
    pub fn read(&mut self) -> Result<u8> {
        let [b] = self.read_array::<1>()?;
        Ok(b)
    }

    /// Consume one UTF-8 encoded character
    pub fn read_char(&mut self) -> Result<char> {
        let first = *self
            .storage
            .get(self.position)
            .filter(|_| self.readable() > 0)
            .ok_or(ReactorError::Underflow {
                requested: 1,
                remaining: 0,
            })?;
        let width = match first {
            0x00..=0x7f => 1,
            0xc0..=0xdf => 2,
            0xe0..=0xef => 3,
            _ => 4,
        };
        let bytes = self.read_bytes(width)?;
        std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.chars().next())
            .ok_or_else(|| ReactorError::codec("invalid UTF-8 character"))
    }

    /// Consume a 4-byte integer in native byte order
    pub fn read_int(&mut self) -> Result<i32> {
        Ok(i32::from_ne_bytes(self.read_array::<4>()?))
    }

    /// Consume an 8-byte integer in native byte order
    pub fn read_long(&mut self) -> Result<i64> {
        Ok(i64::from_ne_bytes(self.read_array::<8>()?))
    }

    /// Consume `n` bytes, returning them as a borrowed slice.
    ///
    /// Only a flipped buffer can be read; in write mode every read underflows.
    pub fn read_bytes(&mut self, n: usize) -> Result<&[u8]> {
        if n > self.readable() {
            return Err(ReactorError::Underflow {
                requested: n,
                remaining: self.readable(),
            });
        }
        let start = self.position;
        self.position += n;
        Ok(&self.storage[start..start + n])
    }

    /// Advance the read cursor by up to `n` bytes, stopping at the limit. Returns bytes skipped.
    pub fn skip(&mut self, n: usize) -> usize {
        let n = n.min(self.readable());
        self.position += n;
        n
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Content bytes: `[0, position)` in write mode, `[position, limit)` in read mode
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        let (start, end) = self.content_bounds();
        &self.storage[start..end]
    }

    /// Content decoded as UTF-8 (lossy). Does not move the cursors.
    #[must_use]
    pub fn as_string(&self) -> String {
        String::from_utf8_lossy(self.as_bytes()).into_owned()
    }

    /// First content byte, without moving the cursors
    #[must_use]
    pub fn first(&self) -> Option<u8> {
        self.as_bytes().first().copied()
    }

    /// Last content byte, without moving the cursors
    #[must_use]
    pub fn last(&self) -> Option<u8> {
        self.as_bytes().last().copied()
    }

    /// Decode the absolute storage range `[start, end)` as text, without moving the cursors.
    pub fn substring(&self, start: usize, end: usize) -> Result<String> {
        let (_, content_end) = self.content_bounds();
        if start > end || end > content_end {
            return Err(ReactorError::Underflow {
                requested: end,
                remaining: content_end,
            });
        }
        Ok(String::from_utf8_lossy(&self.storage[start..end]).into_owned())
    }

    /// Absolute index of the first occurrence of `b` in the content
    #[must_use]
    pub fn index_of(&self, b: u8) -> Option<usize> {
        let (start, _) = self.content_bounds();
        self.as_bytes()
            .iter()
            .position(|&x| x == b)
            .map(|i| i + start)
    }

    /// Parse the ASCII decimal digits in the absolute range `[start, end)`.
    ///
    /// Returns `None` for an empty range, a non-digit byte, or overflow.
    #[must_use]
    pub fn parse_int(&self, start: usize, end: usize) -> Option<i64> {
        let (content_start, content_end) = self.content_bounds();
        if start >= end || start < content_start || end > content_end {
            return None;
        }
        self.storage[start..end].iter().try_fold(0i64, |acc, &b| {
            if b.is_ascii_digit() {
                acc.checked_mul(10)?.checked_add(i64::from(b - b'0'))
            } else {
                None
            }
        })
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    /// Lazily split the content on `delimiter`.
    ///
    /// Every segment is yielded, including a trailing one with no delimiter;
    /// [`View::is_terminated`] tells them apart. An empty buffer yields nothing
    /// and a trailing delimiter does not produce an empty segment.
    #[must_use]
    pub fn split(&self, delimiter: u8, include_delimiter: bool) -> Split<'_> {
        let (start, end) = self.content_bounds();
        Split::new(self, delimiter, include_delimiter, start, end)
    }

    /// Like [`Buffer::split`] but only yields delimiter-terminated segments.
    ///
    /// A trailing partial segment is held back and exposed through
    /// [`Frames::remainder`] once the iterator is exhausted.
    #[must_use]
    pub fn frames(&self, delimiter: u8, include_delimiter: bool) -> Frames<'_> {
        Frames::new(self.split(delimiter, include_delimiter))
    }

    /// Carve the content into zero-copy views at the given sorted absolute offsets.
    ///
    /// Offsets `[p0, p1, .., pn]` produce the regions `[p0, p1)`, `[p1, p2)`, ..,
    /// `[pn, end)` where `end` is the end of the content.
    pub fn slice(&self, positions: &[usize]) -> Result<Vec<View<'_>>> {
        let (_, end) = self.content_bounds();
        if positions.windows(2).any(|w| w[0] > w[1]) {
            return Err(ReactorError::configuration(
                "slice positions must be sorted in ascending order",
            ));
        }
        if let Some(&last) = positions.last() {
            if last > end {
                return Err(ReactorError::Underflow {
                    requested: last,
                    remaining: end,
                });
            }
        }

        let mut views = Vec::with_capacity(positions.len());
        for (i, &start) in positions.iter().enumerate() {
            let stop = positions.get(i + 1).copied().unwrap_or(end);
            views.push(View::new(self, start, stop, false));
        }
        Ok(views)
    }

    /// Zero-copy view over an absolute range of the content
    pub fn view(&self, start: usize, end: usize) -> Result<View<'_>> {
        let (_, content_end) = self.content_bounds();
        if start > end || end > content_end {
            return Err(ReactorError::Underflow {
                requested: end,
                remaining: content_end,
            });
        }
        Ok(View::new(self, start, end, false))
    }

    pub(crate) fn storage(&self) -> &[u8] {
        &self.storage
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn content_bounds(&self) -> (usize, usize) {
        if self.reading {
            (self.position, self.limit)
        } else {
            (0, self.position)
        }
    }

    fn write_index(&self) -> usize {
        if self.reading {
            self.limit
        } else {
            self.position
        }
    }

    fn advance_write(&mut self, n: usize) {
        if self.reading {
            self.limit += n;
        } else {
            self.position += n;
        }
    }

    /// Make sure `n` bytes fit after index `at`, growing geometrically unless fixed.
    fn ensure_room(&mut self, at: usize, n: usize) -> Result<()> {
        let bound = if self.reading {
            self.capacity()
        } else {
            self.limit
        };
        let needed = at + n;
        if needed <= bound {
            return Ok(());
        }
        if self.fixed || needed > MAX_BUFFER_SIZE {
            return Err(ReactorError::Overflow {
                requested: n,
                available: bound.saturating_sub(at),
            });
        }

        let old_capacity = self.capacity();
        let new_capacity = (old_capacity * 2)
            .max(needed)
            .max(MIN_GROWTH)
            .min(MAX_BUFFER_SIZE);
        self.storage.resize(new_capacity, 0);
        if !self.reading {
            self.limit = new_capacity;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Buffer {
    type Item = u8;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, u8>>;

    fn into_iter(self) -> Self::IntoIter {
        self.as_bytes().iter().copied()
    }
}

impl From<&str> for Buffer {
    fn from(s: &str) -> Self {
        Buffer::wrap(s)
    }
}
