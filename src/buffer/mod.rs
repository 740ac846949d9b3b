//! # Buffer Module
//!
//! A growable byte container with explicit read/write cursors, used by codecs
//! to carve frames out of transport bytes without copying.
//!
//! ## Cursor Model
//!
//! A [`Buffer`] tracks a `position` and a `limit` over its backing storage and
//! is explicitly flipped between two modes:
//!
//! - **Write mode** (after construction or [`Buffer::clear`]): the content is
//!   `[0, position)`, `limit` equals the capacity, appends land at `position`.
//! - **Read mode** (after [`Buffer::flip`]): the content is `[position, limit)`,
//!   reads consume from `position`, appends extend `limit`.
//!
//! ```rust
//! use brrtreactor::buffer::Buffer;
//!
//! let mut buf = Buffer::new();
//! buf.append("Hello").unwrap().append_byte(b'!').unwrap();
//! buf.flip();
//! assert_eq!(buf.as_string(), "Hello!");
//! assert_eq!(buf.read().unwrap(), b'H');
//! ```
//!
//! ## Views
//!
//! [`View`]s are zero-copy `(start, end)` windows into a parent buffer's
//! storage. [`Buffer::split`] and [`Buffer::slice`] produce them; a view is only
//! copied when [`View::get`] materializes it into its own buffer.
//!
//! ## Streaming
//!
//! [`Buffer::frames`] yields only delimiter-terminated segments and reports a
//! trailing partial segment through [`Frames::remainder`], so decoders can keep
//! the remainder and wait for more bytes.

mod core;
mod io;
mod view;

pub use core::{Buffer, MAX_BUFFER_SIZE, SMALL_BUFFER_SIZE};
pub use view::{Frames, Split, View};
