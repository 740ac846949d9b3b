//! Interop with `std::io` and the `bytes` crate.

use std::io::{self, Read, Write};

use super::core::Buffer;

impl Read for Buffer {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let n = out.len().min(self.readable());
        let bytes = self
            .read_bytes(n)
            .map_err(|e| io::Error::new(io::ErrorKind::UnexpectedEof, e))?;
        out[..n].copy_from_slice(bytes);
        Ok(n)
    }
}

impl Write for Buffer {
    /// Growable buffers take everything; fixed ones take what fits.
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let n = if self.is_fixed() {
            let free = if self.is_reading() {
                self.capacity() - self.limit()
            } else {
                self.limit() - self.position()
            };
            data.len().min(free)
        } else {
            data.len()
        };
        self.append(&data[..n])
            .map_err(|e| io::Error::new(io::ErrorKind::WriteZero, e))?;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl bytes::Buf for Buffer {
    fn remaining(&self) -> usize {
        self.readable()
    }

    fn chunk(&self) -> &[u8] {
        &self.storage()[self.position()..self.position() + self.readable()]
    }

    fn advance(&mut self, cnt: usize) {
        self.skip(cnt);
    }
}

impl Buffer {
    /// Fill from a reader in chunks of at most `max` bytes. Returns bytes read; 0 means EOF.
    pub fn fill_from<R: Read>(&mut self, reader: &mut R, max: usize) -> io::Result<usize> {
        let mut chunk = vec![0u8; max];
        let n = reader.read(&mut chunk)?;
        self.append(&chunk[..n])
            .map_err(|e| io::Error::new(io::ErrorKind::OutOfMemory, e))?;
        Ok(n)
    }

    /// Drain up to `max` readable bytes into a writer, advancing the cursor.
    pub fn drain_to<W: Write>(&mut self, writer: &mut W, max: usize) -> io::Result<usize> {
        let n = max.min(self.readable());
        let start = self.position();
        let written = writer.write(&self.storage()[start..start + n])?;
        Ok(self.skip(written))
    }
}
