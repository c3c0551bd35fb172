//! Buffered streams that borrow their buffer from a [`BufferPool`]
//!
//! Both wrappers hold a [`PooledBuffer`], so the buffer goes back to the pool
//! on every exit path, including early returns and unwinding.

use std::fmt;
use std::io::{self, BufRead, Read, Write};
use std::sync::Arc;

use super::pool::{BufferPool, PooledBuffer};

/// Buffered reader over a pooled buffer
pub struct PooledReader<R> {
    inner: R,
    buffer: PooledBuffer,
    pos: usize,
    filled: usize,
}

impl<R: Read> PooledReader<R> {
    pub fn new(inner: R, pool: &Arc<dyn BufferPool>) -> Self {
        let size = pool.buffer_size();
        Self::with_capacity(inner, pool, size)
    }

    pub fn with_capacity(inner: R, pool: &Arc<dyn BufferPool>, capacity: usize) -> Self {
        Self {
            inner,
            buffer: PooledBuffer::acquire(pool, capacity.max(1)),
            pos: 0,
            filled: 0,
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Unwraps the reader, discarding any buffered bytes.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for PooledReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        // Large reads bypass the buffer when it is empty.
        if self.pos == self.filled && out.len() >= self.buffer.len() {
            return self.inner.read(out);
        }
        let available = self.fill_buf()?;
        let n = available.len().min(out.len());
        out[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl<R: Read> BufRead for PooledReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.pos >= self.filled {
            self.filled = self.inner.read(&mut self.buffer)?;
            self.pos = 0;
        }
        Ok(&self.buffer[self.pos..self.filled])
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.filled);
    }
}

impl<R> fmt::Debug for PooledReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledReader")
            .field("buffered", &(self.filled - self.pos))
            .finish_non_exhaustive()
    }
}

/// Buffered writer over a pooled buffer
///
/// Dropping the writer flushes buffered bytes on a best-effort basis; call
/// [`PooledWriter::into_inner`] to observe flush errors.
pub struct PooledWriter<W: Write> {
    inner: Option<W>,
    buffer: PooledBuffer,
    len: usize,
}

impl<W: Write> PooledWriter<W> {
    pub fn new(inner: W, pool: &Arc<dyn BufferPool>) -> Self {
        let size = pool.buffer_size();
        Self::with_capacity(inner, pool, size)
    }

    pub fn with_capacity(inner: W, pool: &Arc<dyn BufferPool>, capacity: usize) -> Self {
        Self {
            inner: Some(inner),
            buffer: PooledBuffer::acquire(pool, capacity.max(1)),
            len: 0,
        }
    }

    /// Flushes buffered bytes and returns the underlying writer.
    pub fn into_inner(mut self) -> io::Result<W> {
        self.flush_buffer()?;
        self.inner
            .take()
            .ok_or_else(|| io::Error::other("pooled writer already released"))
    }

    fn inner_mut(&mut self) -> io::Result<&mut W> {
        self.inner
            .as_mut()
            .ok_or_else(|| io::Error::other("pooled writer already released"))
    }

    fn flush_buffer(&mut self) -> io::Result<()> {
        let mut written = 0;
        while written < self.len {
            let Some(inner) = self.inner.as_mut() else {
                return Err(io::Error::other("pooled writer already released"));
            };
            match inner.write(&self.buffer[written..self.len]) {
                Ok(0) => {
                    self.buffer.copy_within(written..self.len, 0);
                    self.len -= written;
                    return Err(io::Error::from(io::ErrorKind::WriteZero));
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.buffer.copy_within(written..self.len, 0);
                    self.len -= written;
                    return Err(e);
                }
            }
        }
        self.len = 0;
        Ok(())
    }
}

impl<W: Write> Write for PooledWriter<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.len + data.len() > self.buffer.len() {
            self.flush_buffer()?;
        }
        if data.len() >= self.buffer.len() {
            return self.inner_mut()?.write(data);
        }
        self.buffer[self.len..self.len + data.len()].copy_from_slice(data);
        self.len += data.len();
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_buffer()?;
        self.inner_mut()?.flush()
    }
}

impl<W: Write> Drop for PooledWriter<W> {
    fn drop(&mut self) {
        if self.inner.is_some() && self.len > 0 {
            let _ = self.flush_buffer();
        }
    }
}

impl<W: Write> fmt::Debug for PooledWriter<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledWriter")
            .field("buffered", &self.len)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::pool::SharedBufferPool;

    fn pool(size: usize) -> (Arc<SharedBufferPool>, Arc<dyn BufferPool>) {
        let shared = Arc::new(SharedBufferPool::new(4, size));
        let dyn_pool: Arc<dyn BufferPool> = shared.clone();
        (shared, dyn_pool)
    }

    #[test]
    fn writer_buffers_until_flush() {
        let (_, pool) = pool(8);
        let mut writer = PooledWriter::new(Vec::new(), &pool);
        writer.write_all(b"abc").unwrap();
        assert!(writer.inner.as_ref().unwrap().is_empty());
        writer.write_all(b"defghijklmnop").unwrap();
        let out = writer.into_inner().unwrap();
        assert_eq!(out, b"abcdefghijklmnop");
    }

    #[test]
    fn reader_reads_through_small_buffer() {
        let (_, pool) = pool(4);
        let data = b"the quick brown fox".to_vec();
        let mut reader = PooledReader::new(&data[..], &pool);
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out.as_bytes(), &data[..]);
    }

    #[test]
    fn reader_supports_lines() {
        let (_, pool) = pool(3);
        let reader = PooledReader::new(&b"one\ntwo\nthree"[..], &pool);
        let lines: Vec<String> = reader.lines().map(Result::unwrap).collect();
        assert_eq!(lines, ["one", "two", "three"]);
    }

    #[test]
    fn buffers_return_to_pool_on_drop() {
        let (shared, pool) = pool(16);
        {
            let _reader = PooledReader::new(&b"x"[..], &pool);
            let mut writer = PooledWriter::new(Vec::new(), &pool);
            writer.write_all(b"y").unwrap();
            assert_eq!(shared.idle(), 0);
        }
        assert_eq!(shared.idle(), 2);
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("disk gone"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn flush_errors_surface_from_into_inner() {
        let (shared, pool) = pool(16);
        let mut writer = PooledWriter::new(FailingWriter, &pool);
        writer.write_all(b"data").unwrap();
        assert!(writer.into_inner().is_err());
        assert_eq!(shared.idle(), 1);
    }
}
