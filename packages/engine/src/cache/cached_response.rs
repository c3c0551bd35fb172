//! Responses served from the disk cache

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{HeaderMap, Response, StatusCode};

use crate::io::{BufferPool, PooledReader};

/// Body of a cached response, read straight from the entry file.
///
/// The file was opened before the lookup returned, so the body stays intact
/// even if the entry is replaced or evicted while it is being read.
pub struct CachedBody {
    reader: PooledReader<File>,
    len: u64,
}

impl CachedBody {
    pub fn new(file: File, len: u64, pool: &Arc<dyn BufferPool>) -> Self {
        Self {
            reader: PooledReader::new(file, pool),
            len,
        }
    }

    /// Committed body length
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reads the remaining body into memory.
    pub fn into_bytes(mut self) -> io::Result<Bytes> {
        let capacity = usize::try_from(self.len).unwrap_or(0);
        let mut body = Vec::with_capacity(capacity);
        self.read_to_end(&mut body)?;
        Ok(Bytes::from(body))
    }
}

impl Read for CachedBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl fmt::Debug for CachedBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedBody").field("len", &self.len).finish_non_exhaustive()
    }
}

/// A cache hit
#[derive(Debug)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: CachedBody,
    pub stored_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CachedResponse {
    /// Materializes the hit as an `http::Response` with an in-memory body.
    pub fn into_http(self) -> io::Result<Response<Bytes>> {
        let body = self.body.into_bytes()?;
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Seek, Write};

    use super::*;
    use crate::io::SharedBufferPool;

    #[test]
    fn body_reads_whole_file() {
        let pool: Arc<dyn BufferPool> = Arc::new(SharedBufferPool::new(2, 4));
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"cached body bytes").unwrap();
        file.rewind().unwrap();

        let body = CachedBody::new(file, 17, &pool);
        assert_eq!(body.len(), 17);
        let response = CachedResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body,
            stored_at: None,
            expires_at: None,
        };
        let response = response.into_http().unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(&response.body()[..], b"cached body bytes");
    }
}
