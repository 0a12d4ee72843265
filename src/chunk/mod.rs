//! Splitting byte streams into fixed-size chunks and joining them back.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{GridError, Result};

pub const DEFAULT_CHUNK_SIZE: u32 = 255 * 1024;

/// Number of chunks needed to hold `length` bytes.
pub fn chunk_count(length: u64, chunk_size: u32) -> u32 {
    if chunk_size == 0 {
        return 0;
    }
    length.div_ceil(chunk_size as u64) as u32
}

/// Expected byte length of chunk `n` for a file of `length` bytes.
///
/// Returns `None` when `n` lies past the last chunk.
pub fn expected_chunk_len(length: u64, chunk_size: u32, n: u32) -> Option<usize> {
    let count = chunk_count(length, chunk_size);
    if n >= count {
        return None;
    }
    let offset = n as u64 * chunk_size as u64;
    Some((length - offset).min(chunk_size as u64) as usize)
}

pub fn validate_chunk_size(chunk_size: u32) -> Result<()> {
    if chunk_size == 0 {
        return Err(GridError::Validation("chunk size must be positive".to_string()));
    }
    Ok(())
}

/// Lazy, forward-only split of an in-memory buffer.
pub struct Chunks<'a> {
    data: &'a [u8],
    chunk_size: usize,
    index: u32,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = (u32, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.is_empty() {
            return None;
        }
        let end = self.chunk_size.min(self.data.len());
        let (head, rest) = self.data.split_at(end);
        self.data = rest;
        let n = self.index;
        self.index += 1;
        Some((n, head))
    }
}

pub fn split(data: &[u8], chunk_size: u32) -> Result<Chunks<'_>> {
    validate_chunk_size(chunk_size)?;
    Ok(Chunks {
        data,
        chunk_size: chunk_size as usize,
        index: 0,
    })
}

pub fn join<I, B>(chunks: I) -> Vec<u8>
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut out = Vec::new();
    for chunk in chunks {
        out.extend_from_slice(chunk.as_ref());
    }
    out
}

/// Accumulates written bytes until a whole chunk is available.
///
/// Holds at most one chunk of data at a time.
#[derive(Debug)]
pub struct ChunkBuffer {
    chunk_size: usize,
    pending: Vec<u8>,
    next_index: u32,
    total: u64,
}

impl ChunkBuffer {
    pub fn new(chunk_size: u32) -> Result<Self> {
        validate_chunk_size(chunk_size)?;
        Ok(Self {
            chunk_size: chunk_size as usize,
            pending: Vec::new(),
            next_index: 0,
            total: 0,
        })
    }

    /// Copy as much of `data` as fits into the current chunk; returns bytes consumed.
    pub fn fill(&mut self, data: &[u8]) -> usize {
        let room = self.chunk_size - self.pending.len();
        let take = room.min(data.len());
        if self.pending.capacity() == 0 && take > 0 {
            self.pending.reserve_exact(self.chunk_size);
        }
        self.pending.extend_from_slice(&data[..take]);
        self.total += take as u64;
        take
    }

    pub fn is_full(&self) -> bool {
        self.pending.len() == self.chunk_size
    }

    /// Take the buffered chunk, full or not, with its index.
    pub fn take(&mut self) -> Option<(u32, Vec<u8>)> {
        if self.pending.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.pending);
        let n = self.next_index;
        self.next_index += 1;
        Some((n, data))
    }

    /// Bytes accepted so far.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Chunks handed out so far.
    pub fn emitted(&self) -> u32 {
        self.next_index
    }
}

/// Read up to `chunk_size` bytes, stopping early only at end of input.
pub async fn read_chunk<R>(reader: &mut R, chunk_size: u32) -> std::io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = vec![0u8; chunk_size as usize];
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    if filled == 0 {
        return Ok(None);
    }
    buf.truncate(filled);
    Ok(Some(buf))
}
