use crate::dlt::{Error, ErrorKind};
use memmap2::Mmap;
use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;

/// Overrun value of a cursor whose last crossing read reached or passed
/// the true end of the file, not merely its chunk fence.
pub const OVERRUN_EOF: usize = usize::MAX;

#[derive(Clone, Debug)]
enum Backing {
    /// whole file pre-loaded into memory
    Buffer(Arc<[u8]>),
    /// read-only memory-mapped view
    Mapped(Arc<Mmap>),
}

impl Backing {
    #[inline]
    fn as_slice(&self) -> &[u8] {
        match self {
            Backing::Buffer(buf) => buf,
            Backing::Mapped(map) => map,
        }
    }
}

/// Random-access cursor over a DLT file.
///
/// Cursors share the underlying immutable bytes; position, chunk fence and
/// the overrun/first-valid-offset accounting are per cursor. [`split`]
/// partitions the byte range into independent cursors for parallel
/// parsing.
///
/// Reads may cross the chunk fence so that a record straddling the
/// boundary can be completed; the crossing is recorded in [`overrun`] for
/// the supervisor to reconcile against the next chunk.
///
/// [`split`]: ByteSource::split
/// [`overrun`]: ByteSource::overrun
#[derive(Clone, Debug)]
pub struct ByteSource {
    backing: Backing,
    len: usize,
    pos: usize,
    chunk_fence: usize,
    overrun: usize,
    first_valid_offset: Option<usize>,
}

impl ByteSource {
    fn new(backing: Backing, len: usize) -> ByteSource {
        ByteSource {
            backing,
            len,
            pos: 0,
            chunk_fence: usize::MAX,
            overrun: 0,
            first_valid_offset: None,
        }
    }

    /// pre-load the whole file into memory
    pub fn precached(path: impl AsRef<Path>) -> io::Result<ByteSource> {
        let buf = std::fs::read(path)?;
        Ok(Self::from_vec(buf))
    }

    /// map the file read-only
    pub fn mapped(path: impl AsRef<Path>) -> io::Result<ByteSource> {
        let file = File::open(path)?;
        // safety: the mapping is read-only and we treat the file as immutable
        let map = unsafe { Mmap::map(&file)? };
        let len = map.len();
        Ok(Self::new(Backing::Mapped(Arc::new(map)), len))
    }

    /// use an in-memory buffer as the byte range
    pub fn from_vec(buf: Vec<u8>) -> ByteSource {
        let len = buf.len();
        Self::new(Backing::Buffer(buf.into()), len)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read the next `n` bytes, advancing the cursor.
    ///
    /// Reading past the true end fails with a truncation parse failure and
    /// records [`OVERRUN_EOF`]. Reading across the chunk fence succeeds and
    /// records the position after the read; if that position is the true
    /// end, [`OVERRUN_EOF`] is recorded as well, since the cursor is
    /// exhausted either way.
    pub fn read(&mut self, n: usize) -> Result<&[u8], Error> {
        let new_pos = self.pos + n;
        if new_pos > self.len {
            self.overrun = OVERRUN_EOF;
            return Err(Error::truncated("file ended with incomplete record"));
        }
        if new_pos > self.chunk_fence {
            self.overrun = if new_pos == self.len {
                OVERRUN_EOF
            } else {
                new_pos
            };
        }
        let data = &self.backing.as_slice()[self.pos..new_pos];
        self.pos = new_pos;
        Ok(data)
    }

    pub fn set_pos(&mut self, pos: usize) -> Result<(), Error> {
        if pos >= self.len {
            return Err(Error::fatal(format!(
                "seek to {} beyond length {}",
                pos, self.len
            )));
        }
        self.pos = pos;
        Ok(())
    }

    pub fn get_pos(&self) -> usize {
        self.pos
    }

    /// whether a record beginning at `offset` belongs to this chunk
    pub fn within_fence(&self, offset: usize) -> bool {
        offset <= self.chunk_fence
    }

    /// 0 while no read has crossed the chunk fence; afterwards the
    /// absolute offset just past the last crossing read, or
    /// [`OVERRUN_EOF`] once the true end was reached
    pub fn overrun(&self) -> usize {
        self.overrun
    }

    /// where the first successfully parsed record of this cursor began
    pub fn first_valid_offset(&self) -> Option<usize> {
        self.first_valid_offset
    }

    /// called by the worker after each successful parse; latches the
    /// offset of the first valid record, then never changes
    pub fn notify_success(&mut self, offset: usize) {
        if self.first_valid_offset.is_none() {
            self.first_valid_offset = Some(offset);
        }
    }

    /// Partition `[0, len)` into `num` cursors for parallel parsing.
    ///
    /// Cursor `i` starts at `len*i/num` with its fence just before
    /// `len*(i+1)/num`. Splitting an empty source reports `Eof`.
    pub fn split(&self, num: usize) -> Result<Vec<ByteSource>, Error> {
        if self.len == 0 {
            // likely an empty file
            return Err(Error::new(ErrorKind::Eof));
        }
        let num = num.max(1);
        let mut readers = Vec::with_capacity(num);
        for i in 0..num {
            let mut reader = self.clone();
            reader.pos = self.len * i / num;
            // wraps to "no fence" for zero-sized leading chunks of tiny inputs
            reader.chunk_fence = (self.len * (i + 1) / num).wrapping_sub(1);
            reader.overrun = 0;
            reader.first_valid_offset = None;
            readers.push(reader);
        }
        Ok(readers)
    }
}
