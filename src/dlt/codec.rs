use super::Error;

/// Bounds-checked cursor over a message body.
///
/// All multi-byte reads go through [`PayloadCursor::extract`] which swaps
/// bytes iff the record was transmitted MSB first. Running off the end of
/// the body is a parse failure, never a panic.
pub(crate) struct PayloadCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PayloadCursor<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> PayloadCursor<'a> {
        PayloadCursor { buf, pos: 0 }
    }

    /// read a fixed-width number at the cursor and advance past it
    pub(crate) fn extract<T>(&mut self, big_endian: bool) -> Result<T, Error>
    where
        T: funty::Numeric,
        <T as funty::Numeric>::Bytes: for<'b> TryFrom<&'b [u8]>,
    {
        let raw = self.take(core::mem::size_of::<T>())?;
        match raw.try_into() {
            Ok(bytes) => Ok(if big_endian {
                T::from_be_bytes(bytes)
            } else {
                T::from_le_bytes(bytes)
            }),
            // take() sized the slice already
            Err(_) => Err(Error::invalid("internal width mismatch")),
        }
    }

    /// read a one-byte boolean (any non-zero value is true)
    pub(crate) fn extract_bool(&mut self) -> Result<bool, Error> {
        Ok(self.take(1)?[0] > 0)
    }

    /// take the next `n` raw bytes
    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8], Error> {
        match self.buf.get(self.pos..self.pos + n) {
            Some(bytes) => {
                self.pos += n;
                Ok(bytes)
            }
            None => Err(Error::invalid(format!(
                "payload too short - {} bytes needed at offset {}",
                n, self.pos
            ))),
        }
    }
}
