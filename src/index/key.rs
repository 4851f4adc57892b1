use std::fmt::Debug;

use bytes::{Buf, BufMut};

use crate::common::{PageDbError, Result};

/// Longest string key, bounded by its 1-byte length prefix
pub const MAX_STRING_KEY_LEN: usize = u8::MAX as usize;

/// A key that can live in a B+ tree node.
///
/// Keys are totally ordered and carry their own byte encoding. The encoding
/// is self-delimiting for a known key type, but the type itself is not
/// recorded on disk: a tree must always be reopened with the key type it was
/// built with.
pub trait IndexKey: Ord + Clone + Debug + Send + Sync + 'static {
    /// Upper bound of [`IndexKey::encoded_len`] over all keys of this type.
    const MAX_ENCODED_LEN: usize;

    /// Number of bytes [`IndexKey::encode`] writes for this key.
    fn encoded_len(&self) -> usize;

    /// Rejects keys that cannot be encoded.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    fn encode<B: BufMut>(&self, buf: &mut B);

    /// Decodes one key from the front of `buf`. Returns None when the bytes
    /// are truncated or malformed.
    fn decode<B: Buf>(buf: &mut B) -> Option<Self>;
}

/// Fixed-width 4-byte big-endian integer key.
impl IndexKey for i32 {
    const MAX_ENCODED_LEN: usize = 4;

    fn encoded_len(&self) -> usize {
        4
    }

    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_i32(*self);
    }

    fn decode<B: Buf>(buf: &mut B) -> Option<Self> {
        if buf.remaining() < 4 {
            return None;
        }
        Some(buf.get_i32())
    }
}

/// Length-prefixed UTF-8 string key (1 length byte, up to 255 bytes).
impl IndexKey for String {
    const MAX_ENCODED_LEN: usize = 1 + MAX_STRING_KEY_LEN;

    fn encoded_len(&self) -> usize {
        1 + self.len()
    }

    fn validate(&self) -> Result<()> {
        if self.len() > MAX_STRING_KEY_LEN {
            return Err(PageDbError::KeyTooLong {
                len: self.len(),
                max: MAX_STRING_KEY_LEN,
            });
        }
        Ok(())
    }

    fn encode<B: BufMut>(&self, buf: &mut B) {
        let len = self.len().min(MAX_STRING_KEY_LEN);
        buf.put_u8(len as u8);
        buf.put_slice(&self.as_bytes()[..len]);
    }

    fn decode<B: Buf>(buf: &mut B) -> Option<Self> {
        if buf.remaining() < 1 {
            return None;
        }
        let len = buf.get_u8() as usize;
        if buf.remaining() < len {
            return None;
        }
        let bytes = buf.copy_to_bytes(len);
        String::from_utf8(bytes.to_vec()).ok()
    }
}
