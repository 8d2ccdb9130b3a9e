//! Fixed-capacity, NUL-padded strings matching the kernel's name and
//! consumer fields.

#[derive(Clone, Copy)]
pub struct FixedStr<const N: usize> {
    buf: [u8; N],
}

impl<const N: usize> FixedStr<N> {
    #[inline]
    pub const fn empty() -> Self {
        Self { buf: [0; N] }
    }

    /// Builds from a UTF-8 string. The trailing NUL the kernel expects must
    /// fit, so `s` may hold at most `N - 1` bytes.
    pub fn new(s: &str) -> Result<Self, FixedStrError> {
        if s.len() >= N {
            return Err(FixedStrError::TooLong {
                capacity: N - 1,
                required: s.len(),
            });
        }
        let mut buf = [0; N];
        buf[..s.len()].copy_from_slice(s.as_bytes());
        Ok(Self { buf })
    }

    /// Builds from a kernel-filled byte array, validating UTF-8 up to the
    /// first NUL and clearing whatever garbage follows it.
    pub fn from_byte_array(mut buf: [u8; N]) -> Result<Self, FixedStrError> {
        let len = buf.iter().position(|b| *b == 0).unwrap_or(N);
        core::str::from_utf8(&buf[..len])?;
        buf[len..].fill(0);
        Ok(Self { buf })
    }

    pub const fn into_byte_array(self) -> [u8; N] {
        self.buf
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.iter().position(|b| *b == 0).unwrap_or(N)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf[0] == 0
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        // Checked at construction.
        unsafe { core::str::from_utf8_unchecked(&self.buf[..self.len()]) }
    }
}

impl<const N: usize> Default for FixedStr<N> {
    #[inline]
    fn default() -> Self {
        Self::empty()
    }
}

impl<const N: usize> std::fmt::Debug for FixedStr<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("FixedStr").field(&self.as_str()).finish()
    }
}

impl<const N: usize> std::fmt::Display for FixedStr<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_str().fmt(f)
    }
}

impl<const N: usize> AsRef<str> for FixedStr<N> {
    #[inline]
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl<const N: usize> std::ops::Deref for FixedStr<N> {
    type Target = str;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

#[derive(Debug, Clone, Copy, thiserror::Error)]
pub enum FixedStrError {
    #[error("string of {required} bytes exceeds fixed capacity of {capacity}")]
    TooLong { capacity: usize, required: usize },
    #[error("UTF8 Error")]
    Utf8(#[from] core::str::Utf8Error),
}

impl From<FixedStrError> for std::io::Error {
    fn from(value: FixedStrError) -> Self {
        std::io::Error::new(std::io::ErrorKind::InvalidData, value)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips_through_byte_array() {
        let s = FixedStr::<32>::new("gpio-lines").unwrap();
        let arr = s.into_byte_array();
        let back = FixedStr::<32>::from_byte_array(arr).unwrap();
        assert_eq!(back.as_str(), "gpio-lines");
        assert_eq!(back.len(), 10);
    }

    #[test]
    fn reserves_room_for_nul() {
        assert!(FixedStr::<4>::new("abcd").is_err());
        assert_eq!(FixedStr::<4>::new("abc").unwrap().as_str(), "abc");
    }

    #[test]
    fn clears_garbage_after_nul() {
        let mut arr = [0u8; 8];
        arr[..3].copy_from_slice(b"abc");
        arr[5] = 0xFF;
        let s = FixedStr::<8>::from_byte_array(arr).unwrap();
        assert_eq!(s.as_str(), "abc");
        assert_eq!(s.into_byte_array()[5], 0);
    }
}
