//! Provides an immutable view on cached bytes.
//!
//! Values are handed out of a [Group](crate::group::Group) as **ByteView**. Internally this is a
//! reference counted and immutable buffer, therefore cloning a view is cheap and no holder of a
//! view can ever modify the data stored in the cache.
//!
//! # Examples
//! ```
//! # use ringcache::byteview::ByteView;
//! let view = ByteView::from("Hello World");
//! assert_eq!(view.len(), 11);
//! assert_eq!(view.as_slice(), b"Hello World");
//!
//! // A copy of the data can be obtained and modified without affecting the view...
//! let mut copy = view.byte_slice();
//! copy[0] = b'h';
//! assert_eq!(view.to_string(), "Hello World");
//! ```
use std::fmt::{Display, Formatter};

use bytes::Bytes;

use crate::lru::ByteSize;

/// Represents an immutable snapshot of a cached value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ByteView {
    bytes: Bytes,
}

impl ByteView {
    /// Returns the number of bytes in this view.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Determines if the view contains no data at all.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns a copy of the underlying data.
    ///
    /// The returned vector is owned by the caller and completely independent of the cache.
    pub fn byte_slice(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }

    /// Provides read-only access to the underlying data.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the data as shared buffer which can be handed to the network layer without
    /// copying.
    pub fn bytes(&self) -> Bytes {
        self.bytes.clone()
    }
}

impl From<Vec<u8>> for ByteView {
    fn from(data: Vec<u8>) -> Self {
        ByteView {
            bytes: Bytes::from(data),
        }
    }
}

impl From<&[u8]> for ByteView {
    fn from(data: &[u8]) -> Self {
        ByteView {
            bytes: Bytes::copy_from_slice(data),
        }
    }
}

impl From<&str> for ByteView {
    fn from(data: &str) -> Self {
        ByteView::from(data.as_bytes())
    }
}

impl AsRef<[u8]> for ByteView {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl ByteSize for ByteView {
    fn allocated_size(&self) -> usize {
        self.bytes.len()
    }
}

/// Renders the view as (lossy) UTF-8 string.
impl Display for ByteView {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.bytes))
    }
}

#[cfg(test)]
mod tests {
    use crate::byteview::ByteView;
    use crate::lru::ByteSize;

    #[test]
    fn views_are_independent_of_their_source() {
        let mut source = b"value".to_vec();
        let view = ByteView::from(&source[..]);
        source[0] = b'V';

        assert_eq!(view.as_slice(), b"value");
        assert_eq!(view.allocated_size(), 5);
    }

    #[test]
    fn clones_share_the_same_data() {
        let view = ByteView::from("shared");
        let clone = view.clone();

        assert_eq!(view, clone);
        assert_eq!(clone.to_string(), "shared");
        assert_eq!(ByteView::default().is_empty(), true);
    }
}
