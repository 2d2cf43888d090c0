//! Typed GPU object handles
//!
//! Zero is the null handle for every type, matching GL object naming.

use core::fmt;

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[derive(serde::Serialize, serde::Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            /// The null handle
            pub const NULL: Self = Self(0);

            #[inline]
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            #[inline]
            pub const fn raw(&self) -> u32 {
                self.0
            }

            #[inline]
            pub const fn is_null(&self) -> bool {
                self.0 == 0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_null() {
                    write!(f, concat!(stringify!($name), "(null)"))
                } else {
                    write!(f, concat!(stringify!($name), "({})"), self.0)
                }
            }
        }
    };
}

define_handle!(
    /// Linked shader program
    ProgramHandle
);
define_handle!(
    /// Vertex or index buffer object
    BufferHandle
);
define_handle!(
    /// Texture object
    TextureHandle
);
define_handle!(
    /// Vertex array object
    VertexArrayHandle
);

/// Buffer binding point
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    /// Vertex attribute data
    Array,
    /// Index data
    ElementArray,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_handles() {
        assert!(ProgramHandle::NULL.is_null());
        assert!(!BufferHandle::new(1).is_null());
        assert_eq!(TextureHandle::default(), TextureHandle::NULL);
    }

    #[test]
    fn test_debug_format() {
        assert_eq!(format!("{:?}", ProgramHandle::NULL), "ProgramHandle(null)");
        assert_eq!(format!("{:?}", BufferHandle::new(7)), "BufferHandle(7)");
    }
}
