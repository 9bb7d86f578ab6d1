//! Identifier types for opaque native references.
//!
//! Each identifier is a transparent newtype over the integer the native ABI
//! passes around, so a type tag can never be handed where a quark is expected.

/// Macro to define a native identifier type.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $repr:ty) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub $repr);

        impl $name {
            /// Create an invalid (zero) identifier.
            #[inline]
            pub const fn invalid() -> Self {
                Self(0)
            }

            /// Check if this identifier is valid (non-zero).
            #[inline]
            pub const fn is_valid(&self) -> bool {
                self.0 != 0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::invalid()
            }
        }
    };
}

define_id!(
    /// Runtime class identifier of a native object or boxed record type.
    NType,
    usize
);
define_id!(
    /// Interned string identifier.
    NQuark,
    u32
);
define_id!(
    /// Token returned by a successful signal connection.
    NHandlerId,
    u64
);
