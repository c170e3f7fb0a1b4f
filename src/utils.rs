use core::hash::{BuildHasher, Hash};

#[macro_export]
macro_rules! enum_accessors {
    ($bind:ident $(($variant:ident($ty:ty) $is:ident $get:ident $unwrap:ident $cvt:expr))*) => ($(
        /// Returns whether this is the
        #[doc = concat!("`", stringify!($variant), "`")]
        /// variant.
        #[inline]
        pub fn $is(&self) -> bool {
            matches!(self, Self::$variant(..))
        }

        /// Attempt to access the underlying value, returning `None` if this
        /// is not the matching variant.
        #[inline]
        pub fn $get(&self) -> Option<$ty> {
            if let Self::$variant($bind) = self {
                Some($cvt)
            } else {
                None
            }
        }

        /// Returns the underlying value, panicking if it's the wrong variant.
        ///
        /// # Panics
        ///
        /// Panics if `self` is not of the right type.
        #[inline]
        pub fn $unwrap(&self) -> $ty {
            self.$get().expect(concat!("expected ", stringify!($ty)))
        }
    )*)
}

pub(crate) trait HashMapEntryTryExt<'a, K, V, S>: Sized {
    fn or_try_insert_with<E, F: FnOnce() -> Result<V, E>>(self, default: F) -> Result<&'a mut V, E>
    where
        K: Hash,
        S: BuildHasher;
}

impl<'a, K, V, S> HashMapEntryTryExt<'a, K, V, S> for hashbrown::hash_map::Entry<'a, K, V, S> {
    fn or_try_insert_with<E, F: FnOnce() -> Result<V, E>>(self, default: F) -> Result<&'a mut V, E>
    where
        K: Hash,
        S: BuildHasher,
    {
        match self {
            hashbrown::hash_map::Entry::Occupied(entry) => Ok(entry.into_mut()),
            hashbrown::hash_map::Entry::Vacant(entry) => Ok(entry.insert(default()?)),
        }
    }
}
