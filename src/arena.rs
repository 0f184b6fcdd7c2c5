//! Typed arenas, list windows and the name interner.
//!
//! Every table in the crate (type descriptors, tree nodes, method entries)
//! lives in an [`Arena`] and is addressed through a typed [`Id`]. Names of
//! types, fields and methods are interned once into [`Symbol`]s.

use core::marker::PhantomData;
use core::ops::{Index, IndexMut};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::hash::{BuildHasherDefault, Hasher};

// =============================================================================
// IDs and List References
// =============================================================================

/// Type-safe handle into an arena for a specific node type `T`.
///
/// The phantom type parameter prevents accidentally using an `Id<TypeNode>` to
/// index into an arena of `MethodEntry` values.
#[repr(transparent)]
pub struct Id<T> {
    raw: u32,
    _marker: PhantomData<fn() -> T>,
}

// Manual impls: deriving would put bounds on `T`.
impl<T> Copy for Id<T> {}

impl<T> Clone for Id<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for Id<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for Id<T> {}

impl<T> core::hash::Hash for Id<T> {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T> core::fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Id({})", self.raw)
    }
}

impl<T> Id<T> {
    /// Creates an ID from a raw index.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// Returns the raw index value.
    #[inline]
    pub const fn raw(&self) -> u32 {
        self.raw
    }

    /// Converts this ID to a `usize` for indexing.
    #[inline]
    pub const fn to_usize(&self) -> usize {
        self.raw as usize
    }
}

/// Window over a contiguous run of arena entries.
///
/// Entries allocated back to back (all methods of one tree node, for
/// instance) are referenced by `(start, len)` instead of a per-owner `Vec`.
pub struct ListRef<T> {
    start: u32,
    len: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Copy for ListRef<T> {}

impl<T> Clone for ListRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for ListRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start && self.len == other.len
    }
}

impl<T> Eq for ListRef<T> {}

impl<T> core::fmt::Debug for ListRef<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "ListRef({}..{})", self.start, self.end())
    }
}

impl<T> Default for ListRef<T> {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl<T> ListRef<T> {
    /// Empty list constant.
    pub const EMPTY: Self = Self {
        start: 0,
        len: 0,
        _marker: PhantomData,
    };

    /// Creates a new list reference.
    #[inline]
    pub const fn new(start: u32, len: u32) -> Self {
        Self {
            start,
            len,
            _marker: PhantomData,
        }
    }

    /// Checks if the list is empty.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the length.
    #[inline]
    pub const fn len(&self) -> u32 {
        self.len
    }

    /// Returns the end index (exclusive).
    #[inline]
    pub const fn end(&self) -> u32 {
        self.start + self.len
    }

    /// Iterates over the ids covered by this window.
    #[inline]
    pub fn ids(&self) -> impl ExactSizeIterator<Item = Id<T>> + DoubleEndedIterator {
        (self.start..self.end()).map(Id::from_raw)
    }
}

// =============================================================================
// String Interning
// =============================================================================

/// Handle to an interned string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Symbol(u32);

impl Symbol {
    /// Extracts the raw numeric value.
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

/// FNV-1a 64-bit hash.
const fn fnv1a64(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    let mut hash = OFFSET;
    let mut i = 0;

    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(PRIME);
        i += 1;
    }

    hash
}

/// Identity hasher for pre-hashed `u64` keys.
#[derive(Default)]
struct U64IdentityHasher(u64);

impl Hasher for U64IdentityHasher {
    fn write(&mut self, _b: &[u8]) {
        unreachable!("U64IdentityHasher only supports write_u64")
    }

    #[inline]
    fn write_u64(&mut self, i: u64) {
        self.0 = i;
    }

    #[inline]
    fn finish(&self) -> u64 {
        self.0
    }
}

type U64NoHash = BuildHasherDefault<U64IdentityHasher>;

/// String interner for type, field and method names.
#[derive(Debug, Default)]
pub struct Interner {
    strings: Vec<Box<str>>,
    buckets: HashMap<u64, SmallVec<[Symbol; 1]>, U64NoHash>,
}

impl Interner {
    /// Creates an empty interner.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of unique interned strings.
    #[inline]
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Returns `true` if no strings have been interned.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Interns a string and returns its unique symbol.
    pub fn intern(&mut self, s: &str) -> Symbol {
        let hash = fnv1a64(s.as_bytes());
        let candidates = self.buckets.entry(hash).or_default();

        for &sym in candidates.iter() {
            if self.strings[sym.0 as usize].as_ref() == s {
                return sym;
            }
        }

        let sym = Symbol(self.strings.len() as u32);
        self.strings.push(s.into());
        candidates.push(sym);
        sym
    }

    /// Looks a string up without interning it.
    pub fn get(&self, s: &str) -> Option<Symbol> {
        let hash = fnv1a64(s.as_bytes());
        self.buckets
            .get(&hash)?
            .iter()
            .copied()
            .find(|sym| self.strings[sym.0 as usize].as_ref() == s)
    }

    /// Resolves a symbol back to its string slice.
    ///
    /// # Panics
    ///
    /// Panics if the symbol was produced by another interner.
    #[inline]
    pub fn resolve(&self, sym: Symbol) -> &str {
        &self.strings[sym.0 as usize]
    }
}

// =============================================================================
// Arena
// =============================================================================

/// Append-only storage with stable IDs. No deallocation is supported.
#[derive(Debug)]
pub struct Arena<T> {
    data: Vec<T>,
}

impl<T> Default for Arena<T> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    /// Creates an empty arena.
    #[inline]
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Returns the number of allocated entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if nothing has been allocated.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Id the next allocation will receive.
    #[inline]
    pub fn next_id(&self) -> Id<T> {
        Id::from_raw(self.data.len() as u32)
    }

    /// Allocates an entry and returns its stable ID.
    #[inline]
    pub fn alloc(&mut self, value: T) -> Id<T> {
        debug_assert!(self.data.len() < u32::MAX as usize);
        let id = self.next_id();
        self.data.push(value);
        id
    }

    /// Allocates a run of entries and returns the window covering them.
    pub fn alloc_list(&mut self, items: impl IntoIterator<Item = T>) -> ListRef<T> {
        let start = self.data.len();
        self.data.extend(items);
        let len = self.data.len() - start;
        ListRef::new(start as u32, len as u32)
    }

    #[inline]
    pub fn get(&self, id: Id<T>) -> &T {
        &self.data[id.to_usize()]
    }

    #[inline]
    pub fn get_mut(&mut self, id: Id<T>) -> &mut T {
        &mut self.data[id.to_usize()]
    }

    /// Returns the entries covered by a list window.
    #[inline]
    pub fn slice(&self, r: ListRef<T>) -> &[T] {
        &self.data[r.start as usize..r.end() as usize]
    }

    /// Iterates over all entries in allocation order.
    #[inline]
    pub fn iter(&self) -> core::slice::Iter<'_, T> {
        self.data.iter()
    }

    /// Iterates over all ids in allocation order.
    #[inline]
    pub fn ids(&self) -> impl ExactSizeIterator<Item = Id<T>> + DoubleEndedIterator {
        (0..self.data.len() as u32).map(Id::from_raw)
    }
}

impl<T> Index<Id<T>> for Arena<T> {
    type Output = T;

    #[inline]
    fn index(&self, id: Id<T>) -> &Self::Output {
        self.get(id)
    }
}

impl<T> IndexMut<Id<T>> for Arena<T> {
    #[inline]
    fn index_mut(&mut self, id: Id<T>) -> &mut Self::Output {
        self.get_mut(id)
    }
}
