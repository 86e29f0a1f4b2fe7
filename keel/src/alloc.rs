use std::mem::MaybeUninit;
use std::ops::Deref;

/// A helper for allocating elements to an arena slice up to a maximum length.
/// This is useful where initialization is difficult to express with
/// [`scoped_arena::Scope::to_scope_from_iter`], for example:
///
/// - when pushing to multiple slices at once
/// - when element initialization has the possibility of failure
pub struct SliceVec<'a, Elem> {
    len: usize,
    // SAFETY: The slice `self.elems[..self.len]` should only ever
    //         contain elements initialized with `MaybeUninit::new`.
    elems: &'a mut [MaybeUninit<Elem>],
}

impl<'a, Elem> SliceVec<'a, Elem> {
    /// Allocates a new slice builder to the scope.
    ///
    /// # Panics
    ///
    /// If the element type has drop-glue to be executed.
    pub fn new(scope: &'a scoped_arena::Scope<'a>, capacity: usize) -> SliceVec<'a, Elem> {
        // There is no way of registering the drop glue of `Elem` with
        // `scoped_arena::Scope`, so insist that there is none.
        assert!(!std::mem::needs_drop::<Elem>());

        SliceVec {
            len: 0,
            elems: scope.to_scope_many_with(capacity, MaybeUninit::uninit),
        }
    }

    pub fn capacity(&self) -> usize {
        self.elems.len()
    }

    pub fn is_full(&self) -> bool {
        self.len >= self.capacity()
    }

    /// Push an element to the slice builder.
    ///
    /// # Panics
    ///
    /// If pushing the element would exceed the capacity supplied in
    /// [`SliceVec::new`].
    pub fn push(&mut self, elem: Elem) {
        if self.is_full() {
            panic!(
                "Cannot push onto a full `SliceVec` (capacity is {})",
                self.capacity()
            )
        }
        self.elems[self.len] = MaybeUninit::new(elem);
        self.len += 1;
    }
}

impl<'a, Elem> Deref for SliceVec<'a, Elem> {
    type Target = [Elem];

    fn deref(&self) -> &[Elem] {
        // SAFETY: `self.elems[..self.len]` only ever contains elements
        // initialized with `MaybeUninit::new` (see `SliceVec::push`).
        unsafe { slice_assume_init_ref(&self.elems[..self.len]) }
    }
}

impl<'a, Elem> From<SliceVec<'a, Elem>> for &'a [Elem] {
    fn from(slice: SliceVec<'a, Elem>) -> &'a [Elem] {
        // SAFETY: `slice.elems[..slice.len]` only ever contains elements
        // initialized with `MaybeUninit::new` (see `SliceVec::push`).
        unsafe { slice_assume_init_ref(&slice.elems[..slice.len]) }
    }
}

// NOTE: This is the same implementation as `MaybeUninit::slice_assume_init_ref`,
// which is currently unstable (see https://github.com/rust-lang/rust/issues/63569).
#[allow(clippy::needless_lifetimes)] // These serve as important documentation
pub unsafe fn slice_assume_init_ref<'a, T>(slice: &'a [MaybeUninit<T>]) -> &'a [T] {
    // SAFETY: casting `slice` to a `*const [T]` is safe since the caller
    // guarantees that `slice` is initialized, and `MaybeUninit` is guaranteed
    // to have the same layout as `T`. The pointer obtained is valid since it
    // refers to memory owned by `slice` which is a reference and thus
    // guaranteed to be valid for reads.
    &*(slice as *const [MaybeUninit<T>] as *const [T])
}
