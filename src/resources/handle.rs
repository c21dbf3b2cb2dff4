use std::marker::PhantomData;

/// Index-based resource reference. Batches store these instead of pointers so
/// that frame-scoped queues never hold borrows into the resource store; the
/// low 16 bits also feed directly into the batch sort key.
#[derive(Debug)]
pub struct Handle<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Handle<T> {}

impl<T> std::hash::Hash for Handle<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> Handle<T> {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            _marker: PhantomData,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Truncated id used as a sort-key component.
    pub fn sort_id(&self) -> u16 {
        (self.index & 0xffff) as u16
    }
}
