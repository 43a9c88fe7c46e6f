use core::fmt;

/// Evaluation stack of one routine activation.
///
/// Compiled routines declare their maximum depth; exceeding it indicates a
/// generation defect and is caught by a debug assertion.
pub struct Stack<T> {
    items: Vec<T>,
    max_size: usize,
}

impl<T> Stack<T> {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: Vec::with_capacity(max_size.min(256)),
            max_size,
        }
    }

    #[inline]
    pub fn push(&mut self, value: T) {
        debug_assert!(
            self.items.len() < self.max_size.max(1),
            "stack overflow: attempted to push beyond declared maximum of {}",
            self.max_size
        );
        self.items.push(value);
    }

    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    /// Remove the top `n` values, returned bottom to top.
    pub fn pop_n(&mut self, n: usize) -> Option<Vec<T>> {
        let len = self.items.len();
        if n > len {
            return None;
        }
        Some(self.items.split_off(len - n))
    }

    #[inline]
    pub fn peek(&self) -> Option<&T> {
        self.items.last()
    }

    #[inline]
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: Clone> Stack<T> {
    /// Duplicate the top value. Returns `false` on an empty stack.
    pub fn dup(&mut self) -> bool {
        match self.peek().cloned() {
            Some(value) => {
                self.push(value);
                true
            }
            None => false,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Stack<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stack")
            .field("items", &self.items)
            .field("max_size", &self.max_size)
            .finish()
    }
}
