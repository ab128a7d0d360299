//! Specification pattern for composable rules
//!
//! Small predicate objects over domain values that combine with `and`.
//! Search uses them for entity access checks and result filtering.

use std::sync::Arc;

/// A rule a value either satisfies or not
pub trait Specification<T>: Send + Sync {
    /// Check if the value satisfies this specification
    fn is_satisfied_by(&self, candidate: &T) -> bool;

    /// Combine with another specification using AND
    fn and<S: Specification<T> + 'static>(self, other: S) -> AndSpecification<T>
    where
        Self: Sized + 'static,
    {
        AndSpecification {
            left: Arc::new(self),
            right: Arc::new(other),
        }
    }
}

/// AND composite specification
pub struct AndSpecification<T> {
    left: Arc<dyn Specification<T>>,
    right: Arc<dyn Specification<T>>,
}

impl<T> Specification<T> for AndSpecification<T>
where
    T: Send + Sync,
{
    fn is_satisfied_by(&self, candidate: &T) -> bool {
        self.left.is_satisfied_by(candidate) && self.right.is_satisfied_by(candidate)
    }
}
