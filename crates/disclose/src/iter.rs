//! Iteration over traced values.

use std::iter::FusedIterator;
use std::rc::Rc;

use crate::registry::Metadata;
use crate::traced::Traced;
use crate::value::Value;

/// Forward-only iterator returned by [`Traced::iter`].
///
/// Each element is wrapped when it is reached, described by its position
/// in the base (`base[0]`, `base[1]`, ...).
pub struct TracedIter {
    items: std::vec::IntoIter<Value>,
    base: String,
    components: Vec<Rc<Metadata>>,
    position: usize,
}

impl TracedIter {
    pub(crate) fn new(items: Vec<Value>, base: String, components: Vec<Rc<Metadata>>) -> Self {
        Self {
            items: items.into_iter(),
            base,
            components,
            position: 0,
        }
    }
}

impl Iterator for TracedIter {
    type Item = Traced;

    fn next(&mut self) -> Option<Traced> {
        let value = self.items.next()?;
        let description = format!("{}[{}]", self.base, self.position);
        self.position += 1;
        Some(Traced::derive(value, description, self.components.clone()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.items.size_hint()
    }
}

impl ExactSizeIterator for TracedIter {}

impl FusedIterator for TracedIter {}
