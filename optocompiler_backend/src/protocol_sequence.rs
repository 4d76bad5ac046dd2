//! The authored protocol: an ordered list of [`ProtocolElement`]s together with the active
//! [`Pattern`] and the random seed used when the sequence is expanded into a [`crate::Program`].
//!
//! Changes are made through explicit setters. Owners that need to react to edits (a preview,
//! a designer window) call [`ProtocolSequence::subscribe`] and receive [`SequenceEvent`]s on a
//! crossbeam channel. Disconnected subscribers are dropped silently.

use crossbeam::channel::{unbounded, Receiver, Sender};

use crate::error::{Result, ValidationError};
use crate::pattern::Pattern;
use crate::protocol_element::ProtocolElement;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SequenceEvent {
    PatternChanged(Pattern),
    RandomSeedChanged(u64),
    ElementsChanged,
}

#[derive(Debug, Clone, Default)]
pub struct ProtocolSequence {
    elements: Vec<ProtocolElement>,
    pattern: Pattern,
    random_seed: u64,
    listeners: Vec<Sender<SequenceEvent>>,
}

impl PartialEq for ProtocolSequence {
    fn eq(&self, other: &Self) -> bool {
        self.elements == other.elements
            && self.pattern == other.pattern
            && self.random_seed == other.random_seed
    }
}

impl ProtocolSequence {
    pub fn new(pattern: Pattern, random_seed: u64) -> Self {
        Self {
            elements: Vec::new(),
            pattern,
            random_seed,
            listeners: Vec::new(),
        }
    }

    /// Builds a sequence from existing elements. The elements keep their own pattern tags.
    pub fn from_elements(elements: Vec<ProtocolElement>, pattern: Pattern, random_seed: u64) -> Self {
        Self {
            elements,
            ..Self::new(pattern, random_seed)
        }
    }

    pub fn subscribe(&mut self) -> Receiver<SequenceEvent> {
        let (sender, receiver) = unbounded();
        self.listeners.push(sender);
        receiver
    }

    fn notify(&mut self, event: SequenceEvent) {
        self.listeners.retain(|listener| listener.send(event).is_ok());
    }

    pub fn elements(&self) -> &[ProtocolElement] {
        &self.elements
    }

    pub fn element(&self, index: usize) -> Option<&ProtocolElement> {
        self.elements.get(index)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn pattern(&self) -> Pattern {
        self.pattern
    }

    pub fn random_seed(&self) -> u64 {
        self.random_seed
    }

    pub fn push(&mut self, element: ProtocolElement) {
        self.elements.push(element);
        self.notify(SequenceEvent::ElementsChanged);
    }

    pub fn insert(&mut self, index: usize, element: ProtocolElement) -> Result<()> {
        if index > self.elements.len() {
            return Err(self.out_of_range(index).into());
        }
        self.elements.insert(index, element);
        self.notify(SequenceEvent::ElementsChanged);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<ProtocolElement> {
        if index >= self.elements.len() {
            return Err(self.out_of_range(index).into());
        }
        let element = self.elements.remove(index);
        self.notify(SequenceEvent::ElementsChanged);
        Ok(element)
    }

    /// Swaps two elements, e.g. when the user reorders rows.
    pub fn swap(&mut self, a: usize, b: usize) -> Result<()> {
        for index in [a, b] {
            if index >= self.elements.len() {
                return Err(self.out_of_range(index).into());
            }
        }
        self.elements.swap(a, b);
        self.notify(SequenceEvent::ElementsChanged);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.elements.clear();
        self.notify(SequenceEvent::ElementsChanged);
    }

    /// Applies `edit` to the element at `index`.
    ///
    /// The edit goes through the element's validated setters; if it fails the element is
    /// left unchanged and the error is returned.
    pub fn edit_element<F>(&mut self, index: usize, edit: F) -> Result<()>
    where
        F: FnOnce(&mut ProtocolElement) -> Result<()>,
    {
        let len = self.elements.len();
        let element = self
            .elements
            .get_mut(index)
            .ok_or(ValidationError::ElementOutOfRange { index, len })?;
        let mut edited = element.clone();
        edit(&mut edited)?;
        *element = edited;
        self.notify(SequenceEvent::ElementsChanged);
        Ok(())
    }

    /// Switches the active pattern and re-tags every non-Normal selected point currently in the
    /// sequence. Point indices are left untouched; nothing is regenerated.
    pub fn set_pattern(&mut self, pattern: Pattern) {
        self.pattern = pattern;
        self.elements
            .iter_mut()
            .for_each(|element| element.retag_patterned(pattern));
        self.notify(SequenceEvent::PatternChanged(pattern));
    }

    pub fn set_random_seed(&mut self, random_seed: u64) {
        self.random_seed = random_seed;
        self.notify(SequenceEvent::RandomSeedChanged(random_seed));
    }

    fn out_of_range(&self, index: usize) -> ValidationError {
        ValidationError::ElementOutOfRange {
            index,
            len: self.elements.len(),
        }
    }
}
