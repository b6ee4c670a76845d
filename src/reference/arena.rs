use std::rc::Rc;

use serde_derive::{Deserialize, Serialize};

use super::{Condition, RefEvent, RefKind, RefObserver, Reference, Subscription};
use crate::{
    error::{Error, Result},
    fmt_err,
    types::Value,
};

/// Generational handle of a [`Reference`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RefId {
    index: u32,
    generation: u32,
}

impl std::fmt::Display for RefId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}@{}", self.index, self.generation)
    }
}

struct Slot {
    generation: u32,
    entry: Option<Reference>,
}

/// Owner of every reference of a run.
///
/// `clear` drops all references and bumps slot generations, handles kept
/// from before are then reported as stale instead of pointing at new
/// references.
#[derive(Default)]
pub struct RefArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl RefArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.entry.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: RefId) -> Option<&Reference> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.entry.as_ref())
    }

    fn get_mut(&mut self, id: RefId) -> Option<&mut Reference> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.entry.as_mut())
    }

    fn lookup(&self, id: RefId) -> Result<&Reference> {
        self.get(id)
            .ok_or_else(|| Error::Internal(fmt_err!("stale reference handle {}", id)))
    }

    fn insert(&mut self, reference: Reference) -> RefId {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entry = Some(reference);
                RefId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(reference),
                });
                RefId {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        }
    }

    pub fn create_static(&mut self, table: &str, value: Value) -> RefId {
        let mut reference = Reference::new(table, RefKind::Static);
        reference.value = (!value.is_null()).then_some(value);
        self.insert(reference)
    }

    pub fn create_resolvable(&mut self, table: &str, condition: Condition) -> RefId {
        self.insert(Reference::new(table, RefKind::Resolvable(condition)))
    }

    /// Creates a composite over existing references, resolved right away
    /// when every child already has a value.
    pub fn create_composite(&mut self, table: &str, children: Vec<RefId>, separator: &str) -> Result<RefId> {
        for child in &children {
            self.lookup(*child)?;
        }

        let id = self.insert(Reference::new(
            table,
            RefKind::Composite {
                children: children.clone(),
                separator: separator.to_owned(),
            },
        ));
        for child in children {
            if let Some(reference) = self.get_mut(child) {
                reference.composites.push(id);
            }
        }

        if let Some(joined) = self.joined(id) {
            if let Some(reference) = self.get_mut(id) {
                reference.value = Some(Value::String(joined));
            }
        }
        Ok(id)
    }

    pub fn value(&self, id: RefId) -> Option<&Value> {
        self.get(id).and_then(|r| r.value())
    }

    pub fn is_resolved(&self, id: RefId) -> bool {
        self.get(id).is_some_and(|r| r.is_resolved())
    }

    /// Stores a value, `Value::Null` clears the reference.
    ///
    /// Observers are told whether the reference is resolved afterwards and
    /// composites containing it are refreshed.
    pub fn set_value(&mut self, id: RefId, value: Value) -> Result<()> {
        let value = (!value.is_null()).then_some(value);
        let resolved = value.is_some();

        let reference = self
            .get_mut(id)
            .ok_or_else(|| Error::Internal(fmt_err!("stale reference handle {}", id)))?;
        reference.value = value;
        let composites = reference.composites.clone();

        self.notify(id, RefEvent::Resolved(resolved));
        for composite in composites {
            self.refresh_composite(composite, resolved)?;
        }
        Ok(())
    }

    fn refresh_composite(&mut self, id: RefId, child_resolved: bool) -> Result<()> {
        let Some(reference) = self.get(id) else {
            return Ok(());
        };

        if !child_resolved {
            if reference.is_resolved() {
                self.set_value(id, Value::Null)?;
            }
            return Ok(());
        }
        // computed once, later child changes keep the cached value
        if reference.is_resolved() {
            return Ok(());
        }
        if let Some(joined) = self.joined(id) {
            self.set_value(id, Value::String(joined))?;
        }
        Ok(())
    }

    fn joined(&self, id: RefId) -> Option<String> {
        let RefKind::Composite {
            children,
            separator,
        } = self.get(id)?.kind()
        else {
            return None;
        };

        let parts = children
            .iter()
            .map(|child| self.value(*child).map(|v| v.to_key_string()))
            .collect::<Option<Vec<_>>>()?;
        Some(parts.join(separator))
    }

    pub fn add_observer(&mut self, id: RefId, observer: Rc<dyn RefObserver>) -> Result<()> {
        let reference = self
            .get_mut(id)
            .ok_or_else(|| Error::Internal(fmt_err!("stale reference handle {}", id)))?;
        reference.observers.get_or_insert_with(Vec::new).push(observer);
        Ok(())
    }

    pub fn remove_observer(&mut self, id: RefId, observer: &Rc<dyn RefObserver>) {
        let Some(reference) = self.get_mut(id) else {
            return;
        };
        if let Some(observers) = reference.observers.as_mut() {
            observers.retain(|o| !same_observer(o, observer));
            if observers.is_empty() {
                reference.observers = None;
            }
        }
    }

    /// Tells observers the reference is being discarded.
    pub fn reset(&mut self, id: RefId) {
        self.notify(id, RefEvent::Reset);
    }

    pub fn clear(&mut self) {
        self.free.clear();
        for (index, slot) in self.slots.iter_mut().enumerate().rev() {
            slot.entry = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(index as u32);
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = RefId> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.entry.as_ref().map(|_| RefId {
                index: index as u32,
                generation: slot.generation,
            })
        })
    }

    fn notify(&mut self, id: RefId, event: RefEvent) {
        let Some(reference) = self.get_mut(id) else {
            return;
        };
        let Some(observers) = reference.observers.take() else {
            return;
        };

        let kept: Vec<_> = observers
            .into_iter()
            .filter(|o| o.notify(id, event) == Subscription::Keep)
            .collect();
        reference.observers = (!kept.is_empty()).then_some(kept);
    }
}

fn same_observer(a: &Rc<dyn RefObserver>, b: &Rc<dyn RefObserver>) -> bool {
    Rc::as_ptr(a) as *const () == Rc::as_ptr(b) as *const ()
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: RefCell<Vec<(RefId, RefEvent)>>,
    }

    impl RefObserver for Recorder {
        fn notify(&self, id: RefId, event: RefEvent) -> Subscription {
            self.events.borrow_mut().push((id, event));
            match event {
                RefEvent::Reset => Subscription::Detach,
                RefEvent::Resolved(_) => Subscription::Keep,
            }
        }
    }

    fn resolvable(arena: &mut RefArena, name: &str) -> RefId {
        arena.create_resolvable("order", Condition::new([("name", name)]).unwrap())
    }

    #[test]
    fn test_resolved_follows_value() {
        let mut arena = RefArena::new();
        let id = resolvable(&mut arena, "x");
        assert!(!arena.is_resolved(id));
        assert_eq!(arena.value(id), None);

        arena.set_value(id, Value::Int(5)).unwrap();
        assert!(arena.is_resolved(id));
        assert_eq!(arena.value(id), Some(&Value::Int(5)));

        arena.set_value(id, Value::Null).unwrap();
        assert!(!arena.is_resolved(id));
        assert_eq!(arena.value(id), None);

        let fixed = arena.create_static("order", Value::Int(1));
        assert!(arena.is_resolved(fixed));
        let empty = arena.create_static("order", Value::Null);
        assert!(!arena.is_resolved(empty));
    }

    #[test]
    fn test_observers() {
        let mut arena = RefArena::new();
        let id = resolvable(&mut arena, "x");
        let recorder = Rc::new(Recorder::default());
        let observer: Rc<dyn RefObserver> = recorder.clone();

        arena.add_observer(id, observer.clone()).unwrap();
        arena.set_value(id, Value::Int(1)).unwrap();
        arena.set_value(id, Value::Null).unwrap();
        arena.reset(id);
        assert_eq!(
            *recorder.events.borrow(),
            vec![
                (id, RefEvent::Resolved(true)),
                (id, RefEvent::Resolved(false)),
                (id, RefEvent::Reset)
            ]
        );
        // detached on reset
        assert_eq!(arena.get(id).unwrap().observer_count(), 0);

        arena.add_observer(id, observer.clone()).unwrap();
        assert_eq!(arena.get(id).unwrap().observer_count(), 1);
        arena.remove_observer(id, &observer);
        assert!(arena.get(id).unwrap().observers.is_none());
    }

    #[test]
    fn test_composite() {
        let mut arena = RefArena::new();
        let a = resolvable(&mut arena, "a");
        let b = resolvable(&mut arena, "b");
        let composite = arena.create_composite("order", vec![a, b], "-").unwrap();
        assert!(!arena.is_resolved(composite));

        arena.set_value(a, Value::Int(1)).unwrap();
        assert!(!arena.is_resolved(composite));
        arena.set_value(b, "x".into()).unwrap();
        assert_eq!(arena.value(composite), Some(&Value::from("1-x")));

        // cached once computed
        arena.set_value(a, Value::Int(2)).unwrap();
        assert_eq!(arena.value(composite), Some(&Value::from("1-x")));

        arena.set_value(b, Value::Null).unwrap();
        assert!(!arena.is_resolved(composite));
        assert_eq!(arena.value(composite), None);

        let resolved = arena.create_composite("order", vec![a], "").unwrap();
        assert_eq!(arena.value(resolved), Some(&Value::from("2")));
    }

    #[test]
    fn test_clear_invalidates_handles() {
        let mut arena = RefArena::new();
        let old = arena.create_static("order", Value::Int(1));
        arena.clear();
        assert!(arena.is_empty());
        assert!(arena.get(old).is_none());
        assert!(arena.set_value(old, Value::Int(2)).is_err());

        let new = arena.create_static("order", Value::Int(3));
        assert_ne!(old, new);
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.ids().collect::<Vec<_>>(), vec![new]);
    }
}
