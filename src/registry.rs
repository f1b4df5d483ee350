//! The element→controllers side table.
//!
//! The association between elements and their controllers is an explicit
//! registry owned by the upgrade orchestrator. Insertion happens on mount
//! and is additive (an element may carry several layered controllers);
//! removal only happens when the orchestrator evicts a subtree during
//! reload.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::controller::{Controller, ControllerBase, Options};
use crate::dom::{Element, NodeId};
use crate::error::Result;

/// Identity of a mounted controller instance. Ids are unique for the life of
/// the registry and are never reused, so stale ids simply resolve to nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControllerId(u64);

/// Shared handle to a mounted controller.
///
/// Carries the element and concrete type tag so callers can inspect identity
/// without borrowing the instance, which matters while a controller's own
/// handler is on the stack.
#[derive(Clone)]
pub struct ControllerHandle {
    id: ControllerId,
    type_id: TypeId,
    type_name: &'static str,
    element: Element,
    instance: Rc<dyn Any>,
    object: Rc<RefCell<dyn Controller>>,
}

impl ControllerHandle {
    pub fn id(&self) -> ControllerId {
        self.id
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn element(&self) -> &Element {
        &self.element
    }

    pub fn is<T: Controller>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Recover the concretely typed instance.
    pub fn downcast<T: Controller>(&self) -> Option<Rc<RefCell<T>>> {
        self.instance.clone().downcast::<RefCell<T>>().ok()
    }

    /// The type-erased instance, for dynamic dispatch.
    pub fn object(&self) -> &Rc<RefCell<dyn Controller>> {
        &self.object
    }
}

impl fmt::Debug for ControllerHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ControllerHandle({:?}, {})", self.id, self.type_name)
    }
}

#[derive(Default)]
struct RegistryInner {
    by_element: HashMap<NodeId, SmallVec<[ControllerHandle; 2]>>,
    by_id: HashMap<ControllerId, ControllerHandle>,
    next_id: u64,
}

/// Registry of mounted controllers, keyed by element identity.
#[derive(Clone, Default)]
pub struct ControllerRegistry {
    inner: Rc<RefCell<RegistryInner>>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct a controller of type `T` on `element` and register it,
    /// preserving any controllers already attached there.
    ///
    /// The base is prepared first (empty state, empty listeners, refs
    /// resolved from the current subtree); `T::create` then wires listeners
    /// and sets the initial state explicitly.
    pub fn mount<T: Controller>(
        &self,
        element: &Element,
        options: Options,
    ) -> Result<ControllerHandle> {
        let id = {
            let mut inner = self.inner.borrow_mut();
            inner.next_id += 1;
            ControllerId(inner.next_id)
        };
        let base = ControllerBase::new(id, element.clone(), options, self.clone());
        let controller = T::create(base)?;
        let rc = Rc::new(RefCell::new(controller));
        let instance: Rc<dyn Any> = rc.clone();
        let object: Rc<RefCell<dyn Controller>> = rc;
        let handle = ControllerHandle {
            id,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            element: element.clone(),
            instance,
            object,
        };
        let mut inner = self.inner.borrow_mut();
        inner
            .by_element
            .entry(element.node_id())
            .or_default()
            .push(handle.clone());
        inner.by_id.insert(id, handle.clone());
        Ok(handle)
    }

    /// Controllers attached to `element`, in mount order. Returns a snapshot
    /// so dispatch keeps working if handlers mount or evict concurrently.
    pub fn attached(&self, element: &Element) -> Vec<ControllerHandle> {
        self.inner
            .borrow()
            .by_element
            .get(&element.node_id())
            .map(|handles| handles.to_vec())
            .unwrap_or_default()
    }

    pub fn get(&self, id: ControllerId) -> Option<ControllerHandle> {
        self.inner.borrow().by_id.get(&id).cloned()
    }

    /// Drop every controller attached to `element` or its descendants.
    pub fn evict_subtree(&self, element: &Element) {
        let mut nodes = vec![element.node_id()];
        nodes.extend(element.descendants().iter().map(Element::node_id));
        let mut inner = self.inner.borrow_mut();
        for node in nodes {
            if let Some(handles) = inner.by_element.remove(&node) {
                for handle in handles {
                    inner.by_id.remove(&handle.id);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().by_id.is_empty()
    }
}

impl fmt::Debug for ControllerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ControllerRegistry({} controllers)", self.len())
    }
}
