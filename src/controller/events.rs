//! Event bridge: listener registration and synthetic bubbling dispatch.
//!
//! Events do not rely on a native event plane. A broadcast walks upward from
//! the origin element through every ancestor (origin inclusive), and at each
//! element invokes every registered listener of every attached controller
//! whose name matches, listeners in registration order and controllers in
//! attachment order. The walk reads each element's parent *after* dispatching
//! at that element, so replacing an element mid-dispatch stops the bubble.
//!
//! Simulated native events (`click`, `focus`, `change`, …) go through
//! [`dispatch`], which performs the same walk with no originating controller.

use std::rc::Rc;

use crate::controller::Controller;
use crate::controller::state::Value;
use crate::dom::Element;
use crate::error::{Error, Result};
use crate::registry::{ControllerHandle, ControllerId, ControllerRegistry};

/// An event travelling up the tree.
#[derive(Clone)]
pub struct Event {
    pub name: String,
    /// Optional payload attached by the sender.
    pub data: Option<Value>,
    /// The originating controller, when triggered rather than dispatched.
    pub controller: Option<ControllerId>,
    /// The element the event started from.
    pub target: Option<Element>,
}

impl Event {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: None,
            controller: None,
            target: None,
        }
    }

    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Look up a field of an object payload.
    pub fn data_field(&self, key: &str) -> Option<&Value> {
        match self.data.as_ref()? {
            Value::Object(fields) => fields.get(key),
            _ => None,
        }
    }
}

/// Argument to `trigger`: an event name, a prepared event, or a dynamic
/// value. Dynamic values must be text (an event name); anything else is
/// rejected with [`Error::InvalidEventArgument`].
pub enum TriggerArg {
    Name(String),
    Event(Event),
    Payload(Value),
}

impl TriggerArg {
    pub(crate) fn into_event(self) -> Result<Event> {
        match self {
            TriggerArg::Name(name) => Ok(Event::new(name)),
            TriggerArg::Event(event) => Ok(event),
            TriggerArg::Payload(Value::Text(name)) => Ok(Event::new(name)),
            TriggerArg::Payload(other) => Err(Error::InvalidEventArgument(format!("{other:?}"))),
        }
    }
}

impl From<&str> for TriggerArg {
    fn from(name: &str) -> Self {
        TriggerArg::Name(name.to_string())
    }
}

impl From<String> for TriggerArg {
    fn from(name: String) -> Self {
        TriggerArg::Name(name)
    }
}

impl From<Event> for TriggerArg {
    fn from(event: Event) -> Self {
        TriggerArg::Event(event)
    }
}

impl From<Value> for TriggerArg {
    fn from(value: Value) -> Self {
        TriggerArg::Payload(value)
    }
}

/// A registered listener callback.
///
/// Handlers receive the controller they were registered on; widget handlers
/// downcast through `as_any_mut` to reach their own methods.
pub type Handler = Rc<dyn Fn(&mut dyn Controller, &Event)>;

pub(crate) struct Listener {
    pub(crate) name: String,
    pub(crate) handler: Handler,
}

/// Dispatch an event from `origin` up through its ancestors, with no
/// originating controller. This is the entry point for simulated native
/// events.
pub fn dispatch(origin: &Element, event: Event, registry: &ControllerRegistry) {
    let mut event = event;
    if event.target.is_none() {
        event.target = Some(origin.clone());
    }
    tracing::trace!(event = %event.name, origin = %origin, "dispatch");
    let mut cursor = Some(origin.clone());
    while let Some(element) = cursor {
        for handle in registry.attached(&element) {
            deliver(&handle, &event);
        }
        cursor = element.parent();
    }
}

/// Invoke every matching listener of one controller.
pub(crate) fn deliver(handle: &ControllerHandle, event: &Event) {
    let handlers: Vec<Handler> = {
        let controller = handle.object().borrow();
        controller.base().matching_handlers(&event.name)
    };
    for handler in handlers {
        let mut controller = handle.object().borrow_mut();
        handler(&mut *controller, event);
    }
}
