//! The controller base abstraction.
//!
//! A controller is a behavior object bound to exactly one element. Widgets
//! embed a [`ControllerBase`] and implement [`Controller`]; the provided
//! methods supply the state-update protocol (`set_state` / `force_update`),
//! listener wiring (`on` / `trigger`), subtree replacement (`reload`), and
//! child queries (`child_controllers`).

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use smallvec::SmallVec;

pub mod events;
pub mod refs;
pub mod state;

use events::{Event, Handler, Listener, TriggerArg};
use refs::find_refs;
use state::{State, StateChanges, Value};

use crate::dom::Element;
use crate::env::EnvFlags;
use crate::error::{Error, Result};
use crate::registry::{ControllerHandle, ControllerId, ControllerRegistry};

/// Callback that swaps `element` for parsed, upgraded replacement markup and
/// returns the new element. Supplied by the upgrade orchestrator.
pub type ReloadFn = Rc<dyn Fn(&Element, &str) -> Result<Element>>;

/// Configuration supplied at mount, fixed for the controller's lifetime.
#[derive(Clone, Default)]
pub struct Options {
    pub env_flags: Option<EnvFlags>,
    pub reload: Option<ReloadFn>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_env_flags(mut self, env_flags: EnvFlags) -> Self {
        self.env_flags = Some(env_flags);
        self
    }

    pub fn with_reload(mut self, reload: ReloadFn) -> Self {
        self.reload = Some(reload);
        self
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Options")
            .field("env_flags", &self.env_flags)
            .field("reload", &self.reload.as_ref().map(|_| "…"))
            .finish()
    }
}

/// Per-instance data every controller carries.
pub struct ControllerBase {
    id: ControllerId,
    element: Element,
    refs: IndexMap<String, Element>,
    state: State,
    options: Options,
    listeners: SmallVec<[Listener; 4]>,
    registry: ControllerRegistry,
}

impl ControllerBase {
    pub(crate) fn new(
        id: ControllerId,
        element: Element,
        options: Options,
        registry: ControllerRegistry,
    ) -> Self {
        let refs = find_refs(&element);
        Self {
            id,
            element,
            refs,
            state: State::default(),
            options,
            listeners: SmallVec::new(),
            registry,
        }
    }

    pub fn id(&self) -> ControllerId {
        self.id
    }

    pub fn element(&self) -> &Element {
        &self.element
    }

    /// Named child elements, resolved once at mount. A snapshot: mutating
    /// the subtree afterwards does not update the mapping.
    pub fn refs(&self) -> &IndexMap<String, Element> {
        &self.refs
    }

    pub fn reference(&self, name: &str) -> Option<&Element> {
        self.refs.get(name)
    }

    /// A reference the controller cannot work without.
    pub fn require_ref(&self, name: &str) -> Result<Element> {
        self.refs
            .get(name)
            .cloned()
            .ok_or_else(|| Error::MissingRef(name.to_string()))
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn env_flag(&self, name: &str) -> bool {
        self.options
            .env_flags
            .as_ref()
            .is_some_and(|flags| flags.get(name))
    }

    pub fn registry(&self) -> &ControllerRegistry {
        &self.registry
    }

    pub(crate) fn matching_handlers(&self, name: &str) -> Vec<Handler> {
        self.listeners
            .iter()
            .filter(|listener| listener.name == name)
            .map(|listener| listener.handler.clone())
            .collect()
    }
}

impl fmt::Debug for ControllerBase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ControllerBase")
            .field("id", &self.id)
            .field("element", &self.element)
            .field("state", &self.state)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// A behavior object bound to one element.
///
/// `create` must not assume any state: the base starts with the empty record
/// and the widget sets its initial state explicitly.
pub trait Controller: Any {
    fn create(base: ControllerBase) -> Result<Self>
    where
        Self: Sized;

    fn base(&self) -> &ControllerBase;

    fn base_mut(&mut self) -> &mut ControllerBase;

    /// Sync the subtree with `state`. Invoked by `set_state` and
    /// `force_update`; must not be called re-entrantly.
    fn render(&mut self, state: &State, previous: &State);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Shallow-merge `changes` over the current state and re-render.
    ///
    /// The previous snapshot handed to `render` is frozen: it is never
    /// mutated after this call.
    fn set_state(&mut self, changes: StateChanges) {
        let previous = self.base().state.clone();
        let next = previous.merged(changes);
        self.base_mut().state = next.clone();
        self.render(&next, &previous);
    }

    /// Re-render without a logical state transition. Useful when the state
    /// of record lives in the subtree itself.
    fn force_update(&mut self) {
        let state = self.base().state.clone();
        self.render(&state, &state);
    }

    /// Register a listener for `event` on this controller. The listener is
    /// replayed by the bubbling dispatch for events raised on this element
    /// or any descendant.
    fn on(&mut self, event: &str, handler: impl Fn(&mut dyn Controller, &Event) + 'static)
    where
        Self: Sized,
    {
        self.base_mut().listeners.push(Listener {
            name: event.to_string(),
            handler: Rc::new(handler),
        });
    }

    /// Broadcast an event from this controller's element up through its
    /// ancestors. Own listeners replay first, then other controllers on the
    /// same element, then each ancestor in document order.
    fn trigger(&mut self, event: impl Into<TriggerArg>, data: Option<Value>) -> Result<()>
    where
        Self: Sized,
    {
        let mut event = event.into().into_event()?;
        if let Some(data) = data {
            event.data = Some(data);
        }
        event.controller = Some(self.base().id);
        if event.target.is_none() {
            event.target = Some(self.base().element.clone());
        }

        let origin = self.base().element.clone();
        let registry = self.base().registry.clone();
        let self_id = self.base().id;
        tracing::trace!(event = %event.name, origin = %origin, "trigger");

        for handler in self.base().matching_handlers(&event.name) {
            handler(self, &event);
        }
        for handle in registry.attached(&origin) {
            if handle.id() == self_id {
                continue;
            }
            events::deliver(&handle, &event);
        }
        let mut cursor = origin.parent();
        while let Some(element) = cursor {
            for handle in registry.attached(&element) {
                events::deliver(&handle, &event);
            }
            cursor = element.parent();
        }
        Ok(())
    }

    /// Replace this controller's element with server-rendered markup and
    /// hand over to the controller mounted on the replacement.
    ///
    /// The replacement is already upgraded when the reload callback returns;
    /// this controller is left detached from event dispatch, and callers
    /// must use the returned instance for further interaction.
    fn reload(&mut self, html: &str) -> Result<Option<ControllerHandle>>
    where
        Self: Sized,
    {
        let Some(reload) = self.base().options.reload.clone() else {
            return Err(Error::MissingReloadCallback);
        };
        let element = self.base().element.clone();
        let new_element = reload(&element, html)?;

        let type_id = self.as_any().type_id();
        let new_controller = self
            .base()
            .registry
            .attached(&new_element)
            .into_iter()
            .find(|handle| handle.type_id() == type_id);

        let payload = Value::Object(IndexMap::from_iter([(
            "new_controller".to_string(),
            new_controller
                .as_ref()
                .map(|handle| Value::Controller(handle.id()))
                .unwrap_or(Value::Null),
        )]));
        self.trigger("reload", Some(payload))?;

        Ok(new_controller)
    }

    /// Controllers of type `T` attached to strict descendants of this
    /// controller's element, in document order.
    fn child_controllers<T: Controller>(&self) -> Vec<Rc<RefCell<T>>>
    where
        Self: Sized,
    {
        let registry = self.base().registry.clone();
        self.base()
            .element
            .descendants()
            .iter()
            .flat_map(|element| registry.attached(element))
            .filter(|handle| handle.is::<T>())
            .filter_map(|handle| handle.downcast::<T>())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;

    use super::*;
    use crate::dom::Document;
    use crate::registry::ControllerRegistry;

    /// Test double: records every `(state, previous)` pair render sees.
    struct Recorder {
        base: ControllerBase,
        renders: Rc<RefCell<Vec<(State, State)>>>,
    }

    impl Controller for Recorder {
        fn create(base: ControllerBase) -> Result<Self> {
            Ok(Self {
                base,
                renders: Rc::new(RefCell::new(Vec::new())),
            })
        }

        fn base(&self) -> &ControllerBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut ControllerBase {
            &mut self.base
        }

        fn render(&mut self, state: &State, previous: &State) {
            self.renders
                .borrow_mut()
                .push((state.clone(), previous.clone()));
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    struct OtherKind {
        base: ControllerBase,
    }

    impl Controller for OtherKind {
        fn create(base: ControllerBase) -> Result<Self> {
            Ok(Self { base })
        }

        fn base(&self) -> &ControllerBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut ControllerBase {
            &mut self.base
        }

        fn render(&mut self, _state: &State, _previous: &State) {}

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn mount_recorder(html: &str) -> (Document, ControllerRegistry, Rc<RefCell<Recorder>>) {
        let doc = Document::parse(html).unwrap();
        let element = doc.body().children()[0].clone();
        let registry = ControllerRegistry::new();
        let handle = registry
            .mount::<Recorder>(&element, Options::default())
            .unwrap();
        let rc = handle.downcast::<Recorder>().unwrap();
        (doc, registry, rc)
    }

    #[test]
    fn refs_resolve_at_mount() {
        let (_doc, _registry, recorder) =
            mount_recorder(r#"<div><p data-ref="note"></p></div>"#);
        let recorder = recorder.borrow();
        assert_eq!(recorder.base().reference("note").unwrap().tag(), "p");
        assert!(recorder.base().reference("absent").is_none());
        assert!(matches!(
            recorder.base().require_ref("absent"),
            Err(Error::MissingRef(_)),
        ));
    }

    #[test]
    fn set_state_passes_next_and_previous_to_render() {
        let (_doc, _registry, recorder) = mount_recorder("<div></div>");
        let mut ctrl = recorder.borrow_mut();

        ctrl.set_state(StateChanges::new().set("open", true));
        ctrl.set_state(StateChanges::new().set("open", true).set("saving", true));

        let renders = ctrl.renders.borrow();
        assert_eq!(renders.len(), 2);

        let (next, previous) = &renders[0];
        assert_eq!(*next, State::from_iter([("open", true)]));
        assert!(previous.is_empty());

        let (next, previous) = &renders[1];
        assert_eq!(
            *next,
            State::from_iter([("open", true), ("saving", true)]),
        );
        assert_eq!(*previous, State::from_iter([("open", true)]));
    }

    #[test]
    fn previous_snapshot_is_never_mutated() {
        let (_doc, _registry, recorder) = mount_recorder("<div></div>");
        let mut ctrl = recorder.borrow_mut();
        ctrl.set_state(StateChanges::new().set("count", 1i64));
        let first_snapshot = ctrl.base().state().clone();
        ctrl.set_state(StateChanges::new().set("count", 2i64));
        assert_eq!(first_snapshot, State::from_iter([("count", 1i64)]));
        let renders = ctrl.renders.borrow();
        assert!(renders[1].1.shares_snapshot(&first_snapshot));
    }

    #[test]
    fn force_update_renders_identical_pairs() {
        let (_doc, _registry, recorder) = mount_recorder("<div></div>");
        let mut ctrl = recorder.borrow_mut();
        ctrl.set_state(StateChanges::new().set("open", true));
        ctrl.force_update();
        ctrl.force_update();

        let renders = ctrl.renders.borrow();
        assert_eq!(renders.len(), 3);
        for (state, previous) in &renders[1..] {
            assert!(state.shares_snapshot(previous));
            assert_eq!(*state, State::from_iter([("open", true)]));
        }
    }

    #[test]
    fn trigger_reaches_own_listeners() {
        let (_doc, _registry, recorder) = mount_recorder("<div></div>");
        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let log = log.clone();
            recorder.borrow_mut().on("child-event", move |_, event| {
                log.borrow_mut().push(event.name.clone());
            });
        }
        recorder.borrow_mut().trigger("child-event", None).unwrap();
        assert_eq!(*log.borrow(), ["child-event"]);
    }

    #[test]
    fn trigger_bubbles_to_parent_controllers() {
        let doc = Document::parse("<section><div></div></section>").unwrap();
        let section = doc.body().children()[0].clone();
        let div = section.children()[0].clone();
        let registry = ControllerRegistry::new();
        let parent = registry
            .mount::<Recorder>(&section, Options::default())
            .unwrap();
        let child = registry.mount::<Recorder>(&div, Options::default()).unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        {
            let seen = seen.clone();
            parent
                .downcast::<Recorder>()
                .unwrap()
                .borrow_mut()
                .on("child-event", move |_, event| {
                    seen.borrow_mut().push(event.controller);
                });
        }
        child
            .downcast::<Recorder>()
            .unwrap()
            .borrow_mut()
            .trigger("child-event", None)
            .unwrap();
        assert_eq!(*seen.borrow(), [Some(child.id())]);
    }

    #[test]
    fn trigger_rejects_non_text_payload_arguments() {
        let (_doc, _registry, recorder) = mount_recorder("<div></div>");
        let log = Rc::new(RefCell::new(0u32));
        {
            let log = log.clone();
            recorder.borrow_mut().on("anything", move |_, _| {
                *log.borrow_mut() += 1;
            });
        }
        let result = recorder
            .borrow_mut()
            .trigger(Value::Number(7.0), None);
        assert!(matches!(result, Err(Error::InvalidEventArgument(_))));
        assert_eq!(*log.borrow(), 0);
    }

    #[test]
    fn reload_without_capability_fails_and_leaves_dom_alone() {
        let (doc, _registry, recorder) = mount_recorder(r#"<div class="before"></div>"#);
        let before = doc.body().inner_html();
        let result = recorder.borrow_mut().reload(r#"<div class="after"></div>"#);
        assert!(matches!(result, Err(Error::MissingReloadCallback)));
        assert_eq!(doc.body().inner_html(), before);
    }

    #[test]
    fn reload_invokes_the_callback_and_returns_the_same_type_instance() {
        let doc = Document::parse(r#"<div class="widget"></div>"#).unwrap();
        let element = doc.body().children()[0].clone();
        let registry = ControllerRegistry::new();

        let seen_args = Rc::new(RefCell::new(None));
        let reload: ReloadFn = {
            let seen_args = seen_args.clone();
            let registry = registry.clone();
            Rc::new(move |element: &Element, html: &str| {
                *seen_args.borrow_mut() = Some((element.clone(), html.to_string()));
                let replacement = element.document().parse_fragment(html)?.remove(0);
                registry.mount::<OtherKind>(&replacement, Options::default())?;
                registry.mount::<Recorder>(&replacement, Options::default())?;
                element.replace_with(&replacement)?;
                Ok(replacement)
            })
        };

        let handle = registry
            .mount::<Recorder>(&element, Options::default().with_reload(reload))
            .unwrap();
        let rc = handle.downcast::<Recorder>().unwrap();
        let new_controller = rc
            .borrow_mut()
            .reload(r#"<div class="is-updated"></div>"#)
            .unwrap()
            .expect("replacement carries a Recorder");

        let (seen_element, seen_html) = seen_args.borrow().clone().unwrap();
        assert_eq!(seen_element, element);
        assert_eq!(seen_html, r#"<div class="is-updated"></div>"#);

        assert!(new_controller.is::<Recorder>());
        assert_ne!(new_controller.id(), handle.id());
        assert!(new_controller.element().has_class("is-updated"));
        assert_eq!(doc.body().inner_html(), r#"<div class="is-updated"></div>"#);
    }

    #[test]
    fn reload_broadcasts_the_new_controller() {
        let doc = Document::parse(r#"<div class="widget"></div>"#).unwrap();
        let element = doc.body().children()[0].clone();
        let registry = ControllerRegistry::new();
        let reload: ReloadFn = {
            let registry = registry.clone();
            Rc::new(move |element: &Element, html: &str| {
                let replacement = element.document().parse_fragment(html)?.remove(0);
                registry.mount::<Recorder>(&replacement, Options::default())?;
                element.replace_with(&replacement)?;
                Ok(replacement)
            })
        };
        let handle = registry
            .mount::<Recorder>(&element, Options::default().with_reload(reload))
            .unwrap();
        let rc = handle.downcast::<Recorder>().unwrap();

        let payloads = Rc::new(RefCell::new(Vec::new()));
        {
            let payloads = payloads.clone();
            rc.borrow_mut().on("reload", move |_, event| {
                payloads
                    .borrow_mut()
                    .push(event.data_field("new_controller").cloned());
            });
        }
        let new_controller = rc.borrow_mut().reload("<div></div>").unwrap().unwrap();
        assert_eq!(
            *payloads.borrow(),
            [Some(Value::Controller(new_controller.id()))],
        );
    }

    #[test]
    fn child_controllers_come_back_in_document_order() {
        let doc = Document::parse(concat!(
            r#"<form><div><input id="a"></div><input id="b"></form>"#,
            r#"<input id="outside">"#,
        ))
        .unwrap();
        let form = doc.body().children()[0].clone();
        let registry = ControllerRegistry::new();
        let form_handle = registry.mount::<Recorder>(&form, Options::default()).unwrap();
        for input in ["a", "b", "outside"] {
            let element = doc.element_by_id(input).unwrap();
            registry.mount::<OtherKind>(&element, Options::default()).unwrap();
        }

        let form_rc = form_handle.downcast::<Recorder>().unwrap();
        let children = form_rc.borrow().child_controllers::<OtherKind>();
        let ids: Vec<_> = children
            .iter()
            .map(|child| child.borrow().base().element().attr("id").unwrap())
            .collect();
        assert_eq!(ids, ["a", "b"]);

        assert!(form_rc.borrow().child_controllers::<Recorder>().is_empty());
    }
}
