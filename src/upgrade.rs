//! The upgrade orchestrator: where server-rendered markup meets behavior.
//!
//! An [`Upgrader`] owns the controller registry and a selector→controller
//! table. `upgrade` walks a root subtree (root inclusive), mounts one
//! controller per selector match, and hands every controller a reload
//! capability that re-runs the orchestrator on injected markup.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::controller::{Controller, Options, ReloadFn};
use crate::dom::{Element, Selector};
use crate::env::{self, EnvFlags};
use crate::error::{Error, Result};
use crate::registry::{ControllerHandle, ControllerRegistry};

type MountFn = Rc<dyn Fn(&ControllerRegistry, &Element, Options) -> Result<ControllerHandle>>;

struct TableEntry {
    type_name: &'static str,
    mount: MountFn,
}

/// Ordered mapping from selector to controller type.
///
/// Selectors are independent: an element matching several entries receives
/// one controller per entry, layered in table order.
#[derive(Default)]
pub struct UpgradeTable {
    entries: IndexMap<String, TableEntry>,
}

impl UpgradeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Controller>(mut self, selector: impl Into<String>) -> Self {
        let mount: MountFn =
            Rc::new(|registry, element, options| registry.mount::<T>(element, options));
        self.entries.insert(
            selector.into(),
            TableEntry {
                type_name: std::any::type_name::<T>(),
                mount,
            },
        );
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

struct UpgraderInner {
    table: UpgradeTable,
    registry: ControllerRegistry,
    env_flags: Option<EnvFlags>,
}

/// Upgrades elements on a page and owns the resulting controllers.
#[derive(Clone)]
pub struct Upgrader {
    inner: Rc<UpgraderInner>,
}

impl Upgrader {
    pub fn new(table: UpgradeTable) -> Self {
        Self {
            inner: Rc::new(UpgraderInner {
                table,
                registry: ControllerRegistry::new(),
                env_flags: None,
            }),
        }
    }

    pub fn with_env_flags(table: UpgradeTable, env_flags: EnvFlags) -> Self {
        Self {
            inner: Rc::new(UpgraderInner {
                table,
                registry: ControllerRegistry::new(),
                env_flags: Some(env_flags),
            }),
        }
    }

    pub fn registry(&self) -> &ControllerRegistry {
        &self.inner.registry
    }

    pub fn env_flags(&self) -> Option<&EnvFlags> {
        self.inner.env_flags.as_ref()
    }

    /// Mount controllers for every table entry on every matching element
    /// under `root` (inclusive), in document order.
    ///
    /// Mount failures are logged with the offending element and controller
    /// type, then propagated: elements already upgraded stay upgraded, the
    /// rest of the pass is abandoned.
    pub fn upgrade(&self, root: &Element) -> Result<()> {
        if let Some(flags) = &self.inner.env_flags {
            if flags.get(env::SKIP_FLAG) {
                tracing::debug!("enhancements disabled by environment flag, skipping upgrade");
                return Ok(());
            }
        }
        for (source, entry) in &self.inner.table.entries {
            let selector = Selector::parse(source)?;
            let mut targets = Vec::new();
            if selector.matches(root) {
                targets.push(root.clone());
            }
            targets.extend(root.select_all(&selector));
            for element in targets {
                let options = Options {
                    env_flags: self.inner.env_flags.clone(),
                    reload: Some(self.reload_fn()),
                };
                if let Err(cause) = (entry.mount)(&self.inner.registry, &element, options) {
                    tracing::error!(
                        selector = %source,
                        controller = entry.type_name,
                        element = %element,
                        error = %cause,
                        "failed to upgrade element"
                    );
                    return Err(Error::Upgrade {
                        element: element.to_string(),
                        controller: entry.type_name,
                        source: Box::new(cause),
                    });
                }
            }
        }
        Ok(())
    }

    /// Upgrade and then signal readiness to bootstrap code.
    pub fn run(&self, root: &Element) -> Result<()> {
        self.upgrade(root)?;
        if let Some(flags) = &self.inner.env_flags {
            flags.ready();
        }
        Ok(())
    }

    /// The reload capability handed to every mounted controller: parse the
    /// replacement markup, upgrade it, swap it into place, evict the old
    /// subtree's controllers.
    fn reload_fn(&self) -> ReloadFn {
        let upgrader = self.clone();
        Rc::new(move |element: &Element, html: &str| {
            let mut fragment = element.document().parse_fragment(html)?;
            if fragment.len() != 1 {
                return Err(Error::ReloadMarkup(fragment.len()));
            }
            let replacement = fragment.remove(0);
            upgrader.upgrade(&replacement)?;
            element.replace_with(&replacement)?;
            upgrader.registry().evict_subtree(element);
            tracing::debug!(old = %element, new = %replacement, "reloaded subtree");
            Ok(replacement)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;
    use std::cell::RefCell;

    use super::*;
    use crate::controller::ControllerBase;
    use crate::controller::state::{State, StateChanges};
    use crate::dom::Document;
    use crate::error::Result;

    struct Probe {
        base: ControllerBase,
    }

    impl Controller for Probe {
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

    /// Marks its element so tests can see which elements were upgraded.
    struct Marker {
        base: ControllerBase,
    }

    impl Controller for Marker {
        fn create(base: ControllerBase) -> Result<Self> {
            base.element().set_attr("data-upgraded", "yes");
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

    struct Broken;

    impl Controller for Broken {
        fn create(base: ControllerBase) -> Result<Self> {
            base.require_ref("never-there")?;
            Ok(Self)
        }

        fn base(&self) -> &ControllerBase {
            unreachable!("construction always fails")
        }

        fn base_mut(&mut self) -> &mut ControllerBase {
            unreachable!("construction always fails")
        }

        fn render(&mut self, _state: &State, _previous: &State) {}

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn upgrades_matching_elements_with_the_exact_element() {
        let doc = Document::parse(r#"<div class="js-test"></div><div class="other"></div>"#)
            .unwrap();
        let upgrader = Upgrader::new(UpgradeTable::new().register::<Probe>(".js-test"));
        upgrader.upgrade(&doc.body()).unwrap();

        assert_eq!(upgrader.registry().len(), 1);
        let target = doc.body().children()[0].clone();
        let attached = upgrader.registry().attached(&target);
        assert_eq!(attached.len(), 1);
        assert!(attached[0].is::<Probe>());
        assert_eq!(attached[0].element(), &target);
    }

    #[test]
    fn upgrade_includes_the_root_itself() {
        let doc = Document::parse(r#"<div class="js-test"></div>"#).unwrap();
        let root = doc.body().children()[0].clone();
        let upgrader = Upgrader::new(UpgradeTable::new().register::<Probe>(".js-test"));
        upgrader.upgrade(&root).unwrap();
        assert_eq!(upgrader.registry().attached(&root).len(), 1);
    }

    #[test]
    fn env_flags_pass_through_to_options() {
        let doc = Document::parse(r#"<div class="js-test"></div>"#).unwrap();
        let flags = EnvFlags::new();
        flags.set("touch", true);
        let upgrader =
            Upgrader::with_env_flags(UpgradeTable::new().register::<Probe>(".js-test"), flags);
        upgrader.upgrade(&doc.body()).unwrap();

        let handle = upgrader.registry().attached(&doc.body().children()[0]);
        let probe = handle[0].downcast::<Probe>().unwrap();
        assert!(probe.borrow().base().env_flag("touch"));
        assert!(!probe.borrow().base().env_flag("js-timeout"));
    }

    #[test]
    fn skip_flag_disables_upgrading() {
        let doc = Document::parse(r#"<div class="js-test"></div>"#).unwrap();
        let flags = EnvFlags::new();
        flags.set(env::SKIP_FLAG, true);
        let upgrader =
            Upgrader::with_env_flags(UpgradeTable::new().register::<Probe>(".js-test"), flags);
        upgrader.upgrade(&doc.body()).unwrap();
        assert!(upgrader.registry().is_empty());
    }

    #[test]
    fn run_signals_readiness() {
        let doc = Document::parse("<div></div>").unwrap();
        let flags = EnvFlags::new();
        let upgrader = Upgrader::with_env_flags(
            UpgradeTable::new().register::<Probe>(".js-test"),
            flags.clone(),
        );
        upgrader.run(&doc.body()).unwrap();
        assert!(flags.is_ready());
    }

    #[test]
    fn mount_failure_is_wrapped_and_aborts_the_rest_of_the_pass() {
        let doc = Document::parse(concat!(
            r#"<div class="js-ok"></div>"#,
            r#"<div class="js-broken"></div>"#,
            r#"<div class="js-late"></div>"#,
        ))
        .unwrap();
        let table = UpgradeTable::new()
            .register::<Marker>(".js-ok")
            .register::<Broken>(".js-broken")
            .register::<Marker>(".js-late");
        let upgrader = Upgrader::new(table);

        let err = upgrader.upgrade(&doc.body()).unwrap_err();
        let Error::Upgrade {
            controller, source, ..
        } = err
        else {
            panic!("expected an upgrade error");
        };
        assert!(controller.ends_with("Broken"));
        assert!(matches!(*source, Error::MissingRef(_)));

        // The earlier selector's element stays upgraded; the later selector
        // never ran.
        let children = doc.body().children();
        assert_eq!(children[0].attr("data-upgraded").as_deref(), Some("yes"));
        assert!(children[2].attr("data-upgraded").is_none());
    }

    #[test]
    fn reload_capability_swaps_upgrades_and_evicts() {
        let doc = Document::parse(concat!(
            r#"<div class="js-test"><span class="js-inner"></span></div>"#,
        ))
        .unwrap();
        let table = UpgradeTable::new()
            .register::<Probe>(".js-test")
            .register::<Marker>(".js-inner");
        let upgrader = Upgrader::new(table);
        upgrader.upgrade(&doc.body()).unwrap();

        let old_element = doc.body().children()[0].clone();
        let old_handle = upgrader.registry().attached(&old_element)[0].clone();
        let probe = old_handle.downcast::<Probe>().unwrap();

        let new_handle = probe
            .borrow_mut()
            .reload(r#"<div class="js-test is-updated"><b class="js-inner"></b></div>"#)
            .unwrap()
            .expect("replacement carries a Probe");

        // The swap happened and nested widgets in the replacement upgraded.
        let new_element = doc.body().children()[0].clone();
        assert!(new_element.has_class("is-updated"));
        assert_eq!(
            new_element.children()[0].attr("data-upgraded").as_deref(),
            Some("yes"),
        );
        assert_eq!(new_handle.element(), &new_element);

        // The old subtree is gone from dispatch.
        assert!(upgrader.registry().attached(&old_element).is_empty());
        assert!(upgrader.registry().get(old_handle.id()).is_none());
        assert!(old_element.parent().is_none());
    }

    #[test]
    fn reload_requires_exactly_one_top_level_element() {
        let doc = Document::parse(r#"<div class="js-test"></div>"#).unwrap();
        let upgrader = Upgrader::new(UpgradeTable::new().register::<Probe>(".js-test"));
        upgrader.upgrade(&doc.body()).unwrap();
        let probe = upgrader.registry().attached(&doc.body().children()[0])[0]
            .downcast::<Probe>()
            .unwrap();

        let err = probe
            .borrow_mut()
            .reload("<div></div><div></div>")
            .unwrap_err();
        assert!(matches!(err, Error::ReloadMarkup(2)));
        // Nothing was replaced.
        assert!(doc.body().children()[0].has_class("js-test"));
    }

    #[test]
    fn state_transfer_across_reload() {
        // A parent listening for `reload` can pick up the new controller and
        // seed it with state from the old one.
        let doc = Document::parse(r#"<div class="js-test"></div>"#).unwrap();
        let upgrader = Upgrader::new(UpgradeTable::new().register::<Probe>(".js-test"));
        upgrader.upgrade(&doc.body()).unwrap();
        let registry = upgrader.registry().clone();
        let probe = registry.attached(&doc.body().children()[0])[0]
            .downcast::<Probe>()
            .unwrap();
        probe
            .borrow_mut()
            .set_state(StateChanges::new().set("count", 3i64));

        let carried = probe.borrow().base().state().clone();
        let new_handle = probe.borrow_mut().reload("<div class=\"js-test\"></div>")
            .unwrap()
            .unwrap();
        let new_probe = new_handle.downcast::<Probe>().unwrap();
        assert!(new_probe.borrow().base().state().is_empty());
        new_probe
            .borrow_mut()
            .set_state(StateChanges::new().set("count", carried.get("count").cloned()));
        assert_eq!(new_probe.borrow().base().state().text("count"), "");
        assert_eq!(
            new_probe
                .borrow()
                .base()
                .state()
                .get("count")
                .and_then(|value| value.as_number()),
            Some(3.0),
        );
    }
}
