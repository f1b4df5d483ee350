//! Controller for expandable search result buckets.

use crate::controller::state::{State, StateChanges};
use crate::controller::{Controller, ControllerBase};
use crate::dom::Element;
use crate::env;
use crate::error::Result;
use crate::util::dom::set_element_state;

pub struct SearchBucketController {
    base: ControllerBase,
    header: Element,
    content: Element,
}

impl Controller for SearchBucketController {
    fn create(base: ControllerBase) -> Result<Self> {
        let header = base.require_ref("header")?;
        let content = base.require_ref("content")?;
        let mut ctrl = Self {
            base,
            header,
            content,
        };

        ctrl.on("click", |ctrl, event| {
            let Some(this) = ctrl.as_any_mut().downcast_mut::<SearchBucketController>() else {
                return;
            };
            let on_header = event
                .target
                .as_ref()
                .is_some_and(|target| this.header.contains(target));
            if !on_header {
                return;
            }
            let expanded = this.base.state().flag("expanded");
            this.set_state(StateChanges::new().set("expanded", !expanded));
        });

        // When the page scripts loaded late, the user may already have
        // scrolled past the collapsed bucket; start it expanded.
        let expanded = ctrl.base.env_flag(env::TIMEOUT_FLAG);
        ctrl.set_state(StateChanges::new().set("expanded", expanded));
        Ok(ctrl)
    }

    fn base(&self) -> &ControllerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ControllerBase {
        &mut self.base
    }

    fn render(&mut self, state: &State, _previous: &State) {
        let expanded = state.flag("expanded");
        set_element_state(&self.content, &[("hidden", !expanded)]);
        set_element_state(self.base.element(), &[("expanded", expanded)]);
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
