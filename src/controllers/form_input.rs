//! Controller for form input fields.
//!
//! Wraps one field and re-broadcasts its native events as namespaced
//! controller events (`form-input:focus`, `form-input:input`) so an
//! enclosing form can coordinate editing without direct references.

use indexmap::IndexMap;

use crate::controller::state::{State, Value};
use crate::controller::{Controller, ControllerBase};
use crate::dom::Element;
use crate::error::Result;
use crate::util::dom::set_element_state;

pub struct FormInputController {
    base: ControllerBase,
    input: Element,
    input_type: String,
}

impl FormInputController {
    /// Move focus to the wrapped field.
    pub fn focus_field(&self) {
        self.input.focus();
    }

    pub fn input_type(&self) -> &str {
        &self.input_type
    }

    fn input_event_data(&self) -> Value {
        Value::Object(IndexMap::from_iter([(
            "type".to_string(),
            Value::Text(self.input_type.clone()),
        )]))
    }
}

impl Controller for FormInputController {
    fn create(base: ControllerBase) -> Result<Self> {
        let input = base.require_ref("form-input")?;
        let input_type = input.attr("type").unwrap_or_default();
        let mut ctrl = Self {
            base,
            input: input.clone(),
            input_type,
        };

        ctrl.on("focus", move |ctrl, event| {
            let Some(this) = ctrl.as_any_mut().downcast_mut::<FormInputController>() else {
                return;
            };
            let on_input = event
                .target
                .as_ref()
                .is_some_and(|target| input.contains(target));
            if on_input {
                let _ = this.trigger("form-input:focus", None);
            }
        });

        ctrl.on("change", |ctrl, _event| {
            let Some(this) = ctrl.as_any_mut().downcast_mut::<FormInputController>() else {
                return;
            };
            let data = this.input_event_data();
            let _ = this.trigger("form-input:input", Some(data));
        });

        ctrl.on("input", |ctrl, _event| {
            let Some(this) = ctrl.as_any_mut().downcast_mut::<FormInputController>() else {
                return;
            };
            // Checkboxes and radios deliver both `input` and `change`;
            // emit on `change` only so listeners see one notification.
            if matches!(this.input_type.as_str(), "checkbox" | "radio") {
                return;
            }
            let data = this.input_event_data();
            let _ = this.trigger("form-input:input", Some(data));
        });

        Ok(ctrl)
    }

    fn base(&self) -> &ControllerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ControllerBase {
        &mut self.base
    }

    fn render(&mut self, state: &State, _previous: &State) {
        set_element_state(self.base.element(), &[("editing", state.flag("editing"))]);
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
