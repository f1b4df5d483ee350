//! Controller which adds inline editing to forms.
//!
//! The canonical form state lives in the server-rendered markup: saving and
//! canceling both swap the whole form subtree for fresh markup via `reload`,
//! so this controller tracks only the editing session: which field is being
//! edited, whether it has unsaved changes, and any submission error.

use crate::controller::refs::find_refs;
use crate::controller::state::{State, StateChanges, Value};
use crate::controller::{Controller, ControllerBase};
use crate::error::Result;
use crate::registry::{ControllerHandle, ControllerId};
use crate::util::dom::set_element_state;
use crate::util::submit::{SubmitError, SubmitForm};

pub struct FormController {
    base: ControllerBase,
}

impl FormController {
    /// Submit the form through `submitter` and replace it with the server's
    /// re-rendered markup.
    ///
    /// On success and on validation rejection the replacement markup is
    /// reloaded (the rejected form carries the validation messages); on a
    /// transport failure the error surfaces as inline state and the user's
    /// input is left untouched.
    pub fn submit(&mut self, submitter: &dyn SubmitForm) -> Result<Option<ControllerHandle>> {
        let original_form = self.base.state().text("original_form").to_string();
        self.set_state(StateChanges::new().set("saving", true));

        let form = self.base.element().clone();
        match submitter.submit(&form) {
            Ok(response) => self.reload(&response.form),
            Err(SubmitError::Validation { form, .. }) => {
                let document = self.base.element().document().clone();
                let active_id = document
                    .active_element()
                    .and_then(|element| element.attr("id"));

                // The returned form carries the validation error messages.
                let new_controller = self.reload(&form)?;

                // Resume editing the field where validation failed.
                let mut refocused = false;
                if let Some(id) = active_id {
                    if let Some(field) = document.element_by_id(&id) {
                        field.focus();
                        refocused = true;
                    }
                }

                if let Some(handle) = &new_controller {
                    if let Some(form_ctrl) = handle.downcast::<FormController>() {
                        form_ctrl.borrow_mut().set_state(
                            StateChanges::new()
                                // The restored field still holds unsaved input.
                                .set("dirty", refocused)
                                // Canceling must revert to the markup from
                                // before the rejected submission, not to the
                                // version with validation errors.
                                .set("original_form", original_form),
                        );
                    }
                }
                Ok(new_controller)
            }
            Err(SubmitError::Failed { reason, .. }) => {
                self.set_state(
                    StateChanges::new()
                        .set("submit_error", reason)
                        .set("saving", false),
                );
                Ok(None)
            }
        }
    }

    /// Stop editing and revert any unsaved changes.
    pub fn cancel(&mut self) -> Result<Option<ControllerHandle>> {
        let original = self.base.state().text("original_form").to_string();
        self.reload(&original)
    }

    fn focus_field(&self, field: ControllerId) {
        let Some(handle) = self.base.registry().get(field) else {
            return;
        };
        match find_refs(handle.element()).get("form-input") {
            Some(input) => input.focus(),
            None => handle.element().focus(),
        }
    }
}

impl Controller for FormController {
    fn create(base: ControllerBase) -> Result<Self> {
        let cancel = base.require_ref("cancel-btn")?;
        base.require_ref("form-actions")?;
        base.require_ref("form-submit-error")?;
        base.require_ref("form-submit-error-message")?;
        let mut ctrl = Self { base };

        // The cancel button only works with scripting available, so the
        // server renders it hidden.
        set_element_state(&cancel, &[("hidden", false)]);

        ctrl.on("click", move |ctrl, event| {
            let Some(this) = ctrl.as_any_mut().downcast_mut::<FormController>() else {
                return;
            };
            let on_cancel = event
                .target
                .as_ref()
                .is_some_and(|target| cancel.contains(target));
            if on_cancel {
                let _ = this.cancel();
            }
        });

        ctrl.on("form-input:focus", |ctrl, event| {
            let Some(this) = ctrl.as_any_mut().downcast_mut::<FormController>() else {
                return;
            };
            let Some(field) = event.controller else {
                return;
            };
            // A field with unsaved changes keeps the editing session until
            // it is saved or canceled.
            if this.base.state().flag("dirty") {
                if let Some(editing) = this.base.state().controller("editing_field") {
                    if editing != field {
                        this.focus_field(editing);
                        return;
                    }
                }
            }
            this.set_state(StateChanges::new().set("editing_field", field));
        });

        ctrl.on("form-input:input", |ctrl, _event| {
            let Some(this) = ctrl.as_any_mut().downcast_mut::<FormController>() else {
                return;
            };
            this.set_state(StateChanges::new().set("dirty", true));
        });

        ctrl.on("keydown", |ctrl, event| {
            let Some(this) = ctrl.as_any_mut().downcast_mut::<FormController>() else {
                return;
            };
            if event.data_field("key").and_then(Value::as_str) == Some("Escape") {
                let _ = this.cancel();
            }
        });

        let original = ctrl.base.element().outer_html();
        ctrl.set_state(
            StateChanges::new()
                .set("dirty", false)
                .set("editing_field", Value::Null)
                .set("original_form", original)
                .set("saving", false)
                .set("submit_error", ""),
        );
        Ok(ctrl)
    }

    fn base(&self) -> &ControllerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ControllerBase {
        &mut self.base
    }

    fn render(&mut self, state: &State, previous: &State) {
        let registry = self.base.registry().clone();
        let previous_field = previous.controller("editing_field");
        let field = state.controller("editing_field");

        if previous_field != field {
            if let Some(done) = previous_field.and_then(|id| registry.get(id)) {
                set_element_state(done.element(), &[("editing", false)]);
            }
        }
        if let Some(active) = field.and_then(|id| registry.get(id)) {
            // Surface the Save/Cancel controls directly below the field
            // being edited.
            if let Some(actions) = self.base.reference("form-actions") {
                let _ = active.element().insert_after(actions);
            }
            set_element_state(active.element(), &[("editing", true)]);
        }

        let editing = field.is_some();
        set_element_state(self.base.element(), &[("editing", editing)]);
        if let Some(actions) = self.base.reference("form-actions") {
            set_element_state(actions, &[("hidden", !editing), ("saving", state.flag("saving"))]);
        }

        let error = state.text("submit_error").to_string();
        if let Some(banner) = self.base.reference("form-submit-error") {
            set_element_state(banner, &[("visible", !error.is_empty())]);
        }
        if let Some(message) = self.base.reference("form-submit-error-message") {
            message.set_text(&error);
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
