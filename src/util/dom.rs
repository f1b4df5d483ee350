//! Small DOM helpers shared by widgets.

use crate::dom::Element;

/// Toggle `is-$name` marker classes on `element`.
///
/// Styling hooks follow the `is-` convention so widgets never collide with
/// layout classes.
pub fn set_element_state(element: &Element, states: &[(&str, bool)]) {
    for (name, on) in states {
        element.toggle_class(&format!("is-{name}"), *on);
    }
}
