//! Reference resolution: named child elements exposed to a controller.
//!
//! Markup declares references with the `data-ref` attribute. Multiple
//! controllers may need to refer to the same element, so the attribute value
//! is a whitespace-separated list of names.

use indexmap::IndexMap;

use crate::dom::Element;

/// The reference-declaration attribute.
pub const REF_ATTRIBUTE: &str = "data-ref";

/// Map every `data-ref` name declared under `element` to its element.
///
/// Descendants are scanned in document order, so for duplicate names the last
/// declaration wins. The root element itself is not scanned.
pub fn find_refs(element: &Element) -> IndexMap<String, Element> {
    let mut refs = IndexMap::new();
    for descendant in element.descendants() {
        let Some(names) = descendant.attr(REF_ATTRIBUTE) else {
            continue;
        };
        for name in names.split_whitespace() {
            refs.insert(name.to_string(), descendant.clone());
        }
    }
    refs
}
