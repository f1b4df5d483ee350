//! A small CSS-like selector engine.
//!
//! Supports the subset the upgrade tables need: tag names, `#id`, `.class`,
//! `[attr]` / `[attr=value]`, `*`, and descendant chains (`form .js-input`).

use std::fmt;

use chumsky::prelude::*;

use super::Element;
use crate::dom::parser::render_rich_reports;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    source: String,
    compounds: Vec<Compound>,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrFilter>,
}

#[derive(Debug, Clone, PartialEq)]
enum AttrFilter {
    Present(String),
    Equals(String, String),
}

#[derive(Clone)]
enum Part<'src> {
    Universal,
    Tag(&'src str),
    Id(&'src str),
    Class(&'src str),
    Attr(&'src str, Option<&'src str>),
}

fn selector_parser<'src>()
-> impl Parser<'src, &'src str, Vec<Compound>, extra::Err<Rich<'src, char>>> {
    let ident = any()
        .filter(|character: &char| {
            character.is_ascii_alphanumeric() || matches!(character, '-' | '_')
        })
        .repeated()
        .at_least(1)
        .to_slice();

    let quoted = just('"')
        .ignore_then(none_of('"').repeated().to_slice())
        .then_ignore(just('"'));

    let class = just('.').ignore_then(ident.clone()).map(Part::Class);
    let id = just('#').ignore_then(ident.clone()).map(Part::Id);
    let attr = just('[')
        .ignore_then(ident.clone())
        .then(just('=').ignore_then(quoted.or(ident.clone())).or_not())
        .then_ignore(just(']'))
        .map(|(name, value)| Part::Attr(name, value));
    let universal = just('*').to(Part::Universal);
    let tag = ident.map(Part::Tag);

    let part = choice((class, id, attr, universal, tag));

    let compound = part
        .repeated()
        .at_least(1)
        .collect::<Vec<_>>()
        .map(|parts| {
            let mut compound = Compound::default();
            for part in parts {
                match part {
                    Part::Universal => {}
                    Part::Tag(name) => compound.tag = Some(name.to_ascii_lowercase()),
                    Part::Id(name) => compound.id = Some(name.to_string()),
                    Part::Class(name) => compound.classes.push(name.to_string()),
                    Part::Attr(name, value) => compound.attrs.push(match value {
                        Some(value) => {
                            AttrFilter::Equals(name.to_ascii_lowercase(), value.to_string())
                        }
                        None => AttrFilter::Present(name.to_ascii_lowercase()),
                    }),
                }
            }
            compound
        });

    compound
        .separated_by(text::inline_whitespace().at_least(1))
        .at_least(1)
        .collect()
        .padded()
        .then_ignore(end())
}

impl Selector {
    pub fn parse(source: &str) -> Result<Self> {
        let (compounds, errors) = selector_parser().parse(source).into_output_errors();
        if !errors.is_empty() {
            return Err(Error::SelectorParse {
                selector: source.to_string(),
                report: render_rich_reports("selector", source, &errors),
            });
        }
        Ok(Self {
            source: source.to_string(),
            compounds: compounds.unwrap_or_default(),
        })
    }

    /// True if `element` matches the selector. Non-final compounds match any
    /// ancestor, nearest first, in the usual right-to-left order.
    pub fn matches(&self, element: &Element) -> bool {
        let Some((last, rest)) = self.compounds.split_last() else {
            return false;
        };
        if !last.matches(element) {
            return false;
        }
        let mut remaining = rest.len();
        let mut cursor = element.parent();
        while remaining > 0 {
            let Some(ancestor) = cursor else {
                return false;
            };
            if rest[remaining - 1].matches(&ancestor) {
                remaining -= 1;
            }
            cursor = ancestor.parent();
        }
        true
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl Compound {
    fn matches(&self, element: &Element) -> bool {
        if let Some(tag) = &self.tag {
            if !element.tag().eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if element.attr("id").as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        if self.classes.iter().any(|class| !element.has_class(class)) {
            return false;
        }
        self.attrs.iter().all(|filter| match filter {
            AttrFilter::Present(name) => element.has_attr(name),
            AttrFilter::Equals(name, value) => element.attr(name).as_deref() == Some(value),
        })
    }
}
