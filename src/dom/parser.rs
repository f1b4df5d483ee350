//! Markup parsing: lexed tokens are folded into a tree of [`HtmlNode`]s.
//!
//! Parse failures are rendered into human-readable reports so upgrade
//! failures caused by broken server markup are diagnosable from the log.

use ariadne::{Config, Label, Report, ReportKind, Source};
use chumsky::prelude::*;

use super::lexer::{Span, Spanned, Token, lexer};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum HtmlNode {
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
        children: Vec<HtmlNode>,
    },
    Text(String),
}

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

pub(crate) fn is_void(tag: &str) -> bool {
    VOID_TAGS.contains(&tag)
}

/// Parse a markup fragment into a forest of nodes.
pub(crate) fn parse_nodes(src: &str) -> Result<Vec<HtmlNode>> {
    let (tokens, errors) = lexer().parse(src).into_output_errors();
    if !errors.is_empty() {
        return Err(Error::MarkupParse {
            report: render_rich_reports("markup", src, &errors),
        });
    }
    build_tree(src, tokens.unwrap_or_default())
}

struct Frame {
    tag: String,
    attrs: Vec<(String, String)>,
    children: Vec<HtmlNode>,
    open_span: Span,
}

fn build_tree(src: &str, tokens: Vec<Spanned<Token<'_>>>) -> Result<Vec<HtmlNode>> {
    let mut stack: Vec<Frame> = Vec::new();
    let mut roots: Vec<HtmlNode> = Vec::new();

    fn emit(stack: &mut [Frame], roots: &mut Vec<HtmlNode>, node: HtmlNode) {
        if let Some(frame) = stack.last_mut() {
            frame.children.push(node);
        } else {
            roots.push(node);
        }
    }

    for Spanned { node: token, span } in tokens {
        match token {
            Token::Text(text) => {
                emit(&mut stack, &mut roots, HtmlNode::Text(decode_entities(text)));
            }
            Token::Comment(_) => {}
            Token::OpenTag {
                name,
                attrs,
                self_closing,
            } => {
                let tag = name.to_ascii_lowercase();
                let attrs = attrs
                    .into_iter()
                    .map(|(name, value)| {
                        (
                            name.to_ascii_lowercase(),
                            decode_entities(value.unwrap_or("")),
                        )
                    })
                    .collect();
                if self_closing || is_void(&tag) {
                    emit(
                        &mut stack,
                        &mut roots,
                        HtmlNode::Element {
                            tag,
                            attrs,
                            children: Vec::new(),
                        },
                    );
                } else {
                    stack.push(Frame {
                        tag,
                        attrs,
                        children: Vec::new(),
                        open_span: span,
                    });
                }
            }
            Token::CloseTag(name) => {
                let closed = name.to_ascii_lowercase();
                let Some(frame) = stack.pop() else {
                    return Err(report_at(
                        src,
                        span,
                        format!("unexpected closing tag `</{closed}>`"),
                    ));
                };
                if frame.tag != closed {
                    return Err(report_at(
                        src,
                        span,
                        format!("expected `</{}>`, found `</{closed}>`", frame.tag),
                    ));
                }
                emit(
                    &mut stack,
                    &mut roots,
                    HtmlNode::Element {
                        tag: frame.tag,
                        attrs: frame.attrs,
                        children: frame.children,
                    },
                );
            }
        }
    }

    if let Some(frame) = stack.last() {
        return Err(report_at(
            src,
            frame.open_span,
            format!("unclosed tag `<{}>`", frame.tag),
        ));
    }

    Ok(roots)
}

fn report_at(src: &str, span: Span, message: String) -> Error {
    let mut buffer = Vec::new();
    Report::build(ReportKind::Error, ("markup", span.into_range()))
        .with_config(Config::default().with_color(false))
        .with_message(&message)
        .with_label(Label::new(("markup", span.into_range())).with_message(&message))
        .finish()
        .write(("markup", Source::from(src)), &mut buffer)
        .ok();
    Error::MarkupParse {
        report: String::from_utf8_lossy(&buffer).into_owned(),
    }
}

/// Render chumsky errors the way the rest of the crate reports them.
pub(crate) fn render_rich_reports(id: &'static str, src: &str, errors: &[Rich<'_, char>]) -> String {
    let mut buffer = Vec::new();
    for error in errors {
        Report::build(ReportKind::Error, (id, error.span().into_range()))
            .with_config(Config::default().with_color(false))
            .with_message(error.to_string())
            .with_label(
                Label::new((id, error.span().into_range()))
                    .with_message(error.reason().to_string()),
            )
            .finish()
            .write((id, Source::from(src)), &mut buffer)
            .ok();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

pub(crate) fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut decoded = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(position) = rest.find('&') {
        decoded.push_str(&rest[..position]);
        rest = &rest[position..];
        match rest[1..].find(';') {
            // Entities are short; anything longer is treated as literal text.
            Some(end) if end <= 8 => {
                let entity = &rest[1..=end];
                match decode_entity(entity) {
                    Some(character) => {
                        decoded.push(character);
                        rest = &rest[end + 2..];
                    }
                    None => {
                        decoded.push('&');
                        rest = &rest[1..];
                    }
                }
            }
            _ => {
                decoded.push('&');
                rest = &rest[1..];
            }
        }
    }
    decoded.push_str(rest);
    decoded
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = entity.strip_prefix('#')?;
            let code = match code.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

pub(crate) fn encode_text(text: &str, out: &mut String) {
    for character in text.chars() {
        match character {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
}

pub(crate) fn encode_attr(value: &str, out: &mut String) {
    for character in value.chars() {
        match character {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
}
