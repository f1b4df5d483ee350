use std::fmt;

use chumsky::prelude::*;

pub type Span = SimpleSpan;
pub type LexError<'src> = Rich<'src, char, Span>;

#[derive(Debug, Clone)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

/// A flat markup token. Tree structure is recovered by the parser.
#[derive(Debug, Clone, PartialEq)]
pub enum Token<'src> {
    OpenTag {
        name: &'src str,
        attrs: Vec<(&'src str, Option<&'src str>)>,
        self_closing: bool,
    },
    CloseTag(&'src str),
    Text(&'src str),
    Comment(&'src str),
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::OpenTag { name, .. } => write!(f, "<{name}>"),
            Self::CloseTag(name) => write!(f, "</{name}>"),
            Self::Text(text) => write!(f, "{text}"),
            Self::Comment(comment) => write!(f, "<!--{comment}-->"),
        }
    }
}

pub fn lexer<'src>()
-> impl Parser<'src, &'src str, Vec<Spanned<Token<'src>>>, extra::Err<LexError<'src>>> {
    let name = any()
        .filter(|character: &char| {
            character.is_ascii_alphanumeric() || matches!(character, '-' | '_' | ':')
        })
        .repeated()
        .at_least(1)
        .to_slice();

    let double_quoted = just('"')
        .ignore_then(none_of('"').repeated().to_slice())
        .then_ignore(just('"'));
    let single_quoted = just('\'')
        .ignore_then(none_of('\'').repeated().to_slice())
        .then_ignore(just('\''));
    let unquoted = any()
        .filter(|character: &char| {
            !character.is_ascii_whitespace() && !matches!(character, '>' | '/' | '"' | '\'' | '=')
        })
        .repeated()
        .at_least(1)
        .to_slice();
    let value = choice((double_quoted, single_quoted, unquoted));

    // Attributes without `=` are boolean attributes (`<input disabled>`).
    let attribute = name.clone().then(
        just('=')
            .padded_by(text::inline_whitespace())
            .ignore_then(value)
            .or_not(),
    );

    let open_tag = just('<')
        .ignore_then(name.clone())
        .then(
            attribute
                .padded_by(text::whitespace())
                .repeated()
                .collect::<Vec<_>>(),
        )
        .then_ignore(text::whitespace())
        .then(choice((just("/>").to(true), just('>').to(false))))
        .map(|((name, attrs), self_closing)| Token::OpenTag {
            name,
            attrs,
            self_closing,
        });

    let close_tag = just("</")
        .ignore_then(name)
        .then_ignore(text::whitespace())
        .then_ignore(just('>'))
        .map(Token::CloseTag);

    let comment = just("<!--")
        .ignore_then(any().and_is(just("-->").not()).repeated().to_slice())
        .then_ignore(just("-->"))
        .map(Token::Comment);

    // Markup declarations (`<!DOCTYPE html>`) carry no tree content.
    let declaration = just("<!")
        .ignore_then(none_of('>').repeated().to_slice())
        .then_ignore(just('>'))
        .map(Token::Comment);

    let text = none_of('<').repeated().at_least(1).to_slice().map(Token::Text);

    let token = choice((comment, declaration, close_tag, open_tag, text));

    token
        .map_with(|token, extra| Spanned {
            node: token,
            span: extra.span(),
        })
        .repeated()
        .collect()
        .then_ignore(end())
}
