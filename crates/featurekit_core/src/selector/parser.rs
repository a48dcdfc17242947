//! CSS selector parser.
//!
//! Grammar covered: selector lists, the four combinators, type/universal,
//! id, class, attribute selectors with the six value operators and the `i`
//! flag, and the structural pseudo-classes plus `:not(...)`.

use crate::selector::error::{SelectorErrorKind, SelectorSyntaxError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Combinator {
    Descendant,
    Child,
    NextSibling,
    SubsequentSibling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AttributeOperator {
    Equals,
    Includes,
    DashMatch,
    Prefix,
    Suffix,
    Substring,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AttributeSelector {
    pub name: String,
    pub value: Option<(AttributeOperator, String)>,
    pub case_insensitive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PseudoClass {
    FirstChild,
    LastChild,
    OnlyChild,
    Empty,
    Not(Vec<ComplexSelector>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SimpleSelector {
    Id(String),
    Class(String),
    Attribute(AttributeSelector),
    Pseudo(PseudoClass),
}

/// Type selector plus zero or more simple selectors; `tag == None` is `*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CompoundSelector {
    pub tag: Option<String>,
    pub simple: Vec<SimpleSelector>,
}

/// One alternative of a selector list, stored right to left: `subject` is
/// the compound the matched element must satisfy, `ancestors[i]` is reached
/// from the previous compound through its combinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ComplexSelector {
    pub subject: CompoundSelector,
    pub ancestors: Vec<(Combinator, CompoundSelector)>,
}

pub(crate) fn parse_selector_list(source: &str) -> Result<Vec<ComplexSelector>, SelectorSyntaxError> {
    let mut parser = Parser::new(source);
    parser.skip_whitespace();
    if parser.peek().is_none() {
        return Err(parser.error(SelectorErrorKind::Empty));
    }
    let list = parser.parse_list(false)?;
    Ok(list)
}

struct Parser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, kind: SelectorErrorKind) -> SelectorSyntaxError {
        SelectorSyntaxError::new(self.source, self.pos, kind)
    }

    fn unexpected(&self) -> SelectorSyntaxError {
        match self.peek() {
            Some(c) => self.error(SelectorErrorKind::UnexpectedChar(c)),
            None => self.error(SelectorErrorKind::UnexpectedEnd),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn expect(&mut self, expected: char) -> Result<(), SelectorSyntaxError> {
        if self.eat(expected) {
            return Ok(());
        }
        Err(self.unexpected())
    }

    /// Returns whether any whitespace was consumed.
    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn parse_list(&mut self, nested: bool) -> Result<Vec<ComplexSelector>, SelectorSyntaxError> {
        let mut list = Vec::new();
        loop {
            self.skip_whitespace();
            list.push(self.parse_complex()?);
            self.skip_whitespace();
            match self.peek() {
                Some(',') => {
                    self.pos += 1;
                }
                Some(')') if nested => return Ok(list),
                None if !nested => return Ok(list),
                _ => return Err(self.unexpected()),
            }
        }
    }

    fn parse_complex(&mut self) -> Result<ComplexSelector, SelectorSyntaxError> {
        let mut compounds = vec![self.parse_compound()?];
        let mut combinators = Vec::new();
        loop {
            let had_whitespace = self.skip_whitespace();
            let combinator = match self.peek() {
                Some('>') => Combinator::Child,
                Some('+') => Combinator::NextSibling,
                Some('~') => Combinator::SubsequentSibling,
                Some(',') | Some(')') | None => break,
                Some(_) if had_whitespace => Combinator::Descendant,
                Some(_) => return Err(self.unexpected()),
            };
            if combinator != Combinator::Descendant {
                self.pos += 1;
                self.skip_whitespace();
            }
            combinators.push(combinator);
            compounds.push(self.parse_compound()?);
        }

        let mut compounds = compounds.into_iter().rev();
        let subject = compounds
            .next()
            .ok_or_else(|| self.error(SelectorErrorKind::ExpectedSelector))?;
        let ancestors = combinators.into_iter().rev().zip(compounds).collect();
        Ok(ComplexSelector { subject, ancestors })
    }

    fn parse_compound(&mut self) -> Result<CompoundSelector, SelectorSyntaxError> {
        let start = self.pos;
        let tag = if self.eat('*') {
            None
        } else if self.at_identifier_start() {
            Some(self.parse_identifier()?.to_ascii_lowercase())
        } else {
            None
        };

        let mut simple = Vec::new();
        loop {
            match self.peek() {
                Some('#') => {
                    self.pos += 1;
                    simple.push(SimpleSelector::Id(self.parse_identifier()?));
                }
                Some('.') => {
                    self.pos += 1;
                    simple.push(SimpleSelector::Class(self.parse_identifier()?));
                }
                Some('[') => {
                    self.pos += 1;
                    simple.push(SimpleSelector::Attribute(self.parse_attribute()?));
                }
                Some(':') => {
                    self.pos += 1;
                    simple.push(SimpleSelector::Pseudo(self.parse_pseudo()?));
                }
                _ => break,
            }
        }

        if self.pos == start {
            return Err(match self.peek() {
                None => self.error(SelectorErrorKind::UnexpectedEnd),
                Some(_) => self.error(SelectorErrorKind::ExpectedSelector),
            });
        }
        Ok(CompoundSelector { tag, simple })
    }

    fn at_identifier_start(&self) -> bool {
        match self.peek() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '\\' || !c.is_ascii() => true,
            Some('-') => self
                .peek_at(1)
                .is_some_and(|next| !next.is_ascii_digit() && (is_name_char(next) || next == '\\')),
            _ => false,
        }
    }

    fn parse_identifier(&mut self) -> Result<String, SelectorSyntaxError> {
        if !self.at_identifier_start() {
            return Err(self.error(SelectorErrorKind::ExpectedIdentifier));
        }
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c == '\\' {
                self.pos += 1;
                match self.bump() {
                    Some(escaped) => out.push(escaped),
                    None => return Err(self.error(SelectorErrorKind::UnexpectedEnd)),
                }
            } else if is_name_char(c) {
                out.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(out)
    }

    fn parse_attribute(&mut self) -> Result<AttributeSelector, SelectorSyntaxError> {
        self.skip_whitespace();
        let name = self.parse_identifier()?.to_ascii_lowercase();
        self.skip_whitespace();
        if self.eat(']') {
            return Ok(AttributeSelector {
                name,
                value: None,
                case_insensitive: false,
            });
        }

        let operator = match (self.peek(), self.peek_at(1)) {
            (Some('='), _) => {
                self.pos += 1;
                AttributeOperator::Equals
            }
            (Some(prefix), Some('=')) => {
                let operator = match prefix {
                    '~' => AttributeOperator::Includes,
                    '|' => AttributeOperator::DashMatch,
                    '^' => AttributeOperator::Prefix,
                    '$' => AttributeOperator::Suffix,
                    '*' => AttributeOperator::Substring,
                    _ => return Err(self.unexpected()),
                };
                self.pos += 2;
                operator
            }
            _ => return Err(self.unexpected()),
        };

        self.skip_whitespace();
        let value = match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                self.parse_string(quote)?
            }
            _ => self.parse_identifier()?,
        };
        self.skip_whitespace();
        let case_insensitive = match self.peek() {
            Some('i' | 'I') => {
                self.pos += 1;
                true
            }
            Some('s' | 'S') => {
                self.pos += 1;
                false
            }
            _ => false,
        };
        self.skip_whitespace();
        self.expect(']')?;
        Ok(AttributeSelector {
            name,
            value: Some((operator, value)),
            case_insensitive,
        })
    }

    fn parse_string(&mut self, quote: char) -> Result<String, SelectorSyntaxError> {
        let start = self.pos;
        let mut out = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(out),
                Some('\\') => match self.bump() {
                    Some(escaped) => out.push(escaped),
                    None => break,
                },
                Some(c) => out.push(c),
                None => break,
            }
        }
        Err(SelectorSyntaxError::new(
            self.source,
            start,
            SelectorErrorKind::UnterminatedString,
        ))
    }

    fn parse_pseudo(&mut self) -> Result<PseudoClass, SelectorSyntaxError> {
        let start = self.pos;
        if self.peek() == Some(':') {
            return Err(self.error(SelectorErrorKind::UnsupportedPseudoClass(":".to_string())));
        }
        let name = self.parse_identifier()?.to_ascii_lowercase();
        match name.as_str() {
            "first-child" => Ok(PseudoClass::FirstChild),
            "last-child" => Ok(PseudoClass::LastChild),
            "only-child" => Ok(PseudoClass::OnlyChild),
            "empty" => Ok(PseudoClass::Empty),
            "not" => {
                self.expect('(')?;
                let inner = self.parse_list(true)?;
                self.expect(')')?;
                Ok(PseudoClass::Not(inner))
            }
            _ => Err(SelectorSyntaxError::new(
                self.source,
                start,
                SelectorErrorKind::UnsupportedPseudoClass(name),
            )),
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()
}

#[cfg(test)]
mod tests {
    use super::{
        parse_selector_list, AttributeOperator, Combinator, PseudoClass, SimpleSelector,
    };
    use crate::selector::error::SelectorErrorKind;

    #[test]
    fn parses_compound_with_attribute_prefix() {
        let list = parse_selector_list(r#".js-file-header-dropdown a[aria-label^="Change this"]"#)
            .expect("selector should parse");

        assert_eq!(list.len(), 1);
        let complex = &list[0];
        assert_eq!(complex.subject.tag.as_deref(), Some("a"));
        let SimpleSelector::Attribute(attribute) = &complex.subject.simple[0] else {
            panic!("expected attribute selector");
        };
        assert_eq!(attribute.name, "aria-label");
        assert_eq!(
            attribute.value,
            Some((AttributeOperator::Prefix, "Change this".to_string()))
        );
        assert_eq!(complex.ancestors.len(), 1);
        assert_eq!(complex.ancestors[0].0, Combinator::Descendant);
    }

    #[test]
    fn parses_lists_and_explicit_combinators() {
        let list = parse_selector_list("ul > li + li, nav ~ main").expect("list should parse");

        assert_eq!(list.len(), 2);
        let combinators: Vec<Combinator> = list[0].ancestors.iter().map(|(c, _)| *c).collect();
        assert_eq!(combinators, vec![Combinator::NextSibling, Combinator::Child]);
        assert_eq!(list[1].ancestors[0].0, Combinator::SubsequentSibling);
    }

    #[test]
    fn parses_not_with_nested_list() {
        let list = parse_selector_list("li:not(.hidden, [aria-hidden])").expect("should parse");

        let SimpleSelector::Pseudo(PseudoClass::Not(inner)) = &list[0].subject.simple[0] else {
            panic!("expected :not");
        };
        assert_eq!(inner.len(), 2);
    }

    #[test]
    fn rejects_malformed_input_with_position() {
        let cases = [
            ("", SelectorErrorKind::Empty),
            ("   ", SelectorErrorKind::Empty),
            ("div,", SelectorErrorKind::UnexpectedEnd),
            ("> a", SelectorErrorKind::ExpectedSelector),
            ("a[href", SelectorErrorKind::UnexpectedEnd),
            ("a[title=\"x]", SelectorErrorKind::UnterminatedString),
            ("a:hover", SelectorErrorKind::UnsupportedPseudoClass("hover".to_string())),
            ("a::before", SelectorErrorKind::UnsupportedPseudoClass(":".to_string())),
            (".", SelectorErrorKind::ExpectedIdentifier),
        ];
        for (input, expected) in cases {
            let err = parse_selector_list(input).expect_err("malformed selector must fail");
            assert_eq!(err.kind, expected, "input: {input:?}");
        }
    }

    #[test]
    fn error_reports_character_offset() {
        let err = parse_selector_list("div ] span").expect_err("stray bracket");
        assert_eq!(err.position, 4);
        assert_eq!(err.kind, SelectorErrorKind::ExpectedSelector);
    }
}
