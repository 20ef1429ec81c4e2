//! CSS subset understood by the simulated page.
//!
//! Supports type, `*`, `#id`, `.class`, attribute tests (`[a]`, `=`, `~=`,
//! `*=`, `^=`, `$=`), `:not(<compound>)`, `:contains(<text>)`, the
//! descendant and child combinators, and comma-separated groups.

use super::dom::SimDom;

#[derive(Debug, Clone, PartialEq)]
pub struct SelectorList(Vec<Complex>);

#[derive(Debug, Clone, PartialEq)]
struct Complex {
    parts: Vec<(Combinator, Compound)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrTest>,
    negations: Vec<Compound>,
    contains: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct AttrTest {
    name: String,
    op: AttrOp,
    value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals,
    Word,
    Contains,
    Prefix,
    Suffix,
}

impl SelectorList {
    pub fn parse(input: &str) -> Result<Self, String> {
        Parser::new(input).parse_list()
    }

    pub fn matches(&self, dom: &SimDom, node: usize) -> bool {
        self.0.iter().any(|complex| match_from(dom, node, &complex.parts))
    }
}

fn match_from(dom: &SimDom, node: usize, parts: &[(Combinator, Compound)]) -> bool {
    let Some(((combinator, compound), rest)) = parts.split_last() else {
        return false;
    };
    if !matches_compound(dom, node, compound) {
        return false;
    }
    if rest.is_empty() {
        return true;
    }
    match combinator {
        Combinator::Child => dom
            .parent_of(node)
            .map(|parent| match_from(dom, parent, rest))
            .unwrap_or(false),
        Combinator::Descendant => {
            let mut current = dom.parent_of(node);
            while let Some(ancestor) = current {
                if match_from(dom, ancestor, rest) {
                    return true;
                }
                current = dom.parent_of(ancestor);
            }
            false
        }
    }
}

fn matches_compound(dom: &SimDom, node: usize, compound: &Compound) -> bool {
    let Some(element) = dom.node(node) else {
        return false;
    };
    if let Some(tag) = &compound.tag {
        if !element.tag.eq_ignore_ascii_case(tag) {
            return false;
        }
    }
    if let Some(id) = &compound.id {
        if element.id.as_deref() != Some(id.as_str()) {
            return false;
        }
    }
    if !compound
        .classes
        .iter()
        .all(|class| element.classes.iter().any(|c| c == class))
    {
        return false;
    }
    for test in &compound.attrs {
        let actual = match test.name.as_str() {
            "id" => element.id.clone(),
            "class" => (!element.classes.is_empty()).then(|| element.classes.join(" ")),
            name => element.attributes.get(name).cloned(),
        };
        let Some(actual) = actual else {
            return false;
        };
        let ok = match test.op {
            AttrOp::Exists => true,
            AttrOp::Equals => actual == test.value,
            AttrOp::Word => actual.split_whitespace().any(|word| word == test.value),
            AttrOp::Contains => actual.contains(test.value.as_str()),
            AttrOp::Prefix => actual.starts_with(test.value.as_str()),
            AttrOp::Suffix => actual.ends_with(test.value.as_str()),
        };
        if !ok {
            return false;
        }
    }
    if compound
        .negations
        .iter()
        .any(|negated| matches_compound(dom, node, negated))
    {
        return false;
    }
    if !compound.contains.is_empty() {
        let text = dom.text_content(node);
        if !compound.contains.iter().all(|needle| text.contains(needle.as_str())) {
            return false;
        }
    }
    true
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        self.pos += 1;
        c
    }

    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn expect(&mut self, expected: char) -> Result<(), String> {
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            other => Err(format!("expected '{expected}' at {}, found {:?}", self.pos, other)),
        }
    }

    fn parse_list(&mut self) -> Result<SelectorList, String> {
        let mut list = Vec::new();
        loop {
            self.skip_ws();
            list.push(self.parse_complex()?);
            self.skip_ws();
            match self.peek() {
                None => break,
                Some(',') => {
                    self.pos += 1;
                }
                Some(other) => return Err(format!("unexpected '{other}' at {}", self.pos)),
            }
        }
        Ok(SelectorList(list))
    }

    fn parse_complex(&mut self) -> Result<Complex, String> {
        let mut parts = Vec::new();
        let mut combinator = Combinator::Descendant;
        loop {
            self.skip_ws();
            match self.peek() {
                None | Some(',') | Some(')') => break,
                Some('>') => {
                    if parts.is_empty() {
                        return Err("selector starts with '>'".to_string());
                    }
                    self.pos += 1;
                    combinator = Combinator::Child;
                    continue;
                }
                _ => {}
            }
            let compound = self.parse_compound()?;
            parts.push((combinator, compound));
            combinator = Combinator::Descendant;
        }
        if parts.is_empty() {
            return Err("empty selector".to_string());
        }
        Ok(Complex { parts })
    }

    fn parse_compound(&mut self) -> Result<Compound, String> {
        let mut compound = Compound::default();
        let start = self.pos;
        match self.peek() {
            Some('*') => {
                self.pos += 1;
            }
            Some(c) if is_ident_char(c) => {
                compound.tag = Some(self.ident()?);
            }
            _ => {}
        }
        loop {
            match self.peek() {
                Some('#') => {
                    self.pos += 1;
                    compound.id = Some(self.ident()?);
                }
                Some('.') => {
                    self.pos += 1;
                    compound.classes.push(self.ident()?);
                }
                Some('[') => {
                    self.pos += 1;
                    compound.attrs.push(self.attr_test()?);
                }
                Some(':') => {
                    self.pos += 1;
                    self.pseudo(&mut compound)?;
                }
                _ => break,
            }
        }
        if self.pos == start {
            return Err(format!("expected selector at {}", self.pos));
        }
        Ok(compound)
    }

    fn pseudo(&mut self, compound: &mut Compound) -> Result<(), String> {
        let name = self.ident()?;
        self.expect('(')?;
        self.skip_ws();
        match name.as_str() {
            "not" => {
                let negated = self.parse_compound()?;
                compound.negations.push(negated);
            }
            "contains" => {
                let text = self.value()?;
                compound.contains.push(text);
            }
            other => return Err(format!("unsupported pseudo-class ':{other}'")),
        }
        self.skip_ws();
        self.expect(')')
    }

    fn attr_test(&mut self) -> Result<AttrTest, String> {
        self.skip_ws();
        let name = self.ident()?;
        self.skip_ws();
        let op = match self.bump() {
            Some(']') => {
                return Ok(AttrTest {
                    name,
                    op: AttrOp::Exists,
                    value: String::new(),
                })
            }
            Some('=') => AttrOp::Equals,
            Some(prefix @ ('~' | '*' | '^' | '$')) => {
                self.expect('=')?;
                match prefix {
                    '~' => AttrOp::Word,
                    '*' => AttrOp::Contains,
                    '^' => AttrOp::Prefix,
                    _ => AttrOp::Suffix,
                }
            }
            other => return Err(format!("bad attribute operator {:?}", other)),
        };
        self.skip_ws();
        let value = self.value()?;
        self.skip_ws();
        self.expect(']')?;
        Ok(AttrTest { name, op, value })
    }

    fn value(&mut self) -> Result<String, String> {
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let mut out = String::new();
                loop {
                    match self.bump() {
                        Some(c) if c == quote => return Ok(out),
                        Some(c) => out.push(c),
                        None => return Err("unterminated string".to_string()),
                    }
                }
            }
            _ => {
                let mut out = String::new();
                while let Some(c) = self.peek() {
                    if c == ']' || c == ')' || c.is_whitespace() {
                        break;
                    }
                    out.push(c);
                    self.pos += 1;
                }
                Ok(out)
            }
        }
    }

    fn ident(&mut self) -> Result<String, String> {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if !is_ident_char(c) {
                break;
            }
            out.push(c);
            self.pos += 1;
        }
        if out.is_empty() {
            return Err(format!("expected identifier at {}", self.pos));
        }
        Ok(out)
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_site_table_selectors() {
        for selector in [
            "#ProductForm .btn_Booking",
            "a[href*=\"Book\"]",
            "button:contains(\"예매\")",
            ".seat:not(.sold):not(.disabled)",
            "[data-seat-status=\"available\"]",
            "iframe[src*='captcha']",
            "input[placeholder=\"문자 입력\"]",
            ".delivery-option, .radio-label",
            "ul > li.zone",
        ] {
            assert!(SelectorList::parse(selector).is_ok(), "{selector}");
        }
    }

    #[test]
    fn rejects_malformed_selectors() {
        for selector in ["", "> a", ".", "[data-x", ":hover(a)", "a,"] {
            assert!(SelectorList::parse(selector).is_err(), "{selector}");
        }
    }
}
