//! Doc-comment annotation collection.
//!
//! Comments of the form `-- @name type description` attach type
//! annotations to the line they appear on. Several `@` segments may share
//! one line (`-- @a number @b number @return number`). Comments starting
//! with `-->` declare the type of the expression on the same line.

use crate::token::Comment;
use rustc_hash::FxHashMap;

/// A single `@name value desc` segment from a doc comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// Target name. `return` for the return annotation, `@@` for the
    /// constructor marker, otherwise a parameter or field name.
    pub name: String,
    /// Type expression text, uninterpreted.
    pub value: String,
    /// Trailing free-form description, possibly empty.
    pub desc: String,
}

/// Per-line index over a chunk's comments.
#[derive(Debug, Default)]
pub struct CommentMap {
    annotations: FxHashMap<u32, Vec<Annotation>>,
    descriptions: FxHashMap<u32, String>,
    inline_types: FxHashMap<u32, String>,
}

impl CommentMap {
    /// Index the comments collected by the lexer.
    pub fn build(comments: &[Comment]) -> CommentMap {
        let mut map = CommentMap::default();
        for comment in comments {
            let line = comment.span.start_line;
            let text = comment.text.trim();

            if let Some(rest) = text.strip_prefix('>') {
                map.inline_types.insert(line, rest.trim().to_string());
                continue;
            }

            let (desc, annotations) = parse_segments(text);
            if !desc.is_empty() {
                map.descriptions.insert(line, desc);
            }
            if !annotations.is_empty() {
                map.annotations.entry(line).or_default().extend(annotations);
            }
        }
        map
    }

    /// Annotations attached to `line`.
    pub fn annotations(&self, line: u32) -> &[Annotation] {
        self.annotations.get(&line).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All annotations on lines `start..=end`, later lines overriding
    /// earlier ones with the same name.
    pub fn annotations_in(&self, start: u32, end: u32) -> FxHashMap<String, Annotation> {
        let mut out = FxHashMap::default();
        for line in start..=end {
            for ann in self.annotations(line) {
                out.insert(ann.name.clone(), ann.clone());
            }
        }
        out
    }

    /// Every annotated line, in no particular order.
    pub fn lines(&self) -> impl Iterator<Item = (u32, &[Annotation])> + '_ {
        self.annotations.iter().map(|(l, a)| (*l, a.as_slice()))
    }

    /// Free-form comment text on `line`, with annotation segments removed.
    pub fn description(&self, line: u32) -> Option<&str> {
        self.descriptions.get(&line).map(String::as_str)
    }

    /// The `--> type` marker on `line`, if any.
    pub fn inline_type(&self, line: u32) -> Option<&str> {
        self.inline_types.get(&line).map(String::as_str)
    }
}

/// Split a comment body into a leading description and `@` segments.
///
/// Tokens are whitespace-separated but brackets keep their content
/// together, so `{x: number, y?: string}` survives as one value. An `@`
/// token directly after a bare annotation name becomes its value, which
/// lets `@return @MyType` reference a named type.
fn parse_segments(text: &str) -> (String, Vec<Annotation>) {
    let mut desc_parts: Vec<&str> = Vec::new();
    let mut annotations: Vec<Annotation> = Vec::new();

    for token in BracketTokens::new(text) {
        if token.starts_with('@') {
            match annotations.last_mut() {
                Some(ann) if ann.value.is_empty() => ann.value = token.to_string(),
                _ => annotations.push(Annotation {
                    name: segment_name(token),
                    value: String::new(),
                    desc: String::new(),
                }),
            }
        } else {
            match annotations.last_mut() {
                None => desc_parts.push(token),
                Some(ann) if ann.value.is_empty() => ann.value = token.to_string(),
                Some(ann) => {
                    if !ann.desc.is_empty() {
                        ann.desc.push(' ');
                    }
                    ann.desc.push_str(token);
                }
            }
        }
    }

    (desc_parts.join(" "), annotations)
}

/// `@a` names the target `a`; `@@` keeps its own spelling so constructor
/// markers stay distinguishable from parameter names.
fn segment_name(token: &str) -> String {
    match token.as_bytes().get(1) {
        Some(b'@') => token.to_string(),
        _ => token[1..].to_string(),
    }
}

/// Whitespace tokenizer that treats bracketed runs as single tokens.
struct BracketTokens<'a> {
    rest: &'a str,
}

impl<'a> BracketTokens<'a> {
    fn new(text: &'a str) -> BracketTokens<'a> {
        BracketTokens { rest: text }
    }
}

impl<'a> Iterator for BracketTokens<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let start = self.rest.find(|c: char| !c.is_whitespace())?;
        let text = &self.rest[start..];

        let mut depth = 0i32;
        let mut end = text.len();
        for (i, c) in text.char_indices() {
            match c {
                '(' | '{' | '[' | '<' => depth += 1,
                ')' | '}' | ']' | '>' => depth -= 1,
                c if c.is_whitespace() && depth <= 0 => {
                    end = i;
                    break;
                }
                _ => {}
            }
        }

        self.rest = &text[end..];
        Some(&text[..end])
    }
}
