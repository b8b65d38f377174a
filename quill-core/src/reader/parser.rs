//! Located s-expression reader

use super::sexp::{Sexp, SexpKind};
use crate::error::{CompileError, CompileResult};
use crate::location::SourceLocation;

/// Reads every top-level form of one file
pub fn read_forms(file_path: &str, text: &str) -> CompileResult<Vec<Sexp>> {
    let mut reader = Reader::new(file_path, text);
    let mut forms = Vec::new();
    loop {
        reader.skip_trivia();
        match reader.peek() {
            None => break,
            Some(c @ (')' | ']' | '}')) => {
                return Err(CompileError::parse(
                    format!("unexpected closing '{}'", c),
                    reader.here(),
                    Some("remove it or add the matching opening delimiter"),
                ));
            }
            Some(_) => forms.push(reader.read_form()?),
        }
    }
    Ok(forms)
}

struct Reader<'a> {
    file_path: &'a str,
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

fn closing_for(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '[' | ']' | '{' | '}' | '"' | ';' | ',')
}

impl<'a> Reader<'a> {
    fn new(file_path: &'a str, text: &str) -> Self {
        Self {
            file_path,
            chars: text.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn here(&self) -> SourceLocation {
        SourceLocation::new(self.file_path, self.line, self.column)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Whitespace, commas and `;` comments
    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == ',' {
                self.advance();
            } else if c == ';' {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else {
                break;
            }
        }
    }

    fn read_form(&mut self) -> CompileResult<Sexp> {
        let start = self.here();
        match self.peek() {
            Some(open @ ('(' | '[' | '{')) => {
                self.advance();
                let items = self.read_seq(open, &start)?;
                let kind = match open {
                    '(' => SexpKind::List(items),
                    '[' => SexpKind::Vector(items),
                    _ => SexpKind::Map(items),
                };
                Ok(Sexp::located(kind, start))
            }
            Some('"') => self.read_string(),
            Some('\'') => {
                self.advance();
                self.skip_trivia();
                if self.peek().is_none() {
                    return Err(CompileError::parse(
                        "quote at end of input",
                        start,
                        Some("add a form after the quote"),
                    ));
                }
                let quoted = self.read_form()?;
                let head = Sexp::located(SexpKind::Symbol("quote".to_string()), start.clone());
                Ok(Sexp::located(SexpKind::List(vec![head, quoted]), start))
            }
            Some(_) => self.read_atom(),
            None => Err(CompileError::parse("unexpected end of input", start, None)),
        }
    }

    fn read_seq(&mut self, open: char, start: &SourceLocation) -> CompileResult<Vec<Sexp>> {
        let close = closing_for(open);
        let mut items = Vec::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                None => {
                    return Err(CompileError::parse(
                        format!("unclosed '{}'", open),
                        start.clone(),
                        Some(format!("add a closing '{}'", close).as_str()),
                    ));
                }
                Some(c) if c == close => {
                    self.advance();
                    return Ok(items);
                }
                Some(c @ (')' | ']' | '}')) => {
                    return Err(CompileError::parse(
                        format!("mismatched delimiter: expected '{}' but found '{}'", close, c),
                        self.here(),
                        Some(format!("the '{}' opened at {} needs a '{}'", open, start, close).as_str()),
                    ));
                }
                Some(_) => items.push(self.read_form()?),
            }
        }
    }

    fn read_string(&mut self) -> CompileResult<Sexp> {
        let start = self.here();
        let start_pos = self.pos;
        self.advance();
        let mut text = String::new();
        loop {
            match self.advance() {
                None => {
                    return Err(CompileError::parse(
                        "unterminated string literal",
                        start,
                        Some("add a closing '\"'"),
                    ));
                }
                Some('"') => break,
                Some('\\') => {
                    let escape_at = self.here();
                    match self.advance() {
                        Some('n') => text.push('\n'),
                        Some('t') => text.push('\t'),
                        Some('r') => text.push('\r'),
                        Some('0') => text.push('\0'),
                        Some('"') => text.push('"'),
                        Some('\\') => text.push('\\'),
                        Some(other) => {
                            return Err(CompileError::parse(
                                format!("unknown escape sequence '\\{}'", other),
                                escape_at,
                                Some("valid escapes are \\n \\t \\r \\0 \\\" \\\\"),
                            ));
                        }
                        None => {
                            return Err(CompileError::parse(
                                "unterminated string literal",
                                start,
                                Some("add a closing '\"'"),
                            ));
                        }
                    }
                }
                Some(c) => text.push(c),
            }
        }
        let length = self.pos - start_pos;
        Ok(Sexp::located(SexpKind::Str(text), start.with_length(length)))
    }

    fn read_atom(&mut self) -> CompileResult<Sexp> {
        let start = self.here();
        let mut token = String::new();
        while let Some(c) = self.peek() {
            if is_delimiter(c) {
                break;
            }
            token.push(c);
            self.advance();
        }
        let loc = start.with_length(token.chars().count());
        let kind = classify_atom(&token, &loc)?;
        Ok(Sexp::located(kind, loc))
    }
}

fn classify_atom(token: &str, loc: &SourceLocation) -> CompileResult<SexpKind> {
    match token {
        "true" => return Ok(SexpKind::Bool(true)),
        "false" => return Ok(SexpKind::Bool(false)),
        "nil" => return Ok(SexpKind::Nil),
        _ => {}
    }
    if let Some(name) = token.strip_prefix(':') {
        if name.is_empty() {
            return Err(CompileError::parse(
                "empty keyword",
                loc.clone(),
                Some("write a name after ':'"),
            ));
        }
        return Ok(SexpKind::Keyword(name.to_string()));
    }
    if looks_numeric(token) {
        if token.parse::<f64>().is_err() {
            return Err(CompileError::parse(
                format!("malformed number '{}'", token),
                loc.clone(),
                None,
            ));
        }
        return Ok(SexpKind::Number(token.to_string()));
    }
    Ok(SexpKind::Symbol(token.to_string()))
}

fn looks_numeric(token: &str) -> bool {
    let digits = token
        .strip_prefix('-')
        .or_else(|| token.strip_prefix('+'))
        .unwrap_or(token);
    digits.chars().next().is_some_and(|c| c.is_ascii_digit())
}
