//! Line splitting: comments, labels, mnemonic and comma-separated operands.

use super::AsmErrorKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body<'a> {
    Instruction { mnemonic: &'a str, operands: Vec<&'a str> },
    Directive { name: &'a str, args: Vec<&'a str> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement<'a> {
    pub label: Option<&'a str>,
    pub body: Option<Body<'a>>,
}

pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '.' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Text before the first `;` that is not inside a string or char literal.
fn strip_comment(line: &str) -> &str {
    let mut quote = None;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                ';' => return &line[..i],
                '"' | '\'' => quote = Some(c),
                _ => {}
            },
        }
    }
    line
}

/// Split on commas outside quotes and brackets.
fn split_operands(text: &str) -> Result<Vec<&str>, AsmErrorKind> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    let mut quote = None;
    let mut escaped = false;
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '[' => depth += 1,
            ']' => depth -= 1,
            ',' if depth == 0 => {
                out.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    if quote.is_some() {
        return Err(AsmErrorKind::MalformedOperand(format!("unterminated literal in `{text}`")));
    }
    if depth != 0 {
        return Err(AsmErrorKind::MalformedOperand(format!("unbalanced brackets in `{text}`")));
    }
    out.push(text[start..].trim());
    if let Some(empty) = out.iter().position(|s| s.is_empty()) {
        return Err(AsmErrorKind::MalformedOperand(format!("operand {} is empty", empty + 1)));
    }
    Ok(out)
}

pub fn parse_line(line: &str) -> Result<Statement<'_>, AsmErrorKind> {
    let mut rest = strip_comment(line).trim();
    let mut label = None;

    if let Some(colon) = rest.find(':') {
        let name = rest[..colon].trim_end();
        if is_identifier(name) {
            label = Some(name);
            rest = rest[colon + 1..].trim_start();
        }
    }

    if rest.is_empty() {
        return Ok(Statement { label, body: None });
    }

    let (head, tail) = match rest.find(char::is_whitespace) {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, ""),
    };
    let args = split_operands(tail)?;
    let body = if head.starts_with('.') {
        Body::Directive { name: head, args }
    } else {
        Body::Instruction { mnemonic: head, operands: args }
    };
    Ok(Statement { label, body: Some(body) })
}
