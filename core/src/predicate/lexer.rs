//! Tokenizer for predicate bodies

use super::SyntaxError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Regex { pattern: String, flags: String },
    Punct(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

/// Longest punctuators first so that `===` wins over `==` and `=`
const PUNCTUATORS: &[&str] = &[
    "===", "!==", "?.", "??", "==", "!=", "<=", ">=", "&&", "||", "=>", "(", ")", "[", "]", "{",
    "}", ".", ",", ";", "?", ":", "!", "<", ">", "+", "-", "*", "/", "%", "=",
];

/// Words after which a `/` starts a regex literal rather than a division
const REGEX_PREFIX_WORDS: &[&str] = &["return", "typeof", "else", "case"];

pub fn tokenize(source: &str) -> Result<Vec<Spanned>, SyntaxError> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut tokens: Vec<Spanned> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (offset, c) = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // Comments
        if c == '/' && peek(&chars, i + 1) == Some('/') {
            while i < chars.len() && chars[i].1 != '\n' {
                i += 1;
            }
            continue;
        }
        if c == '/' && peek(&chars, i + 1) == Some('*') {
            i += 2;
            loop {
                if i >= chars.len() {
                    return Err(SyntaxError::new("unterminated comment", offset));
                }
                if chars[i].1 == '*' && peek(&chars, i + 1) == Some('/') {
                    i += 2;
                    break;
                }
                i += 1;
            }
            continue;
        }

        if c == '/' && regex_allowed(tokens.last()) {
            let (token, next) = lex_regex(&chars, i)?;
            tokens.push(Spanned { token, offset });
            i = next;
            continue;
        }

        if c == '\'' || c == '"' || c == '`' {
            let (value, next) = lex_string(&chars, i)?;
            tokens.push(Spanned {
                token: Token::Str(value),
                offset,
            });
            i = next;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && peek(&chars, i + 1).is_some_and(|n| n.is_ascii_digit()))
        {
            let (value, next) = lex_number(&chars, i)?;
            tokens.push(Spanned {
                token: Token::Number(value),
                offset,
            });
            i = next;
            continue;
        }

        if is_ident_start(c) {
            let start = i;
            while i < chars.len() && is_ident_part(chars[i].1) {
                i += 1;
            }
            let name: String = chars[start..i].iter().map(|(_, ch)| *ch).collect();
            tokens.push(Spanned {
                token: Token::Ident(name),
                offset,
            });
            continue;
        }

        let rest = &source[offset..];
        let punct = PUNCTUATORS
            .iter()
            .find(|p| rest.starts_with(**p))
            .copied()
            // `a ?.5 : 1` is a conditional, not optional chaining
            .filter(|p| !(*p == "?." && peek(&chars, i + 2).is_some_and(|n| n.is_ascii_digit())));
        match punct {
            Some(p) => {
                tokens.push(Spanned {
                    token: Token::Punct(p),
                    offset,
                });
                i += p.chars().count();
            }
            None if rest.starts_with('?') => {
                tokens.push(Spanned {
                    token: Token::Punct("?"),
                    offset,
                });
                i += 1;
            }
            None => {
                return Err(SyntaxError::new(format!("unexpected character '{c}'"), offset));
            }
        }
    }

    Ok(tokens)
}

fn peek(chars: &[(usize, char)], i: usize) -> Option<char> {
    chars.get(i).map(|(_, c)| *c)
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn regex_allowed(previous: Option<&Spanned>) -> bool {
    match previous.map(|s| &s.token) {
        None => true,
        Some(Token::Number(_)) | Some(Token::Str(_)) | Some(Token::Regex { .. }) => false,
        Some(Token::Ident(name)) => REGEX_PREFIX_WORDS.contains(&name.as_str()),
        Some(Token::Punct(p)) => !matches!(*p, ")" | "]" | "}"),
    }
}

fn lex_regex(chars: &[(usize, char)], start: usize) -> Result<(Token, usize), SyntaxError> {
    let offset = chars[start].0;
    let mut i = start + 1;
    let mut pattern = String::new();
    let mut in_class = false;

    loop {
        let Some(c) = peek(chars, i) else {
            return Err(SyntaxError::new("unterminated regular expression", offset));
        };
        match c {
            '\n' => return Err(SyntaxError::new("unterminated regular expression", offset)),
            '\\' => {
                pattern.push(c);
                let Some(escaped) = peek(chars, i + 1) else {
                    return Err(SyntaxError::new("unterminated regular expression", offset));
                };
                pattern.push(escaped);
                i += 2;
                continue;
            }
            '[' => in_class = true,
            ']' => in_class = false,
            '/' if !in_class => {
                i += 1;
                break;
            }
            _ => {}
        }
        pattern.push(c);
        i += 1;
    }

    let mut flags = String::new();
    while let Some(c) = peek(chars, i) {
        if !c.is_ascii_alphabetic() {
            break;
        }
        flags.push(c);
        i += 1;
    }

    Ok((Token::Regex { pattern, flags }, i))
}

fn lex_string(chars: &[(usize, char)], start: usize) -> Result<(String, usize), SyntaxError> {
    let (offset, quote) = chars[start];
    let mut i = start + 1;
    let mut value = String::new();

    loop {
        let Some(c) = peek(chars, i) else {
            return Err(SyntaxError::new("unterminated string literal", offset));
        };
        i += 1;
        if c == quote {
            break;
        }
        if c == '\n' && quote != '`' {
            return Err(SyntaxError::new("unterminated string literal", offset));
        }
        if quote == '`' && c == '$' && peek(chars, i) == Some('{') {
            return Err(SyntaxError::new(
                "template literal substitutions are not supported",
                chars[i - 1].0,
            ));
        }
        if c != '\\' {
            value.push(c);
            continue;
        }

        let Some(escaped) = peek(chars, i) else {
            return Err(SyntaxError::new("unterminated string literal", offset));
        };
        i += 1;
        match escaped {
            'n' => value.push('\n'),
            't' => value.push('\t'),
            'r' => value.push('\r'),
            '0' => value.push('\0'),
            'b' => value.push('\u{8}'),
            'f' => value.push('\u{c}'),
            'v' => value.push('\u{b}'),
            'x' => {
                let code = hex_digits(chars, i, 2)
                    .ok_or_else(|| SyntaxError::new("invalid \\x escape", chars[i - 2].0))?;
                value.push(code);
                i += 2;
            }
            'u' => {
                let code = hex_digits(chars, i, 4)
                    .ok_or_else(|| SyntaxError::new("invalid \\u escape", chars[i - 2].0))?;
                value.push(code);
                i += 4;
            }
            '\n' => {}
            other => value.push(other),
        }
    }

    Ok((value, i))
}

fn hex_digits(chars: &[(usize, char)], start: usize, count: usize) -> Option<char> {
    let digits: String = chars.get(start..start + count)?.iter().map(|(_, c)| *c).collect();
    u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32)
}

fn lex_number(chars: &[(usize, char)], start: usize) -> Result<(f64, usize), SyntaxError> {
    let offset = chars[start].0;
    let mut i = start;

    if peek(chars, i) == Some('0') && matches!(peek(chars, i + 1), Some('x') | Some('X')) {
        i += 2;
        let digits_start = i;
        while peek(chars, i).is_some_and(|c| c.is_ascii_hexdigit()) {
            i += 1;
        }
        let digits: String = chars[digits_start..i].iter().map(|(_, c)| *c).collect();
        let value = u64::from_str_radix(&digits, 16)
            .map_err(|_| SyntaxError::new("invalid hexadecimal literal", offset))?;
        return Ok((value as f64, i));
    }

    while peek(chars, i).is_some_and(|c| c.is_ascii_digit()) {
        i += 1;
    }
    if peek(chars, i) == Some('.') {
        i += 1;
        while peek(chars, i).is_some_and(|c| c.is_ascii_digit()) {
            i += 1;
        }
    }
    if matches!(peek(chars, i), Some('e') | Some('E')) {
        let mut j = i + 1;
        if matches!(peek(chars, j), Some('+') | Some('-')) {
            j += 1;
        }
        if peek(chars, j).is_some_and(|c| c.is_ascii_digit()) {
            i = j;
            while peek(chars, i).is_some_and(|c| c.is_ascii_digit()) {
                i += 1;
            }
        }
    }
    if peek(chars, i).is_some_and(is_ident_start) {
        return Err(SyntaxError::new("identifier directly after number", offset));
    }

    let text: String = chars[start..i].iter().map(|(_, c)| *c).collect();
    let value = text
        .parse::<f64>()
        .map_err(|_| SyntaxError::new(format!("invalid number literal '{text}'"), offset))?;
    Ok((value, i))
}
