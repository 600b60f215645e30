//! Position-tracking scans over a [`TextRange`].
//!
//! These helpers skip over text the automaton never classifies: the rest of
//! a directive line, the inside of a block comment, a disabled conditional
//! region, or a macro argument. Each moves `text.first` and keeps `text.pos`
//! accurate across line breaks.

use crate::location::TextRange;

fn is_blank(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | 0x0b | 0x0c)
}

/// Move to the next unescaped `\n` without consuming it.
///
/// Backslash-newline pairs continue the line.
pub fn skip_till_newline(text: &mut TextRange) {
    let mut prev = 0u8;
    let mut prev2 = 0u8;
    while let Some(c) = text.peek() {
        if c == b'\n' {
            let continued = prev == b'\\' || (prev == b'\r' && prev2 == b'\\');
            if !continued {
                return;
            }
            text.bump_newline();
        } else {
            text.bump(1);
        }
        prev2 = prev;
        prev = c;
    }
}

/// Skip the body of a `/* ... */` comment whose opener was already consumed.
///
/// Returns `false` if the input ends before the terminator.
pub fn skip_comment_block(text: &mut TextRange) -> bool {
    let mut prev = 0u8;
    while let Some(c) = text.peek() {
        if c == b'\n' {
            text.bump_newline();
        } else {
            text.bump(1);
            if c == b'/' && prev == b'*' {
                return true;
            }
        }
        prev = c;
    }
    false
}

/// Skip a quoted literal starting at its opening quote; stops after the
/// closing quote or before an unescaped newline.
pub fn skip_quoted(text: &mut TextRange) {
    let Some(quote) = text.peek() else {
        return;
    };
    text.bump(1);
    while let Some(c) = text.peek() {
        match c {
            b'\n' => return,
            b'\\' => {
                text.bump(1);
                match text.peek() {
                    Some(b'\n') => text.bump_newline(),
                    Some(_) => text.bump(1),
                    None => return,
                }
            }
            _ => {
                text.bump(1);
                if c == quote {
                    return;
                }
            }
        }
    }
}

/// Skip blanks, line breaks and backslash continuations
pub fn skip_whitespaces(text: &mut TextRange) {
    while let Some(c) = text.peek() {
        match c {
            b'\n' => text.bump_newline(),
            b'\\' if text.peek_at(1) == Some(b'\n') => {
                text.bump(1);
                text.bump_newline();
            }
            _ if is_blank(c) => text.bump(1),
            _ => return,
        }
    }
}

/// Drop trailing blanks and line breaks
pub fn trim_trailing_whitespaces(text: &mut TextRange) {
    let trailing = text
        .as_bytes()
        .iter()
        .rev()
        .take_while(|&&c| is_blank(c) || c == b'\n')
        .count();
    let last = text.last() - trailing;
    text.set_last(last);
}

/// Skip whitespace and comments up to the first other character, where a
/// macro argument list is expected to start
pub fn find_macro_argument_list(text: &mut TextRange) {
    loop {
        skip_whitespaces(text);
        match (text.peek(), text.peek_at(1)) {
            (Some(b'/'), Some(b'/')) => skip_till_newline(text),
            (Some(b'/'), Some(b'*')) => {
                text.bump(2);
                if !skip_comment_block(text) {
                    return;
                }
            }
            _ => return,
        }
    }
}

/// Move to the next `,` or `)` that is not nested inside parentheses,
/// quotes or comments. Stops at the end of input if there is none.
pub fn find_macro_argument_separator(text: &mut TextRange) {
    let mut depth = 0usize;
    while let Some(c) = text.peek() {
        match (c, text.peek_at(1)) {
            (b',' | b')', _) if depth == 0 => return,
            (b'(', _) => {
                depth += 1;
                text.bump(1);
            }
            (b')', _) => {
                depth -= 1;
                text.bump(1);
            }
            (b'"' | b'\'', _) => skip_quoted(text),
            (b'/', Some(b'/')) => skip_till_newline(text),
            (b'/', Some(b'*')) => {
                text.bump(2);
                skip_comment_block(text);
            }
            (b'\n', _) => text.bump_newline(),
            _ => text.bump(1),
        }
    }
}

/// Skip disabled text up to and including the next `#` that starts a line.
///
/// Quoted literals and block comments are opaque, so a `#` inside them does
/// not count. Leaves the range empty if no directive follows.
pub fn skip_till_preproc_directive(text: &mut TextRange) {
    let mut at_line_start = true;
    while let Some(c) = text.peek() {
        match (c, text.peek_at(1)) {
            (b'\n', _) => {
                text.bump_newline();
                at_line_start = true;
                continue;
            }
            (b'#', _) if at_line_start => {
                text.bump(1);
                return;
            }
            _ if is_blank(c) => text.bump(1),
            (b'"' | b'\'', _) => {
                skip_quoted(text);
                at_line_start = false;
            }
            (b'/', Some(b'/')) => skip_till_newline(text),
            (b'/', Some(b'*')) => {
                text.bump(2);
                skip_comment_block(text);
                at_line_start = false;
            }
            _ => {
                text.bump(1);
                at_line_start = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::TextPosition;

    #[test]
    fn newline_scan_honours_continuations() {
        let mut text = TextRange::from_text("define A 1 \\\n + 2\nnext");
        skip_till_newline(&mut text);
        assert_eq!(text.as_str(), "\nnext");
        assert_eq!(text.pos, TextPosition::new(2, 5));
    }

    #[test]
    fn argument_separator_skips_nested_parts() {
        let mut text = TextRange::from_text("f(a, b), \"x,)\", /* , */ c)");
        find_macro_argument_separator(&mut text);
        assert_eq!(text.as_str(), ", \"x,)\", /* , */ c)");

        text.bump(1);
        find_macro_argument_separator(&mut text);
        assert_eq!(text.as_str(), ", /* , */ c)");

        text.bump(1);
        find_macro_argument_separator(&mut text);
        assert_eq!(text.as_str(), ")");
    }

    #[test]
    fn argument_list_search_skips_comments_and_lines() {
        let mut text = TextRange::from_text("  // note\n  /* more */ (1)");
        find_macro_argument_list(&mut text);
        assert_eq!(text.as_str(), "(1)");
        assert_eq!(text.pos, TextPosition::new(2, 14));
    }

    #[test]
    fn disabled_region_scan_stops_after_line_start_sharp() {
        let mut text = TextRange::from_text("a # b\n\"#x\"\n/*\n#*/\n  #endif\n");
        skip_till_preproc_directive(&mut text);
        assert_eq!(text.as_str(), "endif\n");
        assert_eq!(text.pos, TextPosition::new(5, 4));

        let mut text = TextRange::from_text("no directives here\n");
        skip_till_preproc_directive(&mut text);
        assert!(text.is_empty());
    }

    #[test]
    fn trim_and_skip_whitespace() {
        let mut text = TextRange::from_text("  \\\n x + 1 \t");
        skip_whitespaces(&mut text);
        trim_trailing_whitespaces(&mut text);
        assert_eq!(text.as_str(), "x + 1");
    }

    #[test]
    fn comment_block_needs_terminator() {
        let mut text = TextRange::from_text("/ still comment */ after");
        assert!(skip_comment_block(&mut text));
        assert_eq!(text.as_str(), " after");

        let mut text = TextRange::from_text(" open\n");
        assert!(!skip_comment_block(&mut text));
    }
}
