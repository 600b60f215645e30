//! Longest-match token classification.
//!
//! A [`TokenAutomaton`] looks at a window of input bytes and reports which
//! pattern matches at the start and how long the lexeme is. The lexer owns
//! all side effects; the automaton only classifies. When the window was cut
//! short (`LexFlags::HAS_MORE`) and the lexeme may continue past it, the
//! automaton answers [`Scan::Starved`] so the caller can widen the window
//! and retry without consuming anything.

use crate::token::{is_identifier_continue, is_identifier_start, TokenKind};

bitflags::bitflags! {
    /// Bit set passed to [`TokenAutomaton::classify`]
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct LexFlags: u8 {
        /// The window starts at the beginning of a line
        const AT_BEGINNING_OF_LINE = 1 << 0;
        /// More input follows the window
        const HAS_MORE = 1 << 1;
    }
}

/// Lexical start condition
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StartCondition {
    /// Ordinary source text
    #[default]
    Initial,
    /// Inside a double-quoted string
    String,
    /// Inside a single-quoted character literal
    Char,
}

/// Start-condition stack together with the classification capacity.
///
/// The capacity bounds how many bytes the automaton is shown at once; it
/// only grows when a single lexeme needs more.
#[derive(Clone, Debug)]
pub struct LexStateStack {
    conditions: Vec<StartCondition>,
    capacity: usize,
}

impl Default for LexStateStack {
    fn default() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }
}

impl LexStateStack {
    /// Initial classification capacity
    pub const DEFAULT_CAPACITY: usize = 256;

    /// Create a stack in the initial condition with a given capacity
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            conditions: vec![StartCondition::Initial],
            capacity: capacity.max(1),
        }
    }

    /// The active start condition
    #[must_use]
    pub fn current(&self) -> StartCondition {
        self.conditions.last().copied().unwrap_or_default()
    }

    /// Replace the active start condition
    pub fn set_current(&mut self, condition: StartCondition) {
        match self.conditions.last_mut() {
            Some(top) => *top = condition,
            None => self.conditions.push(condition),
        }
    }

    /// Number of bytes the automaton may look at
    #[must_use]
    pub const fn avail(&self) -> usize {
        self.capacity
    }

    /// Grow the capacity by at least `additional` bytes
    pub fn reserve(&mut self, additional: usize) {
        self.capacity = (self.capacity * 2).max(self.capacity + additional);
    }

    /// Reset to the initial condition, keeping the capacity
    pub fn reset(&mut self) {
        self.conditions.clear();
        self.conditions.push(StartCondition::Initial);
    }
}

/// Lexical pattern recognized by the automaton
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pattern {
    /// `\a`
    EscapeA,
    /// `\b`
    EscapeB,
    /// `\f`
    EscapeF,
    /// `\r`
    EscapeR,
    /// `\n`
    EscapeN,
    /// `\t`
    EscapeT,
    /// `\v`
    EscapeV,
    /// `\\`, `\"`, `\'` or `\?`
    EscapeLiteral,
    /// Backslash followed by any other character
    EscapeOther,
    /// `\x` and up to two hex digits
    EscapeHex,
    /// Backslash and up to three octal digits
    EscapeOct,
    /// Run of ordinary characters inside quotes
    QuotedSeq,
    /// Backslash-newline inside quotes
    QuotedLineWrap,
    /// Raw newline inside quotes
    QuotedNewline,
    /// Closing quote
    QuoteClose,
    /// `"`
    StringOpen,
    /// `'`
    CharOpen,
    /// Multi-character operator
    Punct(TokenKind),
    /// Backslash-escaped punctuation outside quotes
    EscChar,
    /// `#` at the beginning of a line
    Sharp,
    /// `true`
    TrueLiteral,
    /// `false`
    FalseLiteral,
    /// `0b` binary integer
    BinLiteral,
    /// `0` octal integer
    OctLiteral,
    /// Decimal integer
    DecLiteral,
    /// `0x` hexadecimal integer
    HexLiteral,
    /// Floating-point number
    FloatLiteral,
    /// Identifier
    Id,
    /// `//`
    Comment1,
    /// `/*`
    Comment2,
    /// `\n`
    Newline,
    /// Backslash-newline outside quotes
    FakeNewline,
    /// Run of blanks
    Whitespace,
    /// Any other single character
    OtherChar,
}

/// Outcome of one classification step
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scan {
    /// A lexeme of `len` bytes matched `pattern`
    Match {
        /// The recognized pattern
        pattern: Pattern,
        /// Lexeme length in bytes
        len: usize,
    },
    /// The lexeme may continue past the window
    Starved,
    /// The window is empty
    Exhausted,
}

/// A token classifier
pub trait TokenAutomaton {
    /// Classify the lexeme at the start of `text`.
    ///
    /// Must not return [`Scan::Starved`] unless `flags` contains
    /// [`LexFlags::HAS_MORE`].
    fn classify(&self, text: &[u8], states: &mut LexStateStack, flags: LexFlags) -> Scan;
}

/// The built-in automaton for Daisy source text
#[derive(Clone, Copy, Debug, Default)]
pub struct DaisyAutomaton;

impl TokenAutomaton for DaisyAutomaton {
    fn classify(&self, text: &[u8], states: &mut LexStateStack, flags: LexFlags) -> Scan {
        if text.is_empty() {
            return Scan::Exhausted;
        }
        let (pattern, len) = match states.current() {
            StartCondition::Initial => {
                scan_initial(text, flags.contains(LexFlags::AT_BEGINNING_OF_LINE))
            }
            StartCondition::String => scan_quoted(text, b'"'),
            StartCondition::Char => scan_quoted(text, b'\''),
        };
        if len >= text.len() && flags.contains(LexFlags::HAS_MORE) {
            return Scan::Starved;
        }
        Scan::Match { pattern, len }
    }
}

fn is_blank(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | 0x0b | 0x0c)
}

fn count_while(text: &[u8], from: usize, pred: impl Fn(u8) -> bool) -> usize {
    text.get(from..)
        .map_or(0, |rest| rest.iter().take_while(|&&c| pred(c)).count())
}

fn utf8_len(lead: u8) -> usize {
    match lead {
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf7 => 4,
        _ => 1,
    }
}

fn scan_initial(text: &[u8], at_beginning_of_line: bool) -> (Pattern, usize) {
    let at = |i: usize| text.get(i).copied();
    let c = text[0];

    if is_blank(c) {
        let len = count_while(text, 0, is_blank);
        if at_beginning_of_line && at(len) == Some(b'#') {
            return (Pattern::Sharp, len + 1);
        }
        return (Pattern::Whitespace, len);
    }

    if c.is_ascii_digit() || (c == b'.' && at(1).is_some_and(|c| c.is_ascii_digit())) {
        return scan_number(text);
    }

    if is_identifier_start(c) {
        let len = 1 + count_while(text, 1, is_identifier_continue);
        return match &text[..len] {
            b"true" => (Pattern::TrueLiteral, len),
            b"false" => (Pattern::FalseLiteral, len),
            _ => (Pattern::Id, len),
        };
    }

    let punct = |kind: TokenKind, len: usize| (Pattern::Punct(kind), len);

    match (c, at(1), at(2)) {
        (b'\n', ..) => (Pattern::Newline, 1),
        (b'\\', Some(b'\n'), _) => (Pattern::FakeNewline, 2),
        (b'\\', Some(b'\r'), Some(b'\n')) => (Pattern::FakeNewline, 3),
        (b'\\', Some(n), _) if n.is_ascii_punctuation() => (Pattern::EscChar, 2),
        (b'#', ..) if at_beginning_of_line => (Pattern::Sharp, 1),
        (b'#', Some(b'#'), _) => punct(TokenKind::Concatenate, 2),
        (b'/', Some(b'/'), _) => (Pattern::Comment1, 2),
        (b'/', Some(b'*'), _) => (Pattern::Comment2, 2),
        (b'/', Some(b'='), _) => punct(TokenKind::DivAssign, 2),
        (b'"', ..) => (Pattern::StringOpen, 1),
        (b'\'', ..) => (Pattern::CharOpen, 1),
        (b'.', Some(b'.'), Some(b'.')) => punct(TokenKind::Ellipsis, 3),
        (b':', Some(b':'), _) => punct(TokenKind::ScopeResolution, 2),
        (b'<', Some(b'<'), Some(b'=')) => punct(TokenKind::ShlAssign, 3),
        (b'<', Some(b'<'), _) => punct(TokenKind::Shl, 2),
        (b'<', Some(b'='), _) => punct(TokenKind::Le, 2),
        (b'>', Some(b'>'), Some(b'=')) => punct(TokenKind::ShrAssign, 3),
        (b'>', Some(b'>'), _) => punct(TokenKind::Shr, 2),
        (b'>', Some(b'='), _) => punct(TokenKind::Ge, 2),
        (b'=', Some(b'='), _) => punct(TokenKind::Eq, 2),
        (b'!', Some(b'='), _) => punct(TokenKind::Ne, 2),
        (b'&', Some(b'&'), _) => punct(TokenKind::And, 2),
        (b'&', Some(b'='), _) => punct(TokenKind::AndAssign, 2),
        (b'|', Some(b'|'), _) => punct(TokenKind::Or, 2),
        (b'|', Some(b'='), _) => punct(TokenKind::OrAssign, 2),
        (b'+', Some(b'='), _) => punct(TokenKind::AddAssign, 2),
        (b'-', Some(b'='), _) => punct(TokenKind::SubAssign, 2),
        (b'-', Some(b'>'), _) => punct(TokenKind::Arrow, 2),
        (b'*', Some(b'='), _) => punct(TokenKind::MulAssign, 2),
        (b'%', Some(b'='), _) => punct(TokenKind::ModAssign, 2),
        (b'^', Some(b'='), _) => punct(TokenKind::XorAssign, 2),
        _ => (Pattern::OtherChar, utf8_len(c).min(text.len())),
    }
}

/// Length of an integer type suffix at `from`, if one is there
fn int_suffix_len(text: &[u8], from: usize) -> usize {
    let Some(&lead) = text.get(from) else {
        return 0;
    };
    if lead != b'i' && lead != b'u' {
        return 0;
    }
    for width in [&b"16"[..], &b"32"[..], &b"64"[..], &b"8"[..], &b""[..]] {
        let end = from + 1 + width.len();
        if text.get(from + 1..end) == Some(width)
            && !text.get(end).is_some_and(|&c| is_identifier_continue(c))
        {
            return 1 + width.len();
        }
    }
    0
}

/// Length of a float type suffix at `from`, if one is there
fn float_suffix_len(text: &[u8], from: usize) -> usize {
    for suffix in [&b"f32"[..], &b"f64"[..], &b"f"[..]] {
        let end = from + suffix.len();
        if text.get(from..end) == Some(suffix)
            && !text.get(end).is_some_and(|&c| is_identifier_continue(c))
        {
            return suffix.len();
        }
    }
    0
}

fn scan_number(text: &[u8]) -> (Pattern, usize) {
    let at = |i: usize| text.get(i).copied();

    if text[0] == b'0' {
        match at(1) {
            Some(b'b' | b'B') => {
                let digits = count_while(text, 2, |c| c == b'0' || c == b'1');
                if digits > 0 {
                    let len = 2 + digits;
                    return (Pattern::BinLiteral, len + int_suffix_len(text, len));
                }
            }
            Some(b'x' | b'X') => {
                let digits = count_while(text, 2, |c| c.is_ascii_hexdigit());
                if digits > 0 {
                    let len = 2 + digits;
                    return (Pattern::HexLiteral, len + int_suffix_len(text, len));
                }
            }
            _ => {}
        }
    }

    let int_len = count_while(text, 0, |c| c.is_ascii_digit());
    let mut len = int_len;
    let mut is_float = false;

    if at(len) == Some(b'.') && at(len + 1) != Some(b'.') {
        is_float = true;
        len += 1 + count_while(text, len + 1, |c| c.is_ascii_digit());
    }
    if matches!(at(len), Some(b'e' | b'E')) {
        let sign = usize::from(matches!(at(len + 1), Some(b'+' | b'-')));
        let exp_digits = count_while(text, len + 1 + sign, |c| c.is_ascii_digit());
        if exp_digits > 0 {
            is_float = true;
            len += 1 + sign + exp_digits;
        }
    }

    let float_suffix = float_suffix_len(text, len);
    if is_float || float_suffix > 0 {
        return (Pattern::FloatLiteral, len + float_suffix);
    }

    let pattern = if text[0] == b'0' && int_len > 1 && text[1..int_len].iter().all(|c| (b'0'..=b'7').contains(c)) {
        Pattern::OctLiteral
    } else {
        Pattern::DecLiteral
    };
    (pattern, len + int_suffix_len(text, len))
}

fn scan_quoted(text: &[u8], quote: u8) -> (Pattern, usize) {
    let c = text[0];
    if c == quote {
        return (Pattern::QuoteClose, 1);
    }
    match c {
        b'\n' => (Pattern::QuotedNewline, 1),
        b'\\' => scan_escape(text),
        _ => {
            let len = count_while(text, 0, |c| c != quote && c != b'\\' && c != b'\n');
            (Pattern::QuotedSeq, len)
        }
    }
}

fn scan_escape(text: &[u8]) -> (Pattern, usize) {
    let Some(&c) = text.get(1) else {
        return (Pattern::QuotedSeq, 1);
    };
    match c {
        b'a' => (Pattern::EscapeA, 2),
        b'b' => (Pattern::EscapeB, 2),
        b'f' => (Pattern::EscapeF, 2),
        b'r' => (Pattern::EscapeR, 2),
        b'n' => (Pattern::EscapeN, 2),
        b't' => (Pattern::EscapeT, 2),
        b'v' => (Pattern::EscapeV, 2),
        b'\\' | b'"' | b'\'' | b'?' => (Pattern::EscapeLiteral, 2),
        b'\n' => (Pattern::QuotedLineWrap, 2),
        b'x' => match count_while(text, 2, |c| c.is_ascii_hexdigit()).min(2) {
            0 => (Pattern::EscapeOther, 2),
            n => (Pattern::EscapeHex, 2 + n),
        },
        b'0'..=b'7' => {
            let n = count_while(text, 1, |c| (b'0'..=b'7').contains(&c)).min(3);
            (Pattern::EscapeOct, 1 + n)
        }
        _ => (Pattern::EscapeOther, (1 + utf8_len(c)).min(text.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(text: &str) -> (Pattern, usize) {
        let mut states = LexStateStack::default();
        match DaisyAutomaton.classify(text.as_bytes(), &mut states, LexFlags::empty()) {
            Scan::Match { pattern, len } => (pattern, len),
            other => panic!("unexpected scan result {other:?}"),
        }
    }

    #[test]
    fn operators_use_longest_match() {
        assert_eq!(classify("<<= 1"), (Pattern::Punct(TokenKind::ShlAssign), 3));
        assert_eq!(classify("<< 1"), (Pattern::Punct(TokenKind::Shl), 2));
        assert_eq!(classify("< 1"), (Pattern::OtherChar, 1));
        assert_eq!(classify("...x"), (Pattern::Punct(TokenKind::Ellipsis), 3));
        assert_eq!(classify("::x"), (Pattern::Punct(TokenKind::ScopeResolution), 2));
        assert_eq!(classify("## x"), (Pattern::Punct(TokenKind::Concatenate), 2));
    }

    #[test]
    fn numbers_are_classified_by_base_and_suffix() {
        assert_eq!(classify("0x1fu8;"), (Pattern::HexLiteral, 6));
        assert_eq!(classify("0b101 "), (Pattern::BinLiteral, 5));
        assert_eq!(classify("017)"), (Pattern::OctLiteral, 3));
        assert_eq!(classify("300u8+"), (Pattern::DecLiteral, 5));
        assert_eq!(classify("5i64;"), (Pattern::DecLiteral, 4));
        assert_eq!(classify("1.5e-3f;"), (Pattern::FloatLiteral, 7));
        assert_eq!(classify("2f32 "), (Pattern::FloatLiteral, 4));
        assert_eq!(classify("7items"), (Pattern::DecLiteral, 1));
    }

    #[test]
    fn identifiers_and_bool_literals() {
        assert_eq!(classify("true)"), (Pattern::TrueLiteral, 4));
        assert_eq!(classify("falsey"), (Pattern::Id, 6));
        assert_eq!(classify("_a1 b"), (Pattern::Id, 3));
    }

    #[test]
    fn sharp_only_at_beginning_of_line() {
        let mut states = LexStateStack::default();
        let bol = DaisyAutomaton.classify(b"  #define", &mut states, LexFlags::AT_BEGINNING_OF_LINE);
        assert_eq!(bol, Scan::Match { pattern: Pattern::Sharp, len: 3 });
        assert_eq!(classify("  #define"), (Pattern::Whitespace, 2));
        assert_eq!(classify("#x"), (Pattern::OtherChar, 1));
    }

    #[test]
    fn quoted_text_patterns() {
        let mut states = LexStateStack::default();
        states.set_current(StartCondition::String);
        let mut scan = |text: &str| DaisyAutomaton.classify(text.as_bytes(), &mut states, LexFlags::empty());
        assert_eq!(scan("abc\\n"), Scan::Match { pattern: Pattern::QuotedSeq, len: 3 });
        assert_eq!(scan("\\x41z"), Scan::Match { pattern: Pattern::EscapeHex, len: 4 });
        assert_eq!(scan("\\1234"), Scan::Match { pattern: Pattern::EscapeOct, len: 4 });
        assert_eq!(scan("\\q"), Scan::Match { pattern: Pattern::EscapeOther, len: 2 });
        assert_eq!(scan("'\""), Scan::Match { pattern: Pattern::QuotedSeq, len: 1 });
        assert_eq!(scan("\"x"), Scan::Match { pattern: Pattern::QuoteClose, len: 1 });
    }

    #[test]
    fn starves_when_lexeme_reaches_window_end() {
        let mut states = LexStateStack::with_capacity(4);
        let scan = DaisyAutomaton.classify(b"abcd", &mut states, LexFlags::HAS_MORE);
        assert_eq!(scan, Scan::Starved);
        let scan = DaisyAutomaton.classify(b"ab c", &mut states, LexFlags::HAS_MORE);
        assert_eq!(scan, Scan::Match { pattern: Pattern::Id, len: 2 });
        states.reserve(4);
        assert_eq!(states.avail(), 8);
    }
}
