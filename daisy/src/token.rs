use std::fmt;

/// Check if a byte can start an identifier (letter or underscore)
pub const fn is_identifier_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

/// Check if a byte can continue an identifier (letter, digit, or underscore)
pub const fn is_identifier_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

/// Reserved words of the language
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Keyword {
    /// `namespace`
    Namespace,
    /// `const`
    Const,
    /// `let`
    Let,
    /// `func`
    Func,
    /// `if`
    If,
    /// `else`
    Else,
    /// `loop`
    Loop,
    /// `while`
    While,
    /// `struct`
    Struct,
    /// `mut`
    Mut,
}

impl Keyword {
    const ALL: [Self; 10] = [
        Self::Namespace,
        Self::Const,
        Self::Let,
        Self::Func,
        Self::If,
        Self::Else,
        Self::Loop,
        Self::While,
        Self::Struct,
        Self::Mut,
    ];

    /// Look up a keyword by spelling
    #[must_use]
    pub fn from_ident(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kw| kw.as_str() == id)
    }

    /// The keyword's spelling
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Namespace => "namespace",
            Self::Const => "const",
            Self::Let => "let",
            Self::Func => "func",
            Self::If => "if",
            Self::Else => "else",
            Self::Loop => "loop",
            Self::While => "while",
            Self::Struct => "struct",
            Self::Mut => "mut",
        }
    }
}

/// Check if an identifier is a reserved word
#[must_use]
pub fn is_keyword(id: &str) -> bool {
    Keyword::from_ident(id).is_some()
}

/// Token types produced by the lexer and consumed by the parser driver
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// The whole compilation unit is consumed
    EndOfFile,
    /// A bounded sub-input (directive line, macro argument) is consumed
    EndOfInput,
    /// `true` or `false`
    BoolLiteral,
    /// Integer literal
    IntLiteral,
    /// Floating-point literal
    FloatLiteral,
    /// Double-quoted string
    StringLiteral,
    /// Single-quoted character literal
    CharLiteral,
    /// Identifier
    Id,
    /// `...`
    Ellipsis,
    /// `::`
    ScopeResolution,
    /// `##`
    Concatenate,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<=`
    Le,
    /// `>=`
    Ge,
    /// `&&`
    And,
    /// `||`
    Or,
    /// `+=`
    AddAssign,
    /// `-=`
    SubAssign,
    /// `*=`
    MulAssign,
    /// `/=`
    DivAssign,
    /// `%=`
    ModAssign,
    /// `&=`
    AndAssign,
    /// `|=`
    OrAssign,
    /// `^=`
    XorAssign,
    /// `<<=`
    ShlAssign,
    /// `>>=`
    ShrAssign,
    /// `->`
    Arrow,
    /// A reserved word
    Keyword(Keyword),
    /// Any other single character
    Char(u8),
}

impl TokenKind {
    /// The fixed spelling of operator tokens
    #[must_use]
    pub const fn operator_spelling(self) -> Option<&'static str> {
        Some(match self {
            Self::Ellipsis => "...",
            Self::ScopeResolution => "::",
            Self::Concatenate => "##",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::And => "&&",
            Self::Or => "||",
            Self::AddAssign => "+=",
            Self::SubAssign => "-=",
            Self::MulAssign => "*=",
            Self::DivAssign => "/=",
            Self::ModAssign => "%=",
            Self::AndAssign => "&=",
            Self::OrAssign => "|=",
            Self::XorAssign => "^=",
            Self::ShlAssign => "<<=",
            Self::ShrAssign => ">>=",
            Self::Arrow => "->",
            _ => return None,
        })
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(spelling) = self.operator_spelling() {
            return write!(f, "`{spelling}`");
        }
        match self {
            Self::EndOfFile => f.write_str("end of file"),
            Self::EndOfInput => f.write_str("end of input"),
            Self::BoolLiteral => f.write_str("boolean literal"),
            Self::IntLiteral => f.write_str("integer literal"),
            Self::FloatLiteral => f.write_str("float literal"),
            Self::StringLiteral => f.write_str("string literal"),
            Self::CharLiteral => f.write_str("character literal"),
            Self::Id => f.write_str("identifier"),
            Self::Keyword(kw) => write!(f, "`{}`", kw.as_str()),
            Self::Char(c) if c.is_ascii_graphic() => write!(f, "`{}`", char::from(*c)),
            Self::Char(c) => write!(f, "byte 0x{c:02x}"),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_round_trip_through_spelling() {
        assert_eq!(Keyword::from_ident("func"), Some(Keyword::Func));
        assert_eq!(Keyword::from_ident("function"), None);
        assert!(is_keyword("while"));
        assert!(!is_keyword("defined"));
    }

    #[test]
    fn token_kinds_describe_themselves() {
        assert_eq!(TokenKind::Shl.to_string(), "`<<`");
        assert_eq!(TokenKind::Char(b'(').to_string(), "`(`");
        assert_eq!(TokenKind::Keyword(Keyword::Let).to_string(), "`let`");
        assert_eq!(TokenKind::EndOfFile.to_string(), "end of file");
    }
}
