//! Shift/reduce decisions for the parser driver.
//!
//! A [`ParseOracle`] owns the grammar tables. For each lookahead it updates
//! the parser state stack itself (pushing on shift, popping the rule length
//! and pushing the goto state on reduce, unwinding to an error-accepting
//! state on error) and tells the driver what it did. The driver derives the
//! rule length from how much the stack shrank.
//!
//! [`ConditionOracle`] is the built-in oracle for `#if` expressions.

use crate::token::TokenKind;

/// A parser state
pub type StateId = u32;

/// Identity of a grammar rule, used to look up its reduce action
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(pub u32);

/// What the oracle did with the lookahead
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// The lookahead was shifted; shifting the end token accepts
    Shift,
    /// The stack top was reduced by a rule
    Reduce(RuleId),
    /// Syntax error; the stack was unwound to an error-accepting state or
    /// cleared if there is none
    Error,
}

/// Grammar tables driving the shift/reduce loop
pub trait ParseOracle {
    /// Decide the next action for `token` and update `states` accordingly
    fn decide(&self, token: TokenKind, states: &mut Vec<StateId>) -> Action;
}

/// Entry points of the grammar
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartState {
    /// A whole compilation unit
    Unit,
    /// A preprocessor condition, terminated by `EndOfInput`
    PreprocCondition,
}

impl StartState {
    /// The initial parser state
    #[must_use]
    pub const fn state_id(self) -> StateId {
        match self {
            Self::Unit => 0,
            Self::PreprocCondition => 1,
        }
    }
}

/// Reduce actions of the condition grammar
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PreprocRule {
    /// `lit`
    Literal,
    /// `id` used as an operand
    IdRef,
    /// `( e )`
    Brackets,
    /// `- e`
    UMinus,
    /// `+ e`
    UPlus,
    /// `~ e`
    BitNot,
    /// `! e`
    LogicalNot,
    /// `e * e`
    Mul,
    /// `e / e`
    Div,
    /// `e % e`
    Mod,
    /// `e + e`
    Add,
    /// `e - e`
    Sub,
    /// `e << e`
    Shl,
    /// `e >> e`
    Shr,
    /// `e < e`
    Lt,
    /// `e <= e`
    Le,
    /// `e > e`
    Gt,
    /// `e >= e`
    Ge,
    /// `e == e`
    Eq,
    /// `e != e`
    Ne,
    /// `e & e`
    BitAnd,
    /// `e ^ e`
    BitXor,
    /// `e | e`
    BitOr,
    /// `e && e`
    LogicalAnd,
    /// `e || e`
    LogicalOr,
    /// `e ? e : e`
    Conditional,
    /// Empty rule after the operator name, before its `(`
    OperatorBegin,
    /// `id <begin> ( id )`
    OperatorEnd,
}

impl PreprocRule {
    /// First rule id reserved for condition rules, above any grammar-generated id
    pub const BASE: u32 = 0x8000;

    /// The rule id of this action
    #[must_use]
    pub const fn id(self) -> RuleId {
        RuleId(Self::BASE + self as u32)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum UnaryOp {
    Minus,
    Plus,
    BitNot,
    LogicalNot,
}

impl UnaryOp {
    const ALL: [Self; 4] = [Self::Minus, Self::Plus, Self::BitNot, Self::LogicalNot];

    const fn from_token(token: TokenKind) -> Option<Self> {
        Some(match token {
            TokenKind::Char(b'-') => Self::Minus,
            TokenKind::Char(b'+') => Self::Plus,
            TokenKind::Char(b'~') => Self::BitNot,
            TokenKind::Char(b'!') => Self::LogicalNot,
            _ => return None,
        })
    }

    const fn rule(self) -> PreprocRule {
        match self {
            Self::Minus => PreprocRule::UMinus,
            Self::Plus => PreprocRule::UPlus,
            Self::BitNot => PreprocRule::BitNot,
            Self::LogicalNot => PreprocRule::LogicalNot,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BinaryOp {
    Mul,
    Div,
    Mod,
    Add,
    Sub,
    Shl,
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    LogicalAnd,
    LogicalOr,
}

impl BinaryOp {
    const ALL: [Self; 18] = [
        Self::Mul,
        Self::Div,
        Self::Mod,
        Self::Add,
        Self::Sub,
        Self::Shl,
        Self::Shr,
        Self::Lt,
        Self::Le,
        Self::Gt,
        Self::Ge,
        Self::Eq,
        Self::Ne,
        Self::BitAnd,
        Self::BitXor,
        Self::BitOr,
        Self::LogicalAnd,
        Self::LogicalOr,
    ];

    const fn from_token(token: TokenKind) -> Option<Self> {
        Some(match token {
            TokenKind::Char(b'*') => Self::Mul,
            TokenKind::Char(b'/') => Self::Div,
            TokenKind::Char(b'%') => Self::Mod,
            TokenKind::Char(b'+') => Self::Add,
            TokenKind::Char(b'-') => Self::Sub,
            TokenKind::Shl => Self::Shl,
            TokenKind::Shr => Self::Shr,
            TokenKind::Char(b'<') => Self::Lt,
            TokenKind::Le => Self::Le,
            TokenKind::Char(b'>') => Self::Gt,
            TokenKind::Ge => Self::Ge,
            TokenKind::Eq => Self::Eq,
            TokenKind::Ne => Self::Ne,
            TokenKind::Char(b'&') => Self::BitAnd,
            TokenKind::Char(b'^') => Self::BitXor,
            TokenKind::Char(b'|') => Self::BitOr,
            TokenKind::And => Self::LogicalAnd,
            TokenKind::Or => Self::LogicalOr,
            _ => return None,
        })
    }

    /// Binding strength; higher binds tighter
    const fn precedence(self) -> u8 {
        match self {
            Self::Mul | Self::Div | Self::Mod => 10,
            Self::Add | Self::Sub => 9,
            Self::Shl | Self::Shr => 8,
            Self::Lt | Self::Le | Self::Gt | Self::Ge => 7,
            Self::Eq | Self::Ne => 6,
            Self::BitAnd => 5,
            Self::BitXor => 4,
            Self::BitOr => 3,
            Self::LogicalAnd => 2,
            Self::LogicalOr => 1,
        }
    }

    const fn rule(self) -> PreprocRule {
        match self {
            Self::Mul => PreprocRule::Mul,
            Self::Div => PreprocRule::Div,
            Self::Mod => PreprocRule::Mod,
            Self::Add => PreprocRule::Add,
            Self::Sub => PreprocRule::Sub,
            Self::Shl => PreprocRule::Shl,
            Self::Shr => PreprocRule::Shr,
            Self::Lt => PreprocRule::Lt,
            Self::Le => PreprocRule::Le,
            Self::Gt => PreprocRule::Gt,
            Self::Ge => PreprocRule::Ge,
            Self::Eq => PreprocRule::Eq,
            Self::Ne => PreprocRule::Ne,
            Self::BitAnd => PreprocRule::BitAnd,
            Self::BitXor => PreprocRule::BitXor,
            Self::BitOr => PreprocRule::BitOr,
            Self::LogicalAnd => PreprocRule::LogicalAnd,
            Self::LogicalOr => PreprocRule::LogicalOr,
        }
    }
}

/// Grammar symbol on top of a condition-parser state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Sym {
    StartUnit,
    StartCondition,
    Expr,
    OperatorBegin,
    Literal,
    Ident,
    LParen,
    RParen,
    Question,
    Colon,
    Unary(UnaryOp),
    Binary(BinaryOp),
}

const UNARY_STATE_BASE: StateId = 16;
const BINARY_STATE_BASE: StateId = 32;

impl Sym {
    fn state(self) -> StateId {
        match self {
            Self::StartUnit => StartState::Unit.state_id(),
            Self::StartCondition => StartState::PreprocCondition.state_id(),
            Self::Expr => 2,
            Self::OperatorBegin => 3,
            Self::Literal => 4,
            Self::Ident => 5,
            Self::LParen => 6,
            Self::RParen => 7,
            Self::Question => 8,
            Self::Colon => 9,
            Self::Unary(op) => UNARY_STATE_BASE + op as StateId,
            Self::Binary(op) => BINARY_STATE_BASE + op as StateId,
        }
    }

    fn from_state(state: StateId) -> Option<Self> {
        Some(match state {
            0 => Self::StartUnit,
            1 => Self::StartCondition,
            2 => Self::Expr,
            3 => Self::OperatorBegin,
            4 => Self::Literal,
            5 => Self::Ident,
            6 => Self::LParen,
            7 => Self::RParen,
            8 => Self::Question,
            9 => Self::Colon,
            s if s >= BINARY_STATE_BASE => {
                Self::Binary(*BinaryOp::ALL.get((s - BINARY_STATE_BASE) as usize)?)
            }
            s if s >= UNARY_STATE_BASE => {
                Self::Unary(*UnaryOp::ALL.get((s - UNARY_STATE_BASE) as usize)?)
            }
            _ => return None,
        })
    }
}

/// Operator-precedence oracle for preprocessor conditions.
///
/// Grammar, from [`StartState::PreprocCondition`] up to `EndOfInput`:
///
/// ```text
/// e : lit | id | ( e ) | unop e | e binop e | e ? e : e
///   | id <begin> ( id )
/// ```
///
/// Binary operators have C precedence and associate to the left; `?:`
/// associates to the right. `<begin>` is an empty rule reduced when an
/// identifier is followed by `(`, so its action runs before the argument
/// identifier is lexed.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConditionOracle;

impl ConditionOracle {
    fn shift(states: &mut Vec<StateId>, sym: Sym) -> Action {
        states.push(sym.state());
        Action::Shift
    }

    fn reduce(states: &mut Vec<StateId>, len: usize, goto: Sym, rule: PreprocRule) -> Action {
        let keep = states.len().saturating_sub(len);
        states.truncate(keep);
        states.push(goto.state());
        Action::Reduce(rule.id())
    }

    fn error(states: &mut Vec<StateId>) -> Action {
        states.clear();
        Action::Error
    }

    fn tail_matches(states: &[StateId], pattern: &[Sym]) -> bool {
        states.len() >= pattern.len()
            && states[states.len() - pattern.len()..]
                .iter()
                .zip(pattern)
                .all(|(&state, sym)| Sym::from_state(state) == Some(*sym))
    }

    /// An operand is expected: shift the start of a primary expression
    fn expect_operand(token: TokenKind, states: &mut Vec<StateId>) -> Action {
        match token {
            TokenKind::IntLiteral | TokenKind::BoolLiteral => Self::shift(states, Sym::Literal),
            TokenKind::Id => Self::shift(states, Sym::Ident),
            TokenKind::Char(b'(') => Self::shift(states, Sym::LParen),
            _ => match UnaryOp::from_token(token) {
                Some(op) => Self::shift(states, Sym::Unary(op)),
                None => Self::error(states),
            },
        }
    }

    /// An expression was just completed; `below` is the symbol under it
    fn after_operand(token: TokenKind, below: Sym, states: &mut Vec<StateId>) -> Action {
        let next = BinaryOp::from_token(token);
        match below {
            Sym::Unary(op) => Self::reduce(states, 2, Sym::Expr, op.rule()),
            Sym::Binary(op) => match next {
                Some(next) if next.precedence() > op.precedence() => {
                    Self::shift(states, Sym::Binary(next))
                }
                _ => Self::reduce(states, 3, Sym::Expr, op.rule()),
            },
            Sym::Colon => match (next, token) {
                (Some(next), _) => Self::shift(states, Sym::Binary(next)),
                (None, TokenKind::Char(b'?')) => Self::shift(states, Sym::Question),
                _ if Self::tail_matches(
                    states,
                    &[Sym::Expr, Sym::Question, Sym::Expr, Sym::Colon, Sym::Expr],
                ) =>
                {
                    Self::reduce(states, 5, Sym::Expr, PreprocRule::Conditional)
                }
                _ => Self::error(states),
            },
            Sym::Question | Sym::LParen | Sym::StartCondition => match (next, token) {
                (Some(next), _) => Self::shift(states, Sym::Binary(next)),
                (None, TokenKind::Char(b'?')) => Self::shift(states, Sym::Question),
                (None, TokenKind::Char(b':')) if below == Sym::Question => {
                    Self::shift(states, Sym::Colon)
                }
                (None, TokenKind::Char(b')')) if below == Sym::LParen => {
                    Self::shift(states, Sym::RParen)
                }
                (None, TokenKind::EndOfInput) if below == Sym::StartCondition => Action::Shift,
                _ => Self::error(states),
            },
            _ => Self::error(states),
        }
    }
}

impl ParseOracle for ConditionOracle {
    fn decide(&self, token: TokenKind, states: &mut Vec<StateId>) -> Action {
        let Some(top) = states.last().and_then(|&s| Sym::from_state(s)) else {
            return Self::error(states);
        };
        let below = states
            .len()
            .checked_sub(2)
            .and_then(|i| Sym::from_state(states[i]));

        match top {
            Sym::Literal => Self::reduce(states, 1, Sym::Expr, PreprocRule::Literal),
            Sym::Ident if Self::tail_matches(states, &[Sym::OperatorBegin, Sym::LParen, Sym::Ident]) => {
                match token {
                    TokenKind::Char(b')') => Self::shift(states, Sym::RParen),
                    _ => Self::error(states),
                }
            }
            Sym::Ident => match token {
                TokenKind::Char(b'(') => Self::reduce(states, 0, Sym::OperatorBegin, PreprocRule::OperatorBegin),
                _ => Self::reduce(states, 1, Sym::Expr, PreprocRule::IdRef),
            },
            Sym::OperatorBegin => match token {
                TokenKind::Char(b'(') => Self::shift(states, Sym::LParen),
                _ => Self::error(states),
            },
            Sym::LParen if below == Some(Sym::OperatorBegin) => match token {
                TokenKind::Id => Self::shift(states, Sym::Ident),
                _ => Self::error(states),
            },
            Sym::RParen => {
                if Self::tail_matches(
                    states,
                    &[Sym::Ident, Sym::OperatorBegin, Sym::LParen, Sym::Ident, Sym::RParen],
                ) {
                    Self::reduce(states, 5, Sym::Expr, PreprocRule::OperatorEnd)
                } else if Self::tail_matches(states, &[Sym::LParen, Sym::Expr, Sym::RParen]) {
                    Self::reduce(states, 3, Sym::Expr, PreprocRule::Brackets)
                } else {
                    Self::error(states)
                }
            }
            Sym::Expr => match below {
                Some(below) => Self::after_operand(token, below, states),
                None => Self::error(states),
            },
            Sym::StartCondition
            | Sym::LParen
            | Sym::Question
            | Sym::Colon
            | Sym::Unary(_)
            | Sym::Binary(_) => Self::expect_operand(token, states),
            Sym::StartUnit => Self::error(states),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Run the oracle over a token sequence, collecting the reduced rules
    fn run(tokens: &[TokenKind]) -> Option<Vec<PreprocRule>> {
        let all = [
            PreprocRule::Literal,
            PreprocRule::IdRef,
            PreprocRule::Brackets,
            PreprocRule::UMinus,
            PreprocRule::Add,
            PreprocRule::Mul,
            PreprocRule::Eq,
            PreprocRule::Conditional,
            PreprocRule::OperatorBegin,
            PreprocRule::OperatorEnd,
            PreprocRule::LogicalAnd,
        ];
        let mut states = vec![StartState::PreprocCondition.state_id()];
        let mut rules = Vec::new();
        let mut input = tokens.iter().copied().chain(std::iter::once(TokenKind::EndOfInput));
        let mut token = input.next()?;
        loop {
            match ConditionOracle.decide(token, &mut states) {
                Action::Shift if token == TokenKind::EndOfInput => return Some(rules),
                Action::Shift => token = input.next()?,
                Action::Reduce(id) => rules.push(*all.iter().find(|r| r.id() == id)?),
                Action::Error => return None,
            }
        }
    }

    const INT: TokenKind = TokenKind::IntLiteral;

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let rules = run(&[INT, TokenKind::Char(b'+'), INT, TokenKind::Char(b'*'), INT]).unwrap();
        let ops: Vec<_> = rules.into_iter().filter(|r| *r != PreprocRule::Literal).collect();
        assert_eq!(ops, vec![PreprocRule::Mul, PreprocRule::Add]);
    }

    #[test]
    fn operator_form_reduces_empty_rule_before_parenthesis() {
        let rules = run(&[
            TokenKind::Id,
            TokenKind::Char(b'('),
            TokenKind::Id,
            TokenKind::Char(b')'),
            TokenKind::And,
            TokenKind::Id,
        ])
        .unwrap();
        assert_eq!(
            rules,
            vec![
                PreprocRule::OperatorBegin,
                PreprocRule::OperatorEnd,
                PreprocRule::IdRef,
                PreprocRule::LogicalAnd,
            ]
        );
    }

    #[test]
    fn conditional_and_brackets() {
        let rules = run(&[
            TokenKind::Char(b'('),
            INT,
            TokenKind::Char(b')'),
            TokenKind::Char(b'?'),
            TokenKind::Char(b'-'),
            INT,
            TokenKind::Char(b':'),
            INT,
        ])
        .unwrap();
        assert!(rules.contains(&PreprocRule::Brackets));
        assert!(rules.contains(&PreprocRule::UMinus));
        assert_eq!(rules.last(), Some(&PreprocRule::Conditional));
    }

    #[test]
    fn malformed_input_clears_the_stack() {
        assert!(run(&[INT, TokenKind::Char(b'+')]).is_none());
        assert!(run(&[TokenKind::Char(b')')]).is_none());
        assert!(run(&[INT, INT]).is_none());
        let mut states = vec![StartState::PreprocCondition.state_id()];
        assert_eq!(ConditionOracle.decide(TokenKind::Char(b'*'), &mut states), Action::Error);
        assert!(states.is_empty());
    }
}
