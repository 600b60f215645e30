//! The shift/reduce driver loop.
//!
//! The driver keeps the symbol stack in step with the oracle's state stack,
//! merges the locations of reduced symbols, runs reduce actions and recovers
//! from syntax errors with yacc-style three-token resynchronization. The same
//! loop evaluates `#if` conditions, started from a different state and with
//! recovery turned off.

use std::mem;

use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::diag::CompileStatus;
use crate::error::FrontendError;
use crate::lexer::Preprocessor;
use crate::literal::{FloatConst, IntegerConst};
use crate::location::{LocationMap, SymbolLoc};
use crate::oracle::{Action, ParseOracle, RuleId, StartState, StateId};
use crate::token::TokenKind;

/// Handle of a syntax-tree node built by reduce actions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

/// Handle of a scope built by reduce actions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

/// Handle of a type built by reduce actions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeId(pub u32);

/// Semantic value carried by a grammar symbol
#[derive(Clone, Debug, Default, PartialEq)]
pub enum SymbolValue {
    /// No value
    #[default]
    Empty,
    /// Boolean
    Bool(bool),
    /// Integer constant
    Integer(IntegerConst),
    /// Floating-point constant
    Float(FloatConst),
    /// Decoded string or character literal
    String(String),
    /// Identifier
    Ident(SmolStr),
    /// Syntax-tree node
    Node(NodeId),
    /// Scope
    Scope(ScopeId),
    /// Type
    Type(TypeId),
}

/// A grammar symbol: value plus location
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SymbolInfo {
    /// Semantic value
    pub value: SymbolValue,
    /// Source span
    pub loc: SymbolLoc,
}

impl SymbolInfo {
    /// The identifier this symbol holds, if any
    #[must_use]
    pub fn ident(&self) -> Option<&SmolStr> {
        match &self.value {
            SymbolValue::Ident(id) => Some(id),
            _ => None,
        }
    }

    /// The integer constant this symbol holds, if any
    #[must_use]
    pub const fn integer(&self) -> Option<IntegerConst> {
        match self.value {
            SymbolValue::Integer(v) => Some(v),
            _ => None,
        }
    }
}

/// A reduce action.
///
/// Receives the symbols of the rule's right-hand side, left to right, and the
/// merged location of the whole reduction. The result is written into the
/// first slot, which becomes the left-hand-side symbol.
pub type ReduceFn<H> = fn(&mut H, &mut [SymbolInfo], &mut SymbolLoc);

/// Rule-id to reduce-action table
pub struct ReduceActions<H> {
    handlers: FxHashMap<RuleId, ReduceFn<H>>,
}

impl<H> Default for ReduceActions<H> {
    fn default() -> Self {
        Self {
            handlers: FxHashMap::default(),
        }
    }
}

impl<H> ReduceActions<H> {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the action of a rule, replacing any earlier one
    #[must_use]
    pub fn with(mut self, rule: RuleId, action: ReduceFn<H>) -> Self {
        self.handlers.insert(rule, action);
        self
    }

    /// Register the action of a rule in place
    pub fn register(&mut self, rule: RuleId, action: ReduceFn<H>) {
        self.handlers.insert(rule, action);
    }

    /// The action of a rule; rules without one just pass their first symbol up
    #[must_use]
    pub fn get(&self, rule: RuleId) -> Option<ReduceFn<H>> {
        self.handlers.get(&rule).copied()
    }

    /// Number of registered actions
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no action is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// What the driver needs from its environment
pub trait ParseHost {
    /// Produce the next token
    fn lex(&mut self, tkn: &mut SymbolInfo) -> TokenKind;

    /// The location arena used to merge spans
    fn locations(&self) -> &LocationMap;

    /// Report a syntax error at the offending lookahead
    fn report_syntax_error(&mut self, token: TokenKind, loc: &SymbolLoc);

    /// Whether a reduce action asked to stop
    fn is_aborted(&self) -> bool {
        false
    }
}

/// Tokens shifted before recovery is considered complete
const ACCEPT_TO_RESTORE: u32 = 3;

#[derive(Clone, Copy, Debug)]
pub(crate) struct DriveOptions {
    start: StartState,
    end_token: TokenKind,
    recover: bool,
}

impl DriveOptions {
    pub(crate) const UNIT: Self = Self {
        start: StartState::Unit,
        end_token: TokenKind::EndOfFile,
        recover: true,
    };

    pub(crate) const CONDITION: Self = Self {
        start: StartState::PreprocCondition,
        end_token: TokenKind::EndOfInput,
        recover: false,
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DriveError {
    /// Syntax error with recovery disabled
    Syntax,
    /// A reduce action aborted the parse
    Aborted,
    /// The state stack emptied
    Unrecoverable,
}

/// Run the shift/reduce loop until the end token is shifted.
///
/// Returns the symbols left on the stack; a well-formed input leaves one.
pub(crate) fn drive<H: ParseHost>(
    host: &mut H,
    oracle: &dyn ParseOracle,
    actions: &ReduceActions<H>,
    options: DriveOptions,
) -> Result<Vec<SymbolInfo>, DriveError> {
    let mut states: Vec<StateId> = Vec::with_capacity(64);
    states.push(options.start.state_id());
    let mut symbols: Vec<SymbolInfo> = Vec::with_capacity(64);
    let mut error_status: u32 = 0;

    let mut lookahead = SymbolInfo::default();
    let mut token = host.lex(&mut lookahead);

    loop {
        let prev_height = states.len();
        let action = oracle.decide(token, &mut states);

        if action == Action::Shift {
            if token == options.end_token {
                break;
            }
            log::trace!("shift {token} at {}", lookahead.loc.first);
            symbols.push(mem::take(&mut lookahead));
            token = host.lex(&mut lookahead);
            error_status = error_status.saturating_sub(1);
            continue;
        }

        let mut rlen = (prev_height + 1).saturating_sub(states.len());

        if action == Action::Error {
            if !options.recover {
                host.report_syntax_error(token, &lookahead.loc);
                return Err(DriveError::Syntax);
            }
            if error_status == 0 {
                host.report_syntax_error(token, &lookahead.loc);
            }
            if states.is_empty() {
                return Err(DriveError::Unrecoverable);
            }
            if error_status == ACCEPT_TO_RESTORE {
                if token == options.end_token {
                    return Err(DriveError::Unrecoverable);
                }
                log::trace!("discard {token} at {}", lookahead.loc.first);
                symbols.push(mem::take(&mut lookahead));
                token = host.lex(&mut lookahead);
                rlen += 1;
            }
            error_status = ACCEPT_TO_RESTORE;
        }

        if rlen == 0 {
            symbols.push(SymbolInfo {
                value: SymbolValue::Empty,
                loc: lookahead.loc,
            });
            rlen = 1;
        }

        let Some(base) = symbols.len().checked_sub(rlen) else {
            return Err(DriveError::Unrecoverable);
        };
        let mut loc = symbols[base].loc;
        if rlen > 1 {
            let last = symbols[symbols.len() - 1].loc;
            host.locations().merge_into(&mut loc, &last);
        }

        if let Action::Reduce(rule) = action
            && let Some(reduce) = actions.get(rule)
        {
            reduce(host, &mut symbols[base..], &mut loc);
            if host.is_aborted() {
                return Err(DriveError::Aborted);
            }
        }

        symbols[base].loc = loc;
        symbols.truncate(base + 1);
    }

    Ok(symbols)
}

/// Handle passed to reduce actions of a compilation-unit grammar
pub struct ParseContext<S> {
    /// The token source
    pub pp: Preprocessor,
    /// Grammar-specific state built by reduce actions
    pub state: S,
}

impl<S> ParseContext<S> {
    /// Wrap a preprocessor with initial grammar state
    pub fn new(pp: Preprocessor, state: S) -> Self {
        Self { pp, state }
    }
}

impl<S> ParseHost for ParseContext<S> {
    fn lex(&mut self, tkn: &mut SymbolInfo) -> TokenKind {
        self.pp.lex(tkn)
    }

    fn locations(&self) -> &LocationMap {
        self.pp.locations()
    }

    fn report_syntax_error(&mut self, token: TokenKind, loc: &SymbolLoc) {
        self.pp.report_syntax_error(token, loc);
    }
}

/// Result of parsing a whole compilation unit
#[derive(Debug)]
pub struct ParseOutcome {
    /// The start symbol, if the stack holds exactly one symbol at the end
    pub value: Option<SymbolInfo>,
    /// Diagnostic counts of the unit
    pub status: CompileStatus,
}

/// Parse a whole compilation unit.
///
/// Syntax errors are reported and recovered from; the outcome's status tells
/// whether any occurred.
///
/// # Errors
/// Returns [`FrontendError::SyntaxUnrecoverable`] when recovery fails.
pub fn parse<S>(
    ctx: &mut ParseContext<S>,
    oracle: &dyn ParseOracle,
    actions: &ReduceActions<ParseContext<S>>,
) -> Result<ParseOutcome, FrontendError> {
    match drive(ctx, oracle, actions, DriveOptions::UNIT) {
        Ok(mut symbols) => {
            let value = if symbols.len() == 1 { symbols.pop() } else { None };
            Ok(ParseOutcome {
                value,
                status: ctx.pp.status(),
            })
        }
        Err(err) => {
            log::debug!("parse stopped: {err:?}");
            Err(FrontendError::SyntaxUnrecoverable {
                errors: ctx.pp.status().errors,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{Expansion, TextPosition};

    /// Feeds a fixed token list; every token sits on its own column
    struct Script {
        tokens: Vec<TokenKind>,
        next: usize,
        locations: LocationMap,
        errors: Vec<TokenKind>,
        reduced: Vec<SymbolLoc>,
    }

    impl Script {
        fn new(tokens: &[TokenKind]) -> Self {
            let mut locations = LocationMap::new();
            locations.push(None, Expansion::None);
            Self {
                tokens: tokens.to_vec(),
                next: 0,
                locations,
                errors: Vec::new(),
                reduced: Vec::new(),
            }
        }
    }

    impl ParseHost for Script {
        fn lex(&mut self, tkn: &mut SymbolInfo) -> TokenKind {
            let column = u32::try_from(self.next + 1).unwrap();
            let ctx = crate::location::LocCtxId::from_raw(0);
            tkn.loc = SymbolLoc::at(ctx, TextPosition::new(1, column));
            tkn.value = SymbolValue::Empty;
            let token = self.tokens.get(self.next).copied().unwrap_or(TokenKind::EndOfFile);
            self.next += 1;
            token
        }

        fn locations(&self) -> &LocationMap {
            &self.locations
        }

        fn report_syntax_error(&mut self, token: TokenKind, _loc: &SymbolLoc) {
            self.errors.push(token);
        }
    }

    /// `list : list item | ; item : 'x' ';' ;` with the empty list reduced first
    struct ListOracle;

    const LIST: StateId = 10;
    const ITEM_X: StateId = 11;
    const ITEM_SEMI: StateId = 12;
    const ITEM: StateId = 13;

    impl ParseOracle for ListOracle {
        fn decide(&self, token: TokenKind, states: &mut Vec<StateId>) -> Action {
            let top = states.last().copied();
            match (top, token) {
                (Some(0), _) => {
                    states.push(LIST);
                    Action::Reduce(RuleId(1))
                }
                (Some(LIST), TokenKind::EndOfFile) => Action::Shift,
                (Some(LIST), TokenKind::Char(b'x')) => {
                    states.push(ITEM_X);
                    Action::Shift
                }
                (Some(ITEM_X), TokenKind::Char(b';')) => {
                    states.push(ITEM_SEMI);
                    Action::Shift
                }
                (Some(ITEM_SEMI), _) => {
                    states.truncate(states.len() - 2);
                    states.push(ITEM);
                    Action::Reduce(RuleId(3))
                }
                (Some(ITEM), _) => {
                    states.truncate(states.len() - 2);
                    states.push(LIST);
                    Action::Reduce(RuleId(2))
                }
                _ => {
                    states.clear();
                    Action::Error
                }
            }
        }
    }

    fn record_item(host: &mut Script, _: &mut [SymbolInfo], loc: &mut SymbolLoc) {
        host.reduced.push(*loc);
    }

    #[test]
    fn reductions_merge_locations_and_empty_rules_use_lookahead() {
        let x = TokenKind::Char(b'x');
        let semi = TokenKind::Char(b';');
        let mut host = Script::new(&[x, semi, x, semi]);
        let actions = ReduceActions::new().with(RuleId(3), record_item);

        let symbols = drive(&mut host, &ListOracle, &actions, DriveOptions::UNIT).unwrap();
        assert_eq!(symbols.len(), 1);
        assert!(host.errors.is_empty());

        let spans: Vec<_> = host.reduced.iter().map(|l| (l.first.column, l.last.column)).collect();
        assert_eq!(spans, vec![(1, 2), (3, 4)]);
        assert_eq!(symbols[0].loc.first.column, 1);
        assert_eq!(symbols[0].loc.last.column, 4);
    }

    #[test]
    fn error_without_recovery_state_is_unrecoverable() {
        let mut host = Script::new(&[TokenKind::Char(b';')]);
        let result = drive(&mut host, &ListOracle, &ReduceActions::new(), DriveOptions::UNIT);
        assert_eq!(result, Err(DriveError::Unrecoverable));
        assert_eq!(host.errors, vec![TokenKind::Char(b';')]);
    }
}
