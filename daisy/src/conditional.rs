//! Conditional compilation: `#if` family directives and condition evaluation.
//!
//! Conditions are parsed by the ordinary driver loop, started in the
//! condition state and fed by the preprocessor itself, so macros in a
//! condition expand as usual. Any error while evaluating makes the
//! condition false.

use std::rc::Rc;

use crate::input::InputFlags;
use crate::lexer::Preprocessor;
use crate::literal::IntegerConst;
use crate::location::{LocationMap, SymbolLoc};
use crate::oracle::PreprocRule;
use crate::parser::{drive, DriveOptions, ParseHost, ReduceActions, SymbolInfo, SymbolValue};
use crate::token::TokenKind;

/// State of one open `#if` section
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IfSectionState {
    /// Location of the opening directive
    pub loc: SymbolLoc,
    /// Whether a branch of this section was taken
    pub is_matched: bool,
    /// Whether `#else` was seen
    pub has_else_section: bool,
    /// Zero while text is enabled; otherwise one plus the number of nested
    /// sections opened inside disabled text
    pub disable_depth: u32,
}

impl IfSectionState {
    fn new(loc: SymbolLoc) -> Self {
        Self {
            loc,
            is_matched: false,
            has_else_section: false,
            disable_depth: 0,
        }
    }
}

/// How the controlling condition of a section is computed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Condition {
    /// `#if` / `#elif` expression
    Expr,
    /// `#ifdef` / `#elifdef`
    Defined,
    /// `#ifndef` / `#elifndef`
    NotDefined,
}

impl Preprocessor {
    /// Whether text is being skipped by the innermost section
    #[must_use]
    pub fn is_text_disabled(&self) -> bool {
        self.if_sections.last().is_some_and(|s| s.disable_depth > 0)
    }

    fn eval(&mut self, tkn: &mut SymbolInfo, condition: Condition) -> bool {
        match condition {
            Condition::Expr => self.eval_condition(),
            Condition::Defined => self.eval_is_defined(tkn),
            Condition::NotDefined => !self.eval_is_defined(tkn),
        }
    }

    /// `#if`, `#ifdef`, `#ifndef`
    pub(crate) fn parse_if_directive(&mut self, tkn: &mut SymbolInfo, condition: Condition) {
        if let Some(section) = self.if_sections.last_mut()
            && section.disable_depth > 0
        {
            section.disable_depth += 1;
            return;
        }

        self.if_sections.push(IfSectionState::new(tkn.loc));
        let taken = self.eval(tkn, condition);
        if let Some(section) = self.if_sections.last_mut() {
            if taken {
                section.is_matched = true;
            } else {
                section.disable_depth = 1;
            }
        }
    }

    /// `#elif`, `#elifdef`, `#elifndef`
    pub(crate) fn parse_elif_directive(&mut self, tkn: &mut SymbolInfo, condition: Condition) {
        let Some(section) = self.if_sections.last().copied() else {
            self.error(tkn.loc, "`#elif` without `#if`");
            return;
        };
        if section.disable_depth > 1 {
            return;
        }
        if section.has_else_section {
            self.warning(tkn.loc, "`#elif` after `#else`");
        }

        let taken = !section.is_matched && self.eval(tkn, condition);
        if let Some(section) = self.if_sections.last_mut() {
            if taken {
                section.is_matched = true;
                section.disable_depth = 0;
            } else {
                section.disable_depth = 1;
            }
        }
    }

    /// `#else`
    pub(crate) fn parse_else_directive(&mut self, tkn: &mut SymbolInfo) {
        let Some(section) = self.if_sections.last().copied() else {
            self.error(tkn.loc, "`#else` without `#if`");
            return;
        };
        if section.disable_depth > 1 {
            return;
        }
        if section.has_else_section {
            self.error(tkn.loc, "multiple `#else` section");
        }

        self.ensure_end_of_input(tkn);
        if let Some(section) = self.if_sections.last_mut() {
            section.disable_depth = u32::from(section.is_matched);
            section.is_matched = true;
            section.has_else_section = true;
        }
    }

    /// `#endif`
    pub(crate) fn parse_endif_directive(&mut self, tkn: &mut SymbolInfo) {
        let Some(section) = self.if_sections.last_mut() else {
            self.error(tkn.loc, "`#endif` without `#if`");
            return;
        };
        if section.disable_depth > 1 {
            section.disable_depth -= 1;
            return;
        }
        self.if_sections.pop();
        self.ensure_end_of_input(tkn);
    }

    /// Read a macro name and test whether it is defined; errors count as defined
    fn eval_is_defined(&mut self, tkn: &mut SymbolInfo) -> bool {
        if self.lex(tkn) != TokenKind::Id {
            self.error(tkn.loc, "expected macro name");
            return true;
        }
        let defined = tkn.ident().is_some_and(|id| self.is_defined(id));
        self.ensure_end_of_input(tkn);
        defined
    }

    /// Parse and evaluate the rest of the directive line
    fn eval_condition(&mut self) -> bool {
        if let Some(top) = self.input.top_mut() {
            top.flags.remove(InputFlags::DISABLE_MACRO_EXPANSION);
        }
        self.condition_failed = false;
        self.operator_ctx = None;

        let oracle = Rc::clone(&self.condition_oracle);
        let actions = Rc::clone(&self.condition_actions);
        let result = drive(self, &*oracle, &actions, DriveOptions::CONDITION);
        self.resume_expansion();

        match result {
            Ok(symbols) => match symbols.as_slice() {
                [value] => cast_to_bool(self, value).unwrap_or(false),
                _ => {
                    let loc = symbols.first().map(|s| s.loc).unwrap_or_default();
                    self.error(loc, "expected integer expression");
                    false
                }
            },
            Err(err) => {
                log::debug!("condition evaluation stopped: {err:?}");
                false
            }
        }
    }

    /// Re-enable expansion in the frame an operator suspended it in
    fn resume_expansion(&mut self) {
        if let Some(idx) = self.operator_ctx.take()
            && let Some(frame) = self.input.get_mut(idx)
        {
            frame.flags.remove(InputFlags::DISABLE_MACRO_EXPANSION);
        }
    }
}

impl ParseHost for Preprocessor {
    fn lex(&mut self, tkn: &mut SymbolInfo) -> TokenKind {
        Self::lex(self, tkn)
    }

    fn locations(&self) -> &LocationMap {
        &self.locations
    }

    fn report_syntax_error(&mut self, token: TokenKind, loc: &SymbolLoc) {
        Self::report_syntax_error(self, token, loc);
    }

    fn is_aborted(&self) -> bool {
        self.condition_failed
    }
}

fn fail(pp: &mut Preprocessor, loc: SymbolLoc, message: &str) {
    pp.error(loc, message);
    pp.condition_failed = true;
}

fn cast_to_bool(pp: &mut Preprocessor, sym: &SymbolInfo) -> Option<bool> {
    match sym.value {
        SymbolValue::Bool(b) => Some(b),
        SymbolValue::Integer(v) => Some(!v.is_zero()),
        _ => {
            fail(pp, sym.loc, "expected integer expression");
            None
        }
    }
}

fn integer_operand(pp: &mut Preprocessor, sym: &SymbolInfo) -> Option<IntegerConst> {
    let value = sym.integer();
    if value.is_none() {
        fail(pp, sym.loc, "expected integer expression");
    }
    value
}

fn eval_unary(pp: &mut Preprocessor, ss: &mut [SymbolInfo], op: fn(IntegerConst) -> IntegerConst) {
    if let Some(v) = integer_operand(pp, &ss[1]) {
        ss[0].value = SymbolValue::Integer(op(v));
    }
}

fn binary_operands(pp: &mut Preprocessor, ss: &[SymbolInfo]) -> Option<(IntegerConst, IntegerConst)> {
    let lhs = integer_operand(pp, &ss[0])?;
    let rhs = integer_operand(pp, &ss[2])?;
    Some((lhs, rhs))
}

fn eval_binary(pp: &mut Preprocessor, ss: &mut [SymbolInfo], op: fn(IntegerConst, IntegerConst) -> IntegerConst) {
    if let Some((lhs, rhs)) = binary_operands(pp, ss) {
        ss[0].value = SymbolValue::Integer(op(lhs, rhs));
    }
}

fn eval_division(
    pp: &mut Preprocessor,
    ss: &mut [SymbolInfo],
    op: fn(IntegerConst, IntegerConst) -> Option<IntegerConst>,
) {
    let Some((lhs, rhs)) = binary_operands(pp, ss) else {
        return;
    };
    match op(lhs, rhs) {
        Some(v) => ss[0].value = SymbolValue::Integer(v),
        None => fail(pp, ss[2].loc, "integer division by zero"),
    }
}

fn eval_equality(pp: &mut Preprocessor, ss: &mut [SymbolInfo], equal: bool) {
    if let Some((lhs, rhs)) = binary_operands(pp, ss) {
        ss[0].value = SymbolValue::Bool((lhs == rhs) == equal);
    }
}

fn eval_relational(pp: &mut Preprocessor, ss: &mut [SymbolInfo], op: fn(&IntegerConst, &IntegerConst) -> bool) {
    let Some((lhs, rhs)) = binary_operands(pp, ss) else {
        return;
    };
    if lhs.is_signed() != rhs.is_signed() {
        pp.warning(ss[1].loc, "signed/unsigned mismatch");
    }
    ss[0].value = SymbolValue::Bool(op(&lhs, &rhs));
}

fn eval_logical(pp: &mut Preprocessor, ss: &mut [SymbolInfo], and: bool) {
    let Some(lhs) = cast_to_bool(pp, &ss[0]) else {
        return;
    };
    let Some(rhs) = cast_to_bool(pp, &ss[2]) else {
        return;
    };
    ss[0].value = SymbolValue::Bool(if and { lhs && rhs } else { lhs || rhs });
}

/// Reduce actions of the condition grammar
pub(crate) fn condition_actions() -> ReduceActions<Preprocessor> {
    ReduceActions::new()
        .with(PreprocRule::IdRef.id(), |_, ss, _| {
            ss[0].value = SymbolValue::Integer(IntegerConst::default());
        })
        .with(PreprocRule::Brackets.id(), |_, ss, _| {
            ss[0].value = std::mem::take(&mut ss[1].value);
        })
        .with(PreprocRule::UMinus.id(), |pp, ss, _| eval_unary(pp, ss, |v| -v))
        .with(PreprocRule::UPlus.id(), |pp, ss, _| eval_unary(pp, ss, |v| v))
        .with(PreprocRule::BitNot.id(), |pp, ss, _| eval_unary(pp, ss, |v| !v))
        .with(PreprocRule::LogicalNot.id(), |pp, ss, _| {
            if let Some(b) = cast_to_bool(pp, &ss[1]) {
                ss[0].value = SymbolValue::Bool(!b);
            }
        })
        .with(PreprocRule::Mul.id(), |pp, ss, _| eval_binary(pp, ss, |a, b| a * b))
        .with(PreprocRule::Div.id(), |pp, ss, _| eval_division(pp, ss, IntegerConst::checked_div))
        .with(PreprocRule::Mod.id(), |pp, ss, _| eval_division(pp, ss, IntegerConst::checked_rem))
        .with(PreprocRule::Add.id(), |pp, ss, _| eval_binary(pp, ss, |a, b| a + b))
        .with(PreprocRule::Sub.id(), |pp, ss, _| eval_binary(pp, ss, |a, b| a - b))
        .with(PreprocRule::Shl.id(), |pp, ss, _| eval_binary(pp, ss, |a, b| a << b))
        .with(PreprocRule::Shr.id(), |pp, ss, _| eval_binary(pp, ss, |a, b| a >> b))
        .with(PreprocRule::Lt.id(), |pp, ss, _| eval_relational(pp, ss, IntegerConst::lt))
        .with(PreprocRule::Le.id(), |pp, ss, _| eval_relational(pp, ss, IntegerConst::le))
        .with(PreprocRule::Gt.id(), |pp, ss, _| eval_relational(pp, ss, IntegerConst::gt))
        .with(PreprocRule::Ge.id(), |pp, ss, _| eval_relational(pp, ss, IntegerConst::ge))
        .with(PreprocRule::Eq.id(), |pp, ss, _| eval_equality(pp, ss, true))
        .with(PreprocRule::Ne.id(), |pp, ss, _| eval_equality(pp, ss, false))
        .with(PreprocRule::BitAnd.id(), |pp, ss, _| eval_binary(pp, ss, |a, b| a & b))
        .with(PreprocRule::BitXor.id(), |pp, ss, _| eval_binary(pp, ss, |a, b| a ^ b))
        .with(PreprocRule::BitOr.id(), |pp, ss, _| eval_binary(pp, ss, |a, b| a | b))
        .with(PreprocRule::LogicalAnd.id(), |pp, ss, _| eval_logical(pp, ss, true))
        .with(PreprocRule::LogicalOr.id(), |pp, ss, _| eval_logical(pp, ss, false))
        .with(PreprocRule::Conditional.id(), |pp, ss, _| {
            if let Some(cond) = cast_to_bool(pp, &ss[0]) {
                let taken = if cond { 2 } else { 4 };
                ss[0].value = std::mem::take(&mut ss[taken].value);
            }
        })
        .with(PreprocRule::OperatorBegin.id(), |pp, _, _| {
            if let Some(idx) = pp.input.len().checked_sub(1)
                && let Some(frame) = pp.input.get_mut(idx)
            {
                frame.flags.insert(InputFlags::DISABLE_MACRO_EXPANSION);
                pp.operator_ctx = Some(idx);
            }
        })
        .with(PreprocRule::OperatorEnd.id(), |pp, ss, _| {
            pp.resume_expansion();
            match (ss[0].ident(), ss[3].ident()) {
                (Some(op), Some(id)) if op == "defined" => {
                    let defined = pp.is_defined(id);
                    ss[0].value = SymbolValue::Bool(defined);
                }
                _ => fail(pp, ss[0].loc, "unknown preprocessor operator"),
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FrontendConfig;

    fn eval(text: &str) -> (bool, u32) {
        let mut pp = Preprocessor::new(&FrontendConfig::new().with_diagnostic_handler(|_| {}));
        pp.push_source("cond.dy", &format!("#define A 2\n#if {text}\nyes\n#else\nno\n#endif\n"));
        let mut tkn = SymbolInfo::default();
        let taken = pp.lex(&mut tkn) == TokenKind::Id && tkn.ident().is_some_and(|id| id == "yes");
        (taken, pp.status().errors)
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(eval("1 + 2 * 3 == 7"), (true, 0));
        assert_eq!(eval("(1 + 2) * 3 == 7"), (false, 0));
        assert_eq!(eval("-1 < 0 && ~0 == -1"), (true, 0));
        assert_eq!(eval("1 << 4 == 16 ? 1 : 0"), (true, 0));
    }

    #[test]
    fn macros_expand_but_not_under_defined() {
        assert_eq!(eval("A * A == 4"), (true, 0));
        assert_eq!(eval("defined(A)"), (true, 0));
        assert_eq!(eval("defined(B) || !defined(A)"), (false, 0));
        assert_eq!(eval("UNKNOWN == 0"), (true, 0));
    }

    #[test]
    fn errors_make_the_condition_false() {
        assert_eq!(eval("1 / 0"), (false, 1));
        assert_eq!(eval("5 % (A - 2)"), (false, 1));
        assert_eq!(eval("1 +"), (false, 1));
        assert_eq!(eval("unknown(A)"), (false, 1));
    }

    #[test]
    fn nested_sections_in_disabled_text_are_counted() {
        let mut pp = Preprocessor::new(&FrontendConfig::new().with_diagnostic_handler(|_| {}));
        pp.push_source("nest.dy", "#if 0\n#if 1\nhidden\n#endif\n#else\nshown\n#endif\n");
        let mut tkn = SymbolInfo::default();
        assert_eq!(pp.lex(&mut tkn), TokenKind::Id);
        assert_eq!(tkn.ident().map(|id| id.as_str()), Some("shown"));
        assert_eq!(pp.if_depth(), 0);
        assert_eq!(pp.lex(&mut tkn), TokenKind::EndOfFile);
        assert!(pp.status().is_success());
    }
}
