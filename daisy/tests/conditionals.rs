mod common;

use common::{run, run_with};
use expect_test::expect;

#[test]
fn expression_conditions_select_branches() {
    let out = run(concat!(
        "#define V 2\n",
        "#if V == 1\none\n",
        "#elif V == 2\ntwo\n",
        "#elif V == 2\nagain\n",
        "#else\nother\n",
        "#endif\n",
    ));
    assert_eq!(out.text(), "two\n");
    assert!(out.diagnostics.is_empty());
}

#[test]
fn defined_does_not_expand_its_operand() {
    let out = run("#define A )\n#if defined(A) && !defined(B)\nyes\n#endif\n");
    assert_eq!(out.text(), "yes\n");
    assert!(out.diagnostics.is_empty());
}

#[test]
fn ifdef_family() {
    let out = run(concat!(
        "#define X\n",
        "#ifdef X\na\n#endif\n",
        "#ifndef X\nb\n#elifndef Y\nc\n#endif\n",
        "#ifdef Y\nd\n#elifdef X\ne\n#else\nf\n#endif\n",
    ));
    assert_eq!(out.text(), "a\nc\ne\n");
}

#[test]
fn nested_disabled_sections_are_skipped_whole() {
    let out = run("#if 0\n#if 1\nhidden\n#endif\nstill_hidden\n#else\nshown\n#endif\nafter\n");
    assert_eq!(out.text(), "shown\nafter\n");
    assert!(out.diagnostics.is_empty());
}

#[test]
fn evaluation_errors_take_the_else_branch() {
    let out = run("#if 1/0\nno\n#else\nelse\n#endif\n");
    assert_eq!(out.errors(), ["integer division by zero"]);
    assert_eq!(out.text(), "else\n");
}

#[test]
fn syntax_errors_make_the_condition_false() {
    let out = run("#if (1\nx\n#endif\ny\n");
    assert_eq!(out.errors().len(), 1);
    assert_eq!(out.text(), "y\n");
}

#[test]
fn mixed_signedness_comparison_warns() {
    let out = run("#if 1u < 2\nyes\n#endif\n");
    assert_eq!(out.warnings(), ["signed/unsigned mismatch"]);
    assert_eq!(out.text(), "yes\n");
}

#[test]
fn operands_promote_to_the_higher_ranked_type() {
    let out = run(concat!(
        "#if -1i64 < 1u32\nwide_signed\n#endif\n",
        "#if 0u8 - 1i16 < 0\nnarrow_signed\n#endif\n",
        "#if 1i32 - 2u32 > 0\nwrapped\n#endif\n",
    ));
    expect![[r#"
        wide_signed
        narrow_signed
        wrapped
    "#]]
    .assert_eq(&out.text());
    assert_eq!(out.warnings(), ["signed/unsigned mismatch", "signed/unsigned mismatch"]);
}

#[test]
fn negation_keeps_the_operand_type() {
    let out = run("#if -1u32 > 0u32\nall_ones\n#endif\n#if -1u32 == 4294967295u32\nmax\n#endif\n");
    expect![[r#"
        all_ones
        max
    "#]]
    .assert_eq(&out.text());
    assert!(out.diagnostics.is_empty());
}

#[test]
fn unbalanced_directives_are_reported() {
    let out = run(concat!(
        "#endif\n",
        "#else\n",
        "#elif 1\n",
        "#if 1\n#else\n#else\n#endif\n",
    ));
    assert_eq!(
        out.errors(),
        [
            "`#endif` without `#if`",
            "`#else` without `#if`",
            "`#elif` without `#if`",
            "multiple `#else` section",
        ]
    );
}

#[test]
fn elif_after_else_warns() {
    let out = run("#if 1\na\n#else\nb\n#elif 1\nc\n#endif\n");
    assert_eq!(out.warnings(), ["`#elif` after `#else`"]);
    assert_eq!(out.text(), "a\n");
}

#[test]
fn extra_tokens_after_ifdef_warn() {
    let out = run("#ifdef A B\n#endif\n");
    assert_eq!(out.warnings(), ["extra tokens at end of preprocessing directive"]);
}

#[test]
fn unterminated_section_is_closed_at_end_of_file() {
    let out = run("#if 1\nx\n");
    assert_eq!(out.warnings(), ["`#if` without `#endif`"]);
    assert_eq!(out.text(), "x\n");
}

#[test]
fn sections_do_not_leak_out_of_included_files() {
    let out = run_with("#include \"open.dy\"\nafter\n", &[("open.dy", "#if 0\nhidden\n")]);
    assert_eq!(out.warnings(), ["`#if` without `#endif`"]);
    assert_eq!(out.text(), "after\n");
}
