//! Property tests over arbitrary documents and carets.
//!
//! Documents are soups of PHP-ish fragments so that most inputs are only
//! partly valid. Every request has to terminate with a value, never panic,
//! and keep its ordering guarantees.
#![cfg(feature = "proptest")]

use pharos::AnalysisConfig;
use pharos::ide::AnalysisHost;
use proptest::prelude::*;

// ============================================================================
// PROPTEST STRATEGIES
// ============================================================================

fn arb_fragment() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec![
        "class A ", "{ ", "} ", "function f", "($x) ", "$x", "->", "::", "m()", "; ",
        "new A", "'a.php'", "require ", "define(", "/** @var A $x */", "/* @var $x A|B */",
        "private ", "static ", "const C = 1", "trait T ", "namespace N;", "use N\\A as B;",
        "\\", "fn() => ", "(", ")", "[", "]", "\n", " ",
        "/* @var \\\\Foo $x */", "/** @param \\ $x */", "/** @return \\A\\ */", "/* @var $x \\|\\B */",
    ])
}

fn arb_document() -> impl Strategy<Value = String> {
    prop::collection::vec(arb_fragment(), 0..60).prop_map(|parts| format!("<?php {}", parts.concat()))
}

fn arb_caret(len: usize) -> impl Strategy<Value = i64> {
    prop_oneof![
        (0..=len as i64),
        Just(-1i64),
        Just(len as i64 + 3),
    ]
}

fn arb_case() -> impl Strategy<Value = (String, i64)> {
    arb_document().prop_flat_map(|doc| {
        let len = doc.len();
        (Just(doc), arb_caret(len))
    })
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #[test]
    fn prop_span_stays_inside_document((doc, caret) in arb_case()) {
        let host = AnalysisHost::with_config(AnalysisConfig::default().with_recursion_limit(8));
        let file = host.set_file_content("/p.php", &doc);
        let analysis = host.analysis(file).unwrap();
        if let Some(span) = analysis.reference_span(caret) {
            prop_assert!(usize::from(span.end()) <= doc.len());
            prop_assert!(caret >= 0);
        }
    }

    #[test]
    fn prop_run_is_idempotent_and_ordered((doc, caret) in arb_case()) {
        let host = AnalysisHost::new();
        let file = host.set_file_content("/p.php", &doc);
        let analysis = host.analysis(file).unwrap();

        let first = analysis.run(caret);
        prop_assert_eq!(&first, &analysis.run(caret));
        if let Some(resolution) = first {
            let marks = &resolution.occurrences;
            prop_assert!(marks.windows(2).all(|w| w[0].start() < w[1].start()));
            prop_assert!(!resolution.kind.is_include_path() || marks.is_empty());
        }
    }

    #[test]
    fn prop_highlights_are_sorted(doc in arb_document()) {
        let host = AnalysisHost::new();
        let file = host.set_file_content("/p.php", &doc);
        let highlights = host.analysis(file).unwrap().highlights().unwrap();
        prop_assert!(highlights.windows(2).all(|w| w[0].range.start() <= w[1].range.start()));
    }
}
