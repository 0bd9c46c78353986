//! Mark-occurrences over whole documents.

use pharos::TextRange;
use pharos::ide::{Accuracy, AnalysisHost, OccurrenceKind};
use rstest::rstest;

fn marks(text: &str, needle: &str, nth: usize) -> Vec<String> {
    let host = AnalysisHost::new();
    let file = host.set_file_content("/src/main.php", text);
    let analysis = host.analysis(file).unwrap();
    let caret = text.match_indices(needle).nth(nth).unwrap().0 as i64;
    analysis
        .mark_occurrences(caret)
        .iter()
        .map(|r| slice(text, *r).to_string())
        .collect()
}

fn slice(text: &str, range: TextRange) -> &str {
    &text[usize::from(range.start())..usize::from(range.end())]
}

const CLASS: &str = r#"<?php
namespace App;

class Counter {
    const STEP = 1;
    private $count = 0;

    public function bump() {
        $this->count += self::STEP;
        return $this->count;
    }

    public static function make() {
        return new Counter();
    }
}

$c = Counter::make();
$c->bump();
"#;

#[rstest]
#[case::field("count", 0, 3)]
#[case::constant("STEP", 1, 2)]
#[case::method("bump", 1, 2)]
#[case::static_method("make", 0, 2)]
#[case::type_name("Counter", 2, 3)]
fn test_marks_every_site(#[case] needle: &str, #[case] nth: usize, #[case] expected: usize) {
    let found = marks(CLASS, needle, nth);
    assert_eq!(found.len(), expected, "{needle}: {found:?}");
    // property declarations keep their `$`
    assert!(found.iter().all(|s| s.trim_start_matches('$') == needle));
}

#[test]
fn test_marks_are_strictly_ordered() {
    let host = AnalysisHost::new();
    let file = host.set_file_content("/src/main.php", CLASS);
    let analysis = host.analysis(file).unwrap();
    let caret = CLASS.find("Counter").unwrap() as i64;
    let ranges = analysis.mark_occurrences(caret);
    assert!(ranges.windows(2).all(|w| w[0].start() < w[1].start()));
}

#[test]
fn test_variables_stay_in_their_function() {
    let text = r#"<?php
function a() { $v = 1; return $v; }
function b() { $v = 2; return $v; }
"#;
    let found = marks(text, "$v", 0);
    assert_eq!(found.len(), 2);
    let host = AnalysisHost::new();
    let file = host.set_file_content("/src/main.php", text);
    let ranges = host.analysis(file).unwrap().mark_occurrences(text.find("$v").unwrap() as i64);
    assert!(ranges.iter().all(|r| usize::from(r.end()) < text.find("function b").unwrap()));
}

#[test]
fn test_closure_capture_shares_the_variable() {
    let text = "<?php\n$n = 1;\n$f = function () use ($n) { return $n; };\n$g = fn() => $n;\n";
    assert_eq!(marks(text, "$n", 0).len(), 4);
}

#[test]
fn test_constructor_marks_instance_creations() {
    let text = "<?php\nclass Box {\n    function __construct() {}\n}\n$a = new Box();\n$b = new Box();\n";
    let found = marks(text, "__construct", 0);
    assert_eq!(found, vec!["__construct", "Box", "Box"]);
}

#[test]
fn test_include_path_is_never_marked() {
    let text = "<?php\nrequire 'lib/util.php';\nrequire 'lib/util.php';\n";
    let host = AnalysisHost::new();
    host.index_file("/src/lib/util.php", "<?php\n");
    let file = host.set_file_content("/src/main.php", text);
    let analysis = host.analysis(file).unwrap();

    let caret = text.find("util").unwrap() as i64;
    let resolution = analysis.run(caret).unwrap();
    assert_eq!(resolution.accuracy, Accuracy::Exact);
    assert!(resolution.kind.is_include_path());
    assert!(resolution.occurrences.is_empty());
    assert!(analysis.mark_occurrences(caret).is_empty());
}

#[test]
fn test_doc_type_marks_the_class() {
    let text = "<?php\nclass User {}\n/** @param User $u */\nfunction f($u) {}\nnew User();\n";
    let found = marks(text, "User", 1);
    assert_eq!(found.len(), 3);
    let host = AnalysisHost::new();
    let file = host.set_file_content("/src/main.php", text);
    let caret = text.match_indices("User").nth(1).unwrap().0 as i64;
    let resolution = host.analysis(file).unwrap().run(caret).unwrap();
    assert!(matches!(resolution.kind, OccurrenceKind::Reference(_)));
}

#[test]
fn test_ambiguous_member_marks_only_itself() {
    let text = "<?php\nclass A { function x() {} }\nclass B { function x() {} }\n$o->x();\n$o->x();\n";
    let found = marks(text, "x()", 2);
    assert_eq!(found, vec!["x"]);
}
