//! Caret to reference span through the analysis entry point.

use pharos::AnalysisConfig;
use pharos::ide::AnalysisHost;
use rstest::rstest;

const DOCUMENT: &str = r#"<?php
namespace App;

use App\Models as M;

/**
 * @param M\User|null $user
 * @method static ?Order find(int $id)
 */
class Repo {
    public function load($user) {
        require_once 'lib/boot.php';
        define('LIMIT', 10);
        /* @var $items Item[]|Bag */
        $items = [];
        echo "plain";
        return $user->save();
    }
}
"#;

fn span_at(caret: i64) -> Option<String> {
    let host = AnalysisHost::new();
    let file = host.set_file_content("/src/Repo.php", DOCUMENT);
    let analysis = host.analysis(file).unwrap();
    let range = analysis.reference_span(caret)?;
    Some(DOCUMENT[usize::from(range.start())..usize::from(range.end())].to_string())
}

fn offset_of(needle: &str, delta: usize) -> i64 {
    (DOCUMENT.find(needle).unwrap() + delta) as i64
}

#[rstest]
#[case::identifier("save", 2, "save")]
#[case::variable("$user->", 1, "$user")]
#[case::after_identifier("save(", 4, "save")]
#[case::include_path("boot.php", 0, "lib/boot.php")]
#[case::define_name("LIMIT", 0, "LIMIT")]
#[case::doc_alias_segment("M\\User", 0, "M")]
#[case::doc_class_segment("M\\User", 3, "User")]
#[case::nullable_type("?Order", 1, "Order")]
#[case::magic_method_name("find(", 1, "find")]
#[case::inline_var_variable("$items Item", 2, "$items")]
#[case::inline_var_array_type("Item[]", 1, "Item")]
#[case::inline_var_union_member("Bag */", 1, "Bag")]
fn test_reference_span(#[case] needle: &str, #[case] delta: usize, #[case] expected: &str) {
    assert_eq!(span_at(offset_of(needle, delta)).as_deref(), Some(expected));
}

#[rstest]
#[case::plain_string("\"plain\"", 2)]
#[case::keyword("public function", 2)]
#[case::doc_text("@param", 1)]
fn test_no_reference(#[case] needle: &str, #[case] delta: usize) {
    assert_eq!(span_at(offset_of(needle, delta)), None);
}

#[rstest]
#[case(-1)]
#[case(i64::MIN)]
#[case(DOCUMENT.len() as i64 + 1)]
#[case(i64::MAX)]
fn test_out_of_document_carets(#[case] caret: i64) {
    assert_eq!(span_at(caret), None);
}

#[test]
fn test_boundary_retry_is_bounded() {
    let text = format!("<?php {}", "[".repeat(10_000));
    let host = AnalysisHost::with_config(AnalysisConfig::default().with_recursion_limit(100));
    let file = host.set_file_content("/src/deep.php", &text);
    let analysis = host.analysis(file).unwrap();
    assert_eq!(analysis.reference_span(text.len() as i64), None);
    assert_eq!(analysis.reference_span(5_000), None);
}
