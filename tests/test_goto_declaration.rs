//! Go-to-declaration tie-break between in-file and project candidates.
//!
//! One candidate in the requesting file wins over candidates elsewhere
//! unless the accuracy is `More` or `MoreTypes`.

use pharos::ide::{Accuracy, AnalysisHost};

const REMOTE: &str = r#"<?php
class Remote {
    function go() {}
}
function helper() {}
"#;

fn host_with_remote() -> AnalysisHost {
    let host = AnalysisHost::new();
    host.index_file("/lib/Remote.php", REMOTE);
    host
}

fn caret_after(text: &str, needle: &str) -> i64 {
    (text.rfind(needle).unwrap() + 1) as i64
}

#[test]
fn test_exact_prefers_in_file_candidate() {
    let text = "<?php\nfunction helper() {}\nhelper();\n";
    let host = host_with_remote();
    let file = host.set_file_content("/src/main.php", text);
    let analysis = host.analysis(file).unwrap();

    let caret = caret_after(text, "helper");
    assert_eq!(analysis.run(caret).unwrap().accuracy, Accuracy::Exact);
    assert_eq!(analysis.run(caret).unwrap().declarations.len(), 2);

    let result = analysis.goto_declaration(caret).unwrap();
    let primary = result.primary.unwrap();
    assert_eq!(primary.file, file);
    assert_eq!(primary.range.start(), (text.find("helper").unwrap() as u32).into());
    assert!(result.alternatives.is_empty());
}

#[test]
fn test_more_types_lists_every_candidate() {
    let text = r#"<?php
class Local {}
function f() {
    $o = null;
    /* @var Local|Remote $o */
    $o->missing();
}
"#;
    let host = host_with_remote();
    let file = host.set_file_content("/src/main.php", text);
    let analysis = host.analysis(file).unwrap();

    let caret = caret_after(text, "missing");
    assert_eq!(analysis.run(caret).unwrap().accuracy, Accuracy::MoreTypes);

    let result = analysis.goto_declaration(caret).unwrap();
    assert!(result.primary.is_none());
    let names: Vec<_> = result.alternatives.iter().map(|a| a.location.name.as_str()).collect();
    assert_eq!(names, vec!["Local", "Remote"]);
    assert_eq!(result.alternatives[1].label, "Remote (Remote.php)");
}

// `MoreMembers` is not excluded from the in-file preference: an override
// declared in the requesting file still wins.
#[test]
fn test_more_members_keeps_in_file_preference() {
    let text = r#"<?php
class Local {
    function go() {}
}
function f() {
    $o = null;
    /* @var Local|Remote $o */
    $o->go();
}
"#;
    let host = host_with_remote();
    let file = host.set_file_content("/src/main.php", text);
    let analysis = host.analysis(file).unwrap();

    let caret = caret_after(text, "go()");
    assert_eq!(analysis.run(caret).unwrap().accuracy, Accuracy::MoreMembers);

    let result = analysis.goto_declaration(caret).unwrap();
    assert_eq!(result.primary.unwrap().file, file);
    assert!(result.alternatives.is_empty());
}

#[test]
fn test_more_without_receiver_type_is_ambiguous() {
    let text = "<?php\nclass Local { function go() {} }\n$o->go();\n";
    let host = host_with_remote();
    let file = host.set_file_content("/src/main.php", text);
    let analysis = host.analysis(file).unwrap();

    let caret = caret_after(text, "go()");
    assert_eq!(analysis.run(caret).unwrap().accuracy, Accuracy::More);
    let result = analysis.goto_declaration(caret).unwrap();
    assert!(result.is_ambiguous());
    assert_eq!(result.alternatives.len(), 2);
}

#[test]
fn test_unknown_name_has_no_declaration() {
    let text = "<?php\nnowhere();\n";
    let host = host_with_remote();
    let file = host.set_file_content("/src/main.php", text);
    let analysis = host.analysis(file).unwrap();
    assert!(analysis.goto_declaration(caret_after(text, "nowhere")).is_none());
}

#[test]
fn test_include_path_goes_to_file() {
    let text = "<?php\nrequire_once 'lib/Remote.php';\n";
    let host = host_with_remote();
    let file = host.set_file_content("/src/main.php", text);
    let analysis = host.analysis(file).unwrap();

    let result = analysis.goto_declaration(caret_after(text, "Remote.php")).unwrap();
    let primary = result.primary.unwrap();
    assert_eq!(primary.file, host.file_id("/lib/Remote.php"));
}
