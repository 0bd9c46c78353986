//! Go-to-declaration.
//!
//! Turns an [`Occurrence`] into either one primary location or a list of
//! alternatives the user has to choose from.

use smol_str::SmolStr;
use tracing::trace;

use super::occurrences::{Accuracy, Occurrence};
use crate::base::{FileId, TextRange};
use crate::hir::{DeclFamily, Declaration, Resolver, ScopeModel};

/// A declaration site.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Location {
    pub file: FileId,
    /// Range of the declared name.
    pub range: TextRange,
    /// Qualified name of the declared element.
    pub name: SmolStr,
}

/// One entry of a disambiguation list.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AlternativeLocation {
    pub location: Location,
    /// Enclosing type (or the element itself) plus the file's display name,
    /// e.g. `App\User (User.php)`.
    pub label: String,
}

/// Result of go-to-declaration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GotoResult {
    /// Set when one declaration wins; `alternatives` is then empty.
    pub primary: Option<Location>,
    /// Sorted by display name; empty when `primary` is set.
    pub alternatives: Vec<AlternativeLocation>,
}

impl GotoResult {
    pub fn is_ambiguous(&self) -> bool {
        self.primary.is_none()
    }
}

/// Where the declaration of `occurrence` is.
///
/// One candidate is always the primary. With several, a single candidate in
/// `request_file` wins unless the accuracy is [`Accuracy::More`] or
/// [`Accuracy::MoreTypes`]; [`Accuracy::MoreMembers`] keeps the in-file
/// preference. Everything else yields the full alternative list.
pub fn goto_declaration(occurrence: &Occurrence<'_>, request_file: FileId) -> Option<GotoResult> {
    let mut candidates: Vec<&Declaration> = occurrence.declarations().collect();
    if candidates.len() > 1 && candidates.iter().any(|d| d.family() != DeclFamily::UseAlias) {
        candidates.retain(|d| d.family() != DeclFamily::UseAlias);
    }

    match candidates.as_slice() {
        [] => return None,
        [only] => {
            let location = location(only)?;
            return Some(GotoResult {
                primary: Some(location),
                alternatives: Vec::new(),
            });
        }
        _ => {}
    }

    let accuracy = occurrence.accuracy();
    let in_file: Vec<_> = candidates.iter().filter(|d| d.file == Some(request_file)).collect();
    if in_file.len() == 1 && !matches!(accuracy, Accuracy::More | Accuracy::MoreTypes) {
        if let Some(location) = location(in_file[0]) {
            trace!(name = %location.name, ?accuracy, "in-file declaration wins");
            return Some(GotoResult {
                primary: Some(location),
                alternatives: Vec::new(),
            });
        }
    }

    let model = occurrence.model();
    let resolver = Resolver::new(model);
    let mut alternatives: Vec<AlternativeLocation> = candidates
        .iter()
        .filter_map(|decl| {
            let location = location(decl)?;
            let label = label(model, &resolver, decl);
            Some(AlternativeLocation { location, label })
        })
        .collect();
    if alternatives.is_empty() {
        return None;
    }
    alternatives.sort_by(|a, b| {
        a.location
            .name
            .to_lowercase()
            .cmp(&b.location.name.to_lowercase())
            .then_with(|| a.label.cmp(&b.label))
    });
    Some(GotoResult {
        primary: None,
        alternatives,
    })
}

fn location(decl: &Declaration) -> Option<Location> {
    Some(Location {
        file: decl.file?,
        range: decl.name_range,
        name: SmolStr::new(decl.display_name()),
    })
}

fn label(model: &ScopeModel, resolver: &Resolver<'_>, decl: &Declaration) -> String {
    let owner = if decl.family().is_member() {
        resolver
            .owner_type(decl)
            .map(|ty| ty.qualified_name.clone())
            .or_else(|| decl.owner.clone())
    } else {
        None
    };
    let element = owner.unwrap_or_else(|| decl.qualified_name.clone());
    let file = decl
        .file
        .and_then(|file| model.source_root().display_name(file))
        .unwrap_or("?");
    format!("{} ({})", element.trim_start_matches('\\'), file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::TextSize;
    use crate::hir::{ProjectIndex, lower_file};
    use crate::ide::OccurrenceResolver;
    use crate::syntax::{lex, parse};

    const CURRENT: FileId = FileId::new(0);

    fn model(text: &str, others: &[(&str, &str)]) -> ScopeModel {
        let mut project = ProjectIndex::new();
        for (i, (path, source)) in others.iter().enumerate() {
            project.index_file(FileId::new(i as u32 + 1), *path, source);
        }
        let tokens = lex(text);
        let ast = parse(&tokens);
        lower_file(CURRENT, "/src/main.php", &tokens, &ast, &project)
    }

    fn goto(model: &ScopeModel, text: &str, needle: &str) -> (Accuracy, Option<GotoResult>) {
        let start = text.rfind(needle).unwrap();
        let span = TextRange::at(TextSize::from(start as u32), TextSize::of(needle));
        let occurrence = OccurrenceResolver::new(model).occurrence_at(span).unwrap();
        (occurrence.accuracy(), goto_declaration(&occurrence, CURRENT))
    }

    #[test]
    fn test_single_candidate_is_primary() {
        let text = "<?php\nfunction helper() {}\nhelper();\n";
        let model = model(text, &[]);
        let (_, result) = goto(&model, text, "helper");
        let result = result.unwrap();
        assert_eq!(result.primary.unwrap().name, "helper");
        assert!(result.alternatives.is_empty());
    }

    #[test]
    fn test_exact_in_file_candidate_wins() {
        let text = "<?php\nclass Shared {}\nnew Shared();\n";
        let model = model(text, &[("/lib/Shared.php", "<?php\nclass Shared {}\n")]);
        let (accuracy, result) = goto(&model, text, "Shared");
        assert_eq!(accuracy, Accuracy::Exact);
        let result = result.unwrap();
        assert_eq!(result.primary.unwrap().file, CURRENT);
        assert!(result.alternatives.is_empty());
    }

    #[test]
    fn test_unresolved_name_has_no_declaration() {
        let text = "<?php\nmissing();\n";
        let model = model(text, &[]);
        let start = text.find("missing").unwrap();
        let span = TextRange::at(TextSize::from(start as u32), TextSize::of("missing"));
        assert!(OccurrenceResolver::new(&model).occurrence_at(span).is_none());
    }

    #[test]
    fn test_alternatives_are_labelled_and_sorted() {
        let text = "<?php\n$o->go();\n";
        let model = model(
            text,
            &[
                ("/lib/Zed.php", "<?php\nclass Zed { function go() {} }\n"),
                ("/lib/Alpha.php", "<?php\nclass Alpha { function go() {} }\n"),
            ],
        );
        let (accuracy, result) = goto(&model, text, "go");
        assert_eq!(accuracy, Accuracy::More);
        let result = result.unwrap();
        assert!(result.is_ambiguous());
        let labels: Vec<_> = result.alternatives.iter().map(|a| a.label.as_str()).collect();
        assert_eq!(labels, vec!["Alpha (Alpha.php)", "Zed (Zed.php)"]);
    }
}
