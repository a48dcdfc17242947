//! Current page context and page predicates.
//!
//! Predicates are supplied by the page-classification collaborator; the
//! registry only consumes their boolean answer.

use crate::dom::{NodeId, SharedDocument};
use crate::selector::{query, SelectorSyntaxError};
use log::warn;
use regex::Regex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use url::Url;

/// Boolean "does this feature apply here" decision.
pub type PagePredicate = Rc<dyn Fn(&PageContext) -> bool>;

/// Location plus document of the page being evaluated.
#[derive(Clone)]
pub struct PageContext {
    url: Url,
    document: SharedDocument,
}

impl PageContext {
    pub fn new(url: Url, document: SharedDocument) -> Self {
        Self { url, document }
    }

    pub fn parse(location: &str, document: SharedDocument) -> Result<Self, url::ParseError> {
        Ok(Self::new(Url::parse(location)?, document))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Fragment without the leading `#`.
    pub fn hash(&self) -> Option<&str> {
        self.url.fragment()
    }

    /// Non-empty path segments.
    pub fn path_segments(&self) -> Vec<&str> {
        self.url
            .path_segments()
            .map(|segments| segments.filter(|segment| !segment.is_empty()).collect())
            .unwrap_or_default()
    }

    pub fn document(&self) -> &SharedDocument {
        &self.document
    }

    pub fn element_exists(&self, selector: &str) -> Result<bool, SelectorSyntaxError> {
        let document = self.document.borrow();
        Ok(query(&document, NodeId::DOCUMENT, selector)?.is_some())
    }
}

/// Wraps a plain function as a [`PagePredicate`].
pub fn predicate(check: impl Fn(&PageContext) -> bool + 'static) -> PagePredicate {
    Rc::new(check)
}

/// Matches when the location path matches `pattern`.
pub fn path_matches(pattern: &str) -> Result<PagePredicate, regex::Error> {
    let regex = Regex::new(pattern)?;
    Ok(Rc::new(move |page: &PageContext| regex.is_match(page.path())))
}

/// Matches when the location fragment equals `hash` (without `#`).
pub fn hash_is(hash: &str) -> PagePredicate {
    let hash = hash.trim_start_matches('#').to_string();
    Rc::new(move |page: &PageContext| page.hash() == Some(hash.as_str()))
}

/// Runs one predicate, treating a panic as `false`.
pub(crate) fn evaluate_predicate(
    feature_id: &str,
    role: &str,
    index: usize,
    check: &PagePredicate,
    page: &PageContext,
) -> bool {
    match catch_unwind(AssertUnwindSafe(|| check(page))) {
        Ok(result) => result,
        Err(_) => {
            warn!(
                "event=predicate_failed module=page feature={} role={} index={} status=treated_as_false",
                feature_id, role, index
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{evaluate_predicate, hash_is, path_matches, predicate, PageContext};
    use crate::dom::{Document, ElementSpec, NodeId};

    fn page(location: &str) -> PageContext {
        PageContext::parse(location, Document::new().into_shared()).expect("valid url")
    }

    #[test]
    fn exposes_path_hash_and_segments() {
        let page = page("https://github.com/owner/repo/pull/7/files#diff-1");

        assert_eq!(page.path(), "/owner/repo/pull/7/files");
        assert_eq!(page.hash(), Some("diff-1"));
        assert_eq!(page.path_segments(), vec!["owner", "repo", "pull", "7", "files"]);
    }

    #[test]
    fn path_pattern_predicate() {
        let is_pr_files = path_matches(r"^/[^/]+/[^/]+/pull/\d+/files$").expect("valid regex");

        assert!(is_pr_files(&page("https://github.com/o/r/pull/7/files")));
        assert!(!is_pr_files(&page("https://github.com/o/r/pull/7")));
        assert!(path_matches("(").is_err());
    }

    #[test]
    fn hash_predicate_ignores_leading_hash() {
        let is_reviews = hash_is("#reviews");

        assert!(is_reviews(&page("https://github.com/o/r#reviews")));
        assert!(!is_reviews(&page("https://github.com/o/r")));
    }

    #[test]
    fn element_exists_reads_current_document() {
        let document = Document::new().into_shared();
        let page = PageContext::parse("https://github.com/o/r", document.clone()).expect("url");
        assert!(!page.element_exists(".UnderlineNav").expect("valid selector"));

        document
            .borrow_mut()
            .append_built(NodeId::DOCUMENT, &ElementSpec::new("nav").class("UnderlineNav"))
            .expect("insert nav");
        assert!(page.element_exists(".UnderlineNav").expect("valid selector"));
        assert!(page.element_exists("nav[").is_err());
    }

    #[test]
    fn panicking_predicate_evaluates_false() {
        let exploding = predicate(|_| panic!("predicate bug"));
        let target = page("https://github.com/o/r");

        assert!(!evaluate_predicate("feature", "include", 0, &exploding, &target));
    }
}
