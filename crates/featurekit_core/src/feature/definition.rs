//! Feature declarations and applicability decisions.

use crate::feature::context::FeatureContext;
use crate::feature::error::{BoxError, FeatureRegistryError};
use crate::page::{evaluate_predicate, predicate, PageContext, PagePredicate};
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

/// Setup routine run once per activation.
pub type FeatureInit = Rc<dyn Fn(&FeatureContext) -> Result<(), BoxError>>;

/// Auditable outcome of evaluating a feature against a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applicability {
    /// Include predicate `by` matched and no exclude predicate did.
    Qualifies { by: usize },
    /// Exclude predicate `by` matched.
    Excluded { by: usize },
    /// No include predicate matched, or none is declared.
    Indifferent,
    /// Turned off by configuration.
    Disabled,
}

impl Applicability {
    pub fn qualifies(self) -> bool {
        matches!(self, Self::Qualifies { .. })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Qualifies { .. } => "qualifies",
            Self::Excluded { .. } => "excluded",
            Self::Indifferent => "indifferent",
            Self::Disabled => "disabled",
        }
    }
}

/// Declared feature: id, include/exclude predicates and setup routine.
#[derive(Clone)]
pub struct FeatureDefinition {
    id: String,
    include: Vec<PagePredicate>,
    exclude: Vec<PagePredicate>,
    init: Option<FeatureInit>,
}

impl FeatureDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            include: Vec::new(),
            exclude: Vec::new(),
            init: None,
        }
    }

    pub fn include(mut self, check: PagePredicate) -> Self {
        self.include.push(check);
        self
    }

    pub fn include_fn(self, check: impl Fn(&PageContext) -> bool + 'static) -> Self {
        self.include(predicate(check))
    }

    pub fn exclude(mut self, check: PagePredicate) -> Self {
        self.exclude.push(check);
        self
    }

    pub fn exclude_fn(self, check: impl Fn(&PageContext) -> bool + 'static) -> Self {
        self.exclude(predicate(check))
    }

    pub fn init(
        mut self,
        setup: impl Fn(&FeatureContext) -> Result<(), BoxError> + 'static,
    ) -> Self {
        self.init = Some(Rc::new(setup));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn include_count(&self) -> usize {
        self.include.len()
    }

    pub fn exclude_count(&self) -> usize {
        self.exclude.len()
    }

    pub(crate) fn init_fn(&self) -> Option<&FeatureInit> {
        self.init.as_ref()
    }

    /// Validates declaration-level invariants.
    pub fn validate(&self) -> Result<(), FeatureRegistryError> {
        let id = self.id.trim();
        if id.is_empty() {
            return Err(FeatureRegistryError::EmptyId);
        }
        if id != self.id || !is_valid_feature_id(id) {
            return Err(FeatureRegistryError::InvalidId(self.id.clone()));
        }
        if self.init.is_none() {
            return Err(FeatureRegistryError::MissingInit(self.id.clone()));
        }
        Ok(())
    }

    /// Evaluates exclude predicates, then include predicates, in declaration
    /// order. Any exclude match disqualifies; any include match qualifies.
    pub fn applicability(&self, page: &PageContext) -> Applicability {
        for (index, check) in self.exclude.iter().enumerate() {
            if evaluate_predicate(&self.id, "exclude", index, check, page) {
                return Applicability::Excluded { by: index };
            }
        }
        for (index, check) in self.include.iter().enumerate() {
            if evaluate_predicate(&self.id, "include", index, check, page) {
                return Applicability::Qualifies { by: index };
            }
        }
        Applicability::Indifferent
    }
}

impl Debug for FeatureDefinition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureDefinition")
            .field("id", &self.id)
            .field("include", &self.include.len())
            .field("exclude", &self.exclude.len())
            .field("has_init", &self.init.is_some())
            .finish()
    }
}

/// Lower-case alphanumerics separated by single `-`, `_` or `.`.
pub(crate) fn is_valid_feature_id(value: &str) -> bool {
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_ascii_lowercase() && !first.is_ascii_digit() {
        return false;
    }

    let mut prev_separator = false;
    for c in chars {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            prev_separator = false;
        } else if matches!(c, '-' | '_' | '.') && !prev_separator {
            prev_separator = true;
        } else {
            return false;
        }
    }
    !prev_separator
}

#[cfg(test)]
mod tests {
    use super::{is_valid_feature_id, Applicability, FeatureDefinition};
    use crate::dom::Document;
    use crate::feature::error::FeatureRegistryError;
    use crate::page::PageContext;

    fn page(location: &str) -> PageContext {
        PageContext::parse(location, Document::new().into_shared()).expect("valid url")
    }

    fn is_pr(page: &PageContext) -> bool {
        page.path().contains("/pull/")
    }

    fn is_draft(page: &PageContext) -> bool {
        page.hash() == Some("draft")
    }

    #[test]
    fn any_include_qualifies() {
        let feature = FeatureDefinition::new("reviews-tab")
            .include_fn(|page| page.path().ends_with("/issues"))
            .include_fn(is_pr)
            .init(|_| Ok(()));

        assert_eq!(
            feature.applicability(&page("https://github.com/o/r/pull/1")),
            Applicability::Qualifies { by: 1 }
        );
        assert_eq!(
            feature.applicability(&page("https://github.com/o/r")),
            Applicability::Indifferent
        );
    }

    #[test]
    fn any_exclude_wins_over_include() {
        let feature = FeatureDefinition::new("copy-changes")
            .include_fn(is_pr)
            .exclude_fn(is_draft)
            .init(|_| Ok(()));

        let decision = feature.applicability(&page("https://github.com/o/r/pull/1#draft"));
        assert_eq!(decision, Applicability::Excluded { by: 0 });
        assert!(!decision.qualifies());
    }

    #[test]
    fn no_include_never_qualifies() {
        let feature = FeatureDefinition::new("opt-in").init(|_| Ok(()));

        assert_eq!(
            feature.applicability(&page("https://github.com/o/r/pull/1")),
            Applicability::Indifferent
        );
    }

    #[test]
    fn validate_rejects_bad_ids_and_missing_init() {
        assert_eq!(
            FeatureDefinition::new(" ").init(|_| Ok(())).validate(),
            Err(FeatureRegistryError::EmptyId)
        );
        assert!(matches!(
            FeatureDefinition::new("Copy Changes").init(|_| Ok(())).validate(),
            Err(FeatureRegistryError::InvalidId(_))
        ));
        assert_eq!(
            FeatureDefinition::new("copy-changes").validate(),
            Err(FeatureRegistryError::MissingInit("copy-changes".to_string()))
        );
    }

    #[test]
    fn feature_id_grammar() {
        assert!(is_valid_feature_id("auto-account-switcher"));
        assert!(is_valid_feature_id("builtin.reviews_tab2"));
        assert!(!is_valid_feature_id("-leading"));
        assert!(!is_valid_feature_id("trailing-"));
        assert!(!is_valid_feature_id("double--dash"));
        assert!(!is_valid_feature_id("Upper"));
    }
}
