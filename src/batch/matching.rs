//! Pairing test images with reference images.
//!
//! Each test image is labelled with a [`LabelRule`], then matched against
//! every reference with a [`MatchStrategy`]. What happens when a label hits
//! more than one reference (or a reference is claimed by more than one test)
//! is decided by the [`AmbiguityPolicy`].
//!
//! Pairs come out in test-discovery order, then reference-discovery order, so
//! the same listing always produces the same plan.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::label::{Label, LabelRule};

/// A reference image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Path to the image.
    pub path: PathBuf,
    /// File stem matched against.
    pub stem: String,
    /// The reference's own label, when one can be extracted.
    pub label: Option<Label>,
}

impl ImageRef {
    /// Describe a reference file.
    #[must_use]
    pub fn from_path(path: &Path, rule: &LabelRule) -> Self {
        let stem = file_stem(path);
        let label = rule.extract(&stem);
        Self {
            path: path.to_path_buf(),
            stem,
            label,
        }
    }
}

/// A labelled test image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageTest {
    /// Path to the image.
    pub path: PathBuf,
    /// File stem the label was extracted from.
    pub stem: String,
    /// Extracted label.
    pub label: Label,
}

impl ImageTest {
    /// Describe a test file, or `None` if no label can be extracted.
    #[must_use]
    pub fn from_path(path: &Path, rule: &LabelRule) -> Option<Self> {
        let stem = file_stem(path);
        let label = rule.extract(&stem)?;
        Some(Self {
            path: path.to_path_buf(),
            stem,
            label,
        })
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Predicate type for [`MatchStrategy::Custom`].
pub type MatchPredicate = Arc<dyn Fn(&ImageRef, &ImageTest) -> bool + Send + Sync>;

/// How a test label selects references.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStrategy {
    /// Reference stem contains the test label.
    #[default]
    Contains,
    /// Reference label equals the test label.
    Exact,
    /// Reference stem starts with the test label.
    Prefix,
    /// Caller-supplied predicate. Not serializable.
    #[serde(skip)]
    Custom(MatchPredicate),
}

impl MatchStrategy {
    /// Wrap a predicate.
    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&ImageRef, &ImageTest) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(predicate))
    }

    /// Whether `reference` is a match for `test`.
    #[must_use]
    pub fn matches(&self, reference: &ImageRef, test: &ImageTest) -> bool {
        match self {
            Self::Contains => reference.stem.contains(test.label.as_str()),
            Self::Exact => reference.label.as_ref() == Some(&test.label),
            Self::Prefix => reference.stem.starts_with(test.label.as_str()),
            Self::Custom(predicate) => predicate(reference, test),
        }
    }
}

impl fmt::Debug for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(_) => f.write_str("Custom(..)"),
            other => write!(f, "{other}"),
        }
    }
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contains => write!(f, "contains"),
            Self::Exact => write!(f, "exact"),
            Self::Prefix => write!(f, "prefix"),
            Self::Custom(_) => write!(f, "custom"),
        }
    }
}

impl std::str::FromStr for MatchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "contains" => Ok(Self::Contains),
            "exact" => Ok(Self::Exact),
            "prefix" => Ok(Self::Prefix),
            other => Err(format!(
                "unknown match strategy '{other}' (expected contains, exact, prefix)"
            )),
        }
    }
}

/// What to do when matching is not one-to-one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AmbiguityPolicy {
    /// Queue every matching pair.
    #[default]
    CompareAll,
    /// Fail every test involved in an ambiguous match; run the rest.
    Reject,
    /// Pair each test with its first matching reference only.
    FirstMatch,
}

impl fmt::Display for AmbiguityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CompareAll => write!(f, "all"),
            Self::Reject => write!(f, "reject"),
            Self::FirstMatch => write!(f, "first"),
        }
    }
}

impl std::str::FromStr for AmbiguityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" | "compare-all" => Ok(Self::CompareAll),
            "reject" => Ok(Self::Reject),
            "first" | "first-match" => Ok(Self::FirstMatch),
            other => Err(format!(
                "unknown ambiguity policy '{other}' (expected all, reject, first)"
            )),
        }
    }
}

/// A queued comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePair {
    /// Reference image.
    pub reference: ImageRef,
    /// Test image; its label names the output.
    pub test: ImageTest,
}

impl ImagePair {
    /// Label of the pair.
    #[must_use]
    pub fn label(&self) -> &Label {
        &self.test.label
    }
}

/// A test rejected under [`AmbiguityPolicy::Reject`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbiguousTest {
    /// The rejected test.
    pub test: ImageTest,
    /// References it matched.
    pub references: Vec<PathBuf>,
    /// Size of the largest competing group.
    pub candidates: usize,
}

/// Why a test image was not queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No label could be extracted from the filename.
    NoLabel,
    /// No reference matched the label.
    NoReference,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoLabel => write!(f, "no label in filename"),
            Self::NoReference => write!(f, "no matching reference"),
        }
    }
}

/// A test image that was not queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedTest {
    /// Path to the test image.
    pub path: PathBuf,
    /// Extracted label, if any.
    pub label: Option<Label>,
    /// Why it was skipped.
    pub reason: SkipReason,
}

/// Result of matching two listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchPlan {
    /// Pairs to evaluate, in order.
    pub pairs: Vec<ImagePair>,
    /// Tests rejected as ambiguous.
    pub ambiguous: Vec<AmbiguousTest>,
    /// Tests that were not queued.
    pub skipped: Vec<SkippedTest>,
}

impl MatchPlan {
    /// Whether nothing was queued or rejected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty() && self.ambiguous.is_empty()
    }
}

/// Pairs test images with references.
#[derive(Debug, Clone, Default)]
pub struct PairMatcher {
    rule: LabelRule,
    strategy: MatchStrategy,
    policy: AmbiguityPolicy,
}

impl PairMatcher {
    /// Create a matcher.
    #[must_use]
    pub fn new(rule: LabelRule, strategy: MatchStrategy, policy: AmbiguityPolicy) -> Self {
        Self {
            rule,
            strategy,
            policy,
        }
    }

    /// The label rule in use.
    #[must_use]
    pub fn rule(&self) -> &LabelRule {
        &self.rule
    }

    /// Match `tests` against `references`.
    #[must_use]
    pub fn plan(&self, references: &[PathBuf], tests: &[PathBuf]) -> MatchPlan {
        let references: Vec<ImageRef> = references
            .iter()
            .map(|p| ImageRef::from_path(p, &self.rule))
            .collect();

        let mut plan = MatchPlan::default();
        let mut candidates: Vec<(ImageTest, Vec<usize>)> = Vec::new();

        for path in tests {
            let Some(test) = ImageTest::from_path(path, &self.rule) else {
                debug!(path = %path.display(), "no label extracted");
                plan.skipped.push(SkippedTest {
                    path: path.clone(),
                    label: None,
                    reason: SkipReason::NoLabel,
                });
                continue;
            };

            let hits: Vec<usize> = references
                .iter()
                .enumerate()
                .filter(|(_, r)| self.strategy.matches(r, &test))
                .map(|(i, _)| i)
                .collect();

            if hits.is_empty() {
                debug!(label = %test.label, path = %path.display(), "no reference matched");
                plan.skipped.push(SkippedTest {
                    path: path.clone(),
                    label: Some(test.label),
                    reason: SkipReason::NoReference,
                });
                continue;
            }

            debug!(label = %test.label, matches = hits.len(), "matched");
            candidates.push((test, hits));
        }

        // Number of tests claiming each reference.
        let mut claims: HashMap<usize, usize> = HashMap::new();
        if self.policy == AmbiguityPolicy::Reject {
            for (_, hits) in &candidates {
                for &i in hits {
                    *claims.entry(i).or_default() += 1;
                }
            }
        }

        for (test, hits) in candidates {
            match self.policy {
                AmbiguityPolicy::CompareAll => {
                    for i in hits {
                        plan.pairs.push(ImagePair {
                            reference: references[i].clone(),
                            test: test.clone(),
                        });
                    }
                }
                AmbiguityPolicy::FirstMatch => {
                    plan.pairs.push(ImagePair {
                        reference: references[hits[0]].clone(),
                        test,
                    });
                }
                AmbiguityPolicy::Reject => {
                    let shared = hits
                        .iter()
                        .map(|i| claims.get(i).copied().unwrap_or(0))
                        .max()
                        .unwrap_or(0);
                    let group = hits.len().max(shared);
                    if group > 1 {
                        plan.ambiguous.push(AmbiguousTest {
                            references: hits.iter().map(|&i| references[i].path.clone()).collect(),
                            test,
                            candidates: group,
                        });
                    } else {
                        plan.pairs.push(ImagePair {
                            reference: references[hits[0]].clone(),
                            test,
                        });
                    }
                }
            }
        }

        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    fn pair_names(plan: &MatchPlan) -> Vec<(String, String)> {
        plan.pairs
            .iter()
            .map(|p| (p.reference.stem.clone(), p.test.stem.clone()))
            .collect()
    }

    #[test]
    fn test_contains_strategy() {
        let matcher = PairMatcher::default();
        let plan = matcher.plan(
            &paths(&["ref/A_ref.png", "ref/B_ref.png"]),
            &paths(&["test/B_test.png", "test/A_test.png"]),
        );
        assert_eq!(
            pair_names(&plan),
            vec![
                ("B_ref".to_string(), "B_test".to_string()),
                ("A_ref".to_string(), "A_test".to_string()),
            ]
        );
        assert!(plan.skipped.is_empty());
    }

    #[test]
    fn test_skips_unlabelled_and_unmatched() {
        let matcher = PairMatcher::default();
        let plan = matcher.plan(
            &paths(&["ref/A_ref.png"]),
            &paths(&["test/test.png", "test/Z_test.png"]),
        );
        assert!(plan.pairs.is_empty());
        assert_eq!(plan.skipped.len(), 2);
        assert_eq!(plan.skipped[0].reason, SkipReason::NoLabel);
        assert_eq!(plan.skipped[1].reason, SkipReason::NoReference);
        assert_eq!(plan.skipped[1].label.as_ref().unwrap().as_str(), "Z");
    }

    #[test]
    fn test_scene_name_containing_marker_word() {
        let matcher = PairMatcher::default();
        let plan = matcher.plan(
            &paths(&["ref/LavaRoom_Reference.png", "ref/Latest_Kitchen_Reference.png"]),
            &paths(&["test/Latest_Kitchen_GI-1.1.1_1684_0.016680Reflection.png"]),
        );
        assert_eq!(
            pair_names(&plan),
            vec![(
                "Latest_Kitchen_Reference".to_string(),
                "Latest_Kitchen_GI-1.1.1_1684_0.016680Reflection".to_string()
            )]
        );
        assert!(plan.ambiguous.is_empty());
    }

    #[test]
    fn test_exact_and_prefix() {
        let rule = LabelRule::default().with_end_markers(["_ref", "_test"]);
        let refs = paths(&["Kitchen_ref.png", "BigKitchen_ref.png"]);
        let tests = paths(&["Kitchen_test.png"]);

        let exact = PairMatcher::new(rule.clone(), MatchStrategy::Exact, AmbiguityPolicy::CompareAll);
        assert_eq!(exact.plan(&refs, &tests).pairs.len(), 1);

        let prefix = PairMatcher::new(rule.clone(), MatchStrategy::Prefix, AmbiguityPolicy::CompareAll);
        let plan = prefix.plan(&refs, &tests);
        assert_eq!(plan.pairs.len(), 1);
        assert_eq!(plan.pairs[0].reference.stem, "Kitchen_ref");

        let contains = PairMatcher::new(rule, MatchStrategy::Contains, AmbiguityPolicy::CompareAll);
        assert_eq!(contains.plan(&refs, &tests).pairs.len(), 2);
    }

    #[test]
    fn test_custom_strategy() {
        let strategy = MatchStrategy::custom(|r, t| r.stem.len() == t.stem.len());
        let matcher = PairMatcher::new(LabelRule::default(), strategy, AmbiguityPolicy::CompareAll);
        let plan = matcher.plan(&paths(&["abcdef.png", "xy.png"]), &paths(&["Q_test.png"]));
        assert_eq!(pair_names(&plan), vec![("abcdef".to_string(), "Q_test".to_string())]);
    }

    #[test]
    fn test_policies_on_shared_reference() {
        let refs = paths(&["ref/Scene_ref.png"]);
        let tests = paths(&["test/Scene_test_1.png", "test/Scene_test_2.png"]);

        let all = PairMatcher::new(LabelRule::default(), MatchStrategy::Contains, AmbiguityPolicy::CompareAll);
        assert_eq!(all.plan(&refs, &tests).pairs.len(), 2);

        let first = PairMatcher::new(LabelRule::default(), MatchStrategy::Contains, AmbiguityPolicy::FirstMatch);
        assert_eq!(first.plan(&refs, &tests).pairs.len(), 2);

        let reject = PairMatcher::new(LabelRule::default(), MatchStrategy::Contains, AmbiguityPolicy::Reject);
        let plan = reject.plan(&refs, &tests);
        assert!(plan.pairs.is_empty());
        assert_eq!(plan.ambiguous.len(), 2);
        assert_eq!(plan.ambiguous[0].candidates, 2);
    }

    #[test]
    fn test_policies_on_multiple_references() {
        let refs = paths(&["A_ref_1.png", "A_ref_2.png", "B_ref.png"]);
        let tests = paths(&["A_test.png", "B_test.png"]);

        let first = PairMatcher::new(LabelRule::default(), MatchStrategy::Contains, AmbiguityPolicy::FirstMatch);
        assert_eq!(
            pair_names(&first.plan(&refs, &tests)),
            vec![
                ("A_ref_1".to_string(), "A_test".to_string()),
                ("B_ref".to_string(), "B_test".to_string()),
            ]
        );

        let reject = PairMatcher::new(LabelRule::default(), MatchStrategy::Contains, AmbiguityPolicy::Reject);
        let plan = reject.plan(&refs, &tests);
        assert_eq!(pair_names(&plan), vec![("B_ref".to_string(), "B_test".to_string())]);
        assert_eq!(plan.ambiguous.len(), 1);
        assert_eq!(plan.ambiguous[0].references.len(), 2);
    }

    #[test]
    fn test_plan_is_deterministic() {
        let matcher = PairMatcher::default();
        let refs = paths(&["X_a.png", "X_b.png", "Y.png"]);
        let tests = paths(&["X_test.png", "Y_test.png"]);
        assert_eq!(matcher.plan(&refs, &tests), matcher.plan(&refs, &tests));
    }

    #[test]
    fn test_parse_strategy_and_policy() {
        assert!(matches!("Exact".parse::<MatchStrategy>(), Ok(MatchStrategy::Exact)));
        assert!("fuzzy".parse::<MatchStrategy>().is_err());
        assert_eq!("reject".parse::<AmbiguityPolicy>(), Ok(AmbiguityPolicy::Reject));
        assert_eq!("first".parse::<AmbiguityPolicy>(), Ok(AmbiguityPolicy::FirstMatch));
        assert_eq!(AmbiguityPolicy::CompareAll.to_string(), "all");
    }
}
