//! The ordered, short-circuiting filter chain.

use std::sync::Arc;

use benchsift_core::{
    EligibilityVerdict, FilterConfig, LanguageProfile, PullRequestCandidate, RejectionReason,
};
use benchsift_difflens::classify::FileClassifier;

use crate::filters::{
    BotAuthor, EligibilityFilter, EnglishContent, FileShapeRule, FilterContext, FilterOutcome,
    LinkedIssues, MergeDate, PatchVolume, ShapeBound,
};
use crate::patch::PatchRetriever;

/// Runs filters in order and stops at the first rejection.
///
/// Metadata filters come first, file-shape filters next and the
/// diff-dependent patch filter last.
pub struct FilterChain {
    filters: Vec<Box<dyn EligibilityFilter>>,
    config: FilterConfig,
    profile: LanguageProfile,
    classifier: FileClassifier,
    retriever: Arc<PatchRetriever>,
}

impl FilterChain {
    /// An empty chain; every candidate is accepted until filters are pushed.
    pub fn new(config: FilterConfig, profile: LanguageProfile, retriever: Arc<PatchRetriever>) -> Self {
        let classifier = FileClassifier::new(&profile, &config.data_extensions);
        Self {
            filters: Vec::new(),
            config,
            profile,
            classifier,
            retriever,
        }
    }

    /// The standard chain: bot, merge date, English, linked issues, the five
    /// file-shape bounds, then patch volume.
    pub fn standard(
        config: FilterConfig,
        profile: LanguageProfile,
        retriever: Arc<PatchRetriever>,
    ) -> Self {
        Self::new(config, profile, retriever)
            .push(BotAuthor)
            .push(MergeDate)
            .push(EnglishContent)
            .push(LinkedIssues)
            .push(FileShapeRule(ShapeBound::MinTestFiles))
            .push(FileShapeRule(ShapeBound::MaxNonTestFiles))
            .push(FileShapeRule(ShapeBound::MinTotalFiles))
            .push(FileShapeRule(ShapeBound::MaxTestFiles))
            .push(FileShapeRule(ShapeBound::MaxCodeFiles))
            .push(PatchVolume)
    }

    /// Append a filter after the existing ones.
    pub fn push(mut self, filter: impl EligibilityFilter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    /// Filter names, in evaluation order.
    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// The language profile the chain classifies with.
    pub fn profile(&self) -> &LanguageProfile {
        &self.profile
    }

    /// Evaluate one candidate.
    ///
    /// Exactly one verdict comes out; a filter error becomes a
    /// `pr_processing_error` rejection instead of propagating.
    pub async fn evaluate(&self, candidate: &PullRequestCandidate) -> EligibilityVerdict {
        let ctx = FilterContext::new(
            candidate,
            &self.config,
            &self.profile,
            &self.classifier,
            &self.retriever,
        );
        for filter in &self.filters {
            match filter.check(&ctx).await {
                Ok(FilterOutcome::Pass) => {
                    tracing::trace!(pr = candidate.number, filter = filter.name(), "passed");
                }
                Ok(FilterOutcome::Reject { reason, message }) => {
                    tracing::debug!(pr = candidate.number, filter = filter.name(), %reason, "rejected");
                    return EligibilityVerdict::rejected(reason, message);
                }
                Err(e) => {
                    tracing::warn!(pr = candidate.number, filter = filter.name(), error = %e, "filter failed");
                    return EligibilityVerdict::rejected(
                        RejectionReason::PrProcessingError,
                        format!("Exception during processing: {e}"),
                    );
                }
            }
        }
        EligibilityVerdict::accepted()
    }
}
