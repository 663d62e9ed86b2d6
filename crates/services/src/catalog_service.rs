use std::sync::Arc;

use serde::Serialize;

use raccoon_core::model::{Campaign, CampaignId, Catalog, ProgressState, Section, SectionId};
use raccoon_core::unlock::is_unlocked;
use storage::repository::ContentCatalog;

use crate::error::CatalogServiceError;

/// One section as the learner currently sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionView {
    pub section: Section,
    pub unlocked: bool,
    pub completed: bool,
    pub answered: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CampaignView {
    pub campaign: Campaign,
    pub unlocked: bool,
    pub completed: bool,
    pub sections: Vec<SectionView>,
}

/// Read side of the content catalog, with lock state derived per call.
#[derive(Clone)]
pub struct CatalogService {
    catalog: Arc<dyn ContentCatalog>,
}

impl CatalogService {
    #[must_use]
    pub fn new(catalog: Arc<dyn ContentCatalog>) -> Self {
        Self { catalog }
    }

    /// # Errors
    ///
    /// Returns `CatalogServiceError::Storage` if content cannot be read or is
    /// inconsistent.
    pub async fn load_catalog(&self) -> Result<Catalog, CatalogServiceError> {
        Ok(self.catalog.load_catalog().await?)
    }

    /// Lock/unlock view of the whole catalog for `state`.
    ///
    /// Campaigns chain over the global order. Sections chain within their
    /// campaign, and every section of a locked campaign is locked. Nothing is
    /// cached; call again after each answer.
    #[must_use]
    pub fn campaign_views(catalog: &Catalog, state: &ProgressState) -> Vec<CampaignView> {
        let campaign_order: Vec<CampaignId> = catalog.campaign_ids();
        catalog
            .campaigns()
            .iter()
            .map(|campaign| {
                let unlocked = is_unlocked(
                    &campaign.id,
                    &campaign_order,
                    state.completed_campaigns(),
                );
                CampaignView {
                    campaign: campaign.clone(),
                    unlocked,
                    completed: state.is_campaign_completed(campaign.id),
                    sections: Self::section_views(catalog, campaign.id, unlocked, state),
                }
            })
            .collect()
    }

    fn section_views(
        catalog: &Catalog,
        campaign: CampaignId,
        campaign_unlocked: bool,
        state: &ProgressState,
    ) -> Vec<SectionView> {
        let order: Vec<SectionId> = catalog.section_ids_of(campaign);
        catalog
            .sections_of(campaign)
            .iter()
            .map(|section| {
                let questions = catalog.questions_of(section.id);
                SectionView {
                    section: section.clone(),
                    unlocked: campaign_unlocked
                        && is_unlocked(&section.id, &order, state.completed_sections()),
                    completed: state.is_section_completed(section.id),
                    answered: questions.iter().filter(|q| state.has_answered(q.id)).count(),
                    total: questions.len(),
                }
            })
            .collect()
    }

    /// Whether a single section is open to the learner.
    #[must_use]
    pub fn is_section_unlocked(catalog: &Catalog, section: SectionId, state: &ProgressState) -> bool {
        let Some(campaign) = catalog.campaign_of(section) else {
            return false;
        };
        is_unlocked(&campaign, &catalog.campaign_ids(), state.completed_campaigns())
            && is_unlocked(
                &section,
                &catalog.section_ids_of(campaign),
                state.completed_sections(),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raccoon_core::model::{Answer, AnswerId, CatalogDocument, Question, QuestionId};
    use raccoon_core::progression::ProgressionEngine;
    use raccoon_core::time::fixed_now;
    use storage::repository::InMemoryRepository;

    fn question(id: u64, section: u64) -> Question {
        Question {
            id: QuestionId::new(id),
            section_id: SectionId::new(section),
            prompt: format!("q{id}"),
            order: 0,
            xp_value: 5,
            answers: vec![Answer {
                id: AnswerId::new(id),
                text: "yes".into(),
                is_correct: true,
            }],
        }
    }

    fn campaign(id: u64, order: i64) -> Campaign {
        Campaign {
            id: CampaignId::new(id),
            title: format!("c{id}"),
            description: None,
            order,
            thumbnail_key: None,
        }
    }

    fn section(id: u64, campaign: u64, order: i64) -> Section {
        Section {
            id: SectionId::new(id),
            campaign_id: CampaignId::new(campaign),
            title: format!("s{id}"),
            order,
        }
    }

    /// Campaign 1 = [10, 11], campaign 2 = [20]; one question per section.
    fn catalog() -> Catalog {
        Catalog::new(CatalogDocument {
            campaigns: vec![campaign(2, 2), campaign(1, 1)],
            sections: vec![section(10, 1, 1), section(11, 1, 2), section(20, 2, 1)],
            questions: vec![question(1, 10), question(2, 11), question(3, 20)],
        })
        .unwrap()
    }

    fn complete_section(state: &ProgressState, q: u64, s: u64) -> ProgressState {
        let engine = ProgressionEngine::default();
        let answered = engine
            .on_question_answered(state, QuestionId::new(q), true, 5, fixed_now())
            .state;
        engine
            .on_section_eligible_for_completion(
                &answered,
                SectionId::new(s),
                &[QuestionId::new(q)],
                40,
                fixed_now(),
            )
            .state
    }

    #[test]
    fn fresh_learner_sees_only_first_units() {
        let views = CatalogService::campaign_views(&catalog(), &ProgressState::new());
        assert_eq!(views.len(), 2);
        assert!(views[0].unlocked);
        assert!(!views[1].unlocked);
        assert!(views[0].sections[0].unlocked);
        assert!(!views[0].sections[1].unlocked);
        assert!(!views[1].sections[0].unlocked);
        assert_eq!(views[0].sections[0].total, 1);
        assert_eq!(views[0].sections[0].answered, 0);
    }

    #[test]
    fn completing_a_section_opens_the_next() {
        let state = complete_section(&ProgressState::new(), 1, 10);
        let views = CatalogService::campaign_views(&catalog(), &state);
        assert!(views[0].sections[0].completed);
        assert_eq!(views[0].sections[0].answered, 1);
        assert!(views[0].sections[1].unlocked);
        // Campaign 2 stays closed until campaign 1 is complete.
        assert!(!views[1].unlocked);
        assert!(!CatalogService::is_section_unlocked(&catalog(), SectionId::new(20), &state));
        assert!(CatalogService::is_section_unlocked(&catalog(), SectionId::new(11), &state));
    }

    #[test]
    fn unknown_section_is_locked() {
        assert!(!CatalogService::is_section_unlocked(
            &catalog(),
            SectionId::new(404),
            &ProgressState::new()
        ));
    }

    #[tokio::test]
    async fn loads_catalog_from_repository() {
        let repo = InMemoryRepository::with_catalog(catalog());
        let service = CatalogService::new(Arc::new(repo));
        let loaded = service.load_catalog().await.unwrap();
        assert_eq!(loaded, catalog());
    }
}
