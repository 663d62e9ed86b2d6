use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{AnswerId, CampaignId, QuestionId, SectionId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ContentError {
    #[error("{kind} {id} has an empty title")]
    EmptyTitle { kind: &'static str, id: u64 },

    #[error("question {question} must have exactly one correct answer, found {found}")]
    CorrectAnswerCount { question: QuestionId, found: usize },

    #[error("question {question} has no answer options")]
    NoAnswers { question: QuestionId },

    #[error("duplicate {kind} id {id}")]
    DuplicateId { kind: &'static str, id: u64 },

    #[error("section {section} references unknown campaign {campaign}")]
    UnknownCampaign {
        section: SectionId,
        campaign: CampaignId,
    },

    #[error("question {question} references unknown section {section}")]
    UnknownSection {
        question: QuestionId,
        section: SectionId,
    },
}

//
// ─── CONTENT TYPES ─────────────────────────────────────────────────────────────
//

/// Top-level content unit, ordered globally by `order`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub order: i64,
    /// Object-storage key of the thumbnail, resolved to a URL elsewhere.
    #[serde(default)]
    pub thumbnail_key: Option<String>,
}

/// Ordered group of questions inside a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: SectionId,
    pub campaign_id: CampaignId,
    pub title: String,
    pub order: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub id: AnswerId,
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

/// Multiple-choice question; exactly one answer is flagged correct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub section_id: SectionId,
    pub prompt: String,
    pub order: i64,
    pub xp_value: u64,
    pub answers: Vec<Answer>,
}

impl Question {
    /// # Errors
    ///
    /// Returns `ContentError` when the prompt is blank or the answer set does
    /// not contain exactly one correct option.
    pub fn validate(&self) -> Result<(), ContentError> {
        if self.prompt.trim().is_empty() {
            return Err(ContentError::EmptyTitle {
                kind: "question",
                id: self.id.value(),
            });
        }
        if self.answers.is_empty() {
            return Err(ContentError::NoAnswers { question: self.id });
        }
        let found = self.answers.iter().filter(|a| a.is_correct).count();
        if found != 1 {
            return Err(ContentError::CorrectAnswerCount {
                question: self.id,
                found,
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn correct_answer(&self) -> Option<&Answer> {
        self.answers.iter().find(|a| a.is_correct)
    }

    /// Grades a chosen option. `None` when the option is not part of this question.
    #[must_use]
    pub fn grade(&self, answer: AnswerId) -> Option<bool> {
        self.answers
            .iter()
            .find(|a| a.id == answer)
            .map(|a| a.is_correct)
    }
}

//
// ─── CATALOG ───────────────────────────────────────────────────────────────────
//

/// Serialized shape of a catalog file: flat lists, linked by ids.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogDocument {
    pub campaigns: Vec<Campaign>,
    pub sections: Vec<Section>,
    pub questions: Vec<Question>,
}

/// Validated, ordered, read-only content tree.
///
/// Campaigns are sorted by `order`, sections and questions by `order` within
/// their parent; ties fall back to id so ordering is total.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    campaigns: Vec<Campaign>,
    sections: BTreeMap<CampaignId, Vec<Section>>,
    questions: BTreeMap<SectionId, Vec<Question>>,
    question_index: HashMap<QuestionId, (SectionId, usize)>,
    section_index: HashMap<SectionId, CampaignId>,
}

impl Catalog {
    /// # Errors
    ///
    /// Returns `ContentError` for duplicate ids, dangling references, blank
    /// titles or malformed questions.
    pub fn new(document: CatalogDocument) -> Result<Self, ContentError> {
        let CatalogDocument {
            mut campaigns,
            sections,
            questions,
        } = document;

        let mut campaign_ids = HashMap::new();
        for c in &campaigns {
            if c.title.trim().is_empty() {
                return Err(ContentError::EmptyTitle {
                    kind: "campaign",
                    id: c.id.value(),
                });
            }
            if campaign_ids.insert(c.id, ()).is_some() {
                return Err(ContentError::DuplicateId {
                    kind: "campaign",
                    id: c.id.value(),
                });
            }
        }
        campaigns.sort_by_key(|c| (c.order, c.id));

        let mut by_campaign: BTreeMap<CampaignId, Vec<Section>> = BTreeMap::new();
        let mut section_index = HashMap::new();
        for s in sections {
            if s.title.trim().is_empty() {
                return Err(ContentError::EmptyTitle {
                    kind: "section",
                    id: s.id.value(),
                });
            }
            if !campaign_ids.contains_key(&s.campaign_id) {
                return Err(ContentError::UnknownCampaign {
                    section: s.id,
                    campaign: s.campaign_id,
                });
            }
            if section_index.insert(s.id, s.campaign_id).is_some() {
                return Err(ContentError::DuplicateId {
                    kind: "section",
                    id: s.id.value(),
                });
            }
            by_campaign.entry(s.campaign_id).or_default().push(s);
        }
        for list in by_campaign.values_mut() {
            list.sort_by_key(|s| (s.order, s.id));
        }

        let mut by_section: BTreeMap<SectionId, Vec<Question>> = BTreeMap::new();
        let mut seen_questions = HashMap::new();
        for q in questions {
            q.validate()?;
            if !section_index.contains_key(&q.section_id) {
                return Err(ContentError::UnknownSection {
                    question: q.id,
                    section: q.section_id,
                });
            }
            if seen_questions.insert(q.id, ()).is_some() {
                return Err(ContentError::DuplicateId {
                    kind: "question",
                    id: q.id.value(),
                });
            }
            by_section.entry(q.section_id).or_default().push(q);
        }

        let mut question_index = HashMap::new();
        for (section_id, list) in &mut by_section {
            list.sort_by_key(|q| (q.order, q.id));
            for (pos, q) in list.iter().enumerate() {
                question_index.insert(q.id, (*section_id, pos));
            }
        }

        Ok(Self {
            campaigns,
            sections: by_campaign,
            questions: by_section,
            question_index,
            section_index,
        })
    }

    /// Flatten back into the file shape (ordered).
    #[must_use]
    pub fn to_document(&self) -> CatalogDocument {
        CatalogDocument {
            campaigns: self.campaigns.clone(),
            sections: self.sections.values().flatten().cloned().collect(),
            questions: self.questions.values().flatten().cloned().collect(),
        }
    }

    #[must_use]
    pub fn campaigns(&self) -> &[Campaign] {
        &self.campaigns
    }

    #[must_use]
    pub fn campaign(&self, id: CampaignId) -> Option<&Campaign> {
        self.campaigns.iter().find(|c| c.id == id)
    }

    #[must_use]
    pub fn sections_of(&self, campaign: CampaignId) -> &[Section] {
        self.sections.get(&campaign).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn questions_of(&self, section: SectionId) -> &[Question] {
        self.questions.get(&section).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn question(&self, id: QuestionId) -> Option<&Question> {
        let (section, pos) = self.question_index.get(&id)?;
        self.questions.get(section)?.get(*pos)
    }

    #[must_use]
    pub fn section(&self, id: SectionId) -> Option<&Section> {
        let campaign = self.section_index.get(&id)?;
        self.sections_of(*campaign).iter().find(|s| s.id == id)
    }

    #[must_use]
    pub fn campaign_of(&self, section: SectionId) -> Option<CampaignId> {
        self.section_index.get(&section).copied()
    }

    #[must_use]
    pub fn campaign_ids(&self) -> Vec<CampaignId> {
        self.campaigns.iter().map(|c| c.id).collect()
    }

    #[must_use]
    pub fn section_ids_of(&self, campaign: CampaignId) -> Vec<SectionId> {
        self.sections_of(campaign).iter().map(|s| s.id).collect()
    }

    #[must_use]
    pub fn question_ids_of(&self, section: SectionId) -> Vec<QuestionId> {
        self.questions_of(section).iter().map(|q| q.id).collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn answer(id: u64, correct: bool) -> Answer {
        Answer {
            id: AnswerId::new(id),
            text: format!("option {id}"),
            is_correct: correct,
        }
    }

    pub(crate) fn question(id: u64, section: u64, order: i64) -> Question {
        Question {
            id: QuestionId::new(id),
            section_id: SectionId::new(section),
            prompt: format!("Question {id}?"),
            order,
            xp_value: 10,
            answers: vec![answer(id * 10, false), answer(id * 10 + 1, true)],
        }
    }

    /// Two campaigns; campaign 1 has sections 10 and 11, campaign 2 has section 20.
    pub(crate) fn sample_document() -> CatalogDocument {
        CatalogDocument {
            campaigns: vec![
                Campaign {
                    id: CampaignId::new(2),
                    title: "Raccoon Anatomy".into(),
                    description: None,
                    order: 2,
                    thumbnail_key: None,
                },
                Campaign {
                    id: CampaignId::new(1),
                    title: "Urban Foraging".into(),
                    description: Some("Bins and beyond".into()),
                    order: 1,
                    thumbnail_key: Some("thumbs/foraging.png".into()),
                },
            ],
            sections: vec![
                Section {
                    id: SectionId::new(11),
                    campaign_id: CampaignId::new(1),
                    title: "Lids".into(),
                    order: 2,
                },
                Section {
                    id: SectionId::new(10),
                    campaign_id: CampaignId::new(1),
                    title: "Bins".into(),
                    order: 1,
                },
                Section {
                    id: SectionId::new(20),
                    campaign_id: CampaignId::new(2),
                    title: "Paws".into(),
                    order: 1,
                },
            ],
            questions: vec![
                question(2, 10, 2),
                question(1, 10, 1),
                question(3, 11, 1),
                question(4, 20, 1),
            ],
        }
    }

    #[test]
    fn catalog_orders_by_order_key() {
        let catalog = Catalog::new(sample_document()).unwrap();
        assert_eq!(
            catalog.campaign_ids(),
            vec![CampaignId::new(1), CampaignId::new(2)]
        );
        assert_eq!(
            catalog.section_ids_of(CampaignId::new(1)),
            vec![SectionId::new(10), SectionId::new(11)]
        );
        assert_eq!(
            catalog.question_ids_of(SectionId::new(10)),
            vec![QuestionId::new(1), QuestionId::new(2)]
        );
    }

    #[test]
    fn lookups_follow_parent_links() {
        let catalog = Catalog::new(sample_document()).unwrap();
        let q = catalog.question(QuestionId::new(3)).unwrap();
        assert_eq!(q.section_id, SectionId::new(11));
        assert_eq!(catalog.campaign_of(q.section_id), Some(CampaignId::new(1)));
        assert_eq!(catalog.section(SectionId::new(20)).unwrap().title, "Paws");
        assert!(catalog.question(QuestionId::new(99)).is_none());
        assert!(catalog.sections_of(CampaignId::new(99)).is_empty());
    }

    #[test]
    fn grading_uses_the_flagged_answer() {
        let q = question(1, 10, 1);
        assert_eq!(q.grade(AnswerId::new(11)), Some(true));
        assert_eq!(q.grade(AnswerId::new(10)), Some(false));
        assert_eq!(q.grade(AnswerId::new(999)), None);
        assert_eq!(q.correct_answer().unwrap().id, AnswerId::new(11));
    }

    #[test]
    fn question_with_two_correct_answers_is_rejected() {
        let mut doc = sample_document();
        doc.questions[0].answers.push(answer(77, true));
        let err = Catalog::new(doc).unwrap_err();
        assert!(matches!(
            err,
            ContentError::CorrectAnswerCount { found: 2, .. }
        ));
    }

    #[test]
    fn dangling_section_reference_is_rejected() {
        let mut doc = sample_document();
        doc.questions.push(question(9, 999, 1));
        assert!(matches!(
            Catalog::new(doc),
            Err(ContentError::UnknownSection { .. })
        ));
    }

    #[test]
    fn duplicate_campaign_is_rejected() {
        let mut doc = sample_document();
        let dup = doc.campaigns[0].clone();
        doc.campaigns.push(dup);
        assert!(matches!(
            Catalog::new(doc),
            Err(ContentError::DuplicateId { kind: "campaign", .. })
        ));
    }

    #[test]
    fn document_round_trips_through_json() {
        let catalog = Catalog::new(sample_document()).unwrap();
        let json = serde_json::to_string(&catalog.to_document()).unwrap();
        let doc: CatalogDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(Catalog::new(doc).unwrap(), catalog);
    }
}
