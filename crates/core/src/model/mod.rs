mod catalog;
mod guest;
mod ids;
mod progress;

pub use catalog::{
    Answer, Campaign, Catalog, CatalogDocument, ContentError, Question, Section,
};
pub use guest::GuestProgress;
pub use ids::{
    AnswerId, CampaignId, GuestSessionId, ParseIdError, QuestionId, SectionId, UserId,
};
pub use progress::ProgressState;

#[cfg(test)]
pub(crate) use catalog::tests as catalog_fixtures;
