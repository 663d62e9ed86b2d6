use std::collections::BTreeSet;

use raccoon_core::model::{
    Answer, AnswerId, Campaign, CampaignId, Catalog, CatalogDocument, GuestSessionId,
    ProgressState, Question, QuestionId, Section, SectionId, UserId,
};
use raccoon_core::time::fixed_now;
use storage::repository::{
    ContentCatalog, ProgressRepository, SectionCompletionDelta, StorageError,
};
use storage::sqlite::SqliteRepository;

async fn connect(name: &str) -> SqliteRepository {
    let repo = SqliteRepository::connect(&format!("sqlite:file:{name}?mode=memory&cache=shared"))
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn user() -> UserId {
    UserId::new("learner-7").unwrap()
}

fn question(id: u64, section: u64, order: i64, xp: u64) -> Question {
    Question {
        id: QuestionId::new(id),
        section_id: SectionId::new(section),
        prompt: format!("Where do raccoons sleep? ({id})"),
        order,
        xp_value: xp,
        answers: vec![
            Answer {
                id: AnswerId::new(id * 10),
                text: "In a nest".into(),
                is_correct: false,
            },
            Answer {
                id: AnswerId::new(id * 10 + 1),
                text: "In a den".into(),
                is_correct: true,
            },
        ],
    }
}

fn catalog() -> Catalog {
    Catalog::new(CatalogDocument {
        campaigns: vec![
            Campaign {
                id: CampaignId::new(2),
                title: "Night shift".into(),
                description: None,
                order: 2,
                thumbnail_key: Some("thumbs/night.png".into()),
            },
            Campaign {
                id: CampaignId::new(1),
                title: "Trash pandas 101".into(),
                description: Some("Basics".into()),
                order: 1,
                thumbnail_key: None,
            },
        ],
        sections: vec![
            Section {
                id: SectionId::new(11),
                campaign_id: CampaignId::new(1),
                title: "Dens".into(),
                order: 2,
            },
            Section {
                id: SectionId::new(10),
                campaign_id: CampaignId::new(1),
                title: "Diet".into(),
                order: 1,
            },
            Section {
                id: SectionId::new(20),
                campaign_id: CampaignId::new(2),
                title: "Foraging".into(),
                order: 1,
            },
        ],
        questions: vec![
            question(2, 10, 2, 15),
            question(1, 10, 1, 10),
            question(3, 11, 1, 10),
            question(4, 20, 1, 25),
        ],
    })
    .unwrap()
}

#[tokio::test]
async fn imported_catalog_reads_back_in_display_order() {
    let repo = connect("memdb_catalog_order").await;
    let imported = catalog();
    repo.import_catalog(&imported).await.unwrap();

    let campaigns = repo.list_campaigns().await.unwrap();
    let ids: Vec<_> = campaigns.iter().map(|c| c.id.value()).collect();
    assert_eq!(ids, vec![1, 2]);

    let sections = repo.list_sections(CampaignId::new(1)).await.unwrap();
    let ids: Vec<_> = sections.iter().map(|s| s.id.value()).collect();
    assert_eq!(ids, vec![10, 11]);

    let questions = repo.list_questions(SectionId::new(10)).await.unwrap();
    assert_eq!(questions.len(), 2);
    assert_eq!(questions[0].id, QuestionId::new(1));
    assert_eq!(questions[1].xp_value, 15);
    assert_eq!(questions[0].answers.len(), 2);

    let loaded = repo.load_catalog().await.unwrap();
    assert_eq!(loaded, imported);
}

#[tokio::test]
async fn reimport_replaces_content() {
    let repo = connect("memdb_catalog_reimport").await;
    repo.import_catalog(&catalog()).await.unwrap();

    let mut doc = catalog().to_document();
    doc.questions.retain(|q| q.id != QuestionId::new(4));
    doc.sections.retain(|s| s.id != SectionId::new(20));
    doc.campaigns.retain(|c| c.id != CampaignId::new(2));
    repo.import_catalog(&Catalog::new(doc).unwrap()).await.unwrap();

    assert_eq!(repo.list_campaigns().await.unwrap().len(), 1);
    assert!(repo.list_sections(CampaignId::new(2)).await.unwrap().is_empty());
}

#[tokio::test]
async fn progress_versions_and_conflicts() {
    let repo = connect("memdb_progress_versions").await;

    let err = repo.load_progress(&user()).await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound));

    let initial = ProgressState::new();
    assert_eq!(repo.save_progress(&user(), &initial, None).await.unwrap(), 1);

    let guest = GuestSessionId::generate();
    let next = ProgressState::from_persisted(
        40,
        2,
        Some(fixed_now()),
        [QuestionId::new(1), QuestionId::new(2)].into_iter().collect(),
        [SectionId::new(10)].into_iter().collect(),
        BTreeSet::new(),
        [guest].into_iter().collect(),
    );
    assert_eq!(repo.save_progress(&user(), &next, Some(1)).await.unwrap(), 2);

    // The same write re-sent after it landed is accepted without a bump.
    assert_eq!(repo.save_progress(&user(), &next, Some(1)).await.unwrap(), 2);

    // A different write from a stale reader is rejected.
    let stale = repo.save_progress(&user(), &initial, Some(1)).await;
    assert!(matches!(stale, Err(StorageError::Conflict)));

    let record = repo.load_progress(&user()).await.unwrap();
    assert_eq!(record.version, 2);
    assert_eq!(record.state, next);
}

#[tokio::test]
async fn stored_nulls_are_discarded_on_read() {
    let repo = connect("memdb_progress_nulls").await;
    sqlx::query(
        r"
        INSERT INTO user_progress (
            user_id, total_xp, streak, last_activity_at, answered_questions,
            completed_sections, completed_campaigns, merged_guest_sessions, version, updated_at
        )
        VALUES ('learner-7', 30, 1, NULL, '[1,null,3]', '[null]', '[]', '[null]', 4, '2023-11-14T22:13:20Z')
        ",
    )
    .execute(repo.pool())
    .await
    .unwrap();

    let record = repo.load_progress(&user()).await.unwrap();
    assert_eq!(record.version, 4);
    assert_eq!(record.state.total_xp(), 30);
    let answered: Vec<_> = record.state.answered_questions().iter().map(|q| q.value()).collect();
    assert_eq!(answered, vec![1, 3]);
    assert!(record.state.completed_sections().is_empty());
    assert!(record.state.merged_guest_sessions().is_empty());
}

#[tokio::test]
async fn completion_rows_union_merge() {
    let repo = connect("memdb_completion_rows").await;
    let section = SectionId::new(10);

    repo.upsert_section_completion(
        &user(),
        section,
        &SectionCompletionDelta {
            answered_question_ids: [QuestionId::new(1)].into_iter().collect(),
            completed: false,
        },
    )
    .await
    .unwrap();
    let row = repo
        .upsert_section_completion(
            &user(),
            section,
            &SectionCompletionDelta {
                answered_question_ids: [QuestionId::new(1), QuestionId::new(2)]
                    .into_iter()
                    .collect(),
                completed: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(row.correct_count, 2);
    assert!(row.completed);

    let rows = repo.load_section_completion_rows(&user()).await.unwrap();
    assert_eq!(rows, vec![row]);

    repo.upsert_campaign_completion(&user(), CampaignId::new(1))
        .await
        .unwrap();
    repo.upsert_campaign_completion(&user(), CampaignId::new(1))
        .await
        .unwrap();
    let campaigns = repo.load_campaign_completion_rows(&user()).await.unwrap();
    assert_eq!(campaigns.len(), 1);
    assert!(campaigns[0].completed);
}
