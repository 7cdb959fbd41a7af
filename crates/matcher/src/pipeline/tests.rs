use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use index::{IndexError, SearchHit};
use serde_json::{json, Value};

use crate::corpus::{BookAnswer, PracticeQuestion, PracticeSet, SetStatus};

/// Reference double: counts calls and replays a fixed answer.
struct FakeReference {
    calls: AtomicUsize,
    queries: Mutex<Vec<String>>,
    answer: Result<Vec<SearchHit>, IndexError>,
}

impl FakeReference {
    fn returning(hits: Vec<SearchHit>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
            answer: Ok(hits),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
            answer: Err(IndexError::backend("connection refused")),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReferenceSearch for FakeReference {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, MatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.to_string());
        self.answer
            .clone()
            .map(|hits| hits.into_iter().take(limit).collect())
            .map_err(MatchError::from)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct BankCall {
    keywords: Vec<String>,
    domain: Option<String>,
    exclude_id: Option<String>,
    limit: usize,
}

struct FakeBank {
    calls: Mutex<Vec<BankCall>>,
    answer: Result<Vec<SearchHit>, IndexError>,
}

impl FakeBank {
    fn returning(hits: Vec<SearchHit>) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            answer: Ok(hits),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            answer: Err(IndexError::backend("timeout")),
        })
    }

    fn calls(&self) -> Vec<BankCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl QuestionBankSearch for FakeBank {
    async fn search(
        &self,
        keywords: &[String],
        domain: Option<&str>,
        exclude_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SearchHit>, MatchError> {
        self.calls.lock().unwrap().push(BankCall {
            keywords: keywords.to_vec(),
            domain: domain.map(str::to_string),
            exclude_id: exclude_id.map(str::to_string),
            limit,
        });
        self.answer.clone().map_err(MatchError::from)
    }
}

#[derive(Default)]
struct RecordingMetrics {
    stages: Mutex<Vec<(Stage, StageOutcome)>>,
}

impl RemediationMetrics for RecordingMetrics {
    fn record_stage(&self, stage: Stage, _latency: Duration, outcome: StageOutcome) {
        self.stages.lock().unwrap().push((stage, outcome));
    }
}

fn hit(id: &str, payload: Value) -> SearchHit {
    SearchHit {
        id: id.into(),
        score: 0.9,
        metadata: payload,
    }
}

fn question(id: &str, content: &str) -> PracticeQuestion {
    PracticeQuestion {
        id: id.into(),
        headline: format!("Headline {id}"),
        subheadline: None,
        content: content.into(),
        book_answer: None,
        keywords: vec![],
        tags: vec![],
        domain: None,
    }
}

fn corpus() -> Arc<Corpus> {
    let mut cited = question("base-3", "Scanning strategies for hemianopsia");
    cited.book_answer = Some(BookAnswer {
        title: "Visual perception".into(),
        excerpt: "Teach compensatory scanning toward the affected field.".into(),
        source: Some("Pedretti".into()),
    });
    Arc::new(Corpus::new(vec![
        PracticeSet {
            id: "otr-baseline".into(),
            title: "OTR Baseline Practice Test".into(),
            description: String::new(),
            status: SetStatus::Available,
            questions: vec![
                question("base-1", "Tenodesis grasp and splint wear after C6 injury"),
                question("base-2", "Splint schedule for edema"),
                cited,
            ],
        },
        PracticeSet {
            id: "otr-set-4".into(),
            title: "OTR Practice Test 4".into(),
            description: String::new(),
            status: SetStatus::InProgress,
            questions: vec![question("four-1", "Splint for boutonniere deformity")],
        },
    ]))
}

fn pipeline(config: PipelineConfig) -> RemediationPipeline {
    RemediationPipeline::new(config, corpus()).unwrap()
}

fn ids(response: &RemediationResponse) -> Vec<&str> {
    response.items.iter().map(|i| i.id.as_str()).collect()
}

#[tokio::test]
async fn fixture_wins_over_everything() {
    let reference = FakeReference::returning(vec![hit("ref-1", json!({}))]);
    let bank = FakeBank::returning(vec![hit("bank-1", json!({}))]);
    let pipeline = pipeline(PipelineConfig {
        fixture: true,
        ..PipelineConfig::default()
    })
    .with_reference(reference.clone())
    .with_question_bank(bank.clone());

    let requests = vec![
        RemediationRequest::default(),
        RemediationRequest::with_keywords(["splint"]),
        RemediationRequest {
            prompt: Some("   ".into()),
            limit: Some(-3.0),
            ..RemediationRequest::default()
        },
    ];
    for request in requests {
        let response = pipeline.resolve(&request).await;
        assert_eq!(
            response.items,
            vec![RemediationItem {
                id: FIXTURE_ID.into(),
                title: Some(FIXTURE_TITLE.into()),
                excerpt: FIXTURE_EXCERPT.into(),
                source: Some(FIXTURE_SOURCE.into()),
            }]
        );
    }
    assert_eq!(reference.calls(), 0);
    assert!(bank.calls().is_empty());
}

#[tokio::test]
async fn fixture_echoes_question_id() {
    let pipeline = pipeline(PipelineConfig {
        fixture: true,
        ..PipelineConfig::default()
    });
    let request = RemediationRequest {
        question_id: Some("q-42".into()),
        ..RemediationRequest::default()
    };
    assert_eq!(ids(&pipeline.resolve(&request).await), vec!["q-42"]);
}

#[test]
fn fixture_respects_limit() {
    assert_eq!(fixture_items(None, 3).len(), 1);
    assert!(fixture_items(None, 0).is_empty());
}

#[tokio::test]
async fn empty_input_short_circuits_without_calls() {
    let reference = FakeReference::returning(vec![hit("ref-1", json!({}))]);
    let bank = FakeBank::returning(vec![hit("bank-1", json!({}))]);
    let metrics = Arc::new(RecordingMetrics::default());
    let pipeline = pipeline(PipelineConfig::default())
        .with_reference(reference.clone())
        .with_question_bank(bank.clone())
        .with_metrics(metrics.clone());

    let response = pipeline.resolve(&RemediationRequest::default()).await;
    assert!(response.items.is_empty());

    // Short prompt tokens and blank keywords derive nothing either.
    let request = RemediationRequest {
        keywords: vec!["  ".into()],
        prompt: Some("an ox is big".into()),
        domain: Some("   ".into()),
        ..RemediationRequest::default()
    };
    assert!(pipeline.resolve(&request).await.items.is_empty());

    assert_eq!(reference.calls(), 0);
    assert!(bank.calls().is_empty());
    assert!(metrics.stages.lock().unwrap().is_empty());
}

#[tokio::test]
async fn reference_hit_skips_later_stages() {
    let reference = FakeReference::returning(vec![hit(
        "chunk-7",
        json!({ "meta_title": "Case-Smith ch. 9", "text": "Splints position the hand.", "source_file": "case-smith.pdf" }),
    )]);
    let bank = FakeBank::returning(vec![hit("bank-1", json!({ "stem": "Bank stem" }))]);
    let metrics = Arc::new(RecordingMetrics::default());
    let pipeline = pipeline(PipelineConfig::default())
        .with_reference(reference.clone())
        .with_question_bank(bank.clone())
        .with_metrics(metrics.clone());

    let response = pipeline
        .resolve(&RemediationRequest::with_keywords(["splint"]))
        .await;

    assert_eq!(
        response.items,
        vec![RemediationItem {
            id: "chunk-7".into(),
            title: Some("Case-Smith ch. 9".into()),
            excerpt: "Splints position the hand.".into(),
            source: Some("case-smith.pdf".into()),
        }]
    );
    assert_eq!(reference.calls(), 1);
    assert!(bank.calls().is_empty());
    assert_eq!(
        *metrics.stages.lock().unwrap(),
        vec![(Stage::Reference, StageOutcome::Hit(1))]
    );
}

#[tokio::test]
async fn reference_query_joins_prompt_and_keywords() {
    let reference = FakeReference::returning(vec![]);
    let pipeline = pipeline(PipelineConfig::default()).with_reference(reference.clone());

    let request = RemediationRequest {
        keywords: vec!["Splint".into(), "edema".into()],
        prompt: Some("  Hand therapy after injury ".into()),
        ..RemediationRequest::default()
    };
    pipeline.resolve(&request).await;
    assert_eq!(
        *reference.queries.lock().unwrap(),
        vec!["Hand therapy after injury  splint edema".to_string()]
    );
}

#[tokio::test]
async fn long_reference_excerpt_is_cut_to_400_chars() {
    let reference = FakeReference::returning(vec![hit(
        "chunk-1",
        json!({ "chunk_meta_excerpt": "e".repeat(900) }),
    )]);
    let pipeline = pipeline(PipelineConfig::default()).with_reference(reference);

    let response = pipeline
        .resolve(&RemediationRequest::with_keywords(["edema"]))
        .await;
    assert_eq!(response.items[0].excerpt.chars().count(), 400);
    assert_eq!(response.items[0].title.as_deref(), Some("Reference excerpt"));
}

#[tokio::test]
async fn reference_failure_falls_through_to_question_bank() {
    let reference = FakeReference::failing();
    let bank = FakeBank::returning(vec![hit(
        "bank-9",
        json!({ "stem": "A client with C6 tetraplegia...", "rationale": "Tenodesis allows grasp." }),
    )]);
    let metrics = Arc::new(RecordingMetrics::default());
    let pipeline = pipeline(PipelineConfig::default())
        .with_reference(reference.clone())
        .with_question_bank(bank.clone())
        .with_metrics(metrics.clone());

    let request = RemediationRequest {
        question_id: Some(" base-1 ".into()),
        keywords: vec!["tenodesis".into()],
        domain: Some(" Intervention ".into()),
        limit: Some(2.0),
        ..RemediationRequest::default()
    };
    let response = pipeline.resolve(&request).await;

    assert_eq!(ids(&response), vec!["bank-9"]);
    assert_eq!(response.items[0].excerpt, "Tenodesis allows grasp.");
    assert_eq!(
        response.items[0].title.as_deref(),
        Some("A client with C6 tetraplegia...")
    );
    assert_eq!(
        bank.calls(),
        vec![BankCall {
            keywords: vec!["tenodesis".into()],
            domain: Some("Intervention".into()),
            exclude_id: Some("base-1".into()),
            limit: 2,
        }]
    );
    assert_eq!(
        *metrics.stages.lock().unwrap(),
        vec![
            (Stage::Reference, StageOutcome::Failed),
            (Stage::QuestionBank, StageOutcome::Hit(1)),
        ]
    );
}

#[tokio::test]
async fn failing_vector_stages_fall_back_to_keyword_ranking() {
    let reference = FakeReference::failing();
    let bank = FakeBank::failing();
    let pipeline = pipeline(PipelineConfig::default())
        .with_reference(reference.clone())
        .with_question_bank(bank.clone());

    let response = pipeline
        .resolve(&RemediationRequest::with_keywords(["splint", "tenodesis", "grasp"]))
        .await;

    assert_eq!(ids(&response), vec!["base-1", "base-2"]);
    assert_eq!(reference.calls(), 1);
    assert_eq!(bank.calls().len(), 1);
}

#[tokio::test]
async fn unconfigured_question_bank_is_skipped() {
    let reference = FakeReference::returning(vec![]);
    let metrics = Arc::new(RecordingMetrics::default());
    let pipeline = pipeline(PipelineConfig::default())
        .with_reference(reference)
        .with_metrics(metrics.clone());

    let response = pipeline
        .resolve(&RemediationRequest::with_keywords(["hemianopsia"]))
        .await;

    assert_eq!(
        response.items,
        vec![RemediationItem {
            id: "base-3".into(),
            title: Some("Visual perception".into()),
            excerpt: "Teach compensatory scanning toward the affected field.".into(),
            source: Some("Pedretti".into()),
        }]
    );
    assert_eq!(
        *metrics.stages.lock().unwrap(),
        vec![
            (Stage::Reference, StageOutcome::Empty),
            (Stage::LocalKeyword, StageOutcome::Hit(1)),
        ]
    );
}

#[tokio::test]
async fn local_ranking_orders_by_overlap() {
    let pipeline = pipeline(PipelineConfig::default());
    let response = pipeline
        .resolve(&RemediationRequest::with_keywords(["splint", "edema", "sensory"]))
        .await;
    // base-2 has two terms, base-1 and four-1 (not available) one.
    assert_eq!(ids(&response), vec!["base-2", "base-1"]);
}

#[tokio::test]
async fn local_ranking_excludes_current_question() {
    let pipeline = pipeline(PipelineConfig::default());
    let request = RemediationRequest {
        question_id: Some("base-2".into()),
        keywords: vec!["splint".into()],
        ..RemediationRequest::default()
    };
    assert_eq!(ids(&pipeline.resolve(&request).await), vec!["base-1"]);
}

#[tokio::test]
async fn test_id_scopes_the_local_pool() {
    let pipeline = pipeline(PipelineConfig::default());
    let scoped = RemediationRequest {
        keywords: vec!["splint".into()],
        test_id: Some("otr-set-4".into()),
        ..RemediationRequest::default()
    };
    let response = pipeline.resolve(&scoped).await;
    assert_eq!(ids(&response), vec!["four-1"]);
    assert_eq!(response.items[0].source.as_deref(), Some("OTR Practice Test 4"));

    let unknown = RemediationRequest {
        test_id: Some("missing".into()),
        ..scoped
    };
    assert_eq!(ids(&pipeline.resolve(&unknown).await), vec!["base-1", "base-2"]);
}

#[tokio::test]
async fn limit_is_clamped_end_to_end() {
    let questions: Vec<_> = (0..8)
        .map(|i| question(&format!("q{i}"), "splint"))
        .collect();
    let corpus = Arc::new(Corpus::new(vec![PracticeSet {
        id: "big".into(),
        title: "Big".into(),
        description: String::new(),
        status: SetStatus::Available,
        questions,
    }]));
    let pipeline = RemediationPipeline::new(PipelineConfig::default(), corpus).unwrap();

    let mut request = RemediationRequest::with_keywords(["splint"]);
    request.limit = Some(100.0);
    assert_eq!(pipeline.resolve(&request).await.items.len(), 5);
    request.limit = Some(0.0);
    assert_eq!(pipeline.resolve(&request).await.items.len(), 3);
    request.limit = Some(-1.0);
    assert_eq!(pipeline.resolve(&request).await.items.len(), 3);
}

#[tokio::test]
async fn domain_only_request_reaches_question_bank_but_not_ranker() {
    let bank = FakeBank::returning(vec![]);
    let metrics = Arc::new(RecordingMetrics::default());
    let pipeline = pipeline(PipelineConfig::default())
        .with_question_bank(bank.clone())
        .with_metrics(metrics.clone());

    let request = RemediationRequest {
        domain: Some("Evaluation".into()),
        ..RemediationRequest::default()
    };
    assert!(pipeline.resolve(&request).await.items.is_empty());
    assert_eq!(bank.calls().len(), 1);
    assert_eq!(
        *metrics.stages.lock().unwrap(),
        vec![(Stage::QuestionBank, StageOutcome::Empty)]
    );
}

#[test]
fn enabled_stages_reflect_configuration() {
    let bare = pipeline(PipelineConfig::default());
    assert_eq!(bare.enabled_stages(), vec![Stage::LocalKeyword]);

    let full = pipeline(PipelineConfig::default())
        .with_reference(FakeReference::returning(vec![]))
        .with_question_bank(FakeBank::returning(vec![]));
    assert_eq!(
        full.enabled_stages(),
        vec![Stage::Reference, Stage::QuestionBank, Stage::LocalKeyword]
    );

    let fixture = pipeline(PipelineConfig {
        fixture: true,
        ..PipelineConfig::default()
    });
    assert_eq!(fixture.enabled_stages(), vec![Stage::Fixture]);
}

#[test]
fn invalid_config_is_rejected_at_construction() {
    let cfg = PipelineConfig {
        max_limit: 0,
        ..PipelineConfig::default()
    };
    assert!(matches!(
        RemediationPipeline::new(cfg, corpus()),
        Err(MatchError::InvalidConfig(_))
    ));
}
