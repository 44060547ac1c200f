mod common;

use common::{fenced, items, FnGenerator};
use longguide::discovery::DiscoveryOptions;
use longguide::guidelines::{
    GuidelineError, GuidelineReport, MetricsGuidelines, OutputConstraintsGuidelines,
    DEFAULT_METRIC_GUIDELINE,
};
use longguide::prompts::TaskPromptVariant;
use longguide::run::{load_records, save_records, GenerationRun};
use longguide::text::RuleBasedAnalyzer;
use longguide::{evaluate, ValidationItem};

fn scripted(prompt: &str) -> String {
    if prompt.starts_with("Select top-5") {
        fenced(r#"["Clarity", "Brevity"]"#)
    } else if prompt.starts_with("Define the list") {
        "- Clarity: easy to follow.\n- Brevity: short.".to_string()
    } else if prompt.starts_with("You are given an input") {
        fenced(r#"{"Clarity": 4, "Brevity": 3}"#)
    } else if prompt.starts_with("Now you are given") {
        "Sure, here they are.\n\n- Clarity: crisp sentences.\n- Brevity: no filler.".to_string()
    } else {
        String::new()
    }
}

#[tokio::test]
async fn metric_guideline_runs_discovery_judging_and_description() {
    let generator = FnGenerator::new(scripted);
    let data = items(8);

    let guideline = MetricsGuidelines::new(&generator, "summarization")
        .discovery(DiscoveryOptions {
            batch_size: 2,
            iterations: 2,
            ..DiscoveryOptions::default()
        })
        .rng_seed(Some(11))
        .build(&data)
        .await
        .unwrap();

    assert_eq!(guideline.metrics, vec!["Brevity", "Clarity"]);
    let profile = guideline.profile.as_ref().unwrap();
    assert_eq!(profile.scores["Clarity"], 4.0);
    assert_eq!(profile.scores["Brevity"], 3.0);
    assert_eq!(profile.valid_responses, 8);
    assert_eq!(guideline.text, "- Clarity: crisp sentences.\n- Brevity: no filler.");

    // 2 selection rounds, 1 definitions call, 8 judge calls, 1 description call.
    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 12);
    let description = prompts.last().unwrap();
    assert!(description.contains("Brevity, Clarity for the summarization task"));
    assert!(description.contains(r#"{"Brevity":3.0,"Clarity":4.0}"#));
}

#[tokio::test]
async fn metric_guideline_without_data_uses_default_text() {
    let generator = FnGenerator::new(scripted);
    let guideline = MetricsGuidelines::new(&generator, "summarization")
        .build(&[])
        .await
        .unwrap();
    assert_eq!(guideline.text, DEFAULT_METRIC_GUIDELINE);
    assert_eq!(generator.call_count(), 0);
}

#[tokio::test]
async fn too_small_validation_set_is_reported() {
    let generator = FnGenerator::new(scripted);
    let err = MetricsGuidelines::new(&generator, "summarization")
        .build(&items(5))
        .await
        .unwrap_err();
    assert!(matches!(err, GuidelineError::Discovery(_)));
    assert_eq!(generator.call_count(), 0);
}

#[tokio::test]
async fn guided_generation_then_evaluation() {
    let data = vec![
        ValidationItem::new("doc one", "the cat sat on the mat"),
        ValidationItem::new("doc two", "dogs bark loudly"),
    ];
    let generator = FnGenerator::new(|prompt| {
        if prompt.ends_with("Input: doc one") {
            "the cat sat on the mat".to_string()
        } else {
            String::new()
        }
    });

    let analyzer = RuleBasedAnalyzer;
    let constraint = OutputConstraintsGuidelines::new(&analyzer).build(&data).unwrap();
    let records = GenerationRun::new(&generator, "summarization")
        .variant(TaskPromptVariant::OnlyConstraints)
        .run(&data, "- Clarity: crisp.", &constraint.text)
        .await;

    assert_eq!(records.len(), 2);
    assert!(records[0].prompt.starts_with("Summarize the following document. The output must have"));
    assert!(!records[0].prompt.contains("- Clarity"));
    assert_eq!(records[1].generated, "");
    assert_eq!(records[1].target, "dogs bark loudly");

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results.json");
    save_records(&path, &records).unwrap();
    let loaded = load_records(&path).unwrap();
    assert_eq!(loaded, records);

    let summary = evaluate(&loaded, "summarization").unwrap();
    assert_eq!(summary.scores, vec![1.0, 0.0]);
    assert_eq!(summary.mean_rouge_l, 0.5);
}

#[tokio::test]
async fn report_collects_both_guidelines() {
    let generator = FnGenerator::new(scripted);
    let data = items(3);
    let metric = MetricsGuidelines::new(&generator, "summarization")
        .discovery(DiscoveryOptions {
            batch_size: 1,
            iterations: 1,
            ..DiscoveryOptions::default()
        })
        .build(&data)
        .await
        .unwrap();
    let analyzer = RuleBasedAnalyzer;
    let constraint = OutputConstraintsGuidelines::new(&analyzer).build(&data).unwrap();

    let report = GuidelineReport::new("summarization", "gpt-4o-mini", metric, constraint);
    assert_eq!(report.metrics, vec!["Brevity", "Clarity"]);
    assert_eq!(report.scores["Clarity"], 4.0);
    assert!(report
        .constraint_guideline
        .starts_with("The output must have from 2 to 2 sentences"));

    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(value["statistics"]["form"], "range");
    assert!(chrono::DateTime::parse_from_rfc3339(value["created_at"].as_str().unwrap()).is_ok());
}
