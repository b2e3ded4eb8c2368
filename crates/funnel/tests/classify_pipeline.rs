//! End-to-end runs of the staged funnel against scripted completions.

use pretty_assertions::assert_eq;
use std::sync::Arc;
use taxonav_funnel::{
    ClassificationResult, FunnelConfig, FunnelEvent, RecordingSink, Stage, StageFunnel,
    SummarySource,
};
use taxonav_gateway::{GatewayError, ScriptedGateway};
use taxonav_taxonomy::TaxonomyIndex;

const PHONES: &str = "\
# Google_Product_Taxonomy_Version: 2021-09-21
Electronics
Electronics > Cell Phones > Smartphones
Electronics > Computers > Laptops
Apparel > Shoes > Athletic Shoes
";

const SUMMARY_PROMPT: &str = "Summarize this product";
const TOP_LEVEL_PROMPT: &str = "Select exactly";

fn index(raw: &str) -> Arc<TaxonomyIndex> {
    Arc::new(TaxonomyIndex::build(raw.lines()).unwrap())
}

fn funnel_with_sink(
    index: Arc<TaxonomyIndex>,
    gateway: Arc<ScriptedGateway>,
    config: FunnelConfig,
) -> (StageFunnel, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    let funnel = StageFunnel::new(index, gateway, config)
        .unwrap()
        .with_sink(sink.clone());
    (funnel, sink)
}

fn segments(result: &ClassificationResult) -> Vec<String> {
    result
        .path()
        .map(|path| path.segments().to_vec())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_smartphone_resolves_without_final_call() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .when(SUMMARY_PROMPT, "Smartphone (mobile phone, cell phone). Handheld device with camera.")
            .when(TOP_LEVEL_PROMPT, "Electronics\nApparel")
            .when("Smartphones (L1: Electronics)", "1")
            .when("Athletic Shoes (L1: Apparel)", "NONE"),
    );
    let (funnel, sink) = funnel_with_sink(index(PHONES), gateway.clone(), FunnelConfig::default());

    let outcome = funnel.classify("iPhone 14: Smartphone with camera").await;

    assert_eq!(
        segments(&outcome.result),
        vec!["Electronics", "Cell Phones", "Smartphones"]
    );
    assert_eq!(outcome.trace.top_level, vec!["Electronics", "Apparel"]);
    assert_eq!(outcome.trace.leaves_first, vec!["Smartphones"]);
    assert!(outcome.trace.leaves_second.is_empty());
    assert!(outcome.trace.final_skipped);
    assert_eq!(outcome.trace.final_index, Some(0));
    assert_eq!(outcome.trace.summary_source, Some(SummarySource::Generated));

    // summary, stage 1, one batch per branch
    assert_eq!(gateway.call_count(), 4);
    assert_eq!(outcome.trace.completion_calls, 4);
    assert!(sink.events().is_empty());
}

#[tokio::test]
async fn test_empty_taxonomy_and_dead_gateway_fail() {
    let gateway = Arc::new(
        ScriptedGateway::new().otherwise_fail(GatewayError::Transport("connection refused".into())),
    );
    let (funnel, _) = funnel_with_sink(
        Arc::new(TaxonomyIndex::empty()),
        gateway,
        FunnelConfig::default(),
    );

    let outcome = funnel.classify("anything").await;
    assert_eq!(outcome.result, ClassificationResult::Failure);
    assert_eq!(outcome.trace.summary_source, Some(SummarySource::Fallback));
}

#[tokio::test]
async fn test_summary_failure_still_classifies() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .when_fail(SUMMARY_PROMPT, GatewayError::Timeout(60_000))
            .when(TOP_LEVEL_PROMPT, "Apparel")
            .when("Athletic Shoes (L1: Apparel)", "1"),
    );
    let (funnel, sink) = funnel_with_sink(index(PHONES), gateway.clone(), FunnelConfig::default());

    let outcome = funnel.classify("Trail running sneaker with grippy sole").await;

    assert_eq!(
        segments(&outcome.result),
        vec!["Apparel", "Shoes", "Athletic Shoes"]
    );
    assert_eq!(
        outcome.trace.summary.as_deref(),
        Some("Trail running sneaker with grippy sole")
    );
    assert!(outcome.trace.second_branch_skipped);

    // stages 1 and 2 saw the truncated description in place of a summary
    let top_level = &gateway.requests()[1];
    assert!(top_level.user.contains("Product: Trail running sneaker"));
    assert!(sink.events().iter().any(|e| matches!(
        e,
        FunnelEvent::FallbackUsed {
            stage: Stage::Summary,
            ..
        }
    )));
}

#[tokio::test]
async fn test_both_branches_empty_fails_without_final_call() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .when(SUMMARY_PROMPT, "Kettle (electric kettle)")
            .when(TOP_LEVEL_PROMPT, "Electronics\nApparel")
            .otherwise("NONE"),
    );
    let (funnel, _) = funnel_with_sink(index(PHONES), gateway.clone(), FunnelConfig::default());

    let outcome = funnel.classify("Stainless electric kettle").await;

    assert_eq!(outcome.result, ClassificationResult::Failure);
    assert!(outcome.trace.candidates.is_empty());
    assert!(outcome.trace.final_skipped);
    assert_eq!(gateway.call_count(), 4);
}

const PHONE_VARIANTS: &str = "\
header
Electronics > Cell Phones > Smartphones
Electronics > Cell Phones > Camera Phones
Electronics > Computers > Laptops
Apparel > Shoes > Athletic Shoes
";

#[tokio::test]
async fn test_final_selection_picks_numbered_option() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .when(SUMMARY_PROMPT, "Smartphone (cell phone)")
            .when(TOP_LEVEL_PROMPT, "Electronics\nApparel")
            .when("Smartphones (L1: Electronics)", "1\n2")
            .when("between 1 and 2", "2")
            .otherwise("NONE"),
    );
    let (funnel, _) =
        funnel_with_sink(index(PHONE_VARIANTS), gateway.clone(), FunnelConfig::default());

    let outcome = funnel.classify("Phone with a 200MP camera").await;

    assert_eq!(outcome.trace.candidates, vec!["Smartphones", "Camera Phones"]);
    assert_eq!(outcome.trace.final_index, Some(1));
    assert_eq!(
        segments(&outcome.result),
        vec!["Electronics", "Cell Phones", "Camera Phones"]
    );

    let last = gateway.requests().pop().unwrap();
    assert!(last.user.contains("Product: Phone with a 200MP camera"));
}

#[tokio::test]
async fn test_final_non_answer_fails() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .when(SUMMARY_PROMPT, "Smartphone (cell phone)")
            .when(TOP_LEVEL_PROMPT, "Electronics")
            .when("Smartphones (L1: Electronics)", "1\n2")
            .when("between 1 and 2", "None."),
    );
    let (funnel, _) = funnel_with_sink(index(PHONE_VARIANTS), gateway, FunnelConfig::default());

    let outcome = funnel.classify("Phone").await;
    assert_eq!(outcome.result, ClassificationResult::Failure);
    assert_eq!(outcome.trace.candidates.len(), 2);
    assert_eq!(outcome.trace.final_index, None);
}

#[tokio::test]
async fn test_final_out_of_range_is_hallucination() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .when(SUMMARY_PROMPT, "Smartphone (cell phone)")
            .when(TOP_LEVEL_PROMPT, "Electronics")
            .when("Smartphones (L1: Electronics)", "1\n2")
            .when("between 1 and 2", "7"),
    );
    let (funnel, sink) = funnel_with_sink(index(PHONE_VARIANTS), gateway, FunnelConfig::default());

    let outcome = funnel.classify("Phone").await;
    assert_eq!(outcome.result, ClassificationResult::Failure);
    assert_eq!(outcome.trace.hallucinations, 1);
    assert_eq!(
        sink.events(),
        vec![FunnelEvent::Hallucination {
            stage: Stage::FinalSelection,
            value: "7".into(),
        }]
    );
}

#[tokio::test]
async fn test_stage1_hallucination_is_reported() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .when(SUMMARY_PROMPT, "Smartphone (cell phone)")
            .when(TOP_LEVEL_PROMPT, "Gadgets & Gizmos\nElectronics")
            .when("Smartphones (L1: Electronics)", "1"),
    );
    let (funnel, sink) = funnel_with_sink(index(PHONES), gateway, FunnelConfig::default());

    let outcome = funnel.classify("iPhone").await;

    assert!(outcome.result.is_success());
    assert_eq!(outcome.trace.top_level, vec!["Electronics"]);
    assert!(!outcome.trace.top_level_fallback);
    assert!(outcome.trace.second_branch_skipped);
    assert_eq!(sink.hallucinations(), 1);
}

const SHARED_NAMES: &str = "\
header
Electronics > Accessories > Cases
Electronics > Audio > Headphones
Luggage & Bags > Cases
Luggage & Bags > Backpacks
";

#[tokio::test]
async fn test_second_branch_excludes_first_branch_picks() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .when(SUMMARY_PROMPT, "Carrying case (pouch)")
            .when(TOP_LEVEL_PROMPT, "Electronics\nLuggage & Bags")
            .when("Cases (L1: Electronics)", "1")
            .when("Backpacks (L1: Luggage & Bags)", "1")
            .when("between 1 and 2", "1"),
    );
    let (funnel, _) =
        funnel_with_sink(index(SHARED_NAMES), gateway.clone(), FunnelConfig::default());

    let outcome = funnel.classify("Hard shell case for headphones").await;

    let second_batch = gateway
        .requests()
        .into_iter()
        .find(|r| r.user.contains("(L1: Luggage & Bags)"))
        .unwrap();
    assert!(!second_batch.user.contains("Cases (L1: Luggage & Bags)"));
    assert!(second_batch.user.contains("1. Backpacks (L1: Luggage & Bags)"));

    assert_eq!(outcome.trace.candidates, vec!["Cases", "Backpacks"]);
    // a repeated leaf name resolves to its first occurrence in file order
    assert_eq!(
        segments(&outcome.result),
        vec!["Electronics", "Accessories", "Cases"]
    );
}

fn large_taxonomy(leaves: usize) -> String {
    let mut raw = String::from("header\n");
    for i in 1..=leaves {
        raw.push_str(&format!("Home & Garden > Kitchen > Utensil {i:03}\n"));
    }
    raw.push_str("Electronics > Audio > Speakers\n");
    raw
}

fn large_script() -> ScriptedGateway {
    ScriptedGateway::new()
        .when(SUMMARY_PROMPT, "Spatula (turner)")
        .when(TOP_LEVEL_PROMPT, "Home & Garden\nElectronics")
        .when("(batch 1 of 3)", "100")
        .when_fail("(batch 2 of 3)", GatewayError::RateLimited("slow down".into()))
        .when("(batch 3 of 3)", "30")
        .when("Speakers (L1: Electronics)", "NONE")
        .when("between 1 and 2", "2")
}

#[tokio::test]
async fn test_many_batches_survive_a_failed_batch() {
    let gateway = Arc::new(large_script());
    let (funnel, sink) = funnel_with_sink(
        index(&large_taxonomy(230)),
        gateway.clone(),
        FunnelConfig::default(),
    );

    let outcome = funnel.classify("Silicone spatula").await;

    assert_eq!(outcome.trace.leaves_first, vec!["Utensil 100", "Utensil 230"]);
    assert_eq!(outcome.trace.dropped_batches, 1);
    assert_eq!(
        segments(&outcome.result),
        vec!["Home & Garden", "Kitchen", "Utensil 230"]
    );
    // summary, stage 1, three batches, one batch, stage 3
    assert_eq!(gateway.call_count(), 7);
    assert!(sink.events().iter().any(|e| matches!(
        e,
        FunnelEvent::BatchDropped {
            stage: Stage::LeavesFirst,
            batch: 2,
            ..
        }
    )));
}

#[tokio::test]
async fn test_sequential_and_concurrent_batches_agree() {
    let taxonomy = index(&large_taxonomy(230));

    let mut outcomes = Vec::new();
    for config in [FunnelConfig::sequential(), FunnelConfig::default()] {
        let gateway = Arc::new(large_script());
        let (funnel, _) = funnel_with_sink(taxonomy.clone(), gateway, config);
        outcomes.push(funnel.classify("Silicone spatula").await);
    }

    assert_eq!(outcomes[0], outcomes[1]);
}

#[tokio::test]
async fn test_funnel_is_shared_across_tasks() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .when(SUMMARY_PROMPT, "Smartphone (cell phone)")
            .when(TOP_LEVEL_PROMPT, "Electronics")
            .when("Smartphones (L1: Electronics)", "1"),
    );
    let (funnel, _) = funnel_with_sink(index(PHONES), gateway.clone(), FunnelConfig::default());
    let funnel = Arc::new(funnel);

    let mut handles = Vec::new();
    for i in 0..8 {
        let funnel = Arc::clone(&funnel);
        handles.push(tokio::spawn(async move {
            funnel.classify(&format!("Phone model {i}")).await
        }));
    }

    for handle in handles {
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.result.leaf(), Some("Smartphones"));
    }
    assert_eq!(gateway.call_count(), 8 * 3);
}
