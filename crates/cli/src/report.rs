use serde::Serialize;
use taxonav_funnel::{Classification, ClassificationResult, FunnelEvent, StageTrace, SummarySource};
use taxonav_taxonomy::TaxonomyStats;

/// Leaves listed per stage before the rest is elided
const STAGE_LIST_LIMIT: usize = 10;

/// JSON record for one classified product
#[derive(Serialize)]
pub(crate) struct ProductReport<'a> {
    pub product: &'a str,
    pub title: &'a str,
    pub result: &'a ClassificationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<&'a StageTrace>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<FunnelEvent>,
}

#[derive(Serialize)]
pub(crate) struct BatchReport<'a> {
    pub products: Vec<ProductReport<'a>>,
    pub classified: usize,
    pub failed: usize,
}

pub(crate) fn render_result(result: &ClassificationResult) -> String {
    match result.path() {
        Some(path) => path.to_string(),
        None => "No matching category".to_string(),
    }
}

/// `[Title]` line followed by the indented result
pub(crate) fn render_product(title: &str, classification: &Classification) -> String {
    format!("[{title}]\n  {}", render_result(&classification.result))
}

pub(crate) fn render_stages(trace: &StageTrace) -> String {
    let mut out = String::new();

    let source = match trace.summary_source {
        Some(SummarySource::Generated) => "generated",
        Some(SummarySource::Fallback) => "truncated description",
        None => "none",
    };
    out.push_str(&format!("Summary ({source}):\n"));
    out.push_str(&format!("  {}\n", trace.summary.as_deref().unwrap_or("-")));

    out.push_str("\nStage 1: top-level categories");
    if trace.top_level_fallback {
        out.push_str(" (fallback)");
    }
    out.push('\n');
    push_list(&mut out, &trace.top_level);

    let first = trace.top_level.first().map(String::as_str).unwrap_or("-");
    out.push_str(&format!("\nStage 2A: leaves under '{first}'\n"));
    push_list(&mut out, &trace.leaves_first);

    match (trace.second_branch_skipped, trace.top_level.get(1)) {
        (false, Some(second)) => {
            out.push_str(&format!("\nStage 2B: leaves under '{second}'\n"));
            push_list(&mut out, &trace.leaves_second);
        }
        _ => out.push_str("\nStage 2B: skipped (one top-level category)\n"),
    }

    out.push_str("\nStage 3: ");
    match (trace.final_skipped, trace.candidates.len(), trace.final_index) {
        (true, 0, _) => out.push_str("no candidates\n"),
        (true, _, _) => out.push_str("skipped (single candidate)\n"),
        (false, count, Some(idx)) => {
            out.push_str(&format!("option {} of {count}\n", idx + 1));
        }
        (false, count, None) => out.push_str(&format!("no valid choice among {count}\n")),
    }

    out.push_str(&format!(
        "\n{} completion calls, {} hallucinations, {} dropped batches\n",
        trace.completion_calls, trace.hallucinations, trace.dropped_batches
    ));
    out
}

fn push_list(out: &mut String, items: &[String]) {
    if items.is_empty() {
        out.push_str("  (none)\n");
        return;
    }
    for (i, item) in items.iter().take(STAGE_LIST_LIMIT).enumerate() {
        out.push_str(&format!("  {}. {item}\n", i + 1));
    }
    if items.len() > STAGE_LIST_LIMIT {
        out.push_str(&format!("  ... and {} more\n", items.len() - STAGE_LIST_LIMIT));
    }
}

pub(crate) fn render_stats(stats: &TaxonomyStats) -> String {
    format!(
        "Paths:                {}\n\
Leaves:               {}\n\
Top-level categories: {}\n\
Max depth:            {}\n\
Duplicate leaf names: {}",
        stats.paths,
        stats.leaves,
        stats.top_level_categories,
        stats.max_depth,
        stats.duplicate_leaf_names
    )
}

pub(crate) fn render_tally(classified: usize, failed: usize) -> String {
    format!(
        "Classified {classified} of {} products ({failed} failed)",
        classified + failed
    )
}
