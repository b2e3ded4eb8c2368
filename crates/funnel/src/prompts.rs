use crate::batch::Batch;

pub(crate) const SUMMARY_SYSTEM: &str = "You are a product categorization assistant. \
Always use the most common, standard product name (e.g. 'television' not 'display device'). \
Include helpful synonyms in parentheses. Be direct and avoid marketing language.";

pub(crate) const TOP_LEVEL_SYSTEM: &str = "You are a product categorization assistant. \
Select top-level categories from the provided list using exact spelling.";

pub(crate) const LEAF_SYSTEM: &str = "You are a product categorization assistant. \
Select categories by their numbers only. Return only numbers, one per line.";

pub(crate) const FINAL_SYSTEM: &str = "You are a product categorization assistant. \
Select the single best matching category by its number.";

pub(crate) fn summary(description: &str) -> String {
    format!(
        "Summarize this product in 40-60 words so that its category is obvious:\n\
1. START with the common product name (e.g. \"television\", not \"home entertainment display\")\n\
2. Add 1-2 synonyms in parentheses (e.g. \"Television (TV, flat-screen display)\")\n\
3. State the core function that defines its category\n\
4. State the features that distinguish it within that category\n\
5. State the primary use context\n\n\
Identify what the product IS, not the accessories it might need. No marketing language.\n\n\
Product: {description}\n\n\
Summary:"
    )
}

pub(crate) fn top_level(summary: &str, categories: &[String], picks: usize) -> String {
    let noun = if picks == 1 { "category" } else { "categories" };
    format!(
        "Product: {summary}\n\n\
Select exactly {picks} {noun} from this list that best match the product:\n\n\
{}\n\n\
Return one category per line:",
        categories.join("\n")
    )
}

pub(crate) fn leaf_batch(summary: &str, batch: &Batch, max_picks: usize) -> String {
    let options = batch
        .items
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{}. {} (L1: {})", i + 1, c.leaf, c.top_level))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Product: {summary}\n\n\
Select up to {max_picks} categories that match this product from the numbered list below.\n\
The list may contain both main product categories and accessory or part categories.\n\
If the product is a complete item, choose the main product category (a TV is 'Televisions', not 'TV Mounts'; \
a laptop is 'Laptops', not 'Laptop Cases'). Choose accessory categories only when the product is itself an accessory or part.\n\n\
Categories to choose from (batch {} of {}):\n\
{options}\n\n\
Return ONLY the numbers of matching categories (up to {max_picks}), one per line.\n\
If no categories match, return 'NONE'.",
        batch.ordinal, batch.total
    )
}

pub(crate) fn final_selection(description: &str, candidates: &[String]) -> String {
    let options = candidates
        .iter()
        .enumerate()
        .map(|(i, leaf)| format!("{}. {leaf}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Product: {description}\n\n\
From the options below, select the category that most likely describes this product.\n\
A perfect match is not required; pick the most probable option.\n\n\
Available categories:\n\
{options}\n\n\
Return ONLY the number of your selection (e.g. \"1\" or \"2\").\n\
The number must be between 1 and {}.",
        candidates.len()
    )
}
