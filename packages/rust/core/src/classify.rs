//! Keyword classifier assigning a [`Category`] to a visited page.

use researchkit_shared::Category;

/// Checked in order; the first category with a hit wins.
const RULES: &[(Category, &[&str])] = &[
    (Category::Official, &["github", "開発", "developer", "ablaze"]),
    (Category::News, &["news", "ニュース", "発表", "リリース"]),
    (Category::Review, &["review", "レビュー", "比較", "おすすめ"]),
    (Category::Community, &["reddit", "forum", "コミュニティ", "質問"]),
];

/// Categorize text (usually domain, title and content joined) by keyword.
pub fn classify(text: &str) -> Category {
    let lower = text.to_lowercase();
    RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or_default()
}
