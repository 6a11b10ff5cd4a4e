//! Subscription research report.

use researchkit_shared::{PricingCatalog, Recommendation, SubscriptionEntry};

use crate::markdown::{Table, format_price, safe_cell};

const CHECKLIST: [&str; 3] = [
    "Verify any missing pricing URLs",
    "Confirm token limits and model access from official pages",
    "Review recommendations before canceling subscriptions",
];

/// Render the subscriptions table, the pricing catalog and the
/// recommendations into one Markdown document.
pub fn render(
    entries: &[SubscriptionEntry],
    catalog: &[PricingCatalog],
    recommendations: &[Recommendation],
) -> String {
    let mut lines: Vec<String> = vec![
        "# Subscription Deep Research Report".into(),
        String::new(),
        "## Subscriptions".into(),
        String::new(),
        subscriptions_table(entries).render(),
        String::new(),
        "## Pricing Catalog".into(),
        String::new(),
    ];

    for item in catalog {
        lines.push(format!("### {}", safe_cell(&item.service)));
        if item.pricing_url.is_empty() {
            lines.push("- Pricing URL: (not found)".into());
        } else {
            lines.push(format!("- Pricing URL: {}", item.pricing_url));
        }
        if !item.notes.is_empty() {
            lines.push(format!("- Notes: {}", safe_cell(&item.notes)));
        }
        lines.push(String::new());
        lines.push(plans_table(item));
        lines.push(String::new());
    }

    lines.push("## Recommendations".into());
    lines.push(String::new());
    if recommendations.is_empty() {
        lines.push("No recommendations generated.".into());
    }
    for rec in recommendations {
        lines.push(format!("- Service: {}", safe_cell(&rec.service)));
        lines.push(format!("  - Action: {}", safe_cell(&rec.action)));
        lines.push(format!("  - Reason: {}", safe_cell(&rec.reason)));
        lines.push(format!("  - Alternatives: {}", safe_cell(&rec.alternatives)));
    }

    lines.push(String::new());
    lines.push("## Manual Review Checklist".into());
    lines.extend(CHECKLIST.iter().map(|item| format!("- {item}")));

    lines.join("\n")
}

fn subscriptions_table(entries: &[SubscriptionEntry]) -> Table {
    let mut table = Table::new([
        "Service",
        "Plan",
        "Price",
        "Currency",
        "Period",
        "Next Billing",
        "Status",
        "Source",
        "Notes",
    ])
    .align_right(2);

    for e in entries {
        table.row([
            e.service.as_str(),
            e.plan.as_str(),
            format_price(e.price, &e.raw_price).as_str(),
            e.currency.as_str(),
            e.billing_period.as_str(),
            e.next_billing_date.as_str(),
            e.status.as_str(),
            e.source.as_str(),
            e.notes.as_str(),
        ]);
    }
    table
}

fn plans_table(catalog: &PricingCatalog) -> String {
    let mut table = Table::new(["Plan", "Price", "Currency", "Period", "Tokens", "Model Notes"])
        .align_right(1);
    for plan in &catalog.plans {
        table.row([
            &plan.name,
            &plan.price,
            &plan.currency,
            &plan.billing_period,
            &plan.tokens,
            &plan.model_notes,
        ]);
    }

    let rendered = table.render();
    if table.is_empty() {
        format!("{rendered}\n| (no plans extracted) | | | | | |")
    } else {
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use researchkit_shared::{BillingPeriod, PricingPlan, SubscriptionStatus};

    fn entry(service: &str, plan: &str, price: f64) -> SubscriptionEntry {
        SubscriptionEntry {
            service: service.into(),
            plan: plan.into(),
            price,
            currency: "USD".into(),
            billing_period: BillingPeriod::Monthly,
            source: "google_play".into(),
            status: SubscriptionStatus::Active,
            ..Default::default()
        }
    }

    fn data_rows<'a>(report: &'a str, header: &str) -> Vec<&'a str> {
        report
            .lines()
            .skip_while(|l| !l.starts_with(header))
            .skip(2)
            .take_while(|l| l.starts_with('|'))
            .collect()
    }

    #[test]
    fn three_entries_make_three_rows_in_order() {
        let entries = vec![
            entry("ChatGPT", "Plus", 20.0),
            entry("Claude", "Pro", 20.0),
            entry("GitHub Copilot", "Pro", 10.0),
        ];
        let report = render(&entries, &[], &[]);

        let rows = data_rows(&report, "| Service |");
        assert_eq!(rows.len(), 3);
        assert!(rows[0].starts_with("| ChatGPT | Plus | 20 | USD | monthly |"));
        assert!(rows[1].starts_with("| Claude |"));
        assert!(rows[2].starts_with("| GitHub Copilot |"));
        assert!(report.contains("|---|---|---:|---|---|---|---|---|---|"));
    }

    #[test]
    fn empty_sections_keep_their_headings() {
        let report = render(&[], &[], &[]);
        assert!(report.contains("## Pricing Catalog"));
        assert!(report.contains("No recommendations generated."));
        assert!(report.ends_with("- Review recommendations before canceling subscriptions"));
    }

    #[test]
    fn catalog_without_plans_or_url() {
        let catalog = vec![
            PricingCatalog {
                service: "Z.ai".into(),
                notes: "pricing url not found".into(),
                ..Default::default()
            },
            PricingCatalog {
                service: "Claude".into(),
                pricing_url: "https://claude.com/pricing".into(),
                plans: vec![PricingPlan {
                    name: "Max".into(),
                    price: "$100".into(),
                    model_notes: "Opus | Sonnet".into(),
                    ..Default::default()
                }],
                notes: String::new(),
            },
        ];
        let report = render(&[], &catalog, &[]);

        assert!(report.contains("### Z.ai\n- Pricing URL: (not found)\n- Notes: pricing url not found"));
        assert!(report.contains("| (no plans extracted) | | | | | |"));
        assert!(report.contains("- Pricing URL: https://claude.com/pricing\n\n| Plan |"));
        assert!(report.contains("| Max | $100 |  |  |  | Opus \\| Sonnet |"));
    }

    #[test]
    fn recommendations_are_nested_bullets() {
        let recs = vec![Recommendation {
            service: "Cursor".into(),
            action: "downgrade".into(),
            reason: "overlaps with Copilot".into(),
            alternatives: "GitHub Copilot Pro".into(),
        }];
        let report = render(&[], &[], &recs);
        assert!(report.contains(
            "- Service: Cursor\n  - Action: downgrade\n  - Reason: overlaps with Copilot\n  - Alternatives: GitHub Copilot Pro"
        ));
    }

    #[test]
    fn zero_price_shows_raw_text() {
        let mut e = entry("Gemini", "Trial", 0.0);
        e.raw_price = "Free trial".into();
        let report = render(&[e], &[], &[]);
        assert!(report.contains("| Gemini | Trial | Free trial |"));
    }
}
