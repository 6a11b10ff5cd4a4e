//! Survey-style research report.
//!
//! Layout, top to bottom: title, generation line, optional executive
//! summary, abstract and keywords, table of contents, numbered sections,
//! references, italic footer. Sections are numbered from 1 in the order
//! given; References always takes the next number.

use std::fmt::Write;

use crate::markdown::anchor;

/// A numbered `##` section.
#[derive(Debug, Clone, Default)]
pub struct Section {
    pub title: String,
    /// Text under the heading, before any subsection. May be empty.
    pub body: String,
    pub subsections: Vec<Subsection>,
}

impl Section {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            subsections: Vec::new(),
        }
    }

    pub fn with(mut self, title: impl Into<String>, body: impl Into<String>) -> Self {
        self.subsections.push(Subsection {
            title: title.into(),
            body: body.into(),
        });
        self
    }
}

/// A `###` subsection. Blank bodies are skipped when rendering.
#[derive(Debug, Clone, Default)]
pub struct Subsection {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Default)]
pub struct SurveyReport {
    pub title: String,
    /// Date shown under the title, e.g. `2026-01-31`.
    pub generated: String,
    /// Executive summary lines; the block is omitted when empty.
    pub summary: Vec<String>,
    pub abstract_text: String,
    pub keywords: Vec<String>,
    pub sections: Vec<Section>,
    /// Reference entries, rendered as `[n] entry`.
    pub references: Vec<String>,
    /// Footer lines, rendered in italics.
    pub footer: Vec<String>,
}

impl SurveyReport {
    pub fn render(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "# {}\n", self.title);
        let _ = writeln!(out, "**ResearchKit** | Generated: {}\n", self.generated);
        out.push_str("---\n\n");

        if !self.summary.is_empty() {
            out.push_str("> **Executive Summary**\n>\n");
            for line in &self.summary {
                let _ = writeln!(out, "> {line}");
            }
            out.push('\n');
        }

        out.push_str("## Abstract\n\n");
        let _ = writeln!(out, "{}\n", self.abstract_text.trim());
        if !self.keywords.is_empty() {
            let _ = writeln!(out, "**Keywords**: {}\n", self.keywords.join(", "));
        }
        out.push_str("---\n\n");

        let headings = self.headings();
        out.push_str("## Table of Contents\n\n");
        for (i, heading) in headings.iter().enumerate() {
            let title = heading.split_once(". ").map_or(heading.as_str(), |(_, t)| t);
            let _ = writeln!(out, "{}. [{}](#{})", i + 1, title, anchor(heading));
        }
        out.push_str("\n---\n\n");

        for (section, heading) in self.sections.iter().zip(&headings) {
            let _ = writeln!(out, "## {heading}\n");
            if !section.body.trim().is_empty() {
                let _ = writeln!(out, "{}\n", section.body.trim());
            }
            let number = heading.split_once('.').map_or("", |(n, _)| n);
            let visible = section.subsections.iter().filter(|s| !s.body.trim().is_empty());
            for (j, sub) in visible.enumerate() {
                let _ = writeln!(out, "### {number}.{} {}\n", j + 1, sub.title);
                let _ = writeln!(out, "{}\n", sub.body.trim());
            }
        }

        out.push_str("---\n\n");
        if let Some(heading) = headings.last() {
            let _ = writeln!(out, "## {heading}\n");
        }
        for (k, entry) in self.references.iter().enumerate() {
            let _ = writeln!(out, "[{}] {}\n", k + 1, entry);
        }

        if !self.footer.is_empty() {
            out.push_str("---\n\n");
            for line in &self.footer {
                let _ = writeln!(out, "*{line}*");
            }
        }
        out
    }

    /// `"1. Overview"`, ..., `"N. References"`.
    fn headings(&self) -> Vec<String> {
        self.sections
            .iter()
            .map(|s| s.title.as_str())
            .chain(std::iter::once("References"))
            .enumerate()
            .map(|(i, title)| format!("{}. {}", i + 1, title))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SurveyReport {
        SurveyReport {
            title: "Floorp: Comprehensive Web Analysis Report".into(),
            generated: "2026-01-31".into(),
            summary: vec!["12 sources analyzed.".into()],
            abstract_text: "An abstract.".into(),
            keywords: vec!["floorp".into(), "browser".into()],
            sections: vec![
                Section::new("Overview", "Overview text."),
                Section::new("Source Analysis", "")
                    .with("Official & Developer Sources (2)", "two items")
                    .with("News & Media (0)", "")
                    .with("Community & Forums (1)", "one item"),
                Section::new("Conclusions", "Done."),
            ],
            references: vec![
                "\"Floorp\". *floorp.app*. https://floorp.app".into(),
                "\"Repo\". *github.com*. https://github.com/Floorp-Projects/Floorp".into(),
            ],
            footer: vec!["Generated by ResearchKit.".into()],
        }
    }

    #[test]
    fn sections_render_in_order() {
        let md = sample().render();
        let order = [
            "# Floorp: Comprehensive",
            "> **Executive Summary**",
            "## Abstract",
            "**Keywords**: floorp, browser",
            "## Table of Contents",
            "## 1. Overview",
            "## 2. Source Analysis",
            "## 3. Conclusions",
            "## 4. References",
            "*Generated by ResearchKit.*",
        ];
        let positions: Vec<usize> = order.iter().map(|s| md.find(s).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{md}");
    }

    #[test]
    fn empty_subsections_are_skipped_and_numbering_closes_up() {
        let md = sample().render();
        assert!(md.contains("### 2.1 Official & Developer Sources (2)"));
        assert!(md.contains("### 2.2 Community & Forums (1)"));
        assert!(!md.contains("News & Media"));
    }

    #[test]
    fn table_of_contents_links_every_section() {
        let md = sample().render();
        assert!(md.contains("1. [Overview](#1-overview)\n"));
        assert!(md.contains("2. [Source Analysis](#2-source-analysis)\n"));
        assert!(md.contains("4. [References](#4-references)\n"));
    }

    #[test]
    fn references_are_numbered() {
        let md = sample().render();
        assert!(md.contains("[1] \"Floorp\". *floorp.app*. https://floorp.app\n"));
        assert!(md.contains("[2] \"Repo\""));
    }

    #[test]
    fn optional_blocks_are_omitted() {
        let report = SurveyReport {
            title: "T".into(),
            generated: "2026-01-31".into(),
            ..Default::default()
        };
        let md = report.render();
        assert!(!md.contains("Executive Summary"));
        assert!(!md.contains("**Keywords**"));
        assert!(md.contains("1. [References](#1-references)"));
        assert!(md.contains("## 1. References"));
    }
}
