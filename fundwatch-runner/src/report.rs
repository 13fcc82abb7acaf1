//! Markdown report generation.
//!
//! A report has a fixed frame (title, provenance metadata, formula notes)
//! and a page-specific body written by [`Pipeline::write_report`].

use crate::pipeline::{Formula, Pipeline};
use crate::runner::PageRun;

/// Render the full Markdown report for one page run.
pub fn generate_report<P: Pipeline>(run: &PageRun<P>) -> String {
    let mut md = String::with_capacity(4096);

    md.push_str(&format!("# {}\n\n", P::KIND.title()));

    md.push_str("## Metadata\n\n");
    push_kv_table(
        &mut md,
        &[
            ("Page", P::KIND.slug().to_string()),
            ("Data Source", run.source.to_string()),
            ("Input Rows", run.input_rows.to_string()),
            ("Result Rows", run.outcome.rows.len().to_string()),
            ("Flagged Rows", run.flagged().count().to_string()),
            ("Dataset Hash", run.dataset_hash.clone()),
        ],
    );

    md.push_str("## Derived Columns\n\n");
    push_formulas(&mut md, P::formulas());

    P::write_report(&run.outcome, &mut md);
    md
}

fn push_formulas(md: &mut String, formulas: &[Formula]) {
    for f in formulas {
        md.push_str(&format!(
            "- **{}** = `{}`. {}\n",
            f.column, f.expression, f.meaning
        ));
    }
    md.push('\n');
}

/// Two-column `Field | Value` table.
pub fn push_kv_table(md: &mut String, rows: &[(&str, String)]) {
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    for (field, value) in rows {
        md.push_str(&format!("| {field} | {value} |\n"));
    }
    md.push('\n');
}

pub fn push_table(md: &mut String, headers: &[&str], rows: &[Vec<String>]) {
    md.push_str(&format!("| {} |\n", headers.join(" | ")));
    md.push_str(&format!(
        "|{}\n",
        headers.iter().map(|_| " --- |").collect::<String>()
    ));
    for row in rows {
        md.push_str(&format!("| {} |\n", row.join(" | ")));
    }
    md.push('\n');
}

/// A titled table that prints `empty` instead when there are no rows.
pub fn push_listing(
    md: &mut String,
    title: &str,
    empty: &str,
    headers: &[&str],
    rows: &[Vec<String>],
) {
    md.push_str(&format!("## {title}\n\n"));
    if rows.is_empty() {
        md.push_str(&format!("_{empty}_\n\n"));
    } else {
        push_table(md, headers, rows);
    }
}

/// Two-decimal rendering used throughout reports.
pub fn num(value: f64) -> String {
    format!("{value:.2}")
}

pub fn yes_no(value: bool) -> String {
    if value { "yes" } else { "no" }.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_has_header_separator_and_rows() {
        let mut md = String::new();
        push_table(
            &mut md,
            &["Quỹ", "CAR"],
            &[vec!["Quỹ 1".into(), num(16.666)]],
        );
        assert_eq!(md, "| Quỹ | CAR |\n| --- | --- |\n| Quỹ 1 | 16.67 |\n\n");
    }

    #[test]
    fn empty_listing_prints_placeholder() {
        let mut md = String::new();
        push_listing(&mut md, "Flagged", "none flagged", &["a"], &[]);
        assert!(md.contains("## Flagged"));
        assert!(md.contains("_none flagged_"));
        assert!(!md.contains("| a |"));
    }

    #[test]
    fn num_handles_non_finite() {
        assert_eq!(num(f64::NAN), "NaN");
        assert_eq!(num(f64::INFINITY), "inf");
        assert_eq!(num(-5.004), "-5.00");
    }
}
