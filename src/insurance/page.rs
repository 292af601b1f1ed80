// src/insurance/page.rs

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use super::normalize::TableSection;

static SPAN: Lazy<Selector> = Lazy::new(|| Selector::parse("span").expect("span selector should parse"));
static TABLE: Lazy<Selector> = Lazy::new(|| Selector::parse("table").expect("table selector should parse"));
static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("row selector should parse"));
static CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("td, th").expect("cell selector should parse"));

/// Text of the year-bearing section headings: `<span>` elements whose
/// lower-cased text contains `marker`.
pub fn section_headings(document: &Html, marker: &str) -> Vec<String> {
    let marker = marker.to_lowercase();
    document
        .select(&SPAN)
        .map(|span| span.text().collect::<String>())
        .filter(|text| text.to_lowercase().contains(&marker))
        .collect()
}

/// Rows of a table as trimmed cell text, with empty cells removed.
pub fn table_rows(table: ElementRef<'_>) -> Vec<Vec<String>> {
    table
        .select(&ROW)
        .map(|row| {
            row.select(&CELL)
                .map(|cell| cell.text().collect::<String>().trim().to_string())
                .filter(|text| !text.is_empty())
                .collect()
        })
        .collect()
}

/// Pair the Nth heading's year label with the Nth relevant table. Only
/// odd-indexed tables (0-based) in the page carry data.
pub fn extract_sections(html: &str, marker: &str) -> Vec<TableSection> {
    let document = Html::parse_document(html);
    let headings = section_headings(&document, marker);
    let tables: Vec<ElementRef<'_>> = document.select(&TABLE).skip(1).step_by(2).collect();

    if headings.len() != tables.len() {
        warn!(
            headings = headings.len(),
            tables = tables.len(),
            "heading and table counts differ, pairing in order"
        );
    }

    headings
        .iter()
        .zip(tables)
        .filter_map(|(heading, table)| match super::normalize::year_label(heading) {
            Some(year) => Some(TableSection {
                year,
                rows: table_rows(table),
            }),
            None => {
                warn!(%heading, "no year in section heading, skipping its table");
                None
            }
        })
        .inspect(|s| debug!(year = %s.year, rows = s.rows.len(), "extracted section"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKER: &str = "average premiums for homeowners and renters insurance";

    fn page() -> String {
        let table = |year: &str, first: &str| {
            format!(
                r#"<table>
                  <tr><th colspan="10">Homeowners and renters, {year}</th></tr>
                  <tr><th>State</th><th>Homeowners</th><th>Rank</th><th>Renters</th><th>Rank</th>
                      <th>State</th><th>Homeowners</th><th>Rank</th><th>Renters</th><th>Rank</th></tr>
                  <tr><td>{first}</td><td>$1,234</td><td>5</td><td>$987</td><td>3</td>
                      <td>Alaska</td><td>$1,111</td><td>7</td><td>$900</td><td>2&nbsp;</td><td>&nbsp;</td></tr>
                </table>"#
            )
        };
        format!(
            r#"<html><body>
              <table><tr><td>navigation</td></tr></table>
              <h2><span>Average Premiums For Homeowners And Renters Insurance, 2019 (1)</span></h2>
              {}
              <table><tr><td>ad</td></tr></table>
              <h2><span>Average premiums for homeowners and renters insurance, United States, 2020 (1)</span></h2>
              {}
              <span>Unrelated heading, 1999</span>
            </body></html>"#,
            table("2019", "Alabama"),
            table("2020", "Arizona")
        )
    }

    #[test]
    fn pairs_headings_with_odd_tables() {
        let sections = extract_sections(&page(), MARKER);
        assert_eq!(sections.len(), 2);

        assert_eq!(sections[0].year, "2019");
        assert_eq!(sections[0].rows.len(), 3);
        assert_eq!(
            sections[0].rows[2],
            vec!["Alabama", "$1,234", "5", "$987", "3", "Alaska", "$1,111", "7", "$900", "2"]
        );

        assert_eq!(sections[1].year, "2020");
        assert_eq!(sections[1].rows[2][0], "Arizona");
    }

    #[test]
    fn headings_are_matched_case_insensitively() {
        let document = Html::parse_document(&page());
        let headings = section_headings(&document, MARKER);
        assert_eq!(headings.len(), 2);
        assert!(headings[0].ends_with("2019 (1)"));
    }
}
