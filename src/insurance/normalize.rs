// src/insurance/normalize.rs

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{NormalizeError, Normalized};

/// Table-internal header rows preceding the body.
pub const HEADER_ROWS: usize = 2;
/// Fields per region record: year, region, two premiums, two ranks.
pub const RECORD_WIDTH: usize = 6;
/// Body row as published: two regions without the year.
pub const NATIVE_ROW_WIDTH: usize = 2 * NATIVE_HALF_WIDTH;
/// Body row once each half carries its year.
pub const STAMPED_ROW_WIDTH: usize = 2 * RECORD_WIDTH;
/// Trailing row holding a single region, as published.
pub const NATIVE_HALF_WIDTH: usize = RECORD_WIDTH - 1;

/// One year's table, as rows of cell text.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSection {
    pub year: String,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsuranceRecord {
    pub year: i32,
    #[serde(rename = "state")]
    pub region: String,
    pub homeowners_avg_premium: f64,
    pub homeowners_rank: u32,
    pub renters_avg_premium: f64,
    pub renters_rank: u32,
}

/// First whitespace-delimited token after the last comma of a heading.
///
/// `"Average premiums ..., 2019 (1)"` gives `"2019"`.
pub fn year_label(heading: &str) -> Option<String> {
    heading
        .rsplit(',')
        .next()?
        .split_whitespace()
        .next()
        .map(str::to_string)
}

/// Split a body row into its region records, stamping `year` into
/// page-native rows. A row may hold two regions, or one when the table has
/// an odd number of regions and the last row is half empty.
pub fn split_row(row: &[String], year: &str, index: usize) -> Result<Vec<Vec<String>>, NormalizeError> {
    match row.len() {
        NATIVE_ROW_WIDTH | NATIVE_HALF_WIDTH => Ok(row
            .chunks(NATIVE_HALF_WIDTH)
            .map(|half| {
                let mut rec = Vec::with_capacity(RECORD_WIDTH);
                rec.push(year.to_string());
                rec.extend_from_slice(half);
                rec
            })
            .collect()),
        STAMPED_ROW_WIDTH | RECORD_WIDTH => Ok(row.chunks(RECORD_WIDTH).map(<[String]>::to_vec).collect()),
        width => Err(NormalizeError::Layout {
            row: index,
            width,
            expected: format!(
                "{}, {}, {} or {}",
                NATIVE_HALF_WIDTH, RECORD_WIDTH, NATIVE_ROW_WIDTH, STAMPED_ROW_WIDTH
            ),
        }),
    }
}

/// Raw records of one section in row order. Any malformed body row rejects
/// the whole table.
pub fn section_records(section: &TableSection) -> Result<Vec<Vec<String>>, NormalizeError> {
    let mut out = Vec::with_capacity(section.rows.len().saturating_sub(HEADER_ROWS) * 2);
    for (index, row) in section.rows.iter().enumerate().skip(HEADER_ROWS) {
        out.extend(split_row(row, &section.year, index)?);
    }
    Ok(out)
}

fn parse_amount(field: &'static str, raw: &str) -> Result<f64, NormalizeError> {
    let cleaned: String = raw.chars().filter(|c| *c != '$' && *c != ',').collect();
    match cleaned.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(v),
        _ => Err(NormalizeError::parse(field, raw, "non-negative amount")),
    }
}

fn parse_rank(field: &'static str, raw: &str) -> Result<u32, NormalizeError> {
    match raw.trim().parse::<u32>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(NormalizeError::parse(field, raw, "positive rank")),
    }
}

/// Typed record from a 6-field raw record.
pub fn parse_record(raw: &[String]) -> Result<InsuranceRecord, NormalizeError> {
    let field = |i: usize| raw.get(i).map(String::as_str).unwrap_or("");

    let year = field(0)
        .trim()
        .parse::<i32>()
        .map_err(|_| NormalizeError::parse("year", field(0), "year"))?;
    let region = field(1).trim();
    if region.is_empty() {
        return Err(NormalizeError::parse("state", region, "region name"));
    }

    Ok(InsuranceRecord {
        year,
        region: region.to_string(),
        homeowners_avg_premium: parse_amount("homeowners_avg_premium", field(2))?,
        homeowners_rank: parse_rank("homeowners_rank", field(3))?,
        renters_avg_premium: parse_amount("renters_avg_premium", field(4))?,
        renters_rank: parse_rank("renters_rank", field(5))?,
    })
}

/// Reshape the yearly tables into one relation sorted by `(year, region)`.
///
/// A malformed table is reported in `dropped` and skipped; a record with an
/// unparseable field is reported and skipped.
pub fn normalize(sections: &[TableSection]) -> Normalized<InsuranceRecord> {
    let mut out = Normalized::default();

    for section in sections {
        let raw = match section_records(section) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(year = %section.year, error = %e, "skipping malformed table");
                out.drop_record(format!("{} table", section.year), e);
                continue;
            }
        };
        for (i, rec) in raw.iter().enumerate() {
            match parse_record(rec) {
                Ok(r) => out.records.push(r),
                Err(e) => {
                    debug!(year = %section.year, record = i, error = %e, "dropping record");
                    out.drop_record(format!("{} record {}", section.year, i), e);
                }
            }
        }
    }

    out.records
        .sort_by(|a, b| (a.year, &a.region).cmp(&(b.year, &b.region)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    fn header() -> Vec<Vec<String>> {
        vec![
            strings(&["Average premiums, 2019"]),
            strings(&["State", "Homeowners", "Rank", "Renters", "Rank"]),
        ]
    }

    fn section(year: &str, body: &[&[&str]]) -> TableSection {
        let mut rows = header();
        rows.extend(body.iter().map(|r| strings(r)));
        TableSection {
            year: year.to_string(),
            rows,
        }
    }

    #[test]
    fn year_label_takes_token_after_last_comma() {
        assert_eq!(
            year_label("Average premiums for homeowners and renters insurance, 2019 (1)").as_deref(),
            Some("2019")
        );
        assert_eq!(
            year_label("Average premiums, United States, 2020").as_deref(),
            Some("2020")
        );
        assert_eq!(year_label("No comma 2018").as_deref(), Some("No"));
        assert_eq!(year_label("Trailing comma,"), None);
    }

    #[test]
    fn stamped_row_splits_into_two_records() {
        let s = section(
            "2019",
            &[&[
                "2019", "Alabama", "$1,234", "5", "$987", "3", "2019", "Alaska", "$1,111", "7", "$900", "2",
            ]],
        );
        let out = normalize(&[s]);
        assert!(out.dropped.is_empty());
        assert_eq!(
            out.records,
            vec![
                InsuranceRecord {
                    year: 2019,
                    region: "Alabama".into(),
                    homeowners_avg_premium: 1234.0,
                    homeowners_rank: 5,
                    renters_avg_premium: 987.0,
                    renters_rank: 3,
                },
                InsuranceRecord {
                    year: 2019,
                    region: "Alaska".into(),
                    homeowners_avg_premium: 1111.0,
                    homeowners_rank: 7,
                    renters_avg_premium: 900.0,
                    renters_rank: 2,
                },
            ]
        );
    }

    #[test]
    fn native_row_is_stamped_with_section_year() {
        let s = section(
            "2018",
            &[&["Arizona", "$800", "30", "$180", "25", "Arkansas", "$1,200", "10", "$200", "12"]],
        );
        let out = normalize(&[s]);
        assert_eq!(out.records.len(), 2);
        assert!(out.records.iter().all(|r| r.year == 2018));
        assert_eq!(out.records[1].region, "Arkansas");
        assert_eq!(out.records[1].homeowners_avg_premium, 1200.0);
    }

    #[test]
    fn short_row_rejects_only_its_table() {
        let bad = section(
            "2019",
            &[
                &["Alabama", "$1,234", "5", "$987", "3", "Alaska", "$1,111", "7", "$900", "2"],
                &["2019", "Arizona", "$800", "30", "$180", "25", "2019", "Arkansas", "$1,200", "10", "$200"],
            ],
        );
        let good = section(
            "2020",
            &[&["Alabama", "$1,300", "6", "$990", "4", "Alaska", "$1,150", "8", "$910", "3"]],
        );

        let out = normalize(&[bad, good]);
        assert_eq!(out.records.len(), 2);
        assert!(out.records.iter().all(|r| r.year == 2020));
        assert_eq!(out.dropped.len(), 1);
        assert_eq!(out.dropped[0].at, "2019 table");
        assert_eq!(
            out.dropped[0].reason,
            NormalizeError::Layout {
                row: 3,
                width: 11,
                expected: "5, 6, 10 or 12".into()
            }
        );
    }

    #[test]
    fn half_empty_last_row_keeps_its_region() {
        let s = section(
            "2021",
            &[
                &["Alabama", "$1,300", "6", "$990", "4", "Alaska", "$1,150", "8", "$910", "3"],
                &["Wyoming", "$900", "40", "$150", "45"],
            ],
        );
        let out = normalize(&[s]);
        assert!(out.dropped.is_empty());
        let regions: Vec<&str> = out.records.iter().map(|r| r.region.as_str()).collect();
        assert_eq!(regions, vec!["Alabama", "Alaska", "Wyoming"]);
        assert_eq!(out.records[2].year, 2021);
        assert_eq!(out.records[2].renters_rank, 45);
    }

    #[test]
    fn unparseable_field_drops_whole_record() {
        let s = section(
            "2019",
            &[&["Alabama", "$1,234", "N/A", "$987", "3", "Alaska", "$1,111", "7", "$900", "2"]],
        );
        let out = normalize(&[s]);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].region, "Alaska");
        assert!(matches!(
            out.dropped[0].reason,
            NormalizeError::Parse { field: "homeowners_rank", .. }
        ));
    }

    #[test]
    fn output_is_sorted_by_year_then_region() {
        let later = section(
            "2020",
            &[&["Wyoming", "$900", "40", "$150", "45", "Alabama", "$1,300", "6", "$990", "4"]],
        );
        let earlier = section(
            "2019",
            &[&["Texas", "$1,900", "2", "$210", "20", "Ohio", "$800", "44", "$170", "40"]],
        );

        let out = normalize(&[later, earlier]);
        let keys: Vec<(i32, &str)> = out.records.iter().map(|r| (r.year, r.region.as_str())).collect();
        assert_eq!(
            keys,
            vec![(2019, "Ohio"), (2019, "Texas"), (2020, "Alabama"), (2020, "Wyoming")]
        );
        for r in &out.records {
            assert!(r.homeowners_avg_premium >= 0.0);
            assert!(r.homeowners_rank > 0 && r.renters_rank > 0);
        }
    }

    #[test]
    fn header_only_table_yields_nothing() {
        let out = normalize(&[section("2019", &[])]);
        assert!(out.records.is_empty());
        assert!(out.dropped.is_empty());
    }
}
