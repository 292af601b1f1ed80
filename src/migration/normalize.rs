// src/migration/normalize.rs

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, trace};

use super::grid::SheetGrid;
use crate::config::MigrationConfig;
use crate::error::{NormalizeError, Normalized};

/// Number of header rows: outer (region) then inner (value kind).
pub const HEADER_LEVELS: usize = 2;

/// Column holding the destination region of each data row.
pub const LABEL_COLUMN: usize = 0;

/// One directed interstate flow.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowRecord {
    /// Region moved to (row label).
    pub destination: String,
    /// Region moved from (column group label).
    pub origin: String,
    pub estimate: f64,
    pub margin_of_error: f64,
}

#[derive(Debug, Clone)]
pub struct MigrationOptions {
    pub anchor_region: String,
    /// 0-based row of the outer header.
    pub header_row: usize,
    pub national_total: Regex,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            anchor_region: "Alabama".into(),
            header_row: 6,
            national_total: Regex::new("United States").expect("national total pattern should parse"),
        }
    }
}

impl MigrationOptions {
    pub fn from_config(cfg: &MigrationConfig) -> Result<Self> {
        Ok(Self {
            anchor_region: cfg.anchor_region.clone(),
            header_row: cfg.header_row,
            national_total: Regex::new(&cfg.national_total_pattern).with_context(|| {
                format!("invalid national_total_pattern {:?}", cfg.national_total_pattern)
            })?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Estimate,
    Moe,
    Other,
}

impl ValueKind {
    pub fn classify(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "estimate" => ValueKind::Estimate,
            "moe" | "margin of error" => ValueKind::Moe,
            _ => ValueKind::Other,
        }
    }
}

/// Both header levels for one sheet column.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderColumn {
    /// Outer label, forward-filled across merged (blank) header cells.
    pub region: Option<String>,
    pub kind: ValueKind,
}

/// Read the two header rows starting at `header_row`.
pub fn parse_header(grid: &SheetGrid, header_row: usize) -> Result<Vec<HeaderColumn>, NormalizeError> {
    if grid.height() < header_row + HEADER_LEVELS {
        return Err(NormalizeError::Schema(format!(
            "sheet has {} rows, header expected on rows {} and {}",
            grid.height(),
            header_row + 1,
            header_row + 2
        )));
    }

    let mut current: Option<String> = None;
    let columns = (0..grid.width())
        .map(|col| {
            if let Some(label) = grid.cell(header_row, col).label() {
                current = Some(label);
            }
            let kind = grid
                .cell(header_row + 1, col)
                .label()
                .map(|l| ValueKind::classify(&l))
                .unwrap_or(ValueKind::Other);
            HeaderColumn {
                region: current.clone(),
                kind,
            }
        })
        .collect();
    Ok(columns)
}

/// Position of the first column labelled `anchor`.
///
/// The anchor must label a single contiguous run of columns: if it shows up
/// again after another label the layout is not one we know how to slice.
pub fn locate_anchor(header: &[HeaderColumn], anchor: &str) -> Result<usize, NormalizeError> {
    let is_anchor = |h: &HeaderColumn| h.region.as_deref() == Some(anchor);

    let start = header
        .iter()
        .skip(LABEL_COLUMN + 1)
        .position(is_anchor)
        .map(|p| p + LABEL_COLUMN + 1)
        .ok_or_else(|| NormalizeError::Schema(format!("anchor region {:?} not found in header", anchor)))?;

    let run_end = header[start..]
        .iter()
        .position(|h| !is_anchor(h))
        .map(|p| p + start)
        .unwrap_or(header.len());
    if header[run_end..].iter().any(is_anchor) {
        return Err(NormalizeError::Schema(format!(
            "anchor region {:?} labels more than one column group",
            anchor
        )));
    }
    Ok(start)
}

/// Columns contributing to one origin region.
#[derive(Debug, Clone, PartialEq)]
pub struct OriginGroup {
    pub region: String,
    pub estimate: Option<usize>,
    pub moe: Option<usize>,
    /// Duplicate-kind and unrecognised columns under the same label.
    pub overflow: Vec<usize>,
}

/// Group columns `from..` by region label. The first Estimate/MOE column seen
/// for a region is used; later ones under the same label are overflow.
pub fn origin_groups(header: &[HeaderColumn], from: usize) -> Vec<OriginGroup> {
    let mut groups: Vec<OriginGroup> = Vec::new();

    for (col, h) in header.iter().enumerate().skip(from) {
        let Some(region) = h.region.as_deref() else {
            continue;
        };
        let idx = match groups.iter().position(|g| g.region == region) {
            Some(i) => i,
            None => {
                groups.push(OriginGroup {
                    region: region.to_string(),
                    estimate: None,
                    moe: None,
                    overflow: Vec::new(),
                });
                groups.len() - 1
            }
        };
        let group = &mut groups[idx];
        let slot = match h.kind {
            ValueKind::Estimate => &mut group.estimate,
            ValueKind::Moe => &mut group.moe,
            ValueKind::Other => {
                group.overflow.push(col);
                continue;
            }
        };
        if slot.is_none() {
            *slot = Some(col);
        } else {
            group.overflow.push(col);
        }
    }

    for g in groups.iter().filter(|g| !g.overflow.is_empty()) {
        debug!(region = %g.region, columns = ?g.overflow, "ignoring overflow columns");
    }
    groups
}

/// Reshape one migration sheet into directed flows.
///
/// Fails only on layout problems; unparseable cells drop their record and are
/// listed in [`Normalized::dropped`].
pub fn normalize(grid: &SheetGrid, opts: &MigrationOptions) -> Result<Normalized<FlowRecord>, NormalizeError> {
    let header = parse_header(grid, opts.header_row)?;
    let anchor = locate_anchor(&header, &opts.anchor_region)?;
    let groups = origin_groups(&header, anchor);
    trace!(anchor, origins = groups.len(), "located region block");

    let mut out = Normalized::default();
    let mut missing = 0usize;
    let retained = |row: usize| {
        std::iter::once(LABEL_COLUMN)
            .chain(anchor..header.len())
            .map(move |col| grid.cell(row, col))
    };

    for row in opts.header_row + HEADER_LEVELS..grid.height() {
        if retained(row).all(|c| c.is_blank()) {
            continue;
        }
        let Some(destination) = grid.cell(row, LABEL_COLUMN).label() else {
            debug!(row, "skipping data row without a region label");
            continue;
        };
        if opts.national_total.is_match(&destination) {
            continue;
        }

        for group in &groups {
            if group.region == destination {
                continue;
            }
            let at = || format!("{} <- {}", destination, group.region);
            let value = |col: Option<usize>, field: &'static str| match col {
                Some(c) => grid.cell(row, c).number(field),
                None => Ok(None),
            };

            let estimate = match value(group.estimate, "estimate") {
                Ok(v) => v,
                Err(e) => {
                    out.drop_record(at(), e);
                    continue;
                }
            };
            let margin_of_error = match value(group.moe, "margin_of_error") {
                Ok(v) => v,
                Err(e) => {
                    out.drop_record(at(), e);
                    continue;
                }
            };

            match (estimate, margin_of_error) {
                (Some(estimate), Some(margin_of_error)) => out.records.push(FlowRecord {
                    destination: destination.clone(),
                    origin: group.region.clone(),
                    estimate,
                    margin_of_error,
                }),
                _ => missing += 1,
            }
        }
    }

    debug!(
        records = out.records.len(),
        dropped = out.dropped.len(),
        missing,
        "normalized migration sheet"
    );
    Ok(out)
}
