//! File loaders for the CLI harness and fixtures.

use std::fs;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rbk_schemas::SeriesKind;

use crate::World;

/// One row of a prices CSV: `instrument_id,kind,date,value`.
#[derive(Clone, Debug, PartialEq)]
pub struct PriceRow {
    pub instrument_id: u64,
    pub kind: SeriesKind,
    pub date: NaiveDate,
    pub value: f64,
}

pub fn load_world_json(path: &str) -> Result<World> {
    let s = fs::read_to_string(path).with_context(|| format!("read world: {path}"))?;
    let world: World = serde_json::from_str(&s).with_context(|| format!("parse world json: {path}"))?;
    Ok(world)
}

/// Reads a headed CSV. Rows may come in any order; dates are sorted per
/// series when applied to a host.
pub fn load_prices_csv(path: &str) -> Result<Vec<PriceRow>> {
    let mut rdr = csv::Reader::from_path(path).with_context(|| format!("open prices csv: {path}"))?;
    let mut out = Vec::new();

    for (line, rec) in rdr.records().enumerate() {
        let rec = rec?;
        if rec.len() < 4 {
            anyhow::bail!("prices csv row {}: expected 4 columns, got {}", line + 1, rec.len());
        }
        let instrument_id: u64 = rec[0]
            .trim()
            .parse()
            .with_context(|| format!("row {}: parse instrument_id", line + 1))?;
        let kind = SeriesKind::parse(&rec[1])
            .with_context(|| format!("row {}: unknown series kind '{}'", line + 1, &rec[1]))?;
        let date: NaiveDate = rec[2]
            .trim()
            .parse()
            .with_context(|| format!("row {}: parse date", line + 1))?;
        let value: f64 = rec[3]
            .trim()
            .parse()
            .with_context(|| format!("row {}: parse value", line + 1))?;
        out.push(PriceRow {
            instrument_id,
            kind,
            date,
            value,
        });
    }

    Ok(out)
}
