//! Report writers
//!
//! The JSON report is the complete record. CSV files are flat views of its
//! lift, policy and profit-curve sections plus the score table. Undefined
//! statistics (NaN) are written as empty CSV fields.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use super::DataError;
use crate::types::{EvaluationReport, LiftTable, PolicyRow, ProfitCurve, ScoreTable};

pub const REPORT_FILE: &str = "report.json";
pub const LIFT_FILE: &str = "lift.csv";
pub const POLICY_FILE: &str = "policy.csv";
pub const CURVE_FILE: &str = "profit_curve.csv";
pub const SCORES_FILE: &str = "scores.csv";

fn num(value: f64) -> String {
    if value.is_finite() {
        value.to_string()
    } else {
        String::new()
    }
}

fn quote(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

pub fn write_lift_csv<W: Write>(out: &mut W, tables: &[LiftTable]) -> std::io::Result<()> {
    writeln!(
        out,
        "model,bucket_index,size,treated_count,control_count,mean_score,empirical_effect,std_error,ci_lower,ci_upper,lift,undefined"
    )?;
    for table in tables {
        for g in &table.groups {
            let undefined = match g.undefined {
                Some(reason) => serde_json::to_value(reason)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default(),
                None => String::new(),
            };
            writeln!(
                out,
                "{},{},{},{},{},{},{},{},{},{},{},{}",
                quote(&table.model),
                g.bucket_index,
                g.size,
                g.treated_count,
                g.control_count,
                num(g.mean_score),
                num(g.empirical_effect),
                num(g.std_error),
                num(g.ci_lower),
                num(g.ci_upper),
                num(g.lift),
                undefined
            )?;
        }
    }
    Ok(())
}

pub fn write_policy_csv<W: Write>(out: &mut W, rows: &[PolicyRow]) -> std::io::Result<()> {
    writeln!(out, "name,targeted_fraction,estimated_profit")?;
    for row in rows {
        writeln!(
            out,
            "{},{},{}",
            quote(&row.name),
            num(row.targeted_fraction),
            num(row.estimated_profit)
        )?;
    }
    Ok(())
}

/// One row per curve point; `is_best` marks each curve's argmax.
pub fn write_curves_csv<W: Write>(out: &mut W, curves: &[ProfitCurve]) -> std::io::Result<()> {
    writeln!(out, "model,top_percent,estimated_profit,is_best")?;
    for curve in curves {
        let mut best_written = false;
        for point in &curve.points {
            let is_best = !best_written && *point == curve.best;
            best_written |= is_best;
            writeln!(
                out,
                "{},{},{},{}",
                quote(&curve.model),
                num(point.top_percent),
                num(point.estimated_profit),
                is_best
            )?;
        }
    }
    Ok(())
}

pub fn write_scores_csv<W: Write>(out: &mut W, scores: &ScoreTable) -> std::io::Result<()> {
    let header: Vec<String> = ["id", "treatment", "outcome"]
        .iter()
        .map(|s| s.to_string())
        .chain(scores.models().iter().map(|m| quote(m)))
        .collect();
    writeln!(out, "{}", header.join(","))?;
    for row in scores.rows() {
        let mut fields = vec![
            quote(&row.unit.id),
            if row.unit.treated { "1" } else { "0" }.to_string(),
            num(row.unit.outcome),
        ];
        fields.extend(
            scores
                .models()
                .iter()
                .map(|m| row.tau(m).map(num).unwrap_or_default()),
        );
        writeln!(out, "{}", fields.join(","))?;
    }
    Ok(())
}

fn create(path: &Path) -> Result<BufWriter<File>, DataError> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| DataError::io(path, e))
}

fn write_csv<F>(path: PathBuf, write: F) -> Result<PathBuf, DataError>
where
    F: FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
{
    let mut out = create(&path)?;
    write(&mut out)
        .and_then(|_| out.flush())
        .map_err(|e| DataError::io(&path, e))?;
    Ok(path)
}

/// Write the JSON report and every CSV view into `dir`.
pub fn write_bundle(
    dir: impl AsRef<Path>,
    report: &EvaluationReport,
    scores: &ScoreTable,
) -> Result<Vec<PathBuf>, DataError> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).map_err(|e| DataError::io(dir, e))?;

    let report_path = dir.join(REPORT_FILE);
    let json = serde_json::to_vec_pretty(report)?;
    fs::write(&report_path, json).map_err(|e| DataError::io(&report_path, e))?;

    let written = vec![
        report_path,
        write_csv(dir.join(LIFT_FILE), |out| write_lift_csv(out, &report.lift_tables))?,
        write_csv(dir.join(POLICY_FILE), |out| write_policy_csv(out, &report.policy_table))?,
        write_csv(dir.join(CURVE_FILE), |out| write_curves_csv(out, &report.profit_curves))?,
        write_csv(dir.join(SCORES_FILE), |out| write_scores_csv(out, scores))?,
    ];

    info!(dir = %dir.display(), files = written.len(), "Report written");
    Ok(written)
}
