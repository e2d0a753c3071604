//! CSV loader for experiment unit tables and external score tables
//!
//! Unit tables carry an id column, a 0/1 treatment column, an outcome column,
//! an optional propensity column and any number of numeric covariates. Every
//! column that is not one of those (and not listed in `exclude_columns`) is a
//! covariate. Rows with a blank or non-numeric value are rejected and
//! counted, not fatal: the input is assumed to be cleaned upstream.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{info, warn};

use super::DataError;
use crate::config::DataConfig;
use crate::types::{Covariates, Unit};
use crate::uplift::ExternalScores;

/// Row-level warnings logged before going quiet.
const MAX_ROW_WARNINGS: usize = 10;

/// Split a CSV line respecting quoted fields (handles commas inside quotes).
fn csv_split(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    fields.push(current);
    fields.iter().map(|f| f.trim().to_string()).collect()
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_treatment(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "1.0" | "true" => Some(true),
        "0" | "0.0" | "false" => Some(false),
        _ => None,
    }
}

/// Header positions for a unit table.
#[derive(Debug, Clone)]
struct ColumnMap {
    id: usize,
    treatment: usize,
    outcome: usize,
    propensity: Option<usize>,
    covariates: Vec<(String, usize)>,
}

impl ColumnMap {
    fn from_header(header: &[String], config: &DataConfig, source_name: &str) -> Result<Self, DataError> {
        let find = |column: &str| -> Result<usize, DataError> {
            header
                .iter()
                .position(|h| h == column)
                .ok_or_else(|| DataError::MissingColumn {
                    source_name: source_name.to_string(),
                    column: column.to_string(),
                })
        };
        let id = find(&config.id_column)?;
        let treatment = find(&config.treatment_column)?;
        let outcome = find(&config.outcome_column)?;
        let propensity = header.iter().position(|h| *h == config.propensity_column);

        let reserved: HashSet<&str> = [
            config.id_column.as_str(),
            config.treatment_column.as_str(),
            config.outcome_column.as_str(),
            config.propensity_column.as_str(),
            config.score_column.as_str(),
        ]
        .into_iter()
        .chain(config.exclude_columns.iter().map(String::as_str))
        .collect();

        let covariates = header
            .iter()
            .enumerate()
            .filter(|(_, h)| !reserved.contains(h.as_str()))
            .map(|(i, h)| (h.clone(), i))
            .collect();

        Ok(Self {
            id,
            treatment,
            outcome,
            propensity,
            covariates,
        })
    }

    fn parse_row(&self, fields: &[String], default_propensity: f64) -> Result<Unit, String> {
        let field = |i: usize| fields.get(i).map(String::as_str).unwrap_or("");

        let id = field(self.id);
        if id.is_empty() {
            return Err("empty id".to_string());
        }
        let treated = parse_treatment(field(self.treatment))
            .ok_or_else(|| format!("treatment '{}' is not 0/1", field(self.treatment)))?;
        let outcome = parse_number(field(self.outcome))
            .ok_or_else(|| format!("outcome '{}' is not a number", field(self.outcome)))?;

        let propensity = match self.propensity.map(field) {
            Some(raw) if !raw.is_empty() => {
                parse_number(raw).ok_or_else(|| format!("propensity '{raw}' is not a number"))?
            }
            _ => default_propensity,
        };
        if !(propensity > 0.0 && propensity <= 1.0) {
            return Err(format!("propensity {propensity} is outside (0, 1]"));
        }

        let mut covariates = Covariates::new();
        for (name, i) in &self.covariates {
            let value = parse_number(field(*i))
                .ok_or_else(|| format!("covariate '{name}' value '{}' is not a number", field(*i)))?;
            covariates.insert(name.clone(), value);
        }

        Ok(Unit::new(id, covariates, treated, outcome, propensity))
    }
}

/// Units parsed from one table.
#[derive(Debug, Clone, Default)]
pub struct UnitTable {
    pub units: Vec<Unit>,
    /// Covariate names in header order
    pub features: Vec<String>,
    /// Rows dropped for unparseable values
    pub rejected: usize,
}

pub fn load_units(
    path: impl AsRef<Path>,
    config: &DataConfig,
    default_propensity: f64,
) -> Result<UnitTable, DataError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| DataError::io(path, e))?;
    parse_units(
        BufReader::new(file),
        &path.display().to_string(),
        config,
        default_propensity,
    )
}

/// Parse a unit table from any reader; `source_name` labels errors and logs.
pub fn parse_units<R: BufRead>(
    reader: R,
    source_name: &str,
    config: &DataConfig,
    default_propensity: f64,
) -> Result<UnitTable, DataError> {
    let mut lines = reader.lines();
    let header = lines
        .next()
        .ok_or_else(|| DataError::EmptyFile {
            source_name: source_name.to_string(),
        })?
        .map_err(|e| DataError::io(source_name, e))?;
    let columns = ColumnMap::from_header(&csv_split(&header), config, source_name)?;

    let mut units = Vec::new();
    let mut seen = HashSet::new();
    let mut rejected = 0usize;

    for (index, line) in lines.enumerate() {
        let line_num = index + 2;
        let line = line.map_err(|e| DataError::io(source_name, e))?;
        if line.trim().is_empty() {
            continue;
        }

        match columns.parse_row(&csv_split(&line), default_propensity) {
            Ok(unit) => {
                if !seen.insert(unit.id.clone()) {
                    return Err(DataError::DuplicateId {
                        source_name: source_name.to_string(),
                        line: line_num,
                        id: unit.id,
                    });
                }
                units.push(unit);
            }
            Err(reason) => {
                if rejected < MAX_ROW_WARNINGS {
                    warn!(source = source_name, line = line_num, %reason, "Row rejected");
                }
                rejected += 1;
            }
        }
    }

    if units.is_empty() {
        return Err(DataError::NoRows {
            source_name: source_name.to_string(),
            rejected,
        });
    }
    if rejected > 0 {
        warn!(source = source_name, rejected, "Rows rejected while loading units");
    }

    let features: Vec<String> = columns.covariates.into_iter().map(|(name, _)| name).collect();
    let treated = units.iter().filter(|u| u.treated).count();
    info!(
        source = source_name,
        units = units.len(),
        treated,
        features = features.len(),
        "Loaded unit table"
    );

    Ok(UnitTable {
        units,
        features,
        rejected,
    })
}

/// Load a `{id, score}` table as a named external score column.
pub fn load_external_scores(
    path: impl AsRef<Path>,
    name: &str,
    config: &DataConfig,
) -> Result<ExternalScores, DataError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| DataError::io(path, e))?;
    parse_external_scores(BufReader::new(file), &path.display().to_string(), name, config)
}

pub fn parse_external_scores<R: BufRead>(
    reader: R,
    source_name: &str,
    name: &str,
    config: &DataConfig,
) -> Result<ExternalScores, DataError> {
    let mut lines = reader.lines();
    let header = lines
        .next()
        .ok_or_else(|| DataError::EmptyFile {
            source_name: source_name.to_string(),
        })?
        .map_err(|e| DataError::io(source_name, e))?;
    let header = csv_split(&header);
    let position = |column: &str| {
        header
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| DataError::MissingColumn {
                source_name: source_name.to_string(),
                column: column.to_string(),
            })
    };
    let id_at = position(&config.id_column)?;
    let score_at = position(&config.score_column)?;

    let mut scores = ExternalScores::new(name);
    let mut rejected = 0usize;
    for (index, line) in lines.enumerate() {
        let line_num = index + 2;
        let line = line.map_err(|e| DataError::io(source_name, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let fields = csv_split(&line);
        let id = fields.get(id_at).map(String::as_str).unwrap_or("");
        let score = fields.get(score_at).and_then(|s| parse_number(s));
        match score {
            Some(tau) if !id.is_empty() => {
                if scores.insert(id, tau).is_some() {
                    return Err(DataError::DuplicateId {
                        source_name: source_name.to_string(),
                        line: line_num,
                        id: id.to_string(),
                    });
                }
            }
            _ => {
                if rejected < MAX_ROW_WARNINGS {
                    warn!(source = source_name, line = line_num, "Score row rejected");
                }
                rejected += 1;
            }
        }
    }

    if scores.is_empty() {
        return Err(DataError::NoRows {
            source_name: source_name.to_string(),
            rejected,
        });
    }
    info!(source = source_name, model = name, scores = scores.len(), rejected, "Loaded external scores");
    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const UNITS: &str = "\
id,treatment,outcome,recency,\"spend, last year\",segment
a,1,12.5,3,100,7
b,0,8.0,10,50,7
c,true,,4,20,7
d,0,4.5,,20,7
e,false,3.25,2,\"1e2\",7
";

    fn config() -> DataConfig {
        DataConfig {
            exclude_columns: vec!["segment".to_string()],
            ..DataConfig::default()
        }
    }

    #[test]
    fn test_csv_split_handles_quotes() {
        assert_eq!(
            csv_split(r#"a,"b, c","say ""hi""",d"#),
            vec!["a", "b, c", "say \"hi\"", "d"]
        );
        assert_eq!(csv_split("x,,y"), vec!["x", "", "y"]);
    }

    #[test]
    fn test_parse_units_rejects_blank_values() {
        let table = parse_units(Cursor::new(UNITS), "units.csv", &config(), 0.5).unwrap();
        assert_eq!(table.units.len(), 3);
        assert_eq!(table.rejected, 2);
        assert_eq!(table.features, vec!["recency", "spend, last year"]);

        let e = &table.units[2];
        assert_eq!(e.id, "e");
        assert!(!e.treated);
        assert_eq!(e.covariate("spend, last year"), Some(100.0));
        assert_eq!(e.propensity, 0.5);
        assert!(e.covariate("segment").is_none());
    }

    #[test]
    fn test_propensity_column_overrides_default() {
        let csv = "id,treatment,outcome,propensity,x\na,1,1.0,0.2,1\nb,0,1.0,,2\nc,0,1.0,0,3\n";
        let table = parse_units(Cursor::new(csv), "p.csv", &DataConfig::default(), 0.5).unwrap();
        assert_eq!(table.units[0].propensity, 0.2);
        assert_eq!(table.units[1].propensity, 0.5);
        // zero propensity is rejected
        assert_eq!(table.rejected, 1);
        assert_eq!(table.features, vec!["x"]);
    }

    #[test]
    fn test_missing_column_and_duplicates() {
        let missing = parse_units(Cursor::new("id,outcome\na,1\n"), "m.csv", &DataConfig::default(), 0.5);
        assert!(matches!(missing, Err(DataError::MissingColumn { column, .. }) if column == "treatment"));

        let dup = "id,treatment,outcome\na,1,1\na,0,2\n";
        assert!(matches!(
            parse_units(Cursor::new(dup), "d.csv", &DataConfig::default(), 0.5),
            Err(DataError::DuplicateId { line: 3, .. })
        ));
        assert!(matches!(
            parse_units(Cursor::new(""), "e.csv", &DataConfig::default(), 0.5),
            Err(DataError::EmptyFile { .. })
        ));
    }

    #[test]
    fn test_parse_external_scores() {
        let csv = "id,tau,extra\na,0.5,x\nb,-1.25,y\nc,,z\n";
        let scores = parse_external_scores(Cursor::new(csv), "s.csv", "forest", &DataConfig::default()).unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores.get("b"), Some(-1.25));
        assert_eq!(scores.get("c"), None);
    }
}
