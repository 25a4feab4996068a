use std::collections::HashSet;

use crate::database::Table;
use crate::excel::CellValue;

/// Keywords that mark a first row as a header row.
const HEADER_KEYWORDS: &[&str] = &["data", "matric", "turn", "ore", "min", "valore", "nome", "cognome"];

/// Make column names unique, suffixing repeats `_1`, `_2`, ... in order.
pub fn make_unique_columns(columns: &[String]) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(columns.len());

    for column in columns {
        let base = column.trim().to_string();
        let mut candidate = base.clone();
        let mut n = 0;
        while taken.contains(&candidate) {
            n += 1;
            candidate = format!("{}_{}", base, n);
        }
        taken.insert(candidate.clone());
        out.push(candidate);
    }

    out
}

/// Canonical name for a common column alias, if it is one.
pub fn canonical_alias(column: &str) -> Option<&'static str> {
    let lower = column.trim().to_lowercase();
    let name = match lower.as_str() {
        "data" | "date" | "giorno" => "data",
        l if l.contains("matric") || l == "badge" || l == "id" => "matricola",
        l if l.contains("turn") || l == "shift" => "turno",
        "minuti" | "minutes" => "minuti",
        "ore" | "hours" => "ore",
        "valore" | "value" => "valore",
        "nome" | "nominativo" => "nome",
        _ => return None,
    };
    Some(name)
}

/// Rename aliased columns to their canonical names, keeping names unique.
pub fn normalize_columns_generic(table: &mut Table) {
    let unique = make_unique_columns(&table.columns);
    let renamed: Vec<String> = unique
        .iter()
        .map(|c| canonical_alias(c).map(str::to_string).unwrap_or_else(|| c.clone()))
        .collect();
    table.columns = make_unique_columns(&renamed);
}

/// Collapse several `valore*` columns into one `valore`.
///
/// The column with the highest share of non-zero numbers wins; the
/// others are dropped.
pub fn consolidate_value_columns(table: &mut Table) {
    let candidates: Vec<usize> = table
        .columns
        .iter()
        .enumerate()
        .filter(|(_, c)| c.starts_with("valore"))
        .map(|(i, _)| i)
        .collect();
    if candidates.len() < 2 || table.is_empty() {
        return;
    }
    table.pad_rows();

    let share = |idx: usize| {
        let non_zero = table
            .rows
            .iter()
            .filter(|row| row[idx].as_f64().map(|n| n.abs() > 0.0).unwrap_or(false))
            .count();
        non_zero as f64 / table.len() as f64
    };

    let mut keep = candidates[0];
    let mut best = share(keep);
    for &idx in &candidates[1..] {
        let s = share(idx);
        if s > best {
            best = s;
            keep = idx;
        }
    }

    let target = table.ensure_column("valore", CellValue::Number(0.0));
    for row in &mut table.rows {
        row[target] = CellValue::Number(row[keep].as_f64().unwrap_or(0.0));
    }

    let drop: Vec<String> = candidates
        .iter()
        .map(|&i| table.columns[i].clone())
        .filter(|c| c != "valore")
        .collect();
    tracing::debug!(kept = %table.columns[keep], dropped = drop.len(), "Consolidated valore columns");
    table.drop_columns(&drop);
}

/// Whether the first row of a sheet reads like a header.
pub fn looks_like_header_row(row: &[CellValue]) -> bool {
    let joined = row
        .iter()
        .map(|c| c.as_text().to_lowercase())
        .collect::<Vec<_>>()
        .join(" | ");
    HEADER_KEYWORDS.iter().any(|k| joined.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_duplicate_headers_get_suffixes() {
        let out = make_unique_columns(&cols(&["valore", " valore", "valore", "note"]));
        assert_eq!(out, cols(&["valore", "valore_1", "valore_2", "note"]));
    }

    #[test]
    fn test_suffix_skips_names_already_taken() {
        let out = make_unique_columns(&cols(&["a", "a_1", "a"]));
        assert_eq!(out, cols(&["a", "a_1", "a_2"]));
    }

    #[test]
    fn test_alias_normalisation() {
        let mut table = Table::new(cols(&["Date", "Badge", "Shift", "Minutes", "Nominativo", "UO", "Matricola"]));
        normalize_columns_generic(&mut table);
        assert_eq!(
            table.columns,
            cols(&["data", "matricola", "turno", "minuti", "nome", "UO", "matricola_1"])
        );
    }

    #[test]
    fn test_consolidate_keeps_most_populated_valore() {
        let mut table = Table::new(cols(&["valore", "valore_1", "nome"]));
        table.rows.push(vec![CellValue::Number(0.0), CellValue::Number(8.0), CellValue::text("a")]);
        table.rows.push(vec![CellValue::Empty, CellValue::Number(1.5), CellValue::text("b")]);

        consolidate_value_columns(&mut table);

        assert_eq!(table.columns, cols(&["valore", "nome"]));
        assert_eq!(table.rows[0][0], CellValue::Number(8.0));
        assert_eq!(table.rows[1][0], CellValue::Number(1.5));
    }

    #[test]
    fn test_header_row_detection() {
        let header = vec![CellValue::text("Cognome Nome"), CellValue::text("Matricola")];
        let data = vec![CellValue::text("Rossi Mario"), CellValue::text("A1234B")];
        assert!(looks_like_header_row(&header));
        assert!(!looks_like_header_row(&data));
    }
}
