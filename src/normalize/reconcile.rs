use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};

use crate::database::Table;
use crate::excel::CellValue;
use crate::normalize::coerce::{minutes_to_hours, number_or_zero};

/// Collapse several same-day rows per person into one primary shift row
/// plus secondary activity rows.
///
/// Rows are grouped by `(matricola, day)`. Within a group the primary row
/// is the longest one whose `turno` is a canonical shift code, or the
/// longest overall when none is; the other rows move their `turno` into
/// `att` (when blank) and clear `turno`. Running it on its own output
/// changes nothing.
pub fn reconcile(table: &Table, canonical: &HashSet<String>) -> Table {
    let mut out = table.clone();
    if out.is_empty() {
        return out;
    }
    out.pad_rows();

    let id_col = out.ensure_column("matricola", CellValue::Empty);
    let shift_col = out.ensure_column("turno", CellValue::Empty);
    let act_col = out.ensure_column("att", CellValue::Empty);
    let Some(date_col) = out.column_index("data") else {
        return out;
    };

    let minutes_col = match out.column_index("minuti") {
        Some(idx) => {
            for row in &mut out.rows {
                row[idx] = CellValue::Number(number_or_zero(&row[idx]));
            }
            idx
        }
        None => match out.column_index("valore") {
            Some(hours_col) => {
                let idx = out.ensure_column("minuti", CellValue::Number(0.0));
                for row in &mut out.rows {
                    let hours = number_or_zero(&row[hours_col]);
                    row[hours_col] = CellValue::Number(hours);
                    row[idx] = CellValue::Number((hours * 60.0).round());
                }
                idx
            }
            None => out.ensure_column("minuti", CellValue::Number(0.0)),
        },
    };

    for row in &mut out.rows {
        if let Some(day) = row[date_col].as_date() {
            row[date_col] = CellValue::Date(day);
        }
        row[shift_col] = CellValue::from(row[shift_col].as_text());
        row[act_col] = CellValue::from(row[act_col].as_text());
    }

    let canonical: HashSet<String> = canonical
        .iter()
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
        .collect();

    // Groups in order of first appearance.
    let mut order: Vec<Vec<usize>> = Vec::new();
    let mut index: HashMap<(String, Option<NaiveDate>), usize> = HashMap::new();
    for (i, row) in out.rows.iter().enumerate() {
        let key = (row[id_col].as_text(), row[date_col].as_date());
        let slot = *index.entry(key).or_insert_with(|| {
            order.push(Vec::new());
            order.len() - 1
        });
        order[slot].push(i);
    }

    let minutes = |row: &Vec<CellValue>| number_or_zero(&row[minutes_col]);
    let mut rows = Vec::with_capacity(out.rows.len());
    for group in order {
        if group.len() == 1 {
            rows.push(out.rows[group[0]].clone());
            continue;
        }

        let canonical_members: Vec<usize> = group
            .iter()
            .copied()
            .filter(|&i| canonical.contains(&out.rows[i][shift_col].as_text().to_uppercase()))
            .collect();
        let pool = if canonical_members.is_empty() {
            &group
        } else {
            &canonical_members
        };

        let mut primary = pool[0];
        for &i in &pool[1..] {
            if minutes(&out.rows[i]) > minutes(&out.rows[primary]) {
                primary = i;
            }
        }

        rows.push(out.rows[primary].clone());
        for &i in group.iter().filter(|&&i| i != primary) {
            let mut secondary = out.rows[i].clone();
            if secondary[act_col].is_empty() {
                secondary[act_col] = secondary[shift_col].clone();
            }
            secondary[shift_col] = CellValue::Empty;
            rows.push(secondary);
        }
    }
    out.rows = rows;

    let value_col = out.ensure_column("valore", CellValue::Number(0.0));
    for row in &mut out.rows {
        let m = number_or_zero(&row[minutes_col]);
        row[value_col] = CellValue::Number(minutes_to_hours(m));
    }

    out.dedup_rows();
    out
}
