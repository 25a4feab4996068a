use crate::database::Table;
use crate::excel::{CellValue, SheetData};
use crate::normalize::columns::normalize_columns_generic;

/// Normalise an imported holiday sheet to `data` (perpetual `dd/mm`) and
/// `nome` columns. Rows without a recognisable day are dropped.
pub fn normalize_holidays(sheet: &SheetData) -> Table {
    let mut source = Table::from_sheet(sheet);
    normalize_columns_generic(&mut source);

    let mut out = Table::new(vec!["data".to_string(), "nome".to_string()]);
    if source.columns.is_empty() {
        return out;
    }

    let find = |names: &[&str]| {
        names.iter().find_map(|n| {
            source
                .columns
                .iter()
                .position(|c| c.to_lowercase() == *n)
        })
    };
    let day_col = find(&["data", "giorno", "ggmm"]).unwrap_or(0);
    let name_col = find(&["nome", "festivo", "descrizione"])
        .or_else(|| (source.columns.len() > 1).then_some(1));

    for row in &source.rows {
        let Some(day) = to_day_month(&row[day_col]) else {
            continue;
        };
        let name = name_col.map(|idx| row[idx].as_text()).unwrap_or_default();
        out.rows.push(vec![CellValue::text(day), CellValue::from(name)]);
    }

    out
}

/// `dd/mm` for a holiday cell: real dates are formatted, anything else is
/// read as `ddmm` digits (`101` is `01/01`).
pub fn to_day_month(value: &CellValue) -> Option<String> {
    match value {
        CellValue::Date(d) => return Some(d.format("%d/%m").to_string()),
        CellValue::DateTime(dt) => return Some(dt.format("%d/%m").to_string()),
        CellValue::String(s) => {
            if let Some(dt) = crate::normalize::coerce::parse_day_first(s) {
                return Some(dt.format("%d/%m").to_string());
            }
        }
        _ => {}
    }

    let mut digits: String = value.as_text().chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() == 3 {
        digits.insert(0, '0');
    }
    if digits.len() < 4 {
        return None;
    }
    Some(format!("{}/{}", &digits[..2], &digits[2..4]))
}
