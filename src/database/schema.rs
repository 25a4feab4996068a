//! Table catalog, default headers and the absence-code seed.

use std::collections::HashMap;

use super::types::EnsureReport;
use super::DbError;
use crate::excel::{CellValue, SheetData};

pub const ACTIVITY_TABLE: &str = "Attivita";
pub const SHIFT_TYPES_TABLE: &str = "Turni_tipo";
pub const HOLIDAYS_TABLE: &str = "Festivi";
pub const ABSENCE_TABLE: &str = "Turni_Assenze";
pub const ABSENCE_COLUMN: &str = "Turno";

/// Every table of the store, in sheet order.
pub const TABLES: &[&str] = &[
    "Attivita",
    "Personale",
    "Straordinario",
    "Ripo",
    "tbl_UO",
    "CatProfTipo",
    "Turni_tipo",
    "ColoriTurni",
    "TargetOp",
    "AbilitazioniTipo",
    "AltreAbilitazioniPers",
    "idoneitaMedicheTipo",
    "IdoneitaMedichePers",
    "Specializzazioni_tipo",
    "SpecUO-CompTipo",
    "SpecUOPers",
    "Personale_PartTime",
    "Ferie_spettanti",
    "Ferie_AP",
    "Ferie_Godute",
    "Malattia",
    "Infortunio",
    "Maternita",
    "Permesso",
    "Aspettativa",
    "Congedo",
    "Sciopero",
    "Altro_Assenza",
    "Formazione",
    "Missione",
    "Smart_Working",
    "Note",
    "Festivi",
    "Turni_Assenze",
];

/// Codes seeded into an empty absence table.
pub const DEFAULT_ABSENCE_CODES: &[&str] = &[
    "FER", "RPD", "RPN", "104", "ASS", "CONP", "DONS", "MAL", "MAT", "PDEC", "VMSP", "ROS", "NASF",
    "INF", "MALF", "MIX", "PRLS", "SCIO", "RCI", "ALL", "PELE", "PEXT", "PSIN", "ESAU",
];

/// Header row written when a table is created.
pub fn template_headers(table: &str) -> &'static [&'static str] {
    match table {
        "AbilitazioniTipo" => &["abilitazione", "Tipologia", "note", "periodicita1", "periodicita2"],
        "AltreAbilitazioniPers" => &[
            "Matricola", "categ_professionale", "Abilitazione", "note", "dataSuCert", "rinnovo",
            "zone", "nr_documento",
        ],
        "CatProfTipo" => &["CAT", "note"],
        "ColoriTurni" => &["Pattern", "BkR", "BkG", "BkB", "FkR", "FkG", "FkB", "Bold", "Priority"],
        "Ferie_AP" => &[
            "matricola", "cognome_e_nome", "gg_ferie_AP", "hr_ferie_AP", "gg_RFS_AP", "hr_RFS_AP",
            "anno",
        ],
        "Ferie_spettanti" => &["Da anni", "A anni", "Giorni_Spett", "RFS_Spett"],
        "IdoneitaMedichePers" => &[
            "Matricola", "categ_professionale", "idoneita", "note", "dataSuCert", "rinnovo",
        ],
        "Personale" => &[
            "CAT", "matricola", "Nome", "UO", "regime_orario", "no_spec", "note_scheda_pers",
            "In_Forza", "Data_di_Nascita", "Luogo_di_Nascita", "Cittadinanza",
            "Via_e_numero_civico", "Città", "Provincia", "CAP", "Cod_Fiscale", "note",
            "Indirizzo_posta_elettronica", "Telefono_uff", "Telefono_ab", "Tel_Cellulare", "Fax",
            "Data_prima_Assunzione", "Licenza", "Data_Rilascio_Licenza", "Allegato", "ENG_lvl",
            "Documenti",
        ],
        "Personale_PartTime" => &[
            "cognome_e_nome", "matricola", "categ_professionale", "%_part_time", "ID_part_time",
            "dal", "al",
        ],
        "Ripo" => &[
            "MATRICOLA", "COGNOME", "NOME", "SETTORE", "DATA", "IMPIANTO", "INIZIO TURNO",
            "FINE TURNO", "ORAE", "ORAU", "PAUSA", "SPEZZONE", "SIGLA_ATTIVITA", "StartDT", "EndDT",
            "WorkDate", "Seq", "MinutiPOX",
        ],
        "SpecUO-CompTipo" => &["SpecUO/Comp", "Tipologia", "note", "1_R", "2_R", "R_C", "Su_impianto"],
        "SpecUOPers" => &[
            "Matricola", "categ_professionale", "SpecUO/Comp", "note", "dataSuLic", "1_rinnovo",
            "doc_1r", "2_rinnovo", "doc_2r", "R_comp", "doc_R_comp", "note1R", "note2R", "notecomp",
        ],
        "Specializzazioni_tipo" => &["SPECIALIZZAZIONE", "POX"],
        "Straordinario" => &[
            "CAT", "Nome", "matricola", "UO", "turno", "att", "data", "valore", "STP",
            "contattato_il", "note",
        ],
        "TargetOp" => &["Days", "TargetOpTot"],
        "Turni_tipo" => &[
            "Turno", "OraInizio", "OraFine", "Minuti", "SplitNotte", "MinutiGiornoCorrente",
            "MinutiGiornoPrecedente", "IsOperativo", "Categoria",
        ],
        "idoneitaMedicheTipo" => &["Idoneita", "Tipologia", "note", "periodicita1", "periodicita2", "Is_Attiva"],
        "tbl_UO" => &["UO"],
        "Festivi" => &["GiornoFestivo", "Descrizione", "Localita"],
        "Turni_Assenze" => &["Turno"],
        _ => &[],
    }
}

pub fn is_catalog_table(name: &str) -> bool {
    TABLES.contains(&name)
}

/// Reject names outside the catalog before any I/O happens.
pub fn require_table(name: &str) -> Result<(), DbError> {
    if is_catalog_table(name) {
        Ok(())
    } else {
        Err(DbError::UnknownTable(name.to_string()))
    }
}

/// Catalog tables absent from `existing`, in catalog order.
pub fn missing_tables<S: AsRef<str>>(existing: &[S]) -> Vec<&'static str> {
    TABLES
        .iter()
        .copied()
        .filter(|t| !existing.iter().any(|e| e.as_ref() == *t))
        .collect()
}

/// A freshly created sheet for `table`: template header, plus the default
/// codes for the absence table.
pub fn empty_sheet(table: &str) -> SheetData {
    let headers = template_headers(table);
    if headers.is_empty() {
        return SheetData::new(table, Vec::new());
    }
    let header = headers.iter().map(|h| CellValue::text(*h)).collect();
    let sheet = SheetData::new(table, vec![header]);
    if table == ABSENCE_TABLE {
        seed_absence_codes(&sheet)
    } else {
        sheet
    }
}

fn absence_column(sheet: &SheetData) -> usize {
    sheet
        .header()
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(ABSENCE_COLUMN))
        .unwrap_or(0)
}

/// True when the absence table holds no code at all.
pub fn absence_needs_seed(sheet: &SheetData) -> bool {
    let col = absence_column(sheet);
    !sheet
        .body()
        .iter()
        .any(|row| row.get(col).map(|c| !c.is_empty()).unwrap_or(false))
}

/// Fill an empty absence sheet with the default codes, keeping its header.
pub fn seed_absence_codes(sheet: &SheetData) -> SheetData {
    let mut header: Vec<CellValue> = sheet.rows.first().cloned().unwrap_or_default();
    if header.iter().all(CellValue::is_empty) {
        header = vec![CellValue::text(ABSENCE_COLUMN)];
    }
    let col = absence_column(&SheetData::new(ABSENCE_TABLE, vec![header.clone()]));
    let width = header.len();

    let mut rows = vec![header];
    for code in DEFAULT_ABSENCE_CODES {
        let mut row = vec![CellValue::Empty; width];
        row[col] = CellValue::text(*code);
        rows.push(row);
    }
    SheetData::new(sheet.name.clone(), rows)
}

/// Lay out a full store: catalog sheets in catalog order, then any other
/// sheets found in the file.
///
/// `target` replaces the sheet of the same name. Missing catalog sheets are
/// created; with `seed_absence`, an existing but empty absence table is
/// seeded too.
pub fn merge_into_catalog(
    current: Vec<SheetData>,
    target: Option<SheetData>,
    seed_absence: bool,
) -> (Vec<SheetData>, EnsureReport) {
    let mut report = EnsureReport::default();
    let mut extra = Vec::new();
    let mut by_name: HashMap<String, SheetData> = HashMap::new();
    for sheet in current {
        if is_catalog_table(&sheet.name) {
            by_name.entry(sheet.name.clone()).or_insert(sheet);
        } else {
            extra.push(sheet);
        }
    }
    let mut target = target;

    let mut out = Vec::with_capacity(TABLES.len() + extra.len());
    for &table in TABLES {
        if target.as_ref().map(|t| t.name == table).unwrap_or(false) {
            if let Some(sheet) = target.take() {
                out.push(sheet);
            }
            continue;
        }
        match by_name.remove(table) {
            Some(sheet) if table == ABSENCE_TABLE && seed_absence && absence_needs_seed(&sheet) => {
                report.seeded_absence_codes = true;
                out.push(seed_absence_codes(&sheet));
            }
            Some(sheet) => out.push(sheet),
            None => {
                report.created.push(table.to_string());
                if table == ABSENCE_TABLE {
                    report.seeded_absence_codes = true;
                }
                out.push(empty_sheet(table));
            }
        }
    }
    out.extend(extra);

    (out, report)
}

/// Every catalog table, freshly created.
pub fn empty_store() -> Vec<SheetData> {
    TABLES.iter().map(|t| empty_sheet(t)).collect()
}
