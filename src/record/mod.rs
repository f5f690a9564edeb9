// src/record/mod.rs

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Cell texts treated as "no value", matching the usual NA tokens of
/// spreadsheet/CSV exports.
const NA_TOKENS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// How a column's cells are coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Number,
    Text,
    /// Text, but a lone `-` also means "no phone".
    Phone,
}

/// The twenty columns of the `Export_Analiz.csv` export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    No,
    Name,
    NationalId,
    Nationality,
    Phone,
    Iban,
    Residence,
    City,
    District,
    Neighbourhood,
    Address,
    HouseholdSize,
    MaleCount,
    FemaleCount,
    FamilyType,
    PersonType,
    Position,
    Status,
    Income,
    RegisteredAt,
}

impl Column {
    pub const ALL: [Column; 20] = [
        Column::No,
        Column::Name,
        Column::NationalId,
        Column::Nationality,
        Column::Phone,
        Column::Iban,
        Column::Residence,
        Column::City,
        Column::District,
        Column::Neighbourhood,
        Column::Address,
        Column::HouseholdSize,
        Column::MaleCount,
        Column::FemaleCount,
        Column::FamilyType,
        Column::PersonType,
        Column::Position,
        Column::Status,
        Column::Income,
        Column::RegisteredAt,
    ];

    /// Header text as it appears in the export.
    pub fn header(&self) -> &'static str {
        match self {
            Column::No => "No",
            Column::Name => "İsim",
            Column::NationalId => "Kimlik No",
            Column::Nationality => "Uyruk",
            Column::Phone => "Telefon",
            Column::Iban => "IBAN",
            Column::Residence => "İkamet",
            Column::City => "Şehir",
            Column::District => "İlçe",
            Column::Neighbourhood => "Mahalle",
            Column::Address => "Adres",
            Column::HouseholdSize => "Toplam Kişi",
            Column::MaleCount => "Erkek",
            Column::FemaleCount => "Kadın",
            Column::FamilyType => "Aile Tipi",
            Column::PersonType => "Kişi Tipi",
            Column::Position => "Pozisyon",
            Column::Status => "Durum",
            Column::Income => "Gelir",
            Column::RegisteredAt => "Kayıt Tarihi",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Column::No
            | Column::HouseholdSize
            | Column::MaleCount
            | Column::FemaleCount
            | Column::Income => FieldKind::Number,
            Column::Phone => FieldKind::Phone,
            _ => FieldKind::Text,
        }
    }
}

/// One beneficiary row, shaped the way the `importExportDataBatch` mutation
/// expects it. `None` serializes as `null`; keys are never omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BeneficiaryRecord {
    pub no: Option<f64>,
    pub name: Option<String>,
    pub kimlik_no: Option<String>,
    pub uyruk: Option<String>,
    pub telefon: Option<String>,
    pub iban: Option<String>,
    pub ikamet: Option<String>,
    pub sehir: Option<String>,
    pub ilce: Option<String>,
    pub mahalle: Option<String>,
    pub adres: Option<String>,
    pub toplam_kisi: Option<f64>,
    pub erkek_sayisi: Option<f64>,
    pub kadin_sayisi: Option<f64>,
    pub aile_tipi: Option<String>,
    pub kisi_tipi: Option<String>,
    pub pozisyon: Option<String>,
    pub durum: Option<String>,
    pub gelir: Option<f64>,
    pub kayit_tarihi: Option<String>,
}

/// Positions of the twenty known columns within a header row.
#[derive(Debug, Clone)]
pub struct ColumnIndex {
    positions: HashMap<Column, usize>,
}

impl ColumnIndex {
    /// Locate every column in `headers`. Extra columns are ignored; a missing
    /// one is an error.
    pub fn from_headers<S: AsRef<str>>(headers: &[S]) -> Result<Self> {
        let mut positions = HashMap::with_capacity(Column::ALL.len());
        for col in Column::ALL {
            let pos = headers
                .iter()
                .position(|h| h.as_ref().trim() == col.header())
                .ok_or_else(|| anyhow!("column `{}` not found in CSV header", col.header()))?;
            positions.insert(col, pos);
        }
        Ok(Self { positions })
    }

    fn cell<'a, S: AsRef<str>>(&self, row: &'a [S], col: Column) -> Option<&'a str> {
        self.positions
            .get(&col)
            .and_then(|&i| row.get(i))
            .map(|s| s.as_ref())
            .filter(|s| !is_missing(s))
    }

    fn text<S: AsRef<str>>(&self, row: &[S], col: Column) -> Option<String> {
        let value = self.cell(row, col)?;
        if col.kind() == FieldKind::Phone && value.trim() == "-" {
            return None;
        }
        Some(value.to_string())
    }

    fn number<S: AsRef<str>>(&self, row: &[S], col: Column) -> Result<Option<f64>> {
        match self.cell(row, col) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<f64>()
                .map(Some)
                .with_context(|| format!("column `{}`: `{}` is not a number", col.header(), raw)),
        }
    }
}

/// True if the cell counts as absent.
pub fn is_missing(cell: &str) -> bool {
    NA_TOKENS.contains(&cell)
}

/// Build one record from a data row.
pub fn normalize_row<S: AsRef<str>>(index: &ColumnIndex, row: &[S]) -> Result<BeneficiaryRecord> {
    Ok(BeneficiaryRecord {
        no: index.number(row, Column::No)?,
        name: index.text(row, Column::Name),
        kimlik_no: index.text(row, Column::NationalId),
        uyruk: index.text(row, Column::Nationality),
        telefon: index.text(row, Column::Phone),
        iban: index.text(row, Column::Iban),
        ikamet: index.text(row, Column::Residence),
        sehir: index.text(row, Column::City),
        ilce: index.text(row, Column::District),
        mahalle: index.text(row, Column::Neighbourhood),
        adres: index.text(row, Column::Address),
        toplam_kisi: index.number(row, Column::HouseholdSize)?,
        erkek_sayisi: index.number(row, Column::MaleCount)?,
        kadin_sayisi: index.number(row, Column::FemaleCount)?,
        aile_tipi: index.text(row, Column::FamilyType),
        kisi_tipi: index.text(row, Column::PersonType),
        pozisyon: index.text(row, Column::Position),
        durum: index.text(row, Column::Status),
        gelir: index.number(row, Column::Income)?,
        kayit_tarihi: index.text(row, Column::RegisteredAt),
    })
}

/// Normalize every data row, keeping input order. The first malformed number
/// aborts the whole run.
pub fn normalize_rows<H, S>(headers: &[H], rows: &[Vec<S>]) -> Result<Vec<BeneficiaryRecord>>
where
    H: AsRef<str>,
    S: AsRef<str>,
{
    if headers.is_empty() {
        bail!("CSV has no header row");
    }
    let index = ColumnIndex::from_headers(headers)?;
    rows.iter()
        .enumerate()
        .map(|(i, row)| normalize_row(&index, row).with_context(|| format!("data row {}", i + 1)))
        .collect()
}
