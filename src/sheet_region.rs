/// One worksheet (or a whole CSV file) with every cell already stringified
/// and cleaned. Row lengths are ragged; readers keep whatever width each
/// row actually had.
#[derive(Debug, Clone)]
pub struct SheetGrid {
    pub name: String,
    pub rows: Vec<Vec<String>>,
}

impl SheetGrid {
    pub fn from_rows(name: &str, rows: Vec<Vec<String>>) -> Self {
        let rows = rows
            .into_iter()
            .map(|row| row.iter().map(|cell| clean_cell(cell)).collect())
            .collect();
        SheetGrid {
            name: name.to_string(),
            rows,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.rows
            .iter()
            .all(|row| row.iter().all(|cell| cell.is_empty()))
    }

    fn width(&self) -> usize {
        self.rows.iter().map(|row| row.len()).max().unwrap_or(0)
    }

    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// Normalize a raw cell: trim, strip a UTF-8 BOM, and blank out the
/// "nan"/"none" artifacts that stringified spreadsheets drag along.
pub fn clean_cell(raw: &str) -> String {
    let text = raw.trim_start_matches('\u{feff}').trim();
    let lowered = text.to_lowercase();
    if lowered == "nan" || lowered == "none" {
        String::new()
    } else {
        text.to_string()
    }
}

/// Where the tabular data actually lives inside a sheet that may carry
/// titles, blank padding and decoration around it.
#[derive(Debug, Clone)]
pub struct DataRegion {
    pub header_row: usize,
    /// Labels for the kept columns, synthesized as `Col_<n>` when the
    /// header cell is blank.
    pub header_labels: Vec<String>,
    /// Original column indices of the kept (non-blank) columns.
    pub columns: Vec<usize>,
    pub first_data_row: usize,
    /// Inclusive. `last_data_row < first_data_row` means no data rows.
    pub last_data_row: usize,
}

impl DataRegion {
    pub fn has_data_rows(&self) -> bool {
        !self.columns.is_empty() && self.last_data_row >= self.first_data_row
    }
}

#[derive(Debug, Clone)]
pub struct RegionDetection {
    pub region: DataRegion,
    /// False when no row satisfied the keyword rule and row 0 was used.
    pub header_detected: bool,
}

const HEADER_KEYWORDS: &[&str] = &[
    "EQUIPO", "MAQUINA", "VEHICULO", "FECHA", "REPUESTO", "MATERIAL", "MANO", "OBRA", "TRABAJO",
    "SERVICIO",
];
const HEADER_SCAN_ROWS: usize = 10;
const HEADER_MIN_KEYWORDS: usize = 2;

/// Locate the header row and the rectangle of data under it.
/// Returns None only for a sheet with no non-blank cell at all.
pub fn detect_region(grid: &SheetGrid) -> Option<RegionDetection> {
    let last_row = grid
        .rows
        .iter()
        .rposition(|row| row.iter().any(|cell| !cell.is_empty()))?;

    let mut header_row = 0usize;
    let mut header_detected = false;
    for (idx, row) in grid.rows.iter().take(HEADER_SCAN_ROWS).enumerate() {
        if count_header_keywords(row) >= HEADER_MIN_KEYWORDS {
            header_row = idx;
            header_detected = true;
            break;
        }
    }

    let first_data_row = header_row + 1;
    let last_data_row = last_row;

    let mut columns = Vec::new();
    let mut header_labels = Vec::new();
    for col in 0..grid.width() {
        let has_data =
            (first_data_row..=last_data_row).any(|row| !grid.cell(row, col).is_empty());
        if !has_data {
            continue;
        }
        columns.push(col);
        let label = grid.cell(header_row, col);
        if label.is_empty() {
            header_labels.push(format!("Col_{col}"));
        } else {
            header_labels.push(label.to_string());
        }
    }

    Some(RegionDetection {
        region: DataRegion {
            header_row,
            header_labels,
            columns,
            first_data_row,
            last_data_row,
        },
        header_detected,
    })
}

fn count_header_keywords(row: &[String]) -> usize {
    HEADER_KEYWORDS
        .iter()
        .filter(|keyword| {
            row.iter()
                .any(|cell| cell.to_uppercase().contains(*keyword))
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&[&str]]) -> SheetGrid {
        SheetGrid::from_rows(
            "Prueba",
            rows.iter()
                .map(|row| row.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    #[test]
    fn skips_title_and_blank_rows_before_header() {
        let g = grid(&[
            &["PLANILLA DE TRABAJOS 2024", "", "", ""],
            &["", "", "", ""],
            &["EQUIPO", "FECHA", "REPUESTOS", "MANO DE OBRA"],
            &["SCANIA 113", "15/01/2024", "filtro $500", "cambio $1000"],
        ]);
        let detection = detect_region(&g).unwrap();
        assert!(detection.header_detected);
        assert_eq!(detection.region.header_row, 2);
        assert_eq!(detection.region.first_data_row, 3);
        assert_eq!(detection.region.last_data_row, 3);
        assert_eq!(detection.region.columns, vec![0, 1, 2, 3]);
    }

    #[test]
    fn single_keyword_is_not_a_header() {
        let g = grid(&[
            &["FECHA de emisión: enero", ""],
            &["algo", "otra cosa"],
        ]);
        let detection = detect_region(&g).unwrap();
        assert!(!detection.header_detected);
        assert_eq!(detection.region.header_row, 0);
    }

    #[test]
    fn blank_columns_are_dropped_and_labels_synthesized() {
        let g = grid(&[
            &["EQUIPO", "FECHA", "", "", "TRABAJO"],
            &["VOLVO FH", "01/02/2024", "", "", "service"],
            &["", "02/02/2024", "", "", "ajuste"],
        ]);
        let detection = detect_region(&g).unwrap();
        assert_eq!(detection.region.columns, vec![0, 1, 4]);
        assert_eq!(
            detection.region.header_labels,
            vec!["EQUIPO", "FECHA", "TRABAJO"]
        );
    }

    #[test]
    fn blank_header_cell_gets_positional_label() {
        let g = grid(&[
            &["EQUIPO", "FECHA", ""],
            &["VOLVO FH", "01/02/2024", "dato"],
        ]);
        let detection = detect_region(&g).unwrap();
        assert_eq!(detection.region.header_labels[2], "Col_2");
    }

    #[test]
    fn fully_blank_sheet_yields_none() {
        let g = grid(&[&["", ""], &["", ""]]);
        assert!(detect_region(&g).is_none());
        let empty = SheetGrid::from_rows("Vacia", Vec::new());
        assert!(detect_region(&empty).is_none());
    }

    #[test]
    fn nan_cells_are_cleaned_to_empty() {
        assert_eq!(clean_cell("  nan "), "");
        assert_eq!(clean_cell("None"), "");
        assert_eq!(clean_cell("\u{feff}EQUIPO "), "EQUIPO");
    }
}
