use std::sync::OnceLock;

use regex::Regex;

use crate::dates;
use crate::sheet_region::{DataRegion, SheetGrid};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Equipo,
    Fecha,
    Repuestos,
    ManoDeObra,
}

/// Which region column (by slot index into `DataRegion::columns`) plays
/// each role. A role left at None means no column reached the confidence
/// threshold and no positional fallback applied.
#[derive(Debug, Clone, Default)]
pub struct ColumnRoleMap {
    pub equipo: Option<usize>,
    pub fecha: Option<usize>,
    pub repuestos: Option<usize>,
    pub mano_de_obra: Option<usize>,
}

impl ColumnRoleMap {
    pub fn get(&self, role: ColumnRole) -> Option<usize> {
        match role {
            ColumnRole::Equipo => self.equipo,
            ColumnRole::Fecha => self.fecha,
            ColumnRole::Repuestos => self.repuestos,
            ColumnRole::ManoDeObra => self.mano_de_obra,
        }
    }

    fn is_taken(&self, slot: usize) -> bool {
        [self.equipo, self.fecha, self.repuestos, self.mano_de_obra]
            .iter()
            .any(|assigned| *assigned == Some(slot))
    }

    fn set(&mut self, role: ColumnRole, slot: usize) {
        match role {
            ColumnRole::Equipo => self.equipo = Some(slot),
            ColumnRole::Fecha => self.fecha = Some(slot),
            ColumnRole::Repuestos => self.repuestos = Some(slot),
            ColumnRole::ManoDeObra => self.mano_de_obra = Some(slot),
        }
    }
}

struct RoleSpec {
    role: ColumnRole,
    exact: &'static [&'static str],
    partial: &'static [&'static str],
}

const ROLE_SPECS: &[RoleSpec] = &[
    RoleSpec {
        role: ColumnRole::Equipo,
        exact: &["^EQUIPOS?$", "^MAQUINAS?$", "^NOMBRE$", "^VEHICULOS?$"],
        partial: &[
            "EQUIPO",
            "MAQUINA",
            "VEHICULO",
            "UNIDAD",
            "MODELO",
            "TIPO.*EQUIPO",
            "NOMBRE.*EQUIPO",
        ],
    },
    RoleSpec {
        role: ColumnRole::Fecha,
        exact: &["^FECHAS?$", "^DATE$", "^DIAS?$", "^CUANDO$"],
        partial: &[
            "FECHA",
            "DATE",
            "DIA",
            "MOMENTO",
            "TIEMPO",
            "FECHA.*TRABAJO",
            "FECHA.*SERVICIO",
        ],
    },
    RoleSpec {
        role: ColumnRole::Repuestos,
        exact: &["^REPUESTOS?$", "^MATERIAL(ES)?$", "^PARTES?$", "^PIEZAS?$"],
        partial: &[
            "REPUESTO",
            "MATERIAL",
            "PARTE",
            "PIEZA",
            "COMPONENTE",
            "COSTO.*REPUESTO",
            "PRECIO.*MATERIAL",
        ],
    },
    RoleSpec {
        role: ColumnRole::ManoDeObra,
        exact: &["^MANO.*OBRA$", "^TRABAJOS?$", "^LABOR(ES)?$", "^SERVICIOS?$"],
        partial: &[
            "MANO.*OBRA",
            "TRABAJO",
            "LABOR",
            "SERVICIO",
            "TAREA",
            "COSTO.*MANO",
            "PRECIO.*TRABAJO",
            "HORAS?.*TRABAJO",
        ],
    },
];

const SCORE_EXACT: i64 = 10;
const SCORE_PARTIAL: i64 = 5;
const MIN_CONFIDENCE: i64 = 5;
const CONTENT_SAMPLE_SIZE: usize = 10;

const BRAND_TOKENS: &[&str] = &[
    "scania",
    "volvo",
    "caterpillar",
    "john deere",
    "massey",
    "new holland",
    "deutz",
    "case",
    "komatsu",
    "hitachi",
    "liebherr",
    "mercedes",
    "iveco",
];

const WORK_TOKENS: &[&str] = &[
    "filtro",
    "aceite",
    "cambio",
    "reparacion",
    "service",
    "mantenimiento",
    "revision",
    "ajuste",
    "limpieza",
    "lubricacion",
    "pastilla",
    "correa",
];

struct CompiledRoleSpec {
    role: ColumnRole,
    exact: Vec<Regex>,
    partial: Vec<Regex>,
}

fn compiled_specs() -> &'static [CompiledRoleSpec] {
    static SPECS: OnceLock<Vec<CompiledRoleSpec>> = OnceLock::new();
    SPECS.get_or_init(|| {
        ROLE_SPECS
            .iter()
            .map(|spec| CompiledRoleSpec {
                role: spec.role,
                exact: compile_all(spec.exact),
                partial: compile_all(spec.partial),
            })
            .collect()
    })
}

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("patrón de rol de columna"))
        .collect()
}

/// Assign a column to each role by scoring header text, column position
/// and a sample of the column's content. Ties go to the leftmost column.
pub fn classify_columns(grid: &SheetGrid, region: &DataRegion) -> ColumnRoleMap {
    let mut map = ColumnRoleMap::default();
    for spec in compiled_specs() {
        let mut best: Option<(usize, i64)> = None;
        for slot in 0..region.columns.len() {
            // Roles are resolved in order; a column already claimed by an
            // earlier role stays out of the running.
            if map.is_taken(slot) {
                continue;
            }
            let score = role_score(grid, region, spec, slot);
            if score >= MIN_CONFIDENCE && best.map_or(true, |(_, s)| score > s) {
                best = Some((slot, score));
            }
        }
        if let Some((slot, _)) = best {
            map.set(spec.role, slot);
        }
    }
    apply_positional_fallbacks(grid, region, &mut map);
    map
}

fn role_score(grid: &SheetGrid, region: &DataRegion, spec: &CompiledRoleSpec, slot: usize) -> i64 {
    let label = region
        .header_labels
        .get(slot)
        .map(String::as_str)
        .unwrap_or("");
    let header = header_score(spec, label);
    let position = position_bonus(spec.role, slot);
    // Content only counts once header or position already gave the column
    // some plausibility, so junk columns never win on content alone.
    if header + position == 0 {
        return 0;
    }
    header + position + content_bonus(spec.role, grid, region, slot)
}

fn header_score(spec: &CompiledRoleSpec, label: &str) -> i64 {
    let upper = label.to_uppercase();
    if spec.exact.iter().any(|re| re.is_match(&upper)) {
        return SCORE_EXACT;
    }
    if spec.partial.iter().any(|re| re.is_match(&upper)) {
        return SCORE_PARTIAL;
    }
    0
}

fn position_bonus(role: ColumnRole, slot: usize) -> i64 {
    match role {
        ColumnRole::Equipo if slot <= 2 => 2,
        ColumnRole::Fecha if (1..=3).contains(&slot) => 2,
        ColumnRole::Repuestos if slot >= 2 => 1,
        ColumnRole::ManoDeObra if slot >= 2 => 1,
        _ => 0,
    }
}

fn sample_column(grid: &SheetGrid, region: &DataRegion, slot: usize) -> Vec<String> {
    let Some(&col) = region.columns.get(slot) else {
        return Vec::new();
    };
    if !region.has_data_rows() {
        return Vec::new();
    }
    (region.first_data_row..=region.last_data_row)
        .map(|row| grid.cell(row, col))
        .filter(|cell| !cell.is_empty())
        .take(CONTENT_SAMPLE_SIZE)
        .map(str::to_string)
        .collect()
}

fn content_bonus(role: ColumnRole, grid: &SheetGrid, region: &DataRegion, slot: usize) -> i64 {
    let sample = sample_column(grid, region, slot);
    if sample.is_empty() {
        return 0;
    }
    match role {
        ColumnRole::Fecha => date_content_bonus(&sample),
        ColumnRole::Equipo => sample
            .iter()
            .map(|cell| {
                let lowered = cell.to_lowercase();
                if BRAND_TOKENS.iter().any(|brand| lowered.contains(brand)) {
                    3
                } else if cell.len() > 5 && cell.chars().any(|c| c.is_ascii_digit()) {
                    1
                } else {
                    0
                }
            })
            .sum(),
        ColumnRole::Repuestos | ColumnRole::ManoDeObra => sample
            .iter()
            .map(|cell| {
                let lowered = cell.to_lowercase();
                if WORK_TOKENS.iter().any(|token| lowered.contains(token)) {
                    2
                } else if lowered.contains('$') || lowered.contains("peso") {
                    1
                } else {
                    0
                }
            })
            .sum(),
    }
}

fn date_content_bonus(sample: &[String]) -> i64 {
    let hits = sample
        .iter()
        .filter(|cell| dates::parse_date(cell).is_some())
        .count();
    if hits * 2 > sample.len() {
        5
    } else if hits > 0 {
        2
    } else {
        0
    }
}

/// Planillas made by hand often have no usable headers at all; fall back
/// to the conventional column order equipo / fecha / repuestos / mano de
/// obra for whatever roles are still unassigned.
fn apply_positional_fallbacks(grid: &SheetGrid, region: &DataRegion, map: &mut ColumnRoleMap) {
    let width = region.columns.len();
    if map.equipo.is_none() && width > 0 {
        map.equipo = Some(0);
    }
    if map.fecha.is_none() && width > 1 {
        let by_content = (1..width.min(4)).find(|&slot| {
            date_content_bonus(&sample_column(grid, region, slot)) > 0
        });
        map.fecha = Some(by_content.unwrap_or(1));
    }
    if map.repuestos.is_none() && width > 2 {
        map.repuestos = Some(2);
    }
    if map.mano_de_obra.is_none() && width > 3 {
        map.mano_de_obra = Some(3);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet_region::{detect_region, SheetGrid};

    fn grid(rows: &[&[&str]]) -> SheetGrid {
        SheetGrid::from_rows(
            "Prueba",
            rows.iter()
                .map(|row| row.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    fn classify(rows: &[&[&str]]) -> ColumnRoleMap {
        let g = grid(rows);
        let detection = detect_region(&g).unwrap();
        classify_columns(&g, &detection.region)
    }

    #[test]
    fn canonical_headers_map_one_to_one() {
        let map = classify(&[
            &["EQUIPO", "FECHA", "REPUESTOS", "MANO DE OBRA"],
            &["SCANIA 113", "15/01/2024", "filtro $500", "cambio de aceite $1000"],
        ]);
        assert_eq!(map.equipo, Some(0));
        assert_eq!(map.fecha, Some(1));
        assert_eq!(map.repuestos, Some(2));
        assert_eq!(map.mano_de_obra, Some(3));
    }

    #[test]
    fn synonym_headers_are_recognized() {
        let map = classify(&[
            &["MAQUINA", "DIA", "MATERIALES", "TRABAJO"],
            &["VOLVO FH", "01/02/2024", "correa $200", "ajuste $300"],
        ]);
        assert_eq!(map.equipo, Some(0));
        assert_eq!(map.fecha, Some(1));
        assert_eq!(map.repuestos, Some(2));
        assert_eq!(map.mano_de_obra, Some(3));
    }

    #[test]
    fn weak_header_is_rescued_by_content() {
        // UNIDAD is only a partial match, but brand names in the cells
        // push the score past the threshold.
        let map = classify(&[
            &["UNIDAD", "FECHA", "REPUESTOS", "MANO DE OBRA"],
            &["CATERPILLAR 320D", "15/01/2024", "filtro", "service"],
            &["SCANIA 113", "16/01/2024", "aceite", "ajuste"],
        ]);
        assert_eq!(map.equipo, Some(0));
    }

    #[test]
    fn unrecognized_header_is_rescued_by_position_and_content() {
        // FLOTA matches no header pattern, but the column sits in the
        // plausible position range and is full of brand names; the junk
        // column at index 0 must not win by fallback.
        let map = classify(&[
            &["NRO", "FLOTA", "FECHA", "REPUESTOS", "MANO DE OBRA"],
            &["1", "CATERPILLAR 320D", "15/01/2024", "filtro", "service"],
            &["2", "SCANIA 113", "16/01/2024", "aceite", "ajuste"],
        ]);
        assert_eq!(map.equipo, Some(1));
    }

    #[test]
    fn headerless_sheet_uses_positional_fallbacks() {
        let map = classify(&[
            &["SCANIA 113", "15/01/2024", "filtro $500", "cambio $1000"],
            &["VOLVO FH", "16/01/2024", "correa $200", "ajuste $300"],
        ]);
        assert_eq!(map.equipo, Some(0));
        assert_eq!(map.fecha, Some(1));
        assert_eq!(map.repuestos, Some(2));
        assert_eq!(map.mano_de_obra, Some(3));
    }

    #[test]
    fn date_fallback_prefers_column_with_date_content() {
        let map = classify(&[
            &["algo", "texto libre", "15/01/2024", "otro"],
            &["mas", "sin fecha", "16/01/2024", "dato"],
        ]);
        assert_eq!(map.fecha, Some(2));
    }

    #[test]
    fn narrow_sheet_leaves_roles_unassigned() {
        let map = classify(&[
            &["EQUIPO", "FECHA"],
            &["SCANIA 113", "15/01/2024"],
        ]);
        assert_eq!(map.repuestos, None);
        assert_eq!(map.mano_de_obra, None);
    }
}
