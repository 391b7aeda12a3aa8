use chrono::NaiveDate;

use crate::amounts::extract_amount_cents;
use crate::column_roles::ColumnRoleMap;
use crate::dates;
use crate::sheet_region::{DataRegion, SheetGrid};

/// One unit of work done on an equipment at a given date.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkEntry {
    pub fecha: NaiveDate,
    pub descripcion: String,
    pub presupuesto_cents: i64,
}

/// All work parsed for one equipment within one sheet. The sheet name is
/// carried along as the owner (propietario) of the equipment.
#[derive(Debug, Clone)]
pub struct EquipmentGroup {
    pub propietario: String,
    pub nombre: String,
    pub trabajos: Vec<WorkEntry>,
}

#[derive(Debug, Default)]
pub struct GroupingOutcome {
    pub groups: Vec<EquipmentGroup>,
    pub warnings: Vec<String>,
}

// Rows that merely repeat the column header inside the data area.
const EQUIPMENT_HEADER_ECHOES: &[&str] = &["equipo", "equipos", "maquina", "maquinas"];

/// Walk the data rows top to bottom, folding continuation rows into the
/// equipment announced above them. An equipment cell opens a group, a
/// lone date opens a new work entry for the current equipment, and rows
/// carrying only repuestos or mano de obra extend the entry in progress.
pub fn build_groups(grid: &SheetGrid, region: &DataRegion, roles: &ColumnRoleMap) -> GroupingOutcome {
    let mut outcome = GroupingOutcome::default();
    if !region.has_data_rows() {
        return outcome;
    }

    let mut current_equipment: Option<String> = None;
    let mut current_date: Option<NaiveDate> = None;
    let mut pending_repuestos: Vec<String> = Vec::new();
    let mut pending_mano_de_obra: Vec<String> = Vec::new();

    for row in region.first_data_row..=region.last_data_row {
        let equipo_raw = slot_value(grid, region, row, roles.equipo);
        let fecha_raw = slot_value(grid, region, row, roles.fecha);
        let repuestos = slot_value(grid, region, row, roles.repuestos);
        let mano_de_obra = slot_value(grid, region, row, roles.mano_de_obra);
        let fecha = dates::parse_date(&fecha_raw);

        let is_header_echo = EQUIPMENT_HEADER_ECHOES.contains(&equipo_raw.to_lowercase().as_str());
        let opens_group = !equipo_raw.is_empty() && !is_header_echo;

        if opens_group {
            close_entry(
                &mut outcome,
                grid,
                &current_equipment,
                &current_date,
                &mut pending_repuestos,
                &mut pending_mano_de_obra,
            );
            current_equipment = Some(equipo_raw);
            if fecha.is_some() {
                current_date = fecha;
            } else if current_date.is_none() {
                current_date = Some(dates::today());
            }
            push_non_empty(&mut pending_repuestos, repuestos);
            push_non_empty(&mut pending_mano_de_obra, mano_de_obra);
        } else if fecha.is_some() && current_equipment.is_some() {
            close_entry(
                &mut outcome,
                grid,
                &current_equipment,
                &current_date,
                &mut pending_repuestos,
                &mut pending_mano_de_obra,
            );
            current_date = fecha;
            push_non_empty(&mut pending_repuestos, repuestos);
            push_non_empty(&mut pending_mano_de_obra, mano_de_obra);
        } else if current_equipment.is_some() && (!repuestos.is_empty() || !mano_de_obra.is_empty())
        {
            push_non_empty(&mut pending_repuestos, repuestos);
            push_non_empty(&mut pending_mano_de_obra, mano_de_obra);
        } else if (equipo_raw.is_empty() || is_header_echo)
            && fecha_raw.is_empty()
            && repuestos.is_empty()
            && mano_de_obra.is_empty()
        {
            // Blank row: soft separator, the current equipment stays open.
            close_entry(
                &mut outcome,
                grid,
                &current_equipment,
                &current_date,
                &mut pending_repuestos,
                &mut pending_mano_de_obra,
            );
        } else {
            outcome.warnings.push(format!(
                "Hoja '{}', fila {}: forma de fila no reconocida, se omite",
                grid.name,
                row + 1
            ));
        }
    }

    close_entry(
        &mut outcome,
        grid,
        &current_equipment,
        &current_date,
        &mut pending_repuestos,
        &mut pending_mano_de_obra,
    );
    outcome
}

fn slot_value(grid: &SheetGrid, region: &DataRegion, row: usize, slot: Option<usize>) -> String {
    slot.and_then(|s| region.columns.get(s))
        .map(|&col| grid.cell(row, col).to_string())
        .unwrap_or_default()
}

fn push_non_empty(items: &mut Vec<String>, value: String) {
    if !value.is_empty() {
        items.push(value);
    }
}

/// Materialize the pending repuestos / mano de obra lists into a
/// WorkEntry on the current group, if there is anything to flush.
fn close_entry(
    outcome: &mut GroupingOutcome,
    grid: &SheetGrid,
    current_equipment: &Option<String>,
    current_date: &Option<NaiveDate>,
    pending_repuestos: &mut Vec<String>,
    pending_mano_de_obra: &mut Vec<String>,
) {
    if pending_repuestos.is_empty() && pending_mano_de_obra.is_empty() {
        return;
    }
    let repuestos = std::mem::take(pending_repuestos);
    let mano_de_obra = std::mem::take(pending_mano_de_obra);

    let Some(nombre) = current_equipment.clone() else {
        outcome.warnings.push(format!(
            "Hoja '{}': datos de trabajo sin equipo asignado, se omiten",
            grid.name
        ));
        return;
    };

    let mut parts = Vec::new();
    if !repuestos.is_empty() {
        parts.push(format!("Repuestos: {}", repuestos.join(" | ")));
    }
    if !mano_de_obra.is_empty() {
        parts.push(format!("Mano de obra: {}", mano_de_obra.join(" | ")));
    }
    let descripcion = parts.join(" // ");

    let fecha = match current_date {
        Some(date) => *date,
        None => {
            outcome.warnings.push(format!(
                "Hoja '{}', equipo '{}': fecha faltante, se usa la fecha de hoy",
                grid.name, nombre
            ));
            dates::today()
        }
    };
    let presupuesto_cents = extract_amount_cents(&descripcion);

    let entry = WorkEntry {
        fecha,
        descripcion,
        presupuesto_cents,
    };
    match outcome.groups.iter_mut().find(|g| g.nombre == nombre) {
        Some(group) => group.trabajos.push(entry),
        None => outcome.groups.push(EquipmentGroup {
            propietario: grid.name.clone(),
            nombre,
            trabajos: vec![entry],
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column_roles::classify_columns;
    use crate::sheet_region::detect_region;

    fn run(rows: &[&[&str]]) -> GroupingOutcome {
        let grid = SheetGrid::from_rows(
            "Taller Norte",
            rows.iter()
                .map(|row| row.iter().map(|c| c.to_string()).collect())
                .collect(),
        );
        let detection = detect_region(&grid).unwrap();
        let roles = classify_columns(&grid, &detection.region);
        build_groups(&grid, &detection.region, &roles)
    }

    #[test]
    fn continuation_rows_merge_into_one_entry() {
        let outcome = run(&[
            &["EQUIPO", "FECHA", "REPUESTOS", "MANO DE OBRA"],
            &["SCANIA 113", "15/01/2024", "filtro aceite $500", ""],
            &["", "", "filtro aire $300", ""],
            &["", "", "", "cambio de filtros $1000"],
        ]);
        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.groups.len(), 1);
        let group = &outcome.groups[0];
        assert_eq!(group.nombre, "SCANIA 113");
        assert_eq!(group.propietario, "Taller Norte");
        assert_eq!(group.trabajos.len(), 1);
        assert_eq!(
            group.trabajos[0].descripcion,
            "Repuestos: filtro aceite $500 | filtro aire $300 // Mano de obra: cambio de filtros $1000"
        );
        assert_eq!(group.trabajos[0].presupuesto_cents, 50000);
        assert_eq!(
            group.trabajos[0].fecha,
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
    }

    #[test]
    fn lone_date_opens_a_new_entry_for_same_equipment() {
        let outcome = run(&[
            &["EQUIPO", "FECHA", "REPUESTOS", "MANO DE OBRA"],
            &["SCANIA 113", "15/01/2024", "filtro $500", ""],
            &["", "20/02/2024", "", "service completo $2000"],
        ]);
        assert_eq!(outcome.groups.len(), 1);
        let group = &outcome.groups[0];
        assert_eq!(group.trabajos.len(), 2);
        assert_eq!(
            group.trabajos[1].fecha,
            NaiveDate::from_ymd_opt(2024, 2, 20).unwrap()
        );
        assert_eq!(
            group.trabajos[1].descripcion,
            "Mano de obra: service completo $2000"
        );
    }

    #[test]
    fn blank_row_closes_entry_but_keeps_equipment_open() {
        let outcome = run(&[
            &["EQUIPO", "FECHA", "REPUESTOS", "MANO DE OBRA"],
            &["VOLVO FH", "01/03/2024", "correa $400", ""],
            &["", "", "", ""],
            &["", "", "tensor $250", ""],
        ]);
        assert_eq!(outcome.groups.len(), 1);
        let group = &outcome.groups[0];
        assert_eq!(group.trabajos.len(), 2);
        assert_eq!(group.trabajos[1].descripcion, "Repuestos: tensor $250");
        // The entry after the blank row keeps the last seen date.
        assert_eq!(group.trabajos[1].fecha, group.trabajos[0].fecha);
    }

    #[test]
    fn second_equipment_starts_its_own_group() {
        let outcome = run(&[
            &["EQUIPO", "FECHA", "REPUESTOS", "MANO DE OBRA"],
            &["SCANIA 113", "15/01/2024", "filtro $500", ""],
            &["VOLVO FH", "16/01/2024", "", "ajuste $300"],
        ]);
        assert_eq!(outcome.groups.len(), 2);
        assert_eq!(outcome.groups[0].nombre, "SCANIA 113");
        assert_eq!(outcome.groups[1].nombre, "VOLVO FH");
    }

    #[test]
    fn repeated_equipment_name_reuses_the_group() {
        let outcome = run(&[
            &["EQUIPO", "FECHA", "REPUESTOS", "MANO DE OBRA"],
            &["SCANIA 113", "15/01/2024", "filtro $500", ""],
            &["VOLVO FH", "16/01/2024", "correa $200", ""],
            &["SCANIA 113", "17/01/2024", "", "ajuste $300"],
        ]);
        assert_eq!(outcome.groups.len(), 2);
        assert_eq!(outcome.groups[0].trabajos.len(), 2);
    }

    #[test]
    fn header_echo_rows_are_not_new_equipment() {
        let outcome = run(&[
            &["EQUIPO", "FECHA", "REPUESTOS", "MANO DE OBRA"],
            &["SCANIA 113", "15/01/2024", "filtro $500", ""],
            &["EQUIPO", "", "", ""],
            &["", "", "aceite $100", ""],
        ]);
        assert_eq!(outcome.groups.len(), 1);
        assert_eq!(outcome.groups[0].nombre, "SCANIA 113");
        assert_eq!(outcome.groups[0].trabajos.len(), 2);
    }

    #[test]
    fn unreadable_date_row_is_warned_and_skipped() {
        let outcome = run(&[
            &["EQUIPO", "FECHA", "REPUESTOS", "MANO DE OBRA"],
            &["SCANIA 113", "15/01/2024", "filtro $500", ""],
            &["", "fecha pendiente", "", ""],
        ]);
        assert_eq!(outcome.groups.len(), 1);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("forma de fila no reconocida"));
    }

    #[test]
    fn equipment_without_date_falls_back_to_today() {
        let outcome = run(&[
            &["EQUIPO", "FECHA", "REPUESTOS", "MANO DE OBRA"],
            &["SCANIA 113", "", "filtro $500", ""],
        ]);
        assert_eq!(outcome.groups.len(), 1);
        assert_eq!(outcome.groups[0].trabajos[0].fecha, dates::today());
    }
}
