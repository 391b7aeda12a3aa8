pub mod amounts;
pub mod column_roles;
pub mod dates;
pub mod excel_import;
pub mod reconcile;
pub mod row_grouping;
pub mod sheet_region;
pub mod taller_db;

pub use excel_import::{
    import_file_at_db_path, import_preview_at_path, load_sheet_grids, parse_sheets,
    parse_workbook_at_path, resolve_source_path_text, ImportPreviewRequest, ImportRunRequest,
    ParseOutcome, DEFAULT_SOURCE_TYPE,
};
pub use reconcile::{reconcile_groups, ImportReport};
pub use row_grouping::{EquipmentGroup, WorkEntry};
pub use sheet_region::{DataRegion, RegionDetection, SheetGrid};
pub use taller_db::{
    apply_embedded_migrations, inspect_status_at_path, query_admin_db_stats_at_path,
    reset_admin_db_data_at_path, AdminResetRequest, TallerDbMigrateResult, TallerDbStatus,
    ADMIN_RESET_CONFIRM_PHRASE,
};
