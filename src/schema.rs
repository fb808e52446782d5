/// Column-name constants for the recalculation engine.
/// Single source of truth - exported to Python via PyO3.

// ── Emissions-key columns ───────────────────────────────────────────────────
pub mod emissions_key {
    pub const SECTOR: &str = "sector";
    pub const SUBSECTOR: &str = "subsector";
    pub const CATEGORY: &str = "category";
    pub const SUB_CATEGORY_1: &str = "sub_category_1";
    pub const SUB_CATEGORY_2: &str = "sub_category_2";
    pub const SUB_CATEGORY_3: &str = "sub_category_3";
    pub const SUB_CATEGORY_4: &str = "sub_category_4";
    pub const SUB_CATEGORY_5: &str = "sub_category_5";
    pub const CARBON_POOL: &str = "carbon_pool";
    pub const FUEL1: &str = "fuel1";
    pub const FUEL2: &str = "fuel2";
    pub const GEO_REF: &str = "geo_ref";
    pub const EXCLUDE: &str = "exclude";
    pub const CRT_CODE: &str = "crt_code";
    pub const ID: &str = "id";
    pub const CBI_ACTIVITY: &str = "cbi_activity";
    pub const UNITS: &str = "units";
    pub const GHG_CATEGORY: &str = "ghg_category";
    pub const GHG: &str = "ghg";
    pub const GWP: &str = "gwp";

    /// Canonical order of the emissions key, as laid out in the emissions_key table.
    pub const ALL: [&str; 20] = [
        SECTOR,
        SUBSECTOR,
        CATEGORY,
        SUB_CATEGORY_1,
        SUB_CATEGORY_2,
        SUB_CATEGORY_3,
        SUB_CATEGORY_4,
        SUB_CATEGORY_5,
        CARBON_POOL,
        FUEL1,
        FUEL2,
        GEO_REF,
        EXCLUDE,
        CRT_CODE,
        ID,
        CBI_ACTIVITY,
        UNITS,
        GHG_CATEGORY,
        GHG,
        GWP,
    ];

    /// Columns hashed into `raw_data_key` unless overridden.
    pub const DEFAULT_RAW_DATA_KEY: [&str; 12] = [
        SECTOR,
        SUBSECTOR,
        CATEGORY,
        SUB_CATEGORY_1,
        SUB_CATEGORY_2,
        SUB_CATEGORY_3,
        SUB_CATEGORY_4,
        CARBON_POOL,
        FUEL1,
        FUEL2,
        GEO_REF,
        GHG,
    ];

    /// Grouping columns that act as a pure lens and never carry recalculated values.
    pub const DEFAULT_FILTER_BY: [&str; 2] = [GHG, GHG_CATEGORY];

    /// Combined grouping column name used by the front end; expands to
    /// `sub_category_1` + `fuel1`.
    pub const SUB_CATEGORY_FUEL_1: &str = "sub_category_fuel_1";

    pub fn contains(column: &str) -> bool {
        ALL.contains(&column)
    }
}

// ── Time columns ────────────────────────────────────────────────────────────
pub mod time {
    /// Prefix of landscape year columns, e.g. `Y1990`.
    pub const YEAR_PREFIX: &str = "Y";
    /// Portrait year column.
    pub const YEAR: &str = "year";
    /// Portrait quantity column.
    pub const WEIGHTED_QUANTITY: &str = "weighted_quantity";
    /// First year of every inventory time series.
    pub const EARLIEST_REPORTING_YEAR: i32 = 1990;
}

// ── Recalculation output keys ───────────────────────────────────────────────
pub mod output {
    pub const KEY: &str = "key";
    pub const DATA: &str = "data";
    pub const CHILDREN: &str = "children";
    pub const NAME: &str = "name";
    pub const RECALC_PREFIX: &str = "recalc_";
    pub const EMISSIONS_KEY: &str = "emissions_key";
    pub const RAW_DATA_KEY: &str = "raw_data_key";
}

// ── Dataset envelope and metadata ───────────────────────────────────────────
pub mod dataset {
    /// Field of a power-user export holding the flat row array.
    pub const POWER_USER_DATA_FIELD: &str = "Data by UNFCCC-IPCC Sectors";
    /// Object-name marker selecting the power-user variant.
    pub const POWER_USER_MARKER: &str = "PowerUser";
    /// Year-layer-key marker selecting the national layer.
    pub const NATIONAL_MARKER: &str = "National";
    /// In-band sentinel for cleared cells in tabular data.
    pub const NULL_SENTINEL: &str = "null";
}
