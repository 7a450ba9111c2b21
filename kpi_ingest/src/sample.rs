//! Deterministic 12-month sample dataset for demos and golden tests.
//!
//! Three dimensions share one reference property ([`BASE`]):
//! - actual: seasonal swing + slow trend + small seeded noise;
//! - budget: flat linear growth, no noise;
//! - forecast: optimism at the start of the year, decaying to plan by December.
//!
//! Derived metrics are computed from the rounded primitives of the same
//! dimension, so `Net Operating Income == Total Revenue - Operating Expenses`
//! holds exactly in every row.

use std::f64::consts::PI;

use chrono::NaiveDate;
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::Serialize;

use crate::{
    cell::{CellValue, Row},
    kpi::DataType,
    mapping::ColumnMapping,
};

pub const DEFAULT_SEED: u64 = 42;
pub const SAMPLE_YEAR: i32 = 2024;
const MONTHS: u32 = 12;

/// Monthly figures of the reference property.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
    pub revenue: f64,
    pub opex: f64,
    /// Percent.
    pub occupancy: f64,
    pub property_value: f64,
    pub loan_balance: f64,
    pub debt_service: f64,
}

pub const BASE: Baseline = Baseline {
    revenue: 485_000.0,
    opex: 198_000.0,
    occupancy: 94.5,
    property_value: 72_500_000.0,
    loan_balance: 47_000_000.0,
    debt_service: 215_000.0,
};

/// Column header and KPI code of each emitted metric, in column order.
pub const METRICS: [(&str, &str); 8] = [
    ("Total Revenue", "total_revenue"),
    ("Operating Expenses", "operating_expenses"),
    ("Net Operating Income", "net_operating_income"),
    ("NOI Margin", "noi_margin"),
    ("Occupancy Rate", "physical_occupancy"),
    ("Cap Rate", "cap_rate"),
    ("DSCR", "dscr"),
    ("LTV", "ltv"),
];

/// `x` rounded half away from zero to `places` decimals.
pub fn round_to(x: f64, places: i32) -> f64 {
    let f = 10f64.powi(places);
    (x * f).round() / f
}

/// Generated inputs of one month in one dimension.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Primitives {
    pub revenue: f64,
    pub opex: f64,
    pub occupancy: f64,
    pub property_value: f64,
    pub loan_balance: f64,
    pub debt_service: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Derived {
    pub noi: f64,
    pub noi_margin: f64,
    pub cap_rate: f64,
    pub dscr: f64,
    pub ltv: f64,
}

impl Primitives {
    pub fn derive(&self) -> Derived {
        let noi = (self.revenue - self.opex).round();
        Derived {
            noi,
            noi_margin: round_to(noi / self.revenue * 100.0, 1),
            cap_rate: round_to(noi * 12.0 / self.property_value * 100.0, 2),
            dscr: round_to(noi / self.debt_service, 2),
            ltv: round_to(self.loan_balance / self.property_value * 100.0, 1),
        }
    }

    /// Metric values in [`METRICS`] order.
    fn metric_values(&self) -> [f64; 8] {
        let d = self.derive();
        [
            self.revenue,
            self.opex,
            d.noi,
            d.noi_margin,
            self.occupancy,
            d.cap_rate,
            d.dscr,
            d.ltv,
        ]
    }
}

fn balance_sheet(month: f64) -> (f64, f64) {
    let value = (BASE.property_value * (1.0 + 0.002 * month)).round();
    let loan = (BASE.loan_balance * (1.0 - 0.0008 * month)).round();
    (value, loan)
}

fn actual(month: f64, rng: &mut StdRng) -> Primitives {
    let phase = (2.0 * PI * month / 12.0).sin();
    let seasonal = 1.0 + 0.03 * phase;
    let trend = 1.0 + 0.004 * month;
    let rev_noise = 1.0 + rng.gen_range(-0.01..0.01);
    let opex_noise = 1.0 + rng.gen_range(-0.015..0.015);
    let occ_noise = rng.gen_range(-0.6..0.6);
    let (property_value, loan_balance) = balance_sheet(month);
    Primitives {
        revenue: (BASE.revenue * seasonal * trend * rev_noise).round(),
        opex: (BASE.opex * (1.0 + 0.002 * month) * opex_noise).round(),
        occupancy: round_to((BASE.occupancy + 0.75 * phase + occ_noise).min(100.0), 1),
        property_value,
        loan_balance,
        debt_service: BASE.debt_service,
    }
}

fn budget(month: f64) -> Primitives {
    let (property_value, loan_balance) = balance_sheet(month);
    Primitives {
        revenue: (BASE.revenue * (1.0 + 0.003 * month)).round(),
        opex: (BASE.opex * (1.0 + 0.0025 * month)).round(),
        occupancy: BASE.occupancy,
        property_value,
        loan_balance,
        debt_service: BASE.debt_service,
    }
}

fn forecast(month: f64) -> Primitives {
    let optimism = 1.0 - month / f64::from(MONTHS - 1);
    let (property_value, loan_balance) = balance_sheet(month);
    Primitives {
        revenue: (BASE.revenue * (1.0 + 0.003 * month) * (1.0 + 0.04 * optimism)).round(),
        opex: (BASE.opex * (1.0 + 0.0025 * month) * (1.0 - 0.01 * optimism)).round(),
        occupancy: round_to((BASE.occupancy + 2.0 * optimism).min(100.0), 1),
        property_value,
        loan_balance,
        debt_service: BASE.debt_service,
    }
}

/// Header of `metric` in dimension `dt`: actual columns carry no suffix.
pub fn column_name(metric: &str, dt: DataType) -> String {
    match dt {
        DataType::Actual => metric.to_string(),
        DataType::Forecast => format!("{metric} (Forecast)"),
        DataType::Budget => format!("{metric} (Budget)"),
    }
}

/// Column order: actual, forecast, budget; [`METRICS`] order within each.
pub fn sample_mapping() -> Vec<ColumnMapping> {
    DataType::ALL
        .iter()
        .flat_map(|dt| {
            METRICS
                .iter()
                .map(move |(col, code)| ColumnMapping::new(column_name(col, *dt), *code, *dt))
        })
        .collect()
}

/// Dataset plus the mapping that imports it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleDataConfig {
    pub name: String,
    pub description: String,
    pub columns: Vec<String>,
    pub mapping: Vec<ColumnMapping>,
    pub rows: Vec<Row>,
}

/// Twelve rows keyed `date` (`2024-01-01` .. `2024-12-01`) for `seed`.
pub fn get_sample_data_rows_with_seed(seed: u64) -> Vec<Row> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mapping = sample_mapping();

    (0..MONTHS)
        .filter_map(|m| {
            let date = NaiveDate::from_ymd_opt(SAMPLE_YEAR, m + 1, 1)?;
            let month = f64::from(m);
            let by_dimension = [actual(month, &mut rng), forecast(month), budget(month)];

            let mut row = Row::new();
            row.insert("date".into(), CellValue::from(date.format("%Y-%m-%d").to_string()));
            let values = by_dimension.iter().flat_map(Primitives::metric_values);
            for (col, v) in mapping.iter().zip(values) {
                row.insert(col.column_name.clone(), CellValue::Number(v));
            }
            Some(row)
        })
        .collect()
}

pub fn get_sample_data_rows() -> Vec<Row> {
    get_sample_data_rows_with_seed(DEFAULT_SEED)
}

pub fn get_sample_data_with_seed(seed: u64) -> SampleDataConfig {
    let mapping = sample_mapping();
    let columns = std::iter::once("date".to_string())
        .chain(mapping.iter().map(|m| m.column_name.clone()))
        .collect();
    SampleDataConfig {
        name: "Sample Property Financials".into(),
        description: format!(
            "Twelve months of {SAMPLE_YEAR} operating and debt metrics for a reference \
             multifamily property, with actual, forecast and budget columns"
        ),
        columns,
        mapping,
        rows: get_sample_data_rows_with_seed(seed),
    }
}

pub fn get_sample_data() -> SampleDataConfig {
    get_sample_data_with_seed(DEFAULT_SEED)
}
