use std::fmt::{Display, Formatter};

use chrono::{DateTime, SecondsFormat};
use chrono_tz::Tz;
use itertools::Itertools;
use serde::Serialize;

use crate::response::{ErrorValue, RawReading, Scalar};

/// The column names of a [`SensorTable`], in display order.
pub const COLUMNS: [&str; 8] = [
    "address",
    "timestamp",
    "datetime",
    "gas",
    "unit",
    "float_value",
    "warmup1",
    "warmup2",
];

/// A single timestamped sensor measurement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub address: i64,
    pub timestamp: f64,
    /// The timestamp as ISO-8601 local time of the configured zone.
    pub datetime: String,
    pub gas: String,
    pub unit: String,
    pub float_value: f64,
    pub warmup1: Scalar,
    pub warmup2: Scalar,
}

/// Hashable identity of a full row; floats compare by their bit pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RowKey {
    address: i64,
    timestamp: u64,
    datetime: String,
    gas: String,
    unit: String,
    float_value: u64,
    warmup1: ScalarKey,
    warmup2: ScalarKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ScalarKey {
    Null,
    Bool(bool),
    Integer(i64),
    Float(u64),
    Text(String),
}

impl From<&Scalar> for ScalarKey {
    fn from(value: &Scalar) -> Self {
        match value {
            Scalar::Null => ScalarKey::Null,
            Scalar::Bool(value) => ScalarKey::Bool(*value),
            Scalar::Integer(value) => ScalarKey::Integer(*value),
            Scalar::Float(value) => ScalarKey::Float(value.to_bits()),
            Scalar::Text(value) => ScalarKey::Text(value.clone()),
        }
    }
}

impl Reading {
    /// Builds a reading, deriving the local datetime in the given zone.
    pub fn from_raw(raw: RawReading, time_zone: Tz) -> Result<Self, ErrorValue> {
        let datetime = local_datetime(raw.timestamp, time_zone)?;
        Ok(Self {
            address: raw.address,
            timestamp: raw.timestamp,
            datetime,
            gas: raw.gas,
            unit: raw.unit,
            float_value: raw.float_value,
            warmup1: raw.warmup1,
            warmup2: raw.warmup2,
        })
    }

    /// The row rendered as display strings, one per [`COLUMNS`] entry.
    pub fn cells(&self) -> [String; 8] {
        [
            self.address.to_string(),
            self.timestamp.to_string(),
            self.datetime.clone(),
            self.gas.clone(),
            self.unit.clone(),
            self.float_value.to_string(),
            self.warmup1.to_string(),
            self.warmup2.to_string(),
        ]
    }

    fn key(&self) -> RowKey {
        RowKey {
            address: self.address,
            timestamp: self.timestamp.to_bits(),
            datetime: self.datetime.clone(),
            gas: self.gas.clone(),
            unit: self.unit.clone(),
            float_value: self.float_value.to_bits(),
            warmup1: (&self.warmup1).into(),
            warmup2: (&self.warmup2).into(),
        }
    }
}

/// Converts an epoch timestamp into an ISO-8601 string with the zone's offset.
///
/// Microseconds are only printed if the timestamp has a fractional part.
pub fn local_datetime(timestamp: f64, time_zone: Tz) -> Result<String, ErrorValue> {
    if !timestamp.is_finite() {
        return Err(ErrorValue::Parse(format!("invalid timestamp: {timestamp}")));
    }

    let seconds = timestamp.floor();
    let mut micros = ((timestamp - seconds) * 1e6).round() as i64;
    let mut seconds = seconds as i64;
    if micros >= 1_000_000 {
        seconds += 1;
        micros -= 1_000_000;
    }

    let utc = DateTime::from_timestamp(seconds, (micros * 1_000) as u32)
        .ok_or_else(|| ErrorValue::Parse(format!("timestamp out of range: {timestamp}")))?;
    let local = utc.with_timezone(&time_zone);

    let format = if micros == 0 {
        SecondsFormat::Secs
    } else {
        SecondsFormat::Micros
    };
    Ok(local.to_rfc3339_opts(format, false))
}

/// The accumulated readings of one sensor, ordered by timestamp.
///
/// No two rows are identical across all columns. If a retention limit is set,
/// only the newest rows are kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorTable {
    rows: Vec<Reading>,
    retention: Option<usize>,
}

impl SensorTable {
    pub fn new(retention: Option<usize>) -> Self {
        Self {
            rows: Vec::new(),
            retention,
        }
    }

    /// Assembles a table from the server's rows.
    pub fn from_raw(
        raw: Vec<RawReading>,
        time_zone: Tz,
        retention: Option<usize>,
    ) -> Result<Self, ErrorValue> {
        let rows = raw
            .into_iter()
            .map(|raw| Reading::from_raw(raw, time_zone))
            .collect::<Result<Vec<_>, _>>()?;
        let mut table = Self::new(retention);
        table.merge(rows);
        Ok(table)
    }

    /// Appends rows, drops exact duplicates (the first occurrence wins) and
    /// sorts by timestamp.
    pub fn merge<I>(&mut self, rows: I)
    where
        I: IntoIterator<Item = Reading>,
    {
        let combined = std::mem::take(&mut self.rows).into_iter().chain(rows);
        self.rows = combined
            .unique_by(Reading::key)
            .sorted_by(|a, b| a.timestamp.total_cmp(&b.timestamp))
            .collect();

        if let Some(limit) = self.retention {
            let excess = self.rows.len().saturating_sub(limit);
            self.rows.drain(..excess);
        }
    }

    /// Merges all rows of another table.
    pub fn extend_from(&mut self, other: SensorTable) {
        self.merge(other.rows);
    }

    pub fn rows(&self) -> &[Reading] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The newest reading.
    pub fn latest(&self) -> Option<&Reading> {
        self.rows.last()
    }

    pub fn column_names(&self) -> &'static [&'static str; 8] {
        &COLUMNS
    }

    /// The series as `(timestamp, value)` points.
    pub fn points(&self) -> Vec<(f64, f64)> {
        self.rows
            .iter()
            .map(|row| (row.timestamp, row.float_value))
            .collect()
    }

    /// Axis bounds for charting the series, see [`bounds`].
    pub fn bounds(&self) -> ([f64; 2], [f64; 2]) {
        bounds(&self.points())
    }
}

/// `[min, max]` of time and value around the points.
///
/// A single timestamp gets a window of one second to each side; the values
/// are padded by 10 % of their range, but at least by one unit.
pub fn bounds(points: &[(f64, f64)]) -> ([f64; 2], [f64; 2]) {
    let Some(&(x0, y0)) = points.first() else {
        return ([0.0, 1.0], [0.0, 1.0]);
    };

    let (mut x_min, mut x_max, mut y_min, mut y_max) = (x0, x0, y0, y0);
    for &(x, y) in points {
        x_min = x_min.min(x);
        x_max = x_max.max(x);
        y_min = y_min.min(y);
        y_max = y_max.max(y);
    }

    if x_max - x_min < f64::EPSILON {
        x_min -= 1.0;
        x_max += 1.0;
    }
    let pad = ((y_max - y_min) * 0.1).max(1.0);
    ([x_min, x_max], [y_min - pad, y_max + pad])
}

/// Renders the table as aligned plain-text columns.
impl Display for SensorTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let cells: Vec<[String; 8]> = self.rows.iter().map(Reading::cells).collect();
        let mut widths = COLUMNS.map(str::len);
        for row in &cells {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let header = COLUMNS
            .iter()
            .zip(widths)
            .map(|(name, width)| format!("{name:<width$}"))
            .join("  ");
        writeln!(f, "{}", header.trim_end())?;

        for row in &cells {
            let line = row
                .iter()
                .zip(widths)
                .map(|(cell, width)| format!("{cell:<width$}"))
                .join("  ");
            writeln!(f, "{}", line.trim_end())?;
        }
        Ok(())
    }
}
