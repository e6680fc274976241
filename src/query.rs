use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use strum::{Display as StrumDisplay, EnumString};
use url::form_urlencoded;

/// The gas types a sensor can report.
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, StrumDisplay, EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum Gas {
    #[default]
    #[strum(serialize = "CO2")]
    #[serde(rename = "CO2")]
    Co2,
    #[strum(serialize = "O2")]
    #[serde(rename = "O2")]
    O2,
}

impl Gas {
    pub const ALL: [Gas; 2] = [Gas::Co2, Gas::O2];

    /// Returns the other gas of the set.
    pub fn toggled(self) -> Self {
        match self {
            Gas::Co2 => Gas::O2,
            Gas::O2 => Gas::Co2,
        }
    }
}

/// A sensor bus address.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SensorAddress(u32);

impl SensorAddress {
    pub fn new(address: u32) -> Option<Self> {
        if address >= 1 {
            Some(Self(address))
        } else {
            None
        }
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

/// Renders the address zero-padded to two digits, as the server expects.
impl Display for SensorAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

impl FromStr for SensorAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: u32 = s
            .trim()
            .parse()
            .map_err(|_| format!("not a valid address: {s:?}"))?;
        SensorAddress::new(value).ok_or_else(|| String::from("address must be at least 1"))
    }
}

/// The day a query refers to, split into the parts the server expects.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryDate {
    pub dd: String,
    pub mm: String,
    pub yyyy: String,
}

impl From<NaiveDate> for QueryDate {
    fn from(date: NaiveDate) -> Self {
        Self {
            dd: format!("{:02}", date.day()),
            mm: format!("{:02}", date.month()),
            yyyy: date.year().to_string(),
        }
    }
}

/// The frozen set of request inputs for one sensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryParameters {
    pub gas: Gas,
    pub address: SensorAddress,
    pub date: QueryDate,
    pub last_rows: u32,
}

impl QueryParameters {
    pub fn new(gas: Gas, address: SensorAddress, date: NaiveDate, last_rows: u32) -> Self {
        Self {
            gas,
            address,
            date: date.into(),
            last_rows,
        }
    }

    /// The same query, restricted to the given number of newest rows.
    pub fn with_last_rows(&self, last_rows: u32) -> Self {
        Self {
            last_rows,
            ..self.clone()
        }
    }

    /// The query as ordered key/value pairs.
    pub fn pairs(&self) -> [(&'static str, String); 6] {
        [
            ("gas", self.gas.to_string()),
            ("dd", self.date.dd.clone()),
            ("mm", self.date.mm.clone()),
            ("yyyy", self.date.yyyy.clone()),
            ("last_rows", self.last_rows.to_string()),
            ("addr", self.address.to_string()),
        ]
    }
}

/// Appends the URL-encoded parameters to the base URL.
///
/// Values are passed through unvalidated; a trailing `?` on the base is not doubled.
pub fn create_url<'a, I, V>(base_url: &str, params: I) -> String
where
    I: IntoIterator<Item = (&'a str, V)>,
    V: AsRef<str>,
{
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        serializer.append_pair(key, value.as_ref());
    }
    let base = base_url.strip_suffix('?').unwrap_or(base_url);
    format!("{base}?{}", serializer.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const BASE: &str = "http://localhost:1880/drone-data";

    fn params() -> QueryParameters {
        QueryParameters::new(
            Gas::Co2,
            SensorAddress::new(1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 3, 7).unwrap(),
            10,
        )
    }

    #[test]
    fn url_starts_with_base_and_lists_all_pairs() {
        let url = create_url(BASE, params().pairs());
        assert_eq!(
            url,
            "http://localhost:1880/drone-data?gas=CO2&dd=07&mm=03&yyyy=2023&last_rows=10&addr=01"
        );
    }

    #[test]
    fn trailing_question_mark_is_not_doubled() {
        let url = create_url("http://host/data?", [("gas", "O2")]);
        assert_eq!(url, "http://host/data?gas=O2");
    }

    #[test]
    fn values_are_encoded_not_validated() {
        let url = create_url(BASE, [("gas", "C O&2"), ("addr", "-1")]);
        assert!(url.starts_with(&format!("{BASE}?")));
        let query = url.split_once('?').unwrap().1;
        let decoded: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        assert_eq!(
            decoded,
            vec![
                ("gas".to_string(), "C O&2".to_string()),
                ("addr".to_string(), "-1".to_string())
            ]
        );
    }

    #[test]
    fn address_is_zero_padded() {
        assert_eq!(SensorAddress::new(3).unwrap().to_string(), "03");
        assert_eq!(SensorAddress::new(42).unwrap().to_string(), "42");
        assert_eq!(SensorAddress::new(123).unwrap().to_string(), "123");
        assert!(SensorAddress::new(0).is_none());
        assert!("0".parse::<SensorAddress>().is_err());
    }

    #[test]
    fn gas_parses_case_insensitively() {
        assert_eq!("co2".parse::<Gas>().unwrap(), Gas::Co2);
        assert_eq!("O2".parse::<Gas>().unwrap(), Gas::O2);
        assert!("N2".parse::<Gas>().is_err());
        assert_eq!(Gas::Co2.toggled(), Gas::O2);
    }

    #[test]
    fn live_query_only_changes_row_count() {
        let initial = params();
        let live = initial.with_last_rows(1);
        assert_eq!(live.last_rows, 1);
        assert_eq!(live.date, initial.date);
        assert_eq!(live.address, initial.address);
    }
}
