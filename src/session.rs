use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard};
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::query::{Gas, QueryParameters, SensorAddress};
use crate::response::ErrorValue;
use crate::source::ReadingSource;
use crate::table::SensorTable;

/// Address and gas of one sensor, as chosen in the form.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SensorSettings {
    pub address: SensorAddress,
    pub gas: Gas,
}

/// The submitted dashboard configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardSettings {
    pub date: NaiveDate,
    /// Number of past measurements to seed the tables with.
    pub last_rows: u32,
    /// Either 1 or 2.
    pub num_sensors: usize,
    pub sensors: [SensorSettings; 2],
}

impl DashboardSettings {
    /// One query per active sensor, in sensor order.
    pub fn queries(&self) -> Vec<QueryParameters> {
        self.sensors
            .iter()
            .take(self.num_sensors.clamp(1, 2))
            .map(|sensor| {
                QueryParameters::new(sensor.gas, sensor.address, self.date, self.last_rows)
            })
            .collect()
    }
}

/// Per-sensor state. A failed sensor stays failed for the rest of the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorState {
    Active(SensorTable),
    Failed(ErrorValue),
}

impl SensorState {
    pub fn is_active(&self) -> bool {
        matches!(self, SensorState::Active(_))
    }
}

#[derive(Debug)]
pub struct SensorSession {
    /// 1-based position of the sensor on the dashboard.
    pub slot: usize,
    pub query: QueryParameters,
    state: RwLock<SensorState>,
}

impl SensorSession {
    pub fn state(&self) -> RwLockReadGuard<'_, SensorState> {
        self.state.read().expect("failed to lock")
    }

    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    /// The inline error message, if the sensor has failed.
    pub fn error_text(&self) -> Option<String> {
        match &*self.state() {
            SensorState::Active(_) => None,
            SensorState::Failed(error) => Some(format!("ERROR in sensor{}: {error}", self.slot)),
        }
    }

    fn apply(&self, result: Result<SensorTable, ErrorValue>) {
        let mut state = self.state.write().expect("failed to lock");
        if let SensorState::Active(table) = &mut *state {
            match result {
                Ok(rows) => table.extend_from(rows),
                Err(error) => {
                    warn!("Sensor {} stopped polling: {error}", self.slot);
                    *state = SensorState::Failed(error);
                }
            }
        }
    }
}

/// The state of one dashboard session: the sensors and their accumulated tables.
#[derive(Debug)]
pub struct Session {
    sensors: Vec<SensorSession>,
    polls: AtomicU64,
    last_update: RwLock<Option<DateTime<Local>>>,
}

impl Session {
    /// Runs the initial fetch for every configured sensor.
    pub async fn start<S>(source: &S, settings: DashboardSettings) -> Self
    where
        S: ReadingSource,
    {
        let mut sensors = Vec::with_capacity(settings.num_sensors);
        for (index, query) in settings.queries().into_iter().enumerate() {
            let state = match source.fetch(&query).await {
                Ok(table) => {
                    info!(
                        "Sensor {} ({} @ {}) started with {} rows",
                        index + 1,
                        query.gas,
                        query.address,
                        table.len()
                    );
                    SensorState::Active(table)
                }
                Err(error) => {
                    warn!("Initial fetch for sensor {} failed: {error}", index + 1);
                    SensorState::Failed(error)
                }
            };
            sensors.push(SensorSession {
                slot: index + 1,
                query,
                state: RwLock::new(state),
            });
        }

        Self {
            sensors,
            polls: AtomicU64::new(0),
            last_update: RwLock::new(Some(Local::now())),
        }
    }

    pub fn sensors(&self) -> &[SensorSession] {
        &self.sensors
    }

    pub fn active_count(&self) -> usize {
        self.sensors.iter().filter(|s| s.is_active()).count()
    }

    pub fn polls(&self) -> u64 {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn last_update(&self) -> Option<DateTime<Local>> {
        *self.last_update.read().expect("failed to lock")
    }

    /// Fetches the newest row of every active sensor, one after another, and
    /// merges it. Returns the number of sensors still active.
    pub async fn poll_once<S>(&self, source: &S) -> usize
    where
        S: ReadingSource,
    {
        for sensor in self.sensors.iter().filter(|s| s.is_active()) {
            let query = sensor.query.with_last_rows(1);
            let result = source.fetch(&query).await;
            sensor.apply(result);
        }

        let polls = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_update.write().expect("failed to lock") = Some(Local::now());
        debug!("Poll {polls} complete");
        self.active_count()
    }
}

/// Polls the session at a fixed period until cancelled or until no sensor is
/// active any more. `on_update` is called after every poll.
pub async fn run_poller<S, F>(
    session: Arc<Session>,
    source: Arc<S>,
    period: Duration,
    cancel: CancellationToken,
    mut on_update: F,
) where
    S: ReadingSource,
    F: FnMut() + Send,
{
    if session.active_count() == 0 {
        info!("No active sensors; not polling");
        return;
    }

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let active = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            active = session.poll_once(source.as_ref()) => active,
        };
        on_update();

        if active == 0 {
            info!("All sensors failed; polling stopped");
            break;
        }
    }

    info!("Poller finished after {} polls", session.polls());
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use chrono_tz::Europe::Berlin;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::query::create_url;
    use crate::response::parse_response;

    /// Replays scripted HTTP responses per sensor address.
    #[derive(Default)]
    pub(crate) struct ScriptedSource {
        responses: Mutex<HashMap<String, VecDeque<(u16, String)>>>,
        requests: Mutex<Vec<String>>,
    }

    impl ScriptedSource {
        pub(crate) fn push(&self, addr: &str, status: u16, body: String) {
            self.responses
                .lock()
                .unwrap()
                .entry(addr.to_string())
                .or_default()
                .push_back((status, body));
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl ReadingSource for ScriptedSource {
        async fn fetch(&self, query: &QueryParameters) -> Result<SensorTable, ErrorValue> {
            self.requests
                .lock()
                .unwrap()
                .push(create_url("http://test/drone-data", query.pairs()));
            let (status, body) = self
                .responses
                .lock()
                .unwrap()
                .get_mut(&query.address.to_string())
                .and_then(|queue| queue.pop_front())
                .unwrap_or((200, String::from(r#"{"data": []}"#)));
            let raw = parse_response(status, body.as_bytes())?;
            SensorTable::from_raw(raw, Berlin, None)
        }
    }

    pub(crate) fn row_body(gas: &str, timestamps: &[f64]) -> String {
        let rows: Vec<_> = timestamps
            .iter()
            .map(|ts| {
                serde_json::json!({
                    "address": 1, "gas": gas, "timestamp": ts, "unit": "ppm",
                    "float_value": 400.0 + ts % 100.0, "warmup1": 0, "warmup2": 0
                })
            })
            .collect();
        serde_json::json!({ "data": rows }).to_string()
    }

    pub(crate) fn settings(num_sensors: usize) -> DashboardSettings {
        DashboardSettings {
            date: Local::now().date_naive(),
            last_rows: 1,
            num_sensors,
            sensors: [
                SensorSettings {
                    address: SensorAddress::new(1).unwrap(),
                    gas: Gas::Co2,
                },
                SensorSettings {
                    address: SensorAddress::new(2).unwrap(),
                    gas: Gas::O2,
                },
            ],
        }
    }

    fn table_of(session: &Session, index: usize) -> SensorTable {
        match &*session.sensors()[index].state() {
            SensorState::Active(table) => table.clone(),
            SensorState::Failed(e) => panic!("sensor failed: {e}"),
        }
    }

    #[test]
    fn queries_follow_the_number_of_sensors() {
        assert_eq!(settings(1).queries().len(), 1);
        let queries = settings(2).queries();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[1].gas, Gas::O2);
        assert_eq!(queries[1].address.to_string(), "02");
    }

    #[tokio::test]
    async fn polling_grows_the_table_in_order() {
        let source = ScriptedSource::default();
        source.push("01", 200, row_body("CO2", &[1000.0]));
        source.push("01", 200, row_body("CO2", &[1001.0]));
        source.push("01", 200, row_body("CO2", &[1003.0]));
        source.push("01", 200, row_body("CO2", &[1002.0]));

        let session = Session::start(&source, settings(1)).await;
        let table = table_of(&session, 0);
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].gas, "CO2");

        for _ in 0..3 {
            assert_eq!(session.poll_once(&source).await, 1);
        }

        let table = table_of(&session, 0);
        let timestamps: Vec<_> = table.rows().iter().map(|r| r.timestamp).collect();
        assert_eq!(timestamps, vec![1000.0, 1001.0, 1002.0, 1003.0]);
        assert_eq!(session.polls(), 3);

        let requests = source.requests();
        assert_eq!(requests.len(), 4);
        assert!(requests[0].contains("gas=CO2"));
        assert!(requests[0].contains("addr=01"));
        assert!(requests[1..].iter().all(|url| url.contains("last_rows=1")));
    }

    #[tokio::test]
    async fn repeated_row_is_kept_once() {
        let source = ScriptedSource::default();
        source.push("01", 200, row_body("CO2", &[1000.0]));
        source.push("01", 200, row_body("CO2", &[1000.0]));
        source.push("01", 200, row_body("CO2", &[1000.0]));

        let session = Session::start(&source, settings(1)).await;
        session.poll_once(&source).await;
        session.poll_once(&source).await;
        assert_eq!(table_of(&session, 0).len(), 1);
    }

    #[tokio::test]
    async fn failed_initial_fetch_never_polls() {
        let source = Arc::new(ScriptedSource::default());
        source.push("01", 500, String::from("Internal Server Error"));

        let session = Arc::new(Session::start(source.as_ref(), settings(1)).await);
        let text = session.sensors()[0].error_text().unwrap();
        assert!(text.contains("500"));
        assert_eq!(text, "ERROR in sensor1: 500");

        let mut updates = 0;
        run_poller(
            session.clone(),
            source.clone(),
            Duration::from_millis(1),
            CancellationToken::new(),
            || updates += 1,
        )
        .await;

        assert_eq!(updates, 0);
        assert_eq!(source.requests().len(), 1);
    }

    #[tokio::test]
    async fn failure_during_polling_is_permanent() {
        let source = ScriptedSource::default();
        source.push("01", 200, row_body("CO2", &[1000.0]));
        source.push("01", 200, r#"{"Error": "sensor offline"}"#.to_string());
        source.push("02", 200, row_body("O2", &[1000.0]));
        source.push("02", 200, row_body("O2", &[1001.0]));
        source.push("02", 200, row_body("O2", &[1002.0]));

        let session = Session::start(&source, settings(2)).await;
        assert_eq!(session.poll_once(&source).await, 1);
        assert_eq!(
            session.sensors()[0].error_text().as_deref(),
            Some("ERROR in sensor1: sensor offline")
        );

        assert_eq!(session.poll_once(&source).await, 1);
        assert_eq!(table_of(&session, 1).len(), 3);

        let sensor1_requests = source
            .requests()
            .iter()
            .filter(|url| url.contains("addr=01"))
            .count();
        assert_eq!(sensor1_requests, 2);
    }

    #[tokio::test]
    async fn poller_stops_on_cancellation() {
        let source = Arc::new(ScriptedSource::default());
        source.push("01", 200, row_body("CO2", &[1000.0]));

        let session = Arc::new(Session::start(source.as_ref(), settings(1)).await);
        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        let mut updates = 0;
        run_poller(
            session.clone(),
            source.clone(),
            Duration::from_millis(1),
            cancel,
            || {
                updates += 1;
                if updates == 3 {
                    stop.cancel();
                }
            },
        )
        .await;

        assert_eq!(updates, 3);
        assert_eq!(session.polls(), 3);
    }

    #[tokio::test]
    async fn poller_stops_when_all_sensors_fail() {
        let source = Arc::new(ScriptedSource::default());
        source.push("01", 200, row_body("CO2", &[1000.0]));
        source.push("01", 404, String::new());

        let session = Arc::new(Session::start(source.as_ref(), settings(1)).await);
        let mut updates = 0;
        run_poller(
            session.clone(),
            source.clone(),
            Duration::from_millis(1),
            CancellationToken::new(),
            || updates += 1,
        )
        .await;

        assert_eq!(updates, 1);
        assert_eq!(session.active_count(), 0);
    }
}
