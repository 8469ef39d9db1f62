//! Student timetable from the open weekly feed
//!
//! The feed is public, so requests go out without a service ticket. The last
//! response is kept under [`SessionKeys::TIMETABLE`]. A feed that still lists
//! classes from before the current week is stale and is fetched again with a
//! forced refresh.

use chrono::{Datelike, Duration as ChronoDuration, Local, NaiveDate, NaiveTime};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::cache::SessionKeys;
use crate::client::{CachingStrategy, Origin, RequestOptions, WsApi};
use crate::error::{ApiError, Result};

/// Default location of the weekly timetable feed
pub const DEFAULT_TIMETABLE_URL: &str = "https://s3-ap-southeast-1.amazonaws.com/open-ws/weektimetable";

/// One class in the weekly timetable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct StudentTimetable {
    pub intake: String,
    #[serde(rename = "MODID")]
    pub module_id: String,
    #[serde(default)]
    pub day: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub room: String,
    #[serde(rename = "LECTID", default)]
    pub lecturer_id: String,
    #[serde(rename = "NAME", default)]
    pub lecturer_name: String,
    #[serde(default)]
    pub datestamp: String,
    /// Class date as `YYYY-MM-DD`
    pub datestamp_iso: String,
    #[serde(default)]
    pub time_from: String,
    #[serde(default)]
    pub time_to: String,
}

impl StudentTimetable {
    pub fn date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.datestamp_iso, "%Y-%m-%d").ok()
    }

    /// Start time, from `08:30 AM` style values
    pub fn start_time(&self) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(self.time_from.trim(), "%I:%M %p").ok()
    }
}

/// First day (Sunday) of the week containing `today`
pub fn week_start(today: NaiveDate) -> NaiveDate {
    today - ChronoDuration::days(i64::from(today.weekday().num_days_from_sunday()))
}

/// True when any class falls before the current week. Unparseable dates are
/// ignored.
pub fn is_outdated(timetable: &[StudentTimetable], today: NaiveDate) -> bool {
    let start = week_start(today);
    timetable
        .iter()
        .filter_map(StudentTimetable::date)
        .any(|date| date < start)
}

/// Timetable access on top of the request pipeline
#[derive(Clone)]
pub struct TimetableService {
    api: WsApi,
    url: String,
}

impl TimetableService {
    pub fn new(api: WsApi, url: impl Into<String>) -> Self {
        Self {
            api,
            url: url.into(),
        }
    }

    /// Fetch the timetable, optionally narrowed to one intake code
    pub async fn get(&self, refresh: bool, intake: Option<&str>) -> Result<Vec<StudentTimetable>> {
        let timetable = self.get_at(refresh, Local::now().date_naive()).await?;
        Ok(match intake {
            Some(code) => timetable
                .into_iter()
                .filter(|class| class.intake.eq_ignore_ascii_case(code))
                .collect(),
            None => timetable,
        })
    }

    /// Fetch the timetable as of `today`
    pub async fn get_at(&self, refresh: bool, today: NaiveDate) -> Result<Vec<StudentTimetable>> {
        let (timetable, origin) = self.fetch(refresh).await?;

        // Only live responses are checked; a stored copy means the feed is
        // unreachable right now
        if !refresh && origin == Some(Origin::Network) && is_outdated(&timetable, today) {
            debug!("Timetable predates week of {}, refreshing", week_start(today));
            return Ok(self.fetch(true).await?.0);
        }
        Ok(timetable)
    }

    async fn fetch(&self, refresh: bool) -> Result<(Vec<StudentTimetable>, Option<Origin>)> {
        let mut options = RequestOptions::new()
            .unauthenticated()
            .url(self.url.as_str())
            .caching(CachingStrategy::NetworkWithCacheFallback)
            .cache_key(SessionKeys::TIMETABLE)
            .refresh(refresh);
        if refresh {
            options = options.header("x-refresh", "");
        }

        match self.api.get_with_origin("", options).await? {
            Some((value, origin)) => {
                let timetable = serde_json::from_value(value).map_err(|e| {
                    ApiError::InvalidResponse(format!("Failed to parse timetable: {}", e))
                })?;
                Ok((timetable, Some(origin)))
            }
            None => Ok((Vec::new(), None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::{Value, json};

    use crate::cache::{KeyValueStore, MemoryStore};
    use crate::cas::{MockTicketApi, TicketService};
    use crate::client::{MockTransport, PipelineSettings};
    use crate::network::{ConnectionType, NetworkMonitor, Runtime};
    use crate::session::Session;

    const FEED: &str = "https://feed.example/weektimetable";

    fn class(intake: &str, date: &str) -> Value {
        json!({
            "INTAKE": intake,
            "MODID": "CT074-3-2-CCP",
            "DAY": "MON",
            "LOCATION": "NEW CAMPUS",
            "ROOM": "B-06-08",
            "LECTID": "ABC",
            "NAME": "Lecturer Name",
            "DATESTAMP": "16-OCT-23",
            "DATESTAMP_ISO": date,
            "TIME_FROM": "08:30 AM",
            "TIME_TO": "10:30 AM"
        })
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn service(
        transport: MockTransport,
        store: Arc<MemoryStore>,
    ) -> (TimetableService, Arc<MockTransport>, Arc<MockTicketApi>) {
        let transport = Arc::new(transport);
        let ticket_api = Arc::new(MockTicketApi::new());
        let tickets = Arc::new(TicketService::new(
            ticket_api.clone(),
            store.clone(),
            Session::new(),
            "https://cas.example/cas",
        ));
        let api = WsApi::new(
            transport.clone(),
            tickets,
            store,
            NetworkMonitor::new(Runtime::Device),
            PipelineSettings::default(),
        );
        (TimetableService::new(api, FEED), transport, ticket_api)
    }

    #[test]
    fn test_week_starts_on_sunday() {
        // 2023-10-18 is a Wednesday
        assert_eq!(week_start(date("2023-10-18")), date("2023-10-15"));
        assert_eq!(week_start(date("2023-10-15")), date("2023-10-15"));
        assert_eq!(week_start(date("2023-10-21")), date("2023-10-15"));
    }

    #[test]
    fn test_is_outdated() {
        let today = date("2023-10-18");
        let current: Vec<StudentTimetable> =
            serde_json::from_value(json!([class("UC1", "2023-10-15"), class("UC1", "2023-10-19")]))
                .unwrap();
        assert!(!is_outdated(&current, today));

        let stale: Vec<StudentTimetable> =
            serde_json::from_value(json!([class("UC1", "2023-10-14"), class("UC1", "2023-10-19")]))
                .unwrap();
        assert!(is_outdated(&stale, today));

        assert!(!is_outdated(&[], today));
    }

    #[test]
    fn test_start_time() {
        let mut class: StudentTimetable =
            serde_json::from_value(class("UC1", "2023-10-16")).unwrap();
        assert_eq!(class.start_time(), NaiveTime::from_hms_opt(8, 30, 0));

        class.time_from = "01:30 PM".to_string();
        assert_eq!(class.start_time(), NaiveTime::from_hms_opt(13, 30, 0));
    }

    #[test]
    fn test_bad_dates_are_ignored() {
        let timetable: Vec<StudentTimetable> =
            serde_json::from_value(json!([class("UC1", "someday")])).unwrap();
        assert!(!is_outdated(&timetable, date("2023-10-18")));
    }

    #[tokio::test]
    async fn test_current_timetable_fetched_once_without_ticket() {
        let store = Arc::new(MemoryStore::new());
        let (service, transport, ticket_api) = service(
            MockTransport::new().respond_with(json!([class("UC1", "2023-10-16")])),
            store.clone(),
        );

        let timetable = service.get_at(false, date("2023-10-18")).await.unwrap();

        assert_eq!(timetable.len(), 1);
        assert_eq!(transport.call_count(), 1);
        let request = &transport.requests()[0];
        assert_eq!(request.url, FEED);
        assert_eq!(request.query_param("ticket"), None);
        assert!(ticket_api.st_requests().await.is_empty());
        assert!(store.get(SessionKeys::TIMETABLE).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_outdated_timetable_is_refetched_with_refresh() {
        let store = Arc::new(MemoryStore::new());
        let (service, transport, _) = service(
            MockTransport::new()
                .then(Ok(json!([class("UC1", "2023-10-09")])))
                .respond_with(json!([class("UC1", "2023-10-16")])),
            store,
        );

        let timetable = service.get_at(false, date("2023-10-18")).await.unwrap();

        assert_eq!(timetable[0].datestamp_iso, "2023-10-16");
        assert_eq!(transport.call_count(), 2);
        let refresh = &transport.requests()[1];
        assert!(refresh.headers.iter().any(|(name, _)| name == "x-refresh"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_fallback_copy_is_not_refetched() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(SessionKeys::TIMETABLE, &json!([class("UC1", "2023-10-09")]))
            .await
            .unwrap();
        let (service, transport, _) = service(
            MockTransport::new().fail_with(ApiError::TransientServer("503".into())),
            store,
        );

        let timetable = service.get_at(false, date("2023-10-18")).await.unwrap();

        assert_eq!(timetable[0].datestamp_iso, "2023-10-09");
        // One retry cycle only
        assert_eq!(transport.call_count(), 5);
    }

    #[tokio::test]
    async fn test_malformed_feed_is_invalid_response() {
        let (service, _, _) = service(
            MockTransport::new().respond_with(json!({"not": "a list"})),
            Arc::new(MemoryStore::new()),
        );

        let err = service.get_at(false, date("2023-10-18")).await.unwrap_err();

        assert!(matches!(err, crate::Error::Api(ApiError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_offline_serves_cached_timetable_even_when_stale() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(SessionKeys::TIMETABLE, &json!([class("UC1", "2023-10-09")]))
            .await
            .unwrap();
        let (service, transport, _) = service(MockTransport::new(), store);
        service
            .api
            .network()
            .update_connection_type(ConnectionType::None);

        let timetable = service.get_at(false, date("2023-10-18")).await.unwrap();

        assert_eq!(timetable.len(), 1);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_offline_without_cache_is_empty() {
        let (service, _, _) = service(MockTransport::new(), Arc::new(MemoryStore::new()));
        service
            .api
            .network()
            .update_connection_type(ConnectionType::None);

        assert!(service.get(false, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_filter_by_intake() {
        let today = Local::now().date_naive().format("%Y-%m-%d").to_string();
        let (service, _, _) = service(
            MockTransport::new().respond_with(json!([class("UC1", &today), class("UC2", &today)])),
            Arc::new(MemoryStore::new()),
        );

        let timetable = service.get(false, Some("uc2")).await.unwrap();

        assert_eq!(timetable.len(), 1);
        assert_eq!(timetable[0].intake, "UC2");
    }
}
