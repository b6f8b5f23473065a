//! Notification service boundary: the `NotificationApi` trait and its HTTP
//! implementation against the inventory server's AJAX endpoints.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bps_notify_core::{
    AlertFeed, AssignmentAlertsResponse, FetchError, FetchResponse, Notification,
    WarrantyAlertsResponse,
};
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{ACCEPT, COOKIE};
use serde::de::DeserializeOwned;

const NOTIFICATIONS_PATH: &str = "/api/notifications/";
const MARK_READ_PATH: &str = "/api/notifications/mark-read/";
const MARK_ALL_READ_PATH: &str = "/api/notifications/mark-all-read/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Backend capability consumed by the poller. Enables fake injection in tests.
pub trait NotificationApi: Send + Sync + 'static {
    /// Fetch notifications created after `since` (everything when `None`).
    fn fetch_notifications(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<FetchResponse, FetchError>> + Send;

    fn mark_read(&self, id: &str) -> impl Future<Output = Result<(), FetchError>> + Send;

    fn mark_all_read(&self) -> impl Future<Output = Result<(), FetchError>> + Send;

    /// Fetch one of the secondary alert feeds, already mapped to notifications.
    fn fetch_alerts(
        &self,
        feed: AlertFeed,
    ) -> impl Future<Output = Result<Vec<Notification>, FetchError>> + Send;
}

impl<T: NotificationApi> NotificationApi for Arc<T> {
    fn fetch_notifications(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<FetchResponse, FetchError>> + Send {
        (**self).fetch_notifications(since)
    }

    fn mark_read(&self, id: &str) -> impl Future<Output = Result<(), FetchError>> + Send {
        (**self).mark_read(id)
    }

    fn mark_all_read(&self) -> impl Future<Output = Result<(), FetchError>> + Send {
        (**self).mark_all_read()
    }

    fn fetch_alerts(
        &self,
        feed: AlertFeed,
    ) -> impl Future<Output = Result<Vec<Notification>, FetchError>> + Send {
        (**self).fetch_alerts(feed)
    }
}

/// reqwest client bound to one inventory server.
pub struct HttpNotificationApi {
    client: reqwest::Client,
    base_url: String,
    /// Django `sessionid` cookie value, if the endpoints require login.
    session: Option<String>,
}

impl HttpNotificationApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| FetchError::Network(format!("cannot build http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session: None,
        })
    }

    #[must_use]
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .request(method, self.url(path))
            .header(ACCEPT, "application/json")
            .header("X-Requested-With", "XMLHttpRequest");
        if let Some(ref session) = self.session {
            req = req.header(COOKIE, format!("sessionid={session}"));
        }
        req
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let response = self
            .request(reqwest::Method::GET, path)
            .query(query)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Server {
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(network_error)?;
        serde_json::from_str(&body).map_err(|e| FetchError::MalformedPayload(e.to_string()))
    }

    async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<(), FetchError> {
        let response = self
            .request(reqwest::Method::POST, path)
            .form(form)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(FetchError::Server {
                status: status.as_u16(),
            })
        }
    }
}

impl NotificationApi for HttpNotificationApi {
    async fn fetch_notifications(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<FetchResponse, FetchError> {
        self.get_json(NOTIFICATIONS_PATH, &since_query(since)).await
    }

    async fn mark_read(&self, id: &str) -> Result<(), FetchError> {
        self.post_form(MARK_READ_PATH, &[("notification_id", id)])
            .await
    }

    async fn mark_all_read(&self) -> Result<(), FetchError> {
        self.post_form(MARK_ALL_READ_PATH, &[]).await
    }

    async fn fetch_alerts(&self, feed: AlertFeed) -> Result<Vec<Notification>, FetchError> {
        match feed {
            AlertFeed::Warranty => {
                let resp: WarrantyAlertsResponse = self.get_json(feed.path(), &[]).await?;
                Ok(resp.critical_alerts.iter().map(Notification::from).collect())
            }
            AlertFeed::Assignment => {
                let resp: AssignmentAlertsResponse = self.get_json(feed.path(), &[]).await?;
                Ok(resp.overdue.iter().map(Notification::from).collect())
            }
        }
    }
}

fn network_error(e: reqwest::Error) -> FetchError {
    FetchError::Network(e.to_string())
}

/// Query parameters for an incremental fetch. No `since` on the first call.
pub(crate) fn since_query(since: Option<DateTime<Utc>>) -> Vec<(&'static str, String)> {
    since
        .map(|ts| vec![("since", ts.to_rfc3339_opts(SecondsFormat::Millis, true))])
        .unwrap_or_default()
}
