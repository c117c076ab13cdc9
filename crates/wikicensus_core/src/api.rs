use std::collections::BTreeSet;
use std::thread::sleep;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use chrono::{DateTime, Months, NaiveDate, NaiveDateTime, Utc};
use log::{debug, error, warn};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, COOKIE};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::config::CrawlConfig;
use crate::error::CrawlError;
use crate::model::{ContentKind, Edit, Page, PageRestrictions, PageStatus};

pub const SPACE_EXPAND: &str = "permissions";
pub const CONTENT_EXPAND: &str = "ancestors,history,history.lastUpdated,space";
const SESSION_COOKIE_NAME: &str = "cloud.session.token";
const LABEL_LIMIT: &str = "200";

/// Position in a paginated listing: the first page, or the server's `next` link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cursor {
    Start,
    Next(String),
}

pub trait WikiReadApi {
    fn list_spaces(&mut self, cursor: &Cursor) -> Result<Listing<ApiSpace>, CrawlError>;
    fn get_space(&mut self, key: &str) -> Result<ApiSpace, CrawlError>;
    fn list_content(
        &mut self,
        space_key: &str,
        kind: ContentKind,
        cursor: &Cursor,
    ) -> Result<Listing<ApiPage>, CrawlError>;
    fn page_views(&mut self, page_id: &str) -> Result<u64, CrawlError>;
    fn page_restrictions(&mut self, page_id: &str) -> Result<PageRestrictions, CrawlError>;
    fn page_labels(&mut self, page_id: &str) -> Result<Vec<String>, CrawlError>;
    /// Whether a session cookie credential was supplied.
    fn has_session(&self) -> bool;
    /// Wiki root used to absolutize page links.
    fn site(&self) -> &str;
    fn request_count(&self) -> usize;
}

pub struct ConfluenceClient {
    client: Client,
    config: CrawlConfig,
    request_count: usize,
}

impl ConfluenceClient {
    pub fn new(config: &CrawlConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.http.timeout_ms))
            .connect_timeout(Duration::from_millis(config.http.connect_timeout_ms))
            .user_agent(config.http.user_agent.clone())
            .build()
            .context("failed to build Confluence HTTP client")?;

        Ok(Self {
            client,
            config: config.clone(),
            request_count: 0,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_client(client: Client, config: &CrawlConfig) -> Self {
        Self {
            client,
            config: config.clone(),
            request_count: 0,
        }
    }

    fn get_json<T: DeserializeOwned>(
        &mut self,
        url: &Url,
        query: &[(&str, String)],
        use_session: bool,
    ) -> Result<T, CrawlError> {
        let max_retries = self.config.http.max_retries;

        for attempt in 0..=max_retries {
            self.request_count += 1;
            debug!("GET {url}");
            let mut request = self
                .client
                .get(url.clone())
                .header(ACCEPT, "application/json")
                .query(query);
            request = match (&self.config.credentials.session_token, use_session) {
                (Some(token), true) => {
                    request.header(COOKIE, format!("{SESSION_COOKIE_NAME}={token}"))
                }
                _ => request.basic_auth(
                    &self.config.credentials.user,
                    Some(&self.config.credentials.password),
                ),
            };

            match request.send() {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        if attempt < max_retries && is_retryable_status(status) {
                            warn!("Request for {url} answered {status}; retrying");
                            self.wait_before_retry(attempt);
                            continue;
                        }
                        error!("Request for {url} failed: status {}", status.as_u16());
                        return Err(CrawlError::status(url.as_str(), status.as_u16()));
                    }
                    return response.json::<T>().map_err(|error| CrawlError::Decode {
                        url: url.to_string(),
                        detail: error.to_string(),
                    });
                }
                Err(error) => {
                    if attempt < max_retries && is_retryable_error(&error) {
                        warn!("Request for {url} failed: {error}; retrying");
                        self.wait_before_retry(attempt);
                        continue;
                    }
                    error!("Request for {url} failed: {error}");
                    return Err(CrawlError::Transport {
                        url: url.to_string(),
                        status: None,
                        detail: error.to_string(),
                    });
                }
            }
        }

        Err(CrawlError::Transport {
            url: url.to_string(),
            status: None,
            detail: "retry budget exhausted".to_string(),
        })
    }

    fn wait_before_retry(&self, attempt: usize) {
        let exponent = u32::try_from(attempt).unwrap_or(16);
        let base = self
            .config
            .http
            .retry_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        let jitter = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| u64::from(duration.subsec_millis() % 100))
            .unwrap_or(0);
        sleep(Duration::from_millis(base.saturating_add(jitter)));
    }

    /// The server's `next` links only carry the cursor, so the original
    /// filters and expansions are put back on every follow-up request.
    /// `start` belongs to the cursor and is never re-added to a next link.
    fn listing<T: DeserializeOwned>(
        &mut self,
        path: &str,
        mut params: Vec<(&str, String)>,
        cursor: &Cursor,
    ) -> Result<Listing<T>, CrawlError> {
        if matches!(cursor, Cursor::Next(_)) {
            params.retain(|(key, _)| *key != "start");
        }
        let url = listing_url(&self.config.site, path, cursor)?;
        let url = with_missing_params(url, &params);
        self.get_json(&url, &[], false)
    }

    /// `{site}/rest/api/{base}/{segments...}` with each segment percent-encoded.
    fn resource_url(&self, base: &str, segments: &[&str]) -> Result<Url, CrawlError> {
        let mut url = listing_url(&self.config.site, base, &Cursor::Start)?;
        let invalid = || CrawlError::Transport {
            url: self.config.site.clone(),
            status: None,
            detail: "site url cannot carry a path".to_string(),
        };
        url.path_segments_mut()
            .map_err(|()| invalid())?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

impl WikiReadApi for ConfluenceClient {
    fn list_spaces(&mut self, cursor: &Cursor) -> Result<Listing<ApiSpace>, CrawlError> {
        let params = vec![
            ("start", "0".to_string()),
            ("limit", self.config.http.space_limit.to_string()),
            ("expand", SPACE_EXPAND.to_string()),
        ];
        self.listing("/rest/api/space", params, cursor)
    }

    fn get_space(&mut self, key: &str) -> Result<ApiSpace, CrawlError> {
        let url = self.resource_url("/rest/api/space", &[key])?;
        self.get_json(&url, &[("expand", SPACE_EXPAND.to_string())], false)
    }

    fn list_content(
        &mut self,
        space_key: &str,
        kind: ContentKind,
        cursor: &Cursor,
    ) -> Result<Listing<ApiPage>, CrawlError> {
        let params = vec![
            ("spaceKey", space_key.to_string()),
            ("type", kind.as_api_str().to_string()),
            ("status", "any".to_string()),
            ("start", "0".to_string()),
            ("limit", self.config.http.page_limit.to_string()),
            ("expand", CONTENT_EXPAND.to_string()),
        ];
        self.listing("/rest/api/content", params, cursor)
    }

    fn page_views(&mut self, page_id: &str) -> Result<u64, CrawlError> {
        let unavailable = |reason: String| CrawlError::AnalyticsUnavailable {
            page_id: page_id.to_string(),
            reason,
        };
        if self.config.credentials.session_token.is_none() {
            return Err(unavailable("no session credential".to_string()));
        }
        let Some(cloud_id) = self.config.credentials.cloud_id.clone() else {
            return Err(unavailable("CLOUD_ID is not configured".to_string()));
        };
        let Some(origin) = self.config.site_origin() else {
            return Err(unavailable(format!("cannot derive origin of {}", self.config.site)));
        };

        let url = Url::parse(&format!(
            "{origin}/gateway/api/ex/confluence/{cloud_id}/analytics/content/viewsByDate"
        ))
        .map_err(|error| unavailable(error.to_string()))?;
        let (from, to) = analytics_window(Utc::now().date_naive(), self.config.http.views_years);
        let query = [
            ("contentId", page_id.to_string()),
            ("contentType", "page".to_string()),
            ("fromDate", format!("{from}T00:00:00.000Z")),
            ("toDate", format!("{to}T23:59:59.999Z")),
            ("type", "total".to_string()),
            ("period", "week".to_string()),
            ("timezone", self.config.http.views_timezone.clone()),
        ];

        let views: ApiViews = self
            .get_json(&url, &query, true)
            .map_err(|error| unavailable(error.to_string()))?;
        Ok(views.total())
    }

    fn page_restrictions(&mut self, page_id: &str) -> Result<PageRestrictions, CrawlError> {
        let url = self.resource_url(
            "/rest/api/content",
            &[page_id, "restriction", "byOperation"],
        )?;
        let restrictions: ApiRestrictionsByOperation = self.get_json(&url, &[], false)?;
        Ok(restrictions.read_restrictions())
    }

    fn page_labels(&mut self, page_id: &str) -> Result<Vec<String>, CrawlError> {
        let url = self.resource_url("/rest/api/content", &[page_id, "label"])?;
        let labels: ApiResults<ApiLabel> =
            self.get_json(&url, &[("limit", LABEL_LIMIT.to_string())], false)?;
        Ok(labels
            .results
            .into_iter()
            .filter_map(ApiLabel::into_text)
            .collect())
    }

    fn has_session(&self) -> bool {
        self.config.credentials.session_token.is_some()
    }

    fn site(&self) -> &str {
        &self.config.site
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

/// URL for the first page of `path`, or the absolutized `next` link.
pub fn listing_url(site: &str, path: &str, cursor: &Cursor) -> Result<Url, CrawlError> {
    let raw = match cursor {
        Cursor::Start => format!("{site}{path}"),
        Cursor::Next(link) if link.starts_with("http://") || link.starts_with("https://") => {
            link.clone()
        }
        Cursor::Next(link) => format!("{site}{link}"),
    };
    Url::parse(&raw).map_err(|error| CrawlError::Transport {
        url: raw.clone(),
        status: None,
        detail: format!("invalid url: {error}"),
    })
}

/// Append every entry of `params` whose key the URL's query lacks.
pub fn with_missing_params(mut url: Url, params: &[(&str, String)]) -> Url {
    let present: BTreeSet<String> = url.query_pairs().map(|(key, _)| key.into_owned()).collect();
    let missing: Vec<&(&str, String)> = params
        .iter()
        .filter(|(key, _)| !present.contains(*key))
        .collect();
    if !missing.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in missing {
            pairs.append_pair(key, value);
        }
    }
    url
}

/// Look-back window ending today; Feb 29 clamps to Feb 28.
pub fn analytics_window(today: NaiveDate, years: u32) -> (NaiveDate, NaiveDate) {
    let from = today
        .checked_sub_months(Months::new(years.saturating_mul(12)))
        .unwrap_or(today);
    (from, today)
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    let naive = trimmed.trim_end_matches('Z');
    NaiveDateTime::parse_from_str(naive, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|parsed| parsed.and_utc())
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Listing<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    #[serde(default)]
    pub start: Option<usize>,
    #[serde(default)]
    pub size: Option<usize>,
    #[serde(default, rename = "_links")]
    pub links: ListingLinks,
}

impl<T> Listing<T> {
    pub fn next_link(&self) -> Option<&str> {
        self.links
            .next
            .as_deref()
            .filter(|link| !link.trim().is_empty())
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ListingLinks {
    pub next: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiSpace {
    pub key: String,
    pub name: Option<String>,
    #[serde(default)]
    pub permissions: Vec<ApiPermission>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ApiPermission {
    pub operation: Option<ApiOperation>,
    #[serde(default, rename = "anonymousAccess")]
    pub anonymous_access: bool,
    pub subjects: Option<ApiSubjects>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiOperation {
    pub operation: String,
    #[serde(rename = "targetType")]
    pub target_type: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ApiSubjects {
    pub group: Option<ApiResults<ApiGroup>>,
    pub user: Option<ApiResults<ApiUser>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiResults<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiGroup {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ApiUser {
    pub username: Option<String>,
    #[serde(rename = "displayName")]
    pub display_name: Option<String>,
    #[serde(rename = "publicName")]
    pub public_name: Option<String>,
    pub email: Option<String>,
    #[serde(rename = "accountId")]
    pub account_id: Option<String>,
}

impl ApiUser {
    /// First identifying field the API gave us.
    pub fn name(&self) -> &str {
        [
            &self.username,
            &self.display_name,
            &self.public_name,
            &self.email,
            &self.account_id,
        ]
        .into_iter()
        .find_map(|value| value.as_deref())
        .unwrap_or("UNKNOWN")
    }

    fn edit_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or_else(|| self.name())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiPage {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub status: Option<String>,
    pub title: Option<String>,
    #[serde(default)]
    pub ancestors: Vec<ApiAncestor>,
    pub history: Option<ApiHistory>,
    pub space: Option<ApiSpaceRef>,
    #[serde(default, rename = "_links")]
    pub links: ApiPageLinks,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiAncestor {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ApiHistory {
    #[serde(rename = "createdBy")]
    pub created_by: Option<ApiUser>,
    #[serde(rename = "createdDate")]
    pub created_date: Option<String>,
    #[serde(rename = "lastUpdated")]
    pub last_updated: Option<ApiLastUpdated>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ApiLastUpdated {
    pub by: Option<ApiUser>,
    pub when: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiSpaceRef {
    pub key: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ApiPageLinks {
    pub webui: Option<String>,
}

impl ApiPage {
    /// Convert into a model page; `listed_space` is used when the record
    /// carries no space of its own.
    pub fn into_page(self, site: &str, listed_space: &str, listed_kind: ContentKind) -> Page {
        let kind = self
            .kind
            .as_deref()
            .map(ContentKind::parse)
            .unwrap_or(listed_kind);
        let status = self
            .status
            .as_deref()
            .map(PageStatus::parse)
            .unwrap_or(PageStatus::Current);
        let url = self
            .links
            .webui
            .filter(|path| !path.is_empty())
            .map(|path| format!("{site}{path}"));
        let history = self.history.unwrap_or_default();
        let created = match (&history.created_by, &history.created_date) {
            (Some(who), Some(when)) => edit(who.edit_name(), when),
            _ => None,
        };
        let last_edit = history.last_updated.as_ref().and_then(|updated| {
            match (&updated.by, &updated.when) {
                (Some(who), Some(when)) => edit(who.edit_name(), when),
                _ => None,
            }
        });

        Page {
            id: self.id.unwrap_or_default(),
            title: self
                .title
                .filter(|title| !title.is_empty())
                .unwrap_or_else(|| "<no title>".to_string()),
            kind,
            status,
            space_key: self
                .space
                .map(|space| space.key)
                .unwrap_or_else(|| listed_space.to_string()),
            url,
            parent_id: self.ancestors.last().map(|ancestor| ancestor.id.clone()),
            created,
            last_edit,
            views: None,
            restrictions: None,
            labels: Vec::new(),
        }
    }
}

fn edit(who: &str, when: &str) -> Option<Edit> {
    match parse_timestamp(when) {
        Some(when) => Some(Edit {
            who: who.to_string(),
            when,
        }),
        None => {
            warn!("Ignoring unparseable timestamp {when:?} for {who}");
            None
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ApiRestrictionsByOperation {
    pub read: Option<ApiOperationRestrictions>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ApiOperationRestrictions {
    pub restrictions: Option<ApiSubjects>,
}

impl ApiRestrictionsByOperation {
    pub fn read_restrictions(self) -> PageRestrictions {
        let subjects = self
            .read
            .and_then(|read| read.restrictions)
            .unwrap_or_default();
        PageRestrictions {
            groups: subjects
                .group
                .map(|groups| groups.results.into_iter().map(|group| group.name).collect())
                .unwrap_or_default(),
            users: subjects
                .user
                .map(|users| {
                    users
                        .results
                        .iter()
                        .map(|user| user.name().to_string())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiLabel {
    pub prefix: Option<String>,
    pub name: Option<String>,
    pub label: Option<String>,
}

impl ApiLabel {
    fn into_text(self) -> Option<String> {
        self.label
            .or(self.name)
            .filter(|text| !text.trim().is_empty())
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ApiViews {
    #[serde(default, rename = "viewsByDate")]
    pub views_by_date: Vec<ApiViewBucket>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiViewBucket {
    pub date: Option<String>,
    #[serde(default)]
    pub total: u64,
}

impl ApiViews {
    pub fn total(&self) -> u64 {
        self.views_by_date
            .iter()
            .fold(0u64, |sum, bucket| sum.saturating_add(bucket.total))
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    use chrono::{Datelike, Timelike};
    use serde_json::json;

    use super::*;
    use crate::config::{ENV_PASSWORD, ENV_SITE, ENV_USER};
    use crate::crawl::fetch_spaces;
    use crate::model::CrawlResult;

    /// Answers one JSON body per connection and hands back the request lines.
    fn serve(bodies: Vec<serde_json::Value>) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
        let site = format!("http://{}/wiki", listener.local_addr().expect("local addr"));
        let handle = thread::spawn(move || {
            let mut requests = Vec::new();
            for body in bodies {
                let (mut stream, _) = listener.accept().expect("accept");
                let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
                let mut request_line = String::new();
                reader.read_line(&mut request_line).expect("request line");
                loop {
                    let mut header = String::new();
                    let read = reader.read_line(&mut header).expect("header line");
                    if read == 0 || header == "\r\n" {
                        break;
                    }
                }
                requests.push(request_line.trim_end().to_string());

                let body = body.to_string();
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(response.as_bytes()).expect("write response");
            }
            requests
        });
        (site, handle)
    }

    fn local_client(site: &str) -> ConfluenceClient {
        let config = CrawlConfig::resolve(None, |key: &str| match key {
            ENV_USER => Some("bot@example.com".to_string()),
            ENV_PASSWORD => Some("api-token".to_string()),
            ENV_SITE => Some(site.to_string()),
            _ => None,
        })
        .expect("config");
        let client = Client::builder().no_proxy().build().expect("http client");
        ConfluenceClient::with_client(client, &config)
    }

    #[test]
    fn follow_up_space_pages_keep_permission_expansion() {
        let (site, server) = serve(vec![
            json!({
                "results": [{"key": "ENG", "name": "Engineering", "permissions": []}],
                "start": 0, "limit": 10, "size": 1,
                "_links": {"next": "/rest/api/space?next=true&limit=10&start=10"}
            }),
            json!({
                "results": [{
                    "key": "OPS",
                    "name": "Operations",
                    "permissions": [
                        {"operation": {"operation": "read", "targetType": "space"}, "anonymousAccess": true}
                    ]
                }],
                "start": 10, "limit": 10, "size": 1,
                "_links": {}
            }),
        ]);
        let mut client = local_client(&site);
        let mut result = CrawlResult::new();

        fetch_spaces(&mut client, &mut result).expect("fetch spaces");
        let requests = server.join().expect("server thread");

        assert_eq!(requests.len(), 2);
        assert!(requests[0].starts_with("GET /wiki/rest/api/space?start=0&limit=10&expand=permissions "));
        assert!(requests[1].starts_with("GET /wiki/rest/api/space?next=true&limit=10&start=10&expand=permissions "));
        assert!(result.space("OPS").expect("OPS").access.anonymous_read);
        assert_eq!(client.request_count(), 2);
    }

    #[test]
    fn follow_up_content_pages_keep_filters() {
        let (site, server) = serve(vec![json!({"results": [], "_links": {}})]);
        let mut client = local_client(&site);

        let cursor = Cursor::Next("/rest/api/content?next=true&limit=100&start=100&spaceKey=ENG".to_string());
        client
            .list_content("ENG", ContentKind::BlogPost, &cursor)
            .expect("content listing");
        let requests = server.join().expect("server thread");

        let line = &requests[0];
        assert!(line.contains("start=100"));
        assert!(!line.contains("start=0"));
        assert_eq!(line.matches("spaceKey=").count(), 1);
        assert!(line.contains("type=blogpost"));
        assert!(line.contains("status=any"));
        assert!(line.contains("expand=ancestors%2Chistory%2Chistory.lastUpdated%2Cspace"));
    }

    #[test]
    fn cursor_style_next_links_are_not_rewound() {
        let (site, server) = serve(vec![json!({"results": [], "_links": {}})]);
        let mut client = local_client(&site);

        let cursor = Cursor::Next("/rest/api/space?cursor=abc&limit=10".to_string());
        client.list_spaces(&cursor).expect("space listing");
        let requests = server.join().expect("server thread");

        assert!(requests[0].starts_with("GET /wiki/rest/api/space?cursor=abc&limit=10&expand=permissions "));
    }

    #[test]
    fn space_key_is_percent_encoded_in_the_path() {
        let (site, server) = serve(vec![json!({"key": "my key/x", "name": "Odd"})]);
        let mut client = local_client(&site);

        let space = client.get_space("my key/x").expect("space");
        let requests = server.join().expect("server thread");

        assert_eq!(space.key, "my key/x");
        assert!(requests[0].starts_with("GET /wiki/rest/api/space/my%20key%2Fx?expand=permissions "));
    }

    #[test]
    fn restrictions_and_labels_are_read_from_their_endpoints() {
        let (site, server) = serve(vec![
            json!({
                "read": {
                    "operation": "read",
                    "restrictions": {
                        "group": {"results": [{"name": "hr"}]},
                        "user": {"results": [{"displayName": "Amy", "accountId": "a1"}]}
                    }
                },
                "update": {"operation": "update", "restrictions": {"group": {"results": [{"name": "editors"}]}}}
            }),
            json!({
                "results": [
                    {"prefix": "global", "name": "runbook", "label": "runbook"},
                    {"prefix": "global", "name": "ops"}
                ]
            }),
        ]);
        let mut client = local_client(&site);

        let restrictions = client.page_restrictions("42").expect("restrictions");
        let labels = client.page_labels("42").expect("labels");
        let requests = server.join().expect("server thread");

        assert_eq!(restrictions.groups, vec!["hr"]);
        assert_eq!(restrictions.users, vec!["Amy"]);
        assert_eq!(labels, vec!["runbook", "ops"]);
        assert!(requests[0].starts_with("GET /wiki/rest/api/content/42/restriction/byOperation "));
        assert!(requests[1].starts_with("GET /wiki/rest/api/content/42/label?limit=200 "));
    }

    #[test]
    fn missing_params_are_appended_once() {
        let url = Url::parse("https://w.example/wiki/rest/api/space?limit=10&start=10")
            .expect("url");
        let params = vec![
            ("start", "0".to_string()),
            ("limit", "10".to_string()),
            ("expand", SPACE_EXPAND.to_string()),
        ];
        let merged = with_missing_params(url, &params);
        assert_eq!(
            merged.as_str(),
            "https://w.example/wiki/rest/api/space?limit=10&start=10&expand=permissions"
        );

        let bare = Url::parse("https://w.example/wiki/rest/api/space").expect("url");
        assert_eq!(
            with_missing_params(bare, &[]).as_str(),
            "https://w.example/wiki/rest/api/space"
        );
    }

    #[test]
    fn listing_decodes_results_and_next_link() {
        let listing: Listing<ApiSpace> = serde_json::from_value(json!({
            "results": [
                {"id": 98306, "key": "ENG", "name": "Engineering", "permissions": []},
                {"id": 98307, "key": "OPS", "name": "Operations"}
            ],
            "start": 0,
            "limit": 2,
            "size": 2,
            "_links": {"next": "/rest/api/space?next=true&limit=2&start=2"}
        }))
        .expect("decode listing");

        assert_eq!(listing.results.len(), 2);
        assert_eq!(listing.results[1].key, "OPS");
        assert_eq!(
            listing.next_link(),
            Some("/rest/api/space?next=true&limit=2&start=2")
        );
    }

    #[test]
    fn listing_without_links_has_no_next() {
        let listing: Listing<ApiSpace> =
            serde_json::from_value(json!({"results": []})).expect("decode listing");
        assert!(listing.next_link().is_none());
        assert!(listing.results.is_empty());
    }

    #[test]
    fn listing_url_resolves_relative_and_absolute_links() {
        let site = "https://acme.atlassian.net/wiki";
        let first = listing_url(site, "/rest/api/space", &Cursor::Start).expect("start");
        assert_eq!(first.as_str(), "https://acme.atlassian.net/wiki/rest/api/space");

        let next = listing_url(
            site,
            "/rest/api/space",
            &Cursor::Next("/rest/api/space?limit=10&start=10".to_string()),
        )
        .expect("next");
        assert_eq!(
            next.as_str(),
            "https://acme.atlassian.net/wiki/rest/api/space?limit=10&start=10"
        );

        let absolute = listing_url(
            site,
            "/rest/api/space",
            &Cursor::Next("https://other.example/rest/api/space?start=5".to_string()),
        )
        .expect("absolute");
        assert_eq!(absolute.host_str(), Some("other.example"));
    }

    #[test]
    fn page_record_converts_history_and_parent() {
        let record: ApiPage = serde_json::from_value(json!({
            "id": "1234",
            "type": "page",
            "status": "current",
            "title": "Runbook",
            "ancestors": [{"id": "1"}, {"id": "77"}],
            "space": {"key": "OPS"},
            "history": {
                "createdBy": {"displayName": "Ann Author", "accountId": "abc"},
                "createdDate": "2019-07-17T15:24:33.912Z",
                "lastUpdated": {
                    "by": {"displayName": "Bob Builder (Deactivated)"},
                    "when": "2021-02-03T04:05:06.000Z"
                }
            },
            "_links": {"webui": "/spaces/OPS/pages/1234/Runbook"}
        }))
        .expect("decode page");

        let page = record.into_page("https://acme.atlassian.net/wiki", "ENG", ContentKind::Page);
        assert_eq!(page.id, "1234");
        assert_eq!(page.space_key, "OPS");
        assert_eq!(page.parent_id.as_deref(), Some("77"));
        assert_eq!(
            page.url.as_deref(),
            Some("https://acme.atlassian.net/wiki/spaces/OPS/pages/1234/Runbook")
        );
        let created = page.created.expect("created");
        assert_eq!(created.who, "Ann Author");
        assert_eq!(created.when.year(), 2019);
        let last_edit = page.last_edit.expect("last edit");
        assert_eq!(last_edit.display_name(), ("Bob Builder", true));
        assert_eq!(last_edit.when.hour(), 4);
    }

    #[test]
    fn sparse_page_record_falls_back_to_listing_context() {
        let record: ApiPage =
            serde_json::from_value(json!({"id": "5", "status": "draft"})).expect("decode page");
        let page = record.into_page("https://w.example", "ENG", ContentKind::BlogPost);
        assert_eq!(page.title, "<no title>");
        assert_eq!(page.space_key, "ENG");
        assert_eq!(page.kind, ContentKind::BlogPost);
        assert_eq!(page.status, PageStatus::Draft);
        assert!(page.url.is_none());
        assert!(page.created.is_none());
    }

    #[test]
    fn user_name_prefers_username_then_display_name() {
        let user = ApiUser {
            display_name: Some("Ann".to_string()),
            account_id: Some("abc".to_string()),
            ..Default::default()
        };
        assert_eq!(user.name(), "Ann");
        assert_eq!(ApiUser::default().name(), "UNKNOWN");
    }

    #[test]
    fn parse_timestamp_accepts_offsets_and_naive_values() {
        let zulu = parse_timestamp("2021-06-28T04:00:00.000Z").expect("zulu");
        assert_eq!(zulu.day(), 28);
        let offset = parse_timestamp("2021-06-28T01:00:00.000-03:00").expect("offset");
        assert_eq!(offset, zulu);
        assert!(parse_timestamp("2021-06-28T04:00:00").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn views_are_summed_across_buckets() {
        let views: ApiViews = serde_json::from_value(json!({
            "viewsByDate": [
                {"date": "2021-06-28T04:00:00.000Z", "total": 3},
                {"date": "2021-07-05T04:00:00.000Z", "total": 4},
                {"date": "2021-07-12T04:00:00.000Z"}
            ]
        }))
        .expect("decode views");
        assert_eq!(views.total(), 7);
    }

    #[test]
    fn analytics_window_clamps_leap_day() {
        let today = NaiveDate::from_ymd_opt(2024, 2, 29).expect("date");
        let (from, to) = analytics_window(today, 1);
        assert_eq!(from, NaiveDate::from_ymd_opt(2023, 2, 28).expect("date"));
        assert_eq!(to, today);
    }

    #[test]
    fn rate_limit_is_retryable_only_when_retries_are_enabled() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
    }
}
