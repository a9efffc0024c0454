//! Pandora REST client (the JSON API the web player uses).
//!
//! Every request is a JSON `POST` under `{base}/api`.  Two tokens ride along:
//! a CSRF token read from the `csrftoken` cookie of a `HEAD {base}`, sent
//! both as `X-CsrfToken` and as a cookie, and the auth token from login, sent
//! as `X-AuthToken`.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::COOKIE;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stationbar_core::CatalogClient;
use stationbar_proto::{AudioFormat, Narrative, Station, Track};
use tokio::sync::RwLock;
use tracing::{debug, info};

pub const DEFAULT_BASE: &str = "https://www.pandora.com";

const CSRF_COOKIE: &str = "csrftoken";
const LOGIN_PATH: &str = "/v1/auth/login";
const STATION_PAGE_SIZE: u32 = 250;

#[derive(Default)]
struct Session {
    auth_token: Option<String>,
    csrf_token: Option<String>,
    /// Station of the last fragment request; the first fetch after a change
    /// is flagged as a station start.
    last_station: Option<String>,
}

pub struct PandoraClient {
    http: reqwest::Client,
    base: String,
    api_base: String,
    audio_format: AudioFormat,
    session: RwLock<Session>,
}

// ── wire types ────────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
    keep_logged_in: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    auth_token: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    webname: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StationsRequest {
    page_size: u32,
    start_index: u32,
}

#[derive(Deserialize)]
struct StationsResponse {
    #[serde(default)]
    stations: Vec<Station>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FragmentRequest<'a> {
    station_id: &'a str,
    is_station_start: bool,
    fragment_request_reason: &'a str,
    audio_format: AudioFormat,
}

#[derive(Deserialize)]
struct FragmentResponse {
    #[serde(default)]
    tracks: Vec<Track>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FeedbackRequest<'a> {
    track_token: &'a str,
    is_positive: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TiredRequest<'a> {
    track_token: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NarrativeRequest<'a> {
    station_id: &'a str,
    music_id: &'a str,
}

// ── client ────────────────────────────────────────────────────────────────────

impl PandoraClient {
    pub fn new(audio_format: AudioFormat) -> Result<Self> {
        Self::with_base(DEFAULT_BASE, audio_format)
    }

    /// Client talking to `base` instead of pandora.com.
    pub fn with_base(base: &str, audio_format: AudioFormat) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("stationbar/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        let base = base.trim_end_matches('/').to_string();

        Ok(Self {
            http,
            api_base: format!("{}/api", base),
            base,
            audio_format,
            session: RwLock::new(Session::default()),
        })
    }

    async fn csrf_token(&self) -> Result<String> {
        if let Some(token) = self.session.read().await.csrf_token.clone() {
            return Ok(token);
        }

        let response = self
            .http
            .head(&self.base)
            .send()
            .await
            .context("update csrf")?;

        let token = response
            .cookies()
            .find(|c| c.name() == CSRF_COOKIE)
            .map(|c| c.value().to_string())
            .ok_or_else(|| anyhow::anyhow!("CSRF cookie not found"))?;

        debug!("Got CSRF token");
        self.session.write().await.csrf_token = Some(token.clone());
        Ok(token)
    }

    async fn post<Req, Resp>(&self, path: &str, payload: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let auth_token = self.session.read().await.auth_token.clone();
        if auth_token.is_none() && path != LOGIN_PATH {
            anyhow::bail!("not logged in");
        }
        let csrf = self.csrf_token().await?;

        let url = format!("{}/{}", self.api_base, path.trim_start_matches('/'));
        let mut request = self
            .http
            .post(&url)
            .header("X-CsrfToken", &csrf)
            .header(COOKIE, format!("{}={}", CSRF_COOKIE, csrf))
            .json(payload);
        if let Some(token) = auth_token {
            request = request.header("X-AuthToken", token);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("POST {}", path))?;
        let response = check_status(response).await?;

        response
            .json()
            .await
            .with_context(|| format!("{}: read response", path))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    anyhow::bail!("unexpected result {}:\n{}", status, body)
}

impl CatalogClient for PandoraClient {
    async fn login(&self, username: &str, password: &str) -> Result<()> {
        debug!(username, "Attempting to log in");
        let response: LoginResponse = self
            .post(
                LOGIN_PATH,
                &LoginRequest {
                    username,
                    password,
                    keep_logged_in: true,
                },
            )
            .await
            .context("login")?;

        self.session.write().await.auth_token = Some(response.auth_token);
        info!(
            user = %response.username,
            webname = %response.webname,
            "Successfully logged in"
        );
        Ok(())
    }

    async fn list_stations(&self) -> Result<Vec<Station>> {
        debug!("Fetching stations");
        let response: StationsResponse = self
            .post(
                "/v1/station/getStations",
                &StationsRequest {
                    page_size: STATION_PAGE_SIZE,
                    start_index: 0,
                },
            )
            .await
            .context("get stations")?;
        Ok(response.stations)
    }

    async fn get_more_tracks(&self, station_id: &str) -> Result<Vec<Track>> {
        let is_station_start = {
            let mut session = self.session.write().await;
            let start = session.last_station.as_deref() != Some(station_id);
            session.last_station = Some(station_id.to_string());
            start
        };

        debug!(station_id, is_station_start, "Fetching playlist fragment");
        let response: FragmentResponse = self
            .post(
                "/v1/playlist/getFragment",
                &FragmentRequest {
                    station_id,
                    is_station_start,
                    fragment_request_reason: "Normal",
                    audio_format: self.audio_format,
                },
            )
            .await
            .context("get playlist fragment")?;
        Ok(response.tracks)
    }

    async fn add_feedback(&self, track_token: &str, is_positive: bool) -> Result<()> {
        let _: Value = self
            .post(
                "/v1/station/addFeedback",
                &FeedbackRequest {
                    track_token,
                    is_positive,
                },
            )
            .await
            .context("add feedback")?;
        Ok(())
    }

    async fn add_tired(&self, track_token: &str) -> Result<()> {
        let _: Value = self
            .post("/v1/listener/addTiredSong", &TiredRequest { track_token })
            .await
            .context("add tired song")?;
        Ok(())
    }

    async fn get_narrative(&self, station_id: &str, music_id: &str) -> Result<Narrative> {
        self.post(
            "/v1/music/narrative",
            &NarrativeRequest {
                station_id,
                music_id,
            },
        )
        .await
        .context("get narrative")
    }
}
