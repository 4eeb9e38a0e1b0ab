use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::ServiceError;
use super::http::{api_client, check_status, json_body, request_error};
use super::spotify_auth::SpotifyAuth;

const SERVICE: &str = "Spotify";
const SPOTIFY_API: &str = "https://api.spotify.com/v1";

/// `POST /playlists/{id}/tracks` accepts at most this many URIs per call.
const MAX_TRACKS_PER_REQUEST: usize = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub followers: Option<Followers>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Followers {
    pub total: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Artist {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Album {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Track {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<Artist>,
    #[serde(default)]
    pub album: Option<Album>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub popularity: u32,
    #[serde(default)]
    pub preview_url: Option<String>,
}

impl Track {
    pub fn artist(&self) -> &str {
        self.artists.first().map_or("Unknown", |a| a.name.as_str())
    }

    pub fn album_name(&self) -> &str {
        self.album.as_ref().map_or("Unknown", |a| a.name.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Device {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Playback {
    #[serde(default)]
    pub is_playing: bool,
    #[serde(default)]
    pub progress_ms: Option<u64>,
    #[serde(default)]
    pub item: Option<Track>,
    #[serde(default)]
    pub device: Option<Device>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackCount {
    pub total: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExternalUrls {
    #[serde(default)]
    pub spotify: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub public: Option<bool>,
    #[serde(default)]
    pub tracks: Option<TrackCount>,
    #[serde(default)]
    pub external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct Paging<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: Paging<Track>,
}

#[derive(Debug, Deserialize)]
struct RecommendationsResponse {
    #[serde(default)]
    tracks: Vec<Track>,
}

/// Seeds for `GET /recommendations`.
#[derive(Debug, Clone, Default)]
pub struct Seeds {
    pub tracks: Vec<String>,
    pub artists: Vec<String>,
    pub genres: Vec<String>,
}

impl Seeds {
    pub fn genres(genres: &[&str]) -> Self {
        Self {
            genres: genres.iter().map(|g| g.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty() && self.artists.is_empty() && self.genres.is_empty()
    }

    fn params(&self, limit: u32) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        for (key, values) in [
            ("seed_tracks", &self.tracks),
            ("seed_artists", &self.artists),
            ("seed_genres", &self.genres),
        ] {
            if !values.is_empty() {
                params.push((key, values.join(",")));
            }
        }
        params.push(("limit", limit.to_string()));
        params
    }
}

pub fn track_uri(track_id: &str) -> String {
    format!("spotify:track:{track_id}")
}

/// Spotify Web API client.
pub struct SpotifyClient {
    http: Client,
    base_url: String,
    auth: SpotifyAuth,
}

impl SpotifyClient {
    pub fn new(auth: SpotifyAuth) -> Self {
        Self {
            http: api_client(),
            base_url: SPOTIFY_API.into(),
            auth,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn auth(&self) -> &SpotifyAuth {
        &self.auth
    }

    async fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ServiceError> {
        let token = self.auth.access_token().await?;
        Ok(self
            .http
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(token))
    }

    async fn send(req: RequestBuilder) -> Result<Response, ServiceError> {
        let resp = req.send().await.map_err(|e| request_error(SERVICE, e))?;
        check_status(SERVICE, resp).await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ServiceError> {
        let req = self.request(Method::GET, path).await?.query(params);
        json_body(SERVICE, Self::send(req).await?).await
    }

    pub async fn current_user(&self) -> Result<User, ServiceError> {
        self.auth.require_user("Reading the current user")?;
        self.get("/me", &[]).await
    }

    /// `None` when no device is active (204).
    pub async fn current_playback(&self) -> Result<Option<Playback>, ServiceError> {
        self.auth.require_user("Reading playback")?;
        let resp = Self::send(self.request(Method::GET, "/me/player").await?).await?;
        if resp.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        json_body(SERVICE, resp).await
    }

    pub async fn search_tracks(&self, query: &str, limit: u32) -> Result<Vec<Track>, ServiceError> {
        let found: SearchResponse = self
            .get(
                "/search",
                &[
                    ("q", query.to_string()),
                    ("type", "track".to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        Ok(found.tracks.items)
    }

    pub async fn top_tracks(&self, limit: u32, time_range: &str) -> Result<Vec<Track>, ServiceError> {
        self.auth.require_user("Reading top tracks")?;
        let page: Paging<Track> = self
            .get(
                "/me/top/tracks",
                &[
                    ("limit", limit.to_string()),
                    ("time_range", time_range.to_string()),
                ],
            )
            .await?;
        Ok(page.items)
    }

    pub async fn recommendations(&self, seeds: &Seeds, limit: u32) -> Result<Vec<Track>, ServiceError> {
        let recs: RecommendationsResponse = self.get("/recommendations", &seeds.params(limit)).await?;
        Ok(recs.tracks)
    }

    pub async fn create_playlist(
        &self,
        user_id: &str,
        name: &str,
        description: &str,
        public: bool,
    ) -> Result<Playlist, ServiceError> {
        self.auth.require_user("Creating playlists")?;
        let path = format!("/users/{}/playlists", urlencoding::encode(user_id));
        let req = self.request(Method::POST, &path).await?.json(&json!({
            "name": name,
            "public": public,
            "description": description,
        }));
        json_body(SERVICE, Self::send(req).await?).await
    }

    pub async fn add_tracks(&self, playlist_id: &str, track_ids: &[String]) -> Result<(), ServiceError> {
        self.auth.require_user("Editing playlists")?;
        let path = format!("/playlists/{}/tracks", urlencoding::encode(playlist_id));
        for batch in track_ids.chunks(MAX_TRACKS_PER_REQUEST) {
            let uris: Vec<String> = batch.iter().map(|id| track_uri(id)).collect();
            let req = self
                .request(Method::POST, &path)
                .await?
                .json(&json!({ "uris": uris }));
            Self::send(req).await?;
        }
        Ok(())
    }

    pub async fn my_playlists(&self) -> Result<Vec<Playlist>, ServiceError> {
        self.auth.require_user("Listing playlists")?;
        let page: Paging<Playlist> = self.get("/me/playlists", &[]).await?;
        Ok(page.items)
    }

    /// Start playback of the given tracks, or resume when `track_ids` is empty.
    pub async fn start_playback(&self, track_ids: &[String]) -> Result<(), ServiceError> {
        self.auth.require_user("Controlling playback")?;
        let mut req = self.request(Method::PUT, "/me/player/play").await?;
        if !track_ids.is_empty() {
            let uris: Vec<String> = track_ids.iter().map(|id| track_uri(id)).collect();
            req = req.json(&json!({ "uris": uris }));
        } else {
            req = req.header(reqwest::header::CONTENT_LENGTH, 0);
        }
        Self::send(req).await?;
        Ok(())
    }

    pub async fn pause_playback(&self) -> Result<(), ServiceError> {
        self.auth.require_user("Controlling playback")?;
        let req = self
            .request(Method::PUT, "/me/player/pause")
            .await?
            .header(reqwest::header::CONTENT_LENGTH, 0);
        Self::send(req).await?;
        Ok(())
    }
}
