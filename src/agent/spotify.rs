use chrono::Local;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::{Agent, status_report};
use crate::config::{SpotifyAuthFlow, SpotifyConfig};
use crate::console::formatter::{format_duration, numbered, title_case};
use crate::console::{Interactive, split_command};
use crate::error::{Error, Result};
use crate::provider::OllamaProvider;
use crate::services::spotify::{Seeds, SpotifyClient, Track};
use crate::services::spotify_auth::SpotifyAuth;

const SEARCH_LIMIT: u32 = 10;
const MOOD_PLAYLIST_LIMIT: usize = 20;
/// Below this many AI-picked tracks, genre recommendations fill the rest.
const MIN_AI_TRACKS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentTrack {
    pub name: String,
    pub artist: String,
    pub album: String,
    pub is_playing: bool,
    pub progress_ms: u64,
    pub duration_ms: u64,
    pub device: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedPlaylist {
    pub id: String,
    pub name: String,
    pub url: String,
    pub description: String,
    pub tracks_added: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaylistSummary {
    pub id: String,
    pub name: String,
    pub tracks_count: u64,
    pub public: bool,
    pub description: String,
}

/// Genres seeding recommendations for a mood.
pub fn genres_for_mood(mood: &str) -> &'static [&'static str] {
    match mood.to_lowercase().as_str() {
        "happy" => &["pop", "dance", "funk"],
        "sad" => &["indie", "blues", "singer-songwriter"],
        "energetic" => &["rock", "electronic", "hip-hop"],
        "chill" => &["ambient", "jazz", "indie-folk"],
        "focus" => &["classical", "ambient", "instrumental"],
        _ => &["pop"],
    }
}

/// `(song, artist)` pairs from bullet lines like `- "Song" by Artist`.
pub fn parse_song_suggestions(text: &str) -> Vec<(String, String)> {
    text.lines()
        .map(str::trim)
        .filter(|line| line.starts_with(['-', '•']))
        .filter_map(|line| {
            let info = line.trim_start_matches(['-', '•']).trim();
            let (song, artist) = info.split_once(" by ")?;
            let song = song.trim().trim_matches('"');
            let artist = artist.trim();
            (!song.is_empty() && !artist.is_empty()).then(|| (song.to_string(), artist.to_string()))
        })
        .collect()
}

fn mood_prompt(mood: &str) -> String {
    format!(
        "Create a list of music recommendations for someone feeling {mood}.\n\
         Provide 10-15 song suggestions in this format:\n\
         - \"Song Name\" by Artist Name\n\
         Focus on songs that match the {mood} mood. Include a mix of popular and lesser-known tracks."
    )
}

fn playlist_name(mood: &str, date: &str) -> String {
    format!("{} Vibes - {date}", title_case(mood))
}

pub struct SpotifyAgent {
    spotify: SpotifyClient,
    model: OllamaProvider,
}

impl SpotifyAgent {
    /// Build the agent and obtain a token up front, so any consent prompt
    /// happens before the console starts.
    pub async fn connect(config: &SpotifyConfig) -> Result<Self> {
        let auth = SpotifyAuth::new(config);
        auth.access_token().await?;
        info!("Spotify authentication successful");
        Ok(Self::from_parts(
            SpotifyClient::new(auth),
            OllamaProvider::new(&config.model.host, &config.model.model),
        ))
    }

    pub fn from_parts(spotify: SpotifyClient, model: OllamaProvider) -> Self {
        Self { spotify, model }
    }

    /// `None` when nothing is playing.
    pub async fn get_current_track(&self) -> Result<Option<CurrentTrack>> {
        let Some(playback) = self.spotify.current_playback().await? else {
            return Ok(None);
        };
        let Some(track) = playback.item else {
            return Ok(None);
        };
        Ok(Some(CurrentTrack {
            artist: track.artist().to_string(),
            album: track.album_name().to_string(),
            name: track.name,
            is_playing: playback.is_playing,
            progress_ms: playback.progress_ms.unwrap_or_default(),
            duration_ms: track.duration_ms,
            device: playback.device.map(|d| d.name).unwrap_or_else(|| "Unknown".into()),
        }))
    }

    pub async fn search_tracks(&self, query: &str, limit: u32) -> Result<Vec<Track>> {
        let tracks = self.spotify.search_tracks(query, limit).await?;
        self.log_action(
            "search_tracks",
            &format!("Found {} tracks for: {query}", tracks.len()),
        );
        Ok(tracks)
    }

    /// Recommendations for `seeds`; with no seeds, the user's recent top
    /// tracks are used.
    pub async fn get_recommendations(&self, seeds: Seeds, limit: u32) -> Result<Vec<Track>> {
        let seeds = if seeds.is_empty() {
            let top = self.spotify.top_tracks(5, "short_term").await?;
            Seeds {
                tracks: top.into_iter().filter_map(|t| t.id).collect(),
                ..Seeds::default()
            }
        } else {
            seeds
        };

        let tracks = self.spotify.recommendations(&seeds, limit).await?;
        self.log_action(
            "get_recommendations",
            &format!("Generated {} recommendations", tracks.len()),
        );
        Ok(tracks)
    }

    pub async fn create_playlist(
        &self,
        name: &str,
        description: &str,
        public: bool,
    ) -> Result<CreatedPlaylist> {
        let user = self.spotify.current_user().await?;
        let playlist = self
            .spotify
            .create_playlist(&user.id, name, description, public)
            .await?;
        self.log_action("create_playlist", &format!("Created playlist: {name}"));
        Ok(CreatedPlaylist {
            id: playlist.id,
            name: playlist.name,
            url: playlist.external_urls.spotify.unwrap_or_default(),
            description: playlist.description.unwrap_or_default(),
            tracks_added: 0,
        })
    }

    pub async fn add_tracks_to_playlist(&self, playlist_id: &str, track_ids: &[String]) -> Result<()> {
        self.spotify.add_tracks(playlist_id, track_ids).await?;
        self.log_action(
            "add_tracks_to_playlist",
            &format!("Added {} tracks to playlist", track_ids.len()),
        );
        Ok(())
    }

    /// Ask the model for songs matching `mood` and resolve each one to a
    /// catalog track.
    async fn ai_track_suggestions(&self, mood: &str) -> Result<Vec<String>> {
        let answer = self.ask_ai(&mood_prompt(mood)).await?;
        let mut track_ids = Vec::new();
        for (song, artist) in parse_song_suggestions(&answer) {
            let found = self.search_tracks(&format!("{song} {artist}"), 1).await?;
            if let Some(id) = found.into_iter().next().and_then(|t| t.id) {
                track_ids.push(id);
            }
        }
        Ok(track_ids)
    }

    async fn genre_recommendations(&self, mood: &str, limit: u32) -> Result<Vec<String>> {
        let recs = self
            .get_recommendations(Seeds::genres(genres_for_mood(mood)), limit)
            .await?;
        Ok(recs.into_iter().filter_map(|t| t.id).collect())
    }

    pub async fn create_mood_playlist(&self, mood: &str, limit: usize) -> Result<CreatedPlaylist> {
        self.log_action(
            "create_mood_playlist",
            &format!("Starting playlist creation for mood: {mood}"),
        );

        let mut track_ids = self.ai_track_suggestions(mood).await?;

        if track_ids.len() < MIN_AI_TRACKS {
            let needed = limit.saturating_sub(track_ids.len()).max(1);
            let needed = u32::try_from(needed).unwrap_or(u32::MAX);
            for id in self.genre_recommendations(mood, needed).await? {
                if !track_ids.contains(&id) {
                    track_ids.push(id);
                }
            }
        }

        if track_ids.is_empty() {
            warn!("Could not find any tracks for the mood playlist.");
            return Err(Error::Agent("No tracks found".into()));
        }

        let name = playlist_name(mood, &Local::now().format("%Y-%m-%d").to_string());
        let description = format!("AI-generated playlist for a {mood} mood.");
        let mut playlist = self.create_playlist(&name, &description, false).await?;

        track_ids.truncate(limit);
        self.add_tracks_to_playlist(&playlist.id, &track_ids).await?;
        playlist.tracks_added = track_ids.len();

        self.log_action(
            "create_mood_playlist",
            &format!(
                "Successfully created '{name}' with {} tracks.",
                playlist.tracks_added
            ),
        );
        Ok(playlist)
    }

    pub async fn get_my_playlists(&self) -> Result<Vec<PlaylistSummary>> {
        let playlists: Vec<PlaylistSummary> = self
            .spotify
            .my_playlists()
            .await?
            .into_iter()
            .map(|p| PlaylistSummary {
                id: p.id,
                name: p.name,
                tracks_count: p.tracks.map(|t| t.total).unwrap_or_default(),
                public: p.public.unwrap_or(false),
                description: p.description.unwrap_or_default(),
            })
            .collect();
        self.log_action(
            "get_my_playlists",
            &format!("Retrieved {} playlists", playlists.len()),
        );
        Ok(playlists)
    }

    pub async fn play_track(&self, track_id: &str) -> Result<()> {
        self.spotify.start_playback(&[track_id.to_string()]).await?;
        self.log_action("play_track", &format!("Started playing track: {track_id}"));
        Ok(())
    }

    pub async fn pause_playback(&self) -> Result<()> {
        self.spotify.pause_playback().await?;
        self.log_action("pause_playback", "Paused playback");
        Ok(())
    }

    pub async fn resume_playback(&self) -> Result<()> {
        self.spotify.start_playback(&[]).await?;
        self.log_action("resume_playback", "Resumed playback");
        Ok(())
    }
}

impl Agent for SpotifyAgent {
    fn name(&self) -> &'static str {
        "spotify"
    }

    fn model(&self) -> &OllamaProvider {
        &self.model
    }

    async fn check_service(&self) -> Result<()> {
        if self.spotify.auth().flow() == SpotifyAuthFlow::ClientCredentials {
            // App tokens cannot read /me; a catalog search proves the credentials.
            self.spotify.search_tracks("a", 1).await?;
            info!("Connected to Spotify with an app token (catalog only)");
            return Ok(());
        }
        let user = self.spotify.current_user().await?;
        info!(
            "Connected to Spotify account: {}",
            user.display_name.as_deref().unwrap_or(&user.id)
        );
        Ok(())
    }

    async fn status(&self) -> Value {
        let user = match self.spotify.current_user().await {
            Ok(user) => user,
            Err(e) => return json!({"status": "error", "error": e.to_string()}),
        };

        let mut status = json!({
            "user_id": user.id,
            "display_name": user.display_name,
            "followers": user.followers.map(|f| f.total).unwrap_or_default(),
            "country": user.country,
            "subscription": user.product.unwrap_or_else(|| "free".into()),
            "status": "connected",
        });

        match self.get_current_track().await {
            Ok(Some(track)) => {
                status["currently_playing"] = json!({
                    "track": track.name,
                    "artist": track.artist,
                    "is_playing": track.is_playing,
                    "device": track.device,
                });
            }
            Ok(None) => {}
            Err(e) => warn!("Could not read playback state: {e}"),
        }
        status
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpotifyCommand {
    Current,
    Search(String),
    Play(String),
    Pause,
    Resume,
    Playlists,
    Mood(String),
    Status,
}

impl Interactive for SpotifyAgent {
    type Command = SpotifyCommand;

    fn banner(&self) -> &'static str {
        "🎵 Spotify Agent - Interactive Mode"
    }

    fn usage(&self) -> &'static str {
        "'current', 'search <query>', 'play <track_id>', 'pause', 'resume', 'playlists', 'mood <mood>', 'status', 'quit'"
    }

    fn parse_command(line: &str) -> Option<SpotifyCommand> {
        match split_command(line) {
            ("current", None) => Some(SpotifyCommand::Current),
            ("search", Some(query)) => Some(SpotifyCommand::Search(query.to_string())),
            ("play", Some(id)) => Some(SpotifyCommand::Play(id.to_string())),
            ("pause", None) => Some(SpotifyCommand::Pause),
            ("resume", None) => Some(SpotifyCommand::Resume),
            ("playlists", None) => Some(SpotifyCommand::Playlists),
            ("mood", Some(mood)) => Some(SpotifyCommand::Mood(mood.to_string())),
            ("status", None) => Some(SpotifyCommand::Status),
            _ => None,
        }
    }

    fn progress(command: &SpotifyCommand) -> Option<&'static str> {
        match command {
            SpotifyCommand::Mood(_) => Some("🧠 Building a playlist for that mood..."),
            _ => None,
        }
    }

    async fn execute(&mut self, command: SpotifyCommand) -> Result<String> {
        match command {
            SpotifyCommand::Current => Ok(match self.get_current_track().await? {
                Some(track) => format!(
                    "▶️ Now Playing: {} by {} ({} / {})",
                    track.name,
                    track.artist,
                    format_duration(track.progress_ms),
                    format_duration(track.duration_ms)
                ),
                None => "⏹️ Nothing is currently playing.".into(),
            }),
            SpotifyCommand::Search(query) => {
                let tracks = self.search_tracks(&query, SEARCH_LIMIT).await?;
                if tracks.is_empty() {
                    return Ok("No tracks found.".into());
                }
                let lines = tracks.iter().map(|t| {
                    format!(
                        "{} by {} (ID: {})",
                        t.name,
                        t.artist(),
                        t.id.as_deref().unwrap_or("n/a")
                    )
                });
                Ok(format!("🔍 Search results for '{query}':\n{}", numbered(lines)))
            }
            SpotifyCommand::Play(id) => {
                self.play_track(&id).await?;
                Ok(format!("Playing track: {id}"))
            }
            SpotifyCommand::Pause => {
                self.pause_playback().await?;
                Ok("Playback paused.".into())
            }
            SpotifyCommand::Resume => {
                self.resume_playback().await?;
                Ok("Playback resumed.".into())
            }
            SpotifyCommand::Playlists => {
                let playlists = self.get_my_playlists().await?;
                if playlists.is_empty() {
                    return Ok("No playlists found.".into());
                }
                let lines = playlists.iter().map(|p| {
                    format!(
                        "{} ({} tracks, {}) (ID: {})",
                        p.name,
                        p.tracks_count,
                        if p.public { "public" } else { "private" },
                        p.id
                    )
                });
                Ok(format!("🎶 Your playlists:\n{}", numbered(lines)))
            }
            SpotifyCommand::Mood(mood) => {
                let playlist = self.create_mood_playlist(&mood, MOOD_PLAYLIST_LIMIT).await?;
                Ok(format!(
                    "✅ Created '{}' with {} tracks\n{}",
                    playlist.name, playlist.tracks_added, playlist.url
                ))
            }
            SpotifyCommand::Status => Ok(status_report(&*self).await),
        }
    }
}
