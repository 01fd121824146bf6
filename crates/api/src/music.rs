//! Mood-based music player state machine

use chrono::{DateTime, Utc};
use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

pub const MOODS: [&str; 5] = ["happy", "sad", "calm", "energetic", "focus"];

const PLAYLIST_LEN: usize = 3;
const DEFAULT_VOLUME: f64 = 70.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artist: String,
    /// Seconds
    pub duration: u32,
}

fn track(id: &str, title: &str, artist: &str, duration: u32) -> Track {
    Track {
        id: id.to_string(),
        title: title.to_string(),
        artist: artist.to_string(),
        duration,
    }
}

/// Tracks for a mood
pub fn library(mood: &str) -> Result<Vec<Track>, ApiError> {
    let tracks = match mood {
        "happy" => vec![
            track("h1", "Walking on Sunshine", "Katrina & The Waves", 238),
            track("h2", "Happy", "Pharrell Williams", 232),
            track("h3", "Good Vibrations", "The Beach Boys", 218),
            track("h4", "Dancing Queen", "ABBA", 230),
            track("h5", "Uptown Funk", "Mark Ronson ft. Bruno Mars", 270),
        ],
        "sad" => vec![
            track("s1", "Someone Like You", "Adele", 285),
            track("s2", "Fix You", "Coldplay", 295),
            track("s3", "Tears in Heaven", "Eric Clapton", 274),
            track("s4", "Hurt", "Johnny Cash", 216),
            track("s5", "Nothing Compares 2 U", "Sinéad O'Connor", 310),
        ],
        "calm" => vec![
            track("c1", "Weightless", "Marconi Union", 480),
            track("c2", "Claire de Lune", "Claude Debussy", 320),
            track("c3", "Watermark", "Enya", 229),
            track("c4", "River Flows In You", "Yiruma", 185),
            track("c5", "Gymnopedie No.1", "Erik Satie", 212),
        ],
        "energetic" => vec![
            track("e1", "Eye of the Tiger", "Survivor", 244),
            track("e2", "Thunderstruck", "AC/DC", 292),
            track("e3", "Till I Collapse", "Eminem", 297),
            track("e4", "Don't Stop Me Now", "Queen", 214),
            track("e5", "Stronger", "Kanye West", 312),
        ],
        "focus" => vec![
            track("f1", "Brain Waves", "Alpha Waves", 540),
            track("f2", "Study Session", "Focus Music", 620),
            track("f3", "Deep Concentration", "Mind Melody", 480),
            track("f4", "Clarity", "Ambient Focus", 375),
            track("f5", "Theta Rhythm", "Brain Boost", 420),
        ],
        other => {
            return Err(ApiError::BadRequest(format!(
                "Invalid mood: {other}. Available moods: {}",
                MOODS.join(", ")
            )))
        }
    };
    Ok(tracks)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MusicState {
    pub is_playing: bool,
    pub current_track: Option<Track>,
    pub current_mood: Option<String>,
    pub playlist: Vec<Track>,
    pub volume: f64,
    pub start_time: Option<DateTime<Utc>>,
    /// Seconds into the current track
    pub position: f64,
}

impl Default for MusicState {
    fn default() -> Self {
        Self::stopped(DEFAULT_VOLUME)
    }
}

impl MusicState {
    fn stopped(volume: f64) -> Self {
        Self {
            is_playing: false,
            current_track: None,
            current_mood: None,
            playlist: Vec::new(),
            volume,
            start_time: None,
            position: 0.0,
        }
    }
}

/// `POST /music` body
#[derive(Debug, Default, Deserialize)]
pub struct MusicCommand {
    pub action: Option<String>,
    pub mood: Option<String>,
    pub volume: Option<f64>,
}

#[derive(Debug, Default)]
pub struct MusicPlayer {
    state: MusicState,
}

impl MusicPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state with the playback position advanced to `now`
    pub fn state<R: Rng + ?Sized>(&mut self, rng: &mut R, now: DateTime<Utc>) -> MusicState {
        if self.state.is_playing {
            if let (Some(started), Some(track)) = (self.state.start_time, &self.state.current_track) {
                let duration = f64::from(track.duration);
                self.state.position = elapsed_secs(started, now).min(duration);

                if self.state.position >= duration {
                    if self.state.playlist.is_empty() {
                        self.state.is_playing = false;
                        self.state.position = 0.0;
                    } else {
                        self.advance(rng, now);
                    }
                }
            }
        }
        self.state.clone()
    }

    /// Apply a control command, returning the confirmation message
    pub fn apply<R: Rng + ?Sized>(
        &mut self,
        command: MusicCommand,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> Result<(String, MusicState), ApiError> {
        let action = command
            .action
            .filter(|a| !a.is_empty())
            .ok_or_else(|| ApiError::BadRequest("Action is required".to_string()))?;

        let message = match action.as_str() {
            "play" => match command.mood.filter(|m| !m.is_empty()) {
                Some(mood) => {
                    let tracks = library(&mood)?;
                    let volume = match command.volume {
                        Some(volume) => checked_volume(volume)?,
                        None => self.state.volume,
                    };
                    let mut playlist: Vec<Track> =
                        index::sample(rng, tracks.len(), PLAYLIST_LEN.min(tracks.len()))
                            .into_iter()
                            .map(|i| tracks[i].clone())
                            .collect();
                    let current = (!playlist.is_empty()).then(|| playlist.remove(0));

                    self.state = MusicState {
                        is_playing: true,
                        current_track: current,
                        current_mood: Some(mood.clone()),
                        playlist,
                        volume,
                        start_time: Some(now),
                        position: 0.0,
                    };
                    format!("Playing music for mood: {mood}")
                }
                None if self.state.current_track.is_some() => {
                    self.state.is_playing = true;
                    self.state.start_time = Some(now);
                    "Resumed playback".to_string()
                }
                None => {
                    return Err(ApiError::BadRequest(
                        "No track selected. Specify a mood.".to_string(),
                    ))
                }
            },
            "pause" => {
                if self.state.is_playing {
                    let duration = self
                        .state
                        .current_track
                        .as_ref()
                        .map_or(0.0, |t| f64::from(t.duration));
                    let elapsed = self
                        .state
                        .start_time
                        .map_or(0.0, |started| elapsed_secs(started, now));
                    self.state.position = elapsed.min(duration);
                    self.state.is_playing = false;
                    "Playback paused".to_string()
                } else {
                    "Already paused".to_string()
                }
            }
            "stop" => {
                self.state = MusicState::stopped(self.state.volume);
                "Playback stopped".to_string()
            }
            "next" => {
                if self.state.playlist.is_empty() {
                    return Err(ApiError::BadRequest(
                        "No more tracks in playlist".to_string(),
                    ));
                }
                self.advance(rng, now);
                "Skipped to next track".to_string()
            }
            "volume" => {
                let volume = checked_volume(command.volume.ok_or_else(volume_error)?)?;
                self.state.volume = volume;
                format!("Volume set to {volume}%")
            }
            other => return Err(ApiError::BadRequest(format!("Unknown action: {other}"))),
        };

        Ok((message, self.state.clone()))
    }

    /// Move to the head of the playlist and top it up from the mood library
    fn advance<R: Rng + ?Sized>(&mut self, rng: &mut R, now: DateTime<Utc>) {
        if self.state.playlist.is_empty() {
            return;
        }
        self.state.current_track = Some(self.state.playlist.remove(0));
        self.state.start_time = Some(now);
        self.state.position = 0.0;

        if let Some(tracks) = self.state.current_mood.as_deref().and_then(|m| library(m).ok()) {
            let pick = tracks[rng.gen_range(0..tracks.len())].clone();
            self.state.playlist.push(pick);
        }
    }
}

fn volume_error() -> ApiError {
    ApiError::BadRequest("Volume must be a number between 0 and 100".to_string())
}

fn checked_volume(volume: f64) -> Result<f64, ApiError> {
    if (0.0..=100.0).contains(&volume) {
        Ok(volume)
    } else {
        Err(volume_error())
    }
}

fn elapsed_secs(started: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - started).num_milliseconds().max(0) as f64 / 1000.0
}
