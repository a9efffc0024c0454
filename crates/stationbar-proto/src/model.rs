use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// Station id used before the listener has picked anything.
pub const NO_STATION_SELECTED: &str = "__stationbar_no_station";

/// Listener rating attached to a track.  The service encodes these as
/// `0`, `1` and `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum Rating {
    #[default]
    Neutral,
    Liked,
    Banned,
}

impl From<i64> for Rating {
    fn from(v: i64) -> Self {
        match v {
            v if v > 0 => Rating::Liked,
            v if v < 0 => Rating::Banned,
            _ => Rating::Neutral,
        }
    }
}

impl From<Rating> for i64 {
    fn from(r: Rating) -> Self {
        match r {
            Rating::Neutral => 0,
            Rating::Liked => 1,
            Rating::Banned => -1,
        }
    }
}

/// Audio encodings the service is able to hand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AudioFormat {
    #[default]
    #[serde(rename = "aacplus")]
    AacPlus,
    #[serde(rename = "mp3")]
    Mp3,
    #[serde(rename = "mp3-hifi")]
    PremiumMp3,
}

impl AudioFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::AacPlus => "aacplus",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::PremiumMp3 => "mp3-hifi",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AudioFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "aacplus" => Ok(AudioFormat::AacPlus),
            "mp3" => Ok(AudioFormat::Mp3),
            "mp3-hifi" => Ok(AudioFormat::PremiumMp3),
            other => anyhow::bail!("unknown audio format '{}' (expected aacplus, mp3 or mp3-hifi)", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StationArt {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Station {
    #[serde(rename = "stationId")]
    pub id: String,
    pub name: String,
    #[serde(default, rename = "creatorWebname", deserialize_with = "null_as_default")]
    pub creator: String,
    #[serde(default)]
    pub art: Vec<StationArt>,
    #[serde(default, rename = "dateCreated")]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default, rename = "lastPlayed")]
    pub last_played: Option<chrono::DateTime<chrono::Utc>>,
}

impl Station {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            creator: String::new(),
            art: Vec::new(),
            created_at: None,
            last_played: None,
        }
    }

    /// The "no station selected" sentinel.
    pub fn none() -> Self {
        Self::new(NO_STATION_SELECTED, "No Station Selected")
    }

    pub fn is_selected(&self) -> bool {
        self.id != NO_STATION_SELECTED
    }
}

impl Default for Station {
    fn default() -> Self {
        Self::none()
    }
}

/// Stations are identified by id alone; renames on the service side do not
/// make them a different station.
impl PartialEq for Station {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Station {}

impl fmt::Display for Station {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Track {
    #[serde(rename = "musicId")]
    pub music_id: String,
    #[serde(default, rename = "pandoraId", deserialize_with = "null_as_default")]
    pub pandora_id: String,
    #[serde(rename = "stationId")]
    pub station_id: String,
    #[serde(rename = "trackToken")]
    pub track_token: String,

    #[serde(rename = "audioURL")]
    pub audio_url: String,
    /// Replay gain in dB.  The service sends it as a string.
    #[serde(
        default,
        rename = "fileGain",
        deserialize_with = "gain_from_wire",
        serialize_with = "gain_to_wire"
    )]
    pub gain_db: f64,
    /// Encoding as sent by the service; see [`Track::audio_format`].
    #[serde(default, rename = "audioEncoding", deserialize_with = "null_as_default")]
    pub encoding: String,
    #[serde(default, rename = "trackLength", deserialize_with = "null_as_default")]
    pub length_secs: u64,

    #[serde(default, rename = "songTitle", deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, rename = "artistName", deserialize_with = "null_as_default")]
    pub artist: String,
    #[serde(default, rename = "albumTitle", deserialize_with = "null_as_default")]
    pub album: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub rating: Rating,
}

impl Track {
    pub fn length(&self) -> Duration {
        Duration::from_secs(self.length_secs)
    }

    /// `None` when the service sent an encoding we have no name for.
    pub fn audio_format(&self) -> Option<AudioFormat> {
        self.encoding.parse().ok()
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} - {} - {}",
            self.music_id, self.title, self.artist, self.album
        )
    }
}

/// Fields the service sometimes sends as `null`.
fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

fn gain_from_wire<'de, D>(d: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Gain {
        Num(f64),
        Str(String),
    }

    match Option::<Gain>::deserialize(d)? {
        None => Ok(0.0),
        Some(Gain::Num(v)) => Ok(v),
        Some(Gain::Str(s)) if s.trim().is_empty() => Ok(0.0),
        Some(Gain::Str(s)) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn gain_to_wire<S>(gain: &f64, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    s.serialize_str(&format!("{:.2}", gain))
}

/// "Why this track" explanation returned by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Narrative {
    #[serde(default)]
    pub intro: String,
    #[serde(default, rename = "focusTraits")]
    pub focus_traits: Vec<String>,
    #[serde(default)]
    pub paragraph: String,
}

/// Position within the stream currently loaded in the player.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlaybackProgress {
    pub elapsed: Duration,
    pub total: Duration,
}

impl PlaybackProgress {
    pub fn new(elapsed: Duration, total: Duration) -> Self {
        Self { elapsed, total }
    }

    /// Fraction played, clamped to `0.0..=1.0`.  Zero while the total is unknown.
    pub fn ratio(&self) -> f64 {
        if self.total.is_zero() {
            return 0.0;
        }
        (self.elapsed.as_secs_f64() / self.total.as_secs_f64()).clamp(0.0, 1.0)
    }
}

impl fmt::Display for PlaybackProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", fmt_duration(self.elapsed), fmt_duration(self.total))
    }
}

/// `m:ss`, rounded to the nearest second.
pub fn fmt_duration(d: Duration) -> String {
    let secs = (d.as_millis() + 500) / 1000;
    format!("{}:{:02}", secs / 60, secs % 60)
}
