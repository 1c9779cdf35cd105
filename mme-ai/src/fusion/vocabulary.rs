//! Controlled vocabulary for LLM synthesis
//!
//! One process-wide, read-only [`Vocabulary`] handle. It is initialized at
//! most once (from an optional TOML override file, falling back to the
//! built-in lists) and never mutated afterwards, so concurrent runs read it
//! without synchronization.

use mme_common::{Error, Result};
use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

const BUILTIN_GENRES: &[&str] = &[
    "Classical", "Jazz", "Blues", "Rock", "Metal", "Pop", "Hip-Hop", "R&B", "Soul", "Funk",
    "Electronic", "House", "Techno", "Trance", "Drum and Bass", "Dubstep", "Ambient", "Country",
    "Folk", "Reggae", "Latin", "World Music", "Soundtrack", "Gospel", "Experimental",
];

const BUILTIN_MOODS: &[&str] = &[
    "Joyful", "Euphoric", "Melancholic", "Sad", "Reflective", "Nostalgic", "Hopeful", "Inspiring",
    "Powerful", "Angry", "Aggressive", "Triumphant", "Mysterious", "Ethereal", "Dreamy", "Serene",
    "Peaceful", "Passionate", "Romantic", "Dramatic", "Epic", "Heroic", "Somber", "Haunting",
    "Dark", "Intense", "Energetic", "Upbeat", "Relaxed", "Chill",
];

const BUILTIN_INSTRUMENTS: &[&str] = &[
    "Vocals", "Acoustic Guitar", "Electric Guitar", "Bass Guitar", "Piano", "Synthesizer",
    "Drums", "Percussion", "Strings", "Brass", "Woodwinds", "Organ", "Harmonica", "Saxophone",
    "Trumpet", "Violin", "Cello", "Harp",
];

static VOCABULARY: OnceCell<Vocabulary> = OnceCell::new();

/// Closed label sets the model must choose from
#[derive(Debug, Clone, PartialEq)]
pub struct Vocabulary {
    genres: Vec<String>,
    moods: Vec<String>,
    instruments: Vec<String>,
}

/// Override file layout
#[derive(Debug, Default, Deserialize)]
struct VocabularyFile {
    #[serde(default)]
    genres: Vec<String>,
    #[serde(default)]
    moods: Vec<String>,
    #[serde(default)]
    instruments: Vec<String>,
}

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Trimmed, non-empty, first-seen-unique entries
fn cleaned(list: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(list.len());
    for item in list {
        let item = item.trim().to_string();
        if !item.is_empty() && !out.iter().any(|seen| seen.eq_ignore_ascii_case(&item)) {
            out.push(item);
        }
    }
    out
}

impl Vocabulary {
    pub fn builtin() -> Self {
        Self {
            genres: owned(BUILTIN_GENRES),
            moods: owned(BUILTIN_MOODS),
            instruments: owned(BUILTIN_INSTRUMENTS),
        }
    }

    /// Load an override file
    ///
    /// Lists missing or empty in the file keep their built-in values.
    ///
    /// # Errors
    /// * `Error::Io` if the file cannot be read
    /// * `Error::Config` if it is not valid TOML
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let file: VocabularyFile = toml::from_str(&contents)?;
        let builtin = Self::builtin();

        let pick = |custom: Vec<String>, fallback: Vec<String>, name: &str| {
            let custom = cleaned(custom);
            if custom.is_empty() {
                warn!(list = name, "Vocabulary list empty in override file, using built-in");
                fallback
            } else {
                custom
            }
        };

        Ok(Self {
            genres: pick(file.genres, builtin.genres, "genres"),
            moods: pick(file.moods, builtin.moods, "moods"),
            instruments: pick(file.instruments, builtin.instruments, "instruments"),
        })
    }

    pub fn genres(&self) -> &[String] {
        &self.genres
    }

    pub fn moods(&self) -> &[String] {
        &self.moods
    }

    pub fn instruments(&self) -> &[String] {
        &self.instruments
    }

    /// Vocabulary spelling of `genre`, matched case-insensitively
    pub fn canonical_genre(&self, genre: &str) -> Option<&str> {
        let genre = genre.trim();
        self.genres
            .iter()
            .find(|g| g.eq_ignore_ascii_case(genre))
            .map(String::as_str)
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Initialize the process-wide vocabulary
///
/// Only the first call has an effect. A missing or invalid override file
/// falls back to the built-in lists.
pub fn init_vocabulary(override_file: Option<&Path>) -> &'static Vocabulary {
    VOCABULARY.get_or_init(|| match override_file {
        Some(path) => match Vocabulary::from_file(path) {
            Ok(vocab) => {
                info!(
                    path = %path.display(),
                    genres = vocab.genres.len(),
                    moods = vocab.moods.len(),
                    instruments = vocab.instruments.len(),
                    "Vocabulary loaded from override file"
                );
                vocab
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Vocabulary override failed, using built-in");
                Vocabulary::builtin()
            }
        },
        None => Vocabulary::builtin(),
    })
}

/// The process-wide vocabulary (built-in if never initialized)
pub fn vocabulary() -> &'static Vocabulary {
    init_vocabulary(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_sizes() {
        let v = Vocabulary::builtin();
        assert_eq!(v.genres().len(), 25);
        assert_eq!(v.moods().len(), 30);
        assert_eq!(v.instruments().len(), 18);
    }

    #[test]
    fn test_canonical_genre() {
        let v = Vocabulary::builtin();
        assert_eq!(v.canonical_genre("hip-hop"), Some("Hip-Hop"));
        assert_eq!(v.canonical_genre(" drum and bass "), Some("Drum and Bass"));
        assert_eq!(v.canonical_genre("Polka"), None);
    }

    #[test]
    fn test_override_file_with_partial_lists() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "genres = [\"Polka\", \"polka\", \"  \", \"Yodel\"]").unwrap();
        let v = Vocabulary::from_file(file.path()).unwrap();
        assert_eq!(v.genres(), &["Polka".to_string(), "Yodel".to_string()]);
        assert_eq!(v.moods().len(), 30);
    }

    #[test]
    fn test_invalid_override_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "genres = not toml").unwrap();
        assert!(Vocabulary::from_file(file.path()).is_err());
    }

    #[test]
    fn test_global_handle_is_stable() {
        let a = vocabulary() as *const Vocabulary;
        let b = vocabulary() as *const Vocabulary;
        assert_eq!(a, b);
    }
}
