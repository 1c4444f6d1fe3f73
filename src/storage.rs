//! Saved transcript storage
//!
//! Transcripts are plain text files named `transcription_<name>.txt`
//! under the application data directory. Names are user-supplied, so
//! they are validated and never overwrite an existing file.

use chrono::{DateTime, Local};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

const FILE_PREFIX: &str = "transcription_";
const FILE_EXTENSION: &str = "txt";

/// Errors from transcript storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Transcript name cannot be empty")]
    EmptyName,

    #[error("Transcript name contains invalid characters")]
    InvalidName,

    #[error("Cannot save an empty transcript")]
    EmptyTranscript,

    #[error("A transcript named '{0}' already exists")]
    NameTaken(String),

    #[error("No transcript named '{0}' found")]
    NotFound(String),

    #[error("Failed to create directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A transcript loaded from disk
#[derive(Debug, Clone)]
pub struct SavedTranscription {
    pub name: String,
    pub text: String,
    pub saved_at: Option<DateTime<Local>>,
}

/// File-backed store for named transcripts
pub struct TranscriptStore {
    root: PathBuf,
}

impl TranscriptStore {
    pub fn open(root: PathBuf) -> Self {
        Self { root }
    }

    /// Default store location under the platform data directory
    pub fn default_location() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("Translive").join("transcriptions"))
    }

    /// Save a transcript under `name`; refuses to replace an existing one
    pub fn save(&self, name: &str, text: &str) -> Result<PathBuf, StorageError> {
        let name = validate_name(name)?;
        if text.trim().is_empty() {
            return Err(StorageError::EmptyTranscript);
        }

        fs::create_dir_all(&self.root).map_err(|source| StorageError::CreateDirectory {
            path: self.root.clone(),
            source,
        })?;

        let path = self.path_for(name);
        // create_new makes the duplicate-name check atomic with creation
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StorageError::NameTaken(name.to_owned()));
            }
            Err(source) => {
                return Err(StorageError::WriteFile {
                    path: path.clone(),
                    source,
                });
            }
        };

        file.write_all(text.as_bytes())
            .map_err(|source| StorageError::WriteFile {
                path: path.clone(),
                source,
            })?;

        info!("Transcript saved to {}", path.display());
        Ok(path)
    }

    /// Whether a transcript with this name exists
    pub fn exists(&self, name: &str) -> Result<bool, StorageError> {
        let name = validate_name(name)?;
        Ok(self.path_for(name).exists())
    }

    /// Load a saved transcript by name
    pub fn load(&self, name: &str) -> Result<SavedTranscription, StorageError> {
        let name = validate_name(name)?;
        let path = self.path_for(name);
        if !path.exists() {
            return Err(StorageError::NotFound(name.to_owned()));
        }

        let text = fs::read_to_string(&path).map_err(|source| StorageError::ReadFile {
            path: path.clone(),
            source,
        })?;
        let saved_at = fs::metadata(&path)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Local>::from);

        Ok(SavedTranscription {
            name: name.to_owned(),
            text,
            saved_at,
        })
    }

    /// Names of all saved transcripts, sorted
    pub fn list(&self) -> Result<Vec<String>, StorageError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.root).map_err(|source| StorageError::ReadFile {
            path: self.root.clone(),
            source,
        })?;

        let mut names: Vec<String> = entries
            .flatten()
            .filter_map(|entry| transcript_name(&entry.path()))
            .collect();
        names.sort();
        Ok(names)
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root
            .join(format!("{}{}.{}", FILE_PREFIX, name, FILE_EXTENSION))
    }
}

/// Trim and validate a user-supplied transcript name
fn validate_name(name: &str) -> Result<&str, StorageError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StorageError::EmptyName);
    }
    if name.contains(['/', '\\', '\0']) || name == "." || name == ".." {
        return Err(StorageError::InvalidName);
    }
    Ok(name)
}

/// Extract the transcript name from a store file path
fn transcript_name(path: &Path) -> Option<String> {
    if path.extension().and_then(|e| e.to_str()) != Some(FILE_EXTENSION) {
        return None;
    }
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|stem| stem.strip_prefix(FILE_PREFIX))
        .filter(|name| !name.is_empty())
        .map(|name| name.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let store = TranscriptStore::open(dir.path().to_path_buf());

        let path = store.save("meeting", "Hello world").unwrap();
        assert!(path.ends_with("transcription_meeting.txt"));

        let loaded = store.load("meeting").unwrap();
        assert_eq!(loaded.name, "meeting");
        assert_eq!(loaded.text, "Hello world");
        assert!(loaded.saved_at.is_some());
    }

    #[test]
    fn test_duplicate_name_rejected_without_mutation() {
        let dir = tempdir().unwrap();
        let store = TranscriptStore::open(dir.path().to_path_buf());

        store.save("standup", "original").unwrap();
        let result = store.save("standup", "replacement");
        assert!(matches!(result, Err(StorageError::NameTaken(_))));
        assert_eq!(store.load("standup").unwrap().text, "original");
    }

    #[test]
    fn test_list_returns_saved_names_sorted() {
        let dir = tempdir().unwrap();
        let store = TranscriptStore::open(dir.path().to_path_buf());

        store.save("beta", "b").unwrap();
        store.save("alpha", "a").unwrap();
        assert_eq!(store.list().unwrap(), vec!["alpha", "beta"]);
    }

    #[test]
    fn test_list_on_missing_directory_is_empty() {
        let dir = tempdir().unwrap();
        let store = TranscriptStore::open(dir.path().join("nothing_here"));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_names_rejected() {
        let dir = tempdir().unwrap();
        let store = TranscriptStore::open(dir.path().to_path_buf());

        assert!(matches!(store.save("", "x"), Err(StorageError::EmptyName)));
        assert!(matches!(
            store.save("  ", "x"),
            Err(StorageError::EmptyName)
        ));
        assert!(matches!(
            store.save("a/b", "x"),
            Err(StorageError::InvalidName)
        ));
        assert!(matches!(
            store.save("..", "x"),
            Err(StorageError::InvalidName)
        ));
    }

    #[test]
    fn test_empty_transcript_rejected() {
        let dir = tempdir().unwrap();
        let store = TranscriptStore::open(dir.path().to_path_buf());
        assert!(matches!(
            store.save("quiet", "   "),
            Err(StorageError::EmptyTranscript)
        ));
    }

    #[test]
    fn test_trimmed_name_used_for_storage() {
        let dir = tempdir().unwrap();
        let store = TranscriptStore::open(dir.path().to_path_buf());

        store.save("  padded  ", "text").unwrap();
        assert!(store.exists("padded").unwrap());
        assert_eq!(store.load("padded").unwrap().text, "text");
    }
}
