//! Persistent movie index, one JSON file per storage root.
//!
//! Reading is tolerant: a missing, empty or corrupt file yields an empty
//! database, and entries whose movie files disappeared are dropped on
//! load. Writing replaces the whole file.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::scene::Movie;

pub struct Database {
    path: PathBuf,
    movies: BTreeMap<PathBuf, Movie>,
}

impl Database {
    pub async fn open(storage_root: &Path, database_name: &str) -> Self {
        let path = storage_root.join(database_name);
        let movies = match tokio::fs::read_to_string(&path).await {
            Ok(body) if !body.trim().is_empty() => {
                match serde_json::from_str::<BTreeMap<PathBuf, Movie>>(&body) {
                    Ok(movies) => movies,
                    Err(err) => {
                        warn!(
                            "Could not parse database {}: {}, starting fresh",
                            path.display(),
                            err
                        );
                        BTreeMap::new()
                    }
                }
            }
            Ok(_) => BTreeMap::new(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("No database at {} yet", path.display());
                BTreeMap::new()
            }
            Err(err) => {
                warn!("Could not read database {}: {}", path.display(), err);
                BTreeMap::new()
            }
        };

        let mut database = Self { path, movies };
        database.prune_missing();
        database
    }

    fn prune_missing(&mut self) {
        let before = self.movies.len();
        self.movies.retain(|path, _| path.exists());
        let dropped = before - self.movies.len();
        if dropped > 0 {
            info!("Dropped {} database entries whose files disappeared", dropped);
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.movies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.movies.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.movies.contains_key(path)
    }

    /// Insert a freshly scanned movie; returns false when the path is
    /// already indexed so resolved details survive rescans.
    pub fn add_movie(&mut self, movie: Movie) -> bool {
        let key = movie.file_properties.file_path.clone();
        if self.movies.contains_key(&key) {
            return false;
        }
        self.movies.insert(key, movie);
        true
    }

    /// Insert under an explicit key. The sorted-tree index keys movies
    /// by their sorted location while the movie itself keeps pointing at
    /// the original file.
    pub fn insert(&mut self, key: PathBuf, movie: Movie) {
        self.movies.insert(key, movie);
    }

    pub fn remove(&mut self, path: &Path) -> Option<Movie> {
        self.movies.remove(path)
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.movies.keys().cloned().collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&PathBuf, &Movie)> {
        self.movies.iter()
    }

    pub fn movies(&self) -> impl Iterator<Item = &Movie> {
        self.movies.values()
    }

    pub fn movies_mut(&mut self) -> impl Iterator<Item = &mut Movie> {
        self.movies.values_mut()
    }

    pub async fn write(&self) -> Result<()> {
        let body =
            serde_json::to_string_pretty(&self.movies).context("serializing the movie database")?;
        tokio::fs::write(&self.path, body)
            .await
            .with_context(|| format!("writing database {}", self.path.display()))?;
        debug!("Wrote {} movies to {}", self.movies.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{FileProperties, Movie, ScenePatch};
    use tempfile::TempDir;

    const DB_NAME: &str = ".test_db.json";

    async fn movie_in(root: &Path, name: &str) -> Movie {
        let file_path = root.join(name);
        tokio::fs::write(&file_path, b"stub").await.unwrap();
        Movie::new(FileProperties::new(file_path, root), "Fixture")
    }

    #[tokio::test]
    async fn test_round_trip_preserves_resolved_details() {
        let root = TempDir::new().unwrap();
        let mut movie = movie_in(root.path(), "scene (7675).mp4").await;
        movie.update_details(ScenePatch {
            title: Some("Whatever It Takes".to_string()),
            site: Some("Device Bondage".to_string()),
            ..ScenePatch::default()
        });

        let mut database = Database::open(root.path(), DB_NAME).await;
        assert!(database.add_movie(movie));
        database.write().await.unwrap();

        let reloaded = Database::open(root.path(), DB_NAME).await;
        assert_eq!(reloaded.len(), 1);
        let stored = reloaded.movies().next().unwrap();
        assert_eq!(stored.scene_properties.title, "Whatever It Takes");
        assert_eq!(stored.scene_properties.site, "Device Bondage");
    }

    #[tokio::test]
    async fn test_duplicate_paths_are_not_reinserted() {
        let root = TempDir::new().unwrap();
        let movie = movie_in(root.path(), "a.mp4").await;
        let again = movie.clone();

        let mut database = Database::open(root.path(), DB_NAME).await;
        assert!(database.add_movie(movie));
        assert!(!database.add_movie(again));
        assert_eq!(database.len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_database_starts_fresh() {
        let root = TempDir::new().unwrap();
        tokio::fs::write(root.path().join(DB_NAME), b"{ not json")
            .await
            .unwrap();

        let database = Database::open(root.path(), DB_NAME).await;
        assert!(database.is_empty());
    }

    #[tokio::test]
    async fn test_entries_for_vanished_files_are_pruned() {
        let root = TempDir::new().unwrap();
        let kept = movie_in(root.path(), "kept.mp4").await;
        let gone = movie_in(root.path(), "gone.mp4").await;
        let gone_path = gone.file_properties.file_path.clone();

        let mut database = Database::open(root.path(), DB_NAME).await;
        database.add_movie(kept);
        database.add_movie(gone);
        database.write().await.unwrap();

        tokio::fs::remove_file(&gone_path).await.unwrap();

        let reloaded = Database::open(root.path(), DB_NAME).await;
        assert_eq!(reloaded.len(), 1);
        assert!(!reloaded.contains(&gone_path));
    }
}
