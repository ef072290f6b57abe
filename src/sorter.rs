//! Storage scanning, the resolution loop, and the sorted-tree writer.
//!
//! A run has three phases: scan the storage root for video files and
//! index them, resolve every claimed movie against the catalog, then
//! build `<root>_sorted` with one directory per site. Simulation mode
//! symlinks instead of moving, so a run is inspectable and free to undo.

use anyhow::{anyhow, Context, Result};
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::catalog::CatalogBackend;
use crate::config::Config;
use crate::database::Database;
use crate::resolver::SceneResolver;
use crate::scene::{FileProperties, Movie};

/// Flush the database after this many resolved movies.
const WRITE_EVERY: usize = 10;
const UNSORTED_DIR: &str = "unsorted";

pub struct ShootSorter {
    config: Config,
    backend: Arc<dyn CatalogBackend>,
    resolver: SceneResolver,
    shutdown: Arc<AtomicBool>,
}

impl ShootSorter {
    pub fn new(
        config: Config,
        backend: Arc<dyn CatalogBackend>,
        resolver: SceneResolver,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config,
            backend,
            resolver,
            shutdown,
        }
    }

    /// The sorted tree lives next to the storage root.
    pub fn sorted_root(storage_root: &Path) -> PathBuf {
        let name = storage_root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "storage".to_string());
        storage_root.with_file_name(format!("{}_sorted", name))
    }

    /// Scan, resolve, sort. Returns the simulation diff list: the
    /// source files a real run would move, empty outside simulation.
    pub async fn run(&self, storage_root: &Path) -> Result<Vec<PathBuf>> {
        if !storage_root.is_dir() {
            return Err(anyhow!(
                "storage root {} is not a directory",
                storage_root.display()
            ));
        }

        let mut database =
            Database::open(storage_root, &self.config.storage.database_name).await;
        self.scan(storage_root, &mut database).await?;
        self.resolve_all(&mut database).await?;
        if self.shutdown.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        self.sort(storage_root, &database).await
    }

    /// Walk the storage and index every video file not yet known.
    /// First-level directories whose names resemble the catalog or one
    /// of its sites claim their movies for resolution; the rest pass
    /// through unresolved.
    async fn scan(&self, storage_root: &Path, database: &mut Database) -> Result<()> {
        let catalog_names = self.catalog_names().await;
        let matcher = SkimMatcherV2::default();
        let mut added = 0usize;

        for entry in WalkDir::new(storage_root)
            .max_depth(self.config.storage.recursion_depth)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path
                .file_name()
                .map_or(false, |n| n == self.config.storage.database_name.as_str())
            {
                continue;
            }
            if database.contains(path) {
                continue;
            }
            if !self.is_video(path).await {
                continue;
            }

            let file = FileProperties::new(path.to_path_buf(), storage_root);
            let api = if self.claimed(&matcher, &catalog_names, &file) {
                self.backend.name().to_string()
            } else {
                debug!(
                    "No catalog claims {}, it will pass through unsorted",
                    file.relative_path.display()
                );
                String::new()
            };

            if database.add_movie(Movie::new(file, api)) {
                added += 1;
            }
        }

        info!("Scan found {} new movies ({} total)", added, database.len());
        Ok(())
    }

    async fn catalog_names(&self) -> Vec<String> {
        let mut names = vec![self.backend.name().to_string()];
        names.extend(self.backend.site_names().await);
        names
    }

    fn claimed(&self, matcher: &SkimMatcherV2, names: &[String], file: &FileProperties) -> bool {
        let Some(first) = file.subdirectory_path.iter().next() else {
            // Directly in the storage root, nothing to match against
            return false;
        };
        let directory = first.to_string_lossy();
        names.iter().any(|name| {
            normalized_score(matcher, name, &directory)
                .map_or(false, |score| score >= self.config.catalog.fuzzy_threshold)
        })
    }

    /// MIME sniff through file(1); containers it does not recognize
    /// fall back to the extension list.
    async fn is_video(&self, path: &Path) -> bool {
        let mime = match Command::new("file")
            .arg("-b")
            .arg("--mime-type")
            .arg(path)
            .output()
            .await
        {
            Ok(output) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).trim().to_string()
            }
            _ => String::new(),
        };
        if mime.starts_with("video/") || mime == "application/vnd.rn-realmedia" {
            return true;
        }

        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        self.config
            .storage
            .video_extensions
            .iter()
            .any(|known| *known == extension)
    }

    /// Resolve every claimed movie sequentially, flushing the database
    /// periodically and on shutdown so no finished work is lost.
    async fn resolve_all(&self, database: &mut Database) -> Result<()> {
        let mut resolved = 0usize;

        for path in database.paths() {
            if self.shutdown.load(Ordering::SeqCst) {
                info!("Shutdown requested, flushing the database");
                break;
            }
            let Some(mut movie) = database.remove(&path) else {
                continue;
            };
            if !movie.api.is_empty() {
                self.resolver.resolve(&mut movie).await;
                resolved += 1;
            }
            database.insert(path, movie);

            if resolved > 0 && resolved % WRITE_EVERY == 0 {
                database.write().await?;
            }
        }

        database.write().await
    }

    /// Build the sorted tree and its own index next to the storage root.
    /// In simulation mode every placed source goes on the diff list, the
    /// files a real run would move.
    async fn sort(&self, storage_root: &Path, database: &Database) -> Result<Vec<PathBuf>> {
        let sorted_root = Self::sorted_root(storage_root);
        tokio::fs::create_dir_all(&sorted_root)
            .await
            .with_context(|| format!("creating {}", sorted_root.display()))?;
        let mut index = Database::open(&sorted_root, &self.config.storage.database_name).await;

        let mut placed = 0usize;
        let mut diff = Vec::new();
        for movie in database.movies() {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            match self.place(&sorted_root, movie).await {
                Ok(Some(target)) => {
                    if self.config.storage.simulation {
                        diff.push(movie.file_properties.file_path.clone());
                    }
                    index.insert(target, movie.clone());
                    placed += 1;
                }
                Ok(None) => {}
                Err(err) => warn!(
                    "Could not sort {}: {}",
                    movie.file_properties.file_path.display(),
                    err
                ),
            }
        }

        index.write().await?;
        info!(
            "Sorted {} movies into {}{}",
            placed,
            sorted_root.display(),
            if self.config.storage.simulation {
                " (simulation, symlinks only)"
            } else {
                ""
            }
        );
        Ok(diff)
    }

    /// Place one movie in the sorted tree. Identified movies land in
    /// their site directory under the canonical name; colliding
    /// canonical names are the same shoot, and the larger copy wins.
    /// Everything else passes through to `unsorted` with its original
    /// name, suffixed when taken.
    async fn place(&self, sorted_root: &Path, movie: &Movie) -> Result<Option<PathBuf>> {
        let source = &movie.file_properties.file_path;
        if !source.exists() {
            return Ok(None);
        }

        let identified = !movie.api.is_empty() && movie.scene_properties.is_filled();
        let directory = if identified {
            sorted_root.join(&movie.scene_properties.site)
        } else {
            sorted_root.join(UNSORTED_DIR)
        };
        tokio::fs::create_dir_all(&directory)
            .await
            .with_context(|| format!("creating {}", directory.display()))?;

        let name = movie.canonical_file_name().unwrap_or_else(|| {
            source
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default()
        });
        let mut target = directory.join(&name);

        if target.exists() {
            if identified {
                let new_len = tokio::fs::metadata(source).await.map(|m| m.len()).unwrap_or(0);
                let old_len = tokio::fs::metadata(&target)
                    .await
                    .map(|m| m.len())
                    .unwrap_or(0);
                if new_len <= old_len {
                    info!(
                        "Duplicate of shoot {}: keeping the larger copy, skipping {}",
                        movie.scene_properties.shoot_id,
                        source.display()
                    );
                    return Ok(None);
                }
                tokio::fs::remove_file(&target).await?;
            } else {
                target = unique_target(&directory, &name);
            }
        }

        if self.config.storage.simulation {
            let absolute = tokio::fs::canonicalize(source)
                .await
                .unwrap_or_else(|_| source.clone());
            tokio::fs::symlink(absolute, &target)
                .await
                .with_context(|| format!("linking {}", target.display()))?;
        } else if let Err(err) = tokio::fs::rename(source, &target).await {
            // Cross-device moves cannot rename
            debug!("Rename failed ({}), copying instead", err);
            tokio::fs::copy(source, &target).await?;
            tokio::fs::remove_file(source).await?;
        }

        Ok(Some(target))
    }

    /// Undo a previous sort: symlinks are deleted, moved files go back
    /// to their original locations, and the emptied tree is pruned.
    pub async fn revert(&self, storage_root: &Path) -> Result<()> {
        let sorted_root = Self::sorted_root(storage_root);
        let index = Database::open(&sorted_root, &self.config.storage.database_name).await;
        if index.is_empty() {
            warn!("Nothing to revert under {}", sorted_root.display());
            return Ok(());
        }

        let mut restored = 0usize;
        for (sorted_path, movie) in index.entries() {
            let Ok(meta) = tokio::fs::symlink_metadata(sorted_path).await else {
                continue;
            };
            if meta.file_type().is_symlink() {
                tokio::fs::remove_file(sorted_path).await?;
            } else {
                let original = &movie.file_properties.file_path;
                if let Some(parent) = original.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::rename(sorted_path, original)
                    .await
                    .with_context(|| format!("moving {} back", sorted_path.display()))?;
            }
            restored += 1;
        }

        let _ = tokio::fs::remove_file(index.path()).await;
        prune_empty_dirs(&sorted_root);
        info!("Reverted {} movies from {}", restored, sorted_root.display());
        Ok(())
    }
}

/// Score a directory name against a catalog name on a 0-100 scale,
/// the directory's self match being 100.
fn normalized_score(matcher: &SkimMatcherV2, name: &str, directory: &str) -> Option<i64> {
    let ceiling = matcher.fuzzy_match(directory, directory)?;
    if ceiling <= 0 {
        return None;
    }
    let score = matcher.fuzzy_match(name, directory)?;
    Some((score * 100 / ceiling).min(100))
}

/// `foo.mp4` taken becomes `foo_0.mp4`, then `foo_1.mp4` and so on.
fn unique_target(directory: &Path, name: &str) -> PathBuf {
    let (stem, extension) = match name.rsplit_once('.') {
        Some((stem, ext)) => (stem.to_string(), format!(".{}", ext)),
        None => (name.to_string(), String::new()),
    };
    let mut counter = 0usize;
    loop {
        let candidate = directory.join(format!("{}_{}{}", stem, counter, extension));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Bottom-up removal of directories that ended up empty.
fn prune_empty_dirs(root: &Path) {
    for entry in WalkDir::new(root)
        .contents_first(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if entry.file_type().is_dir() {
            let _ = std::fs::remove_dir(entry.path());
        }
    }
}
