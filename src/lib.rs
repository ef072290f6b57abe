//! Shootsorter - shoot-ID based scene storage organizer
//!
//! Identifies scene videos by their numeric shoot ID (filename heuristics,
//! on-screen overlay recognition, embedded metadata), verifies the ID against
//! a catalog backend and reorganizes the storage into a
//! `site/title (id).ext` layout.

pub mod catalog;
pub mod config;
pub mod database;
pub mod filename;
pub mod interact;
pub mod recognition;
pub mod reconcile;
pub mod resolver;
pub mod scene;
pub mod sorter;

// Re-export main types for easy access
pub use crate::catalog::{CatalogBackend, Query, ShootRecord};
pub use crate::config::Config;
pub use crate::database::Database;
pub use crate::filename::extract_candidates;
pub use crate::recognition::{RecognitionError, ShootIdRecognizer};
pub use crate::reconcile::{reconcile, CandidateSet, Resolution};
pub use crate::resolver::SceneResolver;
pub use crate::scene::{FileProperties, Movie, SceneProperties};
pub use crate::sorter::ShootSorter;
