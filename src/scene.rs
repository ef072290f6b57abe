//! Scene and file data model: what a movie is, and what we know about it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::catalog::ShootRecord;

/// Dates are persisted and transmitted as unix timestamps, not as a
/// native date type.
pub mod date_ts {
    use chrono::{DateTime, NaiveDate, NaiveTime};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        let ts = date.and_time(NaiveTime::MIN).and_utc().timestamp();
        serializer.serialize_i64(ts)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let ts = i64::deserialize(deserializer)?;
        Ok(DateTime::from_timestamp(ts, 0)
            .map(|dt| dt.date_naive())
            .unwrap_or_default())
    }
}

/// Canonical normalized scene metadata.
///
/// A default instance is "empty"; an instance with every field non-default
/// and a positive shoot ID is "filled". Partially known scenes are neither.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneProperties {
    pub title: String,
    pub performers: Vec<String>,
    pub site: String,
    #[serde(with = "date_ts")]
    pub date: NaiveDate,
    #[serde(rename = "shootid")]
    pub shoot_id: u64,
}

impl Default for SceneProperties {
    fn default() -> Self {
        Self {
            title: String::new(),
            performers: Vec::new(),
            site: String::new(),
            // Unix epoch
            date: NaiveDate::default(),
            shoot_id: 0,
        }
    }
}

impl SceneProperties {
    /// True iff every field is still at its default.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// True iff every field is non-default and the shoot ID is positive.
    pub fn is_filled(&self) -> bool {
        !self.title.is_empty()
            && !self.performers.is_empty()
            && !self.site.is_empty()
            && self.date != NaiveDate::default()
            && self.shoot_id > 0
    }

    /// Overwrite only the supplied fields.
    pub fn update(&mut self, patch: ScenePatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(performers) = patch.performers {
            self.performers = performers;
        }
        if let Some(site) = patch.site {
            self.site = site;
        }
        if let Some(date) = patch.date {
            self.date = date;
        }
        if let Some(shoot_id) = patch.shoot_id {
            self.shoot_id = shoot_id;
        }
    }
}

/// Field-wise update for [`SceneProperties`]; absent keys are left alone.
#[derive(Debug, Clone, Default)]
pub struct ScenePatch {
    pub title: Option<String>,
    pub performers: Option<Vec<String>>,
    pub site: Option<String>,
    pub date: Option<NaiveDate>,
    pub shoot_id: Option<u64>,
}

impl From<&ShootRecord> for ScenePatch {
    fn from(record: &ShootRecord) -> Self {
        Self {
            title: record.title.clone(),
            performers: if record.performers.is_empty() {
                None
            } else {
                Some(record.performers.clone())
            },
            site: record.site.clone(),
            date: record.date,
            shoot_id: if record.shoot_id > 0 {
                Some(record.shoot_id)
            } else {
                None
            },
        }
    }
}

/// Immutable description of where a movie file lives relative to its
/// storage root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileProperties {
    pub file_path: PathBuf,
    pub storage_root_path: PathBuf,
    pub relative_path: PathBuf,
    pub subdirectory_path: PathBuf,
    pub base_name: String,
    pub extension: String,
}

impl FileProperties {
    pub fn new(file_path: PathBuf, storage_root: &Path) -> Self {
        let relative_path = file_path
            .strip_prefix(storage_root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| {
                file_path
                    .file_name()
                    .map(PathBuf::from)
                    .unwrap_or_default()
            });
        let subdirectory_path = relative_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let base_name = file_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let extension = file_path
            .extension()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        Self {
            file_path,
            storage_root_path: storage_root.to_path_buf(),
            relative_path,
            subdirectory_path,
            base_name,
            extension,
        }
    }
}

/// One discovered video file bound to its (possibly still empty) scene
/// metadata and the catalog backend responsible for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Movie {
    pub file_properties: FileProperties,
    /// Name of the catalog backend this movie belongs to, empty when no
    /// backend claimed its directory.
    pub api: String,
    pub scene_properties: SceneProperties,
}

impl Movie {
    pub fn new(file_properties: FileProperties, api: impl Into<String>) -> Self {
        Self {
            file_properties,
            api: api.into(),
            scene_properties: SceneProperties::default(),
        }
    }

    pub fn with_properties(
        file_properties: FileProperties,
        api: impl Into<String>,
        scene_properties: SceneProperties,
    ) -> Self {
        Self {
            file_properties,
            api: api.into(),
            scene_properties,
        }
    }

    /// Fill in scene metadata. Returns false when the movie is already
    /// filled; details are only ever written once.
    pub fn update_details(&mut self, patch: ScenePatch) -> bool {
        if self.scene_properties.is_filled() {
            return false;
        }
        self.scene_properties.update(patch);
        true
    }

    /// `{site} - {date} - {title} [{performers}] ({id})`
    pub fn formatted_name(&self) -> String {
        let scene = &self.scene_properties;
        format!(
            "{} - {} - {} [{}] ({})",
            scene.site,
            scene.date.format("%Y-%m-%d"),
            scene.title,
            scene.performers.join(", "),
            scene.shoot_id
        )
    }

    /// `title (id).ext`, the canonical sorted file name. None while the
    /// movie is not fully identified.
    pub fn canonical_file_name(&self) -> Option<String> {
        if !self.scene_properties.is_filled() {
            return None;
        }
        let mut name = format!(
            "{} ({})",
            self.scene_properties.title, self.scene_properties.shoot_id
        );
        if !self.file_properties.extension.is_empty() {
            name.push('.');
            name.push_str(&self.file_properties.extension);
        }
        Some(name)
    }
}

impl fmt::Display for Movie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.formatted_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_scene() -> SceneProperties {
        SceneProperties {
            title: "Whatever It Takes".to_string(),
            performers: vec!["Holly Heart".to_string()],
            site: "Device Bondage".to_string(),
            date: NaiveDate::from_ymd_opt(2009, 12, 17).unwrap(),
            shoot_id: 7675,
        }
    }

    #[test]
    fn test_empty_and_filled_are_exclusive_but_not_exhaustive() {
        let empty = SceneProperties::default();
        assert!(empty.is_empty());
        assert!(!empty.is_filled());

        let filled = filled_scene();
        assert!(filled.is_filled());
        assert!(!filled.is_empty());

        // Partially known scene is neither empty nor filled
        let mut partial = SceneProperties::default();
        partial.title = "Untitled".to_string();
        assert!(!partial.is_empty());
        assert!(!partial.is_filled());
    }

    #[test]
    fn test_update_overwrites_only_supplied_fields() {
        let mut scene = filled_scene();
        scene.update(ScenePatch {
            title: Some("Renamed".to_string()),
            ..Default::default()
        });
        assert_eq!(scene.title, "Renamed");
        assert_eq!(scene.shoot_id, 7675);
        assert_eq!(scene.site, "Device Bondage");
    }

    #[test]
    fn test_scene_serde_roundtrip_keeps_date() {
        let scene = filled_scene();
        let json = serde_json::to_string(&scene).unwrap();
        // Date travels as a unix timestamp
        assert!(json.contains("\"date\":1261008000"));
        let back: SceneProperties = serde_json::from_str(&json).unwrap();
        assert_eq!(back, scene);
    }

    #[test]
    fn test_file_properties_derivation() {
        let root = Path::new("/storage");
        let file = FileProperties::new(
            PathBuf::from("/storage/Device Bondage/scene 7675.mp4"),
            root,
        );
        assert_eq!(
            file.relative_path,
            PathBuf::from("Device Bondage/scene 7675.mp4")
        );
        assert_eq!(file.subdirectory_path, PathBuf::from("Device Bondage"));
        assert_eq!(file.base_name, "scene 7675");
        assert_eq!(file.extension, "mp4");
    }

    #[test]
    fn test_movie_formatting() {
        let file = FileProperties::new(PathBuf::from("/storage/x.mp4"), Path::new("/storage"));
        let movie = Movie::with_properties(file, "Kink.com", filled_scene());
        assert_eq!(
            movie.formatted_name(),
            "Device Bondage - 2009-12-17 - Whatever It Takes [Holly Heart] (7675)"
        );
        assert_eq!(
            movie.canonical_file_name().unwrap(),
            "Whatever It Takes (7675).mp4"
        );
    }

    #[test]
    fn test_update_details_is_write_once() {
        let file = FileProperties::new(PathBuf::from("/storage/x.mp4"), Path::new("/storage"));
        let mut movie = Movie::new(file, "Kink.com");
        assert!(movie.update_details(ScenePatch::from(&ShootRecord {
            shoot_id: 7675,
            exists: true,
            site: Some("Device Bondage".to_string()),
            title: Some("Whatever It Takes".to_string()),
            performers: vec!["Holly Heart".to_string()],
            date: NaiveDate::from_ymd_opt(2009, 12, 17),
        })));
        assert!(movie.scene_properties.is_filled());
        // Second update is refused
        assert!(!movie.update_details(ScenePatch::default()));
    }
}
