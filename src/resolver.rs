//! The per-movie orchestrator: extract candidates, reconcile them,
//! verify against the catalog, and fill the movie's scene metadata.

use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::catalog::{CatalogBackend, Query, ShootRecord};
use crate::config::ExtractionConfig;
use crate::filename::extract_candidates;
use crate::interact::{parse_date_like, Interaction};
use crate::recognition::{shoot_id_from_metadata, ShootIdRecognizer};
use crate::reconcile::{reconcile, CandidateSet, Resolution};
use crate::scene::{Movie, ScenePatch};

/// Stages a movie passes through while being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStage {
    New,
    CandidatesExtracted,
    Reconciled,
    Queried,
    Confirmed,
    InteractiveFallback,
    Done,
}

/// What resolution left behind. An untagged movie is a normal outcome,
/// never a batch failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    Tagged,
    Untagged,
}

pub struct SceneResolver {
    backend: Arc<dyn CatalogBackend>,
    recognizer: Arc<ShootIdRecognizer>,
    interaction: Arc<dyn Interaction>,
    extraction: ExtractionConfig,
}

impl SceneResolver {
    pub fn new(
        backend: Arc<dyn CatalogBackend>,
        recognizer: Arc<ShootIdRecognizer>,
        interaction: Arc<dyn Interaction>,
        extraction: ExtractionConfig,
    ) -> Self {
        Self {
            backend,
            recognizer,
            interaction,
            extraction,
        }
    }

    /// Drive one movie through the state machine. Already filled movies
    /// are skipped; every internal failure degrades to an untagged
    /// movie rather than propagating.
    pub async fn resolve(&self, movie: &mut Movie) -> ResolveOutcome {
        if movie.scene_properties.is_filled() {
            debug!(
                "Skipping already resolved {}",
                movie.file_properties.file_path.display()
            );
            return ResolveOutcome::Tagged;
        }

        let path = movie.file_properties.file_path.clone();
        let mut stage = ResolveStage::New;

        let candidates = CandidateSet {
            from_filename: extract_candidates(&movie.file_properties.base_name, &self.extraction),
            from_frame: self.recognizer.recognize(&path).await,
            from_metadata: shoot_id_from_metadata(&path).await,
        };
        self.advance(&mut stage, ResolveStage::CandidatesExtracted, &path);
        debug!(
            "Candidates for {}: filename {:?}, frame {}, metadata {}",
            path.display(),
            candidates.from_filename,
            candidates.from_frame,
            candidates.from_metadata
        );

        let (shoot_id, confident) = match reconcile(&candidates) {
            Resolution::Resolved { shoot_id, confident } => (shoot_id, confident),
            Resolution::Ambiguous { candidates } => {
                match self.interaction.choose_candidate(&path, &candidates) {
                    Some(choice) => (choice, false),
                    None => return ResolveOutcome::Untagged,
                }
            }
        };
        self.advance(&mut stage, ResolveStage::Reconciled, &path);

        let (results, confident) = if shoot_id > 0 {
            (self.backend.query(&Query::ById(shoot_id)).await, confident)
        } else {
            // Nothing extracted at all; fall back to a free-form hint or,
            // unattended, to a date embedded in the filename.
            let hint = self
                .interaction
                .query_hint(&path)
                .or_else(|| parse_date_like(&movie.file_properties.base_name).map(Query::ByDate));
            let Some(hint) = hint else {
                return ResolveOutcome::Untagged;
            };
            (self.backend.query(&hint).await, false)
        };
        self.advance(&mut stage, ResolveStage::Queried, &path);

        self.accept(movie, &path, results, confident, &mut stage)
    }

    /// Auto-accept a confident single hit, otherwise hand the ranked
    /// candidates to the interactive boundary.
    fn accept(
        &self,
        movie: &mut Movie,
        path: &Path,
        results: Vec<ShootRecord>,
        confident: bool,
        stage: &mut ResolveStage,
    ) -> ResolveOutcome {
        let usable: Vec<ShootRecord> = results.into_iter().filter(|r| r.exists).collect();

        if usable.is_empty() {
            info!("No catalog match for {}, leaving untagged", path.display());
            return ResolveOutcome::Untagged;
        }

        if confident && usable.len() == 1 {
            self.advance(stage, ResolveStage::Confirmed, path);
            return self.fill(movie, &usable[0], path, stage);
        }

        self.advance(stage, ResolveStage::InteractiveFallback, path);

        let chosen = if usable.len() == 1 {
            usable.first()
        } else {
            let ids: Vec<u64> = usable.iter().map(|r| r.shoot_id).collect();
            self.interaction
                .choose_candidate(path, &ids)
                .and_then(|id| usable.iter().find(|r| r.shoot_id == id))
        };

        let Some(record) = chosen else {
            return ResolveOutcome::Untagged;
        };

        if self.interaction.confirm(path, &preview(record)) {
            self.fill(movie, record, path, stage)
        } else {
            info!("Match declined for {}, leaving untagged", path.display());
            ResolveOutcome::Untagged
        }
    }

    fn fill(
        &self,
        movie: &mut Movie,
        record: &ShootRecord,
        path: &Path,
        stage: &mut ResolveStage,
    ) -> ResolveOutcome {
        movie.update_details(ScenePatch::from(record));
        self.advance(stage, ResolveStage::Done, path);
        info!("{} -> {}", path.display(), movie.formatted_name());
        ResolveOutcome::Tagged
    }

    fn advance(&self, stage: &mut ResolveStage, next: ResolveStage, path: &Path) {
        debug!("{}: {:?} -> {:?}", path.display(), stage, next);
        *stage = next;
    }
}

/// One-line preview of a record for confirmation prompts.
fn preview(record: &ShootRecord) -> String {
    format!(
        "{} - {} - {} [{}] ({})",
        record.site.as_deref().unwrap_or("?"),
        record
            .date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "?".to_string()),
        record.title.as_deref().unwrap_or("?"),
        record.performers.join(", "),
        record.shoot_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FallbackPolicy, RecognitionConfig};
    use crate::interact::NonInteractive;
    use crate::scene::FileProperties;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::path::PathBuf;

    /// In-memory backend for exercising the orchestration.
    struct FixtureCatalog {
        records: Vec<ShootRecord>,
    }

    #[async_trait]
    impl CatalogBackend for FixtureCatalog {
        fn name(&self) -> &str {
            "Fixture"
        }

        async fn query(&self, query: &Query) -> Vec<ShootRecord> {
            match query {
                Query::ById(id) => self
                    .records
                    .iter()
                    .filter(|r| r.shoot_id == *id)
                    .cloned()
                    .collect(),
                _ => Vec::new(),
            }
        }

        async fn site_names(&self) -> Vec<String> {
            Vec::new()
        }
    }

    fn record_7675() -> ShootRecord {
        ShootRecord {
            shoot_id: 7675,
            exists: true,
            site: Some("Device Bondage".to_string()),
            title: Some("Whatever It Takes".to_string()),
            performers: vec!["Holly Heart".to_string()],
            date: NaiveDate::from_ymd_opt(2009, 12, 17),
        }
    }

    fn resolver(records: Vec<ShootRecord>, fallback: FallbackPolicy) -> SceneResolver {
        let cfg = RecognitionConfig {
            template_dir: PathBuf::from("/nonexistent"),
            ..RecognitionConfig::default()
        };
        SceneResolver::new(
            Arc::new(FixtureCatalog { records }),
            // No templates: recognition degrades to a no-op
            Arc::new(ShootIdRecognizer::with_templates(Vec::new(), cfg)),
            Arc::new(NonInteractive::new(fallback)),
            ExtractionConfig::default(),
        )
    }

    fn movie(name: &str) -> Movie {
        let file = FileProperties::new(
            PathBuf::from(format!("/storage/site/{}", name)),
            Path::new("/storage"),
        );
        Movie::new(file, "Fixture")
    }

    #[tokio::test]
    async fn test_bracketed_filename_resolves_without_prompting() {
        let resolver = resolver(vec![record_7675()], FallbackPolicy::AcceptBest);
        let mut movie = movie("scene (7675).mp4");

        assert_eq!(resolver.resolve(&mut movie).await, ResolveOutcome::Tagged);
        assert!(movie.scene_properties.is_filled());
        assert_eq!(movie.scene_properties.shoot_id, 7675);
        assert_eq!(movie.scene_properties.site, "Device Bondage");
    }

    #[tokio::test]
    async fn test_unknown_id_leaves_movie_untagged() {
        let resolver = resolver(
            vec![ShootRecord::missing(4141)],
            FallbackPolicy::AcceptBest,
        );
        let mut movie = movie("scene 4141.mp4");

        assert_eq!(resolver.resolve(&mut movie).await, ResolveOutcome::Untagged);
        assert!(movie.scene_properties.is_empty());
    }

    #[tokio::test]
    async fn test_no_candidates_leaves_movie_untagged() {
        let resolver = resolver(vec![record_7675()], FallbackPolicy::AcceptBest);
        let mut movie = movie("completely opaque name.mp4");

        assert_eq!(resolver.resolve(&mut movie).await, ResolveOutcome::Untagged);
    }

    #[tokio::test]
    async fn test_leave_untagged_policy_declines_unconfident_match() {
        // Small uncorroborated ID: found in the catalog but unconfident,
        // and the policy refuses to accept on its own
        let mut suspicious = record_7675();
        suspicious.shoot_id = 500;
        let resolver = resolver(vec![suspicious], FallbackPolicy::LeaveUntagged);
        let mut movie = movie("clip 500 raw.mp4");

        assert_eq!(resolver.resolve(&mut movie).await, ResolveOutcome::Untagged);
    }

    #[tokio::test]
    async fn test_accept_best_policy_accepts_unconfident_match() {
        let mut suspicious = record_7675();
        suspicious.shoot_id = 500;
        let resolver = resolver(vec![suspicious], FallbackPolicy::AcceptBest);
        let mut movie = movie("clip 500 raw.mp4");

        assert_eq!(resolver.resolve(&mut movie).await, ResolveOutcome::Tagged);
        assert_eq!(movie.scene_properties.shoot_id, 500);
    }

    #[tokio::test]
    async fn test_already_filled_movies_are_skipped() {
        let resolver = resolver(Vec::new(), FallbackPolicy::AcceptBest);
        let mut filled = movie("scene (7675).mp4");
        filled.update_details(ScenePatch::from(&record_7675()));

        // No catalog entry would match, but the movie is not touched
        assert_eq!(resolver.resolve(&mut filled).await, ResolveOutcome::Tagged);
    }
}
