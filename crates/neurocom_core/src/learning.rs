//! crates/neurocom_core/src/learning.rs
//!
//! Learning tracks, video progress and the developer profile.
//!
//! These are the write paths for what the context assembler later reads back
//! as recency signals (tracks in progress, recently watched videos) and what
//! the guardian persona is tailored with (the profile).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::access::content_accessible;
use crate::domain::{
    ProfileUpdate, StepFeedback, Tier, Track, TrackEnrollment, TrackStatus,
    TrackStep, User, UserProfile, Video, VideoProgress, VideoProgressUpdate,
};
use crate::error::{CoreError, CoreResult};
use crate::ports::{LearningRepository, UserRepository};

/// Share of a video's duration after which it counts as watched.
pub const COMPLETION_RATIO: f64 = 0.9;

const TRACK_NOT_FOUND: &str = "Trilha não encontrada";
const VIDEO_NOT_FOUND: &str = "Vídeo não encontrado";

/// A catalog entry with the caller's standing, if enrolled.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackOverview {
    pub track: Track,
    pub enrollment: Option<TrackEnrollment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepState {
    pub step: TrackStep,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackDetail {
    pub track: Track,
    pub steps: Vec<StepState>,
    pub enrollment: Option<TrackEnrollment>,
}

/// What finishing a step did to the enclosing track.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub enrollment: TrackEnrollment,
    pub next_step_id: Option<Uuid>,
}

impl StepOutcome {
    pub fn track_completed(&self) -> bool {
        self.enrollment.status == TrackStatus::Completed
    }
}

/// Rounded share of `done` over `total`, in percent. An empty track counts as one step.
pub fn percent_complete(done: usize, total: usize) -> i32 {
    let total = total.max(1);
    let done = done.min(total);
    ((done * 200 + total) / (2 * total)) as i32
}

/// Whether a reported position finishes the video.
fn reaches_end(position_seconds: i32, duration_seconds: Option<i32>) -> bool {
    match duration_seconds {
        Some(duration) if duration > 0 => {
            f64::from(position_seconds) >= f64::from(duration) * COMPLETION_RATIO
        }
        _ => false,
    }
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|i| i.trim().to_string())
        .filter(|i| !i.is_empty())
        .collect()
}

#[derive(Clone)]
pub struct LearningService {
    repo: Arc<dyn LearningRepository>,
    users: Arc<dyn UserRepository>,
}

impl LearningService {
    pub fn new(repo: Arc<dyn LearningRepository>, users: Arc<dyn UserRepository>) -> Self {
        Self { repo, users }
    }

    //=====================================================================================
    // Videos
    //=====================================================================================

    /// A video and the caller's progress in it.
    pub async fn video(
        &self,
        user_id: Uuid,
        slug: &str,
    ) -> CoreResult<(Video, Option<VideoProgress>)> {
        let video = self
            .repo
            .find_video(slug)
            .await?
            .ok_or_else(|| CoreError::NotFound(VIDEO_NOT_FOUND.to_string()))?;
        let progress = self.repo.video_progress(user_id, video.id).await?;
        Ok((video, progress))
    }

    /// Records a player position. Once a video is completed it stays completed.
    pub async fn record_video_progress(
        &self,
        user_id: Uuid,
        slug: &str,
        update: VideoProgressUpdate,
    ) -> CoreResult<VideoProgress> {
        if update.position_seconds < 0 {
            return Err(CoreError::Validation(
                "position_seconds must not be negative".to_string(),
            ));
        }
        let (video, previous) = self.video(user_id, slug).await?;

        let completed = update
            .completed
            .unwrap_or_else(|| reaches_end(update.position_seconds, video.duration_seconds))
            || previous.map_or(false, |p| p.completed);

        let progress = self
            .repo
            .save_video_progress(user_id, video.id, update.position_seconds, completed)
            .await?;
        debug!(
            "User {} at {}s of video {} (completed: {})",
            user_id, progress.position_seconds, video.slug, progress.completed
        );
        Ok(progress)
    }

    //=====================================================================================
    // Tracks
    //=====================================================================================

    /// Every track the caller's plan can open, with their enrollment.
    pub async fn catalog(&self, user: &User) -> CoreResult<Vec<TrackOverview>> {
        let levels: Vec<Tier> = Tier::ALL
            .into_iter()
            .filter(|level| content_accessible(user.tier, *level))
            .collect();
        let (tracks, enrollments) = tokio::join!(
            self.repo.list_tracks(&levels),
            self.repo.enrollments(user.id)
        );
        let enrollments = enrollments?;

        Ok(tracks?
            .into_iter()
            .map(|track| {
                let enrollment = enrollments
                    .iter()
                    .find(|e| e.track_id == track.id)
                    .cloned();
                TrackOverview { track, enrollment }
            })
            .collect())
    }

    /// A track with its steps marked done or pending for the caller.
    /// The content-level guard has already run.
    pub async fn track(&self, user_id: Uuid, identifier: &str) -> CoreResult<TrackDetail> {
        let track = self.find_track(identifier).await?;
        let (steps, completions, enrollments) = tokio::join!(
            self.repo.track_steps(track.id),
            self.repo.step_completions(user_id, track.id),
            self.repo.enrollments(user_id)
        );
        let completions = completions?;

        let steps = steps?
            .into_iter()
            .map(|step| StepState {
                completed_at: completions
                    .iter()
                    .find(|c| c.step_id == step.id)
                    .map(|c| c.completed_at),
                step,
            })
            .collect();
        let enrollment = enrollments?.into_iter().find(|e| e.track_id == track.id);

        Ok(TrackDetail {
            track,
            steps,
            enrollment,
        })
    }

    /// Enrolls the caller at the first step. Starting an already started
    /// track returns the existing enrollment unchanged.
    pub async fn start_track(
        &self,
        user_id: Uuid,
        identifier: &str,
    ) -> CoreResult<TrackEnrollment> {
        let track = self.find_track(identifier).await?;
        if let Some(existing) = self
            .repo
            .enrollments(user_id)
            .await?
            .into_iter()
            .find(|e| e.track_id == track.id)
        {
            return Ok(existing);
        }

        let first_step = self.repo.track_steps(track.id).await?.into_iter().next();
        let enrollment = TrackEnrollment {
            track_id: track.id,
            status: TrackStatus::InProgress,
            percent: 0,
            current_step_id: first_step.map(|s| s.id),
            completed_at: None,
            updated_at: Utc::now(),
        };
        let saved = self.repo.save_enrollment(user_id, &enrollment).await?;
        info!("User {} started track {}", user_id, track.slug);
        Ok(saved)
    }

    /// Marks a step done and recomputes the track's percentage and next step.
    pub async fn complete_step(
        &self,
        user: &User,
        step_id: Uuid,
        feedback: StepFeedback,
    ) -> CoreResult<StepOutcome> {
        if let Some(rating) = feedback.rating {
            if !(1..=5).contains(&rating) {
                return Err(CoreError::Validation(
                    "rating must be between 1 and 5".to_string(),
                ));
            }
        }
        let step = self
            .repo
            .find_step(step_id)
            .await?
            .ok_or_else(|| CoreError::NotFound("Etapa não encontrada".to_string()))?;
        let track = self.find_track(&step.track_id.to_string()).await?;
        if !content_accessible(user.tier, track.level) {
            return Err(CoreError::InsufficientTier {
                current: user.tier,
                allowed: track.level.and_above(),
            });
        }

        let feedback = StepFeedback {
            rating: feedback.rating,
            feedback: feedback
                .feedback
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty()),
        };
        self.repo
            .save_step_completion(user.id, step.id, &feedback)
            .await?;

        let (steps, completions) = tokio::join!(
            self.repo.track_steps(track.id),
            self.repo.step_completions(user.id, track.id)
        );
        let steps = steps?;
        let completions = completions?;
        let done = steps
            .iter()
            .filter(|s| completions.iter().any(|c| c.step_id == s.id))
            .count();
        let percent = percent_complete(done, steps.len());
        let next_step_id = steps
            .iter()
            .find(|s| s.position > step.position)
            .map(|s| s.id);

        let now = Utc::now();
        let status = if percent >= 100 {
            TrackStatus::Completed
        } else {
            TrackStatus::InProgress
        };
        let enrollment = TrackEnrollment {
            track_id: track.id,
            status,
            percent,
            current_step_id: next_step_id,
            completed_at: (status == TrackStatus::Completed).then_some(now),
            updated_at: now,
        };
        let enrollment = self.repo.save_enrollment(user.id, &enrollment).await?;
        info!(
            "User {} completed step {} of track {} ({}%)",
            user.id, step.id, track.slug, percent
        );

        Ok(StepOutcome {
            enrollment,
            next_step_id,
        })
    }

    async fn find_track(&self, identifier: &str) -> CoreResult<Track> {
        self.repo
            .find_track(identifier)
            .await?
            .ok_or_else(|| CoreError::NotFound(TRACK_NOT_FOUND.to_string()))
    }

    //=====================================================================================
    // Developer profile
    //=====================================================================================

    pub async fn profile(&self, user_id: Uuid) -> CoreResult<Option<UserProfile>> {
        Ok(self.users.find_profile(user_id).await?)
    }

    /// Applies a partial edit on top of the stored profile, creating it if needed.
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        update: ProfileUpdate,
    ) -> CoreResult<UserProfile> {
        let mut profile = self.users.find_profile(user_id).await?.unwrap_or_default();
        if let Some(goals) = update.goals {
            profile.goals = clean_list(goals);
        }
        if let Some(interests) = update.interests {
            profile.interests = clean_list(interests);
        }
        if let Some(level) = update.experience_level {
            profile.experience_level = Some(level.trim().to_string()).filter(|l| !l.is_empty());
        }
        Ok(self.users.save_profile(user_id, &profile).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_rounds_to_nearest() {
        assert_eq!(percent_complete(0, 3), 0);
        assert_eq!(percent_complete(1, 3), 33);
        assert_eq!(percent_complete(2, 3), 67);
        assert_eq!(percent_complete(3, 3), 100);
        assert_eq!(percent_complete(0, 0), 0);
    }

    #[test]
    fn ninety_percent_of_the_duration_finishes_a_video() {
        assert!(reaches_end(540, Some(600)));
        assert!(!reaches_end(539, Some(600)));
        assert!(!reaches_end(10_000, None));
        assert!(!reaches_end(10, Some(0)));
    }
}
