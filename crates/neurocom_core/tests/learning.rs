mod common;

use common::TestApp;
use neurocom_core::domain::{
    ProfileUpdate, StepFeedback, Tier, TrackStatus, VideoProgressUpdate,
};
use neurocom_core::ports::GenerationKind;
use neurocom_core::CoreError;

#[tokio::test]
async fn started_track_feeds_the_guardian_until_finished() {
    let app = TestApp::new();
    let user = app.user(Tier::Intermediate);
    let track = app.store.add_track("foco", "Foco profundo", Tier::Intermediate);
    let first = app.store.add_step(track, "Respirar");
    let second = app.store.add_step(track, "Agir");
    app.embeddings.set_failing(true);

    let enrollment = app.learning.start_track(user.id, "foco").await.unwrap();
    assert_eq!(enrollment.status, TrackStatus::InProgress);
    assert_eq!(enrollment.current_step_id, Some(first));

    let outcome = app
        .learning
        .complete_step(&user, first, StepFeedback::default())
        .await
        .unwrap();
    assert_eq!(outcome.enrollment.percent, 50);
    assert_eq!(outcome.next_step_id, Some(second));
    assert!(!outcome.track_completed());

    app.guide(user.id, "por onde continuo?").await;
    let prompt = &app.generator.prompts(GenerationKind::Answer)[0];
    assert!(prompt.contains("Trilhas em progresso:\n- Foco profundo: 50% concluído"), "{prompt}");

    let outcome = app
        .learning
        .complete_step(&user, second, StepFeedback::default())
        .await
        .unwrap();
    assert!(outcome.track_completed());
    assert!(outcome.enrollment.completed_at.is_some());

    app.guide(user.id, "e agora?").await;
    let prompt = &app.generator.prompts(GenerationKind::Answer)[1];
    assert!(!prompt.contains("Trilhas em progresso"), "{prompt}");
}

#[tokio::test]
async fn starting_twice_keeps_the_enrollment() {
    let app = TestApp::new();
    let user = app.user(Tier::Free);
    let track = app.store.add_track("pausa", "Pausas curtas", Tier::Free);
    let first = app.store.add_step(track, "Parar");
    app.store.add_step(track, "Respirar");

    app.learning.start_track(user.id, "pausa").await.unwrap();
    app.learning
        .complete_step(&user, first, StepFeedback::default())
        .await
        .unwrap();
    let again = app
        .learning
        .start_track(user.id, &track.to_string())
        .await
        .unwrap();
    assert_eq!(again.percent, 50);

    let detail = app.learning.track(user.id, "pausa").await.unwrap();
    assert!(detail.steps[0].completed_at.is_some());
    assert!(detail.steps[1].completed_at.is_none());
}

#[tokio::test]
async fn completing_a_step_checks_the_track_level() {
    let app = TestApp::new();
    let user = app.user(Tier::Free);
    let track = app.store.add_track("avancado", "Regulação emocional", Tier::Full);
    let step = app.store.add_step(track, "Nomear emoções");

    let err = app
        .learning
        .complete_step(&user, step, StepFeedback::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::InsufficientTier {
            current: Tier::Free,
            ..
        }
    ));
    assert!(app.store.step_feedback(user.id, step).is_none());

    let err = app
        .learning
        .complete_step(
            &user,
            step,
            StepFeedback {
                rating: Some(0),
                feedback: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
}

#[tokio::test]
async fn unknown_content_is_not_found() {
    let app = TestApp::new();
    let user = app.user(Tier::Full);

    let err = app.learning.track(user.id, "nada").await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
    let err = app.learning.start_track(user.id, "nada").await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
    let err = app
        .learning
        .record_video_progress(
            user.id,
            "nada",
            VideoProgressUpdate {
                position_seconds: 0,
                completed: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
}

#[tokio::test]
async fn recorded_video_progress_shows_up_as_recent_activity() {
    let app = TestApp::new();
    let user = app.user(Tier::Intermediate);
    let video = app.store.add_video("respirar", "Respiração consciente", Tier::Free);
    app.store.set_video_duration(video.id, 300);
    app.embeddings.set_failing(true);

    let progress = app
        .learning
        .record_video_progress(
            user.id,
            "respirar",
            VideoProgressUpdate {
                position_seconds: 280,
                completed: None,
            },
        )
        .await
        .unwrap();
    assert!(progress.completed);

    app.guide(user.id, "o que eu vi?").await;
    let prompt = &app.generator.prompts(GenerationKind::Answer)[0];
    assert!(prompt.contains("Vídeos recentes:\n- Respiração consciente - concluído"), "{prompt}");
}

#[tokio::test]
async fn profile_edits_reach_the_guardian_prompt() {
    let app = TestApp::new();
    let user = app.user(Tier::Intermediate);

    assert!(app.learning.profile(user.id).await.unwrap().is_none());
    app.learning
        .update_profile(
            user.id,
            ProfileUpdate {
                goals: Some(vec!["dormir melhor".to_string()]),
                ..ProfileUpdate::default()
            },
        )
        .await
        .unwrap();
    let profile = app
        .learning
        .update_profile(
            user.id,
            ProfileUpdate {
                experience_level: Some("iniciante".to_string()),
                ..ProfileUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(profile.goals, ["dormir melhor"]);

    app.guide(user.id, "como começo?").await;
    let prompt = &app.generator.prompts(GenerationKind::Answer)[0];
    assert!(prompt.contains("- Objetivos: dormir melhor\n- Nível: iniciante"), "{prompt}");
}
