mod common;

use std::time::Duration;

use common::{TestApp, ANSWER};
use neurocom_core::chat::DEGRADED_ANSWER;
use neurocom_core::domain::{ConversationScope, NewReflection, Tier, UserProfile};
use neurocom_core::memory::{Failure, ScriptedGenerator};
use neurocom_core::ports::GenerationKind;
use neurocom_core::CoreError;

#[tokio::test]
async fn recap_lists_own_messages_without_calling_the_model() {
    let app = TestApp::new();
    let user = app.user(Tier::Free);

    let first = app.chat.converse(user.id, "a", None, None).await.unwrap();
    for message in ["b", "c", "d", "e"] {
        app.chat
            .converse(user.id, message, Some(first.session_id), None)
            .await
            .unwrap();
    }
    let calls_before = app.generator.calls();

    let reply = app
        .chat
        .converse(
            user.id,
            "what were my last 3 messages?",
            Some(first.session_id),
            None,
        )
        .await
        .unwrap();

    assert!(reply.answer.ends_with("1. \"c\"\n2. \"d\"\n3. \"e\""), "{}", reply.answer);
    assert!(reply.followups.is_empty());
    assert_eq!(app.generator.calls(), calls_before);

    let recap = app
        .conversations
        .recap_questions(user.id, ConversationScope::Session(first.session_id), 3)
        .await
        .unwrap();
    assert_eq!(recap, ["c", "d", "e"]);
    assert_eq!(
        app.store
            .stored_turns(user.id, ConversationScope::Session(first.session_id))
            .len(),
        5
    );
}

#[tokio::test]
async fn vector_store_outage_still_answers_and_persists() {
    let app = TestApp::new();
    let user = app.user(Tier::Free);
    app.store.inject(Failure::CombinedSearch);
    app.store.inject(Failure::VectorSearch);

    let reply = app
        .chat
        .converse(user.id, "Como organizo minha rotina?", None, None)
        .await
        .unwrap();

    assert_eq!(reply.answer, ANSWER);
    let prompt = &app.generator.prompts(GenerationKind::Answer)[0];
    assert!(prompt.contains("Mensagem do usuário:\nComo organizo minha rotina?"));

    let stored = app
        .store
        .stored_turns(user.id, ConversationScope::Session(reply.session_id));
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].0.answer, ANSWER);
}

#[tokio::test]
async fn embedding_outage_persists_turn_without_vector() {
    let app = TestApp::new();
    let user = app.user(Tier::Free);
    app.embeddings.set_failing(true);

    let reply = app.chat.converse(user.id, "Olá", None, None).await.unwrap();

    assert_eq!(reply.answer, ANSWER);
    let stored = app
        .store
        .stored_turns(user.id, ConversationScope::Session(reply.session_id));
    assert_eq!(stored.len(), 1);
    assert!(!stored[0].1, "turn should have been stored without embedding");
}

#[tokio::test]
async fn failed_insert_with_embedding_falls_back_to_plain_insert() {
    let app = TestApp::new();
    let user = app.user(Tier::Free);
    app.store.inject(Failure::EmbeddedTurnInsert);

    let reply = app.guide(user.id, "Quero retomar a trilha").await;

    assert!(reply.turn_id.is_some());
    let stored = app.store.stored_turns(user.id, ConversationScope::Continuous);
    assert_eq!(stored.len(), 1);
    assert!(!stored[0].1);
}

#[tokio::test]
async fn total_persistence_failure_still_returns_the_answer() {
    let app = TestApp::new();
    let user = app.user(Tier::Free);
    app.store.inject(Failure::TurnInsert);

    let reply = app.guide(user.id, "Oi").await;

    assert_eq!(reply.answer, ANSWER);
    assert_eq!(reply.turn_id, None);
}

#[tokio::test]
async fn history_is_chronological() {
    let app = TestApp::new();
    let user = app.user(Tier::Free);
    let messages: Vec<String> = (0..12).map(|i| format!("mensagem {}", i)).collect();

    for message in &messages {
        app.guide(user.id, message).await;
    }

    let page = app
        .conversations
        .history(user.id, ConversationScope::Continuous, Some(50), 0)
        .await
        .unwrap();
    let questions: Vec<_> = page.turns.iter().map(|t| t.question.clone()).collect();
    assert_eq!(questions, messages);
    assert!(page.turns.windows(2).all(|w| w[0].id < w[1].id));
    assert_eq!(page.total, 12);

    let older = app
        .conversations
        .history(user.id, ConversationScope::Continuous, Some(5), 5)
        .await
        .unwrap();
    let questions: Vec<_> = older.turns.iter().map(|t| t.question.as_str()).collect();
    assert_eq!(
        questions,
        ["mensagem 2", "mensagem 3", "mensagem 4", "mensagem 5", "mensagem 6"]
    );
}

#[tokio::test]
async fn sessions_are_isolated_between_users() {
    let app = TestApp::new();
    let owner = app.user(Tier::Free);
    let intruder = app.user(Tier::Full);

    let owned = app
        .chat
        .converse(owner.id, "meu segredo", None, None)
        .await
        .unwrap();

    let hijack = app
        .chat
        .converse(intruder.id, "oi", Some(owned.session_id), None)
        .await
        .unwrap();
    assert_ne!(hijack.session_id, owned.session_id);

    let err = app
        .conversations
        .session_history(owned.session_id, intruder.id)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));

    let err = app
        .conversations
        .rename_session(owned.session_id, intruder.id, "meu agora")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));

    let missing = app
        .conversations
        .session_history(uuid::Uuid::new_v4(), intruder.id)
        .await
        .unwrap_err();
    assert_eq!(
        std::mem::discriminant(&missing),
        std::mem::discriminant(&err)
    );

    let history = app
        .conversations
        .session_history(owned.session_id, owner.id)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].question, "meu segredo");
}

#[tokio::test]
async fn first_message_titles_the_session() {
    let app = TestApp::new();
    let user = app.user(Tier::Free);
    let long = "Estou tentando entender por que perco o foco sempre que começo a estudar à noite";

    let reply = app.chat.converse(user.id, long, None, None).await.unwrap();
    app.chat
        .converse(user.id, "outra coisa", Some(reply.session_id), None)
        .await
        .unwrap();

    let session = app
        .conversations
        .owned_session(reply.session_id, user.id)
        .await
        .unwrap();
    let expected: String = long.chars().take(60).collect();
    assert_eq!(session.title.as_deref(), Some(expected.as_str()));
}

#[tokio::test]
async fn followups_are_generated_unless_declined() {
    let app = TestApp::new();
    let user = app.user(Tier::Free);

    let reply = app.chat.converse(user.id, "Oi", None, None).await.unwrap();
    assert_eq!(
        reply.followups,
        ["O que mudou desde ontem?", "Qual seria o primeiro passo?"]
    );
    let stored = app
        .store
        .stored_turns(user.id, ConversationScope::Session(reply.session_id));
    assert_eq!(stored[0].0.followups, reply.followups);

    let before = app.generator.prompts(GenerationKind::Followups).len();
    let reply = app
        .chat
        .converse(user.id, "Oi de novo", Some(reply.session_id), Some(false))
        .await
        .unwrap();
    assert!(reply.followups.is_empty());
    assert_eq!(app.generator.prompts(GenerationKind::Followups).len(), before);
}

#[tokio::test]
async fn unusable_model_output_yields_canned_apology() {
    let app = TestApp::with_generator(ScriptedGenerator::new("   "), Duration::from_secs(5));
    let user = app.user(Tier::Free);

    let reply = app.chat.converse(user.id, "Oi", None, None).await.unwrap();
    assert_eq!(reply.answer, DEGRADED_ANSWER);
}

#[tokio::test]
async fn slow_model_is_a_terminal_timeout() {
    let generator = ScriptedGenerator::new(ANSWER).with_delay(Duration::from_millis(300));
    let app = TestApp::with_generator(generator, Duration::from_millis(50));
    let user = app.user(Tier::Free);

    let err = app.chat.converse(user.id, "Oi", None, None).await.unwrap_err();
    assert!(matches!(err, CoreError::SynthesisTimeout(_)));
}

#[tokio::test]
async fn empty_message_is_rejected() {
    let app = TestApp::new();
    let user = app.user(Tier::Free);

    let err = app.chat.converse(user.id, "   ", None, None).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
    assert_eq!(app.generator.calls(), 0);
}

#[tokio::test]
async fn conversational_prompt_carries_similar_documents() {
    let app = TestApp::new();
    let user = app.user(Tier::Free);
    let text = "sono regula o humor";
    app.store
        .add_document(text, app.embeddings.vector_for(text));

    app.chat
        .converse(user.id, "sono regula humor", None, None)
        .await
        .unwrap();

    let prompt = &app.generator.prompts(GenerationKind::Answer)[0];
    assert!(prompt.contains("Trechos de documentos:\n- sono regula o humor"), "{prompt}");
    assert!(!prompt.contains("Perfil do usuário"));
}

#[tokio::test]
async fn combined_search_outage_puts_recent_turns_before_documents() {
    let app = TestApp::new();
    let user = app.user(Tier::Free);
    let text = "sono regula o humor";
    app.store
        .add_document(text, app.embeddings.vector_for(text));
    let first = app
        .chat
        .converse(user.id, "Tenho dormido mal", None, None)
        .await
        .unwrap();

    app.store.inject(Failure::CombinedSearch);
    app.chat
        .converse(user.id, "sono regula humor", Some(first.session_id), None)
        .await
        .unwrap();

    let prompt = &app.generator.prompts(GenerationKind::Answer)[1];
    let history = prompt
        .find("Conversas anteriores relevantes:\n- Tenho dormido mal")
        .expect("recent turns section");
    let documents = prompt
        .find("Trechos de documentos:\n- sono regula o humor")
        .expect("documents section");
    assert!(history < documents, "{prompt}");
}

#[tokio::test]
async fn sessions_are_listed_by_last_activity() {
    let app = TestApp::new();
    let user = app.user(Tier::Free);

    let a = app
        .conversations
        .create_session(user.id, Some("A"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let b = app
        .conversations
        .create_session(user.id, Some("B"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    app.chat
        .converse(user.id, "De volta ao primeiro", Some(a.id), None)
        .await
        .unwrap();

    let sessions = app.conversations.list_sessions(user.id).await.unwrap();
    let ids: Vec<_> = sessions.iter().map(|s| s.id).collect();
    assert_eq!(ids, [a.id, b.id]);
    assert!(sessions[0].last_activity > sessions[1].last_activity);
    assert_eq!(sessions[1].last_activity, b.created_at);
}

#[tokio::test]
async fn guardian_uses_profile_and_similar_reflections() {
    let app = TestApp::new();
    let user = app.user(Tier::Intermediate);
    app.store.set_profile(
        user.id,
        UserProfile {
            goals: vec!["dormir melhor".to_string()],
            interests: vec!["meditação".to_string()],
            experience_level: Some("iniciante".to_string()),
        },
    );
    app.journal
        .record(
            user.id,
            NewReflection {
                content: "foco no trabalho".to_string(),
                ..NewReflection::default()
            },
        )
        .await
        .unwrap();

    let reply = app.guide(user.id, "foco no trabalho hoje").await;
    assert!(reply.turn_id.is_some());

    let prompt = &app.generator.prompts(GenerationKind::Answer)[0];
    assert!(prompt.contains("IA Guardiã"));
    assert!(prompt.contains("- Objetivos: dormir melhor"));
    assert!(prompt.contains("Reflexões do usuário:\n- foco no trabalho"), "{prompt}");

    // The guardian stream never shows up as a session.
    assert!(app.conversations.list_sessions(user.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn guardian_falls_back_to_recent_activity_without_embeddings() {
    let app = TestApp::new();
    let user = app.user(Tier::Intermediate);
    let track = app.store.add_track("ansiedade", "Lidando com a ansiedade", Tier::Free);
    app.store.set_track_progress(user.id, track, 40);
    let video = app.store.add_video("respirar", "Respiração consciente", Tier::Free);
    app.store.set_video_progress(user.id, video.id, 120, false);
    app.embeddings.set_failing(true);

    app.guide(user.id, "por onde continuo?").await;

    let prompt = &app.generator.prompts(GenerationKind::Answer)[0];
    assert!(prompt.contains("Trilhas em progresso:\n- Lidando com a ansiedade: 40% concluído"));
    assert!(prompt.contains("Vídeos recentes:\n- Respiração consciente - em andamento"));
    assert!(!prompt.contains("Trechos de documentos"));
}
