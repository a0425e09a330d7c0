//! crates/neurocom_core/src/synthesis.rs
//!
//! Prompt composition and the calls to the generative model.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::domain::{Turn, UserProfile};
use crate::error::{CoreError, CoreResult};
use crate::ports::{GenerationKind, GenerationRequest, GenerationService};

pub const MAX_FOLLOWUPS: usize = 2;
pub const MAX_FOLLOWUP_CHARS: usize = 140;

const CONVERSATIONAL_HEADER: &str = "\
Você é a IA Bibliotecária do NEUROCOM, uma assistente consultiva.
- Responda de modo curto, implicado e consultivo.
- Use o contexto recuperado de forma indireta, reelaborando-o; não o cite literalmente.
- Se faltar base, reconheça o limite e peça elementos concretos.
- Não simule humanidade; reconheça limites e fontes.";

const GUARDIAN_HEADER: &str = "\
Você é a IA Guardiã do NEUROCOM, uma mentora de autodesenvolvimento guiado.
- Tom caloroso, encorajador e direto, nunca invasivo.
- Ajude o usuário a navegar pelas trilhas, vídeos e reflexões da plataforma.
- Comece reconhecendo o que o usuário trouxe e, quando fizer sentido, sugira um próximo passo concreto.
- Não faça diagnósticos clínicos; oriente a buscar um especialista quando necessário.";

/// Which assistant is answering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persona {
    Conversational,
    Guardian,
}

impl Persona {
    fn header(self) -> &'static str {
        match self {
            Persona::Conversational => CONVERSATIONAL_HEADER,
            Persona::Guardian => GUARDIAN_HEADER,
        }
    }

    fn assistant_label(self) -> &'static str {
        match self {
            Persona::Conversational => "assistente",
            Persona::Guardian => "guardia",
        }
    }

    fn closing(self) -> &'static str {
        match self {
            Persona::Conversational => {
                "Responda agora de modo curto, implicado e consultivo; se fizer sentido, finalize com uma pergunta viva."
            }
            Persona::Guardian => "Responda como a IA Guardiã, de forma acolhedora e útil.",
        }
    }
}

/// Everything a prompt is built from.
#[derive(Debug, Clone, Copy)]
pub struct PromptParts<'a> {
    pub persona: Persona,
    pub profile: Option<&'a UserProfile>,
    pub context: &'a str,
    pub recent_turns: &'a [Turn],
    pub message: &'a str,
}

/// Concatenates, in order: persona, profile, context, transcript, message,
/// closing instruction. Empty optional parts are left out entirely.
pub fn build_prompt(parts: &PromptParts<'_>) -> String {
    let mut prompt = String::new();
    prompt.push_str(parts.persona.header());
    prompt.push_str("\n\n");

    if let Some(profile) = parts.profile.filter(|p| !p.is_empty()) {
        prompt.push_str("Perfil do usuário:\n");
        if !profile.goals.is_empty() {
            prompt.push_str(&format!("- Objetivos: {}\n", profile.goals.join(", ")));
        }
        if !profile.interests.is_empty() {
            prompt.push_str(&format!("- Áreas de interesse: {}\n", profile.interests.join(", ")));
        }
        if let Some(level) = &profile.experience_level {
            prompt.push_str(&format!("- Nível: {}\n", level));
        }
        prompt.push('\n');
    }

    if !parts.context.trim().is_empty() {
        prompt.push_str("Contexto relevante:\n");
        prompt.push_str(parts.context.trim());
        prompt.push_str("\n\n");
    }

    if !parts.recent_turns.is_empty() {
        let transcript: Vec<String> = parts
            .recent_turns
            .iter()
            .map(|t| {
                format!(
                    "usuario: {}\n{}: {}",
                    t.question,
                    parts.persona.assistant_label(),
                    t.answer
                )
            })
            .collect();
        prompt.push_str("Histórico recente:\n");
        prompt.push_str(&transcript.join("\n\n"));
        prompt.push_str("\n\n");
    }

    prompt.push_str("Mensagem do usuário:\n");
    prompt.push_str(parts.message.trim());
    prompt.push_str("\n\n");
    prompt.push_str(parts.persona.closing());
    prompt
}

pub fn build_followup_prompt(message: &str, answer: &str) -> String {
    format!(
        "gere 1 a 2 perguntas curtas (ate {} caracteres), abertas e consultivas, em pt-br, focadas no proximo passo. \
espelhe o modo de enderecamento do usuario. evite perguntas genericas ou retoricas; nomeie 1 elemento concreto trazido.\n\n\
mensagem do usuario:\n{}\n\nresposta anterior:\n{}",
        MAX_FOLLOWUP_CHARS, message, answer
    )
}

/// One question per line, bullets stripped, duplicates dropped, at most two.
pub fn parse_followups(raw: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.lines()
        .map(|line| {
            line.trim()
                .trim_start_matches(|c: char| c == '-' || c == '*' || c == '•')
                .trim()
                .to_string()
        })
        .filter(|line| !line.is_empty())
        .filter(|line| seen.insert(line.clone()))
        .take(MAX_FOLLOWUPS)
        .map(|line| line.chars().take(MAX_FOLLOWUP_CHARS).collect())
        .collect()
}

#[derive(Clone)]
pub struct Synthesizer {
    generator: Arc<dyn GenerationService>,
    answer_timeout: Duration,
    followup_timeout: Duration,
}

impl Synthesizer {
    pub fn new(
        generator: Arc<dyn GenerationService>,
        answer_timeout: Duration,
        followup_timeout: Duration,
    ) -> Self {
        Self {
            generator,
            answer_timeout,
            followup_timeout,
        }
    }

    /// Generates the answer. Unusable model output degrades to an empty
    /// string; only a missed deadline or an unreachable model is an error.
    pub async fn synthesize(&self, parts: &PromptParts<'_>) -> CoreResult<String> {
        let prompt = build_prompt(parts);
        let request = GenerationRequest {
            kind: GenerationKind::Answer,
            prompt: &prompt,
            max_output_tokens: None,
        };

        let text = tokio::time::timeout(self.answer_timeout, self.generator.generate(&request))
            .await
            .map_err(|_| CoreError::SynthesisTimeout(self.answer_timeout))??;

        let text = text.trim();
        if text.is_empty() {
            warn!("{}", CoreError::SynthesisDegraded);
        }
        Ok(text.to_string())
    }

    /// Up to two follow-up questions. Any failure yields an empty list.
    pub async fn followups(&self, message: &str, answer: &str) -> Vec<String> {
        let prompt = build_followup_prompt(message, answer);
        let request = GenerationRequest {
            kind: GenerationKind::Followups,
            prompt: &prompt,
            max_output_tokens: Some(200),
        };

        match tokio::time::timeout(self.followup_timeout, self.generator.generate(&request)).await
        {
            Ok(Ok(raw)) => parse_followups(&raw),
            Ok(Err(e)) => {
                warn!("Follow-up generation failed: {}", e);
                Vec::new()
            }
            Err(_) => {
                warn!("Follow-up generation exceeded {:?}", self.followup_timeout);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn turn(q: &str, a: &str) -> Turn {
        Turn {
            id: 1,
            user_id: Uuid::nil(),
            session_id: None,
            question: q.to_string(),
            answer: a.to_string(),
            followups: vec![],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn prompt_sections_appear_in_fixed_order() {
        let profile = UserProfile {
            goals: vec!["foco".to_string()],
            interests: vec![],
            experience_level: Some("iniciante".to_string()),
        };
        let turns = [turn("oi", "olá")];
        let prompt = build_prompt(&PromptParts {
            persona: Persona::Guardian,
            profile: Some(&profile),
            context: "- trilha A",
            recent_turns: &turns,
            message: "como sigo?",
        });

        let positions: Vec<usize> = [
            "IA Guardiã do NEUROCOM",
            "Perfil do usuário:",
            "Contexto relevante:",
            "Histórico recente:",
            "Mensagem do usuário:\ncomo sigo?",
            "Responda como a IA Guardiã",
        ]
        .iter()
        .map(|needle| prompt.find(needle).expect(needle))
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{prompt}");
        assert!(prompt.contains("guardia: olá"));
    }

    #[test]
    fn empty_sections_are_omitted() {
        let prompt = build_prompt(&PromptParts {
            persona: Persona::Conversational,
            profile: None,
            context: "  ",
            recent_turns: &[],
            message: "pergunta",
        });
        assert!(!prompt.contains("Perfil do usuário"));
        assert!(!prompt.contains("Contexto relevante"));
        assert!(!prompt.contains("Histórico recente"));
        assert!(prompt.contains("Mensagem do usuário:\npergunta"));
    }

    #[test]
    fn followups_are_cleaned_deduplicated_and_capped() {
        let raw = "- O que te impede hoje?\n\n* O que te impede hoje?\n• E amanhã?\n- Terceira?";
        assert_eq!(
            parse_followups(raw),
            vec!["O que te impede hoje?".to_string(), "E amanhã?".to_string()]
        );

        let long = "x".repeat(500);
        assert_eq!(parse_followups(&long)[0].chars().count(), MAX_FOLLOWUP_CHARS);
    }
}
