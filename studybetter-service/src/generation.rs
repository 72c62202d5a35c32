//! Study-material generation from extracted text: multiple-choice
//! questions, flashcards, and the QuizPasa chat assistant.
//!
//! Every generator degrades rather than fails: a missing API key, a
//! connection problem, or an unparseable model response all fall back to
//! content-based items derived directly from the text.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::groq::{ChatMessage, GroqClient};

/// Model output is capped; only the head of a long document is sent.
const TEXT_PREVIEW_CHARS: usize = 4000;

const GENERATION_TEMPERATURE: f32 = 0.3;
const GENERATION_MAX_TOKENS: u32 = 2500;

const CHAT_TEMPERATURE: f32 = 0.5;
const CHAT_MAX_TOKENS: u32 = 400;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mcq {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flashcard {
    pub front: String,
    pub back: String,
}

#[derive(Debug, Deserialize)]
struct McqPayload {
    #[serde(default)]
    questions: Vec<Mcq>,
}

#[derive(Debug, Deserialize)]
struct FlashcardPayload {
    #[serde(default)]
    flashcards: Vec<Flashcard>,
}

/// Generate MCQs, falling back to content-based questions when the model
/// is unavailable or returns something unusable.
pub async fn generate_mcqs(client: &GroqClient, text: &str, count: usize) -> Vec<Mcq> {
    if !client.is_configured() {
        info!("No Groq API key; using content-based MCQ generation");
        return content_based_mcqs(text, count);
    }

    let prompt = mcq_prompt(text_preview(text), count);
    let messages = vec![
        ChatMessage::system(
            "You are an expert educational content creator specializing in generating \
             high-quality multiple choice questions from text content. Always respond \
             with valid JSON format only.",
        ),
        ChatMessage::user(prompt),
    ];

    match client
        .chat(messages, GENERATION_TEMPERATURE, GENERATION_MAX_TOKENS)
        .await
    {
        Ok(content) => match serde_json::from_str::<McqPayload>(strip_json_fence(&content)) {
            Ok(payload) if !payload.questions.is_empty() => {
                info!(count = payload.questions.len(), "Generated MCQs");
                payload.questions
            }
            Ok(_) => {
                warn!("Model response contained no questions");
                content_based_mcqs(text, count)
            }
            Err(e) => {
                warn!(error = %e, "Failed to parse MCQ response as JSON");
                content_based_mcqs(text, count)
            }
        },
        Err(e) => {
            warn!(error = %e, "MCQ generation call failed");
            content_based_mcqs(text, count)
        }
    }
}

/// Generate flashcards, same degradation policy as [`generate_mcqs`].
pub async fn generate_flashcards(client: &GroqClient, text: &str, count: usize) -> Vec<Flashcard> {
    if !client.is_configured() {
        info!("No Groq API key; using content-based flashcard generation");
        return content_based_flashcards(text, count);
    }

    let prompt = flashcard_prompt(text_preview(text), count);
    let messages = vec![
        ChatMessage::system(
            "You are an expert educational content creator specializing in generating \
             high-quality flashcards from text content. Always respond with valid JSON \
             format only.",
        ),
        ChatMessage::user(prompt),
    ];

    match client
        .chat(messages, GENERATION_TEMPERATURE, GENERATION_MAX_TOKENS)
        .await
    {
        Ok(content) => {
            match serde_json::from_str::<FlashcardPayload>(strip_json_fence(&content)) {
                Ok(payload) if !payload.flashcards.is_empty() => {
                    info!(count = payload.flashcards.len(), "Generated flashcards");
                    payload.flashcards
                }
                Ok(_) => {
                    warn!("Model response contained no flashcards");
                    content_based_flashcards(text, count)
                }
                Err(e) => {
                    warn!(error = %e, "Failed to parse flashcard response as JSON");
                    content_based_flashcards(text, count)
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "Flashcard generation call failed");
            content_based_flashcards(text, count)
        }
    }
}

fn mcq_prompt(preview: &str, count: usize) -> String {
    format!(
        r#"You are an expert question generator. Based on the following text content, create {count} high-quality multiple choice questions (MCQs).

CONTENT TO ANALYZE:
{preview}

REQUIREMENTS:
1. Questions must be directly related to the content above
2. Cover different topics and concepts from the text
3. Mix of difficulty levels (easy, medium, hard)
4. Each question has exactly 4 options
5. Only ONE correct answer per question
6. Distractors should be plausible but clearly wrong
7. Focus on key concepts, facts, and important details

RESPONSE FORMAT (JSON only):
{{
    "questions": [
        {{
            "question": "What is the main concept discussed regarding [specific topic]?",
            "options": [
                "Correct answer based on text",
                "Plausible but incorrect option",
                "Another plausible but incorrect option",
                "Third plausible but incorrect option"
            ],
            "correct_answer": 0
        }}
    ]
}}

Generate {count} questions now. Return ONLY the JSON response, no additional text."#
    )
}

fn flashcard_prompt(preview: &str, count: usize) -> String {
    format!(
        r#"You are an expert flashcard generator. Based on the following text content, create {count} high-quality flashcards.

CONTENT TO ANALYZE:
{preview}

REQUIREMENTS:
1. Each flashcard must have a clear 'front' (question/term) and 'back' (answer/definition).
2. Flashcards must be directly related to the content above.
3. Cover different topics and concepts from the text.
4. Focus on key concepts, facts, and important details.

RESPONSE FORMAT (JSON only):
{{
    "flashcards": [
        {{
            "front": "What is [key concept]?",
            "back": "[Definition/Explanation of key concept]"
        }}
    ]
}}

Generate {count} flashcards now. Return ONLY the JSON response, no additional text."#
    )
}

/// First `TEXT_PREVIEW_CHARS` characters, respecting char boundaries.
fn text_preview(text: &str) -> &str {
    match text.char_indices().nth(TEXT_PREVIEW_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Models often wrap JSON in a markdown fence despite instructions.
fn strip_json_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix("```").unwrap_or(trimmed);
    trimmed.trim()
}

/// Deterministic MCQs built from the text itself, used when the model is
/// unreachable. Obvious to a human, but they keep the quiz flow working.
pub fn content_based_mcqs(text: &str, count: usize) -> Vec<Mcq> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let sentences: Vec<&str> = text
        .split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    let mut questions = Vec::new();

    if let Some(first) = sentences.first() {
        let snippet = snippet_of(first, 100);
        questions.push(Mcq {
            question: "According to the document, what is mentioned in the opening section?"
                .to_string(),
            options: vec![
                format!("Content related to: {snippet}"),
                "Financial planning strategies".to_string(),
                "Sports team statistics".to_string(),
                "Weather forecast data".to_string(),
            ],
            correct_answer: 0,
        });
    }

    let word_count = words.len();
    questions.push(Mcq {
        question: "Approximately how many words does this document contain?".to_string(),
        options: vec![
            format!("Around {word_count} words"),
            format!("Around {} words", word_count / 2),
            format!("Around {} words", word_count * 2),
            "Less than 100 words".to_string(),
        ],
        correct_answer: 0,
    });

    // One recall question per remaining sentence, up to the requested count.
    for sentence in sentences.iter().skip(1) {
        if questions.len() >= count {
            break;
        }
        let snippet = snippet_of(sentence, 100);
        questions.push(Mcq {
            question: "Which of the following statements appears in the document?".to_string(),
            options: vec![
                snippet,
                "The document does not discuss this topic".to_string(),
                "This claim is contradicted by the text".to_string(),
                "None of the above".to_string(),
            ],
            correct_answer: 0,
        });
    }

    questions.truncate(count);
    questions
}

/// Deterministic flashcards from adjacent sentence pairs.
pub fn content_based_flashcards(text: &str, count: usize) -> Vec<Flashcard> {
    let sentences: Vec<&str> = text
        .split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    let mut flashcards = Vec::new();
    for i in 0..count.min(sentences.len() / 2) {
        let front = sentences[i * 2].to_string();
        let back = sentences
            .get(i * 2 + 1)
            .map(|s| s.to_string())
            .unwrap_or_else(|| "No further content.".to_string());
        flashcards.push(Flashcard { front, back });
    }

    if flashcards.is_empty() {
        if let Some(first) = sentences.first() {
            flashcards.push(Flashcard {
                front: first.to_string(),
                back: "Key point from the text.".to_string(),
            });
        }
    }

    flashcards.truncate(count);
    flashcards
}

fn snippet_of(sentence: &str, max_chars: usize) -> String {
    if sentence.chars().count() > max_chars {
        let cut: String = sentence.chars().take(max_chars).collect();
        format!("{cut}...")
    } else {
        sentence.to_string()
    }
}

// ---------------- QuizPasa chat assistant ----------------

const QUIZPASA_SYSTEM_PROMPT: &str = "\
You are QuizPasa, an AI study assistant for the StudyBetter application.
Your communication style:
- Direct and concise responses
- Professional but approachable
- Focused on providing useful information
- Avoid excessive enthusiasm or overly friendly language
- Keep responses brief unless detailed explanation is needed
- Don't use excessive greetings or pleasantries

Your main functions:
- Help users understand how to use the StudyBetter platform
- Answer questions about study techniques and learning strategies
- Provide educational support and explanations
- Help with general academic questions
- Provide study guidance

Keep responses helpful and to the point. If asked about non-educational topics,
briefly redirect to study-related topics without being overly apologetic.";

/// Study materials from the caller's session, injected into the chat
/// context so the assistant can discuss specific questions and cards.
#[derive(Debug, Default, Deserialize)]
pub struct SessionMaterials {
    #[serde(default)]
    pub mcqs: Vec<Mcq>,
    #[serde(default)]
    pub flashcards: Vec<Flashcard>,
}

impl SessionMaterials {
    pub fn is_empty(&self) -> bool {
        self.mcqs.is_empty() && self.flashcards.is_empty()
    }
}

#[derive(Debug, Serialize)]
pub struct ChatReply {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn welcome_message() -> ChatReply {
    ChatReply {
        success: true,
        message: "Hi, I'm QuizPasa. I can help you with study techniques, MCQs, flashcards, \
                  and academic questions. What do you need help with?"
            .to_string(),
        error: None,
    }
}

pub fn study_tips() -> ChatReply {
    let tips = [
        "• Use active recall - test yourself instead of just re-reading",
        "• Practice spaced repetition with flashcards",
        "• Study in focused 25-minute sessions",
        "• Summarize key concepts in your own words",
        "• Focus on understanding, not just memorizing",
        "• Connect new information to what you already know",
    ];
    ChatReply {
        success: true,
        message: format!("Study tips:\n\n{}", tips.join("\n")),
        error: None,
    }
}

/// Answer one chat message, with session materials folded into the system
/// prompt when present.
pub async fn chat_reply(
    client: &GroqClient,
    user_message: &str,
    history: Vec<ChatMessage>,
    materials: &SessionMaterials,
) -> ChatReply {
    // Questions about materials that do not exist yet get a pointer to the
    // upload flow instead of a model call.
    if materials.is_empty() && mentions_study_materials(user_message) {
        return ChatReply {
            success: true,
            message: "No study materials found in your current session. Please upload a \
                      document to generate MCQs and flashcards first."
                .to_string(),
            error: None,
        };
    }

    if !client.is_configured() {
        return ChatReply {
            success: false,
            message: "I'm QuizPasa, your study assistant. I need to be configured with an \
                      API key to help you. Please contact your administrator."
                .to_string(),
            error: Some("API key not configured".to_string()),
        };
    }

    let mut system = QUIZPASA_SYSTEM_PROMPT.to_string();
    if !materials.is_empty() {
        system.push_str(
            "\n\nYou have access to the following study materials. Use this context to \
             provide relevant answers:\n",
        );
        system.push_str(&materials_context(materials));
    }

    let mut messages = vec![ChatMessage::system(system)];
    messages.extend(history);
    messages.push(ChatMessage::user(user_message));

    match client.chat(messages, CHAT_TEMPERATURE, CHAT_MAX_TOKENS).await {
        Ok(content) => ChatReply {
            success: true,
            message: content,
            error: None,
        },
        Err(e) => {
            warn!(error = %e, "Chat completion failed");
            ChatReply {
                success: false,
                message: "I'm having trouble connecting right now. Please try again."
                    .to_string(),
                error: Some(e.to_string()),
            }
        }
    }
}

fn mentions_study_materials(message: &str) -> bool {
    let lower = message.to_lowercase();
    ["explain", "question", "answer", "mcq", "flashcard"]
        .iter()
        .any(|keyword| lower.contains(keyword))
}

/// Render the session's MCQs and flashcards into prompt context, options
/// lettered A-D and the correct answer called out.
fn materials_context(materials: &SessionMaterials) -> String {
    let mut context = String::from("\nCurrent study materials:\n");

    if !materials.mcqs.is_empty() {
        context.push_str("\nMCQs:\n");
        for (i, mcq) in materials.mcqs.iter().enumerate() {
            context.push_str(&format!("Question {}: {}\n", i + 1, mcq.question));
            for (j, option) in mcq.options.iter().enumerate() {
                let letter = (b'A' + (j as u8).min(25)) as char;
                context.push_str(&format!("  {letter}) {option}\n"));
            }
            let letter = (b'A' + (mcq.correct_answer as u8).min(25)) as char;
            context.push_str(&format!("Correct Answer: {letter}\n"));
        }
    }

    if !materials.flashcards.is_empty() {
        context.push_str("\nFlashcards:\n");
        for (i, card) in materials.flashcards.iter().enumerate() {
            context.push_str(&format!(
                "Card {}:\n  Front: {}\n  Back: {}\n",
                i + 1,
                card.front,
                card.back
            ));
        }
    }

    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GroqConfig;

    #[test]
    fn test_strip_json_fence() {
        assert_eq!(strip_json_fence("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_json_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_json_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_json_fence("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn test_text_preview_respects_char_boundaries() {
        let text = "é".repeat(5000);
        let preview = text_preview(&text);
        assert_eq!(preview.chars().count(), TEXT_PREVIEW_CHARS);

        let short = "short text";
        assert_eq!(text_preview(short), short);
    }

    #[test]
    fn test_content_based_mcqs_reference_the_text() {
        let text = "Photosynthesis converts light into chemical energy. \
                    Chlorophyll absorbs red and blue light. \
                    The Calvin cycle fixes carbon dioxide.";
        let mcqs = content_based_mcqs(text, 10);

        assert!(mcqs.len() >= 2);
        assert!(mcqs[0].options[0].contains("Photosynthesis"));
        assert!(mcqs.iter().all(|q| q.options.len() == 4));
        assert!(mcqs.iter().all(|q| q.correct_answer == 0));
    }

    #[test]
    fn test_content_based_mcqs_honor_count() {
        let text = "One. Two. Three. Four. Five. Six. Seven. Eight.";
        assert_eq!(content_based_mcqs(text, 3).len(), 3);
    }

    #[test]
    fn test_content_based_flashcards_pair_sentences() {
        let text = "What is osmosis. Movement of water across a membrane. \
                    What is diffusion. Movement from high to low concentration.";
        let cards = content_based_flashcards(text, 10);
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].front, "What is osmosis");
        assert_eq!(cards[0].back, "Movement of water across a membrane");
    }

    #[test]
    fn test_single_sentence_still_yields_a_flashcard() {
        let cards = content_based_flashcards("Only one sentence here", 10);
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].back, "Key point from the text.");
    }

    #[test]
    fn test_mcq_payload_parsing() {
        let json = r#"{"questions":[{"question":"Q?","options":["a","b","c","d"],"correct_answer":2}]}"#;
        let payload: McqPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.questions.len(), 1);
        assert_eq!(payload.questions[0].correct_answer, 2);
    }

    #[test]
    fn test_materials_context_letters_options() {
        let materials = SessionMaterials {
            mcqs: vec![Mcq {
                question: "Capital of France?".to_string(),
                options: vec![
                    "London".to_string(),
                    "Paris".to_string(),
                    "Berlin".to_string(),
                    "Madrid".to_string(),
                ],
                correct_answer: 1,
            }],
            flashcards: vec![],
        };
        let context = materials_context(&materials);
        assert!(context.contains("Question 1: Capital of France?"));
        assert!(context.contains("  B) Paris"));
        assert!(context.contains("Correct Answer: B"));
    }

    #[tokio::test]
    async fn test_chat_without_materials_redirects_material_questions() {
        let client = GroqClient::new(GroqConfig::default()).unwrap();
        let reply = chat_reply(
            &client,
            "Can you explain question 3?",
            vec![],
            &SessionMaterials::default(),
        )
        .await;
        assert!(reply.success);
        assert!(reply.message.contains("upload a document"));
    }

    #[tokio::test]
    async fn test_chat_unconfigured_reports_admin_message() {
        let client = GroqClient::new(GroqConfig::default()).unwrap();
        let reply = chat_reply(
            &client,
            "hello there",
            vec![],
            &SessionMaterials::default(),
        )
        .await;
        assert!(!reply.success);
        assert_eq!(reply.error.as_deref(), Some("API key not configured"));
    }

    #[tokio::test]
    async fn test_generation_falls_back_without_key() {
        let client = GroqClient::new(GroqConfig::default()).unwrap();
        let text = "Mitochondria produce ATP. Ribosomes synthesize proteins.";
        let mcqs = generate_mcqs(&client, text, 5).await;
        assert!(!mcqs.is_empty());
        let cards = generate_flashcards(&client, text, 5).await;
        assert!(!cards.is_empty());
    }
}
