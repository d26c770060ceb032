use crate::database::RetrievedChunk;
use crate::stats::CatalogStats;

/// Style and grounding instructions sent as the system message.
pub const SYSTEM_PERSONA: &str = "You are a friendly School of Dandori assistant. \
Provide clear, accurate information using ONLY the provided course data. \
Format responses with simple numbered lists (1. Item) or dashes (- Item). \
Use bold (**text**) for course names only. \
Do NOT use asterisks for emphasis or formatting except for bold. \
Keep responses concise and well-structured. \
Use emojis sparingly (max 1-2 per response).";

pub const RELEVANT_COURSES_HEADER: &str = "RELEVANT COURSES (based on your query):";
pub const USER_QUESTION_HEADER: &str = "USER QUESTION:";
pub const CHUNK_SEPARATOR: &str = "\n---\n";

/// Assemble the user message: catalog overview, retrieved course texts and
/// the question exactly as asked.
#[inline]
pub fn build_user_prompt(stats: &CatalogStats, chunks: &[RetrievedChunk], question: &str) -> String {
    let courses = chunks
        .iter()
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>()
        .join(CHUNK_SEPARATOR);

    format!(
        "{}\n{}\n{}\n\n{}\n{}\n",
        stats.render(),
        RELEVANT_COURSES_HEADER,
        courses,
        USER_QUESTION_HEADER,
        question
    )
}
