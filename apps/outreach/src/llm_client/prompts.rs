// Prompt constants for the two model calls the pipeline makes.
// Placeholders use `{name}` and are filled with plain `str::replace`.

use crate::llm_client::{EmailContext, EMAIL_DELIMITER};

pub const KEYWORD_EXTRACTION_SYSTEM: &str = "You are an expert academic research profiler. \
    You extract technical research keywords from CVs. \
    Respond with plain text only. \
    Do NOT use markdown, code fences, numbering, or any preamble.";

pub const KEYWORD_EXTRACTION_PROMPT: &str = "\
Analyze the following CV text and extract a comprehensive list of up to 200 technical \
keywords and keyphrases.

Focus strictly on:
1. Research areas and sub-domains (e.g. Computer Vision, Quantum Mechanics)
2. Specific algorithms and models (e.g. Transformer, ResNet-50, K-means)
3. Technical skills and tools (e.g. PyTorch, LaTeX, CRISPR)
4. Methodologies and techniques (e.g. Reinforcement Learning, Spectrophotometry)
5. Application domains (e.g. Healthcare, Autonomous Driving)

RULES:
- IGNORE generic words: study, method, results, approach, paper, data, analysis, experience, project, education.
- Preserve phrases (e.g. 'Natural Language Processing', not just 'Processing').
- Rank them by technical significance, most significant first.
- Return ONLY a comma-separated list of keywords. No numbering, no preamble, no markdown formatting.

CV Text:
{cv_text}";

pub const EMAIL_GENERATION_SYSTEM: &str = "You are an assistant for a prospective PhD student \
    writing to professors about research opportunities. \
    Respond with plain text only. \
    Do NOT use markdown, code fences, numbering, or any preamble.";

const EMAIL_GENERATION_PROMPT: &str = "\
Write a professional, concise and highly personalized outreach email to Prof. {professor_name} \
at {university}.

The student's research interests include: {student_keywords}.
The specific research alignment found with this professor is in: {matched_keywords}.
{publications_line}
Mention the research alignment naturally. Keep the tone academic, respectful and eager. \
Each email should be around 150-200 words. Return only the email body, without a subject line.

Write up to 3 alternative versions. Separate them with a line containing exactly {delimiter}";

pub fn build_email_prompt(ctx: &EmailContext) -> String {
    let publications_line = match ctx.publications.as_deref().map(str::trim) {
        Some(p) if !p.is_empty() => format!("Recent publications of the professor: {p}.\n"),
        _ => String::new(),
    };
    EMAIL_GENERATION_PROMPT
        .replace("{professor_name}", &ctx.professor_name)
        .replace("{university}", &ctx.university)
        .replace("{student_keywords}", &ctx.student_keywords)
        .replace("{matched_keywords}", &ctx.matched_keywords)
        .replace("{publications_line}", &publications_line)
        .replace("{delimiter}", EMAIL_DELIMITER)
}
