use crate::models::professor::ProfessorRow;

/// Placeholder body for logs whose text the model has yet to write.
pub const AI_SENTINEL: &str = "AI_GENERATED";

/// Joins alternative draft bodies inside `alternate_bodies`.
pub const ALTERNATES_DELIMITER: &str = "###SPLIT###";

const PROFESSOR_NAME: &str = "{{professor_name}}";
const UNIVERSITY: &str = "{{university}}";
const MATCHED_KEYWORDS: &str = "{{matched_keywords}}";

/// Literal, case-sensitive substitution of the three recipient tokens.
pub fn render(template: &str, professor: &ProfessorRow, matched_keywords: &str) -> String {
    template
        .replace(PROFESSOR_NAME, &professor.full_name())
        .replace(UNIVERSITY, professor.university.as_deref().unwrap_or(""))
        .replace(MATCHED_KEYWORDS, matched_keywords)
}

/// True when the body still needs a real draft.
pub fn is_placeholder(body: &str) -> bool {
    let body = body.trim();
    body.is_empty() || body == AI_SENTINEL
}

/// Storage form of the drafts after the first: `None` when there are none.
pub fn join_alternates(options: &[String]) -> Option<String> {
    let rest = options.get(1..).unwrap_or_default();
    (!rest.is_empty()).then(|| rest.join(ALTERNATES_DELIMITER))
}
