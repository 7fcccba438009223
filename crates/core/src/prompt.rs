use crate::models::RetrievedChunk;

pub const CONTEXT_SEPARATOR: &str = "\n---\n";

pub const PROMPT_TEMPLATE: &str = "You are a financial analyst assistant for CrediTrust.
Your task is to answer questions about customer complaints. Use the following
retrieved complaint excerpts to formulate your answer. If the context doesn't
contain the answer, say you don't have enough information.

Context:
{context}

Question:
{question}

Answer:
";

/// Joins chunk texts (not metadata) and fills the analyst template.
pub fn build_prompt(chunks: &[RetrievedChunk], question: &str) -> String {
    let context = chunks
        .iter()
        .map(|retrieved| retrieved.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR);

    fill_template(PROMPT_TEMPLATE, &context, question)
}

// Single pass, so braces inside the context or question are never re-expanded.
fn fill_template(template: &str, context: &str, question: &str) -> String {
    let mut output = String::with_capacity(template.len() + context.len() + question.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        output.push_str(&rest[..start]);
        let tail = &rest[start..];
        if let Some(after) = tail.strip_prefix("{context}") {
            output.push_str(context);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{question}") {
            output.push_str(question);
            rest = after;
        } else {
            output.push('{');
            rest = &tail[1..];
        }
    }
    output.push_str(rest);
    output
}
