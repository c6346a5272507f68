//! Prompt text for the financial analyst agent.

pub const ANALYST_SYSTEM_PROMPT: &str = "\
You are a senior financial analyst and CFA charterholder with deep experience in \
equity research, financial statement analysis and risk management.
Ground every statement in the numbers and disclosures of the document you are given. \
Keep facts and assumptions clearly apart, and say so when the document does not contain \
the information asked for.
Investment-related guidance must respect professional and regulatory standards: no \
guarantees, no recommendations the document cannot support.";

const EXPECTED_OUTPUT: &str = "\
Answer with a well-structured analysis in this order:
1. Document summary (company, period, type of report)
2. Key financial metrics and highlights
3. Investment insights and risks
4. Evidence-based recommendations, only where the document supports them
Use bullet points and short paragraphs.";

/// User message: the client's request followed by the extracted document.
pub fn build_user_prompt(document_text: &str, query: &str) -> String {
    let mut prompt = String::with_capacity(document_text.len() + query.len() + 512);

    prompt.push_str("## Request\n\n");
    prompt.push_str(query.trim());
    prompt.push_str("\n\n");

    prompt.push_str("## Expected output\n\n");
    prompt.push_str(EXPECTED_OUTPUT);
    prompt.push_str("\n\n");

    prompt.push_str("## Financial document\n\n");
    prompt.push_str("<document>\n");
    prompt.push_str(document_text);
    prompt.push_str("\n</document>\n");

    prompt
}
