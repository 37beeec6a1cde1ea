//! Prompt template rendering
//!
//! Templates carry named `{placeholder}` variables filled from the code
//! context. Unknown placeholders are left verbatim.

use hs_types::CodeContext;

/// Substitute the supported placeholders into a prompt template
pub fn render_prompt_template(
    template: &str,
    ctx: &CodeContext,
    heuristic_finding_count: usize,
) -> String {
    let variables = [
        ("{language}", ctx.language.clone()),
        ("{code_snippet}", ctx.code_snippet.clone()),
        ("{file_path}", ctx.file_path.clone()),
        ("{line_number}", ctx.line_number.to_string()),
        ("{heuristic_findings}", heuristic_finding_count.to_string()),
    ];

    let mut prompt = template.to_string();
    for (placeholder, value) in variables {
        prompt = prompt.replace(placeholder, &value);
    }
    prompt
}
