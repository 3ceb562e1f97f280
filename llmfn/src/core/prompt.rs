//! Prompt construction for one call attempt.
//!
//! The prompt is rendered from a minijinja template whose sections carry
//! `<!-- section:KEY required|droppable -->` markers. After rendering, the
//! sections are re-assembled within a byte budget: droppable sections go first,
//! then the retry feedback is truncated. The other sections carry the call
//! itself and are never cut; a prompt whose required sections exceed the
//! budget is refused.

use std::sync::LazyLock;

use minijinja::{Environment, context};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::core::function::FunctionSpec;
use crate::core::schema::SchemaDocument;

const CALL_TEMPLATE: &str = include_str!("prompts/call.md");

/// Default prompt budget in bytes.
pub const DEFAULT_PROMPT_BUDGET_BYTES: usize = 32_000;

/// Corrective context carried into a retry prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Feedback {
    /// 1-indexed attempt that produced `previous_response`.
    pub attempt: u32,
    pub previous_response: String,
    pub error: String,
}

/// Everything a prompt is built from.
#[derive(Debug, Clone)]
pub struct PromptInputs<'a> {
    pub spec: &'a FunctionSpec,
    /// One value per declared parameter, in declaration order.
    pub arguments: &'a [Value],
    pub return_schema: &'a SchemaDocument,
    pub feedback: Option<&'a Feedback>,
}

#[derive(Debug, Serialize)]
struct ArgumentContext {
    name: String,
    ty: String,
    value: String,
}

/// The required sections of a prompt do not fit the budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptTooLarge {
    pub required_bytes: usize,
    pub budget_bytes: usize,
}

struct PromptEngine {
    env: Environment<'static>,
}

static ENGINE: LazyLock<PromptEngine> = LazyLock::new(PromptEngine::new);

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("call", CALL_TEMPLATE)
            .expect("call template should be valid");
        Self { env }
    }

    fn render_call(&self, input: &PromptInputs<'_>) -> Result<String, minijinja::Error> {
        let arguments: Vec<ArgumentContext> = input
            .spec
            .params
            .iter()
            .zip(input.arguments)
            .map(|(param, value)| ArgumentContext {
                name: param.name.clone(),
                ty: param.ty.to_string(),
                value: value.to_string(),
            })
            .collect();
        let flavors: Vec<&str> = input
            .spec
            .flavors
            .iter()
            .map(|flavor| flavor.instruction())
            .collect();
        let template = self.env.get_template("call")?;
        template.render(context! {
            signature => input.spec.signature(),
            docstring => (!input.spec.docstring.is_empty()).then_some(input.spec.docstring.as_str()),
            flavors => flavors,
            returns_type => input.spec.returns.to_string(),
            return_schema => input.return_schema.to_pretty(),
            feedback => input.feedback,
            arguments => arguments,
        })
    }
}

#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    content: String,
}

fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    static SECTION_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->")
            .expect("section marker regex should be valid")
    });

    let markers: Vec<(usize, usize, String, bool)> = SECTION_RE
        .captures_iter(rendered)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some((
                whole.start(),
                whole.end(),
                caps.get(1)?.as_str().to_string(),
                caps.get(2)?.as_str() == "required",
            ))
        })
        .collect();

    let mut sections = Vec::with_capacity(markers.len());
    for (i, (_, content_start, key, required)) in markers.iter().enumerate() {
        let end = markers
            .get(i + 1)
            .map(|(next_start, ..)| *next_start)
            .unwrap_or(rendered.len());
        let content = rendered[*content_start..end].trim().to_string();
        if !content.is_empty() {
            sections.push(ParsedSection {
                key: key.clone(),
                required: *required,
                content,
            });
        }
    }
    sections
}

fn total_len(sections: &[ParsedSection]) -> usize {
    let separators = sections.len().saturating_sub(1) * 2;
    sections.iter().map(|s| s.content.len()).sum::<usize>() + separators
}

/// Drop order: previous_response. Then the feedback section is shortened, and
/// removed if nothing of it fits.
fn apply_budget_to_sections(
    sections: &mut Vec<ParsedSection>,
    budget: usize,
) -> Result<(), PromptTooLarge> {
    if total_len(sections) <= budget {
        return Ok(());
    }

    for key in ["previous_response"] {
        if total_len(sections) <= budget {
            break;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    let total = total_len(sections);
    if total <= budget {
        return Ok(());
    }
    if let Some(idx) = sections.iter().position(|s| s.key == "feedback") {
        let before_len = sections[idx].content.len();
        let allowed = budget.saturating_sub(total - before_len);
        const MARKER: &str = "\n[truncated]";
        if allowed > MARKER.len() {
            let feedback = &mut sections[idx].content;
            truncate_at_char_boundary(feedback, allowed - MARKER.len());
            feedback.push_str(MARKER);
            debug!(before_len, after_len = feedback.len(), "truncated feedback for budget");
        } else {
            debug!(before_len, "dropped feedback for budget");
            sections.remove(idx);
        }
    }

    let required_bytes = total_len(sections);
    if required_bytes > budget {
        return Err(PromptTooLarge {
            required_bytes,
            budget_bytes: budget,
        });
    }
    Ok(())
}

fn truncate_at_char_boundary(text: &mut String, max_len: usize) {
    if text.len() <= max_len {
        return;
    }
    let mut cut = max_len;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Builds call prompts within a byte budget.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_PROMPT_BUDGET_BYTES)
    }
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    pub fn budget_bytes(&self) -> usize {
        self.budget_bytes
    }

    /// Build the prompt for one attempt. Identical inputs yield identical text.
    pub fn build(&self, input: &PromptInputs<'_>) -> Result<Prompt, PromptTooLarge> {
        let rendered = ENGINE
            .render_call(input)
            .expect("call template rendering should not fail");

        let mut sections = parse_sections(&rendered);
        apply_budget_to_sections(&mut sections, self.budget_bytes)?;

        Ok(Prompt {
            content: render_sections(&sections),
        })
    }
}

/// A rendered prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    content: String,
}

impl Prompt {
    pub fn as_str(&self) -> &str {
        &self.content
    }

    pub fn into_string(self) -> String {
        self.content
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::function::Flavor;
    use crate::core::schema::derive_schema;
    use crate::core::types::TypeDescriptor;
    use crate::test_support::{guess_letter_spec, house};
    use serde_json::json;

    fn build(spec: &FunctionSpec, args: &[Value], feedback: Option<&Feedback>, budget: usize) -> String {
        let schema = derive_schema(&spec.returns);
        PromptBuilder::new(budget)
            .build(&PromptInputs {
                spec,
                arguments: args,
                return_schema: &schema,
                feedback,
            })
            .expect("prompt within budget")
            .into_string()
    }

    #[test]
    fn prompt_contains_every_component_in_order() {
        let spec = guess_letter_spec();
        let content = build(&spec, &[json!("xertz"), json!("t")], None, 10_000);

        let contract = content.find("<contract>").expect("contract");
        let function = content.find("<function>").expect("function");
        let returns = content.find("<returns type=\"bool\">").expect("returns");
        let arguments = content.find("<arguments>").expect("arguments");
        assert!(contract < function && function < returns && returns < arguments);

        assert!(content.contains("Signature: guess_letter(word: str, letter: str) -> bool"));
        assert!(content.contains(&spec.docstring));
        assert!(content.contains("\"type\": \"boolean\""));
        assert!(content.contains("word (str): \"xertz\""));
        assert!(content.contains("letter (str): \"t\""));
        assert!(content.contains("single JSON value"));
        assert!(!content.contains("<flavors>"));
        assert!(!content.contains("<feedback"));
    }

    #[test]
    fn prompt_is_deterministic() {
        let spec = guess_letter_spec();
        let args = [json!("xertz"), json!("t")];
        assert_eq!(
            build(&spec, &args, None, 10_000),
            build(&spec, &args, None, 10_000)
        );
    }

    #[test]
    fn random_flavor_adds_variation_instruction() {
        let spec = FunctionSpec::builder("choose_word")
            .doc("Choose a random word.")
            .returns::<String>()
            .flavor(Flavor::Random)
            .build()
            .expect("spec");
        let content = build(&spec, &[], None, 10_000);
        assert!(content.contains("<flavors>"));
        assert!(content.contains(Flavor::Random.instruction()));
        assert!(content.contains("(no arguments)"));
    }

    #[test]
    fn feedback_carries_previous_reply_and_error() {
        let spec = FunctionSpec::builder("generate_dataclass")
            .doc("Generate a house.")
            .returns_with(house())
            .build()
            .expect("spec");
        let feedback = Feedback {
            attempt: 1,
            previous_response: "{\"color\": \"red\"}".to_string(),
            error: "at size: missing required field `size`".to_string(),
        };
        let content = build(&spec, &[], Some(&feedback), 10_000);
        assert!(content.contains("<feedback attempt=\"1\">"));
        assert!(content.contains("missing required field `size`"));
        assert!(content.contains("<previous_response>\n{\"color\": \"red\"}"));
    }

    #[test]
    fn budget_drops_previous_reply_before_required_sections() {
        let spec = guess_letter_spec();
        let feedback = Feedback {
            attempt: 2,
            previous_response: "garbage ".repeat(500),
            error: "at <root>: not valid JSON".to_string(),
        };
        let args = [json!("xertz"), json!("t")];
        let full = build(&spec, &args, None, 100_000);
        let content = build(&spec, &args, Some(&feedback), full.len() + 400);

        assert!(!content.contains("<previous_response>"));
        assert!(content.contains("<feedback attempt=\"2\">"));
        assert!(content.contains("<contract>"));
        assert!(content.contains("<arguments>"));
        assert!(content.len() <= full.len() + 400);
    }

    #[test]
    fn budget_truncates_feedback_but_keeps_arguments() {
        let spec = guess_letter_spec();
        let args = [json!("xertz"), json!("t")];
        let full = build(&spec, &args, None, 100_000);
        let feedback = Feedback {
            attempt: 1,
            previous_response: "garbage".to_string(),
            error: format!("at <root>: {}", "not valid JSON ".repeat(200)),
        };
        let budget = full.len() + 200;
        let content = build(&spec, &args, Some(&feedback), budget);

        assert!(content.len() <= budget);
        assert!(content.contains("<feedback attempt=\"1\">"));
        assert!(content.contains("[truncated]"));
        assert!(!content.contains("<previous_response>"));
        assert!(content.contains("letter (str): \"t\""));
    }

    #[test]
    fn oversized_arguments_are_refused() {
        let spec = FunctionSpec::builder("get_avg_len")
            .doc("Average word length.")
            .param_with("words", TypeDescriptor::list(TypeDescriptor::string()))
            .returns::<i64>()
            .build()
            .expect("spec");
        let words = json!(vec!["elderberry"; 400]);
        let schema = derive_schema(&spec.returns);
        let err = PromptBuilder::new(1_500)
            .build(&PromptInputs {
                spec: &spec,
                arguments: &[words],
                return_schema: &schema,
                feedback: None,
            })
            .unwrap_err();
        assert_eq!(err.budget_bytes, 1_500);
        assert!(err.required_bytes > 1_500);
    }
}
