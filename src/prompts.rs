//! Prompts for the four model-backed stages.
//!
//! Centralising every prompt here keeps the wording in one place and lets
//! unit tests inspect the rendered prompts without calling a model.
//!
//! Each prompt ends with the exact JSON shape expected back, which
//! [`crate::pipeline::postprocess::parse_json_reply`] then recovers.

use crate::schema::FieldResolutionInput;

/// System prompt shared by every stage.
pub const SYSTEM_PROMPT: &str = "You process scanned Forest Rights Act (FRA) land-claim documents \
from India. Reply with a single JSON object and nothing else: no Markdown fences, no commentary.";

/// Instruction sent alongside the document attachment.
pub const EXTRACTION_PROMPT: &str = r#"Extract the text from the attached document.

Transcribe every printed and handwritten word in reading order, including
form labels, table cells, stamps and marginal notes. Do not summarise or
translate. Keep the original script for non-English text.

Return: {"extractedText": "<the full text>"}"#;

/// Prompt for cleaning raw OCR output. `{text}` is replaced with the text.
const NORMALIZATION_TEMPLATE: &str = r#"You are a text preprocessing expert. Your task is to clean and normalize the given OCR output.

Apply the following steps:
1. Correct any OCR errors.
2. Remove any noise or irrelevant characters.
3. Standardize spacing and punctuation.

Here is the raw OCR output:
"""{text}"""

Return: {"preprocessedText": "<the cleaned and normalized text>"}"#;

/// Prompt for entity recognition. `{text}` is replaced with the text.
const RECOGNITION_TEMPLATE: &str = r#"You are an expert Named Entity Recognition (NER) system for Forest Rights Act (FRA) documents.
Identify and extract the key entities in the text below and label each one.
The entities to extract include: patta holder names, village names, coordinates, claim statuses.
Record anything else relevant to the claim with a label starting with "other".

Text: """{text}"""

Return: {"entities": [{"label": "<entity type, e.g. patta holder name>", "value": "<extracted value>"}]}
Return {"entities": []} if nothing is found."#;

/// Prompt for mapping resolved fields onto the final record.
const STRUCTURING_TEMPLATE: &str = r#"You are an expert in structuring data extracted from Forest Rights Act (FRA) documents.

Based on the extracted entities provided, map the data into the JSON schema below.
Infer missing information or resolve conflicts.
If a field cannot be inferred, set it to null.

Extracted Entities:
Patta Holder Name: {pattaHolderName}
Village Name: {villageName}
Coordinates: {coordinates}
Claim Status: {claimStatus}
Other Information: {otherInformation}

JSON Schema:
{
  "pattaHolderName": "string or null: the name of the patta holder",
  "villageName": "string or null: the name of the village",
  "coordinates": "string or null: the coordinates of the land",
  "claimStatus": "string or null: the status of the claim",
  "additionalNotes": "string or null: additional notes or inferred information"
}

Return the structured JSON object with all five keys present."#;

/// Placeholder rendered for a field the resolver left absent.
const ABSENT: &str = "(not found)";

/// Render the normalization prompt.
pub fn normalization_prompt(extracted_text: &str) -> String {
    NORMALIZATION_TEMPLATE.replace("{text}", extracted_text)
}

/// Render the recognition prompt.
pub fn recognition_prompt(text: &str) -> String {
    RECOGNITION_TEMPLATE.replace("{text}", text)
}

/// Render the structuring prompt from the partially resolved record.
///
/// Placeholders are substituted in one pass over the template, so a value
/// that itself contains `{villageName}` is copied through verbatim.
pub fn structuring_prompt(input: &FieldResolutionInput) -> String {
    render(STRUCTURING_TEMPLATE, |key| {
        let value = match key {
            "pattaHolderName" => &input.patta_holder_name,
            "villageName" => &input.village_name,
            "coordinates" => &input.coordinates,
            "claimStatus" => &input.claim_status,
            "otherInformation" => &input.other_information,
            _ => return None,
        };
        Some(value.as_deref().unwrap_or(ABSENT))
    })
}

/// Single-pass `{name}` substitution. Braces that do not name a known
/// placeholder (the JSON schema block) are kept as written.
fn render<'a>(template: &str, lookup: impl Fn(&str) -> Option<&'a str>) -> String {
    let mut out = String::with_capacity(template.len() + 256);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after
            .find('}')
            .and_then(|close| lookup(&after[..close]).map(|v| (v, close)));
        match value {
            Some((v, close)) => {
                out.push_str(v);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
