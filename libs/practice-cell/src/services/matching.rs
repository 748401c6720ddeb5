use tracing::debug;

use crate::models::{AppointmentType, PracticeError, PracticeSnapshot};

/// Static alias table mapping a canonical service keyword to the phrases
/// callers actually say for it. A group applies to an appointment type when
/// the type's name (or one of its keyword tags) contains the canonical term.
const ALIAS_GROUPS: &[(&str, &[&str])] = &[
    ("cleaning", &["prophy", "prophylaxis", "hygiene", "teeth cleaning", "scale", "polish"]),
    ("checkup", &["check up", "check-up", "exam", "examination", "recall"]),
    ("emergency", &["toothache", "tooth pain", "broken tooth", "swelling", "urgent"]),
    ("filling", &["cavity", "restoration", "composite"]),
    ("crown", &["cap"]),
    ("root canal", &["endo", "endodontic"]),
    ("extraction", &["pull", "pulled", "removal", "wisdom tooth", "wisdom teeth"]),
    ("whitening", &["bleaching", "whiten"]),
    ("consultation", &["consult", "new patient visit", "second opinion"]),
    ("x-ray", &["xray", "x ray", "radiograph", "imaging"]),
    ("invisalign", &["aligner", "aligners", "clear aligners", "braces"]),
    ("denture", &["dentures", "false teeth"]),
    ("implant", &["implants"]),
];

const MATCH_THRESHOLD: u32 = 10;

const SCORE_EXACT: u32 = 100;
const SCORE_ALIAS_CONTAINMENT: u32 = 80;
const SCORE_SUBSTRING: u32 = 70;
const SCORE_PER_NAME_TOKEN: u32 = 20;
const SCORE_PER_ALIAS_TOKEN: u32 = 15;

#[derive(Debug, Clone, PartialEq)]
pub struct TypeMatch {
    pub appointment_type: AppointmentType,
    pub score: u32,
}

/// Outcome of resolving a free-text service request. On a weak best score the
/// matcher refuses to guess and hands back the configured list so the caller
/// can be asked to clarify.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeResolution {
    Matched(TypeMatch),
    NeedsClarification { available: Vec<AppointmentType> },
}

pub fn resolve_appointment_type(
    practice: &PracticeSnapshot,
    request: &str,
) -> Result<TypeResolution, PracticeError> {
    let candidates: Vec<&AppointmentType> = practice
        .appointment_types
        .iter()
        .filter(|t| t.bookable_online)
        .collect();

    if candidates.is_empty() {
        return Err(PracticeError::NoAppointmentTypes);
    }

    let request_norm = normalize(request);
    let request_tokens = tokenize(&request_norm);

    let mut best: Option<(&AppointmentType, u32)> = None;
    for &appointment_type in &candidates {
        let score = score_type(appointment_type, &request_norm, &request_tokens);
        debug!(
            "Appointment type '{}' scored {} for request '{}'",
            appointment_type.name, score, request
        );
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ if score > 0 => best = Some((appointment_type, score)),
            _ => {}
        }
    }

    match best {
        Some((appointment_type, score)) if score >= MATCH_THRESHOLD => {
            Ok(TypeResolution::Matched(TypeMatch {
                appointment_type: appointment_type.clone(),
                score,
            }))
        }
        _ => Ok(TypeResolution::NeedsClarification {
            available: candidates.into_iter().cloned().collect(),
        }),
    }
}

fn score_type(appointment_type: &AppointmentType, request: &str, request_tokens: &[String]) -> u32 {
    let name = normalize(&appointment_type.name);
    if name == *request {
        return SCORE_EXACT;
    }

    let name_tokens = tokenize(&name);
    let alias_groups = relevant_alias_groups(appointment_type, &name);

    let mut best = 0u32;

    // Caller said one of the known alias phrases for this service. The
    // canonical term is a word of the type name, so it earns name-token
    // credit below, not alias credit here.
    let alias_hit = alias_groups.iter().any(|(_, aliases)| {
        aliases
            .iter()
            .any(|alias| contains_phrase(request_tokens, alias))
    });
    if alias_hit {
        best = best.max(SCORE_ALIAS_CONTAINMENT);
    }

    if !request.is_empty() && (name.contains(request) || request.contains(&name)) {
        best = best.max(SCORE_SUBSTRING);
    }

    let name_token_hits = request_tokens
        .iter()
        .filter(|token| name_tokens.contains(token))
        .count() as u32;
    let alias_token_hits = request_tokens
        .iter()
        .filter(|token| {
            alias_groups
                .iter()
                .any(|(_, aliases)| aliases.iter().any(|alias| tokenize(alias).contains(token)))
        })
        .count() as u32;

    best.max(name_token_hits * SCORE_PER_NAME_TOKEN + alias_token_hits * SCORE_PER_ALIAS_TOKEN)
}

fn relevant_alias_groups(
    appointment_type: &AppointmentType,
    normalized_name: &str,
) -> Vec<(&'static str, &'static [&'static str])> {
    ALIAS_GROUPS
        .iter()
        .filter(|(canonical, _)| {
            normalized_name.contains(canonical)
                || appointment_type
                    .keywords
                    .iter()
                    .any(|kw| normalize(kw).contains(canonical))
        })
        .copied()
        .collect()
}

/// Whole-word phrase containment: "whiten" never hits inside "whitening",
/// while the multi-word "wisdom teeth" still matches as a token run.
fn contains_phrase(haystack_tokens: &[String], phrase: &str) -> bool {
    let phrase_tokens = tokenize(phrase);
    if phrase_tokens.is_empty() {
        return false;
    }
    haystack_tokens
        .windows(phrase_tokens.len())
        .any(|window| window == phrase_tokens.as_slice())
}

fn normalize(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
